//! Reading interim and final responses from the peer.

use crate::chunked::read_chunked_body;
use crate::error::{ProtocolError, ProtocolResult};
use crate::headers::{has_token, head_error, header_map, read_head, HeadLimits};
use http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, StatusCode};
use std::io::{BufRead, Read};

/// A fully read response. The body has been drained from the stream.
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code.
    pub status: StatusCode,
    /// Header fields.
    pub headers: HeaderMap,
    /// Drained body bytes.
    pub body: Vec<u8>,
    /// Whether the peer asked for the connection to be closed.
    pub close: bool,
}

impl Response {
    /// Returns true for an interim `100 Continue`.
    pub fn is_continue(&self) -> bool {
        self.status == StatusCode::CONTINUE
    }

    /// Body as text; invalid UTF-8 is replaced.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn forbids_body(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

/// Reads one response (head and body) from `reader`.
pub fn read_response<R: BufRead + ?Sized>(
    reader: &mut R,
    limits: &HeadLimits,
) -> ProtocolResult<Response> {
    let head = read_head(reader, limits)?;
    let mut storage = vec![httparse::EMPTY_HEADER; limits.max_headers];
    let mut parsed = httparse::Response::new(&mut storage);
    if parsed.parse(&head).map_err(|err| head_error(err, limits))?.is_partial() {
        return Err(ProtocolError::UnexpectedEof("response head"));
    }

    let code = parsed.code.unwrap_or_default();
    let status = StatusCode::from_u16(code).map_err(|_| ProtocolError::InvalidStatus(code))?;
    let headers = header_map(parsed.headers)?;
    let http10 = parsed.version == Some(0);

    let mut close = has_token(&headers, &CONNECTION, "close")
        || (http10 && !has_token(&headers, &CONNECTION, "keep-alive"));

    let body = if forbids_body(status) {
        Vec::new()
    } else if has_token(&headers, &TRANSFER_ENCODING, "chunked") {
        read_chunked_body(reader, limits)?.0
    } else if let Some(length) = content_length(&headers)? {
        let mut body = Vec::new();
        (&mut *reader).take(length).read_to_end(&mut body)?;
        if body.len() as u64 != length {
            return Err(ProtocolError::UnexpectedEof("response body"));
        }
        body
    } else {
        // Delimited by end of stream; the connection cannot be reused.
        close = true;
        let mut body = Vec::new();
        reader.read_to_end(&mut body)?;
        body
    };

    Ok(Response {
        status,
        headers,
        body,
        close,
    })
}

fn content_length(headers: &HeaderMap) -> ProtocolResult<Option<u64>> {
    let mut length = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let invalid = || {
            ProtocolError::InvalidContentLength(String::from_utf8_lossy(value.as_bytes()).into())
        };
        let text = value.to_str().map_err(|_| invalid())?.trim();
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let parsed: u64 = text.parse().map_err(|_| invalid())?;
        match length {
            Some(prior) if prior != parsed => return Err(invalid()),
            _ => length = Some(parsed),
        }
    }
    Ok(length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::WRITE_HEAD_HEADER;
    use std::io::Cursor;

    fn read(input: &[u8]) -> ProtocolResult<Response> {
        read_response(&mut Cursor::new(input), &HeadLimits::default())
    }

    #[test]
    fn interim_continue() {
        let wire = b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 204 No Content\r\n\r\n";
        let mut input = Cursor::new(&wire[..]);
        let limits = HeadLimits::default();

        let first = read_response(&mut input, &limits).unwrap();
        assert!(first.is_continue());
        assert!(first.body.is_empty());
        assert!(!first.close);

        let second = read_response(&mut input, &limits).unwrap();
        assert_eq!(second.status, StatusCode::NO_CONTENT);
        assert_eq!(input.position(), wire.len() as u64);
    }

    #[test]
    fn content_length_body() {
        let response = read(
            b"HTTP/1.1 409 Conflict\r\nX-Write-Head: 2a\r\n\
              Content-Length: 14\r\n\r\nwrong position",
        )
        .unwrap();
        assert_eq!(response.status, StatusCode::CONFLICT);
        assert_eq!(response.body_text(), "wrong position");
        assert_eq!(response.headers.get("x-write-head").unwrap(), "2a");
        assert!(!response.close);
    }

    #[test]
    fn obs_text_values_are_kept() {
        let response = read(
            b"HTTP/1.1 409 Conflict\r\nX-Write-Head: 2a\r\nX-Note: caf\xe9\r\n\
              Content-Length: 6\r\n\r\nbehind",
        )
        .unwrap();
        assert_eq!(response.headers.get(WRITE_HEAD_HEADER).unwrap(), "2a");
        assert_eq!(response.headers.get("x-note").unwrap().as_bytes(), b"caf\xe9");
        assert_eq!(response.body_text(), "behind");
    }

    #[test]
    fn chunked_body() {
        let response = read(
            b"HTTP/1.1 500 Internal Server Error\r\nTransfer-Encoding: chunked\r\n\r\n\
              e\r\nquota exceeded\r\n0\r\nX-Extra: 1\r\n\r\n",
        )
        .unwrap();
        assert_eq!(response.body_text(), "quota exceeded");
        assert!(!response.close);
    }

    #[test]
    fn eof_delimited_body_closes() {
        let response = read(b"HTTP/1.1 400 Bad Request\r\n\r\nno length").unwrap();
        assert_eq!(response.body_text(), "no length");
        assert!(response.close);
    }

    #[test]
    fn close_signals() {
        let response = read(b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n").unwrap();
        assert!(response.close);

        let response = read(b"HTTP/1.0 204 No Content\r\n\r\n").unwrap();
        assert!(response.close);

        let response =
            read(b"HTTP/1.0 204 No Content\r\nConnection: keep-alive\r\n\r\n").unwrap();
        assert!(!response.close);
    }

    #[test]
    fn malformed_heads() {
        for input in [
            &b"HTTP/2 200 OK\r\n\r\n"[..],
            b"HTTP/1.1 20 OK\r\n\r\n",
            b"HTTP/1.1 abc OK\r\n\r\n",
            b"not a response\r\n\r\n",
        ] {
            assert!(
                matches!(read(input), Err(ProtocolError::MalformedHead(_))),
                "{:?}",
                String::from_utf8_lossy(input)
            );
        }

        let conflicting =
            b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\nContent-Length: 2\r\n\r\nab";
        assert!(matches!(
            read(conflicting),
            Err(ProtocolError::InvalidContentLength(_))
        ));
    }

    #[test]
    fn header_count_is_bounded() {
        let limits = HeadLimits {
            max_head_len: 1024,
            max_headers: 2,
        };
        let input = b"HTTP/1.1 204 No Content\r\nA: 1\r\nB: 2\r\nC: 3\r\n\r\n";
        let result = read_response(&mut Cursor::new(&input[..]), &limits);
        assert!(matches!(result, Err(ProtocolError::TooManyHeaders { limit: 2 })));
    }

    #[test]
    fn truncated_responses() {
        assert!(matches!(read(b""), Err(ProtocolError::UnexpectedEof(_))));
        assert!(matches!(
            read(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort"),
            Err(ProtocolError::UnexpectedEof(_))
        ));
    }
}
