//! Header constants and message-head reading.
//!
//! Heads are read byte-wise up to the blank line and handed to `httparse`;
//! header values may carry obs-text and are never required to be UTF-8.

use crate::error::{ProtocolError, ProtocolResult};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use std::io::{BufRead, Read};

/// Request method of a replication transaction.
pub const REPLICATE_METHOD: &str = "REPLICATE";

/// Trailer carrying the number of bytes committed by the transaction (hex).
pub const COMMIT_DELTA_HEADER: &str = "X-Commit-Delta";
/// Reserved for peer-supplied fragment names. Not interpreted by the client.
pub const FRAGMENT_NAME_HEADER: &str = "X-Fragment-Name";
/// Reserved for peer-supplied fragment locations. Not interpreted by the client.
pub const FRAGMENT_LOCATION_HEADER: &str = "X-Fragment-Location";
/// Peer's authoritative write offset on a rejected handshake (hex).
pub const WRITE_HEAD_HEADER: &str = "X-Write-Head";

/// Query parameter: whether the peer must start a new spool.
pub const NEW_SPOOL_PARAM: &str = "newSpool";
/// Query parameter: writer's expected write offset (decimal).
pub const WRITE_HEAD_PARAM: &str = "writeHead";
/// Query parameter: opaque request-affinity token.
pub const ROUTE_TOKEN_PARAM: &str = "routeToken";

/// Default number of idle connections retained per endpoint.
pub const IDLE_POOL_CAPACITY: usize = 6;

/// Bounds applied while reading a message head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadLimits {
    /// Largest accepted head (start line, fields and blank line) or chunk-size line.
    pub max_head_len: usize,
    /// Most header (or trailer) fields accepted in one block.
    pub max_headers: usize,
}

impl Default for HeadLimits {
    fn default() -> Self {
        Self {
            max_head_len: 64 * 1024,
            max_headers: 128,
        }
    }
}

/// Reads one LF-terminated line of at most `limit` bytes, terminator included.
pub(crate) fn read_line<R: BufRead + ?Sized>(
    reader: &mut R,
    limit: usize,
    context: &'static str,
) -> ProtocolResult<Vec<u8>> {
    let mut line = Vec::new();
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    (&mut *reader).take(cap).read_until(b'\n', &mut line)?;

    if line.last() == Some(&b'\n') && line.len() <= limit {
        Ok(line)
    } else if line.len() > limit {
        Err(ProtocolError::HeaderTooLarge { limit })
    } else {
        Err(ProtocolError::UnexpectedEof(context))
    }
}

pub(crate) fn is_blank(line: &[u8]) -> bool {
    line == b"\r\n" || line == b"\n"
}

/// Reads a message head up to and including the blank line that ends it.
pub fn read_head<R: BufRead + ?Sized>(
    reader: &mut R,
    limits: &HeadLimits,
) -> ProtocolResult<Vec<u8>> {
    let mut head = Vec::new();
    loop {
        let remaining = limits.max_head_len.saturating_sub(head.len());
        let line = read_line(reader, remaining, "message head").map_err(|err| match err {
            ProtocolError::HeaderTooLarge { .. } => ProtocolError::HeaderTooLarge {
                limit: limits.max_head_len,
            },
            other => other,
        })?;
        head.extend_from_slice(&line);
        if is_blank(&line) {
            return Ok(head);
        }
    }
}

/// Maps an `httparse` failure, reporting the configured field limit.
pub(crate) fn head_error(err: httparse::Error, limits: &HeadLimits) -> ProtocolError {
    match err {
        httparse::Error::TooManyHeaders => ProtocolError::TooManyHeaders {
            limit: limits.max_headers,
        },
        other => ProtocolError::MalformedHead(other),
    }
}

/// Copies parsed fields into a [`HeaderMap`], keeping repeated names.
pub fn header_map(fields: &[httparse::Header<'_>]) -> ProtocolResult<HeaderMap> {
    let mut map = HeaderMap::with_capacity(fields.len());
    for field in fields {
        let invalid = || ProtocolError::InvalidHeader(field.name.to_string());
        let name = HeaderName::from_bytes(field.name.as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_bytes(field.value).map_err(|_| invalid())?;
        map.append(name, value);
    }
    Ok(map)
}

/// Parses a trailer section read by [`read_head`].
pub(crate) fn parse_trailers(block: &[u8], limits: &HeadLimits) -> ProtocolResult<HeaderMap> {
    let mut storage = vec![httparse::EMPTY_HEADER; limits.max_headers];
    match httparse::parse_headers(block, &mut storage).map_err(|err| head_error(err, limits))? {
        httparse::Status::Complete((_, fields)) => header_map(fields),
        httparse::Status::Partial => Err(ProtocolError::UnexpectedEof("trailer section")),
    }
}

/// Returns true if any value of `name`, read as a comma-separated list,
/// holds `token` (ASCII case-insensitive).
pub(crate) fn has_token(headers: &HeaderMap, name: &HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| item.trim().eq_ignore_ascii_case(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONNECTION;
    use std::io::Cursor;

    #[test]
    fn wire_constants_are_stable() {
        assert_eq!(REPLICATE_METHOD, "REPLICATE");
        assert_eq!(COMMIT_DELTA_HEADER, "X-Commit-Delta");
        assert_eq!(FRAGMENT_NAME_HEADER, "X-Fragment-Name");
        assert_eq!(FRAGMENT_LOCATION_HEADER, "X-Fragment-Location");
        assert_eq!(WRITE_HEAD_HEADER, "X-Write-Head");
        assert_eq!(IDLE_POOL_CAPACITY, 6);
    }

    #[test]
    fn lookup_ignores_case() {
        let fields = [
            httparse::Header {
                name: "x-write-head",
                value: b"2a",
            },
            httparse::Header {
                name: "Connection",
                value: b"keep-alive, Close",
            },
        ];
        let headers = header_map(&fields).unwrap();

        assert_eq!(headers.get(WRITE_HEAD_HEADER).unwrap(), "2a");
        assert!(has_token(&headers, &CONNECTION, "close"));
        assert!(!has_token(&headers, &CONNECTION, "upgrade"));
        assert!(headers.get("missing").is_none());
    }

    #[test]
    fn head_stops_at_blank_line() {
        let mut input = Cursor::new(&b"HTTP/1.1 204 No Content\r\nX-A: 1\r\n\r\nrest"[..]);
        let head = read_head(&mut input, &HeadLimits::default()).unwrap();

        assert_eq!(head, b"HTTP/1.1 204 No Content\r\nX-A: 1\r\n\r\n");
        assert_eq!(input.position(), 35);
    }

    #[test]
    fn head_size_is_bounded() {
        let limits = HeadLimits {
            max_head_len: 16,
            max_headers: 2,
        };
        let long = format!("X-Long: {}\r\n\r\n", "a".repeat(64));
        let result = read_head(&mut Cursor::new(long.as_bytes()), &limits);
        assert!(matches!(result, Err(ProtocolError::HeaderTooLarge { limit: 16 })));

        let split = "X-A: 123456\r\nX-B: 123456\r\n\r\n";
        let result = read_head(&mut Cursor::new(split.as_bytes()), &limits);
        assert!(matches!(result, Err(ProtocolError::HeaderTooLarge { limit: 16 })));
    }

    #[test]
    fn truncated_head_is_eof() {
        let mut input = Cursor::new(&b"HTTP/1.1 100 Continue\r\n"[..]);
        let result = read_head(&mut input, &HeadLimits::default());
        assert!(matches!(result, Err(ProtocolError::UnexpectedEof(_))));
    }

    #[test]
    fn trailers_parse_and_count() {
        let limits = HeadLimits {
            max_head_len: 1024,
            max_headers: 1,
        };
        let trailers = parse_trailers(b"X-Commit-Delta: 2a\r\n\r\n", &limits).unwrap();
        assert_eq!(trailers.get(COMMIT_DELTA_HEADER).unwrap(), "2a");
        assert!(parse_trailers(b"\r\n", &limits).unwrap().is_empty());

        let result = parse_trailers(b"A: 1\r\nB: 2\r\n\r\n", &limits);
        assert!(matches!(result, Err(ProtocolError::TooManyHeaders { limit: 1 })));
    }
}
