//! Scripted peer behaviour.

use journal_repl_protocol::{HeaderMap, COMMIT_DELTA_HEADER, WRITE_HEAD_HEADER};

/// How the peer answers a request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeReply {
    /// `100 Continue`, then read the body and apply the commit reply.
    Continue,
    /// A final response refusing the replication.
    Reject {
        /// Response status.
        status: u16,
        /// Response body.
        body: String,
        /// Raw `X-Write-Head` value, sent verbatim.
        write_head: Option<String>,
        /// Send `Connection: close` and hang up.
        close: bool,
    },
    /// Never answer; hold the connection open until the client leaves.
    Silent,
    /// Answer with bytes that are not a response.
    Garbage,
    /// Close the connection without answering.
    HangUp,
}

/// How the peer answers the commit trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitReply {
    /// `204 No Content`.
    NoContent {
        /// Send `Connection: close` and hang up.
        close: bool,
    },
    /// Any other status with a body.
    Fail {
        /// Response status.
        status: u16,
        /// Response body.
        body: String,
        /// Send `Connection: close` and hang up.
        close: bool,
    },
    /// Never answer.
    Silent,
}

/// One scripted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Reply to the request head.
    pub handshake: HandshakeReply,
    /// Reply to the commit, if the handshake continued.
    pub commit: CommitReply,
    /// Extra fields added to the final response, values sent as raw bytes.
    pub extra_headers: Vec<(String, Vec<u8>)>,
}

impl Exchange {
    fn new(handshake: HandshakeReply, commit: CommitReply) -> Self {
        Self {
            handshake,
            commit,
            extra_headers: Vec::new(),
        }
    }

    /// Continue and commit with keep-alive.
    pub fn accept() -> Self {
        Self::new(HandshakeReply::Continue, CommitReply::NoContent { close: false })
    }

    /// Continue, then fail the commit with `status` and `body`.
    pub fn fail_commit(status: u16, body: impl Into<String>) -> Self {
        Self::new(
            HandshakeReply::Continue,
            CommitReply::Fail {
                status,
                body: body.into(),
                close: false,
            },
        )
    }

    /// Reject the handshake with `status` and `body`.
    pub fn reject(status: u16, body: impl Into<String>) -> Self {
        Self::new(
            HandshakeReply::Reject {
                status,
                body: body.into(),
                write_head: None,
                close: false,
            },
            CommitReply::NoContent { close: false },
        )
    }

    /// Never answer the handshake.
    pub fn silent_handshake() -> Self {
        Self::new(HandshakeReply::Silent, CommitReply::Silent)
    }

    /// Continue, then never answer the commit.
    pub fn silent_commit() -> Self {
        Self::new(HandshakeReply::Continue, CommitReply::Silent)
    }

    /// Answer the handshake with garbage.
    pub fn garbage() -> Self {
        Self::new(HandshakeReply::Garbage, CommitReply::Silent)
    }

    /// Close the connection as soon as the request head arrives.
    pub fn hang_up() -> Self {
        Self::new(HandshakeReply::HangUp, CommitReply::Silent)
    }

    /// Adds a header field to the final response of this exchange.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// Attaches a raw `X-Write-Head` value to a rejection.
    pub fn with_write_head(mut self, raw: impl Into<String>) -> Self {
        if let HandshakeReply::Reject { write_head, .. } = &mut self.handshake {
            *write_head = Some(raw.into());
        }
        self
    }

    /// Makes the final response of this exchange carry `Connection: close`.
    pub fn with_close(mut self) -> Self {
        match &mut self.handshake {
            HandshakeReply::Reject { close, .. } => *close = true,
            _ => match &mut self.commit {
                CommitReply::NoContent { close } | CommitReply::Fail { close, .. } => {
                    *close = true
                }
                CommitReply::Silent => {}
            },
        }
        self
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::accept()
    }
}

fn push_field(response: &mut Vec<u8>, name: &str, value: &[u8]) {
    response.extend_from_slice(name.as_bytes());
    response.extend_from_slice(b": ");
    response.extend_from_slice(value);
    response.extend_from_slice(b"\r\n");
}

fn final_response(
    exchange: &Exchange,
    status_line: &str,
    body: &str,
    write_head: Option<&str>,
    close: bool,
) -> Vec<u8> {
    let mut response = format!("HTTP/1.1 {status_line}\r\n").into_bytes();
    if !status_line.starts_with("204") {
        push_field(&mut response, "Content-Length", body.len().to_string().as_bytes());
    }
    if let Some(raw) = write_head {
        push_field(&mut response, WRITE_HEAD_HEADER, raw.as_bytes());
    }
    for (name, value) in &exchange.extra_headers {
        push_field(&mut response, name, value);
    }
    if close {
        push_field(&mut response, "Connection", b"close");
    }
    response.extend_from_slice(b"\r\n");
    response.extend_from_slice(body.as_bytes());
    response
}

/// Response refusing the handshake, if the exchange rejects it.
pub(crate) fn reject_response(exchange: &Exchange) -> Option<Vec<u8>> {
    match &exchange.handshake {
        HandshakeReply::Reject {
            status,
            body,
            write_head,
            close,
        } => Some(final_response(
            exchange,
            &format!("{status} Rejected"),
            body,
            write_head.as_deref(),
            *close,
        )),
        _ => None,
    }
}

/// Response to the commit trailer, unless the exchange stays silent.
pub(crate) fn commit_response(exchange: &Exchange) -> Option<Vec<u8>> {
    match &exchange.commit {
        CommitReply::NoContent { close } => {
            Some(final_response(exchange, "204 No Content", "", None, *close))
        }
        CommitReply::Fail {
            status,
            body,
            close,
        } => Some(final_response(exchange, &format!("{status} Failed"), body, None, *close)),
        CommitReply::Silent => None,
    }
}

/// What the peer saw during one transaction.
#[derive(Debug, Clone)]
pub struct RecordedTransaction {
    /// Zero-based index of the accepted connection that carried it.
    pub connection: usize,
    /// Request method.
    pub method: String,
    /// Request target (path and query).
    pub target: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Body bytes that arrived before the peer answered the head.
    pub early_body_bytes: usize,
    /// Decoded chunked payload.
    pub payload: Vec<u8>,
    /// Trailer fields after the terminal chunk.
    pub trailers: HeaderMap,
}

impl RecordedTransaction {
    /// Decodes a query parameter of the request target.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.target.split_once('?')?.1;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Request path without the query.
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    /// First value of a request header, if it is visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Raw `X-Commit-Delta` trailer.
    pub fn commit_delta(&self) -> Option<&str> {
        self.trailers
            .get(COMMIT_DELTA_HEADER)
            .and_then(|value| value.to_str().ok())
    }
}
