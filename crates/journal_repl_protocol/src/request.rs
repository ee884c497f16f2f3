//! The `REPLICATE` request head and commit trailer.

use crate::headers::{
    COMMIT_DELTA_HEADER, NEW_SPOOL_PARAM, REPLICATE_METHOD, ROUTE_TOKEN_PARAM, WRITE_HEAD_PARAM,
};
use crate::offset::format_hex_offset;
use url::{form_urlencoded, Position, Url};

/// Terminal empty chunk followed by an empty trailer section.
///
/// Sent after a rejected handshake so the half-open request body is closed
/// and the connection stays usable.
pub const TERMINAL_CHUNK_AND_EMPTY_TRAILER: &[u8] = b"0\r\n\r\n";

/// Parameters of one replication handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicateRequest {
    /// Journal identifier; becomes the request path.
    pub journal: String,
    /// Whether the peer must begin a new spool.
    pub new_spool: bool,
    /// Writer's expected write offset.
    pub write_head: i64,
    /// Opaque affinity token.
    pub route_token: String,
}

impl ReplicateRequest {
    /// Creates a request for `journal` at `write_head`.
    pub fn new(journal: impl Into<String>, write_head: i64) -> Self {
        Self {
            journal: journal.into(),
            new_spool: false,
            write_head,
            route_token: String::new(),
        }
    }

    /// Requests a new spool on the peer.
    pub fn with_new_spool(mut self, new_spool: bool) -> Self {
        self.new_spool = new_spool;
        self
    }

    /// Sets the routing token.
    pub fn with_route_token(mut self, token: impl Into<String>) -> Self {
        self.route_token = token.into();
        self
    }

    /// Query string, keys in sorted order. `writeHead` is decimal here.
    pub fn query(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair(NEW_SPOOL_PARAM, if self.new_spool { "true" } else { "false" })
            .append_pair(ROUTE_TOKEN_PARAM, &self.route_token)
            .append_pair(WRITE_HEAD_PARAM, &self.write_head.to_string())
            .finish()
    }

    /// Full request URL against an endpoint's base URL.
    pub fn url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        url.set_path(&format!("/{}", self.journal));
        url.set_query(Some(&self.query()));
        url.set_fragment(None);
        url
    }

    /// Serializes the request head only. The chunked body follows once the
    /// peer answers `100 Continue`.
    pub fn encode_head(&self, base: &Url) -> Vec<u8> {
        let url = self.url(base);
        let target = &url[Position::BeforePath..];
        let host = &url[Position::BeforeHost..Position::AfterPort];

        format!(
            "{REPLICATE_METHOD} {target} HTTP/1.1\r\n\
             Host: {host}\r\n\
             Transfer-Encoding: chunked\r\n\
             Expect: 100-continue\r\n\
             \r\n"
        )
        .into_bytes()
    }
}

/// Trailer section sent after the terminal chunk of a committed body.
pub fn encode_commit_trailer(delta: i64) -> String {
    format!("{COMMIT_DELTA_HEADER}: {}\r\n\r\n", format_hex_offset(delta))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://peer.example:8080/").unwrap()
    }

    #[test]
    fn query_is_sorted_and_decimal() {
        let request = ReplicateRequest::new("a/journal", -5)
            .with_new_spool(true)
            .with_route_token("10.0.0.1:8080");

        assert_eq!(
            request.query(),
            "newSpool=true&routeToken=10.0.0.1%3A8080&writeHead=-5"
        );
    }

    #[test]
    fn url_uses_journal_path() {
        let request = ReplicateRequest::new("a/journal/part-000", 1024);
        assert_eq!(
            request.url(&base()).as_str(),
            "http://peer.example:8080/a/journal/part-000?newSpool=false&routeToken=&writeHead=1024"
        );
    }

    #[test]
    fn head_declares_continue_and_chunked() {
        let request = ReplicateRequest::new("j", 7).with_route_token("tok");
        let head = String::from_utf8(request.encode_head(&base())).unwrap();

        assert!(head.starts_with(
            "REPLICATE /j?newSpool=false&routeToken=tok&writeHead=7 HTTP/1.1\r\n"
        ));
        assert!(head.contains("\r\nHost: peer.example:8080\r\n"));
        assert!(head.contains("\r\nTransfer-Encoding: chunked\r\n"));
        assert!(head.contains("\r\nExpect: 100-continue\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
        // Head only: nothing after the blank line.
        assert_eq!(head.matches("\r\n\r\n").count(), 1);
    }

    #[test]
    fn base_path_is_replaced() {
        let base = Url::parse("http://peer.example/some/prefix?x=1#frag").unwrap();
        let request = ReplicateRequest::new("j", 0);
        assert_eq!(
            request.url(&base).as_str(),
            "http://peer.example/j?newSpool=false&routeToken=&writeHead=0"
        );
    }

    #[test]
    fn commit_trailer_is_hex() {
        assert_eq!(encode_commit_trailer(42), "X-Commit-Delta: 2a\r\n\r\n");
        assert_eq!(encode_commit_trailer(-1), "X-Commit-Delta: -1\r\n\r\n");
        assert_eq!(TERMINAL_CHUNK_AND_EMPTY_TRAILER, b"0\r\n\r\n");
    }
}
