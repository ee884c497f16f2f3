//! Test fixtures.

use std::net::{SocketAddr, TcpListener};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Routes `tracing` output through the test harness. Safe to call repeatedly.
///
/// Verbosity follows `RUST_LOG`.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An address nothing listens on, for forcing dial failures.
pub fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind throwaway listener");
    listener.local_addr().expect("throwaway listener address")
}

/// `http://` URL for [`closed_addr`].
pub fn closed_url() -> Url {
    Url::parse(&format!("http://{}/", closed_addr())).expect("closed url")
}

/// A nested journal name, unique per `index`.
pub fn journal_name(index: usize) -> String {
    format!("pub/events/part-{index:03}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream;

    #[test]
    fn closed_addr_refuses() {
        assert!(TcpStream::connect(closed_addr()).is_err());
        assert_eq!(closed_url().scheme(), "http");
    }

    #[test]
    fn journal_names_are_stable() {
        assert_eq!(journal_name(7), "pub/events/part-007");
    }

    #[test]
    fn logging_init_is_idempotent() {
        init_test_logging();
        init_test_logging();
    }
}
