//! Error types for the replication wire format.

use std::io;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Underlying reader or writer failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A status line, request line or header block failed to parse.
    #[error("malformed message head: {0}")]
    MalformedHead(#[from] httparse::Error),

    /// The status code is outside 100..=999.
    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    /// A parsed header field is not a valid name or value.
    #[error("invalid header field {0:?}")]
    InvalidHeader(String),

    /// A message head exceeded the configured size.
    #[error("message head exceeds {limit} bytes")]
    HeaderTooLarge {
        /// Maximum head size in bytes.
        limit: usize,
    },

    /// The header section holds more fields than allowed.
    #[error("more than {limit} header fields")]
    TooManyHeaders {
        /// Maximum number of header fields.
        limit: usize,
    },

    /// A chunk-size line is not valid hex.
    #[error("invalid chunk size line: {0:?}")]
    InvalidChunkSize(String),

    /// `Content-Length` is missing digits or conflicting.
    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    /// A base-16 offset header failed to parse.
    #[error("invalid hex offset {value:?}: {reason}")]
    InvalidOffset {
        /// Raw header value.
        value: String,
        /// Parse failure.
        reason: String,
    },

    /// The stream ended in the middle of a message.
    #[error("unexpected end of stream while reading {0}")]
    UnexpectedEof(&'static str),

    /// A chunk was written after the terminal chunk.
    #[error("chunked body already finished")]
    ChunkedWriterFinished,
}

impl ProtocolError {
    /// Splits transport failures from content failures.
    ///
    /// A stream that ended mid-message comes back as an
    /// [`io::ErrorKind::UnexpectedEof`] error; anything the peer actually
    /// sent is returned unchanged in `Err`.
    pub fn into_io_error(self) -> Result<io::Error, ProtocolError> {
        match self {
            ProtocolError::Io(err) => Ok(err),
            ProtocolError::UnexpectedEof(context) => Ok(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("connection closed while reading {context}"),
            )),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_is_a_transport_failure() {
        let err = ProtocolError::from(io::Error::from(io::ErrorKind::BrokenPipe))
            .into_io_error()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        let err = ProtocolError::UnexpectedEof("status line").into_io_error().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(err.to_string().contains("status line"));

        let err = ProtocolError::from(httparse::Error::Version).into_io_error();
        assert!(matches!(err, Err(ProtocolError::MalformedHead(_))));
    }

    #[test]
    fn error_display() {
        let err = ProtocolError::InvalidOffset {
            value: "zz".into(),
            reason: "invalid digit found in string".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("zz"));
        assert!(msg.contains("invalid digit"));
    }
}
