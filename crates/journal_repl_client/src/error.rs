//! Error types for replication transactions.

use crate::transaction::TransactionState;
use journal_repl_protocol::ProtocolError;
use std::io;
use thiserror::Error;

/// Result type for replication operations.
pub type ReplicateResult<T> = Result<T, ReplicateError>;

/// Errors delivered by a replication transaction.
#[derive(Error, Debug)]
pub enum ReplicateError {
    /// The endpoint could not produce a dialable address.
    #[error("resolve error: {0}")]
    Resolve(String),

    /// Connecting to the peer failed. The endpoint's resolution was invalidated.
    #[error("dial {addr} failed: {source}")]
    Dial {
        /// Address that was dialed.
        addr: String,
        /// Connect error.
        #[source]
        source: io::Error,
    },

    /// Read, write or timeout on an established connection.
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    /// The peer sent bytes that are not a valid response.
    #[error("protocol error: {0}")]
    Protocol(#[source] ProtocolError),

    /// The peer refused the handshake.
    #[error("replication rejected ({status}): {message}")]
    Rejected {
        /// Response status.
        status: u16,
        /// Response body.
        message: String,
        /// Peer's write offset, when it reported one that parsed.
        write_head: Option<i64>,
    },

    /// The peer refused the commit.
    #[error("commit rejected ({status}): {message}")]
    CommitRejected {
        /// Response status.
        status: u16,
        /// Response body.
        message: String,
    },

    /// The writer was used in a state that does not allow the operation.
    #[error("cannot {operation} a transaction in state {from:?}")]
    InvalidState {
        /// State the transaction was in.
        from: TransactionState,
        /// Attempted operation.
        operation: &'static str,
    },

    /// The replication task ended without delivering a result.
    #[error("replication task ended without a result")]
    TaskLost,

    /// The replication task could not be started.
    #[error("failed to spawn replication task: {0}")]
    Spawn(#[source] io::Error),
}

impl ReplicateError {
    /// Peer's authoritative write offset from a rejected handshake.
    pub fn write_head(&self) -> Option<i64> {
        match self {
            ReplicateError::Rejected { write_head, .. } => *write_head,
            _ => None,
        }
    }

    /// Peer-supplied error text for rejections.
    pub fn peer_message(&self) -> Option<&str> {
        match self {
            ReplicateError::Rejected { message, .. }
            | ReplicateError::CommitRejected { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Returns true if the connection failed below the protocol level.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ReplicateError::Resolve(_)
                | ReplicateError::Dial { .. }
                | ReplicateError::Transport(_)
                | ReplicateError::Protocol(_)
        )
    }

    /// Returns true if the peer answered and said no.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ReplicateError::Rejected { .. } | ReplicateError::CommitRejected { .. }
        )
    }

    /// Returns true for misuse of the writer by the caller.
    pub fn is_programming_error(&self) -> bool {
        matches!(self, ReplicateError::InvalidState { .. })
    }
}

impl From<io::Error> for ReplicateError {
    fn from(err: io::Error) -> Self {
        ReplicateError::Transport(err)
    }
}

impl From<ProtocolError> for ReplicateError {
    fn from(err: ProtocolError) -> Self {
        match err.into_io_error() {
            Ok(err) => ReplicateError::Transport(err),
            Err(other) => ReplicateError::Protocol(other),
        }
    }
}
