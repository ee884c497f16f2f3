//! Replication transaction state machine.
//!
//! ```text
//! Init ──► AwaitingContinue ──► Streaming ──► Committing ──► Done
//!   │              │                │              │
//!   └──────────────┴────────────────┴──────────────┴──────► Failed
//! ```
//!
//! The handshake runs on the client's task and hands a [`ReplicaWriter`] to
//! the caller once the peer answers `100 Continue`. Streaming has no read
//! deadline; the handshake and commit waits do.

use crate::config::ClientConfig;
use crate::connection::{DeadlineReader, PooledConnection};
use crate::endpoint::Endpoint;
use crate::error::{ReplicateError, ReplicateResult};
use crate::pool::IdlePool;
use journal_repl_protocol::{
    encode_commit_trailer, parse_hex_offset, read_response, ChunkedWriter, HeadLimits,
    ProtocolResult, ReplicateRequest, Response, StatusCode, TERMINAL_CHUNK_AND_EMPTY_TRAILER,
    WRITE_HEAD_HEADER,
};
use std::io::{self, BufReader, BufWriter, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Phase of a replication transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Acquiring a connection.
    Init,
    /// Request head sent; waiting for the interim response.
    AwaitingContinue,
    /// Payload chunks may be written.
    Streaming,
    /// Terminal chunk and trailer sent; waiting for the final response.
    Committing,
    /// Commit accepted.
    Done,
    /// Ended with an error.
    Failed,
}

impl TransactionState {
    /// Returns true once the transaction can make no further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Done | TransactionState::Failed)
    }
}

/// Runs the handshake for `request` and returns a writer on `100 Continue`.
pub(crate) fn begin(
    endpoint: &dyn Endpoint,
    pool: &Arc<IdlePool>,
    config: &ClientConfig,
    request: &ReplicateRequest,
) -> ReplicateResult<ReplicaWriter> {
    let journal = request.journal.as_str();
    debug!(journal, state = ?TransactionState::Init, "starting replication");

    let mut conn = pool.acquire(endpoint, config)?;

    conn.writer.write_all(&request.encode_head(endpoint.base_url()))?;
    conn.writer.flush()?;

    debug!(journal, state = ?TransactionState::AwaitingContinue, "request head sent");
    conn.set_read_deadline(config.continue_timeout)?;
    let response = read_response(&mut conn.reader, &config.head_limits)?;

    if !response.is_continue() {
        return Err(reject(pool, conn, &response, journal));
    }
    conn.clear_read_deadline()?;

    debug!(journal, state = ?TransactionState::Streaming, "peer accepted replication");
    Ok(ReplicaWriter {
        journal: request.journal.clone(),
        pool: Arc::clone(pool),
        wire: Some(Wire {
            reader: conn.reader,
            chunker: ChunkedWriter::new(conn.writer),
        }),
        commit_timeout: config.commit_timeout,
        head_limits: config.head_limits,
        state: TransactionState::Streaming,
    })
}

/// Builds the rejection error and closes out the half-open request body.
fn reject(
    pool: &IdlePool,
    mut conn: PooledConnection,
    response: &Response,
    journal: &str,
) -> ReplicateError {
    let write_head = response
        .headers
        .get(WRITE_HEAD_HEADER)
        .map(|raw| String::from_utf8_lossy(raw.as_bytes()))
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| match parse_hex_offset(&raw) {
            Ok(head) => Some(head),
            Err(err) => {
                error!(journal, arg = %raw, %err, "failed to parse replica head");
                None
            }
        });

    let terminated = conn
        .writer
        .write_all(TERMINAL_CHUNK_AND_EMPTY_TRAILER)
        .and_then(|()| conn.writer.flush());
    match terminated {
        Ok(()) if !response.close => {
            pool.release(conn);
        }
        Ok(()) => debug!(journal, "peer closed connection after rejection"),
        Err(err) => debug!(journal, %err, "failed to terminate rejected request"),
    }

    debug!(
        journal,
        state = ?TransactionState::Failed,
        status = response.status.as_u16(),
        ?write_head,
        "replication rejected"
    );
    ReplicateError::Rejected {
        status: response.status.as_u16(),
        message: response.body_text(),
        write_head,
    }
}

/// Connection halves owned by a writer while it streams.
#[derive(Debug)]
struct Wire {
    reader: BufReader<DeadlineReader>,
    chunker: ChunkedWriter<BufWriter<TcpStream>>,
}

/// Write side of an accepted replication transaction.
///
/// Every write is framed as one chunk and goes straight to the connection's
/// buffered writer. The connection leaves the writer on the first commit,
/// so a transaction commits at most once. Dropping the writer without
/// committing closes the connection.
#[derive(Debug)]
pub struct ReplicaWriter {
    journal: String,
    pool: Arc<IdlePool>,
    wire: Option<Wire>,
    commit_timeout: Duration,
    head_limits: HeadLimits,
    state: TransactionState,
}

impl ReplicaWriter {
    /// Journal being replicated.
    pub fn journal(&self) -> &str {
        &self.journal
    }

    /// Current phase: `Streaming` until a write fails or the commit runs,
    /// then `Done` or `Failed`.
    pub fn state(&self) -> TransactionState {
        self.state
    }

    fn streaming_wire(&mut self, operation: &'static str) -> ReplicateResult<&mut Wire> {
        match (self.state, self.wire.as_mut()) {
            (TransactionState::Streaming, Some(wire)) => Ok(wire),
            (from, _) => Err(ReplicateError::InvalidState { from, operation }),
        }
    }

    fn fail(&mut self) {
        self.state = TransactionState::Failed;
        self.wire = None;
    }

    /// Sends `data` as one chunk.
    ///
    /// A transport error fails the transaction and closes the connection;
    /// later writes and the commit then return [`ReplicateError::InvalidState`].
    pub fn write(&mut self, data: &[u8]) -> ReplicateResult<usize> {
        let written = self.streaming_wire("write")?.chunker.write_chunk(data);
        written.map_err(|err| {
            self.fail();
            debug!(journal = %self.journal, %err, "replication write failed");
            ReplicateError::from(err)
        })
    }

    /// Ends the body, sends `delta` as the `X-Commit-Delta` trailer and waits
    /// for the peer's verdict.
    ///
    /// `204 No Content` is success and leaves the writer `Done`; any other
    /// status is returned as [`ReplicateError::CommitRejected`] carrying the
    /// response body and leaves it `Failed`. The connection is pooled unless
    /// the exchange broke at the transport level or the peer asked to close
    /// it. A second commit returns [`ReplicateError::InvalidState`].
    pub fn commit(&mut self, delta: i64) -> ReplicateResult<()> {
        self.streaming_wire("commit")?;
        let Some(wire) = self.wire.take() else {
            return Err(ReplicateError::InvalidState {
                from: self.state,
                operation: "commit",
            });
        };

        self.state = TransactionState::Committing;
        debug!(journal = %self.journal, state = ?self.state, delta, "committing");

        let outcome = finish_commit(
            wire,
            &self.pool,
            delta,
            self.commit_timeout,
            &self.head_limits,
        );
        self.state = if outcome.is_ok() {
            TransactionState::Done
        } else {
            TransactionState::Failed
        };
        debug!(journal = %self.journal, state = ?self.state, "replication finished");
        outcome
    }
}

fn finish_commit(
    mut wire: Wire,
    pool: &IdlePool,
    delta: i64,
    commit_timeout: Duration,
    head_limits: &HeadLimits,
) -> ReplicateResult<()> {
    send_commit(&mut wire.chunker, delta)?;
    let mut conn = PooledConnection {
        reader: wire.reader,
        writer: wire.chunker.into_inner(),
    };
    conn.set_read_deadline(commit_timeout)?;
    let response = read_response(&mut conn.reader, head_limits)?;

    let verdict = if response.status == StatusCode::NO_CONTENT {
        Ok(())
    } else {
        Err(ReplicateError::CommitRejected {
            status: response.status.as_u16(),
            message: response.body_text(),
        })
    };
    if !response.close {
        pool.release(conn);
    }
    verdict
}

fn send_commit(
    chunker: &mut ChunkedWriter<BufWriter<TcpStream>>,
    delta: i64,
) -> ProtocolResult<()> {
    chunker.finish()?;
    let writer = chunker.get_mut();
    writer.write_all(encode_commit_trailer(delta).as_bytes())?;
    writer.flush()?;
    Ok(())
}

impl Write for ReplicaWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ReplicaWriter::write(self, buf).map_err(|err| match err {
            ReplicateError::Transport(err) => err,
            other => io::Error::new(io::ErrorKind::Other, other),
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        let flushed = self
            .streaming_wire("flush")
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?
            .chunker
            .flush();
        flushed.map_err(|err| {
            self.fail();
            err
        })
    }
}
