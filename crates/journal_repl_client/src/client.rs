//! Client facade: one task per replication operation.

use crate::config::ClientConfig;
use crate::endpoint::Endpoint;
use crate::error::{ReplicateError, ReplicateResult};
use crate::pool::{IdlePool, PoolManager};
use crate::transaction::{self, ReplicaWriter};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, TryRecvError};
use journal_repl_protocol::ReplicateRequest;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Replicates journal writes to one peer.
///
/// Cheap to clone. Clients built from the same [`PoolManager`] for endpoints
/// with equal base URLs share idle connections.
#[derive(Clone)]
pub struct ReplicateClient {
    endpoint: Arc<dyn Endpoint>,
    pool: Arc<IdlePool>,
    config: ClientConfig,
}

impl fmt::Debug for ReplicateClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicateClient")
            .field("endpoint", &self.endpoint.base_url().as_str())
            .field("idle", &self.pool.len())
            .finish()
    }
}

impl ReplicateClient {
    /// Creates a client for `endpoint`, bound to its pool in `manager`.
    pub fn new(manager: &PoolManager, endpoint: Arc<dyn Endpoint>) -> Self {
        let pool = manager.pool_for(endpoint.base_url());
        Self {
            endpoint,
            pool,
            config: manager.config().clone(),
        }
    }

    /// The peer this client replicates to.
    pub fn endpoint(&self) -> &Arc<dyn Endpoint> {
        &self.endpoint
    }

    /// Idle pool shared with other clients for the same base URL.
    pub fn pool(&self) -> &Arc<IdlePool> {
        &self.pool
    }

    /// Starts a replication on its own thread and returns immediately.
    ///
    /// The returned handle resolves exactly once, to a writer ready for
    /// payload or to the error that ended the handshake. There is no
    /// cancellation: a started handshake runs until it completes or its
    /// deadline passes.
    pub fn replicate(&self, request: ReplicateRequest) -> PendingReplication {
        let (sender, receiver) = channel::bounded(1);
        let fallback = sender.clone();
        let journal = request.journal.clone();
        let client = self.clone();

        let spawned = thread::Builder::new()
            .name("journal-replicate".into())
            .spawn(move || {
                let result = client.replicate_blocking(&request);
                if sender.send(result).is_err() {
                    warn!(journal = %request.journal, "replication result dropped: nobody waiting");
                }
            });

        match spawned {
            Ok(_) => drop(fallback),
            Err(err) => {
                // The closure, and its sender, were dropped by the failed spawn.
                let _ = fallback.send(Err(ReplicateError::Spawn(err)));
            }
        }

        PendingReplication { journal, receiver }
    }

    /// Runs the handshake on the calling thread.
    pub fn replicate_blocking(&self, request: &ReplicateRequest) -> ReplicateResult<ReplicaWriter> {
        transaction::begin(self.endpoint.as_ref(), &self.pool, &self.config, request)
    }
}

/// Outcome of a replication started with [`ReplicateClient::replicate`].
#[derive(Debug)]
pub struct PendingReplication {
    journal: String,
    receiver: Receiver<ReplicateResult<ReplicaWriter>>,
}

impl PendingReplication {
    /// Journal being replicated.
    pub fn journal(&self) -> &str {
        &self.journal
    }

    /// Blocks until the handshake finishes.
    pub fn wait(self) -> ReplicateResult<ReplicaWriter> {
        self.receiver.recv().unwrap_or(Err(ReplicateError::TaskLost))
    }

    /// Blocks for at most `timeout`. `None` means the handshake is still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ReplicateResult<ReplicaWriter>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(ReplicateError::TaskLost)),
        }
    }

    /// Returns the outcome if it is already available.
    pub fn try_get(&self) -> Option<ReplicateResult<ReplicaWriter>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(ReplicateError::TaskLost)),
        }
    }
}
