//! Per-endpoint pools of idle connections.

use crate::config::ClientConfig;
use crate::connection::PooledConnection;
use crate::endpoint::Endpoint;
use crate::error::{ReplicateError, ReplicateResult};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use url::{Position, Url};

/// Bounded set of idle connections to one endpoint.
///
/// Backed by a bounded channel, so take and release never block and need
/// no external lock.
#[derive(Debug)]
pub struct IdlePool {
    base_url: String,
    capacity: usize,
    sender: Sender<PooledConnection>,
    receiver: Receiver<PooledConnection>,
}

impl IdlePool {
    fn new(base_url: String, capacity: usize) -> Self {
        let (sender, receiver) = channel::bounded(capacity);
        Self {
            base_url,
            capacity,
            sender,
            receiver,
        }
    }

    /// Base URL this pool serves.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Maximum number of idle connections.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Idle connections currently held.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true if no idle connection is held.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Takes an idle connection, if any.
    pub fn take(&self) -> Option<PooledConnection> {
        self.receiver.try_recv().ok()
    }

    /// Returns `conn` to the pool after clearing its read deadline.
    ///
    /// Returns false if the connection was dropped instead, because the pool
    /// is full or the deadline could not be cleared.
    pub fn release(&self, mut conn: PooledConnection) -> bool {
        if let Err(err) = conn.clear_read_deadline() {
            debug!(pool = %self.base_url, %err, "dropping connection: cannot clear read deadline");
            return false;
        }
        match self.sender.try_send(conn) {
            Ok(()) => {
                debug!(pool = %self.base_url, idle = self.len(), "connection returned to pool");
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                debug!(pool = %self.base_url, "pool full, closing connection");
                false
            }
        }
    }

    /// Takes an idle connection or dials a new one.
    ///
    /// A failed dial invalidates the endpoint's resolution before the error
    /// is returned.
    pub fn acquire(
        &self,
        endpoint: &dyn Endpoint,
        config: &ClientConfig,
    ) -> ReplicateResult<PooledConnection> {
        if let Some(conn) = self.take() {
            return Ok(conn);
        }

        let url = endpoint.resolve_url().map_err(ReplicateError::Resolve)?;
        debug!(pool = %self.base_url, resolved = %url, "dialing peer");

        PooledConnection::dial(&url, config.dial_timeout).map_err(|source| {
            endpoint.invalidate_resolution();
            let addr = url[Position::BeforeHost..Position::AfterPort].to_string();
            warn!(
                pool = %self.base_url,
                %addr,
                err = %source,
                "dial failed; resolution invalidated"
            );
            ReplicateError::Dial { addr, source }
        })
    }
}

/// Registry of idle pools keyed by endpoint base URL.
///
/// Construct one per process and hand it to every [`ReplicateClient`].
/// Clones share the same registry.
///
/// [`ReplicateClient`]: crate::ReplicateClient
#[derive(Debug, Clone, Default)]
pub struct PoolManager {
    inner: Arc<PoolManagerInner>,
}

#[derive(Debug, Default)]
struct PoolManagerInner {
    config: ClientConfig,
    pools: Mutex<HashMap<String, Arc<IdlePool>>>,
}

impl PoolManager {
    /// Creates an empty registry.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(PoolManagerInner {
                config,
                pools: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Configuration handed to clients.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns the pool for `base_url`, creating it on first use.
    ///
    /// The registry lock covers only this lookup.
    pub fn pool_for(&self, base_url: &Url) -> Arc<IdlePool> {
        let mut pools = self.inner.pools.lock();
        Arc::clone(pools.entry(base_url.as_str().to_string()).or_insert_with(|| {
            Arc::new(IdlePool::new(
                base_url.as_str().to_string(),
                self.inner.config.idle_pool_capacity,
            ))
        }))
    }

    /// Number of endpoints with a pool.
    pub fn pool_count(&self) -> usize {
        self.inner.pools.lock().len()
    }

    /// Takes or dials a connection to `endpoint`.
    pub fn acquire(&self, endpoint: &dyn Endpoint) -> ReplicateResult<PooledConnection> {
        self.pool_for(endpoint.base_url())
            .acquire(endpoint, &self.inner.config)
    }

    /// Returns a connection to `endpoint`'s pool. See [`IdlePool::release`].
    pub fn release(&self, endpoint: &dyn Endpoint, conn: PooledConnection) -> bool {
        self.pool_for(endpoint.base_url()).release(conn)
    }
}
