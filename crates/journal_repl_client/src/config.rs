//! Configuration for replication clients.

use journal_repl_protocol::{HeadLimits, IDLE_POOL_CAPACITY};
use std::time::Duration;

/// Configuration shared by every client created from one `PoolManager`.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Idle connections retained per endpoint.
    pub idle_pool_capacity: usize,
    /// How long to wait for `100 Continue` after sending the request head.
    pub continue_timeout: Duration,
    /// How long to wait for the commit response after sending the trailer.
    pub commit_timeout: Duration,
    /// Connect timeout. `None` leaves it to the operating system.
    pub dial_timeout: Option<Duration>,
    /// Bounds on response heads read from peers.
    pub head_limits: HeadLimits,
}

impl ClientConfig {
    /// Creates a configuration with protocol defaults.
    pub fn new() -> Self {
        Self {
            idle_pool_capacity: IDLE_POOL_CAPACITY,
            continue_timeout: Duration::from_secs(60),
            commit_timeout: Duration::from_secs(60),
            dial_timeout: None,
            head_limits: HeadLimits::default(),
        }
    }

    /// Sets the idle pool capacity per endpoint.
    pub fn with_idle_pool_capacity(mut self, capacity: usize) -> Self {
        self.idle_pool_capacity = capacity;
        self
    }

    /// Sets the handshake wait.
    pub fn with_continue_timeout(mut self, timeout: Duration) -> Self {
        self.continue_timeout = timeout;
        self
    }

    /// Sets the commit wait.
    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = Some(timeout);
        self
    }

    /// Sets response head limits.
    pub fn with_head_limits(mut self, limits: HeadLimits) -> Self {
        self.head_limits = limits;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
