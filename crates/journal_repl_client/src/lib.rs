//! # Journal Replication Client
//!
//! Client half of the journal replication protocol: a broker that accepted
//! a write forwards it to a peer and waits for a durable commit.
//!
//! This crate provides:
//! - Pool Manager: per-endpoint bounded pools of idle connections
//! - Replication transaction state machine
//!   (init → awaiting continue → streaming → committing → done | failed)
//! - Client facade that runs each transaction on its own thread
//! - Conflict signaling: the peer's `X-Write-Head` on a rejected handshake
//!
//! ## Usage
//!
//! ```rust,no_run
//! use journal_repl_client::{PoolManager, ReplicateClient, ReplicateRequest, StaticEndpoint};
//! use std::io::Write;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pools = PoolManager::default();
//! let endpoint = Arc::new(StaticEndpoint::parse("http://peer-1:8081/")?);
//! let client = ReplicateClient::new(&pools, endpoint);
//!
//! let pending = client.replicate(ReplicateRequest::new("logs/part-000", 1024));
//! match pending.wait() {
//!     Ok(mut writer) => {
//!         writer.write_all(b"payload")?;
//!         writer.commit(7)?;
//!     }
//!     Err(err) => {
//!         if let Some(head) = err.write_head() {
//!             eprintln!("peer is at offset {head}");
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Invariants
//!
//! - A pooled connection is idle and carries no read deadline
//! - A pool never holds more than its capacity; surplus connections are closed
//! - A connection that saw a transport error is never pooled
//! - Every submitted operation delivers exactly one result
//! - No payload is sent before `100 Continue`; the trailer follows the terminal chunk
//!
//! Retries, backoff, cancellation and conflict resolution are left to the caller.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod client;
mod config;
mod connection;
mod endpoint;
mod error;
mod pool;
mod transaction;

pub use client::{PendingReplication, ReplicateClient};
pub use config::ClientConfig;
pub use connection::PooledConnection;
pub use endpoint::{Endpoint, StaticEndpoint};
pub use error::{ReplicateError, ReplicateResult};
pub use journal_repl_protocol::ReplicateRequest;
pub use pool::{IdlePool, PoolManager};
pub use transaction::{ReplicaWriter, TransactionState};
