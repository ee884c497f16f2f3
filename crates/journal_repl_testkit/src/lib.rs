//! # Journal Replication Testkit
//!
//! Test utilities for the replication client.
//!
//! This crate provides:
//! - [`SimulatedPeer`]: a loopback server speaking the peer half of the
//!   replication protocol, driven by a script of [`Exchange`]s
//! - Recording of every transaction the peer observed
//! - Property-based generators using proptest
//! - Test logging setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use journal_repl_testkit::prelude::*;
//!
//! let peer = SimulatedPeer::start();
//! peer.push(Exchange::reject(409, "wrong head").with_write_head("2a"));
//! // point a client at peer.base_url() ...
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod peer;
pub mod script;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::peer::*;
    pub use crate::script::*;
}

pub use fixtures::*;
pub use generators::*;
pub use peer::*;
pub use script::*;
