//! # Journal Replication Protocol
//!
//! Wire format spoken between a broker replicating a journal write and the
//! peer that stores it.
//!
//! This crate provides:
//! - Header and method constants shared with the peer implementation
//! - Encoding of the `REPLICATE` request head and the commit trailer
//! - Chunked transfer framing (encode and decode)
//! - An HTTP/1.1 response reader for interim and final responses, built on
//!   `httparse` with `http` status and header types
//! - The signed base-16 offset codec used by `X-Write-Head` / `X-Commit-Delta`
//!
//! This is a pure protocol crate: all I/O goes through `std::io` traits and
//! no sockets are opened here.
//!
//! ## Exchange
//!
//! ```text
//! client                                   peer
//!   | REPLICATE /<journal>?... (head only)   |
//!   |--------------------------------------->|
//!   |                  100 Continue | 4xx/5xx|
//!   |<---------------------------------------|
//!   | chunk* , 0\r\n , X-Commit-Delta, \r\n  |
//!   |--------------------------------------->|
//!   |               204 No Content | error   |
//!   |<---------------------------------------|
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod chunked;
mod error;
mod headers;
mod offset;
mod request;
mod response;

pub use chunked::{read_chunked_body, ChunkedWriter};
pub use error::{ProtocolError, ProtocolResult};
pub use headers::{
    header_map, read_head, HeadLimits, COMMIT_DELTA_HEADER, FRAGMENT_LOCATION_HEADER,
    FRAGMENT_NAME_HEADER, IDLE_POOL_CAPACITY, NEW_SPOOL_PARAM, REPLICATE_METHOD,
    ROUTE_TOKEN_PARAM, WRITE_HEAD_HEADER, WRITE_HEAD_PARAM,
};
pub use offset::{format_hex_offset, parse_hex_offset};
pub use request::{encode_commit_trailer, ReplicateRequest, TERMINAL_CHUNK_AND_EMPTY_TRAILER};
pub use response::{read_response, Response};

pub use http::{HeaderMap, StatusCode};
