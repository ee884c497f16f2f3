//! Peer endpoints.
//!
//! Resolution of a peer's base URL to a dialable address belongs to the
//! discovery layer. This module only defines the seam.

use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

/// A replication peer.
///
/// Pools are keyed by [`Endpoint::base_url`], so every client pointing at
/// the same base URL shares idle connections.
pub trait Endpoint: Send + Sync {
    /// Identity of the peer.
    fn base_url(&self) -> &Url;

    /// Resolves the peer to a URL whose host and port can be dialed.
    fn resolve_url(&self) -> Result<Url, String>;

    /// Drops any cached resolution after a failed dial. Fire-and-forget.
    fn invalidate_resolution(&self);
}

/// An endpoint with a fixed resolution.
#[derive(Debug)]
pub struct StaticEndpoint {
    base_url: Url,
    resolved: Url,
    invalidations: AtomicU64,
}

impl StaticEndpoint {
    /// Creates an endpoint that dials its own base URL.
    pub fn new(base_url: Url) -> Self {
        Self::with_resolution(base_url.clone(), base_url)
    }

    /// Parses `base_url` and creates an endpoint that dials it.
    pub fn parse(base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Url::parse(base_url)?))
    }

    /// Creates an endpoint identified by `base_url` that dials `resolved`.
    pub fn with_resolution(base_url: Url, resolved: Url) -> Self {
        Self {
            base_url,
            resolved,
            invalidations: AtomicU64::new(0),
        }
    }

    /// Number of times the resolution was invalidated.
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::SeqCst)
    }
}

impl Endpoint for StaticEndpoint {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn resolve_url(&self) -> Result<Url, String> {
        Ok(self.resolved.clone())
    }

    fn invalidate_resolution(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}
