//! Transport Layer
//!
//! Responsibilities:
//! - Establish lowest-level connections (TCP)
//! - NO encryption, NO framing, NO content inspection
//!
//! Addresses arrive already resolved; see [`crate::common::Resolver`].

mod tcp;

pub use tcp::TcpTransport;

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::common::{Result, Stream};

/// Transport trait for establishing raw connections
///
/// Implementations should ONLY handle connection establishment,
/// not encryption or protocol handling.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to a remote address
    async fn connect(&self, addr: SocketAddr) -> Result<Stream>;

    /// Create a listener bound to an address
    async fn bind(&self, addr: SocketAddr) -> Result<Box<dyn TransportListener>>;
}

/// Listener trait for accepting incoming connections
#[async_trait]
pub trait TransportListener: Send + Sync {
    /// Accept a new connection. The peer address is reported when the
    /// transport can resolve it.
    async fn accept(&self) -> Result<(Stream, Option<SocketAddr>)>;

    /// Get the local bound address
    fn local_addr(&self) -> Result<SocketAddr>;
}
