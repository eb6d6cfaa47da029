//! Hostname resolution capability
//!
//! Resolution happens before the transport is touched: `listen` and
//! `connect` fail synchronously when the host cannot be resolved, and
//! everything after that point is reported through the event listener.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use tokio::net::lookup_host;

use crate::error::{Error, Result};

/// Resolves a hostname to a socket address.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `host:port` to a single address. The first resolved
    /// address wins.
    async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr>;
}

/// System resolver backed by the runtime's getaddrinfo lookup
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> Result<SocketAddr> {
        let mut addrs = lookup_host((host, port))
            .await
            .map_err(|e| Error::AddressResolution(format!("{}: {}", host, e)))?;
        addrs
            .next()
            .ok_or_else(|| Error::AddressResolution(format!("{}: no addresses", host)))
    }
}

/// Target of a `listen` call. An absent or empty host binds the wildcard
/// address.
pub async fn listen_target(
    resolver: &dyn Resolver,
    host: Option<&str>,
    port: u16,
) -> Result<SocketAddr> {
    match host {
        Some(h) if !h.is_empty() => resolver.resolve(h, port).await,
        _ => Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)),
    }
}

/// Target of a `connect` call. An absent or empty host means loopback.
pub async fn connect_target(
    resolver: &dyn Resolver,
    host: Option<&str>,
    port: u16,
) -> Result<SocketAddr> {
    match host {
        Some(h) if !h.is_empty() => resolver.resolve(h, port).await,
        _ => Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)),
    }
}
