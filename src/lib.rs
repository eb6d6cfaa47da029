//! sockmux - TCP/TLS connection multiplexer
//!
//! Manages an arbitrary number of concurrent plain and TLS-secured TCP
//! connections - outbound, listening and accepted - behind small integer
//! handles, and reports every socket lifecycle event (connect, accept,
//! data, close, error, secure-upgrade) to one external [`SocketEvents`]
//! listener.
//!
//! # Architecture (Layered)
//!
//! ```text
//! Caller / bridge
//! → SocketManager (facade: resolve address, enqueue command)
//! → Dispatcher (single serialized queue, owns the registry)
//! → Socket tasks (one per connection: read / write / upgrade)
//! → Session (TLS)
//! → Transport (TCP)
//! ```
//!
//! ## Core Principles
//!
//! - One task owns the registry; facade commands and transport
//!   completion events share a single serialized queue
//! - Capabilities (transport, resolver) abstracted via traits
//! - A TLS upgrade swaps the stream inside its socket task, never the ID
//! - Failures are scoped to one connection ID and reported through the
//!   listener; only address resolution fails synchronously
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── common/          # Core types: Stream, Resolver, ConnectionId
//! ├── transport/       # Transport layer: TCP
//! ├── session/         # Session layer: TLS handshakes
//! ├── manager/         # Registry, dispatcher, socket tasks, facade
//! ├── config.rs        # JSON-backed configuration
//! └── error.rs         # Unified error types
//! ```

// Core types
pub mod common;
pub mod error;

// Layered architecture
pub mod manager;
pub mod session;
pub mod transport;

// Supporting modules
pub mod config;

// Re-exports for convenience
pub use common::{ConnectionId, Resolver, Stream, SystemResolver};
pub use config::ManagerConfig;
pub use error::{Error, Result};
pub use manager::{SocketEvents, SocketManager, ACCEPTED_ID_BASE};
pub use session::{TlsConfig, TlsSession, TrustPolicy};
pub use transport::{TcpTransport, Transport, TransportListener};
