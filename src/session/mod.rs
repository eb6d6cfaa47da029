//! Session Layer
//!
//! Responsibilities:
//! - TLS handshakes over established transport streams
//!
//! This layer transforms raw transport streams into secure streams,
//! either during initial connection establishment or as an in-place
//! upgrade of an open connection. It does NOT track connections or make
//! registration decisions.

mod tls;

pub use tls::{TlsConfig, TlsSession, TrustPolicy};
