//! Common types and abstractions
//!
//! This module defines the core types used throughout the crate:
//! - Stream: unified async I/O abstraction
//! - Resolver: hostname resolution capability
//! - ConnectionId: integer handle identifying one socket

mod resolver;
mod stream;

pub use resolver::{connect_target, listen_target, Resolver, SystemResolver};
pub use stream::{AsyncReadWrite, IntoStream, Stream};

// Re-export error types from crate root
pub use crate::error::{Error, Result};

/// Integer handle identifying one listening or stream socket within the
/// registry.
///
/// IDs for `listen`/`connect` are caller-supplied and assumed
/// caller-unique; IDs for server-accepted connections are allocated from
/// a fixed base upward and never reused for the life of the process.
pub type ConnectionId = i32;
