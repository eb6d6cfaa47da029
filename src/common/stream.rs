//! Stream abstraction
//!
//! Unified stream type for all layers to operate on. Plain TCP and
//! TLS-wrapped sockets are interchangeable behind this one type, which is
//! what lets a secure upgrade replace the transport of a connection
//! without touching its identity.

use tokio::io::{AsyncRead, AsyncWrite};

/// The core stream type used throughout the crate.
pub type Stream = Box<dyn AsyncReadWrite + Unpin + Send>;

/// Combined trait for async read + write
pub trait AsyncReadWrite: AsyncRead + AsyncWrite {}

impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

/// Trait for types that can be converted into a Stream
pub trait IntoStream {
    fn into_stream(self) -> Stream;
}

impl<T> IntoStream for T
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn into_stream(self) -> Stream {
        Box::new(self)
    }
}
