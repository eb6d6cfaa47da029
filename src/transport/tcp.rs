//! TCP Transport implementation

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};

use crate::common::{IntoStream, Result, Stream};

use super::{Transport, TransportListener};

/// TCP transport - raw TCP connections
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, addr: SocketAddr) -> Result<Stream> {
        let stream = TcpStream::connect(addr).await?;

        // Disable Nagle's algorithm for lower latency
        stream.set_nodelay(true)?;

        Ok(stream.into_stream())
    }

    async fn bind(&self, addr: SocketAddr) -> Result<Box<dyn TransportListener>> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Box::new(TcpListenerWrapper { listener }))
    }
}

/// Wrapper for TcpListener to implement TransportListener
struct TcpListenerWrapper {
    listener: TcpListener,
}

#[async_trait]
impl TransportListener for TcpListenerWrapper {
    async fn accept(&self) -> Result<(Stream, Option<SocketAddr>)> {
        let (stream, addr) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok((stream.into_stream(), Some(addr)))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_bind_connect_accept() {
        let transport = TcpTransport::new();
        let listener = transport.bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let bound = listener.local_addr().unwrap();
        assert_ne!(bound.port(), 0);

        let (client, accepted) = tokio::join!(transport.connect(bound), listener.accept());
        let mut client = client.unwrap();
        let (mut server, peer) = accepted.unwrap();
        assert!(peer.is_some());

        client.write_all(b"ping").await.unwrap();
        client.flush().await.unwrap();

        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let transport = TcpTransport::new();
        // Bind then drop to get a port with no listener behind it
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = transport.connect(addr).await;
        assert!(result.is_err());
    }
}
