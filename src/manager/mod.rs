//! Socket manager
//!
//! External entry point of the multiplexer. Facade methods resolve
//! addresses (the only synchronous failure path), then hand work to the
//! dispatcher task over one serialized action queue. Methods may be
//! called from any task; only the dispatcher touches the registry.

mod dispatcher;
mod events;
mod registry;
mod socket;

pub use events::SocketEvents;
pub use registry::ACCEPTED_ID_BASE;

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tracing::debug;

use crate::common::{connect_target, listen_target, ConnectionId, Resolver, SystemResolver};
use crate::config::ManagerConfig;
use crate::error::Result;
use crate::session::{TlsConfig, TlsSession};
use crate::transport::{TcpTransport, Transport};

use self::dispatcher::{Action, Dispatcher};
use self::events::EventSink;

/// Connection multiplexer managing plain and TLS-secured TCP sockets
/// behind integer handles.
///
/// Caller-supplied IDs identify listen/connect sockets; accepted
/// connections receive allocated IDs from 5000 upward. Every lifecycle
/// event is delivered to the [`SocketEvents`] listener the manager was
/// built with.
pub struct SocketManager {
    actions: mpsc::UnboundedSender<Action>,
    resolver: Arc<dyn Resolver>,
}

impl SocketManager {
    /// Create a manager delivering events to `listener`.
    ///
    /// Only a weak reference is kept: the manager never extends the
    /// listener's lifetime, and events are discarded once it is gone.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(listener: Weak<dyn SocketEvents>, config: ManagerConfig) -> Self {
        Self::with_capabilities(
            listener,
            config,
            Arc::new(TcpTransport::new()),
            Arc::new(SystemResolver),
        )
    }

    /// Create a manager with explicit transport and resolver capabilities.
    pub fn with_capabilities(
        listener: Weak<dyn SocketEvents>,
        config: ManagerConfig,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        let tls = Arc::new(TlsSession::new(TlsConfig {
            trust_policy: config.trust_policy,
            alpn: config.alpn.clone(),
        }));
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(
            EventSink::new(listener),
            transport,
            tls,
            tx.clone(),
            config.read_buffer_size,
        );
        tokio::spawn(dispatcher.run(rx));
        Self { actions: tx, resolver }
    }

    /// Start listening on `host:port` under the caller-supplied `id`.
    /// An absent host binds the wildcard address.
    ///
    /// Fails synchronously when the host cannot be resolved; everything
    /// past resolution is reported through the listener:
    /// `on_connect(id, bound)` once listening, `on_connection` per
    /// acceptance, `on_close` on termination.
    pub async fn listen(&self, id: ConnectionId, host: Option<&str>, port: u16) -> Result<()> {
        let addr = listen_target(self.resolver.as_ref(), host, port).await?;
        debug!("[{}] listen {}", id, addr);
        let _ = self.actions.send(Action::Listen { id, addr });
        Ok(())
    }

    /// Connect to `host:port` under the caller-supplied `id`, optionally
    /// performing a TLS handshake as part of establishment. An absent
    /// host means loopback.
    ///
    /// Fails synchronously when the host cannot be resolved; the outcome
    /// is otherwise reported through the listener: `on_connect(id, addr)`
    /// on success, `on_error` on connect or handshake failure.
    pub async fn connect(
        &self,
        id: ConnectionId,
        host: Option<&str>,
        port: u16,
        use_tls: bool,
    ) -> Result<()> {
        let addr = connect_target(self.resolver.as_ref(), host, port).await?;
        // The hostname drives SNI and certificate identity; an absent
        // host degrades to the resolved IP
        let server_name = host
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| addr.ip().to_string());
        debug!("[{}] connect {} (tls: {})", id, addr, use_tls);
        let _ = self.actions.send(Action::Connect { id, addr, server_name, use_tls });
        Ok(())
    }

    /// Upgrade an open plaintext stream to TLS in place, preserving its
    /// ID. `on_complete` is invoked after `on_secure_connect` on
    /// success, and not at all on failure.
    ///
    /// Unknown and listening IDs are ignored without any callback.
    pub fn upgrade_to_secure(
        &self,
        id: ConnectionId,
        host: &str,
        port: u16,
        on_complete: impl FnOnce() + Send + 'static,
    ) {
        let _ = self.actions.send(Action::Upgrade {
            id,
            host: host.to_string(),
            port,
            on_complete: Box::new(on_complete),
        });
    }

    /// Queue bytes for writing on a stream socket. Unknown and listening
    /// IDs are silently ignored.
    pub fn write(&self, id: ConnectionId, data: Vec<u8>) {
        let _ = self.actions.send(Action::Write { id, data });
    }

    /// Close one socket. The listener receives `on_close(id, None)`;
    /// an unknown ID is reported through `on_error` instead.
    pub fn close(&self, id: ConnectionId) {
        let _ = self.actions.send(Action::Close { id });
    }

    /// Close every tracked socket. Operates on a snapshot of the
    /// registry taken before any close begins.
    pub fn close_all(&self) {
        let _ = self.actions.send(Action::CloseAll);
    }
}

impl Drop for SocketManager {
    fn drop(&mut self) {
        let _ = self.actions.send(Action::Shutdown);
    }
}
