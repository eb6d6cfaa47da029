//! External event listener interface

use std::net::SocketAddr;
use std::sync::Weak;

use tracing::trace;

use crate::common::ConnectionId;

/// External observer receiving lifecycle, data and error events for all
/// connections of one manager.
///
/// Callbacks are delivered sequentially from the dispatcher task: no two
/// callbacks for the same manager ever run concurrently, and for a given
/// ID `on_connect` precedes any `on_data`/`on_close`/`on_error`.
/// Implementations must not block; a blocking callback stalls every
/// connection sharing the dispatcher.
pub trait SocketEvents: Send + Sync {
    /// A listen or connect operation completed. `addr` is the bound
    /// address for listeners and the remote address for outbound streams.
    fn on_connect(&self, id: ConnectionId, addr: SocketAddr);

    /// A listening socket accepted a connection, registered as `id`.
    fn on_connection(&self, server_id: ConnectionId, id: ConnectionId, remote: SocketAddr);

    /// Raw bytes received on a stream.
    fn on_data(&self, id: ConnectionId, data: Vec<u8>);

    /// The socket closed and was removed from the registry. `reason` is
    /// set when the transport reported one.
    fn on_close(&self, id: ConnectionId, reason: Option<String>);

    /// An operation on `id` failed. Errors are scoped to one connection;
    /// the manager keeps serving others.
    fn on_error(&self, id: ConnectionId, message: String);

    /// An in-place TLS upgrade completed.
    fn on_secure_connect(&self, id: ConnectionId);
}

/// Non-owning handle on the external listener.
///
/// The manager never extends the listener's lifetime; once the listener
/// is gone, delivery degrades to a silent no-op.
pub(crate) struct EventSink {
    listener: Weak<dyn SocketEvents>,
}

impl EventSink {
    pub fn new(listener: Weak<dyn SocketEvents>) -> Self {
        Self { listener }
    }

    /// Deliver one event, dropping it if the listener is gone.
    pub fn emit(&self, f: impl FnOnce(&dyn SocketEvents)) {
        match self.listener.upgrade() {
            Some(listener) => f(listener.as_ref()),
            None => trace!("listener dropped, event discarded"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counter(AtomicUsize);

    impl SocketEvents for Counter {
        fn on_connect(&self, _id: ConnectionId, _addr: SocketAddr) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn on_connection(&self, _server_id: ConnectionId, _id: ConnectionId, _remote: SocketAddr) {}
        fn on_data(&self, _id: ConnectionId, _data: Vec<u8>) {}
        fn on_close(&self, _id: ConnectionId, _reason: Option<String>) {}
        fn on_error(&self, _id: ConnectionId, _message: String) {}
        fn on_secure_connect(&self, _id: ConnectionId) {}
    }

    #[test]
    fn test_emit_reaches_live_listener() {
        let counter: Arc<Counter> = Arc::new(Counter(AtomicUsize::new(0)));
        let listener: Arc<dyn SocketEvents> = counter.clone();
        let sink = EventSink::new(Arc::downgrade(&listener));

        sink.emit(|l| l.on_connect(1, "127.0.0.1:80".parse().unwrap()));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_emit_after_drop_is_noop() {
        let listener: Arc<dyn SocketEvents> = Arc::new(Counter(AtomicUsize::new(0)));
        let sink = EventSink::new(Arc::downgrade(&listener));
        drop(listener);

        // Must neither panic nor deliver
        sink.emit(|l| l.on_connect(1, "127.0.0.1:80".parse().unwrap()));
    }
}
