//! Dispatcher - the serialized event loop
//!
//! One task consumes a single queue carrying both facade commands and
//! transport completion events, owns the registry, and is the only
//! invoker of the external listener. That serialization is the whole
//! concurrency story: nothing else can reach the registry, so no lock
//! guards it, and listener callbacks never overlap.
//!
//! ```text
//! facade ──┐
//!          ├─> action queue ─> Dispatcher ─> SocketEvents
//! tasks ───┘        │              │
//!   ^               │           Registry
//!   └── spawn ──────┘
//! ```
//!
//! Anything that could block (bind, connect, handshake, read, write)
//! runs in a spawned task and reports back through the queue.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::common::{ConnectionId, Result, Stream};
use crate::error::Error;
use crate::session::TlsSession;
use crate::transport::{Transport, TransportListener};

use super::events::EventSink;
use super::registry::{Registry, SocketEntry, SocketRole};
use super::socket::{self, SocketCtrl};

/// Facade commands and task completion events, one serialized queue.
pub(crate) enum Action {
    // Commands from the facade
    Listen {
        id: ConnectionId,
        addr: SocketAddr,
    },
    Connect {
        id: ConnectionId,
        addr: SocketAddr,
        server_name: String,
        use_tls: bool,
    },
    Upgrade {
        id: ConnectionId,
        host: String,
        port: u16,
        on_complete: Box<dyn FnOnce() + Send>,
    },
    Write {
        id: ConnectionId,
        data: Vec<u8>,
    },
    Close {
        id: ConnectionId,
    },
    CloseAll,
    Shutdown,

    // Completion events from spawned tasks
    ListenDone {
        id: ConnectionId,
        result: Result<(SocketAddr, Box<dyn TransportListener>)>,
    },
    ConnectDone {
        id: ConnectionId,
        addr: SocketAddr,
        secure: bool,
        result: Result<Stream>,
    },
    Accepted {
        server_id: ConnectionId,
        generation: u64,
        stream: Stream,
        peer: Option<SocketAddr>,
    },
    ListenerEnded {
        id: ConnectionId,
        generation: u64,
        reason: Option<String>,
    },
    Data {
        id: ConnectionId,
        generation: u64,
        data: Vec<u8>,
    },
    SocketError {
        id: ConnectionId,
        generation: u64,
        message: String,
    },
    SocketClosed {
        id: ConnectionId,
        generation: u64,
        reason: Option<String>,
    },
    Upgraded {
        id: ConnectionId,
        generation: u64,
        result: std::result::Result<(), String>,
    },
}

pub(crate) struct Dispatcher {
    registry: Registry,
    events: EventSink,
    transport: Arc<dyn Transport>,
    tls: Arc<TlsSession>,
    /// Handed to spawned tasks so completions land on the same queue
    actions: mpsc::UnboundedSender<Action>,
    next_generation: u64,
    read_buffer_size: usize,
}

impl Dispatcher {
    pub fn new(
        events: EventSink,
        transport: Arc<dyn Transport>,
        tls: Arc<TlsSession>,
        actions: mpsc::UnboundedSender<Action>,
        read_buffer_size: usize,
    ) -> Self {
        Self {
            registry: Registry::new(),
            events,
            transport,
            tls,
            actions,
            next_generation: 0,
            read_buffer_size,
        }
    }

    /// Consume the action queue until shutdown.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Action>) {
        while let Some(action) = rx.recv().await {
            if matches!(action, Action::Shutdown) {
                break;
            }
            self.handle(action);
        }
        // Dropping the registry drops every ctrl sender, which winds the
        // socket tasks down
        debug!("dispatcher stopped");
    }

    fn handle(&mut self, action: Action) {
        match action {
            Action::Listen { id, addr } => self.handle_listen(id, addr),
            Action::Connect { id, addr, server_name, use_tls } => {
                self.handle_connect(id, addr, server_name, use_tls)
            }
            Action::Upgrade { id, host, port, on_complete } => {
                self.handle_upgrade(id, host, port, on_complete)
            }
            Action::Write { id, data } => self.handle_write(id, data),
            Action::Close { id } => self.handle_close(id),
            Action::CloseAll => self.handle_close_all(),
            Action::Shutdown => {}
            Action::ListenDone { id, result } => self.handle_listen_done(id, result),
            Action::ConnectDone { id, addr, secure, result } => {
                self.handle_connect_done(id, addr, secure, result)
            }
            Action::Accepted { server_id, generation, stream, peer } => {
                self.handle_accepted(server_id, generation, stream, peer)
            }
            Action::ListenerEnded { id, generation, reason } => {
                self.handle_listener_ended(id, generation, reason)
            }
            Action::Data { id, generation, data } => self.handle_data(id, generation, data),
            Action::SocketError { id, generation, message } => {
                self.handle_socket_error(id, generation, message)
            }
            Action::SocketClosed { id, generation, reason } => {
                self.handle_socket_closed(id, generation, reason)
            }
            Action::Upgraded { id, generation, result } => {
                self.handle_upgraded(id, generation, result)
            }
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    // ========================================================================
    // Listen / accept
    // ========================================================================

    fn handle_listen(&mut self, id: ConnectionId, addr: SocketAddr) {
        let transport = self.transport.clone();
        let actions = self.actions.clone();
        tokio::spawn(async move {
            let result = async {
                let listener = transport.bind(addr).await?;
                let bound = listener.local_addr()?;
                Ok((bound, listener))
            }
            .await;
            let _ = actions.send(Action::ListenDone { id, result });
        });
    }

    fn handle_listen_done(
        &mut self,
        id: ConnectionId,
        result: Result<(SocketAddr, Box<dyn TransportListener>)>,
    ) {
        match result {
            Ok((bound, listener)) => {
                let generation = self.next_generation();
                let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
                self.registry.put(id, SocketEntry::listener(generation, ctrl_tx, bound));
                tokio::spawn(socket::run_listener(
                    id,
                    generation,
                    listener,
                    ctrl_rx,
                    self.actions.clone(),
                ));
                info!("[{}] listening on {}", id, bound);
                self.events.emit(|l| l.on_connect(id, bound));
            }
            Err(e) => {
                // Bind failure surfaces as listener termination
                warn!("[{}] listen failed: {}", id, e);
                self.events.emit(|l| l.on_close(id, Some(e.to_string())));
            }
        }
    }

    fn handle_accepted(
        &mut self,
        server_id: ConnectionId,
        generation: u64,
        stream: Stream,
        peer: Option<SocketAddr>,
    ) {
        // Listener may have closed while the acceptance was in flight;
        // dropping the stream closes it
        if !self.generation_matches(server_id, generation) {
            return;
        }
        let bound = self.registry.get(server_id).and_then(|e| e.local_addr);
        let Some(remote) = peer.or(bound) else {
            warn!("[{}] accepted connection with no address, dropped", server_id);
            return;
        };

        let id = self.registry.allocate_accepted_id();
        let generation = self.next_generation();
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        self.registry.put(id, SocketEntry::stream(generation, ctrl_tx, false));
        tokio::spawn(socket::run_stream(
            id,
            generation,
            stream,
            ctrl_rx,
            self.actions.clone(),
            self.tls.clone(),
            self.read_buffer_size,
        ));
        debug!("[{}] accepted {} as [{}]", server_id, remote, id);
        self.events.emit(|l| l.on_connection(server_id, id, remote));
    }

    fn handle_listener_ended(
        &mut self,
        id: ConnectionId,
        generation: u64,
        reason: Option<String>,
    ) {
        if !self.generation_matches(id, generation) {
            return;
        }
        self.registry.remove(id);
        warn!("[{}] listener ended: {:?}", id, reason);
        self.events.emit(|l| l.on_close(id, reason));
    }

    /// A stale generation means the ID was closed (or closed and reused)
    /// after the event was emitted; acting on it would resurrect a dead
    /// connection or double-notify.
    fn generation_matches(&self, id: ConnectionId, generation: u64) -> bool {
        self.registry
            .get(id)
            .map_or(false, |entry| entry.generation == generation)
    }

    // ========================================================================
    // Connect
    // ========================================================================

    fn handle_connect(
        &mut self,
        id: ConnectionId,
        addr: SocketAddr,
        server_name: String,
        use_tls: bool,
    ) {
        let transport = self.transport.clone();
        let tls = self.tls.clone();
        let actions = self.actions.clone();
        tokio::spawn(async move {
            let result = async {
                let stream = transport.connect(addr).await?;
                if use_tls {
                    tls.wrap_client(stream, &server_name, addr.port()).await
                } else {
                    Ok(stream)
                }
            }
            .await;
            let _ = actions.send(Action::ConnectDone { id, addr, secure: use_tls, result });
        });
    }

    fn handle_connect_done(
        &mut self,
        id: ConnectionId,
        addr: SocketAddr,
        secure: bool,
        result: Result<Stream>,
    ) {
        match result {
            Ok(stream) => {
                let generation = self.next_generation();
                let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
                self.registry.put(id, SocketEntry::stream(generation, ctrl_tx, secure));
                tokio::spawn(socket::run_stream(
                    id,
                    generation,
                    stream,
                    ctrl_rx,
                    self.actions.clone(),
                    self.tls.clone(),
                    self.read_buffer_size,
                ));
                info!("[{}] connected to {} (secure: {})", id, addr, secure);
                self.events.emit(|l| l.on_connect(id, addr));
            }
            Err(e) => {
                // Nothing was registered; the internal close path has
                // nothing to remove, so the failure surfaces exactly one
                // error event
                warn!("[{}] connect to {} failed: {}", id, addr, e);
                self.events.emit(|l| l.on_error(id, format!("unable to open socket: {}", e)));
                self.close_entry(id);
            }
        }
    }

    // ========================================================================
    // Stream events
    // ========================================================================

    fn handle_data(&mut self, id: ConnectionId, generation: u64, data: Vec<u8>) {
        if self.generation_matches(id, generation) {
            self.events.emit(|l| l.on_data(id, data));
        }
    }

    fn handle_socket_error(&mut self, id: ConnectionId, generation: u64, message: String) {
        if self.generation_matches(id, generation) {
            self.events.emit(|l| l.on_error(id, message));
        }
    }

    fn handle_socket_closed(&mut self, id: ConnectionId, generation: u64, reason: Option<String>) {
        if !self.generation_matches(id, generation) {
            return;
        }
        self.registry.remove(id);
        debug!("[{}] closed", id);
        self.events.emit(|l| l.on_close(id, reason));
    }

    // ========================================================================
    // Upgrade
    // ========================================================================

    fn handle_upgrade(
        &mut self,
        id: ConnectionId,
        host: String,
        port: u16,
        on_complete: Box<dyn FnOnce() + Send>,
    ) {
        match self.registry.get_mut(id) {
            Some(entry) if entry.role == SocketRole::Stream => {
                entry.pending_upgrade = Some(on_complete);
                let _ = entry.ctrl.send(SocketCtrl::Upgrade { host, port });
            }
            // Unknown and listener IDs are ignored without any callback
            _ => debug!("[{}] upgrade requested for unknown or non-stream socket, ignored", id),
        }
    }

    fn handle_upgraded(
        &mut self,
        id: ConnectionId,
        generation: u64,
        result: std::result::Result<(), String>,
    ) {
        let Some(entry) = self.registry.get_mut(id) else {
            return;
        };
        if entry.generation != generation {
            return;
        }
        let on_complete = entry.pending_upgrade.take();
        match result {
            Ok(()) => {
                entry.secure = true;
                info!("[{}] upgraded to tls", id);
                self.events.emit(|l| l.on_secure_connect(id));
                if let Some(f) = on_complete {
                    f();
                }
            }
            Err(msg) => {
                // The socket task already shut the stream down; its close
                // event follows on the queue. The completion callback is
                // only invoked on success.
                self.events
                    .emit(|l| l.on_error(id, format!("unable to upgrade socket to tls: {}", msg)));
            }
        }
    }

    // ========================================================================
    // Write / close
    // ========================================================================

    fn handle_write(&mut self, id: ConnectionId, data: Vec<u8>) {
        match self.registry.get(id) {
            Some(entry) if entry.role == SocketRole::Stream => {
                let _ = entry.ctrl.send(SocketCtrl::Write(data));
            }
            // Unknown and listener IDs are silently ignored
            _ => debug!("[{}] write to unknown or non-stream socket, ignored", id),
        }
    }

    /// Close path shared by explicit close and internal failure cleanup.
    /// Returns false when the ID is not registered.
    fn close_entry(&mut self, id: ConnectionId) -> bool {
        let Some(entry) = self.registry.remove(id) else {
            return false;
        };
        let _ = entry.ctrl.send(SocketCtrl::Close);
        debug!("[{}] closed by request", id);
        self.events.emit(|l| l.on_close(id, None));
        true
    }

    fn handle_close(&mut self, id: ConnectionId) {
        if !self.close_entry(id) {
            self.events.emit(|l| l.on_error(id, Error::UnknownConnection.to_string()));
        }
    }

    fn handle_close_all(&mut self) {
        // Snapshot before closing; close mutates the registry
        let ids = self.registry.snapshot_ids();
        debug!("closing all sockets ({})", ids.len());
        for id in ids {
            self.close_entry(id);
        }
        // close_entry removed everything already; clearing is defensive
        self.registry.clear();
    }
}
