//! Per-socket tasks
//!
//! One task owns each registered socket. For streams the task is the
//! only place the three event sources are wired: reads become data
//! events, EOF and errors become close/error events, and control
//! messages (write, upgrade, close) arrive on the ctrl channel. Owning
//! the stream here is what lets a TLS upgrade swap the transport in
//! place without changing the connection's identity.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::common::{ConnectionId, Stream};
use crate::session::TlsSession;
use crate::transport::TransportListener;

use super::dispatcher::Action;

/// Control messages for one socket task.
pub(crate) enum SocketCtrl {
    /// Queue bytes for writing
    Write(Vec<u8>),
    /// Perform an in-place TLS upgrade
    Upgrade { host: String, port: u16 },
    /// Shut the transport down. No close event is emitted: the
    /// dispatcher already removed the entry and notified the listener.
    Close,
}

/// Run one stream socket until it closes.
///
/// Events are emitted onto the single dispatcher queue in order, which
/// preserves the error-then-close sequence per connection.
pub(crate) async fn run_stream(
    id: ConnectionId,
    generation: u64,
    mut stream: Stream,
    mut ctrl: mpsc::UnboundedReceiver<SocketCtrl>,
    actions: mpsc::UnboundedSender<Action>,
    tls: Arc<TlsSession>,
    read_buffer_size: usize,
) {
    let mut buf = vec![0u8; read_buffer_size];
    loop {
        tokio::select! {
            res = stream.read(&mut buf) => match res {
                Ok(0) => {
                    trace!("[{}] end of stream", id);
                    let _ = actions.send(Action::SocketClosed { id, generation, reason: None });
                    break;
                }
                Ok(n) => {
                    let _ = actions.send(Action::Data { id, generation, data: buf[..n].to_vec() });
                }
                Err(e) => {
                    // Error first, then the close path; ordering is
                    // preserved by the serialized queue
                    let _ = actions.send(Action::SocketError { id, generation, message: e.to_string() });
                    let _ = actions.send(Action::SocketClosed { id, generation, reason: None });
                    break;
                }
            },
            cmd = ctrl.recv() => match cmd {
                Some(SocketCtrl::Write(data)) => {
                    if let Err(e) = write_all(&mut stream, &data).await {
                        let _ = actions.send(Action::SocketError { id, generation, message: e.to_string() });
                        let _ = actions.send(Action::SocketClosed { id, generation, reason: None });
                        break;
                    }
                }
                Some(SocketCtrl::Upgrade { host, port }) => {
                    debug!("[{}] upgrading to tls ({}:{})", id, host, port);
                    match tls.wrap_client(stream, &host, port).await {
                        Ok(secured) => {
                            stream = secured;
                            let _ = actions.send(Action::Upgraded { id, generation, result: Ok(()) });
                        }
                        Err(e) => {
                            // The failed handshake consumed the stream;
                            // report, then follow the close path
                            let _ = actions.send(Action::Upgraded { id, generation, result: Err(e.to_string()) });
                            let _ = actions.send(Action::SocketClosed { id, generation, reason: None });
                            return;
                        }
                    }
                }
                Some(SocketCtrl::Close) | None => {
                    let _ = stream.shutdown().await;
                    break;
                }
            },
        }
    }
}

/// Run one listening socket until it is stopped or the transport ends.
pub(crate) async fn run_listener(
    id: ConnectionId,
    generation: u64,
    listener: Box<dyn TransportListener>,
    mut ctrl: mpsc::UnboundedReceiver<SocketCtrl>,
    actions: mpsc::UnboundedSender<Action>,
) {
    loop {
        tokio::select! {
            res = listener.accept() => match res {
                Ok((stream, peer)) => {
                    let _ = actions.send(Action::Accepted { server_id: id, generation, stream, peer });
                }
                Err(e) => {
                    let _ = actions.send(Action::ListenerEnded { id, generation, reason: Some(e.to_string()) });
                    break;
                }
            },
            cmd = ctrl.recv() => match cmd {
                Some(SocketCtrl::Close) | None => {
                    trace!("[{}] listener stopped", id);
                    break;
                }
                // Writes and upgrades don't apply to listeners
                Some(_) => {}
            },
        }
    }
}

async fn write_all(stream: &mut Stream, data: &[u8]) -> std::io::Result<()> {
    stream.write_all(data).await?;
    stream.flush().await
}
