//! Per-client WebSocket session with an ordered outbound pipeline.
//!
//! A [`Session`] owns one full-duplex WebSocket connection. Outbound frames
//! are enqueued through [`Session::write`] into a FIFO channel drained by a
//! single writer task, which guarantees at most one write in flight and
//! wire order equal to enqueue order. Inbound frames are dispatched serially
//! by the read loop to a swappable handler, so a handler installed during
//! dispatch is observed before the next frame.

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message, Utf8Bytes};
use tracing::{debug, warn};

use crate::error::ServerError;

/// Identity token for a session, unique for the lifetime of the process.
///
/// Upper layers use this as the stable map key for a session; the token
/// stays valid after the underlying socket has closed.
pub type SessionId = usize;

/// Callback invoked by the read loop for every inbound text frame.
///
/// Handlers receive the frame payload as a cheaply cloneable shared string
/// and a handle to the originating session. Dispatch is serial per session.
pub type InboundHandler =
    Arc<dyn Fn(Utf8Bytes, Arc<Session>) -> BoxFuture<'static, ()> + Send + Sync>;

static NEXT_SESSION_ID: AtomicUsize = AtomicUsize::new(1);

/// One client's WebSocket-connected presence on the server.
///
/// Created by the acceptor for each incoming connection, registered with the
/// session registry, and driven to completion by [`Session::run`]. Writes
/// made before the handshake completes are queued and flushed, in order, as
/// soon as the handshake finishes.
pub struct Session {
    /// Unique identity used as a map key by the registry and games
    id: SessionId,

    /// Remote endpoint, for diagnostics
    remote_addr: SocketAddr,

    /// Producer side of the outbound FIFO
    outbound_tx: mpsc::UnboundedSender<Message>,

    /// Consumer side of the outbound FIFO; taken by the writer task once
    /// the handshake completes
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,

    /// Handler invoked for each inbound frame; swapped by the registry on join
    handler: RwLock<Option<InboundHandler>>,

    /// One-shot flag, set when the server-side handshake completes
    handshake_done: AtomicBool,

    /// Terminal flag; once set, writes are dropped and loop errors are quiet
    closed: AtomicBool,
}

impl Session {
    /// Creates a session for a freshly accepted connection.
    ///
    /// The session is inert until [`Session::run`] is called with the
    /// accepted TCP stream; until then, [`Session::write`] only queues.
    pub fn new(remote_addr: SocketAddr) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            remote_addr,
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            handler: RwLock::new(None),
            handshake_done: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    /// Returns this session's identity token.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the remote endpoint of the connected client.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Enqueues a text frame for delivery to the client.
    ///
    /// Returns immediately; the writer task drains the queue in enqueue
    /// order with a single write in flight. Silently dropped once the
    /// session is closed. Callable from any task.
    pub fn write(&self, payload: Utf8Bytes) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let _ = self.outbound_tx.send(Message::Text(payload));
    }

    /// Issues a graceful close towards the client.
    ///
    /// The close frame is ordered behind any frames already queued.
    /// Best-effort; the race where the peer closed first is swallowed.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: Utf8Bytes::from_static(""),
        };
        let _ = self.outbound_tx.send(Message::Close(Some(frame)));
    }

    /// Returns true once the session has terminated or close was requested.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Replaces the inbound handler.
    ///
    /// The read loop reloads the handler before every dispatch, so a swap
    /// performed inside a handler takes effect for the next frame.
    pub async fn install_handler(&self, handler: InboundHandler) {
        *self.handler.write().await = Some(handler);
    }

    /// Performs the server-side WebSocket handshake and drives the session.
    ///
    /// On handshake success the pre-handshake outbound backlog is flushed by
    /// the writer task and the inbound read loop runs until the connection
    /// ends. Returns an error only if the handshake itself failed; a session
    /// that ran and then disconnected returns `Ok(())`.
    pub async fn run(self: Arc<Self>, stream: TcpStream) -> Result<(), ServerError> {
        if self.handshake_done.load(Ordering::Acquire) {
            return Err(ServerError::Session(format!(
                "Session {} started twice",
                self.id
            )));
        }

        let ws_stream = match accept_async(stream).await {
            Ok(ws_stream) => ws_stream,
            Err(e) => {
                self.closed.store(true, Ordering::Release);
                return Err(ServerError::Handshake(e.to_string()));
            }
        };
        self.handshake_done.store(true, Ordering::Release);
        debug!("🤝 Session {} handshake complete ({})", self.id, self.remote_addr);

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let Some(mut outbound_rx) = self.outbound_rx.lock().await.take() else {
            return Err(ServerError::Session(format!(
                "Session {} started twice",
                self.id
            )));
        };

        // Writer task: the only writer on this socket. FIFO order and the
        // at-most-one-in-flight invariant follow from the single consumer.
        let writer = {
            let session = Arc::clone(&self);
            tokio::spawn(async move {
                while let Some(message) = outbound_rx.recv().await {
                    let is_close = matches!(message, Message::Close(_));
                    if let Err(e) = ws_sender.send(message).await {
                        if !session.is_quiet_disconnect(&e) {
                            warn!("Write failed on session {}: {}", session.id, e);
                        }
                        break;
                    }
                    if is_close {
                        break;
                    }
                }
            })
        };

        // Read loop: frames dispatch serially, in arrival order, to whichever
        // handler is installed at dispatch time.
        while let Some(frame) = ws_receiver.next().await {
            if self.closed.load(Ordering::Acquire) {
                break;
            }
            match frame {
                Ok(Message::Text(text)) => {
                    let handler = self.handler.read().await.clone();
                    match handler {
                        Some(handler) => handler(text, Arc::clone(&self)).await,
                        None => {
                            warn!("Session {} has no handler installed, dropping frame", self.id)
                        }
                    }
                }
                Ok(Message::Ping(payload)) => {
                    let _ = self.outbound_tx.send(Message::Pong(payload));
                }
                Ok(Message::Close(_)) => {
                    debug!("🔌 Session {} closed by peer", self.id);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    if !self.is_quiet_disconnect(&e) {
                        warn!("Read failed on session {}: {}", self.id, e);
                    }
                    break;
                }
            }
        }

        self.closed.store(true, Ordering::Release);
        writer.abort();
        Ok(())
    }

    /// Transport errors that end the session without being reported: the
    /// peer closed the connection, or the error follows a local `close()`.
    fn is_quiet_disconnect(&self, error: &WsError) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return true;
        }
        matches!(
            error,
            WsError::ConnectionClosed
                | WsError::AlreadyClosed
                | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake)
        )
    }

    /// Pops the next queued outbound message without running the pipeline.
    #[cfg(test)]
    pub(crate) async fn try_next_outbound(&self) -> Option<Message> {
        self.outbound_rx.lock().await.as_mut()?.try_recv().ok()
    }

    /// The handler currently installed, as the read loop would observe it.
    #[cfg(test)]
    pub(crate) async fn current_handler(&self) -> Option<InboundHandler> {
        self.handler.read().await.clone()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("handshake_done", &self.handshake_done.load(Ordering::Acquire))
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}
