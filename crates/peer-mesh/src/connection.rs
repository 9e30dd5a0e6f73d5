//! WebSocket connection driver.
//!
//! Each physical socket, dialed or accepted, is owned by one tokio task. The
//! task reports frames to its peer through [`FrameHandler`] and takes
//! commands from the peer through the cheap, cloneable [`Connection`] handle.
//! The same driver serves `tokio-tungstenite` client sockets and `axum`
//! server sockets.

use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

pub(crate) type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique id for a connection or dial attempt
pub(crate) fn next_connection_id() -> ConnectionId {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Instructions from the owning peer to the driver task
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Send(String),
    Ping,
    Close,
}

/// Handle to a running connection driver
#[derive(Debug, Clone)]
pub(crate) struct Connection {
    id: ConnectionId,
    commands: mpsc::UnboundedSender<Command>,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a text frame; false when the driver has already exited
    pub fn send(&self, text: String) -> bool {
        self.commands.send(Command::Send(text)).is_ok()
    }

    pub fn ping(&self) -> bool {
        self.commands.send(Command::Ping).is_ok()
    }

    /// Best-effort close; closing twice is harmless
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// A handle with no socket behind it, for driving peer logic in tests
    #[cfg(test)]
    pub fn detached() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (commands, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: next_connection_id(),
                commands,
            },
            rx,
        )
    }
}

/// Transport-neutral view of an incoming frame
#[derive(Debug)]
pub(crate) enum Frame {
    Data(Vec<u8>),
    Ping,
    Pong,
    Close,
    Other,
}

/// Message type of a WebSocket implementation the driver can run over
pub(crate) trait WireMessage: Sized + Send + 'static {
    fn into_frame(self) -> Frame;
    fn text(text: String) -> Self;
    fn ping() -> Self;
    fn close() -> Self;
}

impl WireMessage for tokio_tungstenite::tungstenite::Message {
    fn into_frame(self) -> Frame {
        match self {
            Self::Text(text) => Frame::Data(text.as_str().as_bytes().to_vec()),
            Self::Binary(data) => Frame::Data(data.to_vec()),
            Self::Ping(_) => Frame::Ping,
            Self::Pong(_) => Frame::Pong,
            Self::Close(_) => Frame::Close,
            Self::Frame(_) => Frame::Other,
        }
    }

    fn text(text: String) -> Self {
        Self::Text(text.into())
    }

    fn ping() -> Self {
        Self::Ping(Vec::new().into())
    }

    fn close() -> Self {
        Self::Close(None)
    }
}

impl WireMessage for axum::extract::ws::Message {
    fn into_frame(self) -> Frame {
        match self {
            Self::Text(text) => Frame::Data(text.as_str().as_bytes().to_vec()),
            Self::Binary(data) => Frame::Data(data.to_vec()),
            Self::Ping(_) => Frame::Ping,
            Self::Pong(_) => Frame::Pong,
            Self::Close(_) => Frame::Close,
        }
    }

    fn text(text: String) -> Self {
        Self::Text(text.into())
    }

    fn ping() -> Self {
        Self::Ping(Vec::new().into())
    }

    fn close() -> Self {
        Self::Close(None)
    }
}

/// Receiver of a connection's frame events
pub(crate) trait FrameHandler: Send + Sync + 'static {
    fn on_payload(&self, id: ConnectionId, payload: &[u8]);
    fn on_activity(&self, id: ConnectionId);
    fn on_close(&self, id: ConnectionId);
}

/// Start driving `socket`, reporting to `handler` until the socket closes.
///
/// The driver only holds a weak reference, so it winds down on its own once
/// the handler is gone.
pub(crate) fn spawn<S, M, E>(socket: S, handler: Weak<dyn FrameHandler>) -> Connection
where
    S: Stream<Item = Result<M, E>> + Sink<M, Error = E> + Send + 'static,
    M: WireMessage,
    E: Display + Send + 'static,
{
    let id = next_connection_id();
    let (commands, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (mut sink, mut stream) = socket.split();

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Send(text)) => {
                        if let Err(e) = sink.send(M::text(text)).await {
                            tracing::debug!(connection = id, error = %e, "WebSocket send failed");
                            break;
                        }
                    }
                    Some(Command::Ping) => {
                        if let Err(e) = sink.send(M::ping()).await {
                            tracing::debug!(connection = id, error = %e, "WebSocket ping failed");
                            break;
                        }
                    }
                    Some(Command::Close) | None => {
                        let _ = sink.send(M::close()).await;
                        let _ = sink.close().await;
                        break;
                    }
                },
                incoming = stream.next() => {
                    let Some(handler) = handler.upgrade() else {
                        break;
                    };

                    match incoming {
                        Some(Ok(message)) => match message.into_frame() {
                            Frame::Data(payload) => handler.on_payload(id, &payload),
                            Frame::Ping | Frame::Pong => handler.on_activity(id),
                            Frame::Close => break,
                            Frame::Other => {}
                        },
                        Some(Err(e)) => {
                            tracing::debug!(connection = id, error = %e, "WebSocket read failed");
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        if let Some(handler) = handler.upgrade() {
            handler.on_close(id);
        }
    });

    Connection { id, commands }
}
