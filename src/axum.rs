//! WebSocket boundary for [`axum`].
//!
//! `axum` upgrades connections through a [`WebSocketUpgrade`] extractor
//! rather than a listener loop, so the relay plugs in as a handler plus a
//! [`State`]: [`RelayState`] carries the hub, the connection constants, and
//! the root task set, and [`relay_websocket`] performs the upgrade, assigns
//! the identity, and hands the split socket to the connection manager.

use std::{fmt, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use bytes::Bytes;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use rand::Rng;
use tracing::info;

use crate::{
    config::RelayConfig,
    hub::{Hub, Identity},
    pump::{Frame, FrameSink, FrameStream},
    relay::ConnectionManager,
};

pub(crate) type SendHalf = SplitSink<WebSocket, Message>;
pub(crate) type RecvHalf = SplitStream<WebSocket>;

/// Shared state for the [`relay_websocket`] handler.
///
/// Create one per server from a [`Hub`] implementation and the connection
/// constants, register it with [`axum::Router::with_state`], and keep a clone
/// for [`Self::shutdown`].
///
/// # Example
///
/// ```no_run
/// use ws_relay::{hub::InMemoryHub, relay_websocket, RelayConfig, RelayState};
///
/// # async fn _main() {
/// let state = RelayState::new(InMemoryHub::new(), RelayConfig::default());
///
/// let app: axum::Router = axum::Router::new()
///     .route("/ws", axum::routing::any(relay_websocket))
///     .with_state(state);
/// # }
/// ```
#[derive(Clone)]
pub struct RelayState {
    inner: Arc<ConnectionManager>,
}

impl fmt::Debug for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayState")
            .field("cfg", &self.inner.cfg)
            .finish_non_exhaustive()
    }
}

impl RelayState {
    /// Create a new [`RelayState`] over the given hub.
    pub fn new<H: Hub>(hub: H, cfg: RelayConfig) -> Self {
        Self::with_hub(Arc::new(hub), cfg)
    }

    /// Create a new [`RelayState`] over an already-shared hub.
    pub fn with_hub(hub: Arc<dyn Hub>, cfg: RelayConfig) -> Self {
        Self {
            inner: Arc::new(ConnectionManager::new(hub, cfg)),
        }
    }

    /// The connection constants this state hands to new connections.
    pub fn config(&self) -> &RelayConfig {
        &self.inner.cfg
    }

    /// Tear down all connection tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.inner.root_tasks.shutdown().await;
    }
}

/// Axum handler relaying WebSocket connections through the hub.
///
/// Assigns the connection its ephemeral identity, applies the configured
/// frame size limit, and launches the pump and router tasks. The handler
/// returns as soon as the upgrade completes; the connection lives on the
/// state's task set.
pub async fn relay_websocket(ws: WebSocketUpgrade, State(state): State<RelayState>) -> Response {
    let identity = next_identity();
    ws.max_message_size(state.inner.cfg.max_frame_bytes)
        .on_upgrade(move |socket| {
            info!(%identity, "new connection");
            let (sink, stream) = socket.split();
            state.inner.handle_new_connection(identity, sink, stream);
            async {}
        })
}

/// Random numeric identity, unique enough for a point in time. Not
/// cryptographic; identities are ephemeral routing keys, nothing more.
fn next_identity() -> Identity {
    rand::rng().random_range(0..100_000u32).to_string()
}

impl FrameSink for SendHalf {
    type Error = axum::Error;

    async fn send_text(&mut self, text: String) -> Result<(), Self::Error> {
        self.send(Message::Text(text.into())).await
    }

    async fn send_ping(&mut self) -> Result<(), Self::Error> {
        self.send(Message::Ping(Bytes::new())).await
    }

    async fn send_close(&mut self) -> Result<(), Self::Error> {
        self.send(Message::Close(None)).await
    }
}

impl FrameStream for RecvHalf {
    type Error = axum::Error;

    async fn next_frame(&mut self) -> Option<Result<Frame, Self::Error>> {
        self.next().await.map(|result| result.map(Frame::from))
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            Message::Binary(_) => Frame::Binary,
            Message::Ping(_) => Frame::Ping,
            Message::Pong(_) => Frame::Pong,
            Message::Close(frame) => Frame::Close(frame.map(|f| f.code)),
        }
    }
}
