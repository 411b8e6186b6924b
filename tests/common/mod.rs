#![allow(dead_code)]

use std::{net::SocketAddr, time::Duration};

use axum::routing::any;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{
    tungstenite::{client::IntoClientRequest, protocol::Message},
    MaybeTlsStream, WebSocketStream,
};
use ws_relay::{hub::InMemoryHub, relay_websocket, RelayConfig, RelayState};

/// Serve a relay on an ephemeral port and return its address.
pub async fn serve(cfg: RelayConfig) -> (SocketAddr, RelayState) {
    let state = RelayState::new(InMemoryHub::new(), cfg);

    let app = axum::Router::new()
        .route("/ws", any(relay_websocket))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// WebSocket test client speaking the relay's wire contract.
pub struct Client {
    socket: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        let request = format!("ws://{addr}/ws").into_client_request().unwrap();
        let (socket, _) = tokio_tungstenite::connect_async(request).await.unwrap();
        Client { socket }
    }

    /// Read the settings envelope and return the assigned identity.
    pub async fn identity(&mut self) -> String {
        let settings = self.recv_json().await;
        assert_eq!(settings["type"], 0, "first message must be settings");
        settings["id"].as_str().expect("settings must carry id").to_owned()
    }

    /// Send a text message addressed to another identity.
    pub async fn send_to(&mut self, to: &str, text: &str) {
        let payload = serde_json::json!({ "text": text, "to": to }).to_string();
        self.socket.send(Message::Text(payload.into())).await.unwrap();
    }

    /// Send a raw text payload, bypassing envelope encoding.
    pub async fn send_raw(&mut self, payload: &str) {
        self.socket
            .send(Message::Text(payload.to_owned().into()))
            .await
            .unwrap();
    }

    pub async fn send_binary(&mut self, payload: &[u8]) {
        self.socket
            .send(Message::Binary(payload.to_vec().into()))
            .await
            .unwrap();
    }

    /// Next raw message, if any. Answers server pings as a side effect of
    /// polling the socket.
    pub async fn next_message(&mut self) -> Option<Message> {
        match self.socket.next().await {
            Some(Ok(msg)) => Some(msg),
            _ => None,
        }
    }

    /// Next text frame, decoded as JSON. Skips control frames.
    pub async fn recv_json(&mut self) -> serde_json::Value {
        loop {
            match self.next_message().await.expect("connection closed") {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected message: {other:?}"),
            }
        }
    }

    /// Assert that no text frame arrives within `window`.
    pub async fn assert_silent(&mut self, window: Duration) {
        let deadline = tokio::time::sleep(window);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return,
                msg = self.next_message() => match msg {
                    Some(Message::Ping(_) | Message::Pong(_)) => continue,
                    Some(Message::Text(text)) => panic!("unexpected delivery: {text}"),
                    other => panic!("connection ended: {other:?}"),
                },
            }
        }
    }

    /// Wait for the server to close the connection.
    pub async fn expect_close(&mut self, within: Duration) {
        tokio::time::timeout(within, async {
            loop {
                match self.next_message().await {
                    Some(Message::Close(_)) | None => return,
                    Some(_) => continue,
                }
            }
        })
        .await
        .expect("server did not close the connection in time");
    }
}
