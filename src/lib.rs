//! ws-relay: an identity-addressed WebSocket message relay.
//!
//! Every connection is assigned an ephemeral numeric identity at connect
//! time, announced to the client in a one-time settings envelope. Clients
//! address text messages to each other by identity; an in-memory
//! publish/subscribe [`hub`] routes each message onto the target
//! connection's delivery path without either side knowing the other's
//! network details.
//!
//! ## Wire contract
//!
//! JSON text frames, with numeric type tags on the server-to-client side:
//!
//! - first message after connect: `{"type": 0, "id": "<identity>"}`
//! - relayed text: `{"type": 1, "text": "<content>"}`
//! - client send: `{"text": "<content>", "to": "<targetIdentity>"}`
//!
//! ## Serving
//!
//! The relay plugs into [`axum`] as a handler plus a state object:
//!
//! ```no_run
//! use ws_relay::{hub::InMemoryHub, relay_websocket, RelayConfig, RelayState};
//!
//! # async fn _main() {
//! let state = RelayState::new(InMemoryHub::new(), RelayConfig::default());
//!
//! let app = axum::Router::new()
//!     .route("/ws", axum::routing::any(relay_websocket))
//!     .with_state(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await.unwrap();
//! axum::serve(listener, app).await.unwrap();
//! # }
//! ```
//!
//! ## Internal structure
//!
//! Four tasks per connection, communicating only through queues:
//!
//! - `ReadPump` — reads frames, enforces the read deadline, feeds raw text
//!   payloads to the inbound queue. Non-text data frames are fatal.
//! - `WritePump` — drains the outbound queue onto the wire under a write
//!   deadline, and emits periodic liveness pings.
//! - `PublishTask` — decodes inbound payloads as addressed envelopes and
//!   publishes them to the hub.
//! - `DeliverTask` — subscribes to the hub under the connection's identity
//!   and re-encodes deliveries into the outbound queue, dropping the
//!   connection if the queue overflows.
//!
//! Delivery is best-effort, at most once, FIFO per connection. Nothing
//! survives a restart; a reconnecting client gets a fresh identity.

#![warn(
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    clippy::missing_const_for_fn,
    rustdoc::all
)]
#![deny(unused_must_use, rust_2018_idioms)]

mod axum;
pub use crate::axum::{relay_websocket, RelayState};

mod config;
pub use config::{RelayConfig, ServerConfig};

mod envelope;
pub use envelope::{Inbound, Outbound, ENVELOPE_TYPE_SETTINGS, ENVELOPE_TYPE_TEXT};

mod error;
pub use error::PublishError;

pub mod hub;

mod pump;
pub use pump::{Frame, FrameSink, FrameStream, CLOSE_ABNORMAL, CLOSE_GOING_AWAY};

mod relay;

mod router;

mod tasks;
