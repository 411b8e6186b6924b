//! Per-connection pump loops and the transport seam they run against.
//!
//! A connection's two directions are independent, failure-isolated loops:
//! [`ReadPump`] turns raw frames into inbound queue entries while enforcing
//! the read deadline, and [`WritePump`] drains the outbound queue onto the
//! wire while emitting liveness pings and enforcing the write deadline.
//!
//! The pumps see the physical connection only through [`FrameSink`] and
//! [`FrameStream`], so the core never depends on a concrete WebSocket
//! library. The axum boundary implements both traits for the split socket
//! halves; tests implement them over channels.
//!
//! ## Teardown symmetry
//!
//! Either loop exiting must unblock the other. The read pump exiting drops
//! the inbound queue sender, which ends the router's publish loop and fires
//! the connection's cancellation; cancellation drops the outbound queue
//! sender, which the write pump observes as queue closure and answers with a
//! final close frame before exiting. The write pump exiting is observed by
//! the connection manager, which fires the cancellation directly rather
//! than waiting for the router's next enqueue to hit the closed queue.

use std::{future::Future, time::Duration};

use tokio::{
    select,
    sync::mpsc,
    task::JoinHandle,
    time::{interval_at, timeout, Instant, MissedTickBehavior},
};
use tracing::{debug, error, instrument, trace};

use crate::{hub::Identity, tasks::TaskSet};

/// Close code sent by a client that is navigating away. Expected on
/// disconnect, never logged as an error.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Close code for an abnormal closure. Expected on disconnect.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// A frame read from the physical connection, reduced to the categories the
/// relay distinguishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text data frame carrying an envelope payload.
    Text(String),
    /// A binary data frame. The relay speaks JSON text only, so this is a
    /// protocol violation.
    Binary,
    /// A ping control frame. Counts as liveness; the transport answers it.
    Ping,
    /// A pong control frame answering one of our pings.
    Pong,
    /// A close frame, with the close code if the peer sent one.
    Close(Option<u16>),
}

impl Frame {
    /// True for close codes treated as expected-on-disconnect.
    const fn is_expected_close(code: Option<u16>) -> bool {
        matches!(code, None | Some(CLOSE_GOING_AWAY) | Some(CLOSE_ABNORMAL))
    }
}

/// Writing half of a physical connection, as the relay sees it.
pub trait FrameSink: Send + 'static {
    /// Error type for the sink.
    type Error: core::error::Error + Send + 'static;

    /// Send a text data frame.
    fn send_text(&mut self, text: String)
        -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Send a liveness ping.
    fn send_ping(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Send a close frame.
    fn send_close(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Reading half of a physical connection, as the relay sees it.
pub trait FrameStream: Send + Unpin + 'static {
    /// Error type for the stream.
    type Error: core::error::Error + Send + 'static;

    /// Read the next frame. `None` means the connection has ended.
    fn next_frame(
        &mut self,
    ) -> impl Future<Output = Option<Result<Frame, Self::Error>>> + Send;
}

/// Inbound pump: reads frames, enforces the read deadline, and feeds text
/// payloads to the router's inbound queue.
pub(crate) struct ReadPump<S> {
    /// Identity of the connection serviced by this pump.
    pub(crate) identity: Identity,
    /// Reading half of the connection.
    pub(crate) stream: S,
    /// Sender side of the inbound queue. Dropped on exit, which the router
    /// observes as end-of-stream.
    pub(crate) inbound: mpsc::Sender<String>,
    /// Wall-clock budget for each frame read; reset on every frame,
    /// including pings and pongs.
    pub(crate) read_timeout: Duration,
}

impl<S: FrameStream> ReadPump<S> {
    #[instrument(name = "ReadPump", skip(self), fields(identity = %self.identity))]
    pub(crate) async fn task_future(self) {
        let ReadPump {
            mut stream,
            inbound,
            read_timeout,
            ..
        } = self;

        loop {
            let frame = match timeout(read_timeout, stream.next_frame()).await {
                Err(_) => {
                    debug!("read deadline expired");
                    break;
                }
                Ok(None) => {
                    trace!("frame stream ended");
                    break;
                }
                Ok(Some(Err(err))) => {
                    debug!(%err, "read error");
                    break;
                }
                Ok(Some(Ok(frame))) => frame,
            };

            match frame {
                Frame::Text(text) => {
                    if inbound.send(text).await.is_err() {
                        debug!("router has gone away");
                        break;
                    }
                }
                Frame::Ping | Frame::Pong => {
                    trace!("liveness frame");
                }
                Frame::Binary => {
                    error!("unexpected binary frame");
                    break;
                }
                Frame::Close(code) => {
                    if Frame::is_expected_close(code) {
                        debug!(?code, "client closed connection");
                    } else {
                        error!(?code, "unexpected close code");
                    }
                    break;
                }
            }
        }
    }

    /// Spawn the future produced by [`Self::task_future`].
    ///
    /// Tracked but not cancellable: the pump ends on I/O failure, deadline
    /// expiry, or the router side going away.
    pub(crate) fn spawn(self, tasks: &TaskSet) -> JoinHandle<()> {
        tasks.spawn_pump(self.task_future())
    }
}

/// Outbound pump: drains the outbound queue onto the wire, emits periodic
/// liveness pings, and enforces the write deadline on every send.
pub(crate) struct WritePump<S> {
    /// Identity of the connection serviced by this pump.
    pub(crate) identity: Identity,
    /// Writing half of the connection.
    pub(crate) sink: S,
    /// Receiver side of the outbound queue. Closure (the router dropping the
    /// sender) triggers the final close frame.
    pub(crate) outbound: mpsc::Receiver<String>,
    /// Wall-clock budget for each frame write.
    pub(crate) write_timeout: Duration,
    /// Period of the liveness ping timer, independent of traffic.
    pub(crate) ping_interval: Duration,
}

impl<S: FrameSink> WritePump<S> {
    #[instrument(name = "WritePump", skip(self), fields(identity = %self.identity))]
    pub(crate) async fn task_future(self) {
        let WritePump {
            mut sink,
            mut outbound,
            write_timeout,
            ping_interval,
            ..
        } = self;

        // First tick lands one full interval out, keeping the settings
        // envelope as the first bytes on the wire.
        let mut ticker = interval_at(Instant::now() + ping_interval, ping_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Ticker first: steady outbound traffic to a slow-draining peer
            // must not starve liveness pings past the peer's read deadline.
            select! {
                biased;

                _ = ticker.tick() => match timeout(write_timeout, sink.send_ping()).await {
                    Ok(Ok(())) => trace!("sent ping"),
                    Ok(Err(err)) => {
                        debug!(%err, "ping failed");
                        break;
                    }
                    Err(_) => {
                        debug!("ping deadline expired");
                        break;
                    }
                },

                payload = outbound.recv() => match payload {
                    Some(payload) => match timeout(write_timeout, sink.send_text(payload)).await {
                        Ok(Ok(())) => trace!("sent text frame"),
                        Ok(Err(err)) => {
                            debug!(%err, "write failed");
                            break;
                        }
                        Err(_) => {
                            debug!("write deadline expired");
                            break;
                        }
                    },
                    None => {
                        debug!("outbound queue closed");
                        let _ = timeout(write_timeout, sink.send_close()).await;
                        break;
                    }
                },
            }
        }
    }

    /// Spawn the future produced by [`Self::task_future`].
    pub(crate) fn spawn(self, tasks: &TaskSet) -> JoinHandle<()> {
        tasks.spawn_pump(self.task_future())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Channel-backed frame transports for exercising pumps without sockets.

    use super::*;

    /// Frames recorded by a [`MockSink`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum SentFrame {
        Text(String),
        Ping,
        Close,
    }

    pub(crate) struct MockStream {
        pub(crate) frames: mpsc::UnboundedReceiver<Result<Frame, std::io::Error>>,
    }

    impl MockStream {
        pub(crate) fn pair() -> (mpsc::UnboundedSender<Result<Frame, std::io::Error>>, Self) {
            let (tx, frames) = mpsc::unbounded_channel();
            (tx, Self { frames })
        }
    }

    impl FrameStream for MockStream {
        type Error = std::io::Error;

        async fn next_frame(&mut self) -> Option<Result<Frame, Self::Error>> {
            self.frames.recv().await
        }
    }

    pub(crate) struct MockSink {
        pub(crate) sent: mpsc::UnboundedSender<SentFrame>,
        pub(crate) fail: bool,
        /// Simulated per-send wire latency.
        pub(crate) delay: Option<Duration>,
    }

    impl MockSink {
        pub(crate) fn pair() -> (Self, mpsc::UnboundedReceiver<SentFrame>) {
            let (sent, rx) = mpsc::unbounded_channel();
            (
                Self {
                    sent,
                    fail: false,
                    delay: None,
                },
                rx,
            )
        }

        async fn record(&self, frame: SentFrame) -> Result<(), std::io::Error> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(std::io::Error::other("sink failure"));
            }
            // A dropped recorder behaves like a dead socket.
            self.sent
                .send(frame)
                .map_err(|_| std::io::Error::other("sink closed"))
        }
    }

    impl FrameSink for MockSink {
        type Error = std::io::Error;

        async fn send_text(&mut self, text: String) -> Result<(), Self::Error> {
            self.record(SentFrame::Text(text)).await
        }

        async fn send_ping(&mut self) -> Result<(), Self::Error> {
            self.record(SentFrame::Ping).await
        }

        async fn send_close(&mut self) -> Result<(), Self::Error> {
            self.record(SentFrame::Close).await
        }
    }
}
