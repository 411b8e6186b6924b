//! Per-connection bridge between the pump queues and the hub.
//!
//! Two tasks per connection, both governed by the connection's cancellation
//! signal:
//!
//! - [`PublishTask`] consumes raw inbound payloads, decodes them as addressed
//!   [`Inbound`] envelopes, and publishes them to the hub.
//! - [`DeliverTask`] enqueues the one-time [`Outbound::Settings`] envelope,
//!   subscribes to the hub under the connection's identity, and re-encodes
//!   everything arriving on the subscription into outbound envelopes.
//!
//! Either task exiting fires the cancellation, which unwinds the other task,
//! the hub subscription, and (through queue closure) both pump loops.

use std::sync::Arc;

use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{debug, error, instrument};

use crate::{
    envelope::{Inbound, Outbound},
    hub::{Hub, Identity},
    tasks::TaskSet,
};

/// Reads inbound payloads and publishes them to the hub.
pub(crate) struct PublishTask {
    /// Routing table shared across all connections.
    pub(crate) hub: Arc<dyn Hub>,
    /// Identity of the connection serviced by this task.
    pub(crate) identity: Identity,
    /// Receiver side of the inbound queue, fed by the read pump.
    pub(crate) inbound: mpsc::Receiver<String>,
    /// The task set for this connection.
    pub(crate) tasks: TaskSet,
}

impl PublishTask {
    /// Task future, which will be run by [`Self::spawn`].
    ///
    /// A malformed payload is logged and skipped: one bad client message
    /// does not tear down the connection. A routing miss is likewise
    /// recoverable; the message is dropped and the sender is none the wiser.
    #[instrument(name = "PublishTask", skip(self), fields(identity = %self.identity))]
    pub(crate) async fn task_future(self) {
        let PublishTask {
            hub,
            mut inbound,
            tasks,
            ..
        } = self;

        while let Some(raw) = inbound.recv().await {
            let envelope = match Inbound::decode(&raw) {
                Ok(envelope) => envelope,
                Err(err) => {
                    error!(%err, "malformed inbound envelope");
                    continue;
                }
            };

            if let Err(err) = hub.publish(&envelope.to, envelope.text) {
                error!(%err, "dropping unroutable message");
            }
        }

        debug!("inbound queue closed");
        tasks.cancel();
    }

    /// Spawn the future produced by [`Self::task_future`].
    pub(crate) fn spawn(self) -> JoinHandle<Option<()>> {
        let tasks = self.tasks.clone();
        tasks.spawn(self.task_future())
    }
}

/// Subscribes to the hub and feeds delivered text into the outbound queue.
pub(crate) struct DeliverTask {
    /// Routing table shared across all connections.
    pub(crate) hub: Arc<dyn Hub>,
    /// Identity of the connection serviced by this task.
    pub(crate) identity: Identity,
    /// Sender side of the outbound queue. Enqueues never block: a full queue
    /// means the client is not draining, and the connection is torn down.
    pub(crate) outbound: mpsc::Sender<String>,
    /// The task set for this connection.
    pub(crate) tasks: TaskSet,
}

impl DeliverTask {
    /// Task future, which will be run by [`Self::spawn`].
    ///
    /// The settings envelope goes out first, before the hub subscription is
    /// registered, so it is guaranteed to be the first message the client
    /// receives.
    #[instrument(name = "DeliverTask", skip(self), fields(identity = %self.identity))]
    pub(crate) async fn task_future(self) {
        let DeliverTask {
            hub,
            identity,
            outbound,
            tasks,
        } = self;

        let settings = Outbound::Settings {
            id: identity.clone(),
        };
        match settings.encode() {
            Ok(payload) => {
                if let Err(err) = outbound.try_send(payload) {
                    error!(%err, "failed to enqueue settings envelope");
                    tasks.cancel();
                    return;
                }
            }
            Err(err) => {
                error!(%err, "failed to encode settings envelope");
                tasks.cancel();
                return;
            }
        }

        let mut delivery = hub.subscribe(identity, tasks.token());

        while let Some(text) = delivery.recv().await {
            let payload = match (Outbound::Text { text }).encode() {
                Ok(payload) => payload,
                Err(err) => {
                    error!(%err, "failed to encode text envelope");
                    break;
                }
            };

            match outbound.try_send(payload) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    error!("outbound queue full, dropping slow connection");
                    break;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("write pump has gone away");
                    break;
                }
            }
        }

        debug!("delivery ended");
        tasks.cancel();
    }

    /// Spawn the future produced by [`Self::task_future`].
    pub(crate) fn spawn(self) -> JoinHandle<Option<()>> {
        let tasks = self.tasks.clone();
        tasks.spawn(self.task_future())
    }
}
