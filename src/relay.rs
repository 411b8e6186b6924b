//! Connection wiring: queues plus the four per-connection tasks.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    config::RelayConfig,
    hub::{Hub, Identity},
    pump::{FrameSink, FrameStream, ReadPump, WritePump},
    router::{DeliverTask, PublishTask},
    tasks::TaskSet,
};

/// Capacity of the inbound queue between the read pump and the publish task.
///
/// Small on purpose: the read pump should feel backpressure from a publish
/// loop that cannot keep up, instead of buffering client frames.
const INBOUND_QUEUE_CAPACITY: usize = 1;

/// The `ConnectionManager` wires each accepted connection: two queues, two
/// pump loops, and two router tasks, all serviced by a child [`TaskSet`]
/// whose token is the connection's cancellation signal.
pub(crate) struct ConnectionManager {
    /// Routing table shared across all connections.
    pub(crate) hub: Arc<dyn Hub>,
    /// Per-connection constants, fixed at connection creation.
    pub(crate) cfg: RelayConfig,
    /// Root task set; every connection task lands in its tracker.
    pub(crate) root_tasks: TaskSet,
}

impl ConnectionManager {
    pub(crate) fn new(hub: Arc<dyn Hub>, cfg: RelayConfig) -> Self {
        Self {
            hub,
            cfg,
            root_tasks: TaskSet::new(),
        }
    }

    /// Wire and launch the tasks for one accepted connection.
    ///
    /// Pump loops are tracked but not cancellable; they end on I/O failure,
    /// deadline expiry, or queue closure. Router tasks run under the
    /// connection's cancellation token.
    pub(crate) fn handle_new_connection<Si, St>(&self, identity: Identity, sink: Si, stream: St)
    where
        Si: FrameSink,
        St: FrameStream,
    {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        // mpsc panics on a zero capacity; treat a misconfigured 0 as 1.
        let (outbound_tx, outbound_rx) = mpsc::channel(self.cfg.outbound_queue_capacity.max(1));

        let tasks = self.root_tasks.child();

        ReadPump {
            identity: identity.clone(),
            stream,
            inbound: inbound_tx,
            read_timeout: self.cfg.read_timeout(),
        }
        .spawn(&tasks);

        let write_handle = WritePump {
            identity: identity.clone(),
            sink,
            outbound: outbound_rx,
            write_timeout: self.cfg.write_timeout(),
            ping_interval: self.cfg.ping_interval(),
        }
        .spawn(&tasks);

        // A write pump that dies of an I/O failure fires the teardown here,
        // not through queue closure: with no delivery traffic in flight, the
        // router would otherwise never touch the closed queue, leaving the
        // hub entry registered and the read pump consuming frames.
        let write_tasks = tasks.clone();
        tasks.spawn_pump(async move {
            let _ = write_handle.await;
            write_tasks.cancel();
        });

        PublishTask {
            hub: Arc::clone(&self.hub),
            identity: identity.clone(),
            inbound: inbound_rx,
            tasks: tasks.clone(),
        }
        .spawn();

        DeliverTask {
            hub: Arc::clone(&self.hub),
            identity,
            outbound: outbound_tx,
            tasks,
        }
        .spawn();
    }
}
