//! Identity-addressed publish/subscribe hub.
//!
//! The hub owns the process-wide routing table mapping each live connection's
//! identity to its delivery channel. Connections never learn each other's
//! network details: a publisher hands the hub a target identity and the text,
//! and the hub drops it onto the target's delivery channel.
//!
//! ## Locking
//!
//! All access to the table is serialized by a single mutex, held only for the
//! duration of a lookup/insert/remove/send — never across an await. Delivery
//! channels are unbounded so the in-lock send can never block; bounding
//! happens one stage later, at the connection's outbound queue, where a full
//! queue tears the slow connection down.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::PublishError;

/// Ephemeral per-connection routing key.
pub type Identity = String;

/// The consumer side of a per-identity delivery channel.
pub type Delivery = mpsc::UnboundedReceiver<String>;

/// Capability interface for the identity-addressed routing table.
///
/// The relay only needs these two operations, so alternate implementations
/// (sharded maps, an external broker) can be substituted without touching the
/// pump or router logic.
pub trait Hub: Send + Sync + 'static {
    /// Register a delivery channel under `identity` and return its consumer.
    ///
    /// Overwrites any prior entry for the same identity (last subscriber
    /// wins); the displaced subscriber's consumer sees its channel close.
    /// The entry is removed when `cancel` fires, unless a newer subscriber
    /// has since reused the identity, in which case the newer entry stays.
    fn subscribe(&self, identity: Identity, cancel: CancellationToken) -> Delivery;

    /// Route `text` to the delivery channel registered under `target`.
    ///
    /// Never blocks the caller on a missing or slow subscriber.
    fn publish(&self, target: &str, text: String) -> Result<(), PublishError>;
}

/// One routing-table entry. The serial distinguishes subscription instances
/// so a stale cleanup cannot evict a newer subscriber under the same
/// identity.
#[derive(Debug)]
struct HubEntry {
    tx: mpsc::UnboundedSender<String>,
    serial: u64,
}

type Entries = HashMap<Identity, HubEntry>;

/// In-memory [`Hub`] backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct InMemoryHub {
    entries: Arc<Mutex<Entries>>,
    next_serial: AtomicU64,
}

impl InMemoryHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently subscribed identities.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if no identity is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().expect("hub mutex poisoned")
    }
}

impl Hub for InMemoryHub {
    fn subscribe(&self, identity: Identity, cancel: CancellationToken) -> Delivery {
        let (tx, rx) = mpsc::unbounded_channel();
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);

        {
            let mut entries = self.lock();
            // Overwriting drops the only sender of any displaced entry, so
            // the previous subscriber's consumer side closes immediately.
            entries.insert(identity.clone(), HubEntry { tx, serial });
            info!(identity, total = entries.len(), "subscribed");
        }

        // Unregister when the owning connection cancels. The serial guard
        // keeps this from evicting a newer entry after identity reuse.
        let entries = Arc::clone(&self.entries);
        tokio::spawn(async move {
            cancel.cancelled().await;
            let mut entries = entries.lock().expect("hub mutex poisoned");
            if entries
                .get(&identity)
                .is_some_and(|entry| entry.serial == serial)
            {
                entries.remove(&identity);
                info!(identity, total = entries.len(), "unsubscribed");
            }
        });

        rx
    }

    fn publish(&self, target: &str, text: String) -> Result<(), PublishError> {
        let entries = self.lock();
        let entry = entries.get(target).ok_or_else(|| PublishError::NotFound {
            identity: target.to_owned(),
        })?;
        debug!(target, "publishing text");
        entry.tx.send(text).map_err(|_| PublishError::Closed {
            identity: target.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Poll until the entry for `identity` is gone, or panic after ~1s.
    async fn wait_unsubscribed(hub: &InMemoryHub, identity: &str) {
        for _ in 0..100 {
            if hub.lock().get(identity).is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("identity {identity} was never unsubscribed");
    }

    #[tokio::test]
    async fn routes_to_target_only() {
        let hub = InMemoryHub::new();
        let mut a = hub.subscribe("a".into(), CancellationToken::new());
        let mut b = hub.subscribe("b".into(), CancellationToken::new());

        hub.publish("b", "for b".into()).unwrap();

        assert_eq!(b.recv().await.unwrap(), "for b");
        assert!(a.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_to_unknown_identity_is_not_found() {
        let hub = InMemoryHub::new();
        let _keep = hub.subscribe("a".into(), CancellationToken::new());

        let err = hub.publish("nobody", "hi".into()).unwrap_err();
        assert!(err.is_not_found());
        // No side effect on the table.
        assert_eq!(hub.len(), 1);
    }

    #[tokio::test]
    async fn cancellation_unsubscribes() {
        let hub = InMemoryHub::new();
        let cancel = CancellationToken::new();
        let _delivery = hub.subscribe("a".into(), cancel.clone());
        assert_eq!(hub.len(), 1);

        cancel.cancel();
        wait_unsubscribed(&hub, "a").await;
        assert!(hub.publish("a", "hi".into()).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn resubscribe_closes_previous_delivery() {
        let hub = InMemoryHub::new();
        let mut first = hub.subscribe("a".into(), CancellationToken::new());
        let mut second = hub.subscribe("a".into(), CancellationToken::new());

        // The displaced consumer ends; the fresh one receives.
        assert!(first.recv().await.is_none());
        hub.publish("a", "fresh".into()).unwrap();
        assert_eq!(second.recv().await.unwrap(), "fresh");
        assert_eq!(hub.len(), 1);
    }

    #[tokio::test]
    async fn stale_cleanup_does_not_evict_reused_identity() {
        let hub = InMemoryHub::new();
        let first_cancel = CancellationToken::new();
        let first = hub.subscribe("a".into(), first_cancel.clone());
        let mut second = hub.subscribe("a".into(), CancellationToken::new());
        drop(first);

        first_cancel.cancel();
        // Give the stale cleanup task a chance to (incorrectly) run.
        tokio::time::sleep(Duration::from_millis(50)).await;

        hub.publish("a", "still here".into()).unwrap();
        assert_eq!(second.recv().await.unwrap(), "still here");
    }

    #[tokio::test]
    async fn publish_to_closed_channel_is_closed_error() {
        let hub = InMemoryHub::new();
        let delivery = hub.subscribe("a".into(), CancellationToken::new());
        drop(delivery);

        let err = hub.publish("a", "hi".into()).unwrap_err();
        assert!(matches!(err, PublishError::Closed { .. }));
    }
}
