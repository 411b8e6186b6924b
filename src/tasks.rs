use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::{
    sync::{CancellationToken, WaitForCancellationFuture},
    task::TaskTracker,
};

/// A [`TaskTracker`] paired with a [`CancellationToken`].
///
/// Used at two levels: the relay holds a root set covering every connection,
/// and each connection gets a [`Self::child`] whose token governs its router
/// tasks and hub subscription. Children share the root tracker, so one
/// [`Self::shutdown`] on the root drains every task in the process.
#[derive(Debug, Clone, Default)]
pub(crate) struct TaskSet {
    tasks: TaskTracker,
    token: CancellationToken,
}

impl TaskSet {
    /// Create a new, empty task set.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Get a clone of the cancellation token.
    ///
    /// Handed to [`Hub::subscribe`] so the hub can unregister the identity
    /// when the connection is torn down.
    ///
    /// [`Hub::subscribe`]: crate::hub::Hub::subscribe
    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the token, firing teardown for all tasks in the set.
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel everything and wait for all tracked tasks to finish.
    pub(crate) async fn shutdown(&self) {
        self.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }

    /// Get a future that resolves when the token is fired.
    #[allow(dead_code)] // used in tests; kept for parity with cancel()
    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Get a child [`TaskSet`] for one connection. Its token fires when the
    /// parent's does, or independently; its tasks land in the shared tracker.
    pub(crate) fn child(&self) -> Self {
        Self {
            tasks: self.tasks.clone(),
            token: self.token.child_token(),
        }
    }

    /// Spawn a future that is aborted when the set's token fires.
    ///
    /// Router tasks use this: their lifetime is governed by the connection's
    /// cancellation signal.
    pub(crate) fn spawn<F>(&self, task: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let token = self.token.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => None,
                result = task => Some(result),
            }
        })
    }

    /// Spawn a future that is tracked but NOT raced against the token.
    ///
    /// Pump loops use this: they terminate on I/O failure, deadline expiry,
    /// or queue closure — never on the cancellation signal directly — which
    /// decouples raw socket liveness from application-level routing teardown.
    pub(crate) fn spawn_pump<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tasks.spawn(task)
    }
}
