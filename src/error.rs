/// Error returned by [`Hub::publish`] when a message cannot be routed.
///
/// Both variants are recoverable from the publisher's point of view: the
/// message is dropped and the publishing connection keeps running.
///
/// [`Hub::publish`]: crate::hub::Hub::publish
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// No subscriber is registered under the target identity.
    #[error("no subscriber with identity {identity}")]
    NotFound {
        /// The identity that was looked up.
        identity: String,
    },

    /// A subscriber entry exists but its delivery channel has been closed.
    ///
    /// This is a narrow window: the subscriber's connection has torn down but
    /// its cancellation cleanup has not yet removed the hub entry.
    #[error("delivery channel for identity {identity} is closed")]
    Closed {
        /// The identity whose channel is closed.
        identity: String,
    },
}

impl PublishError {
    /// True if this is the NotFound variant.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
