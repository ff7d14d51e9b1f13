//! Delivery of background failures to a user-supplied handler.
//!
//! The renewal loop only pushes onto a channel. A dispatcher task drains it
//! and runs the handler on the blocking pool, so a slow or panicking handler
//! can neither stall nor re-enter the loop.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::error::SessionError;

/// Callback invoked for every background failure.
pub type ErrorHandler = Arc<dyn Fn(SessionError) + Send + Sync>;

type Slot = Arc<RwLock<Option<ErrorHandler>>>;

pub struct ErrorNotifier {
    slot: Slot,
    tx: mpsc::UnboundedSender<SessionError>,
}

impl ErrorNotifier {
    /// Create the notifier and spawn its dispatcher on the current runtime.
    /// The dispatcher exits once the notifier is dropped.
    pub fn spawn(handler: Option<ErrorHandler>) -> Self {
        let slot: Slot = Arc::new(RwLock::new(handler));
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::dispatch(Arc::clone(&slot), rx));

        Self { slot, tx }
    }

    /// Replace the handler. Deliveries already handed to the old handler still run.
    pub fn set_handler(&self, handler: ErrorHandler) {
        *self.slot.write() = Some(handler);
    }

    pub fn clear_handler(&self) {
        *self.slot.write() = None;
    }

    /// Queue a failure for delivery; never blocks
    pub fn notify(&self, err: SessionError) {
        if let Err(e) = self.tx.send(err) {
            warn!(error = %e.0, "Error notifier stopped, dropping notification");
        }
    }

    async fn dispatch(slot: Slot, mut rx: mpsc::UnboundedReceiver<SessionError>) {
        while let Some(err) = rx.recv().await {
            let handler = slot.read().clone();
            let Some(handler) = handler else {
                continue;
            };

            // Await each call so notifications arrive in the order they were raised
            if let Err(e) = tokio::task::spawn_blocking(move || handler(err)).await {
                error!(error = %e, "Error handler panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{recording_handler, wait_for};
    use std::time::Duration;

    #[tokio::test]
    async fn test_delivers_in_order() {
        let (handler, seen) = recording_handler();
        let notifier = ErrorNotifier::spawn(Some(handler));

        notifier.notify(SessionError::NotInitialized);
        notifier.notify(SessionError::AlreadyClosed);

        assert!(wait_for(|| seen.lock().len() == 2, Duration::from_secs(2)).await);
        let seen = seen.lock();
        assert_eq!(seen[0], "Session token not initialized");
        assert_eq!(seen[1], "Session already closed");
    }

    #[tokio::test]
    async fn test_replace_and_clear_handler() {
        let (first, first_seen) = recording_handler();
        let (second, second_seen) = recording_handler();
        let notifier = ErrorNotifier::spawn(Some(first));

        notifier.notify(SessionError::NotInitialized);
        assert!(wait_for(|| first_seen.lock().len() == 1, Duration::from_secs(2)).await);

        notifier.set_handler(second);
        notifier.notify(SessionError::AlreadyClosed);
        assert!(wait_for(|| second_seen.lock().len() == 1, Duration::from_secs(2)).await);
        assert_eq!(first_seen.lock().len(), 1);

        notifier.clear_handler();
        notifier.notify(SessionError::NotInitialized);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(second_seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_stop_delivery() {
        let (recorder, seen) = recording_handler();
        let handler: ErrorHandler = Arc::new(move |err: SessionError| {
            if matches!(err, SessionError::NotInitialized) {
                panic!("handler blew up");
            }
            recorder(err);
        });
        let notifier = ErrorNotifier::spawn(Some(handler));

        notifier.notify(SessionError::NotInitialized);
        notifier.notify(SessionError::AlreadyClosed);

        assert!(wait_for(|| seen.lock().len() == 1, Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_notify_without_handler_is_noop() {
        let notifier = ErrorNotifier::spawn(None);
        notifier.notify(SessionError::NotInitialized);
    }
}
