//! Request/reply correlation for asynchronous device protocols.
//!
//! A backend registers a correlation id before writing a request to its
//! device, then waits on the returned [`ReplyHandle`]. The reader side of the
//! backend calls [`PendingReplies::complete`] when the matching reply arrives.

use crate::error::InterfaceError;
use crate::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Outstanding replies keyed by correlation id. Cheap to clone.
#[derive(Debug)]
pub struct PendingReplies<T> {
    waiting: Arc<DashMap<String, oneshot::Sender<T>>>,
}

impl<T> Clone for PendingReplies<T> {
    fn clone(&self) -> Self {
        Self {
            waiting: Arc::clone(&self.waiting),
        }
    }
}

impl<T> Default for PendingReplies<T> {
    fn default() -> Self {
        Self {
            waiting: Arc::new(DashMap::new()),
        }
    }
}

impl<T: Send + 'static> PendingReplies<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` and return the handle to wait on.
    ///
    /// Registering an id that is already waiting replaces the earlier waiter,
    /// whose handle then resolves to [`InterfaceError::Cancelled`].
    pub fn register(&self, id: impl Into<String>) -> ReplyHandle<T> {
        let id = id.into();
        let (tx, rx) = oneshot::channel();
        if self.waiting.insert(id.clone(), tx).is_some() {
            warn!(id = %id, "replacing pending reply with the same id");
        }
        ReplyHandle {
            id,
            rx,
            waiting: Arc::clone(&self.waiting),
        }
    }

    /// Deliver `value` to the waiter registered under `id`.
    ///
    /// Returns false when nobody is waiting (late or unsolicited reply).
    pub fn complete(&self, id: &str, value: T) -> bool {
        match self.waiting.remove(id) {
            Some((_, tx)) => tx.send(value).is_ok(),
            None => {
                debug!(id = %id, "no pending reply for id");
                false
            }
        }
    }

    /// Forget the waiter registered under `id`; its handle resolves to
    /// [`InterfaceError::Cancelled`].
    pub fn cancel(&self, id: &str) -> bool {
        self.waiting.remove(id).is_some()
    }

    /// Drop every waiter; their handles resolve to [`InterfaceError::Cancelled`].
    pub fn cancel_all(&self) {
        self.waiting.clear();
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

/// Single-use receiver for one correlated reply.
#[derive(Debug)]
pub struct ReplyHandle<T> {
    id: String,
    rx: oneshot::Receiver<T>,
    waiting: Arc<DashMap<String, oneshot::Sender<T>>>,
}

impl<T> ReplyHandle<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the reply. On timeout the registration is removed so that a
    /// late reply is reported as unsolicited.
    pub async fn wait(self, timeout: Duration) -> Result<T> {
        let ReplyHandle { id, rx, waiting } = self;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(InterfaceError::Cancelled(id)),
            Err(_) => {
                waiting.remove(&id);
                Err(InterfaceError::Timeout(timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reply_is_delivered() {
        let pending = PendingReplies::<String>::new();
        let handle = pending.register("42");

        let responder = pending.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            responder.complete("42", "ack".to_string());
        });

        let reply = handle.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply, "ack");
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_removes_registration() {
        let pending = PendingReplies::<u8>::new();
        let handle = pending.register("1");

        let result = handle.wait(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(InterfaceError::Timeout(_))));
        assert!(pending.is_empty());
        assert!(!pending.complete("1", 0));
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let pending = PendingReplies::<u8>::new();
        let a = pending.register("a");
        let b = pending.register("b");
        assert_eq!(pending.len(), 2);

        pending.cancel_all();
        assert!(matches!(
            a.wait(Duration::from_secs(1)).await,
            Err(InterfaceError::Cancelled(id)) if id == "a"
        ));
        assert!(b.wait(Duration::from_secs(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_id_cancels_previous_waiter() {
        let pending = PendingReplies::<u8>::new();
        let first = pending.register("x");
        let second = pending.register("x");

        assert!(pending.complete("x", 7));
        assert!(first.wait(Duration::from_millis(50)).await.is_err());
        assert_eq!(second.wait(Duration::from_millis(50)).await.unwrap(), 7);
    }
}
