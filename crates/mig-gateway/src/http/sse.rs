//! Event buffer backing the `events` Server-Sent-Events stream.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

/// Number of events kept for clients that reconnect or poll late.
pub const EVENT_BUFFER_CAPACITY: usize = 100;

/// A serialized event with its arrival id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedEvent {
    /// Strictly increasing id, close to the arrival time in epoch milliseconds.
    pub id: i64,

    /// JSON payload sent as the `data:` field.
    pub data: String,
}

struct BufferInner {
    entries: VecDeque<BufferedEvent>,
    last_id: i64,
}

/// Ring buffer of recent events with a wake-up signal for waiting streams.
pub struct EventBuffer {
    inner: Mutex<BufferInner>,
    notify: Notify,
    capacity: usize,
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(EVENT_BUFFER_CAPACITY)
    }
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BufferInner {
                entries: VecDeque::with_capacity(capacity),
                last_id: 0,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append an event, evicting the oldest when full, and wake waiting streams.
    pub fn push(&self, data: impl Into<String>) -> i64 {
        let id = {
            let mut inner = self.inner.lock();
            let id = chrono::Utc::now().timestamp_millis().max(inner.last_id + 1);
            inner.last_id = id;
            if inner.entries.len() == self.capacity {
                inner.entries.pop_front();
            }
            inner.entries.push_back(BufferedEvent {
                id,
                data: data.into(),
            });
            id
        };
        self.notify.notify_waiters();
        id
    }

    /// Buffered events with an id greater than `id`, oldest first.
    pub fn find_after(&self, id: i64) -> Vec<BufferedEvent> {
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .filter(|e| e.id > id)
            .cloned()
            .collect()
    }

    /// Id of the most recent event, or the current time when empty.
    ///
    /// Every later [`EventBuffer::push`] gets a strictly greater id, so a
    /// stream starting from this baseline sees the next event.
    pub fn latest_id(&self) -> i64 {
        let mut inner = self.inner.lock();
        if let Some(last) = inner.entries.back() {
            return last.id;
        }
        let id = chrono::Utc::now().timestamp_millis().max(inner.last_id);
        inner.last_id = id;
        id
    }

    /// Resolves on the next [`EventBuffer::push`].
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}
