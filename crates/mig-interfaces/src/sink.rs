//! Event reporting from interfaces to the router.

use mig_core::Event;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

/// Notification raised by an interface.
#[derive(Debug, Clone)]
pub enum InterfaceEvent {
    /// A module property changed.
    PropertyChanged(Event),

    /// The set of modules exposed by `domain` changed.
    ModulesChanged { domain: String },
}

/// Sending half handed to interfaces at registration.
///
/// Events are queued without blocking; the router drains them in arrival order.
#[derive(Debug, Clone)]
pub struct InterfaceEventSink {
    tx: mpsc::UnboundedSender<InterfaceEvent>,
}

impl InterfaceEventSink {
    /// Create a sink together with the receiver the router drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<InterfaceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report a property change. Returns false if the router is gone.
    pub fn property_changed(&self, event: Event) -> bool {
        self.send(InterfaceEvent::PropertyChanged(event))
    }

    /// Report that the module list of `domain` changed.
    pub fn modules_changed(&self, domain: impl Into<String>) -> bool {
        self.send(InterfaceEvent::ModulesChanged {
            domain: domain.into(),
        })
    }

    fn send(&self, event: InterfaceEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(e) => {
                debug!(event = ?e.0, "event sink closed, dropping event");
                false
            }
        }
    }
}

/// Storage for a sink that arrives after the interface was constructed.
///
/// Events reported before a sink is set are dropped.
#[derive(Debug, Default)]
pub struct EventSinkSlot {
    sink: RwLock<Option<InterfaceEventSink>>,
}

impl EventSinkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, sink: InterfaceEventSink) {
        *self.sink.write() = Some(sink);
    }

    pub fn is_set(&self) -> bool {
        self.sink.read().is_some()
    }

    pub fn property_changed(&self, event: Event) -> bool {
        match self.sink.read().as_ref() {
            Some(sink) => sink.property_changed(event),
            None => false,
        }
    }

    pub fn modules_changed(&self, domain: impl Into<String>) -> bool {
        match self.sink.read().as_ref() {
            Some(sink) => sink.modules_changed(domain),
            None => false,
        }
    }
}
