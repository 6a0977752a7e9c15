use std::panic::{AssertUnwindSafe, catch_unwind};

use log::warn;
use parking_lot::Mutex;
use thiserror::Error;

use crate::event::ChangeRecord;

/// Error a listener may report back. Logged, never propagated.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ListenerError(pub String);

/// Callback invoked for every emitted change
pub type Listener = Box<dyn FnMut(&ChangeRecord) -> Result<(), ListenerError> + Send>;

/// Handle returned by [`EventBus::subscribe`], needed to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Broadcasts change records to registered listeners
pub struct EventBus {
    handlers: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_id: Mutex<u64>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &format!("<{} handlers>", self.handlers.lock().len()))
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates a new event bus
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
        }
    }

    /// Subscribe a listener to receive change records
    pub fn subscribe(&self, listener: Listener) -> SubscriptionId {
        let id = {
            let mut next = self.next_id.lock();
            let id = SubscriptionId(*next);
            *next += 1;
            id
        };
        self.handlers.lock().push((id, listener));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Deliver a record to every listener.
    ///
    /// Listeners must not subscribe or unsubscribe from inside the callback.
    /// A listener that errors or panics is logged and skipped; the rest still
    /// get the record. Returns the number of failed listeners.
    pub fn emit(&self, record: &ChangeRecord) -> usize {
        let mut failures = 0;
        for (id, handler) in self.handlers.lock().iter_mut() {
            match catch_unwind(AssertUnwindSafe(|| handler(record))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!("Change listener {:?} failed on {}: {}", id, record.kind, e);
                }
                Err(_) => {
                    failures += 1;
                    warn!("Change listener {:?} panicked on {}", id, record.kind);
                }
            }
        }
        failures
    }
}
