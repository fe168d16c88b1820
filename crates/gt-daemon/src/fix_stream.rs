use std::sync::{Arc, Mutex};

use gt_core::types::{Fix, FixRecord};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::pipeline::FixSink;

/// Item delivered to the attached listener.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamEvent {
    Fix(FixRecord),
    /// The service stopped, or a newer listener replaced this one.
    End,
}

/// Handle returned by [`FixStream::attach`].
#[derive(Debug)]
pub struct FixSubscription {
    pub id: Uuid,
    pub events: flume::Receiver<StreamEvent>,
}

struct Listener {
    id: Uuid,
    tx: flume::Sender<StreamEvent>,
}

/// Single-slot bridge from the long-lived service to an ephemeral UI listener.
///
/// At most one listener is attached; attaching replaces the previous one.
/// Fixes produced while nobody is attached are dropped, never buffered, so
/// a listener only ever sees fixes produced after it attached. Cloning is
/// cheap and every clone shares the slot.
#[derive(Clone, Default)]
pub struct FixStream {
    slot: Arc<Mutex<Option<Listener>>>,
}

impl FixStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener, replacing (and ending) any previous one.
    pub fn attach(&self) -> FixSubscription {
        let (tx, rx) = flume::unbounded();
        let id = Uuid::new_v4();
        let previous = self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(Listener { id, tx });
        if let Some(previous) = previous {
            let _ = previous.tx.send(StreamEvent::End);
            info!(replaced = %previous.id, "fix listener replaced");
        }
        info!(listener_id = %id, "fix listener attached");
        FixSubscription { id, events: rx }
    }

    /// Detach listener `id`. A stale id (already replaced) is a no-op.
    pub fn detach(&self, id: Uuid) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.as_ref().is_some_and(|listener| listener.id == id) {
            slot.take();
            info!(listener_id = %id, "fix listener detached");
            true
        } else {
            debug!(listener_id = %id, "detach ignored, listener not attached");
            false
        }
    }

    /// Send end-of-stream to the attached listener and release it.
    pub fn end(&self) {
        let listener = self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(listener) = listener {
            if listener.tx.send(StreamEvent::End).is_err() {
                debug!(listener_id = %listener.id, "end of stream not delivered, listener gone");
            }
            info!(listener_id = %listener.id, "fix stream ended");
        }
    }

    pub fn has_listener(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    /// Deliver `fix` to the attached listener.
    ///
    /// Returns `false` when the fix was dropped. A listener whose receiver
    /// went away mid-delivery is released; the failure never reaches the
    /// producer.
    pub fn publish(&self, fix: &Fix) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(listener) = slot.as_ref() else {
            debug!(lat = fix.latitude, lon = fix.longitude, "location update (no listener attached)");
            return false;
        };
        match listener.tx.send(StreamEvent::Fix(fix.record())) {
            Ok(()) => {
                debug!(
                    listener_id = %listener.id,
                    lat = fix.latitude,
                    lon = fix.longitude,
                    accuracy = fix.accuracy_meters,
                    "location update"
                );
                true
            }
            Err(_) => {
                warn!(listener_id = %listener.id, "listener write failed (receiver dropped), dropping fix");
                slot.take();
                false
            }
        }
    }
}

impl FixSink for FixStream {
    fn on_fix(&self, fix: Fix) {
        self.publish(&fix);
    }
}
