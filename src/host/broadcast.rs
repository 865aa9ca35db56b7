//! In-process [`EventSource`] that fans capture events out to every
//! registered receiver, the way the host broadcasts message arrivals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, trace, warn};

use super::event_source::{CaptureReceiver, EventSource, ReceiverId};
use crate::data_capture::types::CaptureEvent;
use crate::error_handling::types::CaptureError;

#[derive(Default)]
pub struct Broadcaster {
    receivers: Mutex<Vec<(ReceiverId, Arc<dyn CaptureReceiver>)>>,
    refuse_registrations: AtomicBool,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `register` calls fail, as a host may when the
    /// registering component is being torn down.
    pub fn set_refuse_registrations(&self, refuse: bool) {
        self.refuse_registrations.store(refuse, Ordering::SeqCst);
    }

    pub fn receiver_count(&self) -> usize {
        self.receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers `event` to every receiver registered at the time of the call.
    ///
    /// The receiver list is snapshotted first so callbacks may register or
    /// unregister without deadlocking.
    pub fn dispatch(&self, event: &CaptureEvent) -> usize {
        let snapshot: Vec<Arc<dyn CaptureReceiver>> = self
            .receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, r)| Arc::clone(r))
            .collect();
        trace!(
            "dispatching event with {} part(s) to {} receiver(s)",
            event.parts.len(),
            snapshot.len()
        );
        for receiver in &snapshot {
            receiver.on_receive(event);
        }
        snapshot.len()
    }
}

impl EventSource for Broadcaster {
    fn register(&self, receiver: Arc<dyn CaptureReceiver>) -> Result<ReceiverId, CaptureError> {
        if self.refuse_registrations.load(Ordering::SeqCst) {
            warn!("Refusing registration of receiver '{}'", receiver.name());
            return Err(CaptureError::RegistrationFailed(format!(
                "host refused receiver '{}'",
                receiver.name()
            )));
        }
        let id = ReceiverId::new();
        debug!("Registered receiver '{}' as {}", receiver.name(), id);
        self.receivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, receiver));
        Ok(id)
    }

    fn unregister(&self, id: ReceiverId) -> bool {
        let mut receivers = self.receivers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = receivers.len();
        receivers.retain(|(rid, _)| *rid != id);
        let removed = receivers.len() != before;
        if removed {
            debug!("Unregistered receiver {}", id);
        } else {
            warn!("Receiver {} was not registered", id);
        }
        removed
    }
}
