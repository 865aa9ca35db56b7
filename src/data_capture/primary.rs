//! Primary capture path: registered only while a session is listening.

use std::sync::Weak;

use log::{debug, trace, warn};

use super::types::{CaptureEvent, CapturedMessage};
use crate::error_handling::types::CaptureError;
use crate::host::CaptureReceiver;
use crate::session_management::DeliveryOutcome;

/// Where the primary path hands its messages: the coordinator's
/// immediate-deliver operation.
pub trait DeliverySink: Send + Sync {
    fn deliver(&self, message: CapturedMessage) -> DeliveryOutcome;
}

/// Decodes events and passes them straight to the coordinator.
///
/// It never writes to the durable buffer: it only exists while a session
/// is alive in this process, so the pending queue is enough.
pub struct PrimaryCapture {
    sink: Weak<dyn DeliverySink>,
}

impl PrimaryCapture {
    pub fn new(sink: Weak<dyn DeliverySink>) -> Self {
        Self { sink }
    }

    pub fn handle(&self, event: &CaptureEvent) -> Result<DeliveryOutcome, CaptureError> {
        let message = CapturedMessage::from_event(event)?;
        trace!("[primary] captured {} byte(s) from {}", message.body.len(), message.sender);
        let sink = self.sink.upgrade().ok_or_else(|| {
            CaptureError::RegistrationFailed("session owning the primary path is gone".into())
        })?;
        Ok(sink.deliver(message))
    }
}

impl CaptureReceiver for PrimaryCapture {
    fn name(&self) -> &str {
        "primary"
    }

    fn on_receive(&self, event: &CaptureEvent) {
        match self.handle(event) {
            Ok(outcome) => debug!("[primary] event handled: {:?}", outcome),
            Err(CaptureError::MalformedEvent(reason)) => {
                warn!("[primary] discarding malformed event: {}", reason)
            }
            Err(e) => warn!("[primary] event not handled: {}", e),
        }
    }
}
