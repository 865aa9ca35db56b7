//! Registration seam between the capture paths and the host's
//! message-arrival notifications.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::data_capture::types::CaptureEvent;
use crate::error_handling::types::CaptureError;

/// Handle returned by [`EventSource::register`], used to unregister later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverId(Uuid);

impl ReceiverId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReceiverId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReceiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A callback invoked by the host for every capture event.
///
/// Implementations must not panic or propagate failures: a broken callback
/// must not take the registration down for later events.
pub trait CaptureReceiver: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    fn on_receive(&self, event: &CaptureEvent);
}

/// The host facility capture paths register with.
pub trait EventSource: Send + Sync {
    fn register(&self, receiver: Arc<dyn CaptureReceiver>) -> Result<ReceiverId, CaptureError>;

    /// Returns `false` when `id` was not registered.
    fn unregister(&self, id: ReceiverId) -> bool;
}
