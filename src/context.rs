//! The process-wide context, constructed once at process entry and handed
//! to both capture paths and the coordinator.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::data_capture::fallback::FallbackCapture;
use crate::error_handling::types::CaptureError;
use crate::host::{EventSource, KeepAlive, ReceiverId};
use crate::session_management::AuthorityFlag;
use crate::storage::DurableBuffer;

#[derive(Clone)]
pub struct RelayContext {
    /// Shared between the coordinator (writer) and the fallback path (reader).
    pub authority: Arc<AuthorityFlag>,
    pub buffer: Arc<dyn DurableBuffer>,
    pub events: Arc<dyn EventSource>,
    pub keep_alive: Arc<dyn KeepAlive>,
    /// How long the fallback path asks to be kept alive around a durable write.
    pub keep_alive_for: Duration,
}

impl RelayContext {
    pub fn new(
        buffer: Arc<dyn DurableBuffer>,
        events: Arc<dyn EventSource>,
        keep_alive: Arc<dyn KeepAlive>,
        keep_alive_for: Duration,
    ) -> Self {
        Self {
            authority: Arc::new(AuthorityFlag::new()),
            buffer,
            events,
            keep_alive,
            keep_alive_for,
        }
    }

    /// Registers the install-level fallback receiver. Done once per
    /// process, before or without any coordinator.
    pub fn install_fallback(&self) -> Result<ReceiverId, CaptureError> {
        let id = self.events.register(Arc::new(FallbackCapture::new(self)))?;
        info!("Fallback capture path installed as {}", id);
        Ok(id)
    }
}
