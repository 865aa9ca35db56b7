use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide "primary path is active" flag.
///
/// Written only by the coordinator on session transitions; read by the
/// fallback path before it claims an event. Starts `false`, which is also
/// what the fallback path sees before any coordinator exists.
#[derive(Debug, Default)]
pub struct AuthorityFlag {
    primary_active: AtomicBool,
}

impl AuthorityFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_primary_active(&self) -> bool {
        self.primary_active.load(Ordering::SeqCst)
    }

    pub(crate) fn set_primary_active(&self, active: bool) {
        self.primary_active.store(active, Ordering::SeqCst);
    }
}
