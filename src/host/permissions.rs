use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Outcome of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResult {
    pub granted: bool,
    /// Whether the caller should explain why the permission is needed
    /// before asking again.
    pub should_show_rationale: bool,
}

/// The permission subsystem as seen by the relay.
pub trait PermissionProvider: Send + Sync {
    fn is_authorized(&self) -> bool;

    fn request_authorization(&self) -> AuthorizationResult;
}

/// Permission state held in memory, toggled by configuration or by the
/// embedding application after its own prompt completes.
#[derive(Debug, Default)]
pub struct StaticPermissions {
    granted: AtomicBool,
    requested: AtomicBool,
}

impl StaticPermissions {
    pub fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
            requested: AtomicBool::new(false),
        }
    }

    pub fn set_granted(&self, granted: bool) {
        info!("Capture permission set to {}", granted);
        self.granted.store(granted, Ordering::SeqCst);
    }
}

impl PermissionProvider for StaticPermissions {
    fn is_authorized(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    fn request_authorization(&self) -> AuthorizationResult {
        let granted = self.is_authorized();
        // A rationale is only due once a previous request was declined.
        let asked_before = self.requested.swap(true, Ordering::SeqCst);
        debug!(
            "Authorization requested: granted={}, asked_before={}",
            granted, asked_before
        );
        AuthorizationResult {
            granted,
            should_show_rationale: !granted && asked_before,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rationale_follows_a_declined_request() {
        let perms = StaticPermissions::new(false);
        let first = perms.request_authorization();
        assert!(!first.granted);
        assert!(!first.should_show_rationale);

        let second = perms.request_authorization();
        assert!(second.should_show_rationale);

        perms.set_granted(true);
        let third = perms.request_authorization();
        assert!(third.granted);
        assert!(!third.should_show_rationale);
        assert!(perms.is_authorized());
    }
}
