//! Host collaborators.
//!
//! The relay only sees the host through these seams:
//! - `event_source`: registration for message-arrival notifications.
//! - `broadcast`: an in-process event source used by the binary and tests.
//! - `permissions`: "is capture authorized?" plus a request operation.
//! - `keep_alive`: best-effort process-lifetime extension.

pub mod broadcast;
pub mod event_source;
pub mod keep_alive;
pub mod permissions;

pub use broadcast::Broadcaster;
pub use event_source::{CaptureReceiver, EventSource, ReceiverId};
pub use keep_alive::{KeepAlive, LogKeepAlive};
pub use permissions::{AuthorizationResult, PermissionProvider, StaticPermissions};
