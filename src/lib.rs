pub mod configuration;
pub mod consumer;
pub mod context;
pub mod controller;
pub mod data_capture;
pub mod error_handling;
pub mod host;
pub mod session_management;
pub mod storage;

pub use configuration::Config;
pub use consumer::{ChannelConsumer, Consumer};
pub use context::RelayContext;
pub use controller::Controller;
pub use session_management::DeliveryCoordinator;
