pub mod fallback;
pub mod primary;
pub mod types;

pub use fallback::{FallbackCapture, FallbackOutcome};
pub use primary::{DeliverySink, PrimaryCapture};
pub use types::{CaptureEvent, CapturedMessage, ConsumerEvent, MessagePart};
