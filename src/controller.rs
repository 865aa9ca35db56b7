pub mod controller_handler;

pub use controller_handler::{parse_line, Controller};
