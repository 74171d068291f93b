pub mod error;
pub mod trace;

pub use error::MonitorError;
pub use trace::{debug_log, DebugLog, NullDebugLog, TracingDebugLog};
