pub mod driver;
pub mod sampler;
pub mod state;
pub mod types;

pub use driver::SafetyMonitor;
pub use sampler::{ClassifierSlot, Sampler, INVALID_CONFIG_STATUS};
pub use state::{format_status, SafetyStateMachine};
pub use types::{SafetyState, SkyCondition, Verdict};
