pub mod config;
pub mod image;
pub mod models;
pub mod monitor;
pub mod utils;
pub mod web;

// 重新导出主要类型
pub use config::MonitorConfig;
pub use monitor::{SafetyMonitor, SkyCondition, Verdict};
pub use utils::error::MonitorError;

pub type Result<T> = std::result::Result<T, MonitorError>;
