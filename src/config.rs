use crate::utils::error::MonitorError;
use crate::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 分类超时默认值（秒）
pub const DEFAULT_CLASSIFY_TIMEOUT_SECS: u64 = 30;

/// 监控核心消费的配置快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// 当前天空图像的路径，空字符串表示没有可用样本
    pub image_source: String,

    /// 采样周期（分钟）
    pub cycle_period: u32,

    /// 连续多云可容忍的分钟数
    pub cloudy_tolerance: u32,

    /// 连续阴天可容忍的分钟数
    pub covered_tolerance: u32,

    /// 是否输出详细的状态跟踪
    pub debug_logging: bool,

    /// 断开后重新连接时是否保留累计分钟数
    pub persist_hysteresis: bool,

    /// 单次分类调用的超时时间（秒）
    pub classify_timeout_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            image_source: String::new(),
            cycle_period: 1,
            cloudy_tolerance: 2,
            covered_tolerance: 2,
            debug_logging: false,
            persist_hysteresis: false,
            classify_timeout_secs: DEFAULT_CLASSIFY_TIMEOUT_SECS,
        }
    }
}

impl MonitorConfig {
    /// 采样周期
    pub fn cycle_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.cycle_period) * 60)
    }

    /// 分类超时
    pub fn classify_timeout(&self) -> Duration {
        Duration::from_secs(self.classify_timeout_secs)
    }

    pub fn validate(self) -> Result<Self> {
        validate(self)
    }
}

/// 校验配置，任何前端（CLI、HTTP、文件）在交给监控核心之前都应调用
pub fn validate(config: MonitorConfig) -> Result<MonitorConfig> {
    if config.cycle_period < 1 {
        return Err(MonitorError::ConfigInvalid(
            "cycle_period must be at least 1 minute".to_string(),
        ));
    }
    if config.cloudy_tolerance < 1 {
        return Err(MonitorError::ConfigInvalid(
            "cloudy_tolerance must be at least 1 minute".to_string(),
        ));
    }
    if config.covered_tolerance < 1 {
        return Err(MonitorError::ConfigInvalid(
            "covered_tolerance must be at least 1 minute".to_string(),
        ));
    }
    if config.classify_timeout_secs < 1 {
        return Err(MonitorError::ConfigInvalid(
            "classify_timeout_secs must be at least 1 second".to_string(),
        ));
    }
    Ok(config)
}

/// 配置的持久化协作者
pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Result<MonitorConfig>;
    fn save(&self, config: &MonitorConfig) -> Result<()>;
}

/// 以JSON文件保存配置
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for JsonConfigStore {
    fn load(&self) -> Result<MonitorConfig> {
        if !self.path.exists() {
            tracing::debug!(
                "Config file {} not found, using defaults",
                self.path.display()
            );
            return Ok(MonitorConfig::default());
        }

        let raw = fs::read_to_string(&self.path)?;
        let config: MonitorConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    fn save(&self, config: &MonitorConfig) -> Result<()> {
        let config = validate(config.clone())?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let raw = serde_json::to_string_pretty(&config)?;
        fs::write(&self.path, raw)?;
        tracing::info!("Saved monitor config to {}", self.path.display());
        Ok(())
    }
}

/// 内存中的配置存储
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    config: Mutex<MonitorConfig>,
}

impl MemoryConfigStore {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<MonitorConfig> {
        Ok(self.config.lock().clone())
    }

    fn save(&self, config: &MonitorConfig) -> Result<()> {
        let config = validate(config.clone())?;
        *self.config.lock() = config;
        Ok(())
    }
}

/// ONNX Runtime配置
#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// 模型文件路径
    pub model_path: PathBuf,

    /// CPU线程数
    pub intra_threads: usize,

    /// 优化级别
    pub optimization_level: i32,
}

impl OnnxConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        let cpu_cores = num_cpus::get();
        Self {
            model_path: model_path.into(),
            intra_threads: (cpu_cores * 3 / 4).max(1),
            optimization_level: 3,
        }
    }
}

/// HTTP服务配置
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// 请求超时时间（秒）
    pub request_timeout: u64,
}

impl ServerConfig {
    pub fn new(bind_addr: String) -> Self {
        Self {
            bind_addr,
            request_timeout: 60,
        }
    }
}
