use std::sync::Arc;

/// 接收 `(tag, message)` 形式的调试跟踪，构造时注入，开关见 `MonitorConfig::debug_logging`
pub trait DebugLog: Send + Sync {
    fn log(&self, tag: &str, message: &str);
}

/// 转发到 `tracing`，仅在启用时输出
#[derive(Debug, Clone, Copy)]
pub struct TracingDebugLog {
    enabled: bool,
}

impl TracingDebugLog {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl DebugLog for TracingDebugLog {
    fn log(&self, tag: &str, message: &str) {
        if self.enabled {
            tracing::info!(tag, "{}", message);
        }
    }
}

/// 空实现
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDebugLog;

impl DebugLog for NullDebugLog {
    fn log(&self, _tag: &str, _message: &str) {}
}

/// 根据配置开关构造调试日志
pub fn debug_log(enabled: bool) -> Arc<dyn DebugLog> {
    if enabled {
        Arc::new(TracingDebugLog::new(true))
    } else {
        Arc::new(NullDebugLog)
    }
}
