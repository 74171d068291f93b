use crate::config::{validate, ConfigStore, MonitorConfig};
use crate::image::ImageSource;
use crate::models::ClassifierProvider;
use crate::monitor::sampler::{ClassifierSlot, Sampler};
use crate::monitor::state::SafetyStateMachine;
use crate::monitor::types::{SafetyState, Verdict};
use crate::utils::error::MonitorError;
use crate::utils::trace::debug_log;
use crate::Result;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

pub const NAME: &str = "AllSkyCondition Monitor";
pub const DESCRIPTION: &str = "AllSky Condition Safety Monitor";
pub const DRIVER_VERSION: &str = "1.0";
pub const INTERFACE_VERSION: i16 = 3;

pub const READY_STATUS: &str = "Ready to monitor.";
pub const MODEL_NOT_FOUND_STATUS: &str = "ERROR: model not found.";

/// 唯一支持的自定义动作
pub const STATUS_ACTION: &str = "status";

/// 面向宿主的安全监视器：连接生命周期 + 查询接口
pub struct SafetyMonitor {
    store: Arc<dyn ConfigStore>,
    provider: Arc<dyn ClassifierProvider>,
    classifier: ClassifierSlot,
    machine: Arc<Mutex<SafetyStateMachine>>,
    verdict: watch::Sender<Verdict>,
    /// 串行化连接/断开，加载模型期间持有
    sampler: Mutex<Sampler>,
    /// 连接状态可随时读取，不等待模型加载
    connected: AtomicBool,
}

impl SafetyMonitor {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        provider: Arc<dyn ClassifierProvider>,
        source: Arc<dyn ImageSource>,
    ) -> Self {
        let defaults = MonitorConfig::default();
        let log = debug_log(false);
        let classifier: ClassifierSlot = Arc::new(RwLock::new(None));
        let machine = Arc::new(Mutex::new(SafetyStateMachine::from_config(&defaults, log.clone())));
        let (verdict, _) = watch::channel(Verdict::initializing());

        let sampler = Sampler::new(
            source,
            Arc::clone(&classifier),
            Arc::clone(&machine),
            verdict.clone(),
            log,
        );

        Self {
            store,
            provider,
            classifier,
            machine,
            verdict,
            sampler: Mutex::new(sampler),
            connected: AtomicBool::new(false),
        }
    }

    /// 加载配置、加载模型并启动采样；已连接时直接返回
    pub fn connect(&self) -> Result<()> {
        let mut sampler = self.sampler.lock();
        if self.connected.load(Ordering::SeqCst) {
            if sampler.is_running() {
                return Ok(());
            }
            tracing::warn!("Sampler stopped unexpectedly, reconnecting");
            sampler.stop();
            self.connected.store(false, Ordering::SeqCst);
        }

        let config = match self.store.load().and_then(validate) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Cannot connect, configuration rejected: {}", e);
                self.publish_unsafe(&format!("Config Error: {}", e));
                return Err(e);
            }
        };

        let log = debug_log(config.debug_logging);

        let classifier = match self.provider.provision() {
            Ok(classifier) => classifier,
            Err(e) => {
                tracing::error!("Cannot connect, classifier provisioning failed: {}", e);
                let status = match &e {
                    MonitorError::ModelNotFound(_) => MODEL_NOT_FOUND_STATUS.to_string(),
                    other => format!("Model Error: {}", other),
                };
                self.publish_unsafe(&status);
                return Err(e);
            }
        };

        // 之前会话仍在执行的周期不得写入新会话的状态
        sampler.supersede();
        let ready = {
            let mut machine = self.machine.lock();
            if config.persist_hysteresis {
                machine.reconfigure(&config, log.clone());
            } else {
                *machine = SafetyStateMachine::from_config(&config, log.clone());
            }
            machine.set_status(READY_STATUS)
        };
        self.verdict.send_replace(ready);

        *self.classifier.write() = Some(classifier);
        sampler.set_debug_log(log);

        if let Err(e) = sampler.start(config) {
            tracing::error!("Failed to start sampler: {}", e);
            *self.classifier.write() = None;
            self.publish_unsafe(&format!("Check Error: {}", e));
            return Err(e);
        }

        self.connected.store(true, Ordering::SeqCst);
        tracing::info!("Safety monitor connected");
        Ok(())
    }

    /// 停止采样并释放模型；未连接时直接返回
    pub fn disconnect(&self) {
        let mut sampler = self.sampler.lock();
        if !self.connected.load(Ordering::SeqCst) {
            return;
        }

        sampler.stop();
        *self.classifier.write() = None;
        self.connected.store(false, Ordering::SeqCst);
        tracing::info!("Safety monitor disconnected");
    }

    /// 按布尔值连接或断开
    pub fn set_connected(&self, connected: bool) -> Result<()> {
        if connected {
            self.connect()
        } else {
            self.disconnect();
            Ok(())
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_safe(&self) -> bool {
        self.verdict.borrow().is_safe
    }

    pub fn status(&self) -> String {
        self.verdict.borrow().status.clone()
    }

    /// 一次性读取 `(is_safe, status)`，不会读到半更新的状态
    pub fn verdict(&self) -> Verdict {
        self.verdict.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Verdict> {
        self.verdict.subscribe()
    }

    pub fn safety_state(&self) -> SafetyState {
        self.machine.lock().state().clone()
    }

    pub fn action(&self, name: &str, _parameters: &str) -> Result<String> {
        if name.eq_ignore_ascii_case(STATUS_ACTION) {
            return Ok(self.status());
        }
        Err(MonitorError::NotImplemented(format!("Action '{}'", name)))
    }

    pub fn supported_actions(&self) -> Vec<String> {
        vec![STATUS_ACTION.to_string()]
    }

    pub fn command_blind(&self, _command: &str, _raw: bool) -> Result<()> {
        Err(MonitorError::NotImplemented("CommandBlind".to_string()))
    }

    pub fn command_bool(&self, _command: &str, _raw: bool) -> Result<bool> {
        Err(MonitorError::NotImplemented("CommandBool".to_string()))
    }

    pub fn command_string(&self, _command: &str, _raw: bool) -> Result<String> {
        Err(MonitorError::NotImplemented("CommandString".to_string()))
    }

    pub fn name(&self) -> &'static str {
        NAME
    }

    pub fn description(&self) -> &'static str {
        DESCRIPTION
    }

    pub fn driver_info(&self) -> String {
        format!(
            "Monitors sky condition via image analysis. Status: {}",
            self.status()
        )
    }

    pub fn driver_version(&self) -> &'static str {
        DRIVER_VERSION
    }

    pub fn interface_version(&self) -> i16 {
        INTERFACE_VERSION
    }

    /// 当前持久化的配置
    pub fn config(&self) -> Result<MonitorConfig> {
        self.store.load()
    }

    /// 校验并保存配置，下次连接时生效
    pub fn update_config(&self, config: MonitorConfig) -> Result<MonitorConfig> {
        let config = validate(config)?;
        self.store.save(&config)?;
        tracing::info!("Monitor configuration updated; applies on next connect");
        Ok(config)
    }

    fn publish_unsafe(&self, status: &str) {
        let verdict = self.machine.lock().mark_unsafe(status);
        self.verdict.send_replace(verdict);
    }
}

impl Drop for SafetyMonitor {
    fn drop(&mut self) {
        self.disconnect();
    }
}
