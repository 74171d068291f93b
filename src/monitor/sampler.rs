use crate::config::MonitorConfig;
use crate::image::{ImagePreprocessor, ImageSource};
use crate::models::SkyClassifier;
use crate::monitor::state::SafetyStateMachine;
use crate::monitor::types::{SkyCondition, Verdict};
use crate::utils::error::MonitorError;
use crate::utils::trace::DebugLog;
use crate::Result;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// 配置或模型不可用时的状态文本
pub const INVALID_CONFIG_STATUS: &str = "Unsafe: Invalid config or model";

/// 当前已加载的分类器，断开连接时清空
pub type ClassifierSlot = Arc<RwLock<Option<Arc<dyn SkyClassifier>>>>;

/// 采样周期共享的上下文
struct CycleContext {
    source: Arc<dyn ImageSource>,
    classifier: ClassifierSlot,
    machine: Arc<Mutex<SafetyStateMachine>>,
    verdict: watch::Sender<Verdict>,
    /// 同一时间只执行一个周期
    cycle_lock: tokio::sync::Mutex<()>,
    /// 会话代数；被新会话取代的周期仍发布结果，但不写入滞后状态
    generation: AtomicU64,
    log: RwLock<Arc<dyn DebugLog>>,
}

struct RunningTask {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

/// 周期采样：启动后立即执行一次，之后每 `cycle_period` 分钟执行一次
///
/// 错过的 tick 直接跳过；新会话的首个周期会等待上一会话仍在执行的周期结束。
pub struct Sampler {
    context: Arc<CycleContext>,
    running: Option<RunningTask>,
    draining: Vec<JoinHandle<()>>,
}

impl Sampler {
    pub fn new(
        source: Arc<dyn ImageSource>,
        classifier: ClassifierSlot,
        machine: Arc<Mutex<SafetyStateMachine>>,
        verdict: watch::Sender<Verdict>,
        log: Arc<dyn DebugLog>,
    ) -> Self {
        Self {
            context: Arc::new(CycleContext {
                source,
                classifier,
                machine,
                verdict,
                cycle_lock: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
                log: RwLock::new(log),
            }),
            running: None,
            draining: Vec::new(),
        }
    }

    /// 替换调试日志，下一个周期生效
    pub fn set_debug_log(&self, log: Arc<dyn DebugLog>) {
        *self.context.log.write() = log;
    }

    /// 开启新会话，之前仍在执行的周期不再写入滞后状态
    pub fn supersede(&self) -> u64 {
        self.context.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 立即执行一次，然后每 `cycle_period` 分钟执行一次，直到 `stop()`
    pub fn start(&mut self, config: MonitorConfig) -> Result<()> {
        let config = config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            MonitorError::Internal(format!("sampler requires a tokio runtime: {}", e))
        })?;

        if self.running.is_some() {
            tracing::debug!("Sampler already running, restarting with new config");
            self.stop();
        }

        let generation = self.supersede();
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let context = Arc::clone(&self.context);

        tracing::info!(
            "Starting sampler: source='{}', cycle={}min, cloudy_tolerance={}min, covered_tolerance={}min",
            config.image_source,
            config.cycle_period,
            config.cloudy_tolerance,
            config.covered_tolerance
        );

        let handle = runtime.spawn(async move {
            let period = config.cycle_duration();
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_rx.changed() => break,
                }

                let started = Instant::now();
                context.run_cycle(&config, generation, true).await;

                let elapsed = started.elapsed();
                if elapsed > period {
                    tracing::warn!(
                        "Sampling cycle took {:.1}s, longer than the {}min period; missed ticks are skipped",
                        elapsed.as_secs_f32(),
                        config.cycle_period
                    );
                }

                if *stop_rx.borrow() {
                    break;
                }
            }

            tracing::info!("Sampler stopped");
        });

        self.running = Some(RunningTask {
            handle,
            stop: stop_tx,
        });
        Ok(())
    }

    /// 取消后续周期；正在执行的周期会完成并发布结果
    pub fn stop(&mut self) {
        if let Some(task) = self.running.take() {
            let _ = task.stop.send(true);
            self.draining.push(task.handle);
        }
        self.draining.retain(|handle| !handle.is_finished());
    }

    /// 停止并等待后台任务退出
    pub async fn shutdown(&mut self) {
        self.stop();
        for handle in self.draining.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!("Sampler task ended abnormally: {}", e);
            }
        }
    }

    /// 后台任务是否仍在运行
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map(|task| !task.handle.is_finished())
            .unwrap_or(false)
    }

    /// 手动执行一个周期；已有周期在执行时跳过并返回 `None`
    pub async fn run_once(&self, config: &MonitorConfig) -> Option<Verdict> {
        let generation = self.context.generation.load(Ordering::SeqCst);
        self.context.run_cycle(config, generation, false).await
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl CycleContext {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn run_cycle(
        &self,
        config: &MonitorConfig,
        generation: u64,
        wait: bool,
    ) -> Option<Verdict> {
        let log = self.log.read().clone();

        let _guard = if wait {
            self.cycle_lock.lock().await
        } else {
            match self.cycle_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::warn!("Previous sampling cycle still running, skipping this one");
                    log.log("CheckSafety", "Skipped: previous cycle still running");
                    return None;
                }
            }
        };

        if !self.is_current(generation) {
            tracing::debug!("Sampling session superseded before its cycle started");
            return None;
        }

        let verdict = self.evaluate(config, generation, log.as_ref()).await;
        self.verdict.send_replace(verdict.clone());
        Some(verdict)
    }

    async fn evaluate(
        &self,
        config: &MonitorConfig,
        generation: u64,
        log: &dyn DebugLog,
    ) -> Verdict {
        let classifier = self.classifier.read().clone();

        let classifier = match classifier {
            Some(classifier) if self.source.is_available(&config.image_source) => classifier,
            Some(_) => {
                tracing::warn!("Image source '{}' is not available", config.image_source);
                return self.fail(INVALID_CONFIG_STATUS, generation, log);
            }
            None => {
                tracing::warn!("{}", MonitorError::ClassifierUnavailable);
                return self.fail(INVALID_CONFIG_STATUS, generation, log);
            }
        };

        match self.classify(classifier, config).await {
            Ok(condition) => {
                tracing::debug!("Sky classified as {}", condition);
                self.apply(generation, |machine| machine.update(condition, config.cycle_period))
            }
            Err(e) => {
                if e.is_image_load() {
                    tracing::warn!("Sky image could not be read: {}", e);
                } else {
                    tracing::warn!("Sampling cycle failed: {}", e);
                }
                self.fail(&format!("Check Error: {}", e), generation, log)
            }
        }
    }

    fn fail(&self, status: &str, generation: u64, log: &dyn DebugLog) -> Verdict {
        log.log("CheckSafety", status);
        self.apply(generation, |machine| machine.mark_unsafe(status))
    }

    /// 当前会话写入共享状态机；已被取代的会话只在副本上计算结果
    fn apply(
        &self,
        generation: u64,
        step: impl FnOnce(&mut SafetyStateMachine) -> Verdict,
    ) -> Verdict {
        let mut machine = self.machine.lock();
        if self.is_current(generation) {
            step(&mut machine)
        } else {
            tracing::debug!("Sampling session superseded, result not applied to hysteresis state");
            let mut detached = machine.clone();
            step(&mut detached)
        }
    }

    async fn classify(
        &self,
        classifier: Arc<dyn SkyClassifier>,
        config: &MonitorConfig,
    ) -> Result<SkyCondition> {
        let source = Arc::clone(&self.source);
        let location = config.image_source.clone();

        let tensor = tokio::task::spawn_blocking(move || {
            let image = source.load(&location)?;
            ImagePreprocessor::preprocess(&image)
        })
        .await
        .map_err(|e| MonitorError::Internal(format!("preprocessing task failed: {}", e)))??;

        let timeout = config.classify_timeout();
        let classification = tokio::task::spawn_blocking(move || classifier.classify(&tensor));

        let scores = match tokio::time::timeout(timeout, classification).await {
            Ok(joined) => joined.map_err(|e| {
                MonitorError::ClassifierInvocation(format!("classification task failed: {}", e))
            })??,
            Err(_) => return Err(MonitorError::ClassifierTimeout(timeout)),
        };

        SkyCondition::from_scores(&scores)
    }
}
