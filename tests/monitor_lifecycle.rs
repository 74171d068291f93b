//! End-to-end tests of the monitor lifecycle using stub classifiers and
//! in-memory images.

use allsky_condition::config::{
    ConfigStore, JsonConfigStore, MemoryConfigStore, MonitorConfig, OnnxConfig,
};
use allsky_condition::image::{ImagePreprocessor, ImageSource};
use allsky_condition::models::{
    ClassifierProvider, OnnxModelProvider, SkyClassifier, StaticProvider,
};
use allsky_condition::monitor::driver::{MODEL_NOT_FOUND_STATUS, READY_STATUS};
use allsky_condition::monitor::INVALID_CONFIG_STATUS;
use allsky_condition::{MonitorError, Result, SafetyMonitor, SkyCondition, Verdict};
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

const SKY: &str = "memory://sky";

struct MemorySource;

impl ImageSource for MemorySource {
    fn is_available(&self, location: &str) -> bool {
        location == SKY
    }

    fn load(&self, location: &str) -> Result<DynamicImage> {
        if location != SKY {
            return Err(MonitorError::ImageLoad(location.to_string()));
        }
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(640, 480, Rgb([120, 130, 140]))))
    }
}

struct AlwaysClass(SkyCondition);

impl SkyClassifier for AlwaysClass {
    fn classify(&self, _input: &Array4<f32>) -> Result<Vec<f32>> {
        let mut scores = vec![0.05; 4];
        scores[self.0.index()] = 0.85;
        Ok(scores)
    }
}

/// 每次分类耗时固定，并记录调用次数
struct SlowCloudy {
    delay: Duration,
    calls: AtomicUsize,
}

impl SlowCloudy {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SkyClassifier for SlowCloudy {
    fn classify(&self, _input: &Array4<f32>) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(vec![0.1, 0.7, 0.1, 0.1])
    }
}

fn monitor_with(condition: SkyCondition, config: MonitorConfig) -> SafetyMonitor {
    SafetyMonitor::new(
        Arc::new(MemoryConfigStore::new(config)),
        Arc::new(StaticProvider::new(Arc::new(AlwaysClass(condition)))),
        Arc::new(MemorySource),
    )
}

fn sky_config() -> MonitorConfig {
    MonitorConfig {
        image_source: SKY.to_string(),
        ..Default::default()
    }
}

async fn wait_for(monitor: &SafetyMonitor, needle: &str) -> Verdict {
    let mut rx = monitor.subscribe();
    let seen = rx.wait_for(|v| v.status.contains(needle));
    let verdict = tokio::time::timeout(Duration::from_secs(10), seen)
        .await
        .unwrap_or_else(|_| panic!("no verdict containing '{needle}'"))
        .expect("verdict channel closed")
        .clone();
    verdict
}

#[test]
fn preprocess_then_stub_yields_clear_go() {
    let image = MemorySource.load(SKY).unwrap();
    let tensor = ImagePreprocessor::preprocess(&image).unwrap();
    let scores = AlwaysClass(SkyCondition::Clear).classify(&tensor).unwrap();
    let condition = SkyCondition::from_scores(&scores).unwrap();
    assert_eq!(condition, SkyCondition::Clear);
}

#[tokio::test]
async fn connect_runs_first_cycle_immediately() {
    let monitor = monitor_with(SkyCondition::Clear, sky_config());
    assert_eq!(monitor.status(), "Initializing");
    assert!(monitor.is_safe());

    monitor.connect().unwrap();
    assert!(monitor.is_connected());

    let verdict = wait_for(&monitor, "Clear: GO").await;
    assert!(verdict.is_safe);
    assert!(monitor.is_safe());
    assert_eq!(monitor.action("status", "").unwrap(), verdict.status);
    assert_eq!(monitor.action("STATUS", "").unwrap(), verdict.status);

    monitor.disconnect();
    assert!(!monitor.is_connected());
}

#[tokio::test]
async fn status_text_has_clock_prefix() {
    let monitor = monitor_with(SkyCondition::Rainy, sky_config());
    monitor.connect().unwrap();

    let verdict = wait_for(&monitor, "Rainy: STOP").await;
    assert!(!verdict.is_safe);

    let (clock, decision) = verdict.status.split_once(" - ").unwrap();
    assert_eq!(decision, "Rainy: STOP");
    assert_eq!(clock.len(), 8);
    assert!(chrono::NaiveTime::parse_from_str(clock, "%H:%M:%S").is_ok());
}

#[tokio::test]
async fn connect_and_disconnect_are_idempotent() {
    let monitor = monitor_with(SkyCondition::Clear, sky_config());
    monitor.disconnect();
    assert!(!monitor.is_connected());

    monitor.connect().unwrap();
    monitor.connect().unwrap();
    assert!(monitor.is_connected());

    monitor.disconnect();
    monitor.disconnect();
    assert!(!monitor.is_connected());
}

#[tokio::test]
async fn unknown_actions_are_not_implemented() {
    let monitor = monitor_with(SkyCondition::Clear, sky_config());
    let err = monitor.action("opendome", "").unwrap_err();
    assert!(matches!(err, MonitorError::NotImplemented(_)));
    assert!(monitor.command_blind("x", false).is_err());
    assert!(monitor.command_bool("x", true).is_err());
    assert!(monitor.command_string("x", false).is_err());
    assert_eq!(monitor.supported_actions(), vec!["status".to_string()]);
}

#[tokio::test]
async fn missing_model_leaves_monitor_disconnected() {
    let dir = tempfile::tempdir().unwrap();
    let provider = OnnxModelProvider::new(OnnxConfig::new(dir.path().join("model.onnx")));
    let monitor = SafetyMonitor::new(
        Arc::new(MemoryConfigStore::new(sky_config())),
        Arc::new(provider),
        Arc::new(MemorySource),
    );

    let err = monitor.connect().unwrap_err();
    assert!(matches!(err, MonitorError::ModelNotFound(_)));
    assert!(!monitor.is_connected());
    assert_eq!(monitor.verdict(), Verdict::unsafe_with(MODEL_NOT_FOUND_STATUS));
}

#[tokio::test]
async fn empty_image_source_reports_invalid_config() {
    let monitor = monitor_with(SkyCondition::Clear, MonitorConfig::default());
    monitor.connect().unwrap();

    let verdict = wait_for(&monitor, INVALID_CONFIG_STATUS).await;
    assert!(!verdict.is_safe);
    assert!(monitor.is_connected());
}

#[tokio::test]
async fn invalid_stored_config_blocks_connect() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("monitor.json");
    std::fs::write(&path, r#"{"image_source": "memory://sky", "cycle_period": 0}"#).unwrap();

    let monitor = SafetyMonitor::new(
        Arc::new(JsonConfigStore::new(&path)),
        Arc::new(StaticProvider::new(Arc::new(AlwaysClass(SkyCondition::Clear)))),
        Arc::new(MemorySource),
    );

    let err = monitor.connect().unwrap_err();
    assert!(matches!(err, MonitorError::ConfigInvalid(_)));
    assert!(!monitor.is_connected());
    assert!(!monitor.is_safe());
    assert!(monitor.status().starts_with("Config Error: "));
}

#[tokio::test]
async fn update_config_validates_before_saving() {
    let monitor = monitor_with(SkyCondition::Clear, MonitorConfig::default());
    let err = monitor
        .update_config(MonitorConfig { cloudy_tolerance: 0, ..sky_config() })
        .unwrap_err();
    assert!(matches!(err, MonitorError::ConfigInvalid(_)));

    let saved = monitor.update_config(sky_config()).unwrap();
    assert_eq!(monitor.config().unwrap(), saved);
}

#[tokio::test]
async fn hysteresis_resets_on_reconnect_by_default() {
    let monitor = monitor_with(SkyCondition::Cloudy, sky_config());

    monitor.connect().unwrap();
    wait_for(&monitor, "Cloudy").await;
    assert_eq!(monitor.safety_state().cloudy_accumulated_minutes, 1);
    monitor.disconnect();

    monitor.connect().unwrap();
    assert_eq!(monitor.status(), READY_STATUS);
    wait_for(&monitor, "Cloudy").await;
    assert_eq!(monitor.safety_state().cloudy_accumulated_minutes, 1);
    monitor.disconnect();
}

#[tokio::test]
async fn hysteresis_persists_across_reconnect_when_enabled() {
    let config = MonitorConfig {
        persist_hysteresis: true,
        ..sky_config()
    };
    let monitor = monitor_with(SkyCondition::Cloudy, config);

    monitor.connect().unwrap();
    wait_for(&monitor, "Cloudy").await;
    assert_eq!(monitor.safety_state().cloudy_accumulated_minutes, 1);
    monitor.disconnect();

    monitor.connect().unwrap();
    assert_eq!(monitor.status(), READY_STATUS);
    let verdict = wait_for(&monitor, "Cloudy").await;
    assert_eq!(monitor.safety_state().cloudy_accumulated_minutes, 2);
    assert!(verdict.status.ends_with("Cloudy: PAUSE (in tolerance)"));
    monitor.disconnect();
}

#[tokio::test]
async fn config_changes_apply_on_next_connect() {
    let store = Arc::new(MemoryConfigStore::new(MonitorConfig::default()));
    let monitor = SafetyMonitor::new(
        store.clone(),
        Arc::new(StaticProvider::new(Arc::new(AlwaysClass(SkyCondition::Covered)))),
        Arc::new(MemorySource),
    );

    monitor.connect().unwrap();
    wait_for(&monitor, INVALID_CONFIG_STATUS).await;

    monitor.update_config(sky_config()).unwrap();
    assert_eq!(store.load().unwrap(), sky_config());
    monitor.disconnect();
    monitor.connect().unwrap();

    let verdict = wait_for(&monitor, "Covered").await;
    assert!(verdict.is_safe);
    assert!(verdict.status.ends_with("Covered: PAUSE (in tolerance)"));
}

#[tokio::test]
async fn reconnect_during_cycle_starts_a_fresh_session() {
    let classifier = SlowCloudy::new(Duration::from_millis(600));
    let monitor = SafetyMonitor::new(
        Arc::new(MemoryConfigStore::new(sky_config())),
        Arc::new(StaticProvider::new(classifier.clone())),
        Arc::new(MemorySource),
    );

    monitor.connect().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    monitor.disconnect();
    monitor.connect().unwrap();
    assert_eq!(monitor.safety_state().cloudy_accumulated_minutes, 0);

    tokio::time::timeout(Duration::from_secs(10), async {
        while classifier.calls() < 2
            || !monitor.safety_state().status_message.contains("Cloudy")
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("new session should sample right after the draining cycle");

    assert_eq!(classifier.calls(), 2);
    let state = monitor.safety_state();
    assert_eq!(state.cloudy_accumulated_minutes, 1);
    assert!(state.status_message.ends_with("Cloudy: PAUSE (in tolerance)"));
    monitor.disconnect();
}

#[tokio::test]
async fn disconnect_still_publishes_in_flight_cycle() {
    let classifier = SlowCloudy::new(Duration::from_millis(400));
    let monitor = SafetyMonitor::new(
        Arc::new(MemoryConfigStore::new(sky_config())),
        Arc::new(StaticProvider::new(classifier.clone())),
        Arc::new(MemorySource),
    );

    monitor.connect().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    monitor.disconnect();
    assert!(!monitor.is_connected());

    let verdict = wait_for(&monitor, "Cloudy").await;
    assert!(verdict.is_safe);
    assert_eq!(classifier.calls(), 1);
}

struct BrokenModel;

impl ClassifierProvider for BrokenModel {
    fn provision(&self) -> Result<Arc<dyn SkyClassifier>> {
        Err(MonitorError::ModelLoad("graph has no outputs".to_string()))
    }
}

#[tokio::test]
async fn model_load_failure_reports_model_error() {
    let monitor = SafetyMonitor::new(
        Arc::new(MemoryConfigStore::new(sky_config())),
        Arc::new(BrokenModel),
        Arc::new(MemorySource),
    );

    let err = monitor.connect().unwrap_err();
    assert!(matches!(err, MonitorError::ModelLoad(_)));
    assert!(!monitor.is_connected());
    assert_eq!(
        monitor.verdict(),
        Verdict::unsafe_with("Model Error: Model loading failed: graph has no outputs")
    );
}

/// 模型加载阻塞，直到测试放行
struct GatedProvider {
    started: parking_lot::Mutex<mpsc::Sender<()>>,
    release: parking_lot::Mutex<mpsc::Receiver<()>>,
}

impl ClassifierProvider for GatedProvider {
    fn provision(&self) -> Result<Arc<dyn SkyClassifier>> {
        let _ = self.started.lock().send(());
        let _ = self.release.lock().recv();
        Ok(Arc::new(AlwaysClass(SkyCondition::Clear)))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connection_state_is_readable_while_model_loads() {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let monitor = Arc::new(SafetyMonitor::new(
        Arc::new(MemoryConfigStore::new(sky_config())),
        Arc::new(GatedProvider {
            started: parking_lot::Mutex::new(started_tx),
            release: parking_lot::Mutex::new(release_rx),
        }),
        Arc::new(MemorySource),
    ));

    let connecting = {
        let monitor = Arc::clone(&monitor);
        tokio::task::spawn_blocking(move || monitor.connect())
    };
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    let (seen_tx, seen_rx) = mpsc::channel();
    {
        let monitor = Arc::clone(&monitor);
        std::thread::spawn(move || {
            let _ = seen_tx.send(monitor.is_connected());
        });
    }
    let connected = seen_rx.recv_timeout(Duration::from_secs(2));
    release_tx.send(()).unwrap();

    assert_eq!(connected, Ok(false), "is_connected blocked on model loading");
    connecting.await.unwrap().unwrap();
    assert!(monitor.is_connected());
    monitor.disconnect();
}
