use crate::config::OnnxConfig;
use crate::models::{OnnxSkyClassifier, SkyClassifier};
use crate::Result;
use std::sync::Arc;

/// 分类器的提供者，在连接时加载模型
pub trait ClassifierProvider: Send + Sync {
    fn provision(&self) -> Result<Arc<dyn SkyClassifier>>;
}

/// 从磁盘上的 ONNX 模型文件加载分类器
#[derive(Debug, Clone)]
pub struct OnnxModelProvider {
    config: OnnxConfig,
}

impl OnnxModelProvider {
    pub fn new(config: OnnxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OnnxConfig {
        &self.config
    }
}

impl ClassifierProvider for OnnxModelProvider {
    fn provision(&self) -> Result<Arc<dyn SkyClassifier>> {
        tracing::info!(
            "Provisioning classifier (intra_threads={}, optimization_level={})",
            self.config.intra_threads,
            self.config.optimization_level
        );

        let classifier = OnnxSkyClassifier::new(&self.config)?;
        tracing::info!("Sky classification model loaded successfully");
        Ok(Arc::new(classifier))
    }
}

/// 直接返回已有分类器的提供者
#[derive(Clone)]
pub struct StaticProvider {
    classifier: Arc<dyn SkyClassifier>,
}

impl StaticProvider {
    pub fn new(classifier: Arc<dyn SkyClassifier>) -> Self {
        Self { classifier }
    }
}

impl ClassifierProvider for StaticProvider {
    fn provision(&self) -> Result<Arc<dyn SkyClassifier>> {
        Ok(Arc::clone(&self.classifier))
    }
}
