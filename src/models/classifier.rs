use crate::config::OnnxConfig;
use crate::utils::error::MonitorError;
use crate::Result;
use ndarray::Array4;
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;

/// 模型输入张量名称（由 keras 模型转换时指定）
const INPUT_NAME: &str = "input";

/// 天空状态分类能力
///
/// 输入为 `[1, 224, 224, 3]` 的预处理张量，输出按
/// `[Clear, Cloudy, Covered, Rainy]` 排列的分数。实现可能很慢，调用方负责超时。
pub trait SkyClassifier: Send + Sync {
    fn classify(&self, input: &Array4<f32>) -> Result<Vec<f32>>;
}

/// 基于 ONNX Runtime 的分类器
pub struct OnnxSkyClassifier {
    session: Mutex<Session>,
    output_name: String, // 动态发现的输出名称
}

impl OnnxSkyClassifier {
    pub fn new(config: &OnnxConfig) -> Result<Self> {
        let model_path = &config.model_path;

        if !model_path.exists() {
            return Err(MonitorError::ModelNotFound(model_path.clone()));
        }

        tracing::info!("Loading sky classification model from: {}", model_path.display());

        let session = Session::builder()?
            .with_optimization_level(optimization_level(config.optimization_level))?
            .with_intra_threads(config.intra_threads)?
            .commit_from_file(model_path)?;

        let output_name = match session.outputs.first() {
            Some(output) => output.name.clone(),
            None => {
                return Err(MonitorError::ModelLoad(
                    "Classification model has no outputs".to_string(),
                ))
            }
        };
        tracing::info!("Sky classification model output: '{}'", output_name);

        for (i, output) in session.outputs.iter().enumerate() {
            tracing::debug!("Classification output[{}]: '{}'", i, output.name);
        }

        Ok(Self {
            session: Mutex::new(session),
            output_name,
        })
    }
}

impl SkyClassifier for OnnxSkyClassifier {
    fn classify(&self, input: &Array4<f32>) -> Result<Vec<f32>> {
        let input_tensor = Tensor::from_array(input.clone())?;

        let mut session = self.session.lock();
        let outputs = session.run(inputs![INPUT_NAME => input_tensor])?;

        let scores = match outputs.get(&self.output_name) {
            Some(output) => output.try_extract_array::<f32>()?,
            None => {
                let available: Vec<String> = outputs.keys().map(|s| s.to_string()).collect();
                return Err(MonitorError::ClassifierInvocation(format!(
                    "output '{}' not found. Available outputs: {:?}",
                    self.output_name, available
                )));
            }
        };

        Ok(scores.iter().copied().collect())
    }
}

fn optimization_level(level: i32) -> GraphOptimizationLevel {
    match level {
        i32::MIN..=0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_is_reported_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = OnnxConfig::new(dir.path().join("model.onnx"));

        match OnnxSkyClassifier::new(&config) {
            Err(MonitorError::ModelNotFound(path)) => assert_eq!(path, config.model_path),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("model should not load"),
        }
    }
}
