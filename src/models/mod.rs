pub mod classifier;
pub mod manager;

pub use classifier::{OnnxSkyClassifier, SkyClassifier};
pub use manager::{ClassifierProvider, OnnxModelProvider, StaticProvider};
