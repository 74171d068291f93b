pub mod loader;
pub mod preprocessing;

pub use loader::{FileImageSource, ImageLoader, ImageSource};
pub use preprocessing::{ImagePreprocessor, INPUT_SIZE, MAX_SCALED_WIDTH};
