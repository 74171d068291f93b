use crate::utils::error::MonitorError;
use crate::Result;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::path::Path;

/// 天空图像来源
pub trait ImageSource: Send + Sync {
    /// 图像源是否可解析（例如文件存在）
    fn is_available(&self, location: &str) -> bool;

    /// 读取并解码图像
    fn load(&self, location: &str) -> Result<DynamicImage>;
}

/// 从本地文件读取图像
#[derive(Debug, Clone, Copy, Default)]
pub struct FileImageSource;

impl ImageSource for FileImageSource {
    fn is_available(&self, location: &str) -> bool {
        !location.is_empty() && Path::new(location).is_file()
    }

    fn load(&self, location: &str) -> Result<DynamicImage> {
        ImageLoader::from_path(location)
    }
}

pub struct ImageLoader;

impl ImageLoader {
    /// 从文件路径加载图像
    pub fn from_path(path: &str) -> Result<DynamicImage> {
        let bytes = std::fs::read(path)
            .map_err(|e| MonitorError::ImageLoad(format!("{}: {}", path, e)))?;

        if let Some(format) = Self::detect_format(&bytes) {
            if !Self::is_supported_format(format) {
                return Err(MonitorError::ImageLoad(format!(
                    "{}: unsupported format {:?}",
                    path, format
                )));
            }
        }

        Self::from_bytes(&bytes)
    }

    /// 从字节流加载图像
    pub fn from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        let image = image::load_from_memory(bytes)?;
        Self::validate_dimensions(&image)?;
        Ok(image)
    }

    /// 检测图像格式
    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    /// 验证图像格式是否支持
    pub fn is_supported_format(format: ImageFormat) -> bool {
        matches!(
            format,
            ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Bmp | ImageFormat::Tiff
        )
    }

    /// 验证图像尺寸
    pub fn validate_dimensions(image: &DynamicImage) -> Result<()> {
        let (width, height) = image.dimensions();

        if width == 0 || height == 0 {
            return Err(MonitorError::ImageLoad(format!(
                "Image has no pixels: {}x{}",
                width, height
            )));
        }

        Ok(())
    }
}
