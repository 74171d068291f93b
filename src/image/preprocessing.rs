use crate::utils::error::MonitorError;
use crate::Result;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use ndarray::Array4;

/// 分类器输入边长
pub const INPUT_SIZE: u32 = 224;

/// 亮度权重 (R, G, B)
const LUMA_WEIGHTS: [f32; 3] = [0.3, 0.59, 0.11];

/// 归一化除数，训练模型使用 127 而非 127.5
const NORMALIZE_DIVISOR: f32 = 127.0;

/// 缩放后允许的最大宽度
pub const MAX_SCALED_WIDTH: u32 = INPUT_SIZE * 16;

/// 天空图像预处理：灰度 -> 三通道 -> 等比缩放 -> 中心裁剪 -> 归一化
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// 生成 [1, 224, 224, 3] (NHWC) 的 f32 张量
    pub fn preprocess(image: &DynamicImage) -> Result<Array4<f32>> {
        let new_width = Self::check_dimensions(image.width(), image.height())?;

        let gray = Self::to_luminance(image);
        let colorized = DynamicImage::ImageLuma8(gray).to_rgb8();
        let resized = imageops::resize(&colorized, new_width, INPUT_SIZE, FilterType::CatmullRom);
        let cropped = Self::center_crop(&resized)?;
        Ok(Self::normalize(&cropped))
    }

    /// 在做任何像素处理之前校验缩放后的宽度，返回缩放宽度
    pub fn check_dimensions(width: u32, height: u32) -> Result<u32> {
        if width == 0 || height == 0 {
            return Err(MonitorError::ImageProcessing(format!(
                "image has no pixels: {}x{}",
                width, height
            )));
        }

        let new_width = Self::scaled_width(width, height);
        if new_width < INPUT_SIZE {
            return Err(MonitorError::ImageProcessing(format!(
                "image {}x{} is too narrow: resized width {} < {}",
                width, height, new_width, INPUT_SIZE
            )));
        }
        if new_width > MAX_SCALED_WIDTH {
            return Err(MonitorError::ImageProcessing(format!(
                "image {}x{} is too wide: resized width {} > {}",
                width, height, new_width, MAX_SCALED_WIDTH
            )));
        }

        Ok(new_width)
    }

    /// 按 0.3/0.59/0.11 权重转换为单通道亮度
    fn to_luminance(image: &DynamicImage) -> GrayImage {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        GrayImage::from_fn(width, height, |x, y| {
            let [r, g, b] = rgb.get_pixel(x, y).0;
            let luma = f32::from(r) * LUMA_WEIGHTS[0]
                + f32::from(g) * LUMA_WEIGHTS[1]
                + f32::from(b) * LUMA_WEIGHTS[2];
            Luma([luma.round().clamp(0.0, 255.0) as u8])
        })
    }

    /// nw = round(224 * w / h)
    pub fn scaled_width(width: u32, height: u32) -> u32 {
        (f64::from(INPUT_SIZE) * f64::from(width) / f64::from(height)).round() as u32
    }

    /// left = floor(nw / 2 - 112)
    pub fn crop_offset(width: u32) -> u32 {
        (f64::from(width) / 2.0 - f64::from(INPUT_SIZE / 2)).floor().max(0.0) as u32
    }

    fn center_crop(image: &RgbImage) -> Result<RgbImage> {
        let (width, height) = image.dimensions();
        let left = Self::crop_offset(width);

        if left + INPUT_SIZE > width || height < INPUT_SIZE {
            return Err(MonitorError::ImageProcessing(format!(
                "crop {}..{} exceeds resized image {}x{}",
                left,
                left + INPUT_SIZE,
                width,
                height
            )));
        }

        Ok(imageops::crop_imm(image, left, 0, INPUT_SIZE, INPUT_SIZE).to_image())
    }

    /// 每个通道独立归一化为 v / 127 - 1
    fn normalize(image: &RgbImage) -> Array4<f32> {
        let size = INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, size, size, 3));

        for (x, y, pixel) in image.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, y as usize, x as usize, c]] =
                    f32::from(pixel.0[c]) / NORMALIZE_DIVISOR - 1.0;
            }
        }

        tensor
    }
}
