use image::{DynamicImage, GenericImageView};

use crate::error::FrameShape;

/// 参与比较的一帧图像
///
/// 构造时把像素转换成 `[0, 1]` 范围内的 `f32` 采样值：
/// 彩色图按 RGB 三通道展开，灰度图只保留亮度通道，alpha 通道忽略。
/// 原始图像也一起保留，供渲染器保存关键帧使用。
#[derive(Debug, Clone)]
pub struct Frame {
    index: usize,
    width: u32,
    height: u32,
    channels: u8,
    samples: Vec<f32>,
    image: DynamicImage,
}

impl Frame {
    pub fn new(index: usize, image: DynamicImage) -> Self {
        let (width, height) = image.dimensions();
        let (channels, samples) = if image.color().has_color() {
            (3, image.to_rgb32f().into_raw())
        } else {
            (1, image.to_luma32f().into_raw())
        };

        Self {
            index,
            width,
            height,
            channels,
            samples,
            image,
        }
    }

    /// 帧序号（从 0 开始，按到达顺序递增）
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn shape(&self) -> FrameShape {
        (self.width, self.height, self.channels)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// 归一化后的采样值，长度为 `pixel_count() * channels()`
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb};

    #[test]
    fn test_gray_frame_keeps_single_channel() {
        let img = DynamicImage::ImageLuma8(ImageBuffer::from_fn(4, 3, |_, _| Luma([255u8])));
        let frame = Frame::new(7, img);

        assert_eq!(frame.index(), 7);
        assert_eq!(frame.shape(), (4, 3, 1));
        assert_eq!(frame.samples().len(), 12);
        assert!(frame.samples().iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_color_frame_expands_to_rgb() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_fn(2, 2, |_, _| Rgb([0u8, 51, 255])));
        let frame = Frame::new(0, img);

        assert_eq!(frame.shape(), (2, 2, 3));
        assert_eq!(frame.pixel_count(), 4);
        assert_eq!(frame.samples().len(), 12);
        assert!((frame.samples()[1] - 0.2).abs() < 1e-6);
    }
}
