// 该文件是 Guanlan （观澜） 项目的一部分。
// src/frame.rs - 帧定义
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::{RgbImage, RgbaImage};
use thiserror::Error;

const RGBA_CHANNELS: usize = 4;

/// 帧来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOrigin {
  /// 静态图片
  Still,
  /// 视频帧
  Video {
    /// 帧索引
    index: u64,
    /// 时间戳（毫秒）
    timestamp_ms: u64,
  },
}

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("帧尺寸无效: {0}x{1}")]
  EmptyFrame(u32, u32),
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 帧数据
///
/// 捕获源产生的 RGBA 像素缓冲。一旦捕获即视为不可变，
/// 由当前持有它的流水线阶段独占所有权。
#[derive(Debug, Clone)]
pub struct Frame {
  image: RgbaImage,
  origin: FrameOrigin,
}

impl Frame {
  /// 从原始 RGBA 字节创建帧
  pub fn from_rgba(
    width: u32,
    height: u32,
    data: Vec<u8>,
    origin: FrameOrigin,
  ) -> Result<Self, FrameError> {
    if width == 0 || height == 0 {
      return Err(FrameError::EmptyFrame(width, height));
    }

    let expected = RGBA_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    // 长度已校验，from_raw 不会失败
    let image = RgbaImage::from_raw(width, height, data)
      .ok_or(FrameError::EmptyFrame(width, height))?;

    Ok(Self { image, origin })
  }

  /// 从 RGBA 图像创建帧
  pub fn from_image(image: RgbaImage, origin: FrameOrigin) -> Result<Self, FrameError> {
    if image.width() == 0 || image.height() == 0 {
      return Err(FrameError::EmptyFrame(image.width(), image.height()));
    }
    Ok(Self { image, origin })
  }

  /// 从 RGB 图像创建帧（补全 alpha 通道）
  pub fn from_rgb_image(image: RgbImage, origin: FrameOrigin) -> Result<Self, FrameError> {
    if image.width() == 0 || image.height() == 0 {
      return Err(FrameError::EmptyFrame(image.width(), image.height()));
    }
    let image = image::DynamicImage::ImageRgb8(image).into_rgba8();
    Ok(Self { image, origin })
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn origin(&self) -> FrameOrigin {
    self.origin
  }

  pub fn image(&self) -> &RgbaImage {
    &self.image
  }

  /// 丢弃 alpha 通道，返回 RGB 图像副本
  pub fn to_rgb(&self) -> RgbImage {
    image::DynamicImage::ImageRgba8(self.image.clone()).into_rgb8()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn from_rgba_rejects_zero_dimensions() {
    let err = Frame::from_rgba(0, 480, Vec::new(), FrameOrigin::Still);
    assert!(matches!(err, Err(FrameError::EmptyFrame(0, 480))));
  }

  #[test]
  fn from_rgba_rejects_short_buffer() {
    let err = Frame::from_rgba(4, 4, vec![0u8; 3], FrameOrigin::Still);
    assert!(matches!(
      err,
      Err(FrameError::LengthMismatch {
        expected: 64,
        actual: 3
      })
    ));
  }

  #[test]
  fn to_rgb_drops_alpha() {
    let mut rgba = RgbaImage::new(2, 2);
    rgba.put_pixel(0, 0, image::Rgba([10, 20, 30, 128]));
    let frame = Frame::from_image(rgba, FrameOrigin::Still).unwrap();
    let rgb = frame.to_rgb();
    assert_eq!(rgb.get_pixel(0, 0), &image::Rgb([10, 20, 30]));
  }
}
