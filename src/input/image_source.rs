// 该文件是 Guanlan （观澜） 项目的一部分。
// src/input/image_source.rs - 图像文件帧源
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

use image::ImageReader;
use thiserror::Error;
use tracing::error;
use url::Url;

use crate::FromUrl;
use crate::frame::{Frame, FrameError, FrameOrigin};
use crate::input::{FrameSource, InputError};

pub(super) const SCHEME: &str = "image";

#[derive(Error, Debug)]
pub enum ImageFileSourceError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("帧错误: {0}")]
  FrameError(#[from] FrameError),
}

/// 图像文件帧源
///
/// 产生一帧静态图片后即耗尽。
pub struct ImageFileSource {
  frame: Option<Frame>,
  width: u32,
  height: u32,
}

impl ImageFileSource {
  pub fn open(path: &str) -> Result<Self, ImageFileSourceError> {
    let image = ImageReader::open(path)?.decode()?.into_rgba8();
    let frame = Frame::from_image(image, FrameOrigin::Still)?;
    let width = frame.width();
    let height = frame.height();

    Ok(Self {
      frame: Some(frame),
      width,
      height,
    })
  }
}

impl FromUrl for ImageFileSource {
  type Error = ImageFileSourceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        SCHEME,
        url.scheme()
      );
      return Err(ImageFileSourceError::SchemeMismatch);
    }

    Self::open(url.path())
  }
}

impl FrameSource for ImageFileSource {
  fn grab(&mut self) -> Result<Option<Frame>, InputError> {
    Ok(self.frame.take())
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    None
  }

  fn is_live(&self) -> bool {
    false
  }
}
