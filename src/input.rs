// 该文件是 Guanlan （观澜） 项目的一部分。
// src/input.rs - 帧源模块
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

use thiserror::Error;
use url::Url;

use crate::FromUrl;
use crate::frame::{Frame, FrameError};

mod image_source;
mod memory_source;
#[cfg(feature = "v4l2_input")]
mod v4l2_source;

pub use self::image_source::{ImageFileSource, ImageFileSourceError};
pub use self::memory_source::MemorySource;
#[cfg(feature = "v4l2_input")]
pub use self::v4l2_source::{V4l2Source, V4l2SourceError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("图像文件输入错误: {0}")]
  ImageFile(#[from] ImageFileSourceError),
  #[cfg(feature = "v4l2_input")]
  #[error("V4L2 输入错误: {0}")]
  V4l2(#[from] V4l2SourceError),
  #[error("帧错误: {0}")]
  Frame(#[from] FrameError),
  #[error("URI 方案不支持: {0}")]
  UnsupportedScheme(String),
}

/// 帧源 trait
///
/// 拉取式: 调度器在每次分发时取当前帧，而不是由帧源推送排队。
/// 实况源的 `grab` 会阻塞到下一帧可用，由此为检测循环定速；
/// 推理期间到达的帧被自然跳过。
pub trait FrameSource: Send {
  /// 取下一帧，`None` 表示流结束
  fn grab(&mut self) -> Result<Option<Frame>, InputError>;

  fn width(&self) -> u32;

  fn height(&self) -> u32;

  /// 帧率（如果适用）
  fn fps(&self) -> Option<f64>;

  /// 是否为实况源（摄像头等连续流）
  fn is_live(&self) -> bool;
}

/// 按 URI 方案创建帧源
///
/// 支持:
/// - `image:///path/to/picture.jpg`
/// - `v4l2:///dev/video0`（需要 `v4l2_input` 特性）
pub fn create_frame_source(url: &Url) -> Result<Box<dyn FrameSource>, InputError> {
  match url.scheme() {
    image_source::SCHEME => Ok(Box::new(ImageFileSource::from_url(url)?)),
    #[cfg(feature = "v4l2_input")]
    v4l2_source::SCHEME => Ok(Box::new(V4l2Source::from_url(url)?)),
    other => Err(InputError::UnsupportedScheme(other.to_string())),
  }
}
