// 该文件是 Guanlan （观澜） 项目的一部分。
// src/output.rs - 检测结果输出
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
use crate::frame::Frame;
use crate::model::Detection;

#[cfg(feature = "save_image_file")]
pub mod draw;
mod log_output;
#[cfg(feature = "save_image_file")]
mod save_image_file;

#[cfg(feature = "save_image_file")]
pub use self::draw::Draw;
pub use self::log_output::LogOutput;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("图像保存输出错误: {0}")]
  SaveImageFile(#[from] SaveImageFileError),
  #[error("URI 方案不支持: {0}")]
  UnsupportedScheme(String),
}

/// 检测框输出 trait
///
/// 每个检测周期调用一次，检测列表可能为空（空列表也会分发）。
/// 仅产生副作用，核心流水线不保留结果。
pub trait BoxSink: Send {
  type Error;

  fn render(&mut self, frame: &Frame, detections: &[Detection]) -> Result<(), Self::Error>;
}

/// 按 URI 方案创建输出
///
/// 支持:
/// - `image:///path/to/out.png`（需要 `save_image_file` 特性）
/// - `log:`
pub fn create_box_sink(url: &Url) -> Result<Box<dyn BoxSink<Error = OutputError>>, OutputError> {
  match url.scheme() {
    #[cfg(feature = "save_image_file")]
    save_image_file::SCHEME => Ok(Box::new(SaveImageFileOutput::from_url(url)?)),
    log_output::SCHEME => Ok(Box::new(LogOutput::default())),
    other => Err(OutputError::UnsupportedScheme(other.to_string())),
  }
}
