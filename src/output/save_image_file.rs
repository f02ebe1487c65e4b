// 该文件是 Guanlan （观澜） 项目的一部分。
// src/output/save_image_file.rs - 保存标注图像
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::frame::{Frame, FrameOrigin};
use crate::model::Detection;
use crate::output::{BoxSink, Draw, OutputError};
use crate::{FromUrl, FromUrlWithScheme};

pub(super) const SCHEME: &str = "image";

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 标注图像输出
///
/// 把检测框画到帧上并保存。静态图片按原路径保存，
/// 视频帧在文件名中插入帧索引。
pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = SCHEME;
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(Self {
      path: PathBuf::from(url.path()),
      draw: Draw::default(),
    })
  }
}

impl SaveImageFileOutput {
  pub fn new(path: PathBuf) -> Self {
    Self {
      path,
      draw: Draw::default(),
    }
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  /// 视频帧的保存路径: `out.png` -> `out-000042.png`
  fn frame_path(&self, origin: FrameOrigin) -> PathBuf {
    match origin {
      FrameOrigin::Still => self.path.clone(),
      FrameOrigin::Video { index, .. } => {
        let stem = self
          .path
          .file_stem()
          .map(|s| s.to_string_lossy().into_owned())
          .unwrap_or_else(|| "frame".to_string());
        let ext = self
          .path
          .extension()
          .map(|s| s.to_string_lossy().into_owned())
          .unwrap_or_else(|| "png".to_string());
        self.path.with_file_name(format!("{}-{:06}.{}", stem, index, ext))
      }
    }
  }

  fn save(&self, path: &Path, image: image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(path)?;
    debug!("保存标注图像: {}", path.display());
    Ok(())
  }
}

impl BoxSink for SaveImageFileOutput {
  type Error = OutputError;

  fn render(&mut self, frame: &Frame, detections: &[Detection]) -> Result<(), Self::Error> {
    let mut image = frame.to_rgb();
    self.draw.draw_detections(&mut image, detections);

    let path = self.frame_path(frame.origin());
    self
      .save(&path, image)
      .map_err(OutputError::SaveImageFile)?;
    Ok(())
  }
}
