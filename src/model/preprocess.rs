// 该文件是 Guanlan （观澜） 项目的一部分。
// src/model/preprocess.rs - 帧预处理
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

use image::RgbImage;
use image::imageops::{self, FilterType};
use tracing::debug;

use crate::frame::Frame;
use crate::model::DetectError;

const RGB_CHANNELS: usize = 3;
const PIXEL_SCALE: f32 = 1.0 / 255.0;

/// 信箱变换
///
/// 记录方形工作画布与原始帧在两个轴上的比例，
/// 用于把模型坐标系下的检测框映射回原始帧像素坐标。
/// 不变量: `x_ratio >= 1.0` 且 `y_ratio >= 1.0`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
  pub x_ratio: f32,
  pub y_ratio: f32,
}

/// 预处理帧
///
/// 丢弃 alpha 通道后在右侧/底部用零像素补成 `max(w, h)` 的方形，
/// 缩放到模型输入尺寸，按 1/255 归一化为平面 CHW 布局。
/// 返回张量数据（长度 `3 * model_width * model_height`）和信箱变换。
pub fn preprocess(
  frame: &Frame,
  model_width: u32,
  model_height: u32,
) -> Result<(Vec<f32>, LetterboxTransform), DetectError> {
  if frame.width() == 0 || frame.height() == 0 {
    return Err(DetectError::InvalidFrame(format!(
      "帧尺寸为零: {}x{}",
      frame.width(),
      frame.height()
    )));
  }
  if model_width == 0 || model_height == 0 {
    return Err(DetectError::ShapeMismatch {
      expected: "非零模型输入尺寸".to_string(),
      actual: format!("{}x{}", model_width, model_height),
    });
  }

  let width = frame.width();
  let height = frame.height();
  let max_side = width.max(height);

  let rgb = frame.to_rgb();

  // 信箱补边: 右侧与底部补零像素，保持纵横比
  let padded = if width == height {
    rgb
  } else {
    let mut canvas = RgbImage::new(max_side, max_side);
    imageops::replace(&mut canvas, &rgb, 0, 0);
    canvas
  };

  let resized = imageops::resize(&padded, model_width, model_height, FilterType::Triangle);

  // 平面 CHW 布局，1/255 归一化
  let plane = (model_width * model_height) as usize;
  let mut data = vec![0f32; RGB_CHANNELS * plane];
  for (x, y, pixel) in resized.enumerate_pixels() {
    let idx = y as usize * model_width as usize + x as usize;
    data[idx] = pixel[0] as f32 * PIXEL_SCALE;
    data[plane + idx] = pixel[1] as f32 * PIXEL_SCALE;
    data[2 * plane + idx] = pixel[2] as f32 * PIXEL_SCALE;
  }

  let transform = LetterboxTransform {
    x_ratio: max_side as f32 / width as f32,
    y_ratio: max_side as f32 / height as f32,
  };

  debug!(
    "预处理完成: {}x{} -> {}x{}, 比例 ({:.3}, {:.3})",
    width, height, model_width, model_height, transform.x_ratio, transform.y_ratio
  );

  Ok((data, transform))
}
