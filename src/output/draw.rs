// 该文件是 Guanlan （观澜） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::warn;

use crate::model::{Detection, label_name};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_HEIGHT: i32 = 20;
const LABEL_CHAR_WIDTH: f32 = 9.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BORDER_THICKNESS: i32 = 2;
const PALETTE_SIZE: usize = 80;

/// 检测框绘制工具
///
/// 每个类别分配一种固定颜色。字体可选，未提供时只画边框不画标签。
pub struct Draw {
  font: Option<FontArc>,
  font_scale: PxScale,
  colors: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    // 按色相环生成类别颜色
    let colors: Vec<Rgb<u8>> = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        Self::hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      font: None,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      colors,
    }
  }
}

impl Draw {
  /// 从字体文件加载标签字体
  pub fn with_font_file(mut self, path: &str) -> Self {
    match std::fs::read(path) {
      Ok(data) => match FontArc::try_from_vec(data) {
        Ok(font) => self.font = Some(font),
        Err(e) => warn!("无法解析字体文件 {}: {}", path, e),
      },
      Err(e) => warn!("无法读取字体文件 {}: {}", path, e),
    }
    self
  }

  /// HSV 转 RGB
  fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match h as u32 {
      0..=59 => (c, x, 0.0),
      60..=119 => (x, c, 0.0),
      120..=179 => (0.0, c, x),
      180..=239 => (0.0, x, c),
      240..=299 => (x, 0.0, c),
      _ => (c, 0.0, x),
    };

    Rgb([
      ((r + m) * 255.0) as u8,
      ((g + m) * 255.0) as u8,
      ((b + m) * 255.0) as u8,
    ])
  }

  fn color(&self, label: usize) -> Rgb<u8> {
    self.colors[label % self.colors.len()]
  }

  /// 在图像上绘制全部检测框
  pub fn draw_detections(&self, image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
      self.draw_detection(image, detection);
    }
  }

  fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let [x, y, bw, bh] = detection.bounding;

    let x_min = (x.floor() as i32).clamp(0, w as i32 - 1);
    let y_min = (y.floor() as i32).clamp(0, h as i32 - 1);
    let x_max = ((x + bw).ceil() as i32).clamp(0, w as i32 - 1);
    let y_max = ((y + bh).ceil() as i32).clamp(0, h as i32 - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = self.color(detection.label);

    // 边框加粗为 2 像素
    for t in 0..BORDER_THICKNESS {
      let rw = x_max - x_min - 2 * t;
      let rh = y_max - y_min - 2 * t;
      if rw <= 0 || rh <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(rw as u32, rh as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = &self.font else {
      return;
    };

    // 标签文本: 类别名与置信度
    let label = format!(
      "{} {:.2}",
      label_name(detection.label),
      detection.probability
    );

    let text_width = (label.len() as f32 * LABEL_CHAR_WIDTH) as i32;
    let label_x = x_min.max(0);
    let label_y = (y_min - LABEL_TEXT_HEIGHT).max(0);
    let max_width = (w as i32 - label_x).max(0);
    let label_width = text_width.min(max_width);

    if label_width > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width as u32, LABEL_TEXT_HEIGHT as u32);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        self.font_scale,
        font,
        &label,
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn borders_are_painted() {
    let mut image = RgbImage::new(32, 32);
    let detections = [Detection {
      label: 0,
      probability: 0.9,
      bounding: [4.0, 4.0, 16.0, 16.0],
    }];

    Draw::default().draw_detections(&mut image, &detections);

    let expected = Draw::default().color(0);
    assert_eq!(image.get_pixel(4, 4), &expected);
    // 框外不受影响
    assert_eq!(image.get_pixel(0, 0), &Rgb([0, 0, 0]));
  }

  #[test]
  fn out_of_bounds_box_is_clamped() {
    let mut image = RgbImage::new(16, 16);
    let detections = [Detection {
      label: 3,
      probability: 0.5,
      bounding: [-10.0, -10.0, 100.0, 100.0],
    }];

    // 不应 panic
    Draw::default().draw_detections(&mut image, &detections);
  }

  #[test]
  fn distinct_labels_get_distinct_colors() {
    let draw = Draw::default();
    assert_ne!(draw.color(0), draw.color(1));
    assert_eq!(draw.color(0), draw.color(80));
  }
}
