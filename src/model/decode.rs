// 该文件是 Guanlan （观澜） 项目的一部分。
// src/model/decode.rs - NMS 输出解码
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

use tracing::warn;

use crate::model::{Detection, LetterboxTransform};

/// 每行前四个分量为 [cx, cy, w, h]
const BOX_FIELDS: usize = 4;

/// 解码 NMS 网络的输出行
///
/// `data` 为 `selected` 张量 `[1, rows, row_width]` 的扁平数据，
/// `row_width = 4 + 类别数`。每行取得分最高的类别
/// （多个类别得分并列时取索引最小者），中心点坐标转为左上角形式，
/// 再按信箱变换映射回原始帧像素坐标。保持 NMS 输出顺序。
/// `rows == 0` 时返回空序列。
pub fn decode(
  data: &[f32],
  rows: usize,
  row_width: usize,
  transform: &LetterboxTransform,
) -> Vec<Detection> {
  if rows == 0 {
    return Vec::new();
  }
  if row_width <= BOX_FIELDS || data.len() < rows * row_width {
    warn!(
      "NMS 输出形状异常: rows={}, row_width={}, len={}",
      rows,
      row_width,
      data.len()
    );
    return Vec::new();
  }

  let mut detections = Vec::with_capacity(rows);

  for row in data.chunks_exact(row_width).take(rows) {
    let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
    let scores = &row[BOX_FIELDS..];

    let mut label = 0usize;
    let mut probability = scores[0];
    for (idx, &score) in scores.iter().enumerate().skip(1) {
      if score > probability {
        probability = score;
        label = idx;
      }
    }

    let x = (cx - 0.5 * w) * transform.x_ratio;
    let y = (cy - 0.5 * h) * transform.y_ratio;
    let width = w * transform.x_ratio;
    let height = h * transform.y_ratio;

    detections.push(Detection {
      label,
      probability,
      bounding: [x, y, width, height],
    });
  }

  detections
}
