// 该文件是 Guanlan （观澜） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use tracing::info;

use crate::frame::{Frame, FrameOrigin};
use crate::model::{Detection, label_name};
use crate::output::{BoxSink, OutputError};

pub(super) const SCHEME: &str = "log";

/// 日志输出
///
/// 只把检测结果写进日志，不做任何绘制。
#[derive(Debug, Default)]
pub struct LogOutput;

impl BoxSink for LogOutput {
  type Error = OutputError;

  fn render(&mut self, frame: &Frame, detections: &[Detection]) -> Result<(), Self::Error> {
    let frame_desc = match frame.origin() {
      FrameOrigin::Still => "静态图片".to_string(),
      FrameOrigin::Video {
        index,
        timestamp_ms,
      } => format!("帧 {} ({}ms)", index, timestamp_ms),
    };

    info!("{}: 检测到 {} 个对象", frame_desc, detections.len());
    for det in detections {
      info!(
        "  - {}: {:.2}% at ({:.0}, {:.0}, {:.0}x{:.0})",
        label_name(det.label),
        det.probability * 100.0,
        det.bounding[0],
        det.bounding[1],
        det.bounding[2],
        det.bounding[3]
      );
    }

    Ok(())
  }
}
