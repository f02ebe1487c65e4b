// 该文件是 Guanlan （观澜） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

/// Guanlan 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测模型文件路径 (ONNX)
  #[arg(long, value_name = "FILE")]
  pub model: String,

  /// NMS 后处理模型文件路径 (ONNX)
  #[arg(long, value_name = "FILE")]
  pub nms_model: String,

  /// 输入来源
  /// 支持格式:
  /// - 图片: image:///path/to/picture.jpg
  /// - V4L2: v4l2:///dev/video0
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出方式
  /// 支持格式:
  /// - 标注图像: image:///path/to/out.png
  /// - 日志: log:
  #[arg(long, default_value = "log:", value_name = "OUTPUT")]
  pub output: Url,

  /// NMS 保留的最大检测框数 (1 - 100)
  #[arg(long, default_value = "100", value_name = "COUNT")]
  pub topk: u32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.45", value_name = "THRESHOLD")]
  pub iou_threshold: f32,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.25", value_name = "THRESHOLD")]
  pub score_threshold: f32,

  /// 最大处理帧数（仅对视频有效，0 表示无限制）
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub max_frames: u64,

  /// 标签字体文件路径（可选，用于标注图像输出）
  #[arg(long, value_name = "FILE")]
  pub font: Option<String>,
}
