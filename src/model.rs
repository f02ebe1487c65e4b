// 该文件是 Guanlan （观澜） 项目的一部分。
// src/model.rs - 检测模型定义
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

use crate::frame::Frame;

mod decode;
mod preprocess;
mod session;

pub use self::decode::decode;
pub use self::preprocess::{LetterboxTransform, preprocess};
pub use self::session::{ModelSource, Session, SessionBuilder};

/// 检测流水线错误
#[derive(Error, Debug)]
pub enum DetectError {
  #[error("无效帧: {0}")]
  InvalidFrame(String),
  #[error("模型加载错误: {0}")]
  ModelLoadError(std::io::Error),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("张量形状不匹配: 期望 {expected}, 实际 {actual}")]
  ShapeMismatch { expected: String, actual: String },
  #[error("推理失败: {0}")]
  Inference(ort::Error),
}

impl From<std::io::Error> for DetectError {
  fn from(err: std::io::Error) -> Self {
    DetectError::ModelLoadError(err)
  }
}

impl DetectError {
  pub fn invalid(msg: &str, e: ort::Error) -> Self {
    DetectError::ModelInvalid(format!("{}: {}", msg, e))
  }
}

/// 检测结果
///
/// 坐标为原始帧像素坐标系，`bounding` 为 [x, y, w, h]，
/// 其中 (x, y) 是左上角。
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  /// 类别索引
  pub label: usize,
  /// 置信度 [0, 1]
  pub probability: f32,
  /// 边界框 [x, y, w, h]
  pub bounding: [f32; 4],
}

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("topk 超出范围 [1, 100]: {0}")]
  TopkOutOfRange(u32),
  #[error("IOU 阈值超出范围 [0, 1]: {0}")]
  IouOutOfRange(f32),
  #[error("置信度阈值超出范围 [0, 1]: {0}")]
  ScoreOutOfRange(f32),
}

/// 检测参数
///
/// 每个检测周期开始时读取一次快照，修改不需要重新加载模型。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectConfig {
  topk: u32,
  iou_threshold: f32,
  score_threshold: f32,
}

impl Default for DetectConfig {
  fn default() -> Self {
    Self {
      topk: 100,
      iou_threshold: 0.45,
      score_threshold: 0.25,
    }
  }
}

impl DetectConfig {
  pub fn new(topk: u32, iou_threshold: f32, score_threshold: f32) -> Result<Self, ConfigError> {
    if !(1..=100).contains(&topk) {
      return Err(ConfigError::TopkOutOfRange(topk));
    }
    if !(0.0..=1.0).contains(&iou_threshold) {
      return Err(ConfigError::IouOutOfRange(iou_threshold));
    }
    if !(0.0..=1.0).contains(&score_threshold) {
      return Err(ConfigError::ScoreOutOfRange(score_threshold));
    }

    Ok(Self {
      topk,
      iou_threshold,
      score_threshold,
    })
  }

  pub fn topk(&self) -> u32 {
    self.topk
  }

  pub fn iou_threshold(&self) -> f32 {
    self.iou_threshold
  }

  pub fn score_threshold(&self) -> f32 {
    self.score_threshold
  }

  /// NMS 网络的 config 输入张量内容
  pub fn as_tensor_data(&self) -> [f32; 3] {
    [self.topk as f32, self.iou_threshold, self.score_threshold]
  }
}

/// 检测器 trait
///
/// 一次调用完成一个完整检测周期：预处理、两段推理、解码。
pub trait Detector {
  type Error: std::error::Error + Send + Sync + 'static;

  fn detect(&self, frame: &Frame, config: &DetectConfig) -> Result<Vec<Detection>, Self::Error>;
}

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// 类别索引转显示名称，超出标签表时返回 `class{n}`
pub fn label_name(label: usize) -> String {
  COCO_CLASSES
    .get(label)
    .map(|s| s.to_string())
    .unwrap_or_else(|| format!("class{}", label))
}
