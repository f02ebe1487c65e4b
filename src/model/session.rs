// 该文件是 Guanlan （观澜） 项目的一部分。
// src/model/session.rs - 推理会话
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

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use ort::session::Session as OrtSession;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Tensor;
use tracing::{debug, info};

use crate::frame::Frame;
use crate::model::{DetectConfig, DetectError, Detection, Detector, decode, preprocess};

/// 检测网络输入名
const DETECTOR_INPUT: &str = "images";
/// 检测网络原始输出名
const DETECTOR_OUTPUT: &str = "output0";
/// NMS 网络的检测输入名
const NMS_INPUT_DETECTION: &str = "detection";
/// NMS 网络的参数输入名
const NMS_INPUT_CONFIG: &str = "config";
/// NMS 网络输出名
const NMS_OUTPUT: &str = "selected";

const DEFAULT_INPUT_WIDTH: u32 = 640;
const DEFAULT_INPUT_HEIGHT: u32 = 640;
const DEFAULT_INTRA_THREADS: usize = 4;
const IMAGE_CHANNELS: usize = 3;

/// 模型来源
#[derive(Debug, Clone)]
pub enum ModelSource {
  /// 模型文件路径
  FilePath(PathBuf),
  /// 内存中的模型数据
  Memory(Vec<u8>),
}

impl ModelSource {
  fn describe(&self) -> String {
    match self {
      ModelSource::FilePath(path) => path.display().to_string(),
      ModelSource::Memory(data) => format!("<内存模型, {} 字节>", data.len()),
    }
  }

  fn read(self) -> Result<Vec<u8>, DetectError> {
    match self {
      ModelSource::FilePath(path) => Ok(std::fs::read(&path)?),
      ModelSource::Memory(data) => Ok(data),
    }
  }
}

/// 推理会话构建器
pub struct SessionBuilder {
  detector: ModelSource,
  nms: ModelSource,
  input_width: u32,
  input_height: u32,
  intra_threads: usize,
}

impl SessionBuilder {
  pub fn new(detector: ModelSource, nms: ModelSource) -> Self {
    Self {
      detector,
      nms,
      input_width: DEFAULT_INPUT_WIDTH,
      input_height: DEFAULT_INPUT_HEIGHT,
      intra_threads: DEFAULT_INTRA_THREADS,
    }
  }

  /// 覆盖默认的模型输入尺寸
  pub fn input_size(mut self, width: u32, height: u32) -> Self {
    self.input_width = width;
    self.input_height = height;
    self
  }

  pub fn intra_threads(mut self, threads: usize) -> Self {
    self.intra_threads = threads;
    self
  }

  pub fn build(self) -> Result<Session, DetectError> {
    info!("加载检测模型: {}", self.detector.describe());
    let detector = Self::load(self.detector, self.intra_threads)?;
    Self::require_io(&detector, "检测", &[DETECTOR_INPUT], &[DETECTOR_OUTPUT])?;

    info!("加载 NMS 模型: {}", self.nms.describe());
    let nms = Self::load(self.nms, self.intra_threads)?;
    Self::require_io(
      &nms,
      "NMS",
      &[NMS_INPUT_DETECTION, NMS_INPUT_CONFIG],
      &[NMS_OUTPUT],
    )?;

    let session = Session {
      detector: Mutex::new(detector),
      nms: Mutex::new(nms),
      input_width: self.input_width,
      input_height: self.input_height,
    };

    session.warmup()?;
    info!(
      "会话就绪, 输入形状 [1, 3, {}, {}]",
      session.input_height, session.input_width
    );

    Ok(session)
  }

  fn load(source: ModelSource, intra_threads: usize) -> Result<OrtSession, DetectError> {
    let data = source.read()?;
    debug!("模型大小: {:.2} MB", data.len() as f64 / (1024.0 * 1024.0));

    OrtSession::builder()
      .map_err(|e| DetectError::invalid("无法创建推理会话构建器", e))?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(|e| DetectError::invalid("无法设置图优化级别", e.into()))?
      .with_intra_threads(intra_threads)
      .map_err(|e| DetectError::invalid("无法设置线程数", e.into()))?
      .commit_from_memory(&data)
      .map_err(|e| DetectError::invalid("无法解析模型", e))
  }

  /// 校验模型的输入输出张量名，避免运行期按名索引落空
  fn require_io(
    session: &OrtSession,
    role: &str,
    inputs: &[&str],
    outputs: &[&str],
  ) -> Result<(), DetectError> {
    for name in inputs {
      if !session.inputs().iter().any(|i| i.name() == *name) {
        return Err(DetectError::ModelInvalid(format!(
          "{} 模型缺少输入张量 '{}'",
          role, name
        )));
      }
    }
    for name in outputs {
      if !session.outputs().iter().any(|o| o.name() == *name) {
        return Err(DetectError::ModelInvalid(format!(
          "{} 模型缺少输出张量 '{}'",
          role, name
        )));
      }
    }
    Ok(())
  }
}

/// 推理会话
///
/// 检测网络与 NMS 网络成对加载、成对替换，
/// 单独的网络句柄不对外暴露。两个原生会话各自由互斥锁保护，
/// 同一会话上的推理调用不会并发执行。
pub struct Session {
  detector: Mutex<OrtSession>,
  nms: Mutex<OrtSession>,
  input_width: u32,
  input_height: u32,
}

impl Session {
  pub fn input_width(&self) -> u32 {
    self.input_width
  }

  pub fn input_height(&self) -> u32 {
    self.input_height
  }

  /// 预热: 在零张量上跑一次检测网络
  ///
  /// 静态输入形状与绑定形状不一致的模型在这里暴露出来，
  /// 而不是等到第一个真实帧。
  fn warmup(&self) -> Result<(), DetectError> {
    info!("模型预热...");
    let len = IMAGE_CHANNELS * self.input_width as usize * self.input_height as usize;
    let started = Instant::now();
    self.run_detector(vec![0f32; len]).map_err(|e| match e {
      DetectError::Inference(err) => DetectError::invalid("模型预热失败", err),
      other => other,
    })?;
    debug!("预热完成, 耗时: {:.2?}", started.elapsed());
    Ok(())
  }

  /// 检测网络: {images} -> {output0}
  fn run_detector(&self, data: Vec<f32>) -> Result<(Vec<i64>, Vec<f32>), DetectError> {
    let expected = IMAGE_CHANNELS * self.input_width as usize * self.input_height as usize;
    if data.len() != expected {
      return Err(DetectError::ShapeMismatch {
        expected: format!(
          "[1, 3, {}, {}] ({} 元素)",
          self.input_height, self.input_width, expected
        ),
        actual: format!("{} 元素", data.len()),
      });
    }

    let shape = [
      1usize,
      IMAGE_CHANNELS,
      self.input_height as usize,
      self.input_width as usize,
    ];
    let tensor = Tensor::from_array((shape, data.into_boxed_slice()))
      .map_err(|e| DetectError::invalid("无法构建图像输入张量", e))?;

    let mut detector = self
      .detector
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    let outputs = detector
      .run(ort::inputs![DETECTOR_INPUT => tensor])
      .map_err(DetectError::Inference)?;

    let (shape, data) = outputs[DETECTOR_OUTPUT]
      .try_extract_tensor::<f32>()
      .map_err(DetectError::Inference)?;

    Ok((shape.to_vec(), data.to_vec()))
  }

  /// NMS 网络: {detection, config} -> {selected}
  fn run_nms(
    &self,
    detection_shape: &[i64],
    detection_data: Vec<f32>,
    config: &DetectConfig,
  ) -> Result<(Vec<i64>, Vec<f32>), DetectError> {
    let shape: Vec<usize> = detection_shape.iter().map(|&d| d as usize).collect();
    let detection = Tensor::from_array((shape, detection_data.into_boxed_slice()))
      .map_err(|e| DetectError::invalid("无法构建检测输入张量", e))?;
    let config_tensor = Tensor::from_array((
      [3usize],
      config.as_tensor_data().to_vec().into_boxed_slice(),
    ))
    .map_err(|e| DetectError::invalid("无法构建参数输入张量", e))?;

    let mut nms = self.nms.lock().unwrap_or_else(PoisonError::into_inner);
    let outputs = nms
      .run(ort::inputs![
        NMS_INPUT_DETECTION => detection,
        NMS_INPUT_CONFIG => config_tensor,
      ])
      .map_err(DetectError::Inference)?;

    let (shape, data) = outputs[NMS_OUTPUT]
      .try_extract_tensor::<f32>()
      .map_err(DetectError::Inference)?;

    Ok((shape.to_vec(), data.to_vec()))
  }
}

impl Detector for Session {
  type Error = DetectError;

  fn detect(&self, frame: &Frame, config: &DetectConfig) -> Result<Vec<Detection>, DetectError> {
    let started = Instant::now();

    let (tensor, transform) = preprocess(frame, self.input_width, self.input_height)?;
    let (detection_shape, detection_data) = self.run_detector(tensor)?;
    let (selected_shape, selected_data) =
      self.run_nms(&detection_shape, detection_data, config)?;

    // selected: [1, N, 4 + 类别数]
    if selected_shape.len() != 3 {
      return Err(DetectError::ShapeMismatch {
        expected: "[1, N, 4 + 类别数]".to_string(),
        actual: format!("{:?}", selected_shape),
      });
    }

    let rows = selected_shape[1] as usize;
    let row_width = selected_shape[2] as usize;
    let detections = decode(&selected_data, rows, row_width, &transform);

    debug!(
      "检测周期完成: {} 个结果, 耗时 {:.2?}",
      detections.len(),
      started.elapsed()
    );

    Ok(detections)
  }
}
