// 该文件是 Guanlan （观澜） 项目的一部分。
// src/input/v4l2_source.rs - V4L2 摄像头帧源
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

use std::pin::Pin;
use std::time::Instant;

use image::RgbImage;
use thiserror::Error;
use tracing::{error, info};
use url::Url;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use crate::FromUrl;
use crate::frame::{Frame, FrameError, FrameOrigin};
use crate::input::{FrameSource, InputError};

pub(super) const SCHEME: &str = "v4l2";

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const CAPTURE_BUFFERS: u32 = 4;
const CAPTURE_FPS: f64 = 30.0;

#[derive(Error, Debug)]
pub enum V4l2SourceError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无法打开设备 {0}: {1}")]
  OpenDevice(String, std::io::Error),
  #[error("无法设置视频格式: {0}")]
  SetFormat(std::io::Error),
  #[error("无法创建捕获流: {0}")]
  CreateStream(std::io::Error),
  #[error("无法捕获帧: {0}")]
  Capture(std::io::Error),
  #[error("帧错误: {0}")]
  FrameError(#[from] FrameError),
}

/// V4L2 摄像头帧源
///
/// `grab` 阻塞到驱动交出下一帧，由此为视频检测循环定速；
/// 推理期间被驱动覆盖掉的帧即为被跳过的帧。
///
/// v4l 的 Stream 需要引用 Device，这里用 Pin<Box> 固定
/// Device 的内存地址，从而可以安全地创建引用它的 Stream。
pub struct V4l2Source {
  /// V4L2 设备（使用 Pin<Box> 固定内存位置）
  device: Pin<Box<Device>>,
  /// 捕获流（生命周期与 device 关联）
  stream: Option<Stream<'static>>,
  frame_index: u64,
  width: u32,
  height: u32,
  start_time: Instant,
}

impl V4l2Source {
  pub fn open(device_path: &str) -> Result<Self, V4l2SourceError> {
    let device = Box::pin(
      Device::with_path(device_path)
        .map_err(|e| V4l2SourceError::OpenDevice(device_path.to_string(), e))?,
    );

    let mut format = device.format().map_err(V4l2SourceError::SetFormat)?;
    format.width = CAPTURE_WIDTH;
    format.height = CAPTURE_HEIGHT;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device
      .set_format(&format)
      .map_err(V4l2SourceError::SetFormat)?;

    let width = format.width;
    let height = format.height;
    info!("摄像头已打开: {} ({}x{})", device_path, width, height);

    let mut source = Self {
      device,
      stream: None,
      frame_index: 0,
      width,
      height,
      start_time: Instant::now(),
    };

    // SAFETY: device 被 Pin<Box> 固定，不会移动，所以引用始终有效。
    // stream 存储在同一个结构体中，Drop 顺序为 stream (Option::take) -> device。
    let device_ref: &Device = &source.device;
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, CAPTURE_BUFFERS)
        .map_err(V4l2SourceError::CreateStream)?
    };

    source.stream = Some(stream);
    Ok(source)
  }

  /// 将 YUYV 格式转换为 RGB
  fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);

    for chunk in yuyv.chunks(4) {
      if chunk.len() < 4 {
        break;
      }

      let y0 = chunk[0] as f32;
      let u = chunk[1] as f32 - 128.0;
      let y1 = chunk[2] as f32;
      let v = chunk[3] as f32 - 128.0;

      // 第一个像素
      let r = (y0 + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y0 - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y0 + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);

      // 第二个像素
      let r = (y1 + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y1 - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y1 + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }

    rgb
  }
}

impl Drop for V4l2Source {
  fn drop(&mut self) {
    // 确保 stream 在 device 之前被 drop
    self.stream.take();
  }
}

impl FromUrl for V4l2Source {
  type Error = V4l2SourceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        SCHEME,
        url.scheme()
      );
      return Err(V4l2SourceError::SchemeMismatch);
    }

    Self::open(url.path())
  }
}

impl FrameSource for V4l2Source {
  fn grab(&mut self) -> Result<Option<Frame>, InputError> {
    let Some(stream) = self.stream.as_mut() else {
      return Ok(None);
    };

    let (buffer, _meta) = stream
      .next()
      .map_err(|e| InputError::V4l2(V4l2SourceError::Capture(e)))?;

    let rgb_data = Self::yuyv_to_rgb(buffer, self.width, self.height);
    let image = RgbImage::from_raw(self.width, self.height, rgb_data).ok_or(
      InputError::Frame(FrameError::EmptyFrame(self.width, self.height)),
    )?;

    let timestamp_ms = self.start_time.elapsed().as_millis() as u64;
    let frame = Frame::from_rgb_image(
      image,
      FrameOrigin::Video {
        index: self.frame_index,
        timestamp_ms,
      },
    )
    .map_err(InputError::Frame)?;

    self.frame_index += 1;
    Ok(Some(frame))
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn fps(&self) -> Option<f64> {
    Some(CAPTURE_FPS)
  }

  fn is_live(&self) -> bool {
    true
  }
}
