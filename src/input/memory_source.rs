// 该文件是 Guanlan （观澜） 项目的一部分。
// src/input/memory_source.rs - 内存帧源
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

use crate::frame::Frame;
use crate::input::{FrameSource, InputError};

/// 内存帧源
///
/// 按顺序产生预先解码好的帧，用于测试与基准。
/// 循环模式下序列无限重复，表现为一个不会结束的实况源。
pub struct MemorySource {
  frames: Vec<Frame>,
  next: usize,
  cycling: bool,
}

impl MemorySource {
  pub fn new(frames: Vec<Frame>) -> Self {
    Self {
      frames,
      next: 0,
      cycling: false,
    }
  }

  /// 无限循环地重放帧序列
  pub fn cycling(frames: Vec<Frame>) -> Self {
    Self {
      frames,
      next: 0,
      cycling: true,
    }
  }
}

impl FrameSource for MemorySource {
  fn grab(&mut self) -> Result<Option<Frame>, InputError> {
    if self.frames.is_empty() {
      return Ok(None);
    }

    if self.next >= self.frames.len() {
      if !self.cycling {
        return Ok(None);
      }
      self.next = 0;
    }

    let frame = self.frames[self.next].clone();
    self.next += 1;
    Ok(Some(frame))
  }

  fn width(&self) -> u32 {
    self.frames.first().map(Frame::width).unwrap_or(0)
  }

  fn height(&self) -> u32 {
    self.frames.first().map(Frame::height).unwrap_or(0)
  }

  fn fps(&self) -> Option<f64> {
    None
  }

  fn is_live(&self) -> bool {
    self.cycling
  }
}
