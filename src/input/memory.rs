// 该文件是 Xunji （巡迹） 项目的一部分。
// src/input/memory.rs - 内存帧输入
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

use std::collections::VecDeque;

use image::RgbImage;

use crate::{frame::Frame, input::FrameSource};

/// 预先准备好的帧序列，用于合成输入和测试
pub struct MemorySource {
  frames: VecDeque<Frame>,
  width: u32,
  height: u32,
  fps: f64,
}

impl MemorySource {
  pub fn new(width: u32, height: u32, fps: f64, frames: Vec<Frame>) -> Self {
    Self {
      frames: frames.into(),
      width,
      height,
      fps,
    }
  }

  /// 生成 `count` 帧纯色画面，时间戳按帧率递增
  pub fn blank(width: u32, height: u32, fps: f64, count: u64) -> Self {
    let frames = (0..count)
      .map(|index| {
        Frame::new(
          index,
          index as f64 * 1000.0 / fps,
          RgbImage::new(width, height),
        )
      })
      .collect();
    Self::new(width, height, fps, frames)
  }
}

impl Iterator for MemorySource {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    self.frames.pop_front()
  }
}

impl FrameSource for MemorySource {
  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn frame_rate(&self) -> f64 {
    self.fps
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blank_frames_are_timestamped_in_order() {
    let source = MemorySource::blank(8, 6, 25.0, 3);
    assert_eq!((source.width(), source.height()), (8, 6));
    let stamps: Vec<f64> = source.map(|f| f.timestamp_ms).collect();
    assert_eq!(stamps, vec![0.0, 40.0, 80.0]);
  }
}
