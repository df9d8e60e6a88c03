// 该文件是 Xunji （巡迹） 项目的一部分。
// src/frame.rs - 视频帧定义
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
use thiserror::Error;

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 一帧解码后的视频图像
///
/// 像素按 NHWC（逐像素交错 RGB）存放，时间戳为展示时间（毫秒）。
/// 帧只在一次流水线迭代内存在，标注和写出后即被丢弃。
#[derive(Debug, Clone)]
pub struct Frame {
  pub index: u64,
  pub timestamp_ms: f64,
  pub image: RgbImage,
}

impl Frame {
  pub fn new(index: u64, timestamp_ms: f64, image: RgbImage) -> Self {
    Self {
      index,
      timestamp_ms,
      image,
    }
  }

  /// 从紧密排列的交错 RGB 数据构建帧
  ///
  /// 只截掉缓冲区末尾多余的字节，不处理行对齐填充；带 stride 的数据需先去掉填充。
  pub fn from_rgb(
    index: u64,
    timestamp_ms: f64,
    width: u32,
    height: u32,
    data: &[u8],
  ) -> Result<Self, FrameError> {
    let expected = RGB_CHANNELS * width as usize * height as usize;
    if data.len() < expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }
    let image = RgbImage::from_raw(width, height, data[..expected].to_vec()).ok_or(
      FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      },
    )?;
    Ok(Self::new(index, timestamp_ms, image))
  }

  /// 从交错 BGR 数据构建帧
  pub fn from_bgr(
    index: u64,
    timestamp_ms: f64,
    width: u32,
    height: u32,
    data: &[u8],
  ) -> Result<Self, FrameError> {
    let expected = RGB_CHANNELS * width as usize * height as usize;
    if data.len() < expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }
    let mut rgb = vec![0u8; expected];
    for (dst, src) in rgb
      .chunks_exact_mut(RGB_CHANNELS)
      .zip(data[..expected].chunks_exact(RGB_CHANNELS))
    {
      // Reverse BGR to RGB
      dst[0] = src[2];
      dst[1] = src[1];
      dst[2] = src[0];
    }
    Self::from_rgb(index, timestamp_ms, width, height, &rgb)
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn as_nhwc(&self) -> &[u8] {
    self.image.as_raw()
  }
}
