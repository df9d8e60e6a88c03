// 该文件是 Xunji （巡迹） 项目的一部分。
// src/output.rs - 标注视频输出
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;

/// 标注帧的去处
///
/// 帧按源顺序、以源分辨率写入；`finish()` 负责封装收尾，
/// 之后不应再写入。
pub trait VideoSink {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError>;
  fn finish(&mut self) -> Result<(), OutputError>;
  fn frames_written(&self) -> u64;
}

impl<T: VideoSink + ?Sized> VideoSink for Box<T> {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError> {
    (**self).write_frame(image)
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    (**self).finish()
  }

  fn frames_written(&self) -> u64 {
    (**self).frames_written()
  }
}

pub mod draw;
pub use self::draw::{Annotator, load_font};

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "gstreamer_output")]
mod gstreamer_video_output;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_video_output::{GStreamerVideoOutput, GStreamerVideoOutputError};

#[cfg(feature = "gstreamer_output")]
mod gstreamer_preview;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_preview::GStreamerPreview;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("无法创建输出 {target}: {reason}")]
  Unavailable { target: String, reason: String },
  #[error("帧尺寸不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  FrameSize {
    expected: (u32, u32),
    actual: (u32, u32),
  },
  #[error("输出已结束，不能再写入")]
  Finished,
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "gstreamer_output")]
  #[error("GStreamer 视频输出错误: {0}")]
  GStreamerVideoOutputError(#[from] GStreamerVideoOutputError),
}

pub enum OutputWrapper {
  #[cfg(feature = "gstreamer_output")]
  GStreamerVideoOutput(GStreamerVideoOutput),
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  Memory(MemorySink),
}

impl OutputWrapper {
  /// 输出落盘的位置；内存输出没有位置
  pub fn location(&self) -> Option<&Path> {
    match self {
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideoOutput(output) => Some(output.location()),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => Some(output.location()),
      OutputWrapper::Memory(_) => None,
    }
  }
}

impl VideoSink for OutputWrapper {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError> {
    match self {
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideoOutput(output) => output.write_frame(image),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output.write_frame(image),
      OutputWrapper::Memory(output) => output.write_frame(image),
    }
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    match self {
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideoOutput(output) => output.finish(),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output.finish(),
      OutputWrapper::Memory(output) => output.finish(),
    }
  }

  fn frames_written(&self) -> u64 {
    match self {
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideoOutput(output) => output.frames_written(),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output.frames_written(),
      OutputWrapper::Memory(output) => output.frames_written(),
    }
  }
}

/// 在输出目录下创建标注视频输出
///
/// 启用 `gstreamer_output` 时编码为 `processed_video.mp4`，
/// 否则退回到 `processed_frames/` 下的 PNG 序列。
pub fn open_video_sink(
  output_dir: &Path,
  width: u32,
  height: u32,
  fps: f64,
) -> Result<OutputWrapper, OutputError> {
  let _ = (width, height, fps);

  #[cfg(feature = "gstreamer_output")]
  {
    let path = output_dir.join(crate::PROCESSED_VIDEO_FILE);
    return Ok(OutputWrapper::GStreamerVideoOutput(
      GStreamerVideoOutput::create(&path, width, height, fps)?,
    ));
  }

  #[cfg(all(feature = "save_image_file", not(feature = "gstreamer_output")))]
  {
    let path = output_dir.join(crate::PROCESSED_FRAMES_DIR);
    return Ok(OutputWrapper::SaveImageFileOutput(
      SaveImageFileOutput::create(&path, width, height)?,
    ));
  }

  #[cfg(not(any(feature = "save_image_file", feature = "gstreamer_output")))]
  {
    Err(OutputError::Unavailable {
      target: output_dir.display().to_string(),
      reason: "需要启用 gstreamer_output 或 save_image_file 特性".to_string(),
    })
  }
}

/// 打开实时预览窗口；不可用时返回 `None`，不影响处理
pub fn open_preview(width: u32, height: u32, fps: f64) -> Option<Box<dyn VideoSink>> {
  #[cfg(feature = "gstreamer_output")]
  {
    match GStreamerPreview::open(width, height, fps) {
      Ok(preview) => return Some(Box::new(preview)),
      Err(e) => {
        tracing::warn!("预览窗口不可用: {}", e);
        return None;
      }
    }
  }

  #[cfg(not(feature = "gstreamer_output"))]
  {
    let _ = (width, height, fps);
    tracing::warn!("预览窗口需要启用 gstreamer_output 特性，已跳过");
    None
  }
}

/// 把帧留在内存中的输出，用于测试和嵌入调用
#[derive(Default)]
pub struct MemorySink {
  frames: Vec<RgbImage>,
  finished: bool,
  fail_after: Option<u64>,
}

impl MemorySink {
  pub fn new() -> Self {
    Self::default()
  }

  /// 写入 `count` 帧之后的写入全部失败
  pub fn failing_after(count: u64) -> Self {
    Self {
      fail_after: Some(count),
      ..Self::default()
    }
  }

  pub fn frames(&self) -> &[RgbImage] {
    &self.frames
  }

  pub fn is_finished(&self) -> bool {
    self.finished
  }
}

impl VideoSink for MemorySink {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError> {
    if self.finished {
      return Err(OutputError::Finished);
    }
    if let Some(limit) = self.fail_after
      && self.frames.len() as u64 >= limit
    {
      return Err(OutputError::Unavailable {
        target: "memory".to_string(),
        reason: "写入次数已达上限".to_string(),
      });
    }
    if let Some(first) = self.frames.first()
      && first.dimensions() != image.dimensions()
    {
      return Err(OutputError::FrameSize {
        expected: first.dimensions(),
        actual: image.dimensions(),
      });
    }
    self.frames.push(image.clone());
    Ok(())
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    self.finished = true;
    Ok(())
  }

  fn frames_written(&self) -> u64 {
    self.frames.len() as u64
  }
}

pub(crate) fn check_frame_size(
  expected: (u32, u32),
  image: &RgbImage,
) -> Result<(), OutputError> {
  if image.dimensions() != expected {
    return Err(OutputError::FrameSize {
      expected,
      actual: image.dimensions(),
    });
  }
  Ok(())
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<PathBuf, OutputError> {
  std::fs::create_dir_all(dir).map_err(|e| OutputError::Unavailable {
    target: dir.display().to_string(),
    reason: e.to_string(),
  })?;
  Ok(dir.to_path_buf())
}
