// 该文件是 Xunji （巡迹） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use std::path::Path;

use thiserror::Error;
use url::Url;

use crate::{FromUrl, frame::Frame};

/// 帧来源
///
/// `next()` 是流水线唯一的阻塞点；读取失败按流结束处理，返回 `None`。
/// 宽、高和帧率在打开时确定。
pub trait FrameSource: Iterator<Item = Frame> {
  fn width(&self) -> u32;
  fn height(&self) -> u32;
  fn frame_rate(&self) -> f64;
}

mod memory;
pub use self::memory::MemorySource;

#[cfg(feature = "read_image_file")]
mod image_sequence;
#[cfg(feature = "read_image_file")]
pub use self::image_sequence::{ImageSequenceInput, ImageSequenceInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("无法打开输入源 {input}: {reason}")]
  Unavailable { input: String, reason: String },
  #[cfg(feature = "read_image_file")]
  #[error("Image sequence input error: {0}")]
  ImageSequenceInputError(#[from] ImageSequenceInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer input error: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  #[cfg(feature = "gstreamer_input")]
  GStreamerInput(GStreamerInput),
  #[cfg(feature = "read_image_file")]
  ImageSequence(ImageSequenceInput),
  Memory(MemorySource),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "gstreamer_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == GStreamerInput::SCHEME {
        return Ok(InputWrapper::GStreamerInput(GStreamerInput::from_url(url)?));
      }
    }
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageSequenceInput::SCHEME {
        return Ok(InputWrapper::ImageSequence(ImageSequenceInput::from_url(
          url,
        )?));
      }
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

/// 打开输入源
///
/// 接受 URL（`gst://file/...`、`image:///...`）或本地路径：
/// 目录按图像序列读取，其余文件交给 GStreamer 解码。
pub fn open_source(input: &str) -> Result<InputWrapper, InputError> {
  if let Ok(url) = Url::parse(input)
    && url.scheme().len() > 1
  {
    return InputWrapper::from_url(&url);
  }

  let path = Path::new(input);
  if !path.exists() {
    return Err(InputError::Unavailable {
      input: input.to_string(),
      reason: "文件不存在".to_string(),
    });
  }

  if path.is_dir() {
    #[cfg(feature = "read_image_file")]
    {
      return Ok(InputWrapper::ImageSequence(ImageSequenceInput::open(
        path,
        self::image_sequence::DEFAULT_FPS,
      )?));
    }
    #[cfg(not(feature = "read_image_file"))]
    {
      return Err(InputError::Unavailable {
        input: input.to_string(),
        reason: "图像序列输入需要启用 read_image_file 特性".to_string(),
      });
    }
  }

  #[cfg(feature = "gstreamer_input")]
  {
    Ok(InputWrapper::GStreamerInput(GStreamerInput::open_file(
      path,
    )?))
  }
  #[cfg(not(feature = "gstreamer_input"))]
  {
    Err(InputError::Unavailable {
      input: input.to_string(),
      reason: "视频文件输入需要启用 gstreamer_input 特性".to_string(),
    })
  }
}

impl Iterator for InputWrapper {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.next(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageSequence(input) => input.next(),
      InputWrapper::Memory(input) => input.next(),
    }
  }
}

impl FrameSource for InputWrapper {
  fn width(&self) -> u32 {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.width(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageSequence(input) => input.width(),
      InputWrapper::Memory(input) => input.width(),
    }
  }

  fn height(&self) -> u32 {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.height(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageSequence(input) => input.height(),
      InputWrapper::Memory(input) => input.height(),
    }
  }

  fn frame_rate(&self) -> f64 {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.frame_rate(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageSequence(input) => input.frame_rate(),
      InputWrapper::Memory(input) => input.frame_rate(),
    }
  }
}
