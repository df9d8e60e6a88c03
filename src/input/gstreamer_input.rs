// 该文件是 Xunji （巡迹） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频文件输入
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

//! # GStreamer 视频输入模块
//!
//! 通过 `decodebin` 解码本地视频文件，逐帧输出 RGB 图像。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! ## URL Scheme
//!
//! `gst://file/path/to/video.mp4`
//!
//! 与相机输入不同，文件输入不会丢帧：appsink 在缓冲区满时阻塞上游，
//! 保证输出视频和检测日志覆盖源文件的每一帧。
//!
//! 宽、高和帧率在打开时通过预卷（preroll）样本的 caps 获得。

use std::path::Path;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, input::FrameSource, url_path};

const PREROLL_TIMEOUT_SECS: u64 = 10;

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "gst://file/..."）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format")]
  UnsupportedFormat,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

/// GStreamer 视频文件输入
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  width: u32,
  height: u32,
  fps: f64,
  frame_index: u64,
  finished: bool,
}

impl FromUrlWithScheme for GStreamerInput {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInput {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME || url.host_str() != Some("file") {
      return Err(GStreamerInputError::SchemeMismatch);
    }
    Self::open_file(url_path(url))
  }
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

fn pipeline_description(path: &Path) -> String {
  let location = path.to_string_lossy().replace('\\', "\\\\").replace('"', "\\\"");
  format!(
    "filesrc location=\"{}\" ! decodebin ! videoconvert ! video/x-raw,format=RGB ! \
     appsink name=sink sync=false max-buffers=4 drop=false",
    location
  )
}

/// 等待预卷完成
///
/// 无法识别的文件只会在总线上报错，appsink 永远等不到样本，
/// 所以先在总线上等 AsyncDone 或 Error，再取预卷样本。
fn wait_for_preroll(
  pipeline: &gst::Pipeline,
  appsink: &gst_app::AppSink,
  change: gst::StateChangeSuccess,
) -> Result<gst::Sample, GStreamerInputError> {
  let timeout = gst::ClockTime::from_seconds(PREROLL_TIMEOUT_SECS);
  if change != gst::StateChangeSuccess::Async {
    return appsink
      .try_pull_preroll(Some(timeout))
      .ok_or_else(|| GStreamerInputError::PipelineError("No preroll sample".to_string()));
  }

  let bus = pipeline
    .bus()
    .ok_or_else(|| GStreamerInputError::PipelineError("Pipeline without bus".to_string()))?;

  match bus.timed_pop_filtered(
    Some(timeout),
    &[gst::MessageType::AsyncDone, gst::MessageType::Error],
  ) {
    Some(msg) => {
      if let gst::MessageView::Error(err) = msg.view() {
        return Err(GStreamerInputError::PipelineError(format!(
          "Failed to preroll: {}",
          err.error()
        )));
      }
    }
    None => {
      return Err(GStreamerInputError::PipelineError(format!(
        "Preroll not finished within {} s",
        PREROLL_TIMEOUT_SECS
      )));
    }
  }

  appsink
    .try_pull_preroll(Some(timeout))
    .ok_or_else(|| GStreamerInputError::PipelineError("No preroll sample".to_string()))
}

impl GStreamerInput {
  pub fn open_file(path: impl AsRef<Path>) -> Result<Self, GStreamerInputError> {
    gst::init()?;

    let description = pipeline_description(path.as_ref());
    info!("GStreamer pipeline description: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    // 先暂停以完成预卷，从首帧 caps 中拿到尺寸和帧率
    let change = pipeline.set_state(gst::State::Paused)?;
    let preroll = match wait_for_preroll(&pipeline, &appsink, change) {
      Ok(sample) => sample,
      Err(e) => {
        let _ = pipeline.set_state(gst::State::Null);
        return Err(e);
      }
    };
    let caps = preroll
      .caps()
      .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;
    let video_info =
      gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

    let fps = video_info.fps();
    let fps = if fps.numer() > 0 && fps.denom() > 0 {
      fps.numer() as f64 / fps.denom() as f64
    } else {
      warn!("视频未声明帧率，按 25 fps 处理");
      25.0
    };

    // 预卷样本会作为 pull_sample 的第一帧再次返回
    pipeline.set_state(gst::State::Playing)?;

    info!(
      "视频已打开: {}x{} @ {:.2} fps",
      video_info.width(),
      video_info.height(),
      fps
    );

    Ok(GStreamerInput {
      pipeline,
      appsink,
      width: video_info.width(),
      height: video_info.height(),
      fps,
      frame_index: 0,
      finished: false,
    })
  }

  fn convert_sample(&self, sample: gst::Sample) -> Result<Frame, GStreamerInputError> {
    let buffer = sample
      .buffer()
      .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
    let caps = sample
      .caps()
      .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;
    let video_info =
      gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

    let width = video_info.width();
    let height = video_info.height();
    if (width, height) != (self.width, self.height) {
      return Err(GStreamerInputError::PipelineError(format!(
        "Resolution changed mid-stream: {}x{}",
        width, height
      )));
    }

    let timestamp_ms = match buffer.pts() {
      Some(pts) => pts.nseconds() as f64 / 1_000_000.0,
      None => self.frame_index as f64 * 1000.0 / self.fps,
    };

    let map = buffer.map_readable().map_err(|e| {
      GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
    })?;
    let data = map.as_slice();

    // 去掉行尾对齐填充
    let stride = video_info.stride()[0] as usize;
    let row = width as usize * 3;
    let mut packed = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
      let start = y * stride;
      let line = data.get(start..start + row).ok_or_else(|| {
        GStreamerInputError::PipelineError(format!(
          "Buffer too small: {} bytes for {}x{} stride {}",
          data.len(),
          width,
          height,
          stride
        ))
      })?;
      packed.extend_from_slice(line);
    }

    let frame = match video_info.format() {
      gst_video::VideoFormat::Rgb => {
        Frame::from_rgb(self.frame_index, timestamp_ms, width, height, &packed)
      }
      gst_video::VideoFormat::Bgr => {
        Frame::from_bgr(self.frame_index, timestamp_ms, width, height, &packed)
      }
      _ => return Err(GStreamerInputError::UnsupportedFormat),
    };
    frame.map_err(|e| GStreamerInputError::PipelineError(e.to_string()))
  }
}

impl Iterator for GStreamerInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    let sample = match self.appsink.pull_sample() {
      Ok(sample) => sample,
      Err(_) => {
        // EOS 或管道错误都在这里结束
        if !self.appsink.is_eos() {
          error!("读取视频帧失败，按流结束处理");
        }
        self.finished = true;
        return None;
      }
    };

    match self.convert_sample(sample) {
      Ok(frame) => {
        self.frame_index += 1;
        Some(frame)
      }
      Err(e) => {
        error!("Failed to fetch sample: {}", e);
        self.finished = true;
        None
      }
    }
  }
}

impl FrameSource for GStreamerInput {
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
  fn undecodable_file_fails_instead_of_hanging() {
    if gst::init().is_err() {
      return;
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "not a video at all\n".repeat(64)).unwrap();
    assert!(GStreamerInput::open_file(&path).is_err());
  }

  #[test]
  fn location_is_quoted() {
    let desc = pipeline_description(Path::new("/videos/my \"clip\".mp4"));
    assert!(desc.starts_with("filesrc location=\"/videos/my \\\"clip\\\".mp4\""));
    assert!(desc.contains("drop=false"));
  }
}
