// 该文件是 Xunji （巡迹） 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 视频文件输出
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

//! # GStreamer 视频文件输出模块
//!
//! 将标注后的帧编码为 H.264 并封装为 MP4。
//!
//! 尺寸和帧率在运行时由输入源决定；`finish()` 发送 EOS 并等待
//! 管道把 moov 写完，否则生成的文件无法播放。
//!
//! ## URL Scheme
//!
//! `gstvideo:///path/to/output.mp4?width=1280&height=720&fps=30`

use std::path::{Path, PathBuf};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{OutputError, VideoSink, check_frame_size},
  url_path,
};

const EOS_TIMEOUT_SECS: u64 = 30;

/// GStreamer 视频输出错误类型
#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  /// URI scheme 不匹配
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsrc 元素
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  /// 无法转换元素为 appsrc
  #[error("Failed to convert element to appsrc")]
  AppSrcConversionFailed,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  /// 缓冲区创建错误
  #[error("Buffer creation error")]
  BufferCreationError,
}

/// GStreamer 视频文件输出
pub struct GStreamerVideoOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  location: PathBuf,
  width: u32,
  height: u32,
  frame_duration_ns: u64,
  frame_count: u64,
  finished: bool,
}

impl FromUrlWithScheme for GStreamerVideoOutput {
  const SCHEME: &'static str = "gstvideo";
}

impl FromUrl for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(GStreamerVideoOutputError::SchemeMismatch);
    }

    let query_pairs: std::collections::HashMap<_, _> = url.query_pairs().collect();
    let width: u32 = query_pairs
      .get("width")
      .and_then(|v| v.parse().ok())
      .unwrap_or(640);
    let height: u32 = query_pairs
      .get("height")
      .and_then(|v| v.parse().ok())
      .unwrap_or(480);
    let fps: f64 = query_pairs
      .get("fps")
      .and_then(|v| v.parse().ok())
      .unwrap_or(30.0);

    Self::create(Path::new(&url_path(url)), width, height, fps)
  }
}

fn pipeline_description(path: &Path) -> String {
  let location = path
    .to_string_lossy()
    .replace('\\', "\\\\")
    .replace('"', "\\\"");
  format!(
    "appsrc name=src ! videoconvert ! video/x-raw,format=I420 ! \
     x264enc speed-preset=fast ! h264parse ! mp4mux ! filesink location=\"{}\"",
    location
  )
}

// 帧率转为分数，保留三位小数（29.97 -> 29970/1000）
fn fps_fraction(fps: f64) -> gst::Fraction {
  if fps.fract() == 0.0 {
    gst::Fraction::new(fps as i32, 1)
  } else {
    gst::Fraction::new((fps * 1000.0).round() as i32, 1000)
  }
}

impl GStreamerVideoOutput {
  pub fn create(
    path: &Path,
    width: u32,
    height: u32,
    fps: f64,
  ) -> Result<Self, GStreamerVideoOutputError> {
    if !(fps > 0.0 && fps.is_finite()) {
      return Err(GStreamerVideoOutputError::PipelineError(format!(
        "Invalid frame rate: {}",
        fps
      )));
    }

    // Initialize GStreamer (subsequent calls are safe no-ops)
    gst::init()?;

    let pipeline_desc = pipeline_description(path);
    info!("Creating video output pipeline: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::AppSrcConversionFailed)?;

    let caps = gst::Caps::builder("video/x-raw")
      .field("format", "RGB")
      .field("width", width as i32)
      .field("height", height as i32)
      .field("framerate", fps_fraction(fps))
      .build();

    appsrc.set_caps(Some(&caps));
    appsrc.set_format(gst::Format::Time);
    // 编码比解码慢时阻塞写入，而不是无限缓存
    appsrc.set_block(true);

    pipeline.set_state(gst::State::Playing)?;

    info!(
      "Video output initialized: {}x{} @ {:.2} fps -> {}",
      width,
      height,
      fps,
      path.display()
    );

    Ok(GStreamerVideoOutput {
      pipeline,
      appsrc,
      location: path.to_path_buf(),
      width,
      height,
      frame_duration_ns: (1_000_000_000.0 / fps).round() as u64,
      frame_count: 0,
      finished: false,
    })
  }

  pub fn location(&self) -> &Path {
    &self.location
  }

  fn push_frame(&mut self, data: &[u8]) -> Result<(), GStreamerVideoOutputError> {
    let mut buffer = gst::Buffer::with_size(data.len())
      .map_err(|_| GStreamerVideoOutputError::BufferCreationError)?;

    {
      let buffer_ref = buffer
        .get_mut()
        .ok_or(GStreamerVideoOutputError::BufferCreationError)?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(
        self.frame_count * self.frame_duration_ns,
      ));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(self.frame_duration_ns));
      let mut buffer_map = buffer_ref.map_writable().map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to map buffer".to_string())
      })?;
      buffer_map.copy_from_slice(data);
    }

    self.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;
    self.frame_count += 1;

    Ok(())
  }

  fn wait_for_eos(&self) -> Result<(), GStreamerVideoOutputError> {
    let bus = self.pipeline.bus().ok_or_else(|| {
      GStreamerVideoOutputError::PipelineError("Pipeline without bus".to_string())
    })?;

    let timeout = gst::ClockTime::from_seconds(EOS_TIMEOUT_SECS);
    match bus.timed_pop_filtered(
      Some(timeout),
      &[gst::MessageType::Eos, gst::MessageType::Error],
    ) {
      Some(msg) => match msg.view() {
        gst::MessageView::Error(err) => Err(GStreamerVideoOutputError::PipelineError(
          format!("Encoder error: {}", err.error()),
        )),
        _ => Ok(()),
      },
      None => Err(GStreamerVideoOutputError::PipelineError(format!(
        "EOS not reached within {} s",
        EOS_TIMEOUT_SECS
      ))),
    }
  }
}

impl VideoSink for GStreamerVideoOutput {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError> {
    if self.finished {
      return Err(OutputError::Finished);
    }
    check_frame_size((self.width, self.height), image)?;
    Ok(self.push_frame(image.as_raw())?)
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    if self.finished {
      return Ok(());
    }
    self.finished = true;

    self.appsrc.end_of_stream().map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to send EOS: {:?}", e))
    })?;
    let waited = self.wait_for_eos();

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer video output pipeline: {}", e);
    }
    waited?;

    info!(
      "Video output closed. Total frames written: {} -> {}",
      self.frame_count,
      self.location.display()
    );
    Ok(())
  }

  fn frames_written(&self) -> u64 {
    self.frame_count
  }
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    if !self.finished
      && let Err(e) = self.finish()
    {
      warn!("视频输出未正常结束: {}", e);
    }
  }
}
