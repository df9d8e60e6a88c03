// 该文件是 Xunji （巡迹） 项目的一部分。
// src/output/gstreamer_preview.rs - 实时预览窗口
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

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::output::{GStreamerVideoOutputError, OutputError, VideoSink, check_frame_size};

const PREVIEW_PIPELINE: &str =
  "appsrc name=src is-live=true block=false ! videoconvert ! autovideosink sync=false";

// 显示跟不上时最多排队的帧数，超出的帧直接丢弃
const PREVIEW_QUEUE_FRAMES: u64 = 2;

fn queue_limit_bytes(width: u32, height: u32) -> u64 {
  width as u64 * height as u64 * 3 * PREVIEW_QUEUE_FRAMES
}

/// 通过 `autovideosink` 显示标注帧
///
/// 预览只是尽力而为：窗口关闭或推送失败后不再推送，
/// 也不会让处理中断。
pub struct GStreamerPreview {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  width: u32,
  height: u32,
  max_bytes: u64,
  frame_count: u64,
  dropped: u64,
  closed: bool,
}

impl GStreamerPreview {
  pub fn open(width: u32, height: u32, fps: f64) -> Result<Self, GStreamerVideoOutputError> {
    gst::init()?;

    let pipeline = gst::parse::launch(PREVIEW_PIPELINE)?
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
      .field("framerate", gst::Fraction::new(fps.round().max(1.0) as i32, 1))
      .build();
    appsrc.set_caps(Some(&caps));
    appsrc.set_format(gst::Format::Time);
    let max_bytes = queue_limit_bytes(width, height);
    appsrc.set_max_bytes(max_bytes);

    pipeline.set_state(gst::State::Playing)?;
    info!("预览窗口已打开: {}x{}", width, height);

    Ok(GStreamerPreview {
      pipeline,
      appsrc,
      width,
      height,
      max_bytes,
      frame_count: 0,
      dropped: 0,
      closed: false,
    })
  }
}

impl VideoSink for GStreamerPreview {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError> {
    if self.closed {
      return Ok(());
    }
    check_frame_size((self.width, self.height), image)?;

    if self.appsrc.current_level_bytes() >= self.max_bytes {
      self.dropped += 1;
      debug!("预览队列已满，丢弃一帧 (累计 {})", self.dropped);
      return Ok(());
    }

    let buffer = gst::Buffer::from_slice(image.as_raw().clone());
    if let Err(e) = self.appsrc.push_buffer(buffer) {
      warn!("预览窗口推送失败，停止预览: {:?}", e);
      self.closed = true;
      return Ok(());
    }
    self.frame_count += 1;
    Ok(())
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    if !self.closed {
      self.closed = true;
      let _ = self.appsrc.end_of_stream();
      if self.dropped > 0 {
        info!("预览共丢弃 {} 帧", self.dropped);
      }
    }
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop preview pipeline: {}", e);
    }
    Ok(())
  }

  fn frames_written(&self) -> u64 {
    self.frame_count
  }
}

impl Drop for GStreamerPreview {
  fn drop(&mut self) {
    let _ = self.pipeline.set_state(gst::State::Null);
  }
}
