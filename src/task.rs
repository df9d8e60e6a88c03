// 该文件是 Xunji （巡迹） 项目的一部分。
// src/task.rs - 检测与跟踪任务循环
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

use std::{
  fmt::Display,
  io::Write,
  sync::mpsc::{self, Receiver},
  thread,
  time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  filter::DetectionFilter,
  frame::Frame,
  input::FrameSource,
  model::{DEFAULT_CONFIDENCE, RawDetection, Tracker},
  output::{Annotator, OutputError, VideoSink},
  track_log::{LogError, TrackLogger},
};

const FORCE_EXIT_SECS: u64 = 30;

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: &mut O) -> Result<Self::Output, Self::Error>;
}

/// 一次运行的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  /// 输入源读完
  Completed,
  /// 收到停止请求
  Cancelled,
  /// 达到 `--max-frames`
  FrameLimit,
  /// 写日志或写视频失败
  Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
  pub frames_processed: u64,
  pub detections_retained: u64,
  pub adapter_failures: u64,
  pub status: RunStatus,
}

impl RunSummary {
  fn new() -> Self {
    Self {
      frames_processed: 0,
      detections_retained: 0,
      adapter_failures: 0,
      status: RunStatus::Completed,
    }
  }
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("写入检测日志失败: {source}")]
  Log {
    summary: RunSummary,
    #[source]
    source: LogError,
  },
  #[error("写入标注视频失败: {source}")]
  Render {
    summary: RunSummary,
    #[source]
    source: OutputError,
  },
}

impl PipelineError {
  /// 出错前已完成的部分；`status` 为 `Failed`
  pub fn summary(&self) -> &RunSummary {
    match self {
      PipelineError::Log { summary, .. } | PipelineError::Render { summary, .. } => summary,
    }
  }
}

/// 流水线的全部输出
///
/// 检测日志由 `log` 独占；`preview` 可选，失败时只告警。
pub struct PipelineOutputs<W: Write, S: VideoSink> {
  pub log: TrackLogger<W>,
  pub video: S,
  pub preview: Option<Box<dyn VideoSink>>,
}

impl<W: Write, S: VideoSink> PipelineOutputs<W, S> {
  pub fn new(log: TrackLogger<W>, video: S) -> Self {
    Self {
      log,
      video,
      preview: None,
    }
  }

  pub fn with_preview(mut self, preview: Option<Box<dyn VideoSink>>) -> Self {
    self.preview = preview;
    self
  }

  // 收尾：视频封装、关闭预览、刷新日志。错误路径上也会调用
  fn close(&mut self) -> (Result<(), OutputError>, Result<(), LogError>) {
    let video = self.video.finish();
    if let Some(preview) = self.preview.as_mut()
      && let Err(e) = preview.finish()
    {
      warn!("关闭预览窗口失败: {}", e);
    }
    let log = self.log.flush();
    (video, log)
  }
}

/// 注册 Ctrl-C 处理，返回停止信号接收端
///
/// 第一次中断只请求在帧间停止；若 30 秒内仍未退出则强制结束进程。
pub fn install_stop_handler() -> anyhow::Result<Receiver<()>> {
  let (tx, rx) = mpsc::channel();

  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(FORCE_EXIT_SECS));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  Ok(rx)
}

/// 逐帧检测、过滤、记录并标注
pub struct DetectTrackTask {
  filter: DetectionFilter,
  annotator: Annotator,
  confidence: f32,
  max_frames: Option<u64>,
  stop: Option<Receiver<()>>,
}

impl DetectTrackTask {
  pub fn new(filter: DetectionFilter, annotator: Annotator) -> Self {
    Self {
      filter,
      annotator,
      confidence: DEFAULT_CONFIDENCE,
      max_frames: None,
      stop: None,
    }
  }

  pub fn with_confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
    self.max_frames = max_frames;
    self
  }

  pub fn with_stop_signal(mut self, stop: Receiver<()>) -> Self {
    self.stop = Some(stop);
    self
  }

  fn stop_requested(&self) -> bool {
    self
      .stop
      .as_ref()
      .map(|rx| rx.try_recv().is_ok())
      .unwrap_or(false)
  }

  fn detect<M>(&self, model: &mut M, frame: &Frame, summary: &mut RunSummary) -> Vec<RawDetection>
  where
    M: Tracker,
    M::Error: Display,
  {
    match model.track(frame, self.confidence) {
      Ok(detections) => detections,
      Err(e) => {
        summary.adapter_failures += 1;
        warn!("第 {} 帧推理失败，按无检测处理: {}", frame.index, e);
        Vec::new()
      }
    }
  }
}

impl<I, M, W, S> Task<I, M, PipelineOutputs<W, S>> for DetectTrackTask
where
  I: FrameSource,
  M: Tracker,
  M::Error: Display,
  W: Write,
  S: VideoSink,
{
  type Output = RunSummary;
  type Error = PipelineError;

  fn run_task(
    self,
    mut input: I,
    mut model: M,
    output: &mut PipelineOutputs<W, S>,
  ) -> Result<RunSummary, PipelineError> {
    info!(
      "开始任务: {}x{} @ {:.2} fps, 目标 {}, 置信度 {}",
      input.width(),
      input.height(),
      input.frame_rate(),
      self.filter.target(),
      self.confidence
    );

    let mut summary = RunSummary::new();
    let started = Instant::now();

    loop {
      if self.stop_requested() {
        warn!("中断信号接收，退出任务循环");
        summary.status = RunStatus::Cancelled;
        break;
      }
      if let Some(limit) = self.max_frames
        && summary.frames_processed >= limit
      {
        info!("达到指定帧数 {}, 退出任务循环", limit);
        summary.status = RunStatus::FrameLimit;
        break;
      }
      let Some(frame) = input.next() else {
        break;
      };

      let now = Instant::now();
      let detections = self.detect(&mut model, &frame, &mut summary);
      let retained: Vec<&RawDetection> = detections
        .iter()
        .filter(|det| self.filter.retain(det))
        .collect();

      let logged = output.log.log_frame(frame.timestamp_ms, &retained);
      // 日志里的行数即保留数，失败时只算已落盘的部分
      summary.detections_retained = output.log.records_written();
      if let Err(source) = logged {
        summary.status = RunStatus::Failed;
        let (video, _) = output.close();
        if let Err(e) = video {
          warn!("关闭视频输出失败: {}", e);
        }
        return Err(PipelineError::Log { summary, source });
      }

      let Frame {
        index,
        timestamp_ms,
        mut image,
      } = frame;
      self.annotator.annotate(&mut image, &retained);

      if let Err(source) = output.video.write_frame(&image) {
        summary.status = RunStatus::Failed;
        let (_, log) = output.close();
        if let Err(e) = log {
          warn!("刷新检测日志失败: {}", e);
        }
        return Err(PipelineError::Render { summary, source });
      }

      if let Some(preview) = output.preview.as_mut()
        && let Err(e) = preview.write_frame(&image)
      {
        warn!("预览窗口写入失败，关闭预览: {}", e);
        output.preview = None;
      }

      summary.frames_processed += 1;
      debug!(
        "第 {} 帧 ({} ms): 保留 {} / {} 个检测，耗时 {:.2?}",
        index,
        timestamp_ms,
        retained.len(),
        detections.len(),
        now.elapsed()
      );
    }

    let (video, log) = output.close();
    if let Err(source) = log {
      summary.status = RunStatus::Failed;
      return Err(PipelineError::Log { summary, source });
    }
    if let Err(source) = video {
      summary.status = RunStatus::Failed;
      return Err(PipelineError::Render { summary, source });
    }

    info!(
      "任务完成: {} 帧, {} 个检测, {} 次推理失败, 耗时 {:.2?}",
      summary.frames_processed,
      summary.detections_retained,
      summary.adapter_failures,
      started.elapsed()
    );
    Ok(summary)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    filter::TargetClass,
    input::MemorySource,
    model::BBox,
    output::MemorySink,
    track_log::parse_detection_log,
  };

  /// 每帧返回固定检测；`fail_on` 中的帧返回错误
  struct ScriptedTracker {
    per_frame: Vec<RawDetection>,
    fail_on: Vec<u64>,
  }

  impl Tracker for ScriptedTracker {
    type Error = String;

    fn track(&mut self, frame: &Frame, _confidence: f32) -> Result<Vec<RawDetection>, String> {
      if self.fail_on.contains(&frame.index) {
        return Err(format!("frame {} broken", frame.index));
      }
      Ok(self.per_frame.clone())
    }
  }

  fn outputs() -> PipelineOutputs<Vec<u8>, MemorySink> {
    PipelineOutputs::new(TrackLogger::new(Vec::new()).unwrap(), MemorySink::new())
  }

  fn task(target: &str) -> DetectTrackTask {
    let target = TargetClass::parse(target);
    DetectTrackTask::new(
      DetectionFilter::recognized(target.clone()),
      Annotator::new(target),
    )
  }

  fn scripted(fail_on: Vec<u64>) -> ScriptedTracker {
    ScriptedTracker {
      per_frame: vec![
        RawDetection::new("car", 0.9, BBox::new(1, 1, 5, 5)).with_track_id(1),
        RawDetection::new("dog", 0.9, BBox::new(2, 2, 6, 6)).with_track_id(2),
        RawDetection::new("Bus", 0.8, BBox::new(3, 3, 7, 7)),
      ],
      fail_on,
    }
  }

  #[test]
  fn every_frame_is_logged_and_rendered() {
    let mut out = outputs();
    let summary = task("all")
      .run_task(MemorySource::blank(32, 24, 25.0, 4), scripted(vec![]), &mut out)
      .unwrap();

    assert_eq!(summary.status, RunStatus::Completed);
    assert_eq!(summary.frames_processed, 4);
    assert_eq!(summary.detections_retained, 8);
    assert_eq!(out.video.frames_written(), 4);
    assert!(out.video.is_finished());

    let records = parse_detection_log(out.log.get_ref().as_slice()).unwrap();
    assert_eq!(records.len(), 8);
    assert_eq!(records[0].class, "car");
    assert_eq!(records[1].class, "bus");
    assert_eq!(records[1].track_id, -1);
    assert!(
      records
        .windows(2)
        .all(|w| w[0].timestamp_ms <= w[1].timestamp_ms)
    );
  }

  #[test]
  fn target_limits_logged_classes() {
    let mut out = outputs();
    let summary = task("bus")
      .run_task(MemorySource::blank(16, 16, 10.0, 2), scripted(vec![]), &mut out)
      .unwrap();
    assert_eq!(summary.detections_retained, 2);
    let records = parse_detection_log(out.log.get_ref().as_slice()).unwrap();
    assert!(records.iter().all(|r| r.class == "bus"));
  }

  #[test]
  fn adapter_failures_are_counted_not_fatal() {
    let mut out = outputs();
    let summary = task("all")
      .run_task(MemorySource::blank(16, 16, 10.0, 3), scripted(vec![1]), &mut out)
      .unwrap();
    assert_eq!(summary.frames_processed, 3);
    assert_eq!(summary.adapter_failures, 1);
    assert_eq!(summary.detections_retained, 4);
    assert_eq!(out.video.frames_written(), 3);
  }

  #[test]
  fn max_frames_stops_early() {
    let mut out = outputs();
    let summary = task("all")
      .with_max_frames(Some(2))
      .run_task(MemorySource::blank(16, 16, 10.0, 5), scripted(vec![]), &mut out)
      .unwrap();
    assert_eq!(summary.status, RunStatus::FrameLimit);
    assert_eq!(summary.frames_processed, 2);
  }

  #[test]
  fn pending_stop_processes_nothing() {
    let (tx, rx) = mpsc::channel();
    tx.send(()).unwrap();
    let mut out = outputs();
    let summary = task("all")
      .with_stop_signal(rx)
      .run_task(MemorySource::blank(16, 16, 10.0, 5), scripted(vec![]), &mut out)
      .unwrap();
    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.frames_processed, 0);
    assert!(out.video.is_finished());
    let records = parse_detection_log(out.log.get_ref().as_slice()).unwrap();
    assert!(records.is_empty());
  }

  #[test]
  fn sink_failure_is_fatal_and_keeps_earlier_rows() {
    let mut out = PipelineOutputs::new(
      TrackLogger::new(Vec::new()).unwrap(),
      MemorySink::failing_after(1),
    );
    let err = task("all")
      .run_task(MemorySource::blank(16, 16, 10.0, 3), scripted(vec![]), &mut out)
      .unwrap_err();

    assert!(matches!(err, PipelineError::Render { .. }));
    assert_eq!(err.summary().status, RunStatus::Failed);
    assert_eq!(err.summary().frames_processed, 1);
    // 第二帧的日志在写视频之前已经落盘，摘要按日志计数
    let records = parse_detection_log(out.log.get_ref().as_slice()).unwrap();
    assert_eq!(records.len(), 4);
    assert_eq!(err.summary().detections_retained, records.len() as u64);
    assert!(out.video.is_finished());
  }

  /// 前 `budget` 次写入成功，之后返回错误
  struct FullDisk {
    written: Vec<u8>,
    budget: usize,
  }

  impl Write for FullDisk {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      if self.budget == 0 {
        return Err(std::io::Error::other("disk full"));
      }
      self.budget -= 1;
      self.written.extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn log_failure_finishes_video_and_keeps_earlier_rows() {
    // 表头 + 第一帧两行 + 第二帧一行
    let log = TrackLogger::new(FullDisk {
      written: Vec::new(),
      budget: 4,
    })
    .unwrap();
    let mut out = PipelineOutputs::new(log, MemorySink::new());
    let err = task("all")
      .run_task(MemorySource::blank(16, 16, 10.0, 3), scripted(vec![]), &mut out)
      .unwrap_err();

    assert!(matches!(err, PipelineError::Log { .. }));
    assert_eq!(err.summary().status, RunStatus::Failed);
    assert_eq!(err.summary().frames_processed, 1);
    assert_eq!(out.video.frames_written(), 1);
    assert!(out.video.is_finished());

    let records = parse_detection_log(out.log.get_ref().written.as_slice()).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(err.summary().detections_retained, 3);
    assert_eq!(records[2].timestamp_ms, 100.0);
  }

  /// 处理到 `stop_at` 帧时发出停止请求
  struct StoppingTracker {
    inner: ScriptedTracker,
    stop_at: u64,
    stop: mpsc::Sender<()>,
  }

  impl Tracker for StoppingTracker {
    type Error = String;

    fn track(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<RawDetection>, String> {
      if frame.index == self.stop_at {
        self.stop.send(()).unwrap();
      }
      self.inner.track(frame, confidence)
    }
  }

  #[test]
  fn stop_mid_run_finishes_current_frame() {
    let (tx, rx) = mpsc::channel();
    let tracker = StoppingTracker {
      inner: scripted(vec![]),
      stop_at: 1,
      stop: tx,
    };
    let mut out = outputs();
    let summary = task("all")
      .with_stop_signal(rx)
      .run_task(MemorySource::blank(16, 16, 10.0, 5), tracker, &mut out)
      .unwrap();

    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.frames_processed, 2);
    assert_eq!(out.video.frames_written(), 2);
    assert!(out.video.is_finished());
    let records = parse_detection_log(out.log.get_ref().as_slice()).unwrap();
    assert_eq!(records.len(), 4);
    assert_eq!(summary.detections_retained, 4);
    assert!(records.iter().all(|r| r.timestamp_ms <= 100.0));
  }
}
