// 该文件是 Xunji （巡迹） 项目的一部分。
// src/model/replay.rs - 回放检测结果的适配器
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

//! # 回放适配器
//!
//! 从 JSON Lines 文件读取预先计算好的逐帧检测/跟踪结果，按帧序号回放。
//! 每行一个对象：
//!
//! ```json
//! {"frame": 0, "detections": [{"class": "car", "confidence": 0.91, "bbox": [12.0, 40.5, 96.0, 120.0], "track_id": 3}]}
//! ```
//!
//! - `track_id` 可省略，表示跟踪器没有给出持久 ID
//! - `error` 字段存在时，该帧的推理视为失败
//! - 文件中没有出现的帧视为没有检测结果
//!
//! URL 格式: `replay:///path/to/detections.jsonl`

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::{BBox, RawDetection, Tracker},
  url_path,
};

#[derive(Error, Debug)]
pub enum ReplayTrackerError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {line} 行解析失败: {source}")]
  ParseError {
    line: usize,
    #[source]
    source: serde_json::Error,
  },
  #[error("第 {frame} 帧推理失败: {reason}")]
  FrameFailed { frame: u64, reason: String },
}

#[derive(Debug, Deserialize)]
struct ReplayFrame {
  frame: u64,
  #[serde(default)]
  detections: Vec<ReplayDetection>,
  #[serde(default)]
  error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReplayDetection {
  class: String,
  confidence: f32,
  bbox: [f32; 4],
  #[serde(default)]
  track_id: Option<i64>,
}

impl From<&ReplayDetection> for RawDetection {
  fn from(det: &ReplayDetection) -> Self {
    RawDetection {
      class_label: det.class.clone(),
      confidence: det.confidence,
      bbox: BBox::from_xyxy(det.bbox),
      track_id: det.track_id,
    }
  }
}

enum ReplayEntry {
  Detections(Vec<ReplayDetection>),
  Failed(String),
}

pub struct ReplayTracker {
  frames: HashMap<u64, ReplayEntry>,
}

impl FromUrlWithScheme for ReplayTracker {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayTracker {
  type Error = ReplayTrackerError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayTrackerError::SchemeMismatch);
    }
    Self::open(url_path(url))
  }
}

impl ReplayTracker {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ReplayTrackerError> {
    let path = path.as_ref();
    info!("加载回放检测结果: {}", path.display());
    let file = File::open(path)?;
    Self::from_reader(BufReader::new(file))
  }

  pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, ReplayTrackerError> {
    let mut frames = HashMap::new();
    for (idx, line) in reader.lines().enumerate() {
      let line = line?;
      if line.trim().is_empty() {
        continue;
      }
      let entry: ReplayFrame =
        serde_json::from_str(&line).map_err(|source| ReplayTrackerError::ParseError {
          line: idx + 1,
          source,
        })?;
      let value = match entry.error {
        Some(reason) => ReplayEntry::Failed(reason),
        None => ReplayEntry::Detections(entry.detections),
      };
      frames.insert(entry.frame, value);
    }
    debug!("回放文件包含 {} 帧记录", frames.len());
    Ok(Self { frames })
  }

  pub fn frame_count(&self) -> usize {
    self.frames.len()
  }
}

impl Tracker for ReplayTracker {
  type Error = ReplayTrackerError;

  fn track(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<RawDetection>, Self::Error> {
    match self.frames.get(&frame.index) {
      None => Ok(Vec::new()),
      Some(ReplayEntry::Failed(reason)) => Err(ReplayTrackerError::FrameFailed {
        frame: frame.index,
        reason: reason.clone(),
      }),
      Some(ReplayEntry::Detections(detections)) => Ok(
        detections
          .iter()
          .filter(|det| det.confidence >= confidence)
          .map(RawDetection::from)
          .collect(),
      ),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  fn frame(index: u64) -> Frame {
    Frame::new(index, index as f64 * 40.0, RgbImage::new(4, 4))
  }

  const SAMPLE: &str = r#"
{"frame": 0, "detections": [{"class": "Car", "confidence": 0.9, "bbox": [0, 0, 10, 10], "track_id": 1}, {"class": "person", "confidence": 0.1, "bbox": [1, 1, 2, 2]}]}
{"frame": 2, "error": "inference timeout"}
"#;

  #[test]
  fn replays_detections_above_threshold() {
    let mut tracker = ReplayTracker::from_reader(SAMPLE.as_bytes()).unwrap();
    let dets = tracker.track(&frame(0), 0.25).unwrap();
    assert_eq!(dets.len(), 1);
    assert_eq!(dets[0].class_label, "Car");
    assert_eq!(dets[0].track_id, Some(1));
    assert_eq!(dets[0].bbox, BBox::new(0, 0, 10, 10));

    let all = tracker.track(&frame(0), 0.0).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].track_id, None);
  }

  #[test]
  fn missing_frame_yields_no_detections() {
    let mut tracker = ReplayTracker::from_reader(SAMPLE.as_bytes()).unwrap();
    assert!(tracker.track(&frame(1), 0.25).unwrap().is_empty());
  }

  #[test]
  fn error_entry_reports_frame_failure() {
    let mut tracker = ReplayTracker::from_reader(SAMPLE.as_bytes()).unwrap();
    let err = tracker.track(&frame(2), 0.25).unwrap_err();
    assert!(matches!(err, ReplayTrackerError::FrameFailed { frame: 2, .. }));
  }

  #[test]
  fn malformed_line_reports_line_number() {
    let input = "{\"frame\": 0}\nnot json\n";
    let err = ReplayTracker::from_reader(input.as_bytes())
      .err()
      .unwrap();
    assert!(matches!(err, ReplayTrackerError::ParseError { line: 2, .. }));
  }
}
