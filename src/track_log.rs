// 该文件是 Xunji （巡迹） 项目的一部分。
// src/track_log.rs - 检测记录日志
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

//! # 检测记录日志
//!
//! 每个保留下来的检测写一行 CSV，列顺序固定：
//!
//! ```text
//! timestamp_ms,track_id,class,x_min,y_min,x_max,y_max
//! 0.0,1,car,0,0,10,10
//! 40.0,-1,person,12,8,30,60
//! ```
//!
//! 日志只追加，每写一行就刷新到文件，中途失败时之前的行保持完整。

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{BBox, RawDetection};

pub const LOG_HEADER: [&str; 7] = [
  "timestamp_ms",
  "track_id",
  "class",
  "x_min",
  "y_min",
  "x_max",
  "y_max",
];

/// 跟踪器没有给出 ID 时使用的哨兵值
pub const UNKNOWN_TRACK_ID: i64 = -1;

#[derive(Error, Debug)]
pub enum LogError {
  #[error("无法创建检测日志 {path}: {source}")]
  Create {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("无法打开检测日志 {path}: {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("写入检测日志失败: {0}")]
  Write(#[source] std::io::Error),
  #[error("读取检测日志失败: {0}")]
  Read(#[source] std::io::Error),
  #[error("检测日志表头不正确: {0}")]
  Header(String),
  #[error("第 {line} 行格式错误: {reason}")]
  Parse { line: usize, reason: String },
}

/// 持久化的一条检测记录
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
  pub timestamp_ms: f64,
  pub track_id: i64,
  pub class: String,
  pub x_min: i32,
  pub y_min: i32,
  pub x_max: i32,
  pub y_max: i32,
}

impl DetectionRecord {
  pub fn from_detection(timestamp_ms: f64, detection: &RawDetection) -> Self {
    let BBox {
      x_min,
      y_min,
      x_max,
      y_max,
    } = detection.bbox;
    Self {
      timestamp_ms,
      track_id: detection.track_id.unwrap_or(UNKNOWN_TRACK_ID),
      class: detection.class_label.to_lowercase(),
      x_min,
      y_min,
      x_max,
      y_max,
    }
  }

  pub fn bbox(&self) -> BBox {
    BBox::new(self.x_min, self.y_min, self.x_max, self.y_max)
  }

  pub fn centroid(&self) -> (f64, f64) {
    self.bbox().centroid()
  }

  pub fn to_csv_row(&self) -> String {
    format!(
      "{},{},{},{},{},{},{}",
      format_timestamp(self.timestamp_ms),
      self.track_id,
      escape_field(&self.class),
      self.x_min,
      self.y_min,
      self.x_max,
      self.y_max
    )
  }

  fn from_fields(fields: &[String], line: usize) -> Result<Self, LogError> {
    if fields.len() != LOG_HEADER.len() {
      return Err(LogError::Parse {
        line,
        reason: format!("期望 {} 列, 实际 {} 列", LOG_HEADER.len(), fields.len()),
      });
    }
    fn num<T: std::str::FromStr>(value: &str, column: &str, line: usize) -> Result<T, LogError> {
      value.trim().parse().map_err(|_| LogError::Parse {
        line,
        reason: format!("{} 列的值 '{}' 无法解析", column, value),
      })
    }
    Ok(Self {
      timestamp_ms: num(&fields[0], LOG_HEADER[0], line)?,
      track_id: num(&fields[1], LOG_HEADER[1], line)?,
      class: fields[2].clone(),
      x_min: num(&fields[3], LOG_HEADER[3], line)?,
      y_min: num(&fields[4], LOG_HEADER[4], line)?,
      x_max: num(&fields[5], LOG_HEADER[5], line)?,
      y_max: num(&fields[6], LOG_HEADER[6], line)?,
    })
  }
}

// 整数值保留 ".0"，其余使用最短往返表示
pub(crate) fn format_timestamp(value: f64) -> String {
  format!("{:?}", value)
}

pub(crate) fn escape_field(value: &str) -> String {
  if value.contains([',', '"', '\n', '\r']) {
    format!("\"{}\"", value.replace('"', "\"\""))
  } else {
    value.to_string()
  }
}

fn split_row(line: &str) -> Vec<String> {
  let mut fields = Vec::new();
  let mut current = String::new();
  let mut in_quotes = false;
  let mut chars = line.chars().peekable();
  while let Some(c) = chars.next() {
    match c {
      '"' if in_quotes && chars.peek() == Some(&'"') => {
        current.push('"');
        chars.next();
      }
      '"' => in_quotes = !in_quotes,
      ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
      _ => current.push(c),
    }
  }
  fields.push(current);
  fields
}

/// 检测记录写入器，独占日志文件
pub struct TrackLogger<W: Write> {
  writer: W,
  last_timestamp: Option<f64>,
  records_written: u64,
}

impl TrackLogger<BufWriter<File>> {
  pub fn create(path: impl AsRef<Path>) -> Result<Self, LogError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| LogError::Create {
      path: path.to_path_buf(),
      source,
    })?;
    debug!("创建检测日志: {}", path.display());
    Self::new(BufWriter::new(file))
  }
}

impl<W: Write> TrackLogger<W> {
  pub fn new(mut writer: W) -> Result<Self, LogError> {
    let header = format!("{}\n", LOG_HEADER.join(","));
    writer
      .write_all(header.as_bytes())
      .map_err(LogError::Write)?;
    writer.flush().map_err(LogError::Write)?;
    Ok(Self {
      writer,
      last_timestamp: None,
      records_written: 0,
    })
  }

  pub fn records_written(&self) -> u64 {
    self.records_written
  }

  /// 追加一帧中保留的全部检测，顺序与传入顺序一致
  ///
  /// 同一帧中重复的 track id 原样保留。
  pub fn log_frame(
    &mut self,
    timestamp_ms: f64,
    detections: &[&RawDetection],
  ) -> Result<Vec<DetectionRecord>, LogError> {
    let timestamp_ms = match self.last_timestamp {
      Some(last) if timestamp_ms < last => {
        warn!(
          "帧时间戳回退 ({} < {}), 按 {} 记录",
          timestamp_ms, last, last
        );
        last
      }
      _ => timestamp_ms,
    };
    self.last_timestamp = Some(timestamp_ms);

    let mut records = Vec::with_capacity(detections.len());
    for detection in detections {
      let record = DetectionRecord::from_detection(timestamp_ms, detection);
      self.append(&record)?;
      records.push(record);
    }
    Ok(records)
  }

  fn append(&mut self, record: &DetectionRecord) -> Result<(), LogError> {
    let mut row = record.to_csv_row();
    row.push('\n');
    self
      .writer
      .write_all(row.as_bytes())
      .map_err(LogError::Write)?;
    self.writer.flush().map_err(LogError::Write)?;
    self.records_written += 1;
    Ok(())
  }

  pub fn flush(&mut self) -> Result<(), LogError> {
    self.writer.flush().map_err(LogError::Write)
  }

  pub fn get_ref(&self) -> &W {
    &self.writer
  }

  pub fn finish(mut self) -> Result<W, LogError> {
    self.writer.flush().map_err(LogError::Write)?;
    Ok(self.writer)
  }
}

pub fn read_detection_log(path: impl AsRef<Path>) -> Result<Vec<DetectionRecord>, LogError> {
  let path = path.as_ref();
  let file = File::open(path).map_err(|source| LogError::Open {
    path: path.to_path_buf(),
    source,
  })?;
  parse_detection_log(BufReader::new(file))
}

pub fn parse_detection_log<R: BufRead>(reader: R) -> Result<Vec<DetectionRecord>, LogError> {
  let mut lines = reader.lines();
  let header = match lines.next() {
    Some(line) => line.map_err(LogError::Read)?,
    None => return Err(LogError::Header("文件为空".to_string())),
  };
  let columns: Vec<String> = split_row(header.trim_start_matches('\u{feff}').trim_end())
    .into_iter()
    .map(|c| c.trim().to_string())
    .collect();
  if columns != LOG_HEADER {
    return Err(LogError::Header(header));
  }

  let mut records = Vec::new();
  for (idx, line) in lines.enumerate() {
    let line = line.map_err(LogError::Read)?;
    let line = line.trim_end_matches('\r');
    if line.is_empty() {
      continue;
    }
    records.push(DetectionRecord::from_fields(&split_row(line), idx + 2)?);
  }
  Ok(records)
}
