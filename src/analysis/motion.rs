// 该文件是 Xunji （巡迹） 项目的一部分。
// src/analysis/motion.rs - 轨迹运动摘要
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
  collections::HashMap,
  fmt,
  fs::File,
  io::{BufWriter, Write},
  path::Path,
};

use tracing::{debug, info};

use crate::{
  analysis::AnalysisError,
  track_log::{
    DetectionRecord, UNKNOWN_TRACK_ID, escape_field, format_timestamp, read_detection_log,
  },
};

pub const MOTION_HEADER: &str = "track_id,class,timestamp_ms,direction,speed_pps";

/// 运动方向（图像坐标，y 轴向下）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
  Up,
  Down,
  Left,
  Right,
}

impl Direction {
  pub fn as_str(&self) -> &'static str {
    match self {
      Direction::Up => "up",
      Direction::Down => "down",
      Direction::Left => "left",
      Direction::Right => "right",
    }
  }
}

impl fmt::Display for Direction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(self.as_str())
  }
}

/// 按位移角度分方向
///
/// 角度区间左闭右开：down `[45, 135)`、left `[135, 225)`、up `[225, 315)`，
/// 其余为 right。直接比较分量，边界上不受浮点 atan2 误差影响。
/// 零位移归为 right。
pub fn classify_direction(dx: f64, dy: f64) -> Direction {
  if dy > 0.0 && dx <= dy && dx > -dy {
    Direction::Down
  } else if dx < 0.0 && -dx >= dy && dy > dx {
    Direction::Left
  } else if dy < 0.0 && dy <= dx && dy < -dx {
    Direction::Up
  } else {
    Direction::Right
  }
}

/// 同一轨迹相邻两条记录之间的运动
#[derive(Debug, Clone, PartialEq)]
pub struct MotionRecord {
  pub track_id: i64,
  /// 取后一条记录的类别
  pub class: String,
  /// 取后一条记录的时间戳
  pub timestamp_ms: f64,
  pub direction: Direction,
  pub speed_pps: f64,
}

impl MotionRecord {
  pub fn to_csv_row(&self) -> String {
    format!(
      "{},{},{},{},{}",
      self.track_id,
      escape_field(&self.class),
      format_timestamp(self.timestamp_ms),
      self.direction,
      self.speed_pps
    )
  }
}

#[derive(Debug, Default, Clone)]
pub struct MotionSummarizer {
  skip_untracked: bool,
}

impl MotionSummarizer {
  pub fn new() -> Self {
    Self::default()
  }

  /// 是否丢弃 track id 为 -1 的记录。默认保留，-1 也当作一条轨迹
  pub fn skip_untracked(mut self, skip: bool) -> Self {
    self.skip_untracked = skip;
    self
  }

  pub fn summarize(&self, records: &[DetectionRecord]) -> Vec<MotionRecord> {
    // 按首次出现顺序分组
    let mut order: Vec<i64> = Vec::new();
    let mut tracks: HashMap<i64, Vec<&DetectionRecord>> = HashMap::new();
    for record in records {
      if self.skip_untracked && record.track_id == UNKNOWN_TRACK_ID {
        continue;
      }
      tracks
        .entry(record.track_id)
        .or_insert_with(|| {
          order.push(record.track_id);
          Vec::new()
        })
        .push(record);
    }

    let mut motions = Vec::new();
    for track_id in order {
      let Some(mut track) = tracks.remove(&track_id) else {
        continue;
      };
      if track.len() < 2 {
        continue;
      }
      track.sort_by(|a, b| a.timestamp_ms.total_cmp(&b.timestamp_ms));

      for pair in track.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        let dt = (curr.timestamp_ms - prev.timestamp_ms) / 1000.0;
        if dt == 0.0 {
          continue;
        }
        let (x0, y0) = prev.centroid();
        let (x1, y1) = curr.centroid();
        let (dx, dy) = (x1 - x0, y1 - y0);
        motions.push(MotionRecord {
          track_id,
          class: curr.class.clone(),
          timestamp_ms: curr.timestamp_ms,
          direction: classify_direction(dx, dy),
          speed_pps: dx.hypot(dy) / dt,
        });
      }
    }

    debug!("{} 条记录生成 {} 条运动记录", records.len(), motions.len());
    motions
  }
}

/// 读取检测日志并用默认设置生成运动摘要
pub fn analyze_motion(log_path: impl AsRef<Path>) -> Result<Vec<MotionRecord>, AnalysisError> {
  let records = read_detection_log(log_path)?;
  Ok(MotionSummarizer::new().summarize(&records))
}

pub fn write_motion_csv(
  path: impl AsRef<Path>,
  motions: &[MotionRecord],
) -> Result<(), AnalysisError> {
  let path = path.as_ref();
  let io_err = |source| AnalysisError::Io {
    path: path.to_path_buf(),
    source,
  };

  let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
  writeln!(writer, "{}", MOTION_HEADER).map_err(io_err)?;
  for motion in motions {
    writeln!(writer, "{}", motion.to_csv_row()).map_err(io_err)?;
  }
  writer.flush().map_err(io_err)?;
  info!("运动摘要已写入: {} ({} 条)", path.display(), motions.len());
  Ok(())
}
