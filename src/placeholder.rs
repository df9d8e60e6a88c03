// 该文件是 Xunji （巡迹） 项目的一部分。
// src/placeholder.rs - 尚未实现的协作组件
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

//! 音频过滤和通用运动估计目前只有接口。
//! 每个操作都会告警并返回 [`Capability::NotImplemented`]，
//! 调用方可以把它和真正运行过的结果区分开。

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::track_log::DetectionRecord;

/// 某项能力的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability<T> {
  Ran(T),
  NotImplemented(&'static str),
}

impl<T> Capability<T> {
  pub fn is_implemented(&self) -> bool {
    matches!(self, Capability::Ran(_))
  }

  pub fn ran(self) -> Option<T> {
    match self {
      Capability::Ran(value) => Some(value),
      Capability::NotImplemented(_) => None,
    }
  }
}

fn not_implemented<T>(what: &'static str) -> Capability<T> {
  warn!("占位实现: {} 尚未实现", what);
  Capability::NotImplemented(what)
}

/// 基于音轨的警笛检测（占位）
pub struct AudioFilter {
  video_path: PathBuf,
  output_dir: PathBuf,
}

impl AudioFilter {
  pub fn new(video_path: impl AsRef<Path>, output_dir: impl AsRef<Path>) -> Self {
    warn!("音频过滤为占位实现，已禁用");
    Self {
      video_path: video_path.as_ref().to_path_buf(),
      output_dir: output_dir.as_ref().to_path_buf(),
    }
  }

  pub fn video_path(&self) -> &Path {
    &self.video_path
  }

  pub fn output_dir(&self) -> &Path {
    &self.output_dir
  }

  /// 提取音轨，成功时返回音频文件路径
  pub fn extract_audio(&mut self) -> Capability<PathBuf> {
    not_implemented("audio extraction")
  }

  /// 检测警笛，返回是否听到警笛
  pub fn detect_sirens(&mut self) -> Capability<bool> {
    not_implemented("siren detection")
  }

  /// 按警笛时段过滤检测记录
  pub fn filter_detections(&mut self, _records: &[DetectionRecord]) -> Capability<Vec<DetectionRecord>> {
    not_implemented("audio-based detection filtering")
  }

  pub fn cleanup(&mut self) -> Capability<()> {
    not_implemented("audio cleanup")
  }
}

/// 通用运动估计（占位），与基于轨迹的运动摘要无关
#[derive(Debug, Default)]
pub struct MotionEstimator;

impl MotionEstimator {
  pub fn new() -> Self {
    Self
  }

  pub fn estimate_movement(&mut self, _records: &[DetectionRecord]) -> Capability<bool> {
    not_implemented("movement estimation")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn audio_filter_reports_not_implemented() {
    let mut audio = AudioFilter::new("clip.mp4", "outputs");
    assert_eq!(audio.video_path(), Path::new("clip.mp4"));
    assert!(!audio.extract_audio().is_implemented());
    assert_eq!(
      audio.detect_sirens(),
      Capability::NotImplemented("siren detection")
    );
    assert!(audio.filter_detections(&[]).ran().is_none());
    assert!(!audio.cleanup().is_implemented());
  }

  #[test]
  fn motion_estimator_is_distinguishable_from_a_result() {
    let mut estimator = MotionEstimator::new();
    let result = estimator.estimate_movement(&[]);
    assert_ne!(result, Capability::Ran(false));
    assert!(Capability::Ran(true).is_implemented());
  }
}
