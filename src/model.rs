// 该文件是 Xunji （巡迹） 项目的一部分。
// src/model.rs - 检测/跟踪适配器边界
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

/// 默认置信度阈值
pub const DEFAULT_CONFIDENCE: f32 = 0.25;

/// 检测/跟踪模型
///
/// 模型句柄由调用方创建并显式传入流水线，在整个运行期间只持有一份。
/// 跨帧的跟踪连续性由实现自身负责，流水线不依赖任何隐藏状态。
pub trait Tracker {
  type Error;

  fn track(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<RawDetection>, Self::Error>;
}

impl<T: Tracker + ?Sized> Tracker for Box<T> {
  type Error = T::Error;

  fn track(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<RawDetection>, Self::Error> {
    (**self).track(frame, confidence)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BBox {
  pub x_min: i32,
  pub y_min: i32,
  pub x_max: i32,
  pub y_max: i32,
}

impl BBox {
  pub fn new(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Self {
    Self {
      x_min,
      y_min,
      x_max,
      y_max,
    }
  }

  /// 由浮点坐标构建，向零截断
  pub fn from_xyxy(xyxy: [f32; 4]) -> Self {
    Self::new(
      xyxy[0] as i32,
      xyxy[1] as i32,
      xyxy[2] as i32,
      xyxy[3] as i32,
    )
  }

  pub fn is_valid(&self) -> bool {
    self.x_min < self.x_max && self.y_min < self.y_max
  }

  pub fn centroid(&self) -> (f64, f64) {
    (
      (self.x_min as f64 + self.x_max as f64) / 2.0,
      (self.y_min as f64 + self.y_max as f64) / 2.0,
    )
  }
}

/// 模型对一帧给出的一个原始检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
  pub class_label: String,
  pub confidence: f32,
  pub bbox: BBox,
  /// 跟踪器给出的持久 ID，不保证存在
  pub track_id: Option<i64>,
}

impl RawDetection {
  pub fn new(class_label: impl Into<String>, confidence: f32, bbox: BBox) -> Self {
    Self {
      class_label: class_label.into(),
      confidence,
      bbox,
      track_id: None,
    }
  }

  pub fn with_track_id(mut self, track_id: i64) -> Self {
    self.track_id = Some(track_id);
    self
  }
}

mod replay;
pub use self::replay::{ReplayTracker, ReplayTrackerError};

#[derive(Error, Debug)]
pub enum TrackerError {
  #[error("回放适配器错误: {0}")]
  Replay(#[from] ReplayTrackerError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择的模型
pub enum ModelWrapper {
  Replay(ReplayTracker),
}

impl FromUrl for ModelWrapper {
  type Error = TrackerError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ReplayTracker::SCHEME => Ok(ModelWrapper::Replay(ReplayTracker::from_url(url)?)),
      other => Err(TrackerError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Tracker for ModelWrapper {
  type Error = TrackerError;

  fn track(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<RawDetection>, Self::Error> {
    match self {
      ModelWrapper::Replay(model) => model.track(frame, confidence).map_err(TrackerError::from),
    }
  }
}
