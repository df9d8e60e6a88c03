// 该文件是 Xunji （巡迹） 项目的一部分。
// src/analysis.rs - 检测日志后处理
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

//! 检测日志写完之后的两个独立后处理：运动摘要和位置热力图。
//! 两者都只读日志，互不依赖，可以任意顺序运行。

use std::path::PathBuf;

use thiserror::Error;

use crate::{manifest::ManifestError, track_log::LogError};

pub mod heatmap;
pub mod motion;

pub use self::heatmap::{Heatmap, HeatmapOutcome, build_heatmap, generate_heatmap};
pub use self::motion::{
  Direction, MotionRecord, MotionSummarizer, analyze_motion, classify_direction,
  write_motion_csv,
};

#[derive(Error, Debug)]
pub enum AnalysisError {
  #[error("检测日志错误: {0}")]
  Log(#[from] LogError),
  #[error("运行摘要错误: {0}")]
  Manifest(#[from] ManifestError),
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("写入 {path} 失败: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("无效的帧尺寸: {width}x{height}")]
  InvalidDimensions { width: u32, height: u32 },
}
