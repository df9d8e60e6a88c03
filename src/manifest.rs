// 该文件是 Xunji （巡迹） 项目的一部分。
// src/manifest.rs - 运行摘要
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
  fs::File,
  io::{BufReader, BufWriter, Write},
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::task::{RunStatus, RunSummary};

#[derive(Error, Debug)]
pub enum ManifestError {
  #[error("无法访问运行摘要 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("运行摘要格式错误 {path}: {source}")]
  Json {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

/// 写在检测日志旁边的运行摘要
///
/// `status` 不是 `completed` 时，日志是被截断的但仍然有效。
/// 热力图后处理从这里读取帧尺寸。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
  pub input: String,
  pub target: String,
  pub confidence: f32,
  pub width: u32,
  pub height: u32,
  pub frame_rate: f64,
  pub frames_processed: u64,
  pub detections_retained: u64,
  pub adapter_failures: u64,
  pub status: RunStatus,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub log_path: PathBuf,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub video_path: Option<PathBuf>,
}

impl RunManifest {
  pub fn apply_summary(&mut self, summary: &RunSummary) {
    self.frames_processed = summary.frames_processed;
    self.detections_retained = summary.detections_retained;
    self.adapter_failures = summary.adapter_failures;
    self.status = summary.status;
  }

  pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ManifestError> {
    let path = path.as_ref();
    let io_err = |source| ManifestError::Io {
      path: path.to_path_buf(),
      source,
    };

    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    serde_json::to_writer_pretty(&mut writer, self).map_err(|source| ManifestError::Json {
      path: path.to_path_buf(),
      source,
    })?;
    writer.write_all(b"\n").map_err(io_err)?;
    writer.flush().map_err(io_err)?;
    debug!("运行摘要已写入: {}", path.display());
    Ok(())
  }

  pub fn read(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ManifestError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| ManifestError::Json {
      path: path.to_path_buf(),
      source,
    })
  }
}
