// 该文件是 Xunji （巡迹） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod analysis;
pub mod filter;
pub mod frame;
pub mod input;
pub mod manifest;
pub mod model;
pub mod output;
pub mod placeholder;
pub mod task;
pub mod track_log;

/// 检测日志文件名
pub const DETECTION_LOG_FILE: &str = "position_log.csv";
/// 标注视频文件名
pub const PROCESSED_VIDEO_FILE: &str = "processed_video.mp4";
/// 标注帧目录名（无视频编码器时使用）
pub const PROCESSED_FRAMES_DIR: &str = "processed_frames";
/// 运行摘要文件名
pub const RUN_MANIFEST_FILE: &str = "run_summary.json";
/// 热力图文件名
pub const HEATMAP_FILE: &str = "heatmap.png";
/// 运动摘要文件名
pub const MOTION_SUMMARY_FILE: &str = "motion_summary.csv";

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 解码 URL 路径中的百分号转义
pub fn url_path(url: &url::Url) -> String {
  let path = url.path();
  urlencoding::decode(path)
    .map(|p| p.into_owned())
    .unwrap_or_else(|_| path.to_string())
}
