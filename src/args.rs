// 该文件是 Xunji （巡迹） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;
use url::Url;

/// Xunji 检测与轨迹记录
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源
  /// 支持格式:
  /// - 视频文件: *.mp4, *.avi, *.mkv 等（需要 gstreamer_input 特性）
  /// - 图像目录: 按文件名排序逐张读取
  /// - URL: gst://file/<path>, image://<dir>?fps=<n>
  #[arg(long, value_name = "SOURCE")]
  pub input: String,

  /// 检测/跟踪模型，例如 replay:///path/to/detections.jsonl
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 目标类别，all 表示全部已识别类别
  #[arg(long, default_value = "all", value_name = "CLASS")]
  pub target: String,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.25", value_name = "THRESHOLD", value_parser = parse_confidence)]
  pub confidence: f32,

  /// 输出目录
  #[arg(long, default_value = "outputs", value_name = "DIR")]
  pub output_dir: PathBuf,

  /// 不打开预览窗口
  #[arg(long)]
  pub no_window: bool,

  /// 最大处理帧数
  #[arg(long, value_name = "COUNT")]
  pub max_frames: Option<u64>,

  /// 标注使用的 TrueType 字体，默认使用内置字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 处理完成后生成热力图
  #[arg(long)]
  pub heatmap: bool,

  /// 处理完成后生成运动摘要
  #[arg(long)]
  pub motion: bool,

  /// 运行音频过滤（占位）
  #[arg(long)]
  pub audio: bool,
}

fn parse_confidence(value: &str) -> Result<f32, String> {
  let confidence: f32 = value
    .parse()
    .map_err(|_| format!("'{}' 不是有效的数字", value))?;
  if !(0.0..=1.0).contains(&confidence) {
    return Err(format!("置信度必须在 0.0 到 1.0 之间，实际为 {}", confidence));
  }
  Ok(confidence)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn confidence_is_range_checked() {
    assert_eq!(parse_confidence("0.5"), Ok(0.5));
    assert_eq!(parse_confidence("1"), Ok(1.0));
    assert!(parse_confidence("1.5").is_err());
    assert!(parse_confidence("-0.1").is_err());
    assert!(parse_confidence("high").is_err());
  }

  #[test]
  fn defaults_match_documented_values() {
    let args = Args::try_parse_from([
      "xunji",
      "--input",
      "clip.mp4",
      "--model",
      "replay:///tmp/clip.jsonl",
    ])
    .unwrap();
    assert_eq!(args.target, "all");
    assert_eq!(args.confidence, 0.25);
    assert_eq!(args.output_dir, PathBuf::from("outputs"));
    assert!(!args.no_window && !args.heatmap && !args.motion && !args.audio);
    assert_eq!(args.max_frames, None);
  }
}
