// 该文件是 Xunji （巡迹） 项目的一部分。
// src/bin/motion.rs - 由检测日志生成运动摘要
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use xunji::{
  DETECTION_LOG_FILE, MOTION_SUMMARY_FILE,
  analysis::{MotionSummarizer, write_motion_csv},
  track_log::read_detection_log,
};

/// 由 position_log.csv 计算每条轨迹的运动方向和速度
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 包含 position_log.csv 的输出目录
  #[arg(long, default_value = "outputs", value_name = "DIR")]
  pub output_dir: PathBuf,

  /// 跳过没有 track id（-1）的记录
  #[arg(long)]
  pub skip_untracked: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let log_path = args.output_dir.join(DETECTION_LOG_FILE);
  info!("检测日志: {}", log_path.display());

  let records = read_detection_log(&log_path)
    .with_context(|| format!("无法读取检测日志 {}", log_path.display()))?;
  let motions = MotionSummarizer::new()
    .skip_untracked(args.skip_untracked)
    .summarize(&records);

  if motions.is_empty() {
    println!("没有可用的轨迹数据，未生成运动摘要");
    return Ok(());
  }

  for motion in &motions {
    println!(
      "track {:>4} {:<14} {:>10.1} ms  {:<5} {:>8.1} px/s",
      motion.track_id, motion.class, motion.timestamp_ms, motion.direction, motion.speed_pps
    );
  }

  let motion_path = args.output_dir.join(MOTION_SUMMARY_FILE);
  write_motion_csv(&motion_path, &motions)?;
  println!("运动摘要: {} 条 -> {}", motions.len(), motion_path.display());

  Ok(())
}
