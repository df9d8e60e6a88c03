// 该文件是 Xunji （巡迹） 项目的一部分。
// src/bin/heatmap.rs - 由检测日志生成热力图
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
  HEATMAP_FILE,
  analysis::{HeatmapOutcome, generate_heatmap},
  filter::TargetClass,
};

/// 由 position_log.csv 生成检测位置热力图
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 包含 position_log.csv 和 run_summary.json 的输出目录
  #[arg(long, default_value = "outputs", value_name = "DIR")]
  pub output_dir: PathBuf,

  /// 只统计该类别，all 表示全部
  #[arg(long, default_value = "all", value_name = "CLASS")]
  pub target: String,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let target = TargetClass::parse(&args.target);
  info!("输出目录: {}", args.output_dir.display());
  info!("目标类别: {}", target);

  let outcome = generate_heatmap(&args.output_dir, &target)
    .with_context(|| format!("无法由 {} 生成热力图", args.output_dir.display()))?;

  match outcome {
    HeatmapOutcome::Built(heatmap) => println!(
      "热力图已生成: {} ({} 个位置)",
      args.output_dir.join(HEATMAP_FILE).display(),
      heatmap.total()
    ),
    HeatmapOutcome::NoData => println!("没有可用的位置数据，未生成热力图"),
  }

  Ok(())
}
