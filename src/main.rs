// 该文件是 Xunji （巡迹） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};

use xunji::{
  DETECTION_LOG_FILE, FromUrl, MOTION_SUMMARY_FILE, RUN_MANIFEST_FILE,
  analysis::{HeatmapOutcome, MotionSummarizer, generate_heatmap, write_motion_csv},
  filter::{DetectionFilter, TargetClass},
  input::{FrameSource, open_source},
  manifest::RunManifest,
  model::ModelWrapper,
  output::{Annotator, load_font, open_preview, open_video_sink},
  placeholder::AudioFilter,
  task::{DetectTrackTask, PipelineOutputs, Task, install_stop_handler},
  track_log::{TrackLogger, read_detection_log},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();
  let started_at = Utc::now();
  let target = TargetClass::parse(&args.target);

  info!("输入来源: {}", args.input);
  info!("模型: {}", args.model);
  info!("目标类别: {}, 置信度阈值: {}", target, args.confidence);
  info!("输出目录: {}", args.output_dir.display());

  // 先打开输入源，失败时不创建任何输出文件
  let input = open_source(&args.input).with_context(|| format!("无法打开输入源 {}", args.input))?;
  let (width, height, frame_rate) = (input.width(), input.height(), input.frame_rate());

  let model = ModelWrapper::from_url(&args.model)
    .with_context(|| format!("无法加载模型 {}", args.model))?;

  std::fs::create_dir_all(&args.output_dir)
    .with_context(|| format!("无法创建输出目录 {}", args.output_dir.display()))?;
  let log_path = args.output_dir.join(DETECTION_LOG_FILE);
  let log = TrackLogger::create(&log_path)?;
  let video = open_video_sink(&args.output_dir, width, height, frame_rate)?;
  let video_path = video.location().map(|p| p.to_path_buf());
  let preview = if args.no_window {
    None
  } else {
    open_preview(width, height, frame_rate)
  };

  if args.audio {
    let mut audio = AudioFilter::new(&args.input, &args.output_dir);
    if let Some(audio_path) = audio.extract_audio().ran() {
      info!("音轨已提取: {}", audio_path.display());
    }
    if audio.detect_sirens().ran() == Some(true) {
      info!("检测到警笛");
    }
    audio.cleanup();
  }

  let stop = install_stop_handler().context("无法注册 Ctrl-C 处理")?;
  let annotator = Annotator::new(target.clone()).with_font(load_font(args.font.as_deref()));
  let task = DetectTrackTask::new(DetectionFilter::recognized(target.clone()), annotator)
    .with_confidence(args.confidence)
    .with_max_frames(args.max_frames)
    .with_stop_signal(stop);

  let mut outputs = PipelineOutputs::new(log, video).with_preview(preview);
  let result = task.run_task(input, model, &mut outputs);
  let summary = match &result {
    Ok(summary) => *summary,
    Err(e) => *e.summary(),
  };

  let mut manifest = RunManifest {
    input: args.input.clone(),
    target: target.to_string(),
    confidence: args.confidence,
    width,
    height,
    frame_rate,
    frames_processed: 0,
    detections_retained: 0,
    adapter_failures: 0,
    status: summary.status,
    started_at,
    finished_at: Utc::now(),
    log_path: log_path.clone(),
    video_path,
  };
  manifest.apply_summary(&summary);
  if let Err(e) = manifest.write(args.output_dir.join(RUN_MANIFEST_FILE)) {
    warn!("写入运行摘要失败: {}", e);
  }

  println!(
    "处理完成: {} 帧, {} 个检测 ({:?})",
    summary.frames_processed, summary.detections_retained, summary.status
  );
  if summary.adapter_failures > 0 {
    println!("推理失败帧数: {}", summary.adapter_failures);
  }
  println!("检测日志: {}", log_path.display());
  result?;

  if args.heatmap {
    match generate_heatmap(&args.output_dir, &target).context("生成热力图失败")? {
      HeatmapOutcome::Built(heatmap) => println!("热力图: {} 个位置", heatmap.total()),
      HeatmapOutcome::NoData => println!("没有可用的位置数据，未生成热力图"),
    }
  }

  if args.motion {
    let records = read_detection_log(&log_path)?;
    let motions = MotionSummarizer::new().summarize(&records);
    if motions.is_empty() {
      println!("没有可用的轨迹数据，未生成运动摘要");
    } else {
      let motion_path = args.output_dir.join(MOTION_SUMMARY_FILE);
      write_motion_csv(&motion_path, &motions)?;
      println!("运动摘要: {} 条 -> {}", motions.len(), motion_path.display());
    }
  }

  Ok(())
}
