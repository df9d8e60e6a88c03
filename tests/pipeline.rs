// 该文件是 Xunji （巡迹） 项目的一部分。
// tests/pipeline.rs - 流水线端到端测试
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

use std::path::Path;

use chrono::Utc;
use image::RgbImage;
use url::Url;

use xunji::{
  DETECTION_LOG_FILE, FromUrl, HEATMAP_FILE, RUN_MANIFEST_FILE,
  analysis::{Direction, HeatmapOutcome, analyze_motion, generate_heatmap},
  filter::{DetectionFilter, TargetClass},
  input::{FrameSource, MemorySource, open_source},
  manifest::RunManifest,
  model::{ModelWrapper, ReplayTracker},
  output::{Annotator, MemorySink, VideoSink, open_video_sink},
  task::{DetectTrackTask, PipelineOutputs, RunStatus, RunSummary, Task},
  track_log::{LOG_HEADER, TrackLogger, read_detection_log},
};

const THREE_FRAMES: &str = r#"{"frame": 0, "detections": [{"class": "car", "confidence": 0.9, "bbox": [0, 0, 10, 10], "track_id": 5}]}
{"frame": 1, "detections": [{"class": "Car", "confidence": 0.8, "bbox": [10, 10, 20, 20], "track_id": 5}]}
{"frame": 2, "detections": []}
"#;

fn write_manifest(dir: &Path, width: u32, height: u32, summary: &RunSummary) {
  let now = Utc::now();
  let mut manifest = RunManifest {
    input: "synthetic".to_string(),
    target: "all".to_string(),
    confidence: 0.25,
    width,
    height,
    frame_rate: 25.0,
    frames_processed: 0,
    detections_retained: 0,
    adapter_failures: 0,
    status: RunStatus::Completed,
    started_at: now,
    finished_at: now,
    log_path: dir.join(DETECTION_LOG_FILE),
    video_path: None,
  };
  manifest.apply_summary(summary);
  manifest.write(dir.join(RUN_MANIFEST_FILE)).unwrap();
}

fn run(
  dir: &Path,
  replay: &str,
  target: &str,
  frames: u64,
) -> (RunSummary, PipelineOutputs<std::io::BufWriter<std::fs::File>, MemorySink>) {
  let tracker = ReplayTracker::from_reader(replay.as_bytes()).unwrap();
  let log = TrackLogger::create(dir.join(DETECTION_LOG_FILE)).unwrap();
  let mut outputs = PipelineOutputs::new(log, MemorySink::new());
  let target = TargetClass::parse(target);

  let summary = DetectTrackTask::new(
    DetectionFilter::recognized(target.clone()),
    Annotator::new(target),
  )
  .run_task(MemorySource::blank(64, 48, 25.0, frames), tracker, &mut outputs)
  .unwrap();
  (summary, outputs)
}

#[test]
fn three_frame_run_logs_two_rows_and_one_motion() {
  let dir = tempfile::tempdir().unwrap();
  let (summary, outputs) = run(dir.path(), THREE_FRAMES, "all", 3);

  assert_eq!(summary.frames_processed, 3);
  assert_eq!(summary.detections_retained, 2);
  assert_eq!(outputs.video.frames_written(), 3);

  let text = std::fs::read_to_string(dir.path().join(DETECTION_LOG_FILE)).unwrap();
  let header = LOG_HEADER.join(",");
  let lines: Vec<&str> = text.lines().collect();
  assert_eq!(
    lines,
    vec![
      header.as_str(),
      "0.0,5,car,0,0,10,10",
      "40.0,5,car,10,10,20,20"
    ]
  );

  let motions = analyze_motion(dir.path().join(DETECTION_LOG_FILE)).unwrap();
  assert_eq!(motions.len(), 1);
  assert_eq!(motions[0].track_id, 5);
  assert_eq!(motions[0].direction, Direction::Down);
  assert_eq!(motions[0].timestamp_ms, 40.0);
  assert!((motions[0].speed_pps - 200.0_f64.sqrt() / 0.04).abs() < 1e-6);
}

#[test]
fn records_match_retained_detections_in_order() {
  let replay = r#"{"frame": 0, "detections": [{"class": "person", "confidence": 0.9, "bbox": [1, 1, 5, 5], "track_id": 1}, {"class": "dog", "confidence": 0.9, "bbox": [2, 2, 6, 6], "track_id": 2}, {"class": "bus", "confidence": 0.9, "bbox": [3, 3, 7, 7]}]}
{"frame": 1, "detections": [{"class": "truck", "confidence": 0.1, "bbox": [1, 1, 5, 5], "track_id": 3}, {"class": "bicycle", "confidence": 0.7, "bbox": [4, 4, 9, 9], "track_id": 4}]}
"#;
  let dir = tempfile::tempdir().unwrap();
  let (summary, _) = run(dir.path(), replay, "all", 2);

  let records = read_detection_log(dir.path().join(DETECTION_LOG_FILE)).unwrap();
  let classes: Vec<&str> = records.iter().map(|r| r.class.as_str()).collect();
  // dog 不在白名单，truck 低于置信度阈值
  assert_eq!(classes, vec!["person", "bus", "bicycle"]);
  assert_eq!(summary.detections_retained, records.len() as u64);
  assert_eq!(records[1].track_id, -1);
  assert!(
    records
      .windows(2)
      .all(|w| w[0].timestamp_ms <= w[1].timestamp_ms)
  );
}

#[test]
fn target_filter_applies_to_log() {
  let dir = tempfile::tempdir().unwrap();
  let (summary, _) = run(dir.path(), THREE_FRAMES, "bus", 3);
  assert_eq!(summary.detections_retained, 0);
  let records = read_detection_log(dir.path().join(DETECTION_LOG_FILE)).unwrap();
  assert!(records.is_empty());
}

#[test]
fn failed_replay_frames_are_counted() {
  let replay = r#"{"frame": 0, "detections": [{"class": "car", "confidence": 0.9, "bbox": [0, 0, 10, 10], "track_id": 1}]}
{"frame": 1, "detections": [], "error": "accelerator timeout"}
{"frame": 2, "detections": [{"class": "car", "confidence": 0.9, "bbox": [0, 10, 10, 20], "track_id": 1}]}
"#;
  let dir = tempfile::tempdir().unwrap();
  let (summary, outputs) = run(dir.path(), replay, "car", 3);
  assert_eq!(summary.adapter_failures, 1);
  assert_eq!(summary.frames_processed, 3);
  assert_eq!(summary.detections_retained, 2);
  assert_eq!(outputs.video.frames_written(), 3);
}

#[test]
fn heatmap_written_only_with_data() {
  let dir = tempfile::tempdir().unwrap();
  let (summary, _) = run(dir.path(), THREE_FRAMES, "all", 3);
  write_manifest(dir.path(), 64, 48, &summary);

  let outcome = generate_heatmap(dir.path(), &TargetClass::parse("person")).unwrap();
  assert!(matches!(outcome, HeatmapOutcome::NoData));
  assert!(!dir.path().join(HEATMAP_FILE).exists());

  let outcome = generate_heatmap(dir.path(), &TargetClass::All).unwrap();
  let HeatmapOutcome::Built(heatmap) = outcome else {
    panic!("expected a heatmap");
  };
  assert_eq!(heatmap.total(), 2);
  let image = image::open(dir.path().join(HEATMAP_FILE)).unwrap();
  assert_eq!((image.width(), image.height()), (64, 48));
}

#[cfg(all(feature = "read_image_file", feature = "save_image_file"))]
#[test]
fn image_directory_runs_through_default_outputs() {
  let frames = tempfile::tempdir().unwrap();
  for i in 0..3 {
    RgbImage::new(40, 30)
      .save(frames.path().join(format!("{:04}.png", i)))
      .unwrap();
  }
  let out = tempfile::tempdir().unwrap();
  let replay_path = out.path().join("replay.jsonl");
  std::fs::write(&replay_path, THREE_FRAMES).unwrap();

  let input = open_source(frames.path().to_str().unwrap()).unwrap();
  assert_eq!((input.width(), input.height()), (40, 30));
  let model_url = Url::parse(&format!("replay://{}", replay_path.display())).unwrap();
  let model = ModelWrapper::from_url(&model_url).unwrap();

  let log = TrackLogger::create(out.path().join(DETECTION_LOG_FILE)).unwrap();
  let video =
    open_video_sink(out.path(), input.width(), input.height(), input.frame_rate()).unwrap();
  let mut outputs = PipelineOutputs::new(log, video);
  let summary = DetectTrackTask::new(
    DetectionFilter::recognized(TargetClass::All),
    Annotator::new(TargetClass::All),
  )
  .run_task(input, model, &mut outputs)
  .unwrap();

  assert_eq!(summary.status, RunStatus::Completed);
  assert_eq!(summary.frames_processed, 3);
  assert_eq!(outputs.video.frames_written(), 3);
  assert_eq!(
    read_detection_log(out.path().join(DETECTION_LOG_FILE))
      .unwrap()
      .len(),
    2
  );
}
