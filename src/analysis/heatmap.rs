// 该文件是 Xunji （巡迹） 项目的一部分。
// src/analysis/heatmap.rs - 检测位置热力图
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

use image::{Rgb, RgbImage};
use tracing::info;

use crate::{
  DETECTION_LOG_FILE, HEATMAP_FILE, RUN_MANIFEST_FILE,
  analysis::AnalysisError,
  filter::TargetClass,
  manifest::RunManifest,
  track_log::{DetectionRecord, read_detection_log},
};

/// 每个方向上的格子数为帧尺寸除以该值
pub const BIN_DIVISOR: u32 = 20;

// 黄 -> 橙 -> 红
const RAMP: [(f64, [u8; 3]); 5] = [
  (0.0, [255, 255, 204]),
  (0.25, [254, 217, 118]),
  (0.5, [253, 141, 60]),
  (0.75, [227, 26, 28]),
  (1.0, [128, 0, 38]),
];

/// 检测中心点在帧平面上的二维计数
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
  width: u32,
  height: u32,
  bins_x: u32,
  bins_y: u32,
  counts: Vec<u32>,
  total: u64,
}

impl Heatmap {
  pub fn new(width: u32, height: u32) -> Result<Self, AnalysisError> {
    if width == 0 || height == 0 {
      return Err(AnalysisError::InvalidDimensions { width, height });
    }
    let bins_x = (width / BIN_DIVISOR).max(1);
    let bins_y = (height / BIN_DIVISOR).max(1);
    Ok(Self {
      width,
      height,
      bins_x,
      bins_y,
      counts: vec![0; (bins_x * bins_y) as usize],
      total: 0,
    })
  }

  pub fn bins(&self) -> (u32, u32) {
    (self.bins_x, self.bins_y)
  }

  pub fn total(&self) -> u64 {
    self.total
  }

  pub fn count(&self, bin_x: u32, bin_y: u32) -> u32 {
    if bin_x >= self.bins_x || bin_y >= self.bins_y {
      return 0;
    }
    self.counts[(bin_y * self.bins_x + bin_x) as usize]
  }

  pub fn max_count(&self) -> u32 {
    self.counts.iter().copied().max().unwrap_or(0)
  }

  /// 像素坐标所在的格子；帧外的点归入边缘格子
  pub fn bin_of(&self, x: f64, y: f64) -> (u32, u32) {
    let cell_w = self.width as f64 / self.bins_x as f64;
    let cell_h = self.height as f64 / self.bins_y as f64;
    let bx = (x / cell_w).floor().clamp(0.0, (self.bins_x - 1) as f64) as u32;
    let by = (y / cell_h).floor().clamp(0.0, (self.bins_y - 1) as f64) as u32;
    (bx, by)
  }

  pub fn add(&mut self, x: f64, y: f64) {
    let (bx, by) = self.bin_of(x, y);
    self.counts[(by * self.bins_x + bx) as usize] += 1;
    self.total += 1;
  }

  /// 按帧尺寸渲染，计数归一化后映射到黄橙红色带
  pub fn render(&self) -> RgbImage {
    let max = self.max_count().max(1) as f64;
    let colors: Vec<Rgb<u8>> = self
      .counts
      .iter()
      .map(|&c| ramp_color(c as f64 / max))
      .collect();

    RgbImage::from_fn(self.width, self.height, |x, y| {
      let (bx, by) = self.bin_of(x as f64, y as f64);
      colors[(by * self.bins_x + bx) as usize]
    })
  }
}

fn ramp_color(t: f64) -> Rgb<u8> {
  let t = t.clamp(0.0, 1.0);
  for pair in RAMP.windows(2) {
    let (t0, c0) = pair[0];
    let (t1, c1) = pair[1];
    if t <= t1 {
      let f = (t - t0) / (t1 - t0);
      let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * f).round() as u8;
      return Rgb([lerp(c0[0], c1[0]), lerp(c0[1], c1[1]), lerp(c0[2], c1[2])]);
    }
  }
  Rgb(RAMP[RAMP.len() - 1].1)
}

pub enum HeatmapOutcome {
  Built(Heatmap),
  /// 过滤后没有任何记录，不生成图像
  NoData,
}

/// 统计检测中心点；目标类别比较不区分大小写
pub fn build_heatmap(
  records: &[DetectionRecord],
  width: u32,
  height: u32,
  target: &TargetClass,
) -> Result<HeatmapOutcome, AnalysisError> {
  let mut heatmap = Heatmap::new(width, height)?;
  for record in records
    .iter()
    .filter(|r| target.matches(&r.class.to_lowercase()))
  {
    let (x, y) = record.centroid();
    heatmap.add(x, y);
  }

  if heatmap.total() == 0 {
    return Ok(HeatmapOutcome::NoData);
  }
  Ok(HeatmapOutcome::Built(heatmap))
}

/// 读取输出目录中的检测日志和运行摘要，有数据时写出 `heatmap.png`
pub fn generate_heatmap(
  output_dir: impl AsRef<Path>,
  target: &TargetClass,
) -> Result<HeatmapOutcome, AnalysisError> {
  let output_dir = output_dir.as_ref();
  let records = read_detection_log(output_dir.join(DETECTION_LOG_FILE))?;
  let manifest = RunManifest::read(output_dir.join(RUN_MANIFEST_FILE))?;

  let outcome = build_heatmap(&records, manifest.width, manifest.height, target)?;
  if let HeatmapOutcome::Built(heatmap) = &outcome {
    let path = output_dir.join(HEATMAP_FILE);
    heatmap.render().save(&path)?;
    info!(
      "热力图已生成: {} ({} 个位置, 目标 {})",
      path.display(),
      heatmap.total(),
      target
    );
  }
  Ok(outcome)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn rec(class: &str, x: i32, y: i32) -> DetectionRecord {
    DetectionRecord {
      timestamp_ms: 0.0,
      track_id: 1,
      class: class.to_string(),
      x_min: x - 2,
      y_min: y - 2,
      x_max: x + 2,
      y_max: y + 2,
    }
  }

  #[test]
  fn bin_counts_follow_frame_size() {
    let h = Heatmap::new(640, 480).unwrap();
    assert_eq!(h.bins(), (32, 24));
    let tiny = Heatmap::new(10, 5).unwrap();
    assert_eq!(tiny.bins(), (1, 1));
    assert!(Heatmap::new(0, 480).is_err());
  }

  #[test]
  fn centroids_land_in_cells() {
    let all = TargetClass::All;
    let records = [rec("car", 10, 10), rec("car", 12, 14), rec("bus", 630, 470)];
    let HeatmapOutcome::Built(h) = build_heatmap(&records, 640, 480, &all).unwrap() else {
      panic!("expected data");
    };
    assert_eq!(h.total(), 3);
    assert_eq!(h.count(0, 0), 2);
    assert_eq!(h.count(31, 23), 1);
    assert_eq!(h.max_count(), 2);
  }

  #[test]
  fn outside_points_clamp_to_edges() {
    let mut h = Heatmap::new(100, 100).unwrap();
    h.add(-50.0, 500.0);
    assert_eq!(h.count(0, 4), 1);
  }

  #[test]
  fn target_filter_is_case_insensitive() {
    let records = [rec("Car", 10, 10), rec("bus", 50, 50)];
    let HeatmapOutcome::Built(h) =
      build_heatmap(&records, 100, 100, &TargetClass::parse("CAR")).unwrap()
    else {
      panic!("expected data");
    };
    assert_eq!(h.total(), 1);
  }

  #[test]
  fn empty_filter_result_is_no_data() {
    let records = [rec("car", 10, 10)];
    assert!(matches!(
      build_heatmap(&records, 100, 100, &TargetClass::parse("person")).unwrap(),
      HeatmapOutcome::NoData
    ));
    assert!(matches!(
      build_heatmap(&[], 100, 100, &TargetClass::All).unwrap(),
      HeatmapOutcome::NoData
    ));
  }

  #[test]
  fn render_is_frame_sized_and_deterministic() {
    let records = [rec("car", 10, 10)];
    let HeatmapOutcome::Built(h) = build_heatmap(&records, 60, 40, &TargetClass::All).unwrap()
    else {
      panic!("expected data");
    };
    let a = h.render();
    assert_eq!(a.dimensions(), (60, 40));
    assert_eq!(a.get_pixel(5, 5), &Rgb(RAMP[4].1));
    assert_eq!(a.get_pixel(50, 30), &Rgb(RAMP[0].1));
    assert_eq!(a, h.render());
  }
}
