// 该文件是 Xunji （巡迹） 项目的一部分。
// src/output/draw.rs - 检测结果标注
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{info, warn};

use crate::{filter::TargetClass, model::RawDetection, track_log::UNKNOWN_TRACK_ID};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_OFFSET: i32 = 10;

const BANNER_FONT_SIZE: f32 = 30.0;
const BANNER_TEXT_HEIGHT: i32 = 36;
const BANNER_CHAR_WIDTH: f32 = 16.0;
const BANNER_X: i32 = 50;
const BANNER_Y: i32 = 20;

const BOX_THICKNESS: i32 = 2;
const DETECTED_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const MISSING_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const TEXT_COLOR: [u8; 3] = [255, 255, 255];

// 内置的默认字体数据
const BUNDLED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

/// 内置字体 DejaVu Sans
pub fn bundled_font() -> Option<FontArc> {
  match FontArc::try_from_slice(BUNDLED_FONT) {
    Ok(font) => Some(font),
    Err(e) => {
      warn!("内置字体无法解析，标注将只绘制边框和标签底板: {}", e);
      None
    }
  }
}

/// 加载标注字体：指定路径不可用时退回内置字体
pub fn load_font(path: Option<&Path>) -> Option<FontArc> {
  if let Some(path) = path {
    match std::fs::read(path) {
      Ok(data) => match FontArc::try_from_vec(data) {
        Ok(font) => {
          info!("使用字体: {}", path.display());
          return Some(font);
        }
        Err(e) => warn!("字体 {} 无法解析，使用内置字体: {}", path.display(), e),
      },
      Err(e) => warn!("无法读取字体 {}，使用内置字体: {}", path.display(), e),
    }
  }
  bundled_font()
}

/// 帧标注器
///
/// 为每个保留的检测绘制边框和 `ID: <track_id> <class>` 标签，
/// 并在左上角绘制一条横幅，提示本帧是否检测到目标。
pub struct Annotator {
  font: Option<FontArc>,
  target: TargetClass,
  label_scale: PxScale,
  banner_scale: PxScale,
}

impl Annotator {
  /// 默认使用内置字体
  pub fn new(target: TargetClass) -> Self {
    Self {
      font: bundled_font(),
      target,
      label_scale: PxScale::from(LABEL_FONT_SIZE),
      banner_scale: PxScale::from(BANNER_FONT_SIZE),
    }
  }

  pub fn with_font(mut self, font: Option<FontArc>) -> Self {
    self.font = font;
    self
  }

  pub fn label_text(detection: &RawDetection) -> String {
    format!(
      "ID: {} {}",
      detection.track_id.unwrap_or(UNKNOWN_TRACK_ID),
      detection.class_label.to_lowercase()
    )
  }

  /// 横幅文字只取决于目标类别，与白名单无关
  pub fn banner_text(&self, detected: bool) -> String {
    let name = match &self.target {
      TargetClass::All => "object",
      TargetClass::Class(name) => name.as_str(),
    };
    if detected {
      let mut chars = name.chars();
      let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
      };
      format!("{} detected!", capitalized)
    } else {
      format!("No {} detected", name)
    }
  }

  /// 在图像上绘制本帧保留的全部检测以及横幅
  pub fn annotate(&self, image: &mut RgbImage, detections: &[&RawDetection]) {
    for detection in detections {
      self.draw_bbox_with_label(image, detection, DETECTED_COLOR);
    }

    let detected = !detections.is_empty();
    let color = if detected {
      DETECTED_COLOR
    } else {
      MISSING_COLOR
    };
    let banner = self.banner_text(detected);
    self.draw_plate(
      image,
      &banner,
      BANNER_X,
      BANNER_Y,
      (self.banner_scale, BANNER_TEXT_HEIGHT, BANNER_CHAR_WIDTH),
      color,
    );
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, detection: &RawDetection, color: [u8; 3]) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    // Clamp to image bounds
    let x_min = detection.bbox.x_min.clamp(0, w - 1);
    let y_min = detection.bbox.y_min.clamp(0, h - 1);
    let x_max = detection.bbox.x_max.clamp(0, w - 1);
    let y_max = detection.bbox.y_max.clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 绘制边框（加粗为2像素）
    for thickness in 0..BOX_THICKNESS {
      let width = x_max - x_min - 2 * thickness + 1;
      let height = y_max - y_min - 2 * thickness + 1;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect =
        Rect::at(x_min + thickness, y_min + thickness).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, Rgb(color));
    }

    let label = Self::label_text(detection);
    let label_y = y_min - LABEL_OFFSET - LABEL_TEXT_HEIGHT;
    self.draw_plate(
      image,
      &label,
      x_min,
      label_y.max(0),
      (self.label_scale, LABEL_TEXT_HEIGHT, LABEL_CHAR_WIDTH),
      color,
    );
  }

  // 绘制带底板的文字；没有字体时只绘制底板
  fn draw_plate(
    &self,
    image: &mut RgbImage,
    text: &str,
    x: i32,
    y: i32,
    (scale, text_height, char_width): (PxScale, i32, f32),
    color: [u8; 3],
  ) {
    let text_width = match &self.font {
      Some(font) => text_size(scale, font, text).0 as i32,
      None => (text.chars().count() as f32 * char_width) as i32,
    };

    // 确保底板不超出图像边界
    let max_width = (image.width() as i32 - x).max(0);
    let max_height = (image.height() as i32 - y).max(0);
    let plate_width = text_width.min(max_width);
    let plate_height = text_height.min(max_height);
    if plate_width <= 0 || plate_height <= 0 {
      return;
    }

    let rect = Rect::at(x, y).of_size(plate_width as u32, plate_height as u32);
    draw_filled_rect_mut(image, rect, Rgb(color));

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        Rgb(TEXT_COLOR),
        x,
        y + LABEL_TEXT_VERTICAL_PADDING,
        scale,
        font,
        text,
      );
    }
  }
}
