// 该文件是 Xunji （巡迹） 项目的一部分。
// src/input/image_sequence.rs - 图像序列输入
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

//! 把目录中按文件名排序的图像当作视频帧读取。
//!
//! URL 格式: `image:///path/to/frames?fps=30`，默认 25 fps。

use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, input::FrameSource, url_path};

pub(crate) const DEFAULT_FPS: f64 = 25.0;

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "gif", "webp"];

#[derive(Error, Debug)]
pub enum ImageSequenceInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("No image files in {0}")]
  Empty(PathBuf),
  #[error("Invalid frame rate: {0}")]
  InvalidFps(String),
}

pub struct ImageSequenceInput {
  files: Vec<PathBuf>,
  cursor: usize,
  width: u32,
  height: u32,
  fps: f64,
  pending: Option<RgbImage>,
  finished: bool,
}

impl FromUrlWithScheme for ImageSequenceInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageSequenceInput {
  type Error = ImageSequenceInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageSequenceInputError::SchemaMismatch);
    }

    let fps = match url.query_pairs().find(|(k, _)| k == "fps") {
      Some((_, v)) => v
        .parse::<f64>()
        .ok()
        .filter(|fps| *fps > 0.0 && fps.is_finite())
        .ok_or_else(|| ImageSequenceInputError::InvalidFps(v.to_string()))?,
      None => DEFAULT_FPS,
    };

    Self::open(url_path(url), fps)
  }
}

impl ImageSequenceInput {
  pub fn open(directory: impl AsRef<Path>, fps: f64) -> Result<Self, ImageSequenceInputError> {
    let directory = directory.as_ref();
    if !(fps > 0.0 && fps.is_finite()) {
      return Err(ImageSequenceInputError::InvalidFps(fps.to_string()));
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(directory)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| {
        path
          .extension()
          .and_then(|ext| ext.to_str())
          .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
          .unwrap_or(false)
      })
      .collect();
    files.sort();

    let first = files
      .first()
      .ok_or_else(|| ImageSequenceInputError::Empty(directory.to_path_buf()))?;
    let image: RgbImage = ImageReader::open(first)?.decode()?.into();
    let (width, height) = image.dimensions();

    info!(
      "图像序列已打开: {} 帧, {}x{} @ {} fps",
      files.len(),
      width,
      height,
      fps
    );

    Ok(Self {
      files,
      cursor: 0,
      width,
      height,
      fps,
      pending: Some(image),
      finished: false,
    })
  }

  fn load(&self, path: &Path) -> Result<RgbImage, ImageSequenceInputError> {
    Ok(ImageReader::open(path)?.decode()?.into())
  }
}

impl Iterator for ImageSequenceInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished || self.cursor >= self.files.len() {
      return None;
    }

    let image = match self.pending.take() {
      Some(image) => image,
      None => match self.load(&self.files[self.cursor]) {
        Ok(image) => image,
        Err(e) => {
          error!("读取帧 {} 失败: {}", self.files[self.cursor].display(), e);
          self.finished = true;
          return None;
        }
      },
    };

    if image.dimensions() != (self.width, self.height) {
      warn!(
        "帧 {} 尺寸 {:?} 与序列尺寸 {}x{} 不一致，停止读取",
        self.files[self.cursor].display(),
        image.dimensions(),
        self.width,
        self.height
      );
      self.finished = true;
      return None;
    }

    let index = self.cursor as u64;
    self.cursor += 1;
    Some(Frame::new(index, index as f64 * 1000.0 / self.fps, image))
  }
}

impl FrameSource for ImageSequenceInput {
  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn frame_rate(&self) -> f64 {
    self.fps
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write_frames(dir: &Path, sizes: &[(u32, u32)]) {
    for (i, (w, h)) in sizes.iter().enumerate() {
      RgbImage::new(*w, *h)
        .save(dir.join(format!("frame_{:03}.png", i)))
        .unwrap();
    }
  }

  #[test]
  fn reads_frames_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), &[(4, 3), (4, 3), (4, 3)]);
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let input = ImageSequenceInput::open(dir.path(), 10.0).unwrap();
    assert_eq!((input.width(), input.height()), (4, 3));
    let frames: Vec<Frame> = input.collect();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[2].index, 2);
    assert_eq!(frames[2].timestamp_ms, 200.0);
  }

  #[test]
  fn size_change_ends_stream() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), &[(4, 3), (5, 3), (4, 3)]);
    let input = ImageSequenceInput::open(dir.path(), 25.0).unwrap();
    assert_eq!(input.count(), 1);
  }

  #[test]
  fn corrupt_frame_ends_stream() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), &[(4, 3)]);
    std::fs::write(dir.path().join("frame_001.png"), b"not a png").unwrap();
    let input = ImageSequenceInput::open(dir.path(), 25.0).unwrap();
    assert_eq!(input.count(), 1);
  }

  #[test]
  fn empty_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      ImageSequenceInput::open(dir.path(), 25.0),
      Err(ImageSequenceInputError::Empty(_))
    ));
  }

  #[test]
  fn fps_is_read_from_url() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), &[(2, 2)]);
    let url = Url::from_directory_path(dir.path()).unwrap();
    let url = Url::parse(&format!("image://{}?fps=12.5", url.path())).unwrap();
    let input = ImageSequenceInput::from_url(&url).unwrap();
    assert_eq!(input.frame_rate(), 12.5);
  }
}
