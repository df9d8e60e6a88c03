// 该文件是 Xunji （巡迹） 项目的一部分。
// src/output/save_image_file.rs - 保存 PNG 帧序列
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{OutputError, VideoSink, check_frame_size, ensure_dir},
  url_path,
};

/// 把标注帧逐张保存为 `frame_NNNNNN.png`
pub struct SaveImageFileOutput {
  directory: PathBuf,
  size: Option<(u32, u32)>,
  frame_count: u64,
  finished: bool,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = OutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(
        SaveImageFileError::SchemeMismatch(format!(
          "期望保存方式 '{}', 实际保存方式 '{}'",
          Self::SCHEME,
          uri.scheme()
        ))
        .into(),
      );
    }

    let directory = ensure_dir(Path::new(&url_path(uri)))?;
    Ok(SaveImageFileOutput {
      directory,
      size: None,
      frame_count: 0,
      finished: false,
    })
  }
}

impl SaveImageFileOutput {
  pub fn create(directory: &Path, width: u32, height: u32) -> Result<Self, OutputError> {
    let directory = ensure_dir(directory)?;
    info!("帧序列输出目录: {}", directory.display());
    Ok(SaveImageFileOutput {
      directory,
      size: Some((width, height)),
      frame_count: 0,
      finished: false,
    })
  }

  pub fn location(&self) -> &Path {
    &self.directory
  }

  fn frame_path(&self, index: u64) -> PathBuf {
    self.directory.join(format!("frame_{:06}.png", index))
  }
}

impl VideoSink for SaveImageFileOutput {
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), OutputError> {
    if self.finished {
      return Err(OutputError::Finished);
    }
    let expected = *self.size.get_or_insert(image.dimensions());
    check_frame_size(expected, image)?;

    let path = self.frame_path(self.frame_count);
    image.save(&path).map_err(SaveImageFileError::from)?;
    debug!("保存帧到文件: {}", path.display());
    self.frame_count += 1;
    Ok(())
  }

  fn finish(&mut self) -> Result<(), OutputError> {
    if !self.finished {
      self.finished = true;
      info!(
        "帧序列输出完成: {} 帧 -> {}",
        self.frame_count,
        self.directory.display()
      );
    }
    Ok(())
  }

  fn frames_written(&self) -> u64 {
    self.frame_count
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frames_are_numbered_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("frames");
    let mut output = SaveImageFileOutput::create(&target, 4, 2).unwrap();
    for _ in 0..3 {
      output.write_frame(&RgbImage::new(4, 2)).unwrap();
    }
    output.finish().unwrap();

    assert_eq!(output.frames_written(), 3);
    assert!(target.join("frame_000000.png").exists());
    assert!(target.join("frame_000002.png").exists());
    assert!(!target.join("frame_000003.png").exists());
  }

  #[test]
  fn wrong_resolution_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut output = SaveImageFileOutput::create(dir.path(), 4, 2).unwrap();
    assert!(matches!(
      output.write_frame(&RgbImage::new(2, 4)),
      Err(OutputError::FrameSize { .. })
    ));
    assert_eq!(output.frames_written(), 0);
  }

  #[test]
  fn url_sets_directory() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("image://{}/out", dir.path().display())).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();
    assert_eq!(output.location(), dir.path().join("out").as_path());
  }
}
