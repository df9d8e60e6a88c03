// 该文件是 Xunji （巡迹） 项目的一部分。
// src/filter.rs - 检测类别过滤
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

use std::collections::BTreeSet;
use std::fmt;

use crate::model::RawDetection;

/// 可识别的类别
pub const RECOGNIZED_CLASSES: [&str; 8] = [
  "traffic light",
  "police car",
  "car",
  "person",
  "bus",
  "truck",
  "bicycle",
  "motorcycle",
];

/// 目标类别，`all` 表示不做目标过滤
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetClass {
  All,
  Class(String),
}

impl TargetClass {
  pub fn parse(value: &str) -> Self {
    let value = value.trim().to_lowercase();
    if value == "all" {
      TargetClass::All
    } else {
      TargetClass::Class(value)
    }
  }

  pub fn as_str(&self) -> &str {
    match self {
      TargetClass::All => "all",
      TargetClass::Class(name) => name,
    }
  }

  pub fn matches(&self, class_name: &str) -> bool {
    match self {
      TargetClass::All => true,
      TargetClass::Class(name) => name == class_name,
    }
  }
}

impl fmt::Display for TargetClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 检测过滤器：类别白名单 + 可选的单一目标类别
///
/// 两边都按小写比较，之后要求字符串完全相等。
#[derive(Debug, Clone)]
pub struct DetectionFilter {
  allowlist: BTreeSet<String>,
  target: TargetClass,
}

impl DetectionFilter {
  pub fn new<I, S>(allowlist: I, target: TargetClass) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    Self {
      allowlist: allowlist
        .into_iter()
        .map(|s| s.as_ref().to_lowercase())
        .collect(),
      target,
    }
  }

  /// 使用内置白名单
  pub fn recognized(target: TargetClass) -> Self {
    Self::new(RECOGNIZED_CLASSES, target)
  }

  pub fn target(&self) -> &TargetClass {
    &self.target
  }

  pub fn retain(&self, detection: &RawDetection) -> bool {
    let class_name = detection.class_label.to_lowercase();
    self.allowlist.contains(&class_name) && self.target.matches(&class_name)
  }
}
