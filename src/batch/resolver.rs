//! # 输出路径解析
//!
//! 将收集到的输入映射为作业项，并应用输出冲突策略。
//!
//! ## 功能
//! - `overwrite`: 直接覆盖（默认）
//! - `skip`: 输出已存在时跳过该项
//! - `rename`: 追加 `_1`, `_2`... 直到磁盘和本批次内都不冲突
//!
//! ## 依赖关系
//! - 被 `batch/dispatcher.rs` 调用
//! - 使用 `tools::ToolContract::output_name`

use crate::batch::collector::CollectedFile;
use crate::models::JobItem;
use crate::tools::ToolContract;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// 输出冲突策略
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Replace existing outputs
    #[default]
    Overwrite,
    /// Leave existing outputs untouched and skip the input
    Skip,
    /// Write next to existing outputs with a numeric suffix
    Rename,
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollisionPolicy::Overwrite => write!(f, "overwrite"),
            CollisionPolicy::Skip => write!(f, "skip"),
            CollisionPolicy::Rename => write!(f, "rename"),
        }
    }
}

/// 解析全部作业项
pub fn resolve_jobs(
    tool: &dyn ToolContract,
    files: &[CollectedFile],
    output_dir: &Path,
    policy: CollisionPolicy,
) -> Vec<JobItem> {
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    let mut jobs = Vec::with_capacity(files.len());

    for file in files {
        let planned = output_dir.join(tool.output_name(&file.relative));
        let mut item = JobItem::new(file.path.clone(), file.relative.clone(), planned.clone());

        match policy {
            CollisionPolicy::Overwrite => {
                if claimed.contains(&planned) {
                    log::warn!(
                        "{} and another input both map to {}",
                        file.path.display(),
                        planned.display()
                    );
                }
            }
            CollisionPolicy::Skip => {
                if planned.exists() || claimed.contains(&planned) {
                    item.skip = true;
                }
            }
            CollisionPolicy::Rename => {
                item.output = free_path(&planned, &claimed);
            }
        }

        claimed.insert(item.output.clone());
        jobs.push(item);
    }

    jobs
}

/// 寻找未被占用的带编号路径
fn free_path(planned: &Path, claimed: &HashSet<PathBuf>) -> PathBuf {
    let taken = |p: &Path| p.exists() || claimed.contains(p);
    if !taken(planned) {
        return planned.to_path_buf();
    }

    let stem = planned
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    let ext = planned
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();

    let mut n = 1usize;
    loop {
        let candidate = planned.with_file_name(format!("{}_{}{}", stem, n, ext));
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
