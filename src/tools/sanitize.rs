//! # 文件名清理工具
//!
//! 去掉 Source 2 导出文件名中的哈希后缀（如 `_1b37cc96`），
//! 将所有输入复制到清理后的相对路径。整批处理，冲突时全部回滚。
//!
//! ## 依赖关系
//! - 使用 `regex`

use super::options::{OptionKind, OptionSpec, ToolOptions};
use super::{stem_of, with_file_name, BatchMode, RunContext, ToolContract, ToolDescriptor, ToolSummary};
use crate::error::{PortError, ReasonCode, Result};
use crate::models::JobItem;

use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::new("pattern", OptionKind::Text, "_[0-9a-fA-F]{8}", "Regex removed from file stems"),
    OptionSpec::new("case_insensitive", OptionKind::Bool, "true", "Match the pattern ignoring case"),
];

pub static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    id: "sanitize",
    name: "Filename Sanitizer",
    description: "Strip hash-like fragments from file names",
    extensions: &[],
    mode: BatchMode::Atomic,
    options: OPTIONS,
};

pub fn create() -> Box<dyn ToolContract> {
    Box::new(SanitizeTool::default())
}

#[derive(Debug, Clone)]
pub struct SanitizeTool {
    pattern: Option<Regex>,
}

impl Default for SanitizeTool {
    fn default() -> Self {
        Self {
            pattern: RegexBuilder::new("_[0-9a-fA-F]{8}")
                .case_insensitive(true)
                .build()
                .ok(),
        }
    }
}

impl SanitizeTool {
    /// 清理后的文件主干
    pub fn sanitize_stem(&self, stem: &str) -> String {
        match &self.pattern {
            Some(re) => re.replace_all(stem, "").into_owned(),
            None => stem.to_string(),
        }
    }
}

impl ToolContract for SanitizeTool {
    fn descriptor(&self) -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn configure(&mut self, options: &ToolOptions) -> Result<()> {
        let pattern = options.text("pattern");
        if pattern.is_empty() {
            return Err(PortError::ValidationError {
                problems: vec!["option 'pattern' must not be empty".to_string()],
            });
        }
        let re = RegexBuilder::new(pattern)
            .case_insensitive(options.bool("case_insensitive"))
            .build()
            .map_err(|e| PortError::ValidationError {
                problems: vec![format!("option 'pattern': {}", e)],
            })?;
        self.pattern = Some(re);
        Ok(())
    }

    fn output_name(&self, relative: &Path) -> PathBuf {
        let stem = self.sanitize_stem(&stem_of(relative));
        let name = match relative.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.{}", stem, ext),
            None => stem,
        };
        with_file_name(relative, &name)
    }

    fn run(&self, jobs: &[JobItem], ctx: &mut RunContext) -> Result<ToolSummary> {
        let mut claimed: BTreeMap<&Path, &Path> = BTreeMap::new();
        let mut renamed = 0usize;

        for (i, job) in jobs.iter().enumerate() {
            ctx.checkpoint()?;
            if self.sanitize_stem(&stem_of(&job.input)).is_empty() {
                return Err(PortError::conversion(
                    &job.input,
                    ReasonCode::Conflict,
                    "file name is empty after sanitizing",
                ));
            }
            if let Some(other) = claimed.insert(job.output.as_path(), job.input.as_path()) {
                return Err(PortError::conversion(
                    &job.input,
                    ReasonCode::Conflict,
                    format!("sanitizes to the same name as {}", other.display()),
                ));
            }

            let bytes = fs::read(&job.input).map_err(|e| PortError::read(&job.input, e))?;
            ctx.write(&job.output, &bytes)?;
            if job.input.file_name() != job.output.file_name() {
                renamed += 1;
            }
            ctx.report((i + 1) as f64 / jobs.len() as f64);
        }

        let mut summary = ToolSummary::default();
        summary.note(format!("{} of {} file name(s) changed", renamed, jobs.len()));
        Ok(summary)
    }
}
