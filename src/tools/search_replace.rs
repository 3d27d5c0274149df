//! # 搜索替换工具
//!
//! 在文本资源（VMT、VMAT、QC、SMD 等）的内容与文件名中批量替换字符串。
//! 整批处理：任一文件失败时全部回滚。
//!
//! ## 依赖关系
//! - 使用 `regex`

use super::options::{OptionKind, OptionSpec, ToolOptions};
use super::{read_text, BatchMode, RunContext, ToolContract, ToolDescriptor, ToolSummary};
use crate::error::{PortError, Result};
use crate::models::JobItem;

use regex::{NoExpand, Regex, RegexBuilder};
use std::fs;
use std::path::{Path, PathBuf};

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::new("search", OptionKind::Text, "", "Text to search for (required)"),
    OptionSpec::new("replace", OptionKind::Text, "", "Replacement text"),
    OptionSpec::new("case_sensitive", OptionKind::Bool, "true", "Match case"),
    OptionSpec::new("whole_words", OptionKind::Bool, "false", "Only match whole words"),
    OptionSpec::new("filenames", OptionKind::Bool, "true", "Apply the replacement to file names"),
    OptionSpec::new("contents", OptionKind::Bool, "true", "Apply the replacement to file contents"),
];

pub static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    id: "search-replace",
    name: "Search & Replace",
    description: "Replace text in asset file contents and names",
    extensions: &["vmt", "vmat", "qc", "qci", "smd", "txt"],
    mode: BatchMode::Atomic,
    options: OPTIONS,
};

pub fn create() -> Box<dyn ToolContract> {
    Box::new(SearchReplaceTool::default())
}

/// 构造字面量匹配正则
pub fn build_matcher(search: &str, case_sensitive: bool, whole_words: bool) -> Result<Regex> {
    let escaped = regex::escape(search);
    let pattern = if whole_words {
        format!(r"\b{}\b", escaped)
    } else {
        escaped
    };
    Ok(RegexBuilder::new(&pattern)
        .case_insensitive(!case_sensitive)
        .build()?)
}

#[derive(Debug, Clone, Default)]
pub struct SearchReplaceTool {
    matcher: Option<Regex>,
    replace: String,
    filenames: bool,
    contents: bool,
}

impl SearchReplaceTool {
    fn matcher(&self) -> Result<&Regex> {
        self.matcher
            .as_ref()
            .ok_or_else(|| PortError::InvalidArgument("search text is not configured".to_string()))
    }
}

impl ToolContract for SearchReplaceTool {
    fn descriptor(&self) -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn configure(&mut self, options: &ToolOptions) -> Result<()> {
        let search = options.text("search");
        if search.is_empty() {
            return Err(PortError::ValidationError {
                problems: vec!["option 'search' is required".to_string()],
            });
        }
        self.matcher = Some(build_matcher(
            search,
            options.bool("case_sensitive"),
            options.bool("whole_words"),
        )?);
        self.replace = options.text("replace").to_string();
        self.filenames = options.bool("filenames");
        self.contents = options.bool("contents");
        Ok(())
    }

    fn validate(&self, inputs: &[PathBuf]) -> Vec<String> {
        let mut problems = Vec::new();
        if self.matcher.is_none() {
            problems.push("option 'search' is required".to_string());
        }
        if inputs.is_empty() {
            problems.push("no input files".to_string());
            return problems;
        }
        for path in inputs {
            if !path.is_file() {
                problems.push(format!("{}: not a readable file", path.display()));
            } else if !DESCRIPTOR.matches_extension(path) {
                problems.push(format!(
                    "{}: unsupported extension, expected one of [{}]",
                    path.display(),
                    DESCRIPTOR.extensions.join(", ")
                ));
            } else if let Err(e) = fs::File::open(path) {
                problems.push(format!("{}: {}", path.display(), e));
            }
        }
        problems
    }

    fn output_name(&self, relative: &Path) -> PathBuf {
        let name = relative
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        match (&self.matcher, self.filenames) {
            (Some(re), true) => {
                let renamed = re.replace_all(name, NoExpand(&self.replace));
                super::with_file_name(relative, &renamed)
            }
            _ => relative.to_path_buf(),
        }
    }

    fn run(&self, jobs: &[JobItem], ctx: &mut RunContext) -> Result<ToolSummary> {
        let re = self.matcher()?;
        let mut total = 0usize;

        for (i, job) in jobs.iter().enumerate() {
            ctx.checkpoint()?;
            if self.contents {
                let text = read_text(&job.input)?;
                total += re.find_iter(&text).count();
                let replaced = re.replace_all(&text, NoExpand(&self.replace));
                ctx.write(&job.output, replaced.as_bytes())?;
            } else {
                let bytes = fs::read(&job.input).map_err(|e| PortError::read(&job.input, e))?;
                ctx.write(&job.output, &bytes)?;
            }
            ctx.report((i + 1) as f64 / jobs.len() as f64);
        }

        let mut summary = ToolSummary::default();
        summary.note(format!("{} replacement(s) in {} file(s)", total, jobs.len()));
        Ok(summary)
    }
}
