//! # Soundscape 检索工具
//!
//! 解析 soundscape 脚本，导出顶层块及其引用的声音文件，并可按关键字检索行。
//!
//! ## 功能
//! - 顶层 `"name" { ... }` 块：名称、行号、全部 `wave` 值
//! - 关键字 / 正则按行匹配（大小写、整词可选）
//! - 结果写为 `<stem>.soundscapes.json`
//!
//! ## 依赖关系
//! - 使用 `parsers/keyvalues.rs`, `serde_json`

use super::options::{OptionKind, OptionSpec, ToolOptions};
use super::{read_text, stem_of, to_slash, with_file_name, BatchMode, RunContext, ToolContract, ToolDescriptor, ToolSummary};
use crate::error::{PortError, ReasonCode, Result};
use crate::models::JobItem;
use crate::parsers::keyvalues::{collect_values, parse_keyvalues, KvValue};

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::new("search", OptionKind::Text, "", "Search term (empty = only extract blocks)"),
    OptionSpec::new("case_sensitive", OptionKind::Bool, "false", "Match case"),
    OptionSpec::new("whole_words", OptionKind::Bool, "false", "Only match whole words"),
    OptionSpec::new("regex", OptionKind::Bool, "false", "Treat the search term as a regular expression"),
];

pub static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    id: "soundscape",
    name: "Soundscape Searcher",
    description: "Extract soundscape blocks and search sound references",
    extensions: &["txt"],
    mode: BatchMode::PerFile,
    options: OPTIONS,
};

pub fn create() -> Box<dyn ToolContract> {
    Box::new(SoundscapeTool::default())
}

/// 单个 soundscape 块
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SoundscapeBlock {
    pub name: String,
    pub line: usize,
    pub waves: Vec<String>,
}

/// 行匹配
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LineMatch {
    pub line: usize,
    pub content: String,
}

/// 单个文件的检索报告
#[derive(Debug, Clone, Serialize)]
pub struct SoundscapeReport {
    pub file: String,
    pub total_blocks: usize,
    pub blocks: Vec<SoundscapeBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_term: Option<String>,
    pub total_matches: usize,
    pub matches: Vec<LineMatch>,
}

/// 提取顶层块
pub fn extract_blocks(content: &str) -> std::result::Result<Vec<SoundscapeBlock>, String> {
    let pairs = parse_keyvalues(content)?;
    Ok(pairs
        .iter()
        .filter(|p| matches!(p.value, KvValue::Block(_)))
        .map(|p| {
            let mut waves = Vec::new();
            collect_values(p.children(), "wave", &mut waves);
            SoundscapeBlock {
                name: p.key.clone(),
                line: p.line,
                waves: waves.into_iter().map(str::to_string).collect(),
            }
        })
        .collect())
}

/// 构造行匹配正则
pub fn build_search(term: &str, case_sensitive: bool, whole_words: bool, is_regex: bool) -> Result<Regex> {
    let pattern = if is_regex {
        term.to_string()
    } else if whole_words {
        format!(r"\b{}\b", regex::escape(term))
    } else {
        regex::escape(term)
    };
    Ok(RegexBuilder::new(&pattern)
        .case_insensitive(!case_sensitive)
        .build()?)
}

#[derive(Debug, Clone, Default)]
pub struct SoundscapeTool {
    search: Option<(String, Regex)>,
}

impl SoundscapeTool {
    /// 生成单个文件的报告
    pub fn analyze(&self, file: &str, content: &str) -> std::result::Result<SoundscapeReport, String> {
        let blocks = extract_blocks(content)?;
        let matches: Vec<LineMatch> = match &self.search {
            Some((_, re)) => content
                .lines()
                .enumerate()
                .filter(|(_, line)| re.is_match(line))
                .map(|(i, line)| LineMatch {
                    line: i + 1,
                    content: line.trim().to_string(),
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(SoundscapeReport {
            file: file.to_string(),
            total_blocks: blocks.len(),
            blocks,
            search_term: self.search.as_ref().map(|(term, _)| term.clone()),
            total_matches: matches.len(),
            matches,
        })
    }
}

impl ToolContract for SoundscapeTool {
    fn descriptor(&self) -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn configure(&mut self, options: &ToolOptions) -> Result<()> {
        let term = options.text("search");
        self.search = if term.is_empty() {
            None
        } else {
            let re = build_search(
                term,
                options.bool("case_sensitive"),
                options.bool("whole_words"),
                options.bool("regex"),
            )
            .map_err(|e| PortError::ValidationError {
                problems: vec![format!("option 'search': {}", e)],
            })?;
            Some((term.to_string(), re))
        };
        Ok(())
    }

    fn check_input(&self, path: &Path) -> Option<String> {
        match read_text(path) {
            Ok(text) => parse_keyvalues(&text).err(),
            Err(e) => Some(e.to_string()),
        }
    }

    fn output_name(&self, relative: &Path) -> PathBuf {
        with_file_name(relative, &format!("{}.soundscapes.json", stem_of(relative)))
    }

    fn run(&self, jobs: &[JobItem], ctx: &mut RunContext) -> Result<ToolSummary> {
        let mut summary = ToolSummary::default();

        for (i, job) in jobs.iter().enumerate() {
            ctx.checkpoint()?;
            let content = read_text(&job.input)?;
            let report = self
                .analyze(&to_slash(&job.relative), &content)
                .map_err(|reason| PortError::conversion(&job.input, ReasonCode::Malformed, reason))?;

            let json = serde_json::to_string_pretty(&report)?;
            ctx.write(&job.output, json.as_bytes())?;
            summary.note(format!(
                "{}: {} block(s), {} match(es)",
                job.relative.display(),
                report.total_blocks,
                report.total_matches
            ));
            ctx.report((i + 1) as f64 / jobs.len() as f64);
        }

        Ok(summary)
    }
}
