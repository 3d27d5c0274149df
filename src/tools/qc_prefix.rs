//! # QC/SMD 前缀工具
//!
//! 为 QC 及其引用的 SMD 生成带标记的副本，便于同一模型的多个版本并存。
//!
//! ## 功能
//! - `model_prefix` 插入到 `.mdl` / `.smd` / `.qc` 扩展名之前
//! - `texture_prefix` 插入到 SMD 中 `materials/` 之后
//! - 整批处理：任一 QC 或 SMD 出错时全部回滚
//!
//! ## 依赖关系
//! - 使用 `parsers/smd.rs` 检查 SMD 文件头
//! - 使用 `regex` 提取 SMD 引用

use super::options::{OptionKind, OptionSpec, ToolOptions};
use super::{read_text, stem_of, with_file_name, BatchMode, RunContext, ToolContract, ToolDescriptor, ToolSummary};
use crate::error::{PortError, ReasonCode, Result};
use crate::models::JobItem;
use crate::parsers::smd;

use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::new("model_prefix", OptionKind::Text, "", "Tag inserted before the .qc/.mdl/.smd extensions"),
    OptionSpec::new("texture_prefix", OptionKind::Text, "", "Folder inserted after 'materials/' in SMD material names"),
];

pub static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    id: "qc-prefix",
    name: "QC/SMD Prefix",
    description: "Write tagged copies of QC scripts and their SMD files",
    extensions: &["qc"],
    mode: BatchMode::Atomic,
    options: OPTIONS,
};

pub fn create() -> Box<dyn ToolContract> {
    Box::new(QcPrefixTool::default())
}

const MATERIALS_DIR: &str = "materials/";

fn smd_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)"([^"]+\.smd)"|([^\s"]+\.smd)\b"#).expect("static regex is valid")
    })
}

fn smd_extension() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\.smd\b").expect("static regex is valid"))
}

/// 在文件名扩展名前插入标记；没有该扩展名时追加到末尾
pub fn insert_tag(name: &str, tag: &str, ext: &str) -> String {
    let dot = format!(".{}", ext);
    let split = name
        .len()
        .checked_sub(dot.len())
        .filter(|&i| name.is_char_boundary(i) && name[i..].eq_ignore_ascii_case(&dot));
    match split {
        Some(i) => format!("{}{}{}", &name[..i], tag, &name[i..]),
        None => format!("{}{}", name, tag),
    }
}

/// QC 中引用的 SMD（去重，保持出现顺序）
pub fn smd_references(qc: &str) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    for line in qc.lines() {
        let code = line.split("//").next().unwrap_or_default();
        for caps in smd_pattern().captures_iter(code) {
            if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
                let reference = m.as_str().replace('\\', "/");
                if !refs.contains(&reference) {
                    refs.push(reference);
                }
            }
        }
    }
    refs
}

/// 改写 QC：`$modelname` 与所有 `.smd` 引用加标记
pub fn rewrite_qc(qc: &str, tag: &str) -> String {
    let mut out = String::with_capacity(qc.len() + 64);
    for line in qc.split_inclusive('\n') {
        let body = line.trim_end_matches(['\r', '\n']);
        let ending = &line[body.len()..];
        let trimmed = body.trim_start();
        let indent = &body[..body.len() - trimmed.len()];

        let keyword = trimmed.split_whitespace().next().unwrap_or_default();
        if keyword.eq_ignore_ascii_case("$modelname") {
            let path = trimmed[keyword.len()..].trim().trim_matches('"');
            if !path.is_empty() {
                out.push_str(&format!("{}{} \"{}\"{}", indent, keyword, insert_tag(path, tag, "mdl"), ending));
                continue;
            }
        }
        let replacement = format!("{}.smd", tag);
        out.push_str(&smd_extension().replace_all(body, replacement.as_str()));
        out.push_str(ending);
    }
    out
}

/// 改写 SMD 材质路径，返回新文本与替换次数
pub fn rewrite_smd(text: &str, texture_prefix: &str) -> (String, usize) {
    if texture_prefix.is_empty() {
        return (text.to_string(), 0);
    }
    let count = text.matches(MATERIALS_DIR).count();
    let replaced = text.replace(MATERIALS_DIR, &format!("{}{}", MATERIALS_DIR, texture_prefix));
    (replaced, count)
}

/// 引用必须是 QC 目录内的相对路径
fn check_reference(reference: &str) -> std::result::Result<(), String> {
    let path = Path::new(reference);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        Err(format!("SMD reference '{}' leaves the QC folder", reference))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct QcPrefixTool {
    model_prefix: String,
    texture_prefix: String,
}

impl QcPrefixTool {
    /// QC 的结构问题：缺少 `$modelname`、SMD 引用越界或缺失
    fn qc_problems(&self, path: &Path, text: &str) -> Vec<String> {
        let mut problems = Vec::new();
        let has_modelname = text.lines().any(|l| {
            l.split_whitespace()
                .next()
                .is_some_and(|k| k.eq_ignore_ascii_case("$modelname"))
        });
        if !has_modelname {
            problems.push("no $modelname line".to_string());
        }
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        for reference in smd_references(text) {
            if let Err(e) = check_reference(&reference) {
                problems.push(e);
            } else if !dir.join(&reference).is_file() {
                problems.push(format!("missing SMD '{}'", reference));
            }
        }
        problems
    }
}

impl ToolContract for QcPrefixTool {
    fn descriptor(&self) -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn configure(&mut self, options: &ToolOptions) -> Result<()> {
        let model_prefix = options.text("model_prefix").trim();
        let texture_prefix = options.text("texture_prefix").trim();
        if model_prefix.is_empty() && texture_prefix.is_empty() {
            return Err(PortError::ValidationError {
                problems: vec!["set at least one of 'model_prefix' or 'texture_prefix'".to_string()],
            });
        }
        self.model_prefix = model_prefix.to_string();
        self.texture_prefix = texture_prefix.replace('\\', "/");
        Ok(())
    }

    fn check_input(&self, path: &Path) -> Option<String> {
        match read_text(path) {
            Ok(text) => {
                let problems = self.qc_problems(path, &text);
                (!problems.is_empty()).then(|| problems.join("; "))
            }
            Err(e) => Some(e.to_string()),
        }
    }

    fn output_name(&self, relative: &Path) -> PathBuf {
        with_file_name(relative, &format!("{}{}.qc", stem_of(relative), self.model_prefix))
    }

    fn run(&self, jobs: &[JobItem], ctx: &mut RunContext) -> Result<ToolSummary> {
        let mut summary = ToolSummary::default();
        let mut materials = 0usize;
        let mut models = 0usize;

        for (i, job) in jobs.iter().enumerate() {
            ctx.checkpoint()?;
            let qc = read_text(&job.input)?;
            let problems = self.qc_problems(&job.input, &qc);
            if !problems.is_empty() {
                return Err(PortError::conversion(
                    &job.input,
                    ReasonCode::MissingCompanion,
                    problems.join("; "),
                ));
            }

            let src_dir = job.input.parent().unwrap_or_else(|| Path::new("."));
            let out_dir = job.output.parent().unwrap_or_else(|| Path::new("."));
            for reference in smd_references(&qc) {
                let input = src_dir.join(&reference);
                let text = read_text(&input)?;
                smd::check_header(&text)
                    .map_err(|reason| PortError::conversion(&input, ReasonCode::Malformed, reason))?;

                let (rewritten, count) = rewrite_smd(&text, &self.texture_prefix);
                materials += count;
                models += 1;
                let output = out_dir.join(insert_tag(&reference, &self.model_prefix, "smd"));
                ctx.write(&output, rewritten.as_bytes())?;
            }

            ctx.write(&job.output, rewrite_qc(&qc, &self.model_prefix).as_bytes())?;
            log::debug!("{} -> {}", job.input.display(), job.output.display());
            ctx.report((i + 1) as f64 / jobs.len() as f64);
        }

        summary.note(format!(
            "{} QC file(s), {} SMD file(s), {} material path(s) prefixed",
            jobs.len(),
            models,
            materials
        ));
        Ok(summary)
    }
}
