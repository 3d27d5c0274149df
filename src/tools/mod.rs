//! # 转换工具模块
//!
//! 定义所有转换工具共同遵守的 `ToolContract`，以及工具描述、
//! 运行上下文等公共类型。每个工具一个子模块，彼此互不依赖。
//!
//! ## 功能
//! - `configure` -> `validate` -> `run` 三段式契约
//! - 输出路径由相对输入路径确定性推导
//! - 所有输出经由暂存区写入，成功后才移动到最终位置
//!
//! ## 依赖关系
//! - 被 `batch/dispatcher.rs`, `commands/` 使用
//! - 使用 `batch/staging.rs`, `batch/cancel.rs`
//! - 子模块: options, registry 以及各转换工具

pub mod ao_bake;
pub mod bones;
pub mod brightness_alpha;
pub mod color_alpha;
pub mod loop_sound;
pub mod metal_alpha;
pub mod options;
pub mod pbr_bake;
pub mod qc;
pub mod qc_prefix;
pub mod quad_stereo;
pub mod registry;
pub mod sanitize;
pub mod search_replace;
pub mod soundscape;
pub mod subtexture;
pub mod texture;
pub mod vmat;
pub mod vmt_gen;

pub use options::{OptionSpec, ToolOptions};
pub use registry::ToolRegistry;

use crate::batch::cancel::CancelToken;
use crate::batch::staging::Staging;
use crate::error::{PortError, Result};
use crate::models::JobItem;

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// 批处理模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// 逐文件处理，单项失败不影响其他项
    PerFile,
    /// 整批成功或整批回滚
    Atomic,
}

impl fmt::Display for BatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchMode::PerFile => write!(f, "per-file"),
            BatchMode::Atomic => write!(f, "atomic"),
        }
    }
}

/// 工具描述（注册后不可变）
#[derive(Debug)]
pub struct ToolDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// 接受的扩展名（小写、无点号），为空表示任意文件
    pub extensions: &'static [&'static str],
    pub mode: BatchMode,
    pub options: &'static [OptionSpec],
}

impl ToolDescriptor {
    /// 扩展名是否匹配
    pub fn matches_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        extension_of(path)
            .map(|ext| self.extensions.contains(&ext.as_str()))
            .unwrap_or(false)
    }
}

/// 工具运行摘要
#[derive(Debug, Clone, Default)]
pub struct ToolSummary {
    /// 附加说明（跳过的区域、截断的音频等）
    pub notes: Vec<String>,
}

impl ToolSummary {
    pub fn note(&mut self, msg: impl Into<String>) {
        self.notes.push(msg.into());
    }
}

/// 工具运行上下文：暂存区、进度回调、取消令牌
pub struct RunContext<'a> {
    staging: &'a mut Staging,
    progress: &'a mut dyn FnMut(f64),
    cancel: &'a CancelToken,
}

impl<'a> RunContext<'a> {
    pub fn new(
        staging: &'a mut Staging,
        progress: &'a mut dyn FnMut(f64),
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            staging,
            progress,
            cancel,
        }
    }

    /// 为最终输出路径分配暂存路径
    pub fn stage(&mut self, final_path: &Path) -> Result<PathBuf> {
        self.staging.path_for(final_path)
    }

    /// 将字节写入暂存区
    pub fn write(&mut self, final_path: &Path, bytes: &[u8]) -> Result<()> {
        let staged = self.stage(final_path)?;
        fs::write(&staged, bytes).map_err(|e| PortError::write(final_path, e))
    }

    /// 报告进度（0..=1）
    pub fn report(&mut self, fraction: f64) {
        (self.progress)(fraction.clamp(0.0, 1.0));
    }

    /// 取消检查点
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(PortError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// 所有转换工具的统一契约
pub trait ToolContract: Send {
    /// 工具描述
    fn descriptor(&self) -> &'static ToolDescriptor;

    /// 应用已解析的选项；语义上非法的值返回 `ValidationError`
    fn configure(&mut self, options: &ToolOptions) -> Result<()>;

    /// 目录展开时是否收集该文件
    fn accepts(&self, path: &Path) -> bool {
        self.descriptor().matches_extension(path)
    }

    /// 单个输入的结构检查（魔数、文件头、配套文件）
    fn check_input(&self, _path: &Path) -> Option<String> {
        None
    }

    /// 校验输入列表，返回问题描述；不修改任何状态
    fn validate(&self, inputs: &[PathBuf]) -> Vec<String> {
        let descriptor = self.descriptor();
        let mut problems = Vec::new();

        if inputs.is_empty() {
            problems.push("no input files".to_string());
            return problems;
        }

        for path in inputs {
            if !path.is_file() {
                problems.push(format!("{}: not a readable file", path.display()));
                continue;
            }
            if !descriptor.matches_extension(path) {
                problems.push(format!(
                    "{}: unsupported extension, expected one of [{}]",
                    path.display(),
                    descriptor.extensions.join(", ")
                ));
                continue;
            }
            if let Err(e) = fs::File::open(path) {
                problems.push(format!("{}: {}", path.display(), e));
                continue;
            }
            if let Some(problem) = self.check_input(path) {
                problems.push(format!("{}: {}", path.display(), problem));
            }
        }

        problems
    }

    /// 由相对输入路径推导输出文件名（相对于输出目录）
    fn output_name(&self, relative: &Path) -> PathBuf;

    /// 执行转换
    fn run(&self, jobs: &[JobItem], ctx: &mut RunContext) -> Result<ToolSummary>;
}

// ─────────────────────────────────────────────────────────────
// 工具共用的小函数
// ─────────────────────────────────────────────────────────────

/// 小写扩展名
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// 文件名主干
pub fn stem_of(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// 替换相对路径的文件名，保留目录部分
pub fn with_file_name(relative: &Path, name: &str) -> PathBuf {
    match relative.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// 查找同目录下的配套文件 `<stem><suffix>.<ext>`，优先与输入同扩展名
pub fn find_companion(path: &Path, suffix: &str, extensions: &[&str]) -> Option<PathBuf> {
    let dir = path.parent()?;
    let stem = stem_of(path);
    let own = extension_of(path).unwrap_or_default();
    std::iter::once(own.as_str())
        .chain(extensions.iter().copied())
        .map(|ext| dir.join(format!("{}{}.{}", stem, suffix, ext)))
        .find(|p| p.is_file())
}

/// 文件主干是否以后缀结尾（忽略大小写）
pub fn has_suffix(path: &Path, suffix: &str) -> bool {
    !suffix.is_empty() && stem_of(path).to_lowercase().ends_with(&suffix.to_lowercase())
}

/// 读取文件开头若干字节
pub fn read_head(path: &Path, len: usize) -> std::io::Result<Vec<u8>> {
    let file = fs::File::open(path)?;
    let mut buf = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// 读取 UTF-8 文本，非 UTF-8 内容视为格式错误
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| PortError::read(path, e))?;
    String::from_utf8(bytes).map_err(|_| {
        PortError::conversion(
            path,
            crate::error::ReasonCode::Malformed,
            "file is not valid UTF-8 text",
        )
    })
}

/// 相对路径转为正斜杠形式（材质路径使用）
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_slash() {
        assert_eq!(to_slash(Path::new("a/b/c")), "a/b/c");
        assert_eq!(to_slash(Path::new("./a")), "a");
    }

    #[test]
    fn test_with_file_name() {
        assert_eq!(
            with_file_name(Path::new("sub/x.png"), "x.vtf"),
            PathBuf::from("sub/x.vtf")
        );
        assert_eq!(with_file_name(Path::new("x.png"), "x.vtf"), PathBuf::from("x.vtf"));
    }
}
