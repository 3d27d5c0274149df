//! # 文件收集器
//!
//! 根据输入路径和模式收集待处理文件列表。
//!
//! ## 功能
//! - 支持单文件和目录输入
//! - glob 模式匹配（逗号分隔多模式）
//! - 递归目录搜索
//! - 工具自定义过滤（扩展名、排除配套贴图等）
//!
//! ## 依赖关系
//! - 被 `batch/dispatcher.rs` 调用
//! - 使用 `walkdir` 遍历目录，`glob` 匹配文件名

use glob::{MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// 收集到的文件
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CollectedFile {
    pub path: PathBuf,
    /// 相对于收集根目录的路径；单文件输入时为文件名
    pub relative: PathBuf,
}

/// 文件收集器
pub struct FileCollector<'a> {
    /// 输入路径
    input: PathBuf,
    /// 匹配模式列表
    patterns: Vec<Pattern>,
    /// 是否递归
    recursive: bool,
    /// 目录展开时的附加过滤
    filter: Option<&'a dyn Fn(&Path) -> bool>,
}

impl<'a> FileCollector<'a> {
    /// 创建新的文件收集器
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            patterns: Vec::new(),
            recursive: false,
            filter: None,
        }
    }

    /// 设置匹配模式（逗号分隔的多模式，无效模式被忽略）
    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.patterns = pattern
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .filter_map(|s| match Pattern::new(s) {
                Ok(p) => Some(p),
                Err(e) => {
                    log::warn!("ignoring invalid pattern '{}': {}", s, e);
                    None
                }
            })
            .collect();
        self
    }

    /// 设置是否递归搜索
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// 设置目录展开过滤器
    pub fn with_filter(mut self, filter: &'a dyn Fn(&Path) -> bool) -> Self {
        self.filter = Some(filter);
        self
    }

    /// 收集所有匹配的文件（按路径排序）
    pub fn collect(&self) -> Vec<CollectedFile> {
        // 显式给出的文件不经过滤器，交由 validate 报告问题
        if self.input.is_file() {
            let relative = self
                .input
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| self.input.clone());
            return vec![CollectedFile {
                path: self.input.clone(),
                relative,
            }];
        }

        if !self.input.is_dir() {
            return vec![];
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };

        let mut files: Vec<CollectedFile> = WalkDir::new(&self.input)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|e| !is_stage_dir(e))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| self.matches_patterns(e.path()))
            .filter(|e| self.filter.map(|f| f(e.path())).unwrap_or(true))
            .map(|e| {
                let path = e.path().to_path_buf();
                let relative = path
                    .strip_prefix(&self.input)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| path.clone());
                CollectedFile { path, relative }
            })
            .collect();

        files.sort();
        files
    }

    /// 检查文件是否匹配任一模式（无模式时全部匹配）
    fn matches_patterns(&self, path: &Path) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return false,
        };
        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };
        self.patterns
            .iter()
            .any(|p| p.matches_with(filename, options))
    }
}

/// 暂存目录不参与收集
fn is_stage_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|n| n.starts_with(".s2port-stage-"))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_pattern_and_recursion() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.smd"));
        touch(&dir.path().join("b.SMD"));
        touch(&dir.path().join("c.qc"));
        touch(&dir.path().join("sub/d.smd"));

        let flat = FileCollector::new(dir.path()).with_pattern("*.smd").collect();
        let names: Vec<_> = flat.iter().map(|f| f.relative.clone()).collect();
        assert_eq!(names, vec![PathBuf::from("a.smd"), PathBuf::from("b.SMD")]);

        let deep = FileCollector::new(dir.path())
            .with_pattern("*.smd, *.qc")
            .recursive(true)
            .collect();
        assert_eq!(deep.len(), 4);
        assert!(deep
            .iter()
            .any(|f| f.relative == Path::new("sub").join("d.smd")));
    }

    #[test]
    fn test_filter_and_single_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("wall_color_png.png"));
        touch(&dir.path().join("wall_normal_png.png"));

        let not_normal = |p: &Path| !p.to_string_lossy().contains("_normal_");
        let files = FileCollector::new(dir.path()).with_filter(&not_normal).collect();
        assert_eq!(files.len(), 1);

        let single = FileCollector::new(dir.path().join("wall_normal_png.png"))
            .with_filter(&not_normal)
            .collect();
        assert_eq!(single[0].relative, PathBuf::from("wall_normal_png.png"));
    }

    #[test]
    fn test_skips_stage_dirs() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.txt"));
        touch(&dir.path().join(".s2port-stage-abc/b.txt"));
        let files = FileCollector::new(dir.path()).recursive(true).collect();
        assert_eq!(files.len(), 1);
    }
}
