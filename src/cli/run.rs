//! # run 子命令 CLI 定义
//!
//! 对一组输入文件/目录执行某个转换工具。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/run.rs`

use crate::batch::CollisionPolicy;
use crate::tools::options::parse_assignment;

use clap::Args;
use std::path::PathBuf;

/// run 子命令参数
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Tool identifier (see `s2port list`)
    pub tool: String,

    /// Input files or directories
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    pub output: PathBuf,

    /// Tool option as key=value (repeatable)
    #[arg(short = 'O', long = "option", value_parser = parse_assignment)]
    pub options: Vec<(String, String)>,

    /// What to do when an output already exists (default from settings)
    #[arg(long, value_enum)]
    pub collision: Option<CollisionPolicy>,

    /// File name pattern used when expanding directories (comma separated)
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Recurse into subdirectories
    #[arg(short, long, default_value_t = false)]
    pub recursive: bool,

    /// Number of worker threads for pixel processing (0 = auto)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Validate and print the planned outputs without running the tool
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Write a CSV report of every item
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Store the resolved options as this tool's defaults
    #[arg(long, default_value_t = false)]
    pub save_options: bool,
}
