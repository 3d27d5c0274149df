//! # validate 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/validate.rs`

use crate::tools::options::parse_assignment;

use clap::Args;
use std::path::PathBuf;

/// validate 子命令参数
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Tool identifier (see `s2port list`)
    pub tool: String,

    /// Input files or directories
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Tool option as key=value (repeatable)
    #[arg(short = 'O', long = "option", value_parser = parse_assignment)]
    pub options: Vec<(String, String)>,

    /// File name pattern used when expanding directories (comma separated)
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Recurse into subdirectories
    #[arg(short, long, default_value_t = false)]
    pub recursive: bool,
}
