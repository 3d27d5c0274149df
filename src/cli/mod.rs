//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `list`: 已注册工具列表
//! - `info`: 工具描述与选项表
//! - `validate`: 只校验输入，不写任何文件
//! - `run`: 执行批处理
//! - `config`: 查看 / 修改设置文件（嵌套子命令）
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: run, validate, config

pub mod config;
pub mod run;
pub mod validate;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// s2port - Source 2 资源移植工具箱
#[derive(Parser)]
#[command(name = "s2port")]
#[command(version)]
#[command(about = "Batch toolkit for porting Source 2 assets to Source 1 formats", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Settings file (default: <config dir>/s2port/settings.toml)
    #[arg(long, env = "S2PORT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// List registered conversion tools
    List,

    /// Show a tool's description and option schema
    Info(InfoArgs),

    /// Check inputs for a tool without writing anything
    Validate(validate::ValidateArgs),

    /// Run a tool over a batch of inputs
    Run(run::RunArgs),

    /// Show or edit persisted settings
    Config(config::ConfigArgs),
}

/// info 子命令参数
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Tool identifier (see `s2port list`)
    pub tool: String,
}
