//! # s2port - Source 2 → Source 1 资源移植工具箱
//!
//! 将 Source 2 导出的纹理、材质、模型脚本和音频批量转换为 Source 1 可用的格式，
//! 统一成单一可执行文件。
//!
//! ## 子命令
//! - `list`     - 已注册工具
//! - `info`     - 工具描述与选项
//! - `validate` - 只校验输入
//! - `run`      - 执行批处理
//! - `config`   - 设置文件
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── batch/     (调度器、暂存、冲突策略)
//!   │     └── tools/     (工具契约、注册表与各转换工具)
//!   │           ├── parsers/   (KeyValues / SMD / VTF)
//!   │           └── models/    (作业与材质模型)
//!   ├── config/     (持久化设置)
//!   ├── utils/      (输出、进度条、图像、音频)
//!   └── error.rs    (错误处理)
//! ```

mod batch;
mod cli;
mod commands;
mod config;
mod error;
mod models;
mod parsers;
mod tools;
mod utils;

use clap::Parser;
use cli::Cli;
use config::ConfigManager;

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    let mut config = ConfigManager::new(cli.config.unwrap_or_else(ConfigManager::default_path));
    if let Err(e) = config.load() {
        utils::output::print_warning(&format!(
            "Could not load settings from '{}', using defaults: {}",
            config.path().display(),
            e
        ));
    }

    if let Err(e) = commands::run(cli.command, &mut config) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
