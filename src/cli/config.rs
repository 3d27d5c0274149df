//! # config 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/config.rs`

use clap::{Args, Subcommand};

/// config 子命令参数
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

/// config 嵌套子命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the current settings
    Show,

    /// Print the settings file location
    Path,

    /// Set a value: `general <key> <value>` or `<tool> <option> <value>`
    Set {
        /// `general` or a tool identifier
        section: String,
        /// Setting or option key
        key: String,
        /// New value
        value: String,
    },
}
