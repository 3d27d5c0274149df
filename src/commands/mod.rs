//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `batch/`, `tools/`, `config/`, `utils/`
//! - 子模块: list, info, validate, run, config

pub mod config;
pub mod info;
pub mod list;
pub mod run;
pub mod validate;

use crate::cli::Commands;
use crate::config::{ConfigManager, Settings};
use crate::error::Result;

use std::collections::BTreeMap;

/// 执行命令
pub fn run(cmd: Commands, config: &mut ConfigManager) -> Result<()> {
    match cmd {
        Commands::List => list::execute(),
        Commands::Info(args) => info::execute(args, config.settings()),
        Commands::Validate(args) => validate::execute(args, config.settings()),
        Commands::Run(args) => run::execute(args, config),
        Commands::Config(args) => config::execute(args, config),
    }
}

/// 合并选项：设置文件中的工具默认值 < 命令行 `-O key=value`
pub fn merge_options(
    settings: &Settings,
    tool: &str,
    overrides: &[(String, String)],
) -> BTreeMap<String, String> {
    let mut merged = settings.tool_options(tool);
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_overrides_settings() {
        let settings: Settings =
            toml::from_str("[tools.qc]\nfps = 24\nmodel_prefix = \"props\"\n").unwrap();
        let merged = merge_options(&settings, "qc", &[("fps".to_string(), "60".to_string())]);
        assert_eq!(merged.get("fps").map(String::as_str), Some("60"));
        assert_eq!(merged.get("model_prefix").map(String::as_str), Some("props"));
        assert!(merge_options(&settings, "texture", &[]).is_empty());
    }
}
