//! # config 命令实现
//!
//! 查看设置文件，或修改通用设置 / 工具选项默认值。
//!
//! ## 依赖关系
//! - 使用 `cli/config.rs` 定义的参数
//! - 使用 `config/` 与 `tools/registry.rs`（按 schema 校验选项值）

use crate::batch::CollisionPolicy;
use crate::cli::config::{ConfigArgs, ConfigCommands};
use crate::config::{ConfigManager, Settings};
use crate::error::{PortError, Result};
use crate::tools::options::{OptionKind, OptionValue};
use crate::tools::registry;
use crate::utils::output;

use clap::ValueEnum;

/// 执行 config 命令
pub fn execute(args: ConfigArgs, config: &mut ConfigManager) -> Result<()> {
    match args.command {
        ConfigCommands::Show => {
            output::print_header(&format!("Settings ({})", config.path().display()));
            println!("{}", toml::to_string_pretty(config.settings())?);
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", config.path().display());
            Ok(())
        }
        ConfigCommands::Set {
            section,
            key,
            value,
        } => {
            if section == "general" {
                set_general(config.settings_mut(), &key, &value)?;
            } else {
                let descriptor = registry::init()?.get(&section)?;
                let spec = descriptor
                    .options
                    .iter()
                    .find(|s| s.key == key)
                    .ok_or_else(|| {
                        PortError::InvalidArgument(format!(
                            "tool '{}' has no option '{}'",
                            descriptor.id, key
                        ))
                    })?;
                config
                    .settings_mut()
                    .set_tool_option(descriptor.id, spec, &value)
                    .map_err(|msg| PortError::ValidationError {
                        problems: vec![format!("option '{}': {}", key, msg)],
                    })?;
            }
            config.save_if_modified()?;
            output::print_success(&format!("{}.{} = {}", section, key, value));
            Ok(())
        }
    }
}

/// 修改 `[general]` 中的单个键
pub fn set_general(settings: &mut Settings, key: &str, value: &str) -> Result<()> {
    let invalid = |msg: String| PortError::ValidationError {
        problems: vec![format!("general.{}: {}", key, msg)],
    };

    match key {
        "collision" => {
            settings.general.collision = <CollisionPolicy as ValueEnum>::from_str(value, true).map_err(invalid)?;
        }
        "recursive" => {
            let parsed = OptionValue::parse(OptionKind::Bool, value).map_err(invalid)?;
            settings.general.recursive = matches!(parsed, OptionValue::Bool(true));
        }
        "jobs" => {
            settings.general.jobs = value
                .trim()
                .parse()
                .map_err(|_| invalid(format!("expected a thread count, got '{}'", value)))?;
        }
        other => {
            return Err(PortError::InvalidArgument(format!(
                "unknown general setting '{}' (collision, recursive, jobs)",
                other
            )))
        }
    }
    Ok(())
}
