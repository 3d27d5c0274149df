//! # info 命令实现
//!
//! 显示工具描述与选项表，以及设置文件中保存的当前值。

use crate::cli::InfoArgs;
use crate::config::Settings;
use crate::error::Result;
use crate::tools::registry;
use crate::utils::output;

use tabled::{Table, Tabled};

/// 选项表行
#[derive(Debug, Clone, Tabled)]
struct OptionRow {
    #[tabled(rename = "Option")]
    key: &'static str,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Default")]
    default: &'static str,
    #[tabled(rename = "Saved")]
    saved: String,
    #[tabled(rename = "Description")]
    help: &'static str,
}

/// 执行 info 命令
pub fn execute(args: InfoArgs, settings: &Settings) -> Result<()> {
    let descriptor = registry::init()?.get(&args.tool)?;
    let saved = settings.tool_options(descriptor.id);

    output::print_header(&format!("{} ({})", descriptor.name, descriptor.id));
    println!("{}", descriptor.description);
    println!();
    output::print_info(&format!("Batch mode: {}", descriptor.mode));
    output::print_info(&format!(
        "Inputs: {}",
        if descriptor.extensions.is_empty() {
            "any file".to_string()
        } else {
            descriptor.extensions.join(", ")
        }
    ));

    if descriptor.options.is_empty() {
        output::print_info("No options");
        return Ok(());
    }

    let rows: Vec<OptionRow> = descriptor
        .options
        .iter()
        .map(|spec| OptionRow {
            key: spec.key,
            kind: spec.kind.to_string(),
            default: spec.default,
            saved: saved.get(spec.key).cloned().unwrap_or_default(),
            help: spec.help,
        })
        .collect();
    println!();
    println!("{}", Table::new(&rows));
    Ok(())
}
