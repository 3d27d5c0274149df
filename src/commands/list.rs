//! # list 命令实现
//!
//! 以表格列出全部已注册工具。

use crate::error::Result;
use crate::tools::registry;
use crate::utils::output;

use tabled::{Table, Tabled};

/// 工具列表行
#[derive(Debug, Clone, Tabled)]
struct ToolRow {
    #[tabled(rename = "Id")]
    id: &'static str,
    #[tabled(rename = "Name")]
    name: &'static str,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Inputs")]
    inputs: String,
    #[tabled(rename = "Description")]
    description: &'static str,
}

/// 执行 list 命令
pub fn execute() -> Result<()> {
    let registry = registry::init()?;

    let rows: Vec<ToolRow> = registry
        .list()
        .map(|d| ToolRow {
            id: d.id,
            name: d.name,
            mode: d.mode.to_string(),
            inputs: if d.extensions.is_empty() {
                "*".to_string()
            } else {
                d.extensions.join(", ")
            },
            description: d.description,
        })
        .collect();

    output::print_header(&format!("{} registered tools", rows.len()));
    println!("{}", Table::new(&rows));
    Ok(())
}
