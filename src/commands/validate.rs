//! # validate 命令实现
//!
//! 配置工具、展开输入并执行校验，不运行工具、不写任何文件。
//!
//! ## 依赖关系
//! - 使用 `cli/validate.rs` 定义的参数
//! - 使用 `batch/dispatcher.rs` 的计划阶段

use super::merge_options;
use crate::batch::{BatchDispatcher, CancelToken, CollisionPolicy, JobCommand};
use crate::cli::validate::ValidateArgs;
use crate::config::Settings;
use crate::error::Result;
use crate::tools::registry;
use crate::utils::output;

use std::path::PathBuf;

/// 执行 validate 命令
pub fn execute(args: ValidateArgs, settings: &Settings) -> Result<()> {
    let registry = registry::init()?;
    let descriptor = registry.get(&args.tool)?;
    output::print_header(&format!("Validating inputs for '{}'", descriptor.id));

    let cmd = JobCommand {
        tool: descriptor.id.to_string(),
        options: merge_options(settings, descriptor.id, &args.options),
        inputs: args.inputs,
        output_dir: PathBuf::from("."),
        collision: CollisionPolicy::Overwrite,
        recursive: args.recursive || settings.general.recursive,
        pattern: args.pattern,
    };

    let plan = BatchDispatcher::new(registry, CancelToken::new()).plan(&cmd)?;
    for item in &plan.jobs {
        output::print_success(&item.input.display().to_string());
    }
    output::print_done(&format!("{} input(s) are valid", plan.jobs.len()));
    Ok(())
}
