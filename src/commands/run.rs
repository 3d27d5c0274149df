//! # run 命令实现
//!
//! 在独立工作线程上执行批处理，界面线程接收事件并更新进度条。
//!
//! ## 功能
//! - 选项合并：内置默认 < 设置文件 < 命令行
//! - `--dry-run` 只打印计划的输出路径
//! - Ctrl-C 触发协作式取消
//! - 可选 CSV 报告、保存本次选项
//!
//! ## 依赖关系
//! - 使用 `cli/run.rs` 定义的参数
//! - 使用 `batch/`, `config/`, `utils/output.rs`, `utils/progress.rs`
//! - 使用 `crossbeam-channel` 传递事件，`ctrlc` 处理中断

use super::merge_options;
use crate::batch::{report, BatchDispatcher, BatchEvent, CancelToken, JobCommand};
use crate::cli::run::RunArgs;
use crate::config::ConfigManager;
use crate::error::{PortError, Result};
use crate::models::{BatchState, BatchSummary};
use crate::tools::{registry, ToolOptions};
use crate::utils::{output, progress};

use std::fs;
use std::thread;

/// 执行 run 命令
pub fn execute(args: RunArgs, config: &mut ConfigManager) -> Result<()> {
    let registry = registry::init()?;
    let descriptor = registry.get(&args.tool)?;
    let settings = config.settings();

    let cmd = JobCommand {
        tool: descriptor.id.to_string(),
        options: merge_options(settings, descriptor.id, &args.options),
        inputs: args.inputs.clone(),
        output_dir: args.output.clone(),
        collision: args.collision.unwrap_or(settings.general.collision),
        recursive: args.recursive || settings.general.recursive,
        pattern: args.pattern.clone(),
    };

    let num_threads = match args.jobs.unwrap_or(settings.general.jobs) {
        0 => num_cpus::get(),
        n => n,
    };
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .ok();

    output::print_header(&format!("{} -> {}", descriptor.name, args.output.display()));

    if args.dry_run {
        return dry_run(&cmd);
    }

    fs::create_dir_all(&args.output).map_err(|e| PortError::write(&args.output, e))?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        log::warn!("could not install Ctrl-C handler: {}", e);
    }

    let summary = run_batch(cmd.clone(), cancel)?;
    output::print_summary(&summary);

    if let Some(path) = &args.report {
        report::to_csv(&summary, path)?;
        output::print_success(&format!("Report saved to '{}'", path.display()));
    }

    if args.save_options {
        let options = ToolOptions::resolve(descriptor.options, &cmd.options)?;
        config
            .settings_mut()
            .store_tool_options(descriptor.id, &options);
        config.save_if_modified()?;
        output::print_success(&format!("Options saved as defaults for '{}'", descriptor.id));
    }

    match summary.state {
        BatchState::Cancelled => Err(PortError::Cancelled),
        _ if summary.failed > 0 => Err(PortError::Other(format!(
            "{} of {} item(s) failed",
            summary.failures().count(),
            summary.total()
        ))),
        _ => Ok(()),
    }
}

/// 工作线程执行调度，当前线程消费事件
fn run_batch(cmd: JobCommand, cancel: CancelToken) -> Result<BatchSummary> {
    let registry = registry::init()?;
    let (tx, rx) = crossbeam_channel::unbounded::<BatchEvent>();

    let worker = thread::spawn(move || {
        let dispatcher = BatchDispatcher::new(registry, cancel);
        let mut emit = |event: BatchEvent| {
            tx.send(event).ok();
        };
        dispatcher.dispatch(&cmd, &mut emit)
    });

    let pb = progress::create_batch_bar("Starting");
    for event in rx {
        match event {
            BatchEvent::Started { tool, total } => {
                pb.set_message(format!("{} ({} item(s))", tool, total));
            }
            BatchEvent::Progress(fraction) => progress::set_fraction(&pb, fraction),
            BatchEvent::ItemFinished(result) => pb.suspend(|| output::print_job_result(&result)),
        }
    }
    pb.finish_and_clear();

    worker
        .join()
        .map_err(|_| PortError::Other("batch worker panicked".to_string()))?
}

/// 只做计划，不运行工具
fn dry_run(cmd: &JobCommand) -> Result<()> {
    let registry = registry::init()?;
    let plan = BatchDispatcher::new(registry, CancelToken::new()).plan(cmd)?;

    for item in &plan.jobs {
        if item.skip {
            output::print_skip(&format!("{} (output exists)", item.input.display()));
        } else {
            output::print_conversion(
                &item.input.display().to_string(),
                &item.output.display().to_string(),
            );
        }
    }
    output::print_done(&format!(
        "Dry run: {} item(s) planned, nothing written",
        plan.jobs.len()
    ));
    Ok(())
}
