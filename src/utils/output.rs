//! # 美化输出工具
//!
//! 提供统一的终端输出样式。
//!
//! ## 依赖关系
//! - 被所有 `commands/` 模块使用
//! - 使用 `colored` crate

use crate::models::{BatchState, BatchSummary, JobResult, JobStatus};

use colored::Colorize;

/// 打印成功消息
pub fn print_success(msg: &str) {
    println!("{} {}", "[OK]".green().bold(), msg);
}

/// 打印错误消息
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERR]".red().bold(), msg);
}

/// 打印警告消息
pub fn print_warning(msg: &str) {
    println!("{} {}", "[WARN]".yellow().bold(), msg);
}

/// 打印信息消息
pub fn print_info(msg: &str) {
    println!("{} {}", "[*]".blue().bold(), msg);
}

/// 打印跳过消息
pub fn print_skip(msg: &str) {
    println!("{} {}", "[SKIP]".dimmed(), msg);
}

/// 打印完成消息
pub fn print_done(msg: &str) {
    println!("{} {}", "[DONE]".green().bold(), msg);
}

/// 打印转换成功消息
pub fn print_conversion(from: &str, to: &str) {
    println!(
        "{} {} {} {}",
        "[OK]".green().bold(),
        from.dimmed(),
        "->".cyan(),
        to
    );
}

/// 打印单项结果
pub fn print_job_result(result: &JobResult) {
    let input = result.input.display().to_string();
    match result.status {
        JobStatus::Success => {
            let output = result
                .output
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            print_conversion(&input, &output);
        }
        JobStatus::Skipped => print_skip(&format!("{} (output exists)", input)),
        JobStatus::Failed => {
            let msg = result
                .error
                .as_ref()
                .map(|e| e.message.as_str())
                .unwrap_or("unknown error");
            print_error(&format!("{}: {}", input, msg));
        }
    }
}

/// 打印批次汇总
pub fn print_summary(summary: &BatchSummary) {
    print_separator();
    let counts = format!(
        "{} succeeded, {} skipped, {} failed",
        summary.success, summary.skipped, summary.failed
    );
    match summary.state {
        BatchState::Completed if summary.failed == 0 => {
            print_done(&format!("'{}' finished: {}", summary.tool, counts))
        }
        BatchState::Completed => {
            print_warning(&format!("'{}' finished with errors: {}", summary.tool, counts))
        }
        BatchState::Cancelled => {
            print_warning(&format!("'{}' cancelled: {}", summary.tool, counts))
        }
        _ => {
            let reason = summary
                .error
                .as_ref()
                .map(|e| e.message.as_str())
                .unwrap_or("unknown error");
            print_error(&format!(
                "'{}' failed, no files were written: {}",
                summary.tool, reason
            ))
        }
    }
    for note in &summary.notes {
        print_info(note);
    }
}

/// 打印标题栏
pub fn print_header(title: &str) {
    let line = "─".repeat(60);
    println!("\n{}", line.dimmed());
    println!("  {}", title.bold());
    println!("{}\n", line.dimmed());
}

/// 打印分隔线
pub fn print_separator() {
    println!("{}", "─".repeat(60).dimmed());
}
