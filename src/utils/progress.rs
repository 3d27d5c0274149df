//! # 进度条工具
//!
//! 封装 `indicatif` 提供统一的进度条样式。
//!
//! ## 依赖关系
//! - 被 `commands/run.rs` 使用
//! - 使用 `indicatif` crate，`console` 判断是否为交互终端

use indicatif::{ProgressBar, ProgressStyle};

/// 进度条刻度（批次进度是 0..=1 的小数）
pub const BAR_TICKS: u64 = 1000;

/// 创建批处理进度条；非交互终端时隐藏
pub fn create_batch_bar(message: &str) -> ProgressBar {
    if !console::user_attended() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(BAR_TICKS);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(message.to_string());
    pb
}

/// 将 0..=1 的进度写入进度条
pub fn set_fraction(pb: &ProgressBar, fraction: f64) {
    pb.set_position((fraction.clamp(0.0, 1.0) * BAR_TICKS as f64).round() as u64);
}
