//! # 批处理报告导出
//!
//! 将批次汇总导出为 CSV，每个作业项一行。
//!
//! ## 依赖关系
//! - 被 `commands/run.rs` 调用
//! - 使用 `models/job.rs` 的 BatchSummary
//! - 使用 `csv` 库写入 CSV 文件

use crate::error::{PortError, Result};
use crate::models::BatchSummary;

use std::io::Write;
use std::path::Path;

/// 导出批次汇总为 CSV
pub fn to_csv(summary: &BatchSummary, output_path: &Path) -> Result<()> {
    let file = std::fs::File::create(output_path).map_err(|e| PortError::write(output_path, e))?;
    write_csv(summary, file)?;
    log::info!("report written to {}", output_path.display());
    Ok(())
}

/// 写入任意输出流
pub fn write_csv<W: Write>(summary: &BatchSummary, out: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);

    wtr.write_record(["tool", "input", "status", "output", "reason", "message"])?;

    for result in &summary.results {
        let (reason, message) = match &result.error {
            Some(failure) => (
                failure.reason.map(|r| r.to_string()).unwrap_or_default(),
                failure.message.replace('\n', " "),
            ),
            None => (String::new(), String::new()),
        };
        wtr.write_record([
            summary.tool.clone(),
            result.input.display().to_string(),
            result.status.to_string(),
            result
                .output
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            reason,
            message,
        ])?;
    }

    wtr.flush().map_err(|e| PortError::FileWriteError {
        path: "<report>".to_string(),
        source: e,
    })?;

    Ok(())
}
