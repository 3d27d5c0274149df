//! # 数据模型模块
//!
//! 定义批处理作业模型和 Source 1 材质模型。
//!
//! ## 依赖关系
//! - 被 `batch/`, `tools/` 和 `commands/` 使用
//! - 子模块: job, material

pub mod job;
pub mod material;

pub use job::{BatchState, BatchSummary, JobFailure, JobItem, JobResult, JobStatus};
