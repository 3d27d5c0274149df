//! # 批量处理模块
//!
//! 提供统一的文件批量处理能力。
//!
//! ## 功能
//! - 自动检测输入类型（文件/目录）并收集匹配文件
//! - 输出冲突策略
//! - 暂存区写入与提交/回滚
//! - 逐文件 / 原子两种调度方式，进度反馈与取消
//! - CSV 报告导出
//!
//! ## 依赖关系
//! - 被 `commands/` 使用
//! - 使用 `tools/` 的工具契约
//! - 使用 `walkdir`, `glob`, `tempfile`, `csv`

pub mod cancel;
pub mod collector;
pub mod dispatcher;
pub mod report;
pub mod resolver;
pub mod staging;

pub use cancel::CancelToken;
pub use dispatcher::{BatchDispatcher, BatchEvent, JobCommand};
pub use resolver::CollisionPolicy;
