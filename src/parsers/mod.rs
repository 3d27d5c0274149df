//! # 解析器模块
//!
//! Source 引擎文本与二进制格式的解析/写入。
//!
//! ## 依赖关系
//! - 被 `tools/` 使用
//! - 子模块: keyvalues, smd, vtf

pub mod keyvalues;
pub mod smd;
pub mod vtf;
