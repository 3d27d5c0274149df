//! # 工具函数模块
//!
//! 提供美化输出、进度条，以及图像、音频、表面属性等共用处理函数。
//!
//! ## 依赖关系
//! - 被 `commands/` 与 `tools/` 模块使用
//! - 子模块: audio, imaging, output, progress, surface

pub mod audio;
pub mod imaging;
pub mod output;
pub mod progress;
pub mod surface;
