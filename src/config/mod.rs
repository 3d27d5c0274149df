//! # 配置模块
//!
//! 持久化的用户设置：通用批处理选项与各工具的选项默认值。
//!
//! ## 依赖关系
//! - 被 `main.rs`, `commands/` 使用
//! - 子模块: settings, manager

pub mod manager;
pub mod settings;

pub use manager::ConfigManager;
pub use settings::Settings;
