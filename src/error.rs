//! # 统一错误处理模块
//!
//! 定义 s2port 的所有错误类型，使用 `thiserror` 派生。
//!
//! ## 依赖关系
//! - 被所有其他模块使用
//! - 无外部模块依赖

use std::fmt;
use std::path::Path;
use thiserror::Error;

/// 转换失败原因码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    /// 输入无法读取或解码
    Unreadable,
    /// 输入结构不符合格式
    Malformed,
    /// 格式合法但不受支持
    Unsupported,
    /// 缺少配套文件（法线贴图、声道文件等）
    MissingCompanion,
    /// 输出路径冲突
    Conflict,
    /// 输出写入失败
    WriteFailed,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReasonCode::Unreadable => "unreadable",
            ReasonCode::Malformed => "malformed",
            ReasonCode::Unsupported => "unsupported",
            ReasonCode::MissingCompanion => "missing-companion",
            ReasonCode::Conflict => "conflict",
            ReasonCode::WriteFailed => "write-failed",
        };
        f.write_str(s)
    }
}

/// s2port 统一错误类型
#[derive(Error, Debug)]
pub enum PortError {
    // ─────────────────────────────────────────────────────────────
    // I/O 错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to read file: {path}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────
    // 校验与转换错误
    // ─────────────────────────────────────────────────────────────
    #[error("Validation failed:\n  - {}", problems.join("\n  - "))]
    ValidationError { problems: Vec<String> },

    #[error("Conversion failed ({reason}): {path}\nReason: {detail}")]
    ConversionError {
        path: String,
        reason: ReasonCode,
        detail: String,
    },

    // ─────────────────────────────────────────────────────────────
    // 注册表错误
    // ─────────────────────────────────────────────────────────────
    #[error("Tool '{0}' is already registered")]
    DuplicateIdentifier(String),

    #[error("Unknown tool: {0}")]
    NotFound(String),

    // ─────────────────────────────────────────────────────────────
    // 调度错误
    // ─────────────────────────────────────────────────────────────
    #[error("Batch cancelled")]
    Cancelled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ─────────────────────────────────────────────────────────────
    // 配置与外部库错误
    // ─────────────────────────────────────────────────────────────
    #[error("Failed to parse settings: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize settings: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid pattern: {0}")]
    RegexError(#[from] regex::Error),

    #[error("{0}")]
    Other(String),
}

impl PortError {
    /// 构造转换错误
    pub fn conversion(path: &Path, reason: ReasonCode, detail: impl Into<String>) -> Self {
        PortError::ConversionError {
            path: path.display().to_string(),
            reason,
            detail: detail.into(),
        }
    }

    /// 构造读取错误
    pub fn read(path: &Path, source: std::io::Error) -> Self {
        PortError::FileReadError {
            path: path.display().to_string(),
            source,
        }
    }

    /// 构造写入错误
    pub fn write(path: &Path, source: std::io::Error) -> Self {
        PortError::FileWriteError {
            path: path.display().to_string(),
            source,
        }
    }

    /// 转换错误的原因码
    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            PortError::ConversionError { reason, .. } => Some(*reason),
            PortError::FileReadError { .. } => Some(ReasonCode::Unreadable),
            PortError::FileWriteError { .. } => Some(ReasonCode::WriteFailed),
            _ => None,
        }
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, PortError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_problems() {
        let err = PortError::ValidationError {
            problems: vec!["no input files".into(), "bad extension".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("no input files"));
        assert!(msg.contains("bad extension"));
    }

    #[test]
    fn test_reason_codes() {
        let err = PortError::conversion(Path::new("a.png"), ReasonCode::Malformed, "bad header");
        assert_eq!(err.reason(), Some(ReasonCode::Malformed));
        assert!(err.to_string().contains("malformed"));
        assert_eq!(PortError::Cancelled.reason(), None);
    }
}
