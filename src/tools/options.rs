//! # 工具选项
//!
//! 每个工具以静态 `OptionSpec` 表声明可识别的选项，
//! 运行时将原始字符串键值解析为类型化的 `ToolOptions`。
//!
//! ## 功能
//! - 缺失键回退到默认值
//! - 未知键忽略（记录 debug 日志）
//! - 类型不匹配的值报告为校验错误
//!
//! ## 依赖关系
//! - 被 `tools/`, `config/`, `commands/` 使用

use crate::error::{PortError, Result};

use std::collections::BTreeMap;
use std::fmt;

/// 选项类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Bool,
    Int,
    Float,
    Text,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionKind::Bool => write!(f, "bool"),
            OptionKind::Int => write!(f, "int"),
            OptionKind::Float => write!(f, "float"),
            OptionKind::Text => write!(f, "text"),
        }
    }
}

/// 选项声明
#[derive(Debug, Clone, Copy)]
pub struct OptionSpec {
    pub key: &'static str,
    pub kind: OptionKind,
    pub default: &'static str,
    pub help: &'static str,
}

impl OptionSpec {
    pub const fn new(
        key: &'static str,
        kind: OptionKind,
        default: &'static str,
        help: &'static str,
    ) -> Self {
        Self {
            key,
            kind,
            default,
            help,
        }
    }
}

/// 解析后的选项值
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl OptionValue {
    /// 按类型解析字符串
    pub fn parse(kind: OptionKind, raw: &str) -> std::result::Result<Self, String> {
        let trimmed = raw.trim();
        match kind {
            OptionKind::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(OptionValue::Bool(true)),
                "false" | "0" | "no" | "off" => Ok(OptionValue::Bool(false)),
                _ => Err(format!("expected a boolean, got '{}'", raw)),
            },
            OptionKind::Int => trimmed
                .parse::<i64>()
                .map(OptionValue::Int)
                .map_err(|_| format!("expected an integer, got '{}'", raw)),
            OptionKind::Float => trimmed
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(OptionValue::Float)
                .ok_or_else(|| format!("expected a number, got '{}'", raw)),
            OptionKind::Text => Ok(OptionValue::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(v) => write!(f, "{}", v),
            OptionValue::Int(v) => write!(f, "{}", v),
            OptionValue::Float(v) => write!(f, "{}", v),
            OptionValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// 单个工具实例的已解析选项
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOptions {
    values: BTreeMap<String, OptionValue>,
}

impl ToolOptions {
    /// 依据 schema 解析原始键值
    pub fn resolve(schema: &[OptionSpec], raw: &BTreeMap<String, String>) -> Result<Self> {
        let mut values = BTreeMap::new();
        let mut problems = Vec::new();

        for spec in schema {
            let source = raw.get(spec.key).map(String::as_str).unwrap_or(spec.default);
            match OptionValue::parse(spec.kind, source) {
                Ok(v) => {
                    values.insert(spec.key.to_string(), v);
                }
                Err(msg) => problems.push(format!("option '{}': {}", spec.key, msg)),
            }
        }

        for key in raw.keys() {
            if !schema.iter().any(|s| s.key == key) {
                log::debug!("ignoring unknown option '{}'", key);
            }
        }

        if !problems.is_empty() {
            return Err(PortError::ValidationError { problems });
        }
        Ok(Self { values })
    }

    /// 仅使用默认值
    pub fn defaults(schema: &[OptionSpec]) -> Result<Self> {
        Self::resolve(schema, &BTreeMap::new())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.values.iter()
    }

    pub fn bool(&self, key: &str) -> bool {
        match self.values.get(key) {
            Some(OptionValue::Bool(v)) => *v,
            _ => false,
        }
    }

    pub fn int(&self, key: &str) -> i64 {
        match self.values.get(key) {
            Some(OptionValue::Int(v)) => *v,
            Some(OptionValue::Float(v)) => *v as i64,
            _ => 0,
        }
    }

    pub fn float(&self, key: &str) -> f64 {
        match self.values.get(key) {
            Some(OptionValue::Float(v)) => *v,
            Some(OptionValue::Int(v)) => *v as f64,
            _ => 0.0,
        }
    }

    pub fn text(&self, key: &str) -> &str {
        match self.values.get(key) {
            Some(OptionValue::Text(v)) => v.as_str(),
            _ => "",
        }
    }
}

/// 解析 `key=value` 形式的命令行参数
pub fn parse_assignment(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty option name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

/// 校验数值范围，返回问题描述
pub fn check_range(key: &str, value: f64, min: f64, max: f64) -> Option<String> {
    if value < min || value > max {
        Some(format!(
            "option '{}' must be between {} and {}, got {}",
            key, min, max, value
        ))
    } else {
        None
    }
}
