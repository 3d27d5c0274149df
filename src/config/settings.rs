//! # 持久化设置
//!
//! TOML 设置文件的数据结构：`[general]` 通用批处理设置，
//! `[tools.<id>]` 各工具的选项默认值。
//!
//! ## 依赖关系
//! - 被 `config/manager.rs`, `commands/` 使用
//! - 使用 `serde` + `toml`

use crate::batch::CollisionPolicy;
use crate::tools::options::{OptionSpec, OptionValue, ToolOptions};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 根设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub general: GeneralSettings,

    /// 工具 id -> 选项键 -> 值
    #[serde(default)]
    pub tools: BTreeMap<String, BTreeMap<String, toml::Value>>,
}

/// 通用批处理设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralSettings {
    #[serde(default)]
    pub collision: CollisionPolicy,

    #[serde(default)]
    pub recursive: bool,

    /// 并行线程数（0 = 自动）
    #[serde(default)]
    pub jobs: usize,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            collision: CollisionPolicy::Overwrite,
            recursive: false,
            jobs: 0,
        }
    }
}

impl Settings {
    /// 工具的已保存选项（字符串形式，交由 schema 解析）
    pub fn tool_options(&self, tool: &str) -> BTreeMap<String, String> {
        self.tools
            .get(tool)
            .map(|table| {
                table
                    .iter()
                    .map(|(k, v)| (k.clone(), value_to_string(v)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 保存整组已解析选项
    pub fn store_tool_options(&mut self, tool: &str, options: &ToolOptions) {
        let table = options
            .iter()
            .map(|(k, v)| (k.clone(), to_toml(v)))
            .collect();
        self.tools.insert(tool.to_string(), table);
    }

    /// 设置单个选项；值需先按 schema 校验
    pub fn set_tool_option(
        &mut self,
        tool: &str,
        spec: &OptionSpec,
        raw: &str,
    ) -> std::result::Result<(), String> {
        let value = OptionValue::parse(spec.kind, raw)?;
        self.tools
            .entry(tool.to_string())
            .or_default()
            .insert(spec.key.to_string(), to_toml(&value));
        Ok(())
    }
}

fn to_toml(value: &OptionValue) -> toml::Value {
    match value {
        OptionValue::Bool(v) => toml::Value::Boolean(*v),
        OptionValue::Int(v) => toml::Value::Integer(*v),
        OptionValue::Float(v) => toml::Value::Float(*v),
        OptionValue::Text(v) => toml::Value::String(v.clone()),
    }
}

fn value_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::options::OptionKind;

    #[test]
    fn test_missing_sections_default() {
        let settings: Settings = toml::from_str("[general]\nrecursive = true\n").unwrap();
        assert!(settings.general.recursive);
        assert_eq!(settings.general.collision, CollisionPolicy::Overwrite);
        assert!(settings.tools.is_empty());
    }

    #[test]
    fn test_tool_options_as_strings() {
        let settings: Settings = toml::from_str(
            "[tools.qc]\nfps = 24\ncollision = true\nmodel_prefix = \"props/x\"\n",
        )
        .unwrap();
        let raw = settings.tool_options("qc");
        assert_eq!(raw.get("fps").map(String::as_str), Some("24"));
        assert_eq!(raw.get("collision").map(String::as_str), Some("true"));
        assert_eq!(raw.get("model_prefix").map(String::as_str), Some("props/x"));
    }

    #[test]
    fn test_set_tool_option_typed() {
        let spec = OptionSpec::new("fps", OptionKind::Int, "30", "");
        let mut settings = Settings::default();
        settings.set_tool_option("qc", &spec, "60").unwrap();
        assert_eq!(settings.tools["qc"]["fps"], toml::Value::Integer(60));
        assert!(settings.set_tool_option("qc", &spec, "sixty").is_err());
    }
}
