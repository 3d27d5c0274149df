//! # Source 1 材质模型
//!
//! 表示一个 VMT 材质：着色器名 + 有序参数列表。
//!
//! ## 功能
//! - 参数按插入顺序保存，重复键覆盖原值
//! - 输出为 Valve KeyValues 文本
//!
//! ## 依赖关系
//! - 被 `tools/texture.rs`, `tools/vmat.rs` 使用

use std::fmt;

/// 引擎可识别的 Source 1 着色器
pub const SOURCE1_SHADERS: &[&str] = &[
    "VertexLitGeneric",
    "LightmappedGeneric",
    "UnlitGeneric",
    "WorldVertexTransition",
    "Refract",
    "Water",
    "DecalModulate",
];

/// VMT 材质
#[derive(Debug, Clone, PartialEq)]
pub struct Vmt {
    pub shader: String,
    params: Vec<(String, String)>,
}

impl Vmt {
    pub fn new(shader: &str) -> Self {
        Self {
            shader: shader.to_string(),
            params: Vec::new(),
        }
    }

    /// 设置参数（键自动补全 `$` 前缀）
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        let key = if key.starts_with('$') || key.starts_with('%') {
            key.to_string()
        } else {
            format!("${}", key)
        };
        let value = value.into();
        match self
            .params
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some(entry) => entry.1 = value,
            None => self.params.push((key, value)),
        }
        self
    }

    /// 是否为顶点光照模型着色器
    pub fn is_model_shader(&self) -> bool {
        self.shader.eq_ignore_ascii_case("VertexLitGeneric")
    }
}

impl fmt::Display for Vmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\"{}\"", self.shader)?;
        writeln!(f, "{{")?;
        for (key, value) in &self.params {
            writeln!(f, "    \"{}\" \"{}\"", key, value)?;
        }
        writeln!(f, "}}")
    }
}

/// 规范化着色器名（大小写无关匹配已知着色器，未知时返回 None）
pub fn canonical_shader(name: &str) -> Option<&'static str> {
    SOURCE1_SHADERS
        .iter()
        .copied()
        .find(|s| s.eq_ignore_ascii_case(name.trim()))
}
