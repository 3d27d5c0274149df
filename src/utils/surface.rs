//! # 表面属性推断
//!
//! 根据资源名称中的关键字推断 Source 1 `$surfaceprop`。
//!
//! ## 依赖关系
//! - 被 `tools/texture.rs`, `tools/vmat.rs`, `tools/qc.rs` 使用

/// 关键字表（按顺序匹配）
const KEYWORDS: &[&str] = &[
    "brick", "concrete", "dirt", "glass", "grass", "gravel", "metal", "plaster", "sand", "tile",
    "water", "wood",
];

/// 推断表面属性，无匹配时为 `default`
pub fn determine_surfaceprop(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    KEYWORDS
        .iter()
        .copied()
        .find(|k| lower.contains(k))
        .unwrap_or("default")
}

/// 选项值为空或 `default`/`auto` 时自动推断
pub fn resolve_surfaceprop(option: &str, name: &str) -> String {
    let option = option.trim();
    if option.is_empty() || option.eq_ignore_ascii_case("default") || option.eq_ignore_ascii_case("auto") {
        determine_surfaceprop(name).to_string()
    } else {
        option.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords() {
        assert_eq!(determine_surfaceprop("Old_Wood_Crate"), "wood");
        assert_eq!(determine_surfaceprop("metal_barrel"), "metal");
        assert_eq!(determine_surfaceprop("hero_face"), "default");
    }

    #[test]
    fn test_explicit_option_wins() {
        assert_eq!(resolve_surfaceprop("flesh", "wood_crate"), "flesh");
        assert_eq!(resolve_surfaceprop("default", "wood_crate"), "wood");
    }
}
