//! # SMD 模型文本
//!
//! StudioMDL SMD 文件的轻量读取：版本头检查与骨骼节点表。
//!
//! ## 依赖关系
//! - 被 `tools/qc.rs`, `tools/bones.rs`, `tools/qc_prefix.rs` 调用

/// 检查首个有效行是否为 `version 1`
pub fn check_header(content: &str) -> Result<(), String> {
    let first = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("//"));
    match first {
        Some(line) => {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(kw), Some("1")) if kw.eq_ignore_ascii_case("version") => Ok(()),
                _ => Err(format!("expected 'version 1' header, found '{}'", line)),
            }
        }
        None => Err("file is empty".to_string()),
    }
}

/// 读取 `nodes` 段中的骨骼 (id, 名称)
pub fn node_names(content: &str) -> Vec<(i32, String)> {
    let mut nodes = Vec::new();
    let mut in_nodes = false;

    for line in content.lines().map(str::trim) {
        if !in_nodes {
            if line.eq_ignore_ascii_case("nodes") {
                in_nodes = true;
            }
            continue;
        }
        if line.eq_ignore_ascii_case("end") {
            break;
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        let id = match parts.next().and_then(|s| s.parse::<i32>().ok()) {
            Some(id) => id,
            None => continue,
        };
        let rest = parts.next().unwrap_or("").trim();
        if let Some(name) = rest
            .strip_prefix('"')
            .and_then(|r| r.split('"').next())
        {
            nodes.push((id, name.to_string()));
        }
    }

    nodes
}
