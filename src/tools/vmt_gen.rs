//! # VMT 生成工具
//!
//! 为已有的 VTF 纹理按模板批量生成 VMT。
//!
//! ## 功能
//! - 内置预设：VertexLitGeneric / LightmappedGeneric / UnlitGeneric / Refract / Water / Decal
//! - 自定义模板文件，占位符 `{{TEXTURE_NAME}}` 或 `{TEXTURE_NAME}`
//! - 纹理名取相对路径（正斜杠、去扩展名）或仅文件名，可加前缀
//!
//! ## 依赖关系
//! - 使用 `parsers/vtf.rs`

use super::options::{OptionKind, OptionSpec, ToolOptions};
use super::{read_head, stem_of, to_slash, with_file_name, BatchMode, RunContext, ToolContract, ToolDescriptor, ToolSummary};
use crate::error::{PortError, Result};
use crate::models::JobItem;
use crate::parsers::vtf;

use std::fs;
use std::path::{Path, PathBuf};

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::new("preset", OptionKind::Text, "VertexLitGeneric", "Built-in template: VertexLitGeneric, LightmappedGeneric, UnlitGeneric, Refract, Water, Decal"),
    OptionSpec::new("template_file", OptionKind::Text, "", "Template VMT file (overrides the preset)"),
    OptionSpec::new("relative_paths", OptionKind::Bool, "true", "Use the path relative to the input root as texture name"),
    OptionSpec::new("prefix", OptionKind::Text, "", "Prefix prepended to the texture name"),
];

pub static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    id: "vmt-gen",
    name: "VMT Generator",
    description: "Generate VMT files for VTF textures from a template",
    extensions: &["vtf"],
    mode: BatchMode::PerFile,
    options: OPTIONS,
};

pub fn create() -> Box<dyn ToolContract> {
    Box::new(VmtGenTool::default())
}

const PLACEHOLDER: &str = "{TEXTURE_NAME}";
const PLACEHOLDER_BRACED: &str = "{{TEXTURE_NAME}}";

// ─────────────────────────────────────────────────────────────
// 内置模板
// ─────────────────────────────────────────────────────────────

const PRESETS: &[(&str, &str)] = &[
    (
        "VertexLitGeneric",
        "\"VertexLitGeneric\"\n{\n\t\"$basetexture\" \"{TEXTURE_NAME}\"\n\t\"$surfaceprop\" \"default\"\n}\n",
    ),
    (
        "LightmappedGeneric",
        "\"LightmappedGeneric\"\n{\n\t\"$basetexture\" \"{TEXTURE_NAME}\"\n\t\"$surfaceprop\" \"default\"\n}\n",
    ),
    (
        "UnlitGeneric",
        "\"UnlitGeneric\"\n{\n\t\"$basetexture\" \"{TEXTURE_NAME}\"\n\t\"$surfaceprop\" \"default\"\n\t\"$vertexcolor\" \"1\"\n\t\"$vertexalpha\" \"1\"\n}\n",
    ),
    (
        "Refract",
        "\"Refract\"\n{\n\t\"$refracttexture\" \"_rt_WaterRefraction\"\n\t\"$dudvmap\" \"{TEXTURE_NAME}\"\n\t\"$normalmap\" \"{TEXTURE_NAME}_normal\"\n\t\"$refractamount\" \"0.5\"\n\t\"$surfaceprop\" \"glass\"\n}\n",
    ),
    (
        "Water",
        "\"Water\"\n{\n\t\"$basetexture\" \"{TEXTURE_NAME}\"\n\t\"$normalmap\" \"{TEXTURE_NAME}_normal\"\n\t\"$surfaceprop\" \"water\"\n\t\"$cheapwaterstartdistance\" \"500\"\n\t\"$cheapwaterenddistance\" \"1000\"\n}\n",
    ),
    (
        "Decal",
        "\"DecalModulate\"\n{\n\t\"$basetexture\" \"{TEXTURE_NAME}\"\n\t\"$decal\" \"1\"\n\t\"$decalscale\" \"1\"\n}\n",
    ),
];

/// 按名称查找预设（忽略大小写）
pub fn preset(name: &str) -> Option<&'static str> {
    PRESETS
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name.trim()))
        .map(|(_, template)| *template)
}

/// 用纹理名替换模板中的占位符
pub fn render(template: &str, texture: &str) -> String {
    template
        .replace(PLACEHOLDER_BRACED, texture)
        .replace(PLACEHOLDER, texture)
}

#[derive(Debug, Clone)]
pub struct VmtGenTool {
    template: String,
    relative_paths: bool,
    prefix: String,
}

impl Default for VmtGenTool {
    fn default() -> Self {
        Self {
            template: PRESETS[0].1.to_string(),
            relative_paths: true,
            prefix: String::new(),
        }
    }
}

impl VmtGenTool {
    /// 由相对输入路径得到纹理名
    pub fn texture_name(&self, relative: &Path) -> String {
        let name = if self.relative_paths {
            to_slash(&with_file_name(relative, &stem_of(relative)))
        } else {
            stem_of(relative)
        };
        let prefix = self.prefix.trim_matches(|c| c == '/' || c == '\\');
        if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix.replace('\\', "/"), name)
        }
    }
}

impl ToolContract for VmtGenTool {
    fn descriptor(&self) -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn configure(&mut self, options: &ToolOptions) -> Result<()> {
        let template_file = options.text("template_file");
        self.template = if template_file.is_empty() {
            let name = options.text("preset");
            preset(name)
                .ok_or_else(|| PortError::ValidationError {
                    problems: vec![format!("option 'preset': unknown preset '{}'", name)],
                })?
                .to_string()
        } else {
            fs::read_to_string(template_file).map_err(|e| PortError::ValidationError {
                problems: vec![format!("option 'template_file': {}: {}", template_file, e)],
            })?
        };
        if !self.template.contains(PLACEHOLDER) {
            log::warn!("VMT template has no {} placeholder", PLACEHOLDER_BRACED);
        }
        self.relative_paths = options.bool("relative_paths");
        self.prefix = options.text("prefix").to_string();
        Ok(())
    }

    fn check_input(&self, path: &Path) -> Option<String> {
        let head = match read_head(path, vtf::HEADER_SIZE) {
            Ok(head) => head,
            Err(e) => return Some(e.to_string()),
        };
        if !vtf::is_vtf(&head) {
            return Some("not a VTF file (missing VTF signature)".to_string());
        }
        match vtf::read_header(&head) {
            Some(header) if header.width == 0 || header.height == 0 => {
                Some("VTF header reports a zero-sized texture".to_string())
            }
            _ => None,
        }
    }

    fn output_name(&self, relative: &Path) -> PathBuf {
        with_file_name(relative, &format!("{}.vmt", stem_of(relative)))
    }

    fn run(&self, jobs: &[JobItem], ctx: &mut RunContext) -> Result<ToolSummary> {
        for (i, job) in jobs.iter().enumerate() {
            ctx.checkpoint()?;
            let texture = self.texture_name(&job.relative);
            log::debug!("{} -> {}", job.input.display(), texture);
            ctx.write(&job.output, render(&self.template, &texture).as_bytes())?;
            ctx.report((i + 1) as f64 / jobs.len() as f64);
        }
        Ok(ToolSummary::default())
    }
}
