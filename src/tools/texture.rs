//! # 纹理转换工具
//!
//! 将 Source 2 导出的颜色贴图（及同名法线贴图）转换为 VTF，并生成 VMT。
//!
//! ## 功能
//! - `<name>_color_*.png` -> `<name>.vtf` + `<name>.vmt`
//! - 同目录存在 `<name>_normal_*` 时生成 `<name>_normal.vtf` 与 `$bumpmap`
//! - 限制最大边长，缩放到 2 的幂，可选 mipmap
//! - 按名称推断 `$surfaceprop`，支持附加 VMT 参数
//!
//! ## 依赖关系
//! - 使用 `parsers/vtf.rs`, `models/material.rs`
//! - 使用 `utils/imaging.rs`, `utils/surface.rs`

use super::options::{OptionKind, OptionSpec, ToolOptions};
use super::{
    extension_of, stem_of, to_slash, with_file_name, BatchMode, RunContext, ToolContract,
    ToolDescriptor, ToolSummary,
};
use crate::error::{PortError, ReasonCode, Result};
use crate::models::material::{canonical_shader, Vmt};
use crate::models::JobItem;
use crate::parsers::vtf;
use crate::utils::imaging;
use crate::utils::surface::resolve_surfaceprop;

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::new("material_path", OptionKind::Text, "models", "Material folder used in $basetexture"),
    OptionSpec::new("clamp", OptionKind::Int, "0", "Maximum texture side in pixels (0 = no limit)"),
    OptionSpec::new("shader", OptionKind::Text, "VertexLitGeneric", "VMT shader"),
    OptionSpec::new("surfaceprop", OptionKind::Text, "default", "Surface property (default = infer from name)"),
    OptionSpec::new("mipmaps", OptionKind::Bool, "true", "Generate mipmaps"),
    OptionSpec::new("pow2", OptionKind::Bool, "true", "Resize to the nearest power-of-two size"),
    OptionSpec::new("params", OptionKind::Text, "", "Extra VMT parameters as key=value;key=value"),
];

pub static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    id: "texture",
    name: "Textures to VTF/VMT",
    description: "Convert exported color/normal maps to VTF textures with a VMT",
    extensions: &["png", "tga"],
    mode: BatchMode::PerFile,
    options: OPTIONS,
};

/// 纹理阶段可用的着色器
const TEXTURE_SHADERS: &[&str] = &[
    "VertexLitGeneric",
    "LightmappedGeneric",
    "UnlitGeneric",
    "WorldVertexTransition",
];

pub fn create() -> Box<dyn ToolContract> {
    Box::new(TextureTool::default())
}

fn suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(.*?)(?:_color2?_|_normal_).*$").expect("static regex is valid")
    })
}

/// 去掉 Source 2 贴图后缀得到材质名
pub fn base_name(file_name: &str) -> String {
    suffix_re()
        .captures(file_name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| file_name.to_string())
}

fn is_normal_map(path: &Path) -> bool {
    stem_of(path).to_lowercase().contains("_normal_")
}

fn is_orm_map(path: &Path) -> bool {
    stem_of(path).to_lowercase().contains("_orm_")
}

/// 解析附加参数 `key=value;key=value`
fn parse_params(raw: &str) -> std::result::Result<Vec<(String, String)>, String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| format!("invalid VMT parameter '{}'", pair))
        })
        .collect()
}

/// 纹理转换工具
#[derive(Debug, Clone)]
pub struct TextureTool {
    material_path: String,
    clamp: u32,
    shader: &'static str,
    surfaceprop: String,
    mipmaps: bool,
    pow2: bool,
    params: Vec<(String, String)>,
}

impl Default for TextureTool {
    fn default() -> Self {
        Self {
            material_path: "models".into(),
            clamp: 0,
            shader: "VertexLitGeneric",
            surfaceprop: "default".into(),
            mipmaps: true,
            pow2: true,
            params: Vec::new(),
        }
    }
}

impl TextureTool {
    /// 同目录下的法线贴图
    fn find_normal(&self, color: &Path) -> Option<PathBuf> {
        let dir = color.parent()?;
        let base = base_name(&stem_of(color)).to_lowercase();
        let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_normal_map(p) && DESCRIPTOR.matches_extension(p))
            .filter(|p| base_name(&stem_of(p)).to_lowercase() == base)
            .collect();
        candidates.sort();
        candidates.into_iter().next()
    }

    fn convert(&self, path: &Path) -> Result<Vec<u8>> {
        let mut img = imaging::load_rgba(path)?;
        img = imaging::clamp_size(img, self.clamp);
        if self.pow2 {
            img = imaging::resize_pow2(img, self.clamp);
        }
        vtf::encode(&img, self.mipmaps)
            .map_err(|reason| PortError::conversion(path, ReasonCode::Unsupported, reason))
    }

    /// 生成材质
    pub fn build_vmt(&self, material_dir: &str, name: &str, has_normal: bool) -> Vmt {
        let root = self.material_path.trim_matches('/');
        let mut folder = root.to_string();
        if !material_dir.is_empty() {
            if !folder.is_empty() {
                folder.push('/');
            }
            folder.push_str(material_dir);
        }
        let texture = if folder.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", folder, name)
        };

        let mut vmt = Vmt::new(self.shader);
        vmt.set("$basetexture", texture.clone());
        if has_normal {
            vmt.set("$bumpmap", format!("{}_normal", texture));
        }
        vmt.set(
            "$basetexturetransform",
            "center 0 0 scale 4 4 rotate 0 translate 0 0",
        );
        vmt.set("$surfaceprop", resolve_surfaceprop(&self.surfaceprop, name));
        if vmt.is_model_shader() {
            vmt.set("$model", "1");
        }
        for (k, v) in &self.params {
            vmt.set(k, v.clone());
        }
        vmt
    }
}

impl ToolContract for TextureTool {
    fn descriptor(&self) -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn configure(&mut self, options: &ToolOptions) -> Result<()> {
        let mut problems = Vec::new();

        let clamp = options.int("clamp");
        if !(0..=65535).contains(&clamp) {
            problems.push(format!("option 'clamp' must be between 0 and 65535, got {}", clamp));
        }
        let params = parse_params(options.text("params")).unwrap_or_else(|e| {
            problems.push(e);
            Vec::new()
        });
        if !problems.is_empty() {
            return Err(PortError::ValidationError { problems });
        }

        let requested = options.text("shader");
        self.shader = match canonical_shader(requested) {
            Some(s) if TEXTURE_SHADERS.contains(&s) => s,
            _ => {
                log::warn!("unsupported shader '{}', using VertexLitGeneric", requested);
                "VertexLitGeneric"
            }
        };
        self.material_path = options.text("material_path").to_string();
        self.clamp = clamp as u32;
        self.surfaceprop = options.text("surfaceprop").to_string();
        self.mipmaps = options.bool("mipmaps");
        self.pow2 = options.bool("pow2");
        self.params = params;
        Ok(())
    }

    fn accepts(&self, path: &Path) -> bool {
        DESCRIPTOR.matches_extension(path) && !is_normal_map(path) && !is_orm_map(path)
    }

    fn check_input(&self, path: &Path) -> Option<String> {
        if is_normal_map(path) {
            return Some("is a normal map; pass the matching color map instead".to_string());
        }
        imaging::read_dimensions(path).err()
    }

    fn output_name(&self, relative: &Path) -> PathBuf {
        let name = base_name(&stem_of(relative));
        with_file_name(relative, &format!("{}.vtf", name))
    }

    fn run(&self, jobs: &[JobItem], ctx: &mut RunContext) -> Result<ToolSummary> {
        let mut summary = ToolSummary::default();

        for (i, job) in jobs.iter().enumerate() {
            ctx.checkpoint()?;
            let steps = jobs.len() as f64;
            let name = stem_of(&job.output);

            ctx.write(&job.output, &self.convert(&job.input)?)?;
            ctx.report((i as f64 + 0.5) / steps);

            let normal = self.find_normal(&job.input);
            if let Some(normal_path) = &normal {
                let out = job.output.with_file_name(format!("{}_normal.vtf", name));
                ctx.write(&out, &self.convert(normal_path)?)?;
            } else {
                summary.note(format!("{}: no normal map found", job.input.display()));
            }

            let material_dir = job
                .relative
                .parent()
                .map(to_slash)
                .unwrap_or_default();
            let vmt = self.build_vmt(&material_dir, &name, normal.is_some());
            let vmt_path = job.output.with_extension("vmt");
            ctx.write(&vmt_path, vmt.to_string().as_bytes())?;

            log::debug!(
                "{} -> {} ({})",
                job.input.display(),
                job.output.display(),
                extension_of(&job.input).unwrap_or_default()
            );
            ctx.report((i + 1) as f64 / steps);
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::{job, run_tool};
    use image::{Rgba, RgbaImage};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("crate_color_png_1a2b"), "crate");
        assert_eq!(base_name("Crate_Normal_png"), "Crate");
        assert_eq!(base_name("plain"), "plain");
    }

    #[test]
    fn test_build_vmt() {
        let tool = TextureTool::default();
        let vmt = tool.build_vmt("props", "wood_crate", true);
        assert_eq!(
            vmt.to_string(),
            "\"VertexLitGeneric\"\n{\n    \"$basetexture\" \"models/props/wood_crate\"\n    \"$bumpmap\" \"models/props/wood_crate_normal\"\n    \"$basetexturetransform\" \"center 0 0 scale 4 4 rotate 0 translate 0 0\"\n    \"$surfaceprop\" \"wood\"\n    \"$model\" \"1\"\n}\n"
        );
    }

    #[test]
    fn test_parse_params() {
        assert_eq!(
            parse_params("$phong=1; envmap = env_cubemap").unwrap(),
            vec![
                ("$phong".to_string(), "1".to_string()),
                ("envmap".to_string(), "env_cubemap".to_string())
            ]
        );
        assert!(parse_params("broken").is_err());
    }

    #[test]
    fn test_convert_with_normal() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let color = src.path().join("crate_color_png.png");
        let normal = src.path().join("crate_normal_png.png");
        RgbaImage::from_pixel(16, 16, Rgba([200, 100, 50, 255]))
            .save(&color)
            .unwrap();
        RgbaImage::from_pixel(16, 16, Rgba([128, 128, 255, 255]))
            .save(&normal)
            .unwrap();

        let tool = TextureTool::default();
        assert!(tool.validate(&[color.clone()]).is_empty());
        assert_eq!(tool.validate(&[normal.clone()]).len(), 1);
        assert!(!tool.accepts(&normal));

        let item = job(&tool, &color, src.path(), out.path());
        assert_eq!(item.output, out.path().join("crate.vtf"));
        run_tool(&tool, &[item], out.path()).unwrap();

        let vtf_bytes = fs::read(out.path().join("crate.vtf")).unwrap();
        let header = vtf::read_header(&vtf_bytes).unwrap();
        assert_eq!((header.width, header.height), (16, 16));
        assert!(out.path().join("crate_normal.vtf").is_file());
        let vmt = fs::read_to_string(out.path().join("crate.vmt")).unwrap();
        assert!(vmt.contains("\"$bumpmap\" \"models/crate_normal\""));
    }

    #[test]
    fn test_pow2_stays_within_clamp() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let color = src.path().join("wall_color_png.png");
        RgbaImage::from_pixel(100, 50, Rgba([90, 90, 90, 255]))
            .save(&color)
            .unwrap();

        let raw: std::collections::BTreeMap<String, String> =
            [("clamp".to_string(), "100".to_string())].into_iter().collect();
        let mut tool = TextureTool::default();
        tool.configure(&ToolOptions::resolve(OPTIONS, &raw).unwrap())
            .unwrap();
        let item = job(&tool, &color, src.path(), out.path());
        run_tool(&tool, &[item], out.path()).unwrap();

        let header = vtf::read_header(&fs::read(out.path().join("wall.vtf")).unwrap()).unwrap();
        assert!(header.width <= 100 && header.height <= 100);
        assert_eq!((header.width, header.height), (64, 64));
    }

    #[test]
    fn test_rerun_identical() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let color = src.path().join("rock_color_png.png");
        let mut img = RgbaImage::new(20, 12);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgba([(x * 10) as u8, (y * 20) as u8, 7, 255 - x as u8]);
        }
        img.save(&color).unwrap();

        let tool = TextureTool::default();
        let item = job(&tool, &color, src.path(), out.path());
        run_tool(&tool, &[item.clone()], out.path()).unwrap();
        let first = fs::read(out.path().join("rock.vtf")).unwrap();
        run_tool(&tool, &[item], out.path()).unwrap();
        assert_eq!(first, fs::read(out.path().join("rock.vtf")).unwrap());
    }
}
