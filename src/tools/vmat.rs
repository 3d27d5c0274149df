//! # VMAT 转 VMT 工具
//!
//! 解析 Source 2 VMAT 材质，生成 Source 1 VMT，并可同时转换其引用的贴图。
//!
//! ## 功能
//! - `.vfx` 着色器名映射到 Source 1 着色器
//! - 按文件名在 VMAT 所在目录（及其子目录）查找引用的贴图
//! - 可选将 AO / 粗糙度烘焙进颜色贴图
//! - 金属度反相后写入法线贴图 alpha（`$normalmapalphaenvmapmask`）
//!
//! ## 依赖关系
//! - 使用 `parsers/keyvalues.rs`, `parsers/vtf.rs`, `models/material.rs`
//! - 使用 `utils/imaging.rs`, `utils/surface.rs`

use super::options::{check_range, OptionKind, OptionSpec, ToolOptions};
use super::{stem_of, with_file_name, BatchMode, RunContext, ToolContract, ToolDescriptor, ToolSummary};
use crate::error::{PortError, ReasonCode, Result};
use crate::models::material::{canonical_shader, Vmt};
use crate::models::JobItem;
use crate::parsers::keyvalues::{find_str, parse_keyvalues_file, KvPair, KvValue};
use crate::parsers::vtf;
use crate::utils::imaging;
use crate::utils::surface::resolve_surfaceprop;

use image::imageops::FilterType;
use image::{Rgba, RgbaImage};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::new("material_prefix", OptionKind::Text, "", "Material folder used in $basetexture"),
    OptionSpec::new("clamp", OptionKind::Int, "0", "Maximum texture side in pixels (0 = no limit)"),
    OptionSpec::new("convert_textures", OptionKind::Bool, "true", "Convert referenced textures to VTF"),
    OptionSpec::new("bake_ao", OptionKind::Float, "0", "Ambient occlusion multiplied into the color map (0-1)"),
    OptionSpec::new("bake_roughness", OptionKind::Float, "0", "Inverted roughness blended into the color map (0-1)"),
    OptionSpec::new("surfaceprop", OptionKind::Text, "default", "Surface property (default = infer from name)"),
];

pub static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    id: "vmat",
    name: "VMAT to VMT",
    description: "Convert Source 2 VMAT materials to Source 1 VMT",
    extensions: &["vmat"],
    mode: BatchMode::PerFile,
    options: OPTIONS,
};

pub fn create() -> Box<dyn ToolContract> {
    Box::new(VmatTool::default())
}

/// VMAT 中的贴图槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TextureSlot {
    Color,
    Normal,
    Metalness,
    Roughness,
    AmbientOcclusion,
}

impl TextureSlot {
    const ALL: [TextureSlot; 5] = [
        TextureSlot::Color,
        TextureSlot::Normal,
        TextureSlot::Metalness,
        TextureSlot::Roughness,
        TextureSlot::AmbientOcclusion,
    ];

    /// 对应的 VMAT 键（新旧两种写法）
    fn keys(self) -> &'static [&'static str] {
        match self {
            TextureSlot::Color => &["TextureColor", "g_tColor"],
            TextureSlot::Normal => &["TextureNormal", "g_tNormal"],
            TextureSlot::Metalness => &["TextureMetalness", "g_tMetalness"],
            TextureSlot::Roughness => &["TextureRoughness", "g_tRoughness"],
            TextureSlot::AmbientOcclusion => &["TextureAmbientOcclusion", "g_tAmbientOcclusion"],
        }
    }
}

/// 解析后的 VMAT 材质
#[derive(Debug, Clone, PartialEq)]
pub struct VmatMaterial {
    pub shader: &'static str,
    pub translucent: bool,
    /// 槽位 -> 原始贴图引用
    pub textures: BTreeMap<TextureSlot, String>,
}

/// `.vfx` 着色器名映射
pub fn map_shader(vfx: &str) -> (&'static str, bool) {
    let lower = vfx.to_lowercase();
    if lower.contains("unlit") {
        ("UnlitGeneric", false)
    } else if lower.contains("glass") {
        ("VertexLitGeneric", true)
    } else {
        ("VertexLitGeneric", false)
    }
}

/// 从 KeyValues 中提取材质信息
pub fn read_material(pairs: &[KvPair]) -> VmatMaterial {
    let root = pairs.iter().find(|p| matches!(p.value, KvValue::Block(_)));
    let body = root.map(KvPair::children).unwrap_or(pairs);

    let (mut shader, translucent) = find_str(body, "shader")
        .map(map_shader)
        .unwrap_or(("VertexLitGeneric", false));
    if let Some(named) = root.and_then(|r| canonical_shader(&r.key)) {
        shader = named;
    }

    let textures = TextureSlot::ALL
        .iter()
        .filter_map(|slot| {
            slot.keys()
                .iter()
                .find_map(|key| find_str(body, key))
                .filter(|v| !v.trim().is_empty())
                .map(|v| (*slot, v.trim().to_string()))
        })
        .collect();

    VmatMaterial {
        shader,
        translucent,
        textures,
    }
}

fn is_image_ext(ext: &str) -> bool {
    matches!(ext, "png" | "tga" | "jpg" | "jpeg" | "bmp")
}

/// 按文件名查找贴图：先查 VMAT 所在目录，再递归查子目录
pub fn resolve_texture(dir: &Path, reference: &str) -> Option<PathBuf> {
    let name = reference.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() {
        return None;
    }
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
        .to_lowercase();
    let lower = name.to_lowercase();

    let matches = |path: &Path| -> Option<u8> {
        let file = path.file_name()?.to_str()?.to_lowercase();
        if file == lower {
            return Some(0);
        }
        let ext = super::extension_of(path)?;
        (is_image_ext(&ext) && stem_of(path).to_lowercase() == stem).then_some(1)
    };

    let mut best: Option<(usize, u8, PathBuf)> = None;
    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        if let Some(rank) = matches(entry.path()) {
            let key = (entry.depth(), rank);
            if best.as_ref().map(|(d, r, _)| key < (*d, *r)).unwrap_or(true) {
                best = Some((key.0, key.1, entry.path().to_path_buf()));
            }
        }
    }
    best.map(|(_, _, path)| path)
}

/// VMAT 转换工具
#[derive(Debug, Clone)]
pub struct VmatTool {
    material_prefix: String,
    clamp: u32,
    convert_textures: bool,
    bake_ao: f64,
    bake_roughness: f64,
    surfaceprop: String,
}

impl Default for VmatTool {
    fn default() -> Self {
        Self {
            material_prefix: String::new(),
            clamp: 0,
            convert_textures: true,
            bake_ao: 0.0,
            bake_roughness: 0.0,
            surfaceprop: "default".into(),
        }
    }
}

impl VmatTool {
    fn texture_path(&self, name: &str) -> String {
        let prefix = self.material_prefix.trim_matches('/');
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        }
    }

    /// 生成材质
    pub fn build_vmt(&self, material: &VmatMaterial, name: &str, has_normal: bool, has_metal: bool) -> Vmt {
        let texture = self.texture_path(name);
        let mut vmt = Vmt::new(material.shader);
        vmt.set("$basetexture", texture.clone());
        if has_normal || has_metal {
            vmt.set("$bumpmap", format!("{}_normal", texture));
        }
        if has_metal {
            vmt.set("$normalmapalphaenvmapmask", "1");
        }
        vmt.set("$envmap", "env_cubemap");
        vmt.set("$envmaptint", "[0.5 0.5 0.5]");
        if material.translucent {
            vmt.set("$translucent", "1");
        }
        vmt.set("$surfaceprop", resolve_surfaceprop(&self.surfaceprop, name));
        if vmt.is_model_shader() {
            vmt.set("$model", "1");
        }
        vmt
    }

    /// 颜色贴图，按选项烘焙 AO 与粗糙度
    fn bake_color(&self, color: &Path, ao: Option<&PathBuf>, rough: Option<&PathBuf>) -> Result<RgbaImage> {
        let mut base = imaging::load_rgba(color)?;
        let (w, h) = base.dimensions();

        if let (Some(path), true) = (rough, self.bake_roughness > 0.0) {
            let rough = imaging::resize_to(&imaging::load_rgba(path)?, w, h, FilterType::Lanczos3);
            let s = self.bake_roughness as f32;
            for (px, r) in base.pixels_mut().zip(rough.pixels()) {
                let gloss = 255.0 - imaging::luma(r[0], r[1], r[2]) as f32;
                for c in 0..3 {
                    px[c] = (px[c] as f32 * (1.0 - s) + gloss * s).round() as u8;
                }
            }
        }

        if let (Some(path), true) = (ao, self.bake_ao > 0.0) {
            let ao = imaging::resize_to(&imaging::load_rgba(path)?, w, h, FilterType::Lanczos3);
            let s = self.bake_ao as f32;
            for (px, o) in base.pixels_mut().zip(ao.pixels()) {
                let occlusion = imaging::luma(o[0], o[1], o[2]) as f32 / 255.0;
                let factor = 1.0 - s + s * occlusion;
                for c in 0..3 {
                    px[c] = (px[c] as f32 * factor).round() as u8;
                }
            }
        }
        Ok(base)
    }

    /// 法线贴图，金属度反相写入 alpha
    fn build_normal(&self, normal: Option<&PathBuf>, metal: Option<&PathBuf>) -> Result<Option<RgbaImage>> {
        let metal = metal.map(|p| imaging::load_rgba(p)).transpose()?;
        let mut img = match (normal, &metal) {
            (Some(path), _) => imaging::load_rgba(path)?,
            (None, Some(m)) => RgbaImage::from_pixel(m.width(), m.height(), Rgba([128, 128, 255, 255])),
            (None, None) => return Ok(None),
        };
        if let Some(m) = metal {
            let (w, h) = img.dimensions();
            let m = imaging::resize_to(&m, w, h, FilterType::Lanczos3);
            for (px, mp) in img.pixels_mut().zip(m.pixels()) {
                px[3] = 255 - imaging::luma(mp[0], mp[1], mp[2]);
            }
        }
        Ok(Some(img))
    }

    fn encode(&self, img: RgbaImage, source: &Path) -> Result<Vec<u8>> {
        let img = imaging::resize_pow2(imaging::clamp_size(img, self.clamp), self.clamp);
        vtf::encode(&img, true)
            .map_err(|reason| PortError::conversion(source, ReasonCode::Unsupported, reason))
    }
}

impl ToolContract for VmatTool {
    fn descriptor(&self) -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn configure(&mut self, options: &ToolOptions) -> Result<()> {
        let clamp = options.int("clamp");
        let bake_ao = options.float("bake_ao");
        let bake_roughness = options.float("bake_roughness");

        let problems: Vec<String> = [
            check_range("bake_ao", bake_ao, 0.0, 1.0),
            check_range("bake_roughness", bake_roughness, 0.0, 1.0),
            check_range("clamp", clamp as f64, 0.0, 65535.0),
        ]
        .into_iter()
        .flatten()
        .collect();
        if !problems.is_empty() {
            return Err(PortError::ValidationError { problems });
        }

        self.material_prefix = options.text("material_prefix").to_string();
        self.clamp = clamp as u32;
        self.convert_textures = options.bool("convert_textures");
        self.bake_ao = bake_ao;
        self.bake_roughness = bake_roughness;
        self.surfaceprop = options.text("surfaceprop").to_string();
        Ok(())
    }

    fn check_input(&self, path: &Path) -> Option<String> {
        parse_keyvalues_file(path).err().map(|e| e.to_string())
    }

    fn output_name(&self, relative: &Path) -> PathBuf {
        with_file_name(relative, &format!("{}.vmt", stem_of(relative)))
    }

    fn run(&self, jobs: &[JobItem], ctx: &mut RunContext) -> Result<ToolSummary> {
        let mut summary = ToolSummary::default();

        for (i, job) in jobs.iter().enumerate() {
            ctx.checkpoint()?;
            let material = read_material(&parse_keyvalues_file(&job.input)?);
            let name = stem_of(&job.output);
            let dir = job.input.parent().unwrap_or_else(|| Path::new("."));

            let resolved: BTreeMap<TextureSlot, PathBuf> = material
                .textures
                .iter()
                .filter_map(|(slot, reference)| {
                    let found = resolve_texture(dir, reference);
                    if found.is_none() {
                        log::debug!("{}: texture '{}' not found", job.input.display(), reference);
                    }
                    found.map(|p| (*slot, p))
                })
                .collect();

            let (has_normal, has_metal) = if self.convert_textures {
                let color = resolved.get(&TextureSlot::Color).ok_or_else(|| {
                    let reference = material
                        .textures
                        .get(&TextureSlot::Color)
                        .map(String::as_str)
                        .unwrap_or("<none>");
                    PortError::conversion(
                        &job.input,
                        ReasonCode::MissingCompanion,
                        format!("color texture '{}' not found", reference),
                    )
                })?;

                let base = self.bake_color(
                    color,
                    resolved.get(&TextureSlot::AmbientOcclusion),
                    resolved.get(&TextureSlot::Roughness),
                )?;
                ctx.write(&job.output.with_extension("vtf"), &self.encode(base, color)?)?;

                let metal = resolved.get(&TextureSlot::Metalness);
                let normal = self.build_normal(resolved.get(&TextureSlot::Normal), metal)?;
                if let Some(img) = normal.clone() {
                    let out = job.output.with_file_name(format!("{}_normal.vtf", name));
                    ctx.write(&out, &self.encode(img, &job.input)?)?;
                }
                (normal.is_some(), metal.is_some())
            } else {
                (
                    material.textures.contains_key(&TextureSlot::Normal),
                    material.textures.contains_key(&TextureSlot::Metalness),
                )
            };

            for slot in material.textures.keys().filter(|s| !resolved.contains_key(s)) {
                summary.note(format!("{}: {:?} texture not found", job.input.display(), slot));
            }

            let vmt = self.build_vmt(&material, &name, has_normal, has_metal);
            ctx.write(&job.output, vmt.to_string().as_bytes())?;
            log::debug!("{} -> {}", job.input.display(), job.output.display());
            ctx.report((i + 1) as f64 / jobs.len() as f64);
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::keyvalues::parse_keyvalues;
    use crate::tools::testutil::{job, run_tool};
    use pretty_assertions::assert_eq;
    use std::fs;

    const SAMPLE: &str = r#"// THIS FILE IS AUTO-GENERATED

Layer0
{
	shader "csgo_complex.vfx"

	//---- Color ----
	TextureColor "materials/models/props/crate_color.tga"
	TextureNormal "materials/models/props/crate_normal.tga"
	TextureMetalness "materials/models/props/crate_metal.tga"
	g_flMetalness "0.000"
}
"#;

    #[test]
    fn test_read_material() {
        let material = read_material(&parse_keyvalues(SAMPLE).unwrap());
        assert_eq!(material.shader, "VertexLitGeneric");
        assert!(!material.translucent);
        assert_eq!(
            material.textures.get(&TextureSlot::Color).map(String::as_str),
            Some("materials/models/props/crate_color.tga")
        );
        assert!(material.textures.contains_key(&TextureSlot::Metalness));
        assert!(!material.textures.contains_key(&TextureSlot::Roughness));
    }

    #[test]
    fn test_map_shader() {
        assert_eq!(map_shader("csgo_unlitgeneric.vfx"), ("UnlitGeneric", false));
        assert_eq!(map_shader("csgo_glass.vfx"), ("VertexLitGeneric", true));
        assert_eq!(map_shader("csgo_complex.vfx"), ("VertexLitGeneric", false));
    }

    #[test]
    fn test_build_vmt_with_metal() {
        let material = read_material(&parse_keyvalues(SAMPLE).unwrap());
        let tool = VmatTool::default();
        let vmt = tool.build_vmt(&material, "crate", true, true);
        assert_eq!(
            vmt.to_string(),
            "\"VertexLitGeneric\"\n{\n    \"$basetexture\" \"crate\"\n    \"$bumpmap\" \"crate_normal\"\n    \"$normalmapalphaenvmapmask\" \"1\"\n    \"$envmap\" \"env_cubemap\"\n    \"$envmaptint\" \"[0.5 0.5 0.5]\"\n    \"$surfaceprop\" \"default\"\n    \"$model\" \"1\"\n}\n"
        );
    }

    #[test]
    fn test_build_vmt_plain_keeps_envmap() {
        let material = VmatMaterial {
            shader: "UnlitGeneric",
            translucent: false,
            textures: BTreeMap::new(),
        };
        let tool = VmatTool::default();
        let vmt = tool.build_vmt(&material, "sign", false, false);
        assert_eq!(
            vmt.to_string(),
            "\"UnlitGeneric\"\n{\n    \"$basetexture\" \"sign\"\n    \"$envmap\" \"env_cubemap\"\n    \"$envmaptint\" \"[0.5 0.5 0.5]\"\n    \"$surfaceprop\" \"default\"\n}\n"
        );
    }

    #[test]
    fn test_resolve_texture_prefers_shallow_match() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/crate_color.tga"), b"x").unwrap();
        fs::write(dir.path().join("crate_color.png"), b"x").unwrap();

        let found = resolve_texture(dir.path(), "materials/models/crate_color.tga").unwrap();
        assert_eq!(found, dir.path().join("crate_color.png"));
        assert!(resolve_texture(dir.path(), "materials/missing.tga").is_none());
    }

    #[test]
    fn test_run_converts_textures() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let vmat = src.path().join("crate.vmat");
        fs::write(&vmat, SAMPLE).unwrap();
        RgbaImage::from_pixel(8, 8, Rgba([200, 150, 100, 255]))
            .save(src.path().join("crate_color.png"))
            .unwrap();
        RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255]))
            .save(src.path().join("crate_metal.png"))
            .unwrap();

        let tool = VmatTool::default();
        assert!(tool.validate(&[vmat.clone()]).is_empty());
        let item = job(&tool, &vmat, src.path(), out.path());
        let (summary, _) = run_tool(&tool, &[item], out.path()).unwrap();

        assert!(out.path().join("crate.vtf").is_file());
        let normal = fs::read(out.path().join("crate_normal.vtf")).unwrap();
        assert_eq!(vtf::read_header(&normal).unwrap().format, vtf::FORMAT_RGBA8888);
        let text = fs::read_to_string(out.path().join("crate.vmt")).unwrap();
        assert!(text.contains("$normalmapalphaenvmapmask"));
        assert_eq!(summary.notes.len(), 1);
    }

    #[test]
    fn test_missing_color_fails() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let vmat = src.path().join("crate.vmat");
        fs::write(&vmat, SAMPLE).unwrap();

        let tool = VmatTool::default();
        let item = job(&tool, &vmat, src.path(), out.path());
        let err = run_tool(&tool, &[item], out.path()).unwrap_err();
        assert_eq!(err.reason(), Some(ReasonCode::MissingCompanion));
        assert!(!out.path().join("crate.vmt").exists());
    }
}
