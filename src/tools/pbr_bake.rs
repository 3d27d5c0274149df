//! # 伪 PBR 烘焙工具
//!
//! 将粗糙度贴图（及可选的 AO 贴图）混合进颜色贴图，
//! 为没有 PBR 着色器的 Source 1 模拟材质细节。
//!
//! ## 功能
//! - 粗糙度：反相、对比度（以均值为中心）、整体提亮，再按比例混合
//! - AO：暗部 / 白点偏移后正片叠底，结果整体提亮 1.2 倍
//! - 贴图来源：统一文件，或同目录下的 `<name>_rough.*` / `<name>_ao.*`
//!
//! ## 依赖关系
//! - 使用 `utils/imaging.rs`

use super::options::{check_range, OptionKind, OptionSpec, ToolOptions};
use super::{
    find_companion, has_suffix, stem_of, with_file_name, BatchMode, RunContext, ToolContract,
    ToolDescriptor, ToolSummary,
};
use crate::error::{PortError, ReasonCode, Result};
use crate::models::JobItem;
use crate::utils::imaging;

use image::imageops::FilterType;
use image::RgbaImage;
use std::path::{Path, PathBuf};

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::new("roughness_file", OptionKind::Text, "", "Roughness map used for every input (empty = companion)"),
    OptionSpec::new("roughness_suffix", OptionKind::Text, "_rough", "Suffix of the companion roughness map"),
    OptionSpec::new("ao_file", OptionKind::Text, "", "AO map used for every input (empty = companion, optional)"),
    OptionSpec::new("ao_suffix", OptionKind::Text, "_ao", "Suffix of the companion AO map"),
    OptionSpec::new("blend", OptionKind::Float, "35", "Roughness blend in percent (0-100)"),
    OptionSpec::new("contrast", OptionKind::Int, "200", "Roughness contrast in percent (100-300)"),
    OptionSpec::new("whites", OptionKind::Int, "0", "Roughness brightness offset (-100..100)"),
    OptionSpec::new("dark", OptionKind::Float, "0", "AO dark offset (-50..50)"),
    OptionSpec::new("white_point", OptionKind::Float, "0", "AO white point offset (-50..50)"),
    OptionSpec::new("invert", OptionKind::Bool, "false", "Invert the roughness map"),
];

pub static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    id: "pbr-bake",
    name: "Fake PBR Baker",
    description: "Blend roughness and AO maps into base textures",
    extensions: &["png", "tga", "bmp", "jpg", "jpeg"],
    mode: BatchMode::PerFile,
    options: OPTIONS,
};

pub fn create() -> Box<dyn ToolContract> {
    Box::new(PbrBakeTool::default())
}

/// AO 叠加后的整体提亮
const AO_BRIGHTNESS: f32 = 1.2;

/// 烘焙参数
#[derive(Debug, Clone, PartialEq)]
pub struct BakeSettings {
    /// 0..=1
    pub blend: f32,
    /// 1.0 = 不变
    pub contrast: f32,
    pub whites: f32,
    pub dark: f32,
    pub white_point: f32,
    pub invert: bool,
}

impl Default for BakeSettings {
    fn default() -> Self {
        Self {
            blend: 0.35,
            contrast: 2.0,
            whites: 0.0,
            dark: 0.0,
            white_point: 0.0,
            invert: false,
        }
    }
}

fn clamp8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// 灰度化后的单通道数据
fn gray(img: &RgbaImage) -> Vec<u8> {
    img.pixels()
        .map(|p| imaging::luma(p[0], p[1], p[2]))
        .collect()
}

/// 粗糙度调整：反相 -> 对比度 -> 提亮
pub fn adjust_roughness(values: &mut [u8], settings: &BakeSettings) {
    if settings.invert {
        values.iter_mut().for_each(|v| *v = 255 - *v);
    }
    if settings.contrast != 1.0 && !values.is_empty() {
        let sum: u64 = values.iter().map(|&v| v as u64).sum();
        let mean = (sum as f32 / values.len() as f32 + 0.5).floor();
        for v in values.iter_mut() {
            *v = clamp8(mean + (*v as f32 - mean) * settings.contrast);
        }
    }
    if settings.whites != 0.0 {
        for v in values.iter_mut() {
            *v = clamp8(*v as f32 + settings.whites);
        }
    }
}

/// 烘焙到 `base`；`rough`、`ao` 须与 `base` 同尺寸
pub fn bake_pbr(base: &mut RgbaImage, rough: &RgbaImage, ao: Option<&RgbaImage>, settings: &BakeSettings) {
    let mut rough = gray(rough);
    adjust_roughness(&mut rough, settings);

    let ao = ao.map(|img| {
        gray(img)
            .into_iter()
            .map(|v| clamp8(clamp8(v as f32 + settings.dark) as f32 + settings.white_point))
            .collect::<Vec<u8>>()
    });

    for (i, px) in base.pixels_mut().enumerate() {
        let r = rough[i] as f32;
        for c in 0..3 {
            let mut value = px[c] as f32 + (r - px[c] as f32) * settings.blend;
            if let Some(ao) = &ao {
                value = value * ao[i] as f32 / 255.0 * AO_BRIGHTNESS;
            }
            px[c] = clamp8(value);
        }
        px[3] = 255;
    }
}

/// 贴图来源：统一文件或按后缀查找
#[derive(Debug, Clone, PartialEq)]
enum MapSource {
    Shared(PathBuf),
    Companion(String),
}

impl MapSource {
    fn from_options(options: &ToolOptions, file_key: &str, suffix_key: &str, problems: &mut Vec<String>) -> Self {
        let file = options.text(file_key).trim();
        if file.is_empty() {
            let suffix = options.text(suffix_key).trim();
            if suffix.is_empty() {
                problems.push(format!("option '{}' must not be empty without '{}'", suffix_key, file_key));
            }
            return MapSource::Companion(suffix.to_string());
        }
        if let Err(e) = imaging::read_dimensions(Path::new(file)) {
            problems.push(format!("option '{}': {}: {}", file_key, file, e));
        }
        MapSource::Shared(PathBuf::from(file))
    }

    fn find(&self, path: &Path) -> Option<PathBuf> {
        match self {
            MapSource::Shared(p) => Some(p.clone()),
            MapSource::Companion(suffix) => find_companion(path, suffix, DESCRIPTOR.extensions),
        }
    }

    fn owns(&self, path: &Path) -> bool {
        match self {
            MapSource::Shared(p) => p == path,
            MapSource::Companion(suffix) => has_suffix(path, suffix),
        }
    }

    fn describe(&self, path: &Path) -> String {
        match self {
            MapSource::Shared(p) => p.display().to_string(),
            MapSource::Companion(suffix) => format!("{}{}.*", stem_of(path), suffix),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PbrBakeTool {
    roughness: MapSource,
    ao: MapSource,
    settings: BakeSettings,
}

impl Default for PbrBakeTool {
    fn default() -> Self {
        Self {
            roughness: MapSource::Companion("_rough".into()),
            ao: MapSource::Companion("_ao".into()),
            settings: BakeSettings::default(),
        }
    }
}

impl PbrBakeTool {
    fn load_resized(path: &Path, w: u32, h: u32) -> Result<RgbaImage> {
        Ok(imaging::resize_to(&imaging::load_rgba(path)?, w, h, FilterType::Lanczos3))
    }
}

impl ToolContract for PbrBakeTool {
    fn descriptor(&self) -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn configure(&mut self, options: &ToolOptions) -> Result<()> {
        let blend = options.float("blend");
        let contrast = options.int("contrast");
        let whites = options.int("whites");
        let dark = options.float("dark");
        let white_point = options.float("white_point");

        let mut problems: Vec<String> = [
            check_range("blend", blend, 0.0, 100.0),
            check_range("contrast", contrast as f64, 100.0, 300.0),
            check_range("whites", whites as f64, -100.0, 100.0),
            check_range("dark", dark, -50.0, 50.0),
            check_range("white_point", white_point, -50.0, 50.0),
        ]
        .into_iter()
        .flatten()
        .collect();
        let roughness = MapSource::from_options(options, "roughness_file", "roughness_suffix", &mut problems);
        let ao = MapSource::from_options(options, "ao_file", "ao_suffix", &mut problems);
        if !problems.is_empty() {
            return Err(PortError::ValidationError { problems });
        }

        self.roughness = roughness;
        self.ao = ao;
        self.settings = BakeSettings {
            blend: blend as f32 / 100.0,
            contrast: contrast as f32 / 100.0,
            whites: whites as f32,
            dark: dark as f32,
            white_point: white_point as f32,
            invert: options.bool("invert"),
        };
        Ok(())
    }

    fn accepts(&self, path: &Path) -> bool {
        DESCRIPTOR.matches_extension(path) && !self.roughness.owns(path) && !self.ao.owns(path)
    }

    fn check_input(&self, path: &Path) -> Option<String> {
        if self.roughness.owns(path) || self.ao.owns(path) {
            return Some("is a roughness or AO map; pass the texture it belongs to".to_string());
        }
        if self.roughness.find(path).is_none() {
            return Some(format!("missing roughness map {}", self.roughness.describe(path)));
        }
        imaging::read_dimensions(path).err()
    }

    fn output_name(&self, relative: &Path) -> PathBuf {
        with_file_name(relative, &format!("baked_{}.png", stem_of(relative)))
    }

    fn run(&self, jobs: &[JobItem], ctx: &mut RunContext) -> Result<ToolSummary> {
        let mut summary = ToolSummary::default();

        for (i, job) in jobs.iter().enumerate() {
            ctx.checkpoint()?;
            let rough_path = self.roughness.find(&job.input).ok_or_else(|| {
                PortError::conversion(&job.input, ReasonCode::MissingCompanion, "roughness map not found")
            })?;
            let mut img = imaging::load_rgba(&job.input)?;
            let (w, h) = img.dimensions();
            let rough = Self::load_resized(&rough_path, w, h)?;
            let ao = match self.ao.find(&job.input) {
                Some(path) => Some(Self::load_resized(&path, w, h)?),
                None => {
                    summary.note(format!("{}: no AO map, roughness only", job.input.display()));
                    None
                }
            };

            bake_pbr(&mut img, &rough, ao.as_ref(), &self.settings);
            ctx.write(&job.output, &imaging::encode(&img, &job.output)?)?;
            log::debug!("{} -> {}", job.input.display(), job.output.display());
            ctx.report((i + 1) as f64 / jobs.len() as f64);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::{job, run_tool};
    use image::Rgba;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn settings(blend: f32, contrast: f32) -> BakeSettings {
        BakeSettings {
            blend,
            contrast,
            ..Default::default()
        }
    }

    #[test]
    fn test_adjust_roughness() {
        let mut values = vec![0, 100];
        adjust_roughness(&mut values, &settings(0.0, 2.0));
        assert_eq!(values, vec![0, 150]);

        let mut inverted = vec![0, 255];
        adjust_roughness(
            &mut inverted,
            &BakeSettings {
                invert: true,
                contrast: 1.0,
                whites: 10.0,
                ..Default::default()
            },
        );
        assert_eq!(inverted, vec![255, 10]);
    }

    #[test]
    fn test_bake_blend_and_ao() {
        let rough = RgbaImage::from_pixel(1, 1, Rgba([50, 50, 50, 255]));
        let mut plain = RgbaImage::from_pixel(1, 1, Rgba([100, 100, 100, 40]));
        bake_pbr(&mut plain, &rough, None, &settings(0.5, 2.0));
        assert_eq!(*plain.get_pixel(0, 0), Rgba([75, 75, 75, 255]));

        let ao = RgbaImage::from_pixel(1, 1, Rgba([128, 128, 128, 255]));
        let mut shaded = RgbaImage::from_pixel(1, 1, Rgba([100, 100, 100, 255]));
        bake_pbr(&mut shaded, &rough, Some(&ao), &settings(0.5, 1.0));
        // 75 * 128 / 255 * 1.2 = 45.2
        assert_eq!(*shaded.get_pixel(0, 0), Rgba([45, 45, 45, 255]));
    }

    #[test]
    fn test_invalid_ranges() {
        let raw: BTreeMap<String, String> = [("contrast", "50"), ("blend", "120")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        match PbrBakeTool::default().configure(&ToolOptions::resolve(OPTIONS, &raw).unwrap()) {
            Err(PortError::ValidationError { problems }) => assert_eq!(problems.len(), 2),
            other => panic!("unexpected result: {:?}", other.is_ok()),
        }
    }

    #[test]
    fn test_requires_roughness() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("rock.png");
        RgbaImage::from_pixel(2, 2, Rgba([1, 1, 1, 255])).save(&base).unwrap();

        let tool = PbrBakeTool::default();
        assert!(tool.validate(&[base.clone()])[0].contains("missing roughness map rock_rough"));

        let rough = dir.path().join("rock_rough.png");
        RgbaImage::from_pixel(2, 2, Rgba([1, 1, 1, 255])).save(&rough).unwrap();
        assert!(tool.validate(&[base]).is_empty());
        assert!(!tool.accepts(&rough));
        assert!(!tool.accepts(&dir.path().join("rock_ao.png")));
    }

    #[test]
    fn test_run_without_ao() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let base = src.path().join("metal.png");
        RgbaImage::from_pixel(4, 4, Rgba([200, 0, 0, 255])).save(&base).unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]))
            .save(src.path().join("metal_rough.png"))
            .unwrap();

        let tool = PbrBakeTool::default();
        let item = job(&tool, &base, src.path(), out.path());
        let (summary, _) = run_tool(&tool, &[item], out.path()).unwrap();
        assert_eq!(summary.notes.len(), 1);

        let result = image::open(out.path().join("baked_metal.png")).unwrap().to_rgba8();
        // 200 + (0 - 200) * 0.35
        assert_eq!(*result.get_pixel(2, 2), Rgba([130, 0, 0, 255]));
    }
}
