//! # AO 烘焙工具
//!
//! 将环境光遮蔽贴图按强度正片叠底进颜色贴图。
//!
//! ## 功能
//! - AO 来源：统一的 `ao_file`，或每张图同目录下的 `<name>_ao.*`
//! - AO 尺寸不同时先缩放到颜色贴图尺寸
//! - 保留原 alpha，输出 `baked_<name>.png`
//!
//! ## 依赖关系
//! - 使用 `utils/imaging.rs`

use super::options::{OptionKind, OptionSpec, ToolOptions};
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
    OptionSpec::new("ao_file", OptionKind::Text, "", "AO map applied to every input (empty = per-image companion)"),
    OptionSpec::new("ao_suffix", OptionKind::Text, "_ao", "Suffix of the companion AO map"),
    OptionSpec::new("strength", OptionKind::Int, "50", "AO strength in percent (0-100)"),
];

pub static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    id: "ao-bake",
    name: "AO Baker",
    description: "Bake ambient occlusion maps into base textures",
    extensions: &["png", "tga", "bmp", "jpg", "jpeg"],
    mode: BatchMode::PerFile,
    options: OPTIONS,
};

pub fn create() -> Box<dyn ToolContract> {
    Box::new(AoBakeTool::default())
}

/// 按强度将 AO 乘入颜色，`ao` 须与 `base` 同尺寸
pub fn bake_ao(base: &mut RgbaImage, ao: &RgbaImage, strength: f32) {
    for (px, o) in base.pixels_mut().zip(ao.pixels()) {
        let occlusion = imaging::luma(o[0], o[1], o[2]) as f32 / 255.0;
        let factor = 1.0 - (1.0 - occlusion) * strength;
        for c in 0..3 {
            px[c] = (px[c] as f32 * factor) as u8;
        }
    }
}

#[derive(Debug, Clone)]
pub struct AoBakeTool {
    ao_file: Option<PathBuf>,
    ao_suffix: String,
    strength: f32,
}

impl Default for AoBakeTool {
    fn default() -> Self {
        Self {
            ao_file: None,
            ao_suffix: "_ao".into(),
            strength: 0.5,
        }
    }
}

impl AoBakeTool {
    fn is_ao_map(&self, path: &Path) -> bool {
        has_suffix(path, &self.ao_suffix) || self.ao_file.as_deref() == Some(path)
    }

    /// 该输入使用的 AO 贴图
    pub fn find_ao(&self, path: &Path) -> Option<PathBuf> {
        match &self.ao_file {
            Some(shared) => Some(shared.clone()),
            None => find_companion(path, &self.ao_suffix, DESCRIPTOR.extensions),
        }
    }
}

impl ToolContract for AoBakeTool {
    fn descriptor(&self) -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn configure(&mut self, options: &ToolOptions) -> Result<()> {
        let mut problems = Vec::new();

        let strength = options.int("strength");
        if !(0..=100).contains(&strength) {
            problems.push(format!("option 'strength' must be between 0 and 100, got {}", strength));
        }
        let ao_file = options.text("ao_file").trim();
        let ao_file = if ao_file.is_empty() {
            None
        } else {
            let path = PathBuf::from(ao_file);
            if let Err(e) = imaging::read_dimensions(&path) {
                problems.push(format!("option 'ao_file': {}: {}", ao_file, e));
            }
            Some(path)
        };
        let suffix = options.text("ao_suffix").trim();
        if ao_file.is_none() && suffix.is_empty() {
            problems.push("option 'ao_suffix' must not be empty without 'ao_file'".to_string());
        }
        if !problems.is_empty() {
            return Err(PortError::ValidationError { problems });
        }

        self.ao_file = ao_file;
        self.ao_suffix = suffix.to_string();
        self.strength = strength as f32 / 100.0;
        Ok(())
    }

    fn accepts(&self, path: &Path) -> bool {
        DESCRIPTOR.matches_extension(path) && !self.is_ao_map(path)
    }

    fn check_input(&self, path: &Path) -> Option<String> {
        if self.is_ao_map(path) {
            return Some("is an AO map; pass the texture it belongs to".to_string());
        }
        if self.find_ao(path).is_none() {
            return Some(format!("missing AO map {}{}.*", stem_of(path), self.ao_suffix));
        }
        imaging::read_dimensions(path).err()
    }

    fn output_name(&self, relative: &Path) -> PathBuf {
        with_file_name(relative, &format!("baked_{}.png", stem_of(relative)))
    }

    fn run(&self, jobs: &[JobItem], ctx: &mut RunContext) -> Result<ToolSummary> {
        let shared = self.ao_file.as_deref().map(imaging::load_rgba).transpose()?;

        for (i, job) in jobs.iter().enumerate() {
            ctx.checkpoint()?;
            let mut img = imaging::load_rgba(&job.input)?;
            let (w, h) = img.dimensions();

            let own;
            let ao = match &shared {
                Some(ao) => ao,
                None => {
                    let path = self.find_ao(&job.input).ok_or_else(|| {
                        PortError::conversion(&job.input, ReasonCode::MissingCompanion, "AO map not found")
                    })?;
                    own = imaging::load_rgba(&path)?;
                    &own
                }
            };
            let ao = imaging::resize_to(ao, w, h, FilterType::Lanczos3);

            bake_ao(&mut img, &ao, self.strength);
            ctx.write(&job.output, &imaging::encode(&img, &job.output)?)?;
            ctx.report((i + 1) as f64 / jobs.len() as f64);
        }
        Ok(ToolSummary::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::{job, run_tool};
    use image::Rgba;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn configured(pairs: &[(&str, &str)]) -> AoBakeTool {
        let raw: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut tool = AoBakeTool::default();
        tool.configure(&ToolOptions::resolve(OPTIONS, &raw).unwrap())
            .unwrap();
        tool
    }

    #[test]
    fn test_bake_strength() {
        let mut base = RgbaImage::from_pixel(2, 1, Rgba([200, 100, 50, 128]));
        let mut ao = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 255]));
        ao.put_pixel(1, 0, Rgba([255, 255, 255, 255]));

        bake_ao(&mut base, &ao, 0.5);
        assert_eq!(*base.get_pixel(0, 0), Rgba([100, 50, 25, 128]));
        assert_eq!(*base.get_pixel(1, 0), Rgba([200, 100, 50, 128]));
    }

    #[test]
    fn test_strength_out_of_range() {
        let raw: BTreeMap<String, String> =
            [("strength".to_string(), "150".to_string())].into_iter().collect();
        let err = AoBakeTool::default()
            .configure(&ToolOptions::resolve(OPTIONS, &raw).unwrap())
            .unwrap_err();
        assert!(matches!(err, PortError::ValidationError { .. }));
    }

    #[test]
    fn test_companion_lookup_and_validation() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("crate.png");
        let ao = dir.path().join("crate_ao.tga");
        let lonely = dir.path().join("barrel.png");
        for p in [&base, &ao, &lonely] {
            RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255])).save(p).unwrap();
        }

        let tool = AoBakeTool::default();
        assert_eq!(tool.find_ao(&base), Some(ao.clone()));
        assert!(!tool.accepts(&ao));
        assert!(tool.validate(&[base]).is_empty());
        let problems = tool.validate(&[lonely]);
        assert!(problems[0].contains("missing AO map barrel_ao"));
    }

    #[test]
    fn test_run_with_shared_ao() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let base = src.path().join("wall.png");
        RgbaImage::from_pixel(8, 8, Rgba([120, 120, 120, 255])).save(&base).unwrap();
        let shared = src.path().join("shadow.png");
        RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255])).save(&shared).unwrap();

        let tool = configured(&[("ao_file", shared.to_str().unwrap()), ("strength", "100")]);
        assert!(!tool.accepts(&shared));
        assert!(tool.validate(&[base.clone()]).is_empty());
        let item = job(&tool, &base, src.path(), out.path());
        assert_eq!(item.output, out.path().join("baked_wall.png"));
        run_tool(&tool, &[item], out.path()).unwrap();

        let result = image::open(out.path().join("baked_wall.png")).unwrap().to_rgba8();
        assert_eq!(result.dimensions(), (8, 8));
        assert!(result.pixels().all(|p| p[0] == 0 && p[3] == 255));
    }
}
