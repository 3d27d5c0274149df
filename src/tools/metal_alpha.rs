//! # 金属透明化工具
//!
//! 按同名金属遮罩（`<name>_metal.*`）的亮度降低图像 alpha。
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
    OptionSpec::new("mask_suffix", OptionKind::Text, "_metal", "Suffix identifying the mask file"),
    OptionSpec::new("factor", OptionKind::Float, "1.0", "Transparency strength (0-1)"),
];

pub static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    id: "metal-alpha",
    name: "Metal Transparency",
    description: "Reduce alpha where a metal mask is bright",
    extensions: &["png", "tga", "bmp", "jpg", "jpeg"],
    mode: BatchMode::PerFile,
    options: OPTIONS,
};

pub fn create() -> Box<dyn ToolContract> {
    Box::new(MetalAlphaTool::default())
}

/// 金属透明化工具
#[derive(Debug, Clone)]
pub struct MetalAlphaTool {
    mask_suffix: String,
    factor: f32,
}

impl Default for MetalAlphaTool {
    fn default() -> Self {
        Self {
            mask_suffix: "_metal".into(),
            factor: 1.0,
        }
    }
}

impl MetalAlphaTool {
    fn is_mask(&self, path: &Path) -> bool {
        has_suffix(path, &self.mask_suffix)
    }

    /// 查找遮罩文件，优先与输入同扩展名
    pub fn find_mask(&self, path: &Path) -> Option<PathBuf> {
        find_companion(path, &self.mask_suffix, DESCRIPTOR.extensions)
    }

    /// 按遮罩修改 alpha，遮罩尺寸不同时先缩放
    pub fn apply(&self, img: &mut RgbaImage, mask: &RgbaImage) {
        let (w, h) = img.dimensions();
        let mask = imaging::resize_to(mask, w, h, FilterType::Lanczos3);
        for (px, m) in img.pixels_mut().zip(mask.pixels()) {
            let value = imaging::luma(m[0], m[1], m[2]) as f32 / 255.0;
            px[3] = (px[3] as f32 * (1.0 - value * self.factor)) as u8;
        }
    }
}

impl ToolContract for MetalAlphaTool {
    fn descriptor(&self) -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn configure(&mut self, options: &ToolOptions) -> Result<()> {
        let factor = options.float("factor");
        let suffix = options.text("mask_suffix").trim();
        let mut problems: Vec<String> = check_range("factor", factor, 0.0, 1.0).into_iter().collect();
        if suffix.is_empty() {
            problems.push("option 'mask_suffix' must not be empty".to_string());
        }
        if !problems.is_empty() {
            return Err(PortError::ValidationError { problems });
        }
        self.mask_suffix = suffix.to_string();
        self.factor = factor as f32;
        Ok(())
    }

    fn accepts(&self, path: &Path) -> bool {
        DESCRIPTOR.matches_extension(path) && !self.is_mask(path)
    }

    fn check_input(&self, path: &Path) -> Option<String> {
        if self.is_mask(path) {
            return Some("is a mask file; pass the image it belongs to".to_string());
        }
        if self.find_mask(path).is_none() {
            return Some(format!("missing mask {}{}.*", stem_of(path), self.mask_suffix));
        }
        imaging::read_dimensions(path).err()
    }

    fn output_name(&self, relative: &Path) -> PathBuf {
        with_file_name(relative, &format!("{}.png", stem_of(relative)))
    }

    fn run(&self, jobs: &[JobItem], ctx: &mut RunContext) -> Result<ToolSummary> {
        for (i, job) in jobs.iter().enumerate() {
            ctx.checkpoint()?;
            let mask_path = self.find_mask(&job.input).ok_or_else(|| {
                PortError::conversion(&job.input, ReasonCode::MissingCompanion, "mask file not found")
            })?;
            let mut img = imaging::load_rgba(&job.input)?;
            let mask = imaging::load_rgba(&mask_path)?;
            if mask.dimensions() != img.dimensions() {
                log::debug!(
                    "{}: resizing mask {:?} -> {:?}",
                    job.input.display(),
                    mask.dimensions(),
                    img.dimensions()
                );
            }
            self.apply(&mut img, &mask);
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

    #[test]
    fn test_apply_factor() {
        let mut tool = MetalAlphaTool::default();
        tool.factor = 0.5;
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([10, 10, 10, 200]));
        let mut mask = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 255]));
        mask.put_pixel(1, 0, Rgba([255, 255, 255, 255]));
        tool.apply(&mut img, &mask);
        assert_eq!(img.get_pixel(0, 0)[3], 200);
        assert_eq!(img.get_pixel(1, 0)[3], 100);
    }

    #[test]
    fn test_mask_lookup_and_validation() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("grate.png");
        let mask = dir.path().join("grate_metal.jpg");
        let lonely = dir.path().join("pipe.png");
        RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255])).save(&base).unwrap();
        image::RgbImage::from_pixel(4, 4, image::Rgb([255, 255, 255]))
            .save(&mask)
            .unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255])).save(&lonely).unwrap();

        let tool = MetalAlphaTool::default();
        assert_eq!(tool.find_mask(&base), Some(mask.clone()));
        assert!(!tool.accepts(&mask));
        assert!(tool.validate(&[base]).is_empty());
        let problems = tool.validate(&[lonely]);
        assert!(problems[0].contains("missing mask pipe_metal"));
    }

    #[test]
    fn test_run_resizes_mask() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let base = src.path().join("fence.png");
        RgbaImage::from_pixel(8, 8, Rgba([50, 50, 50, 255])).save(&base).unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 255]))
            .save(src.path().join("fence_metal.png"))
            .unwrap();

        let tool = MetalAlphaTool::default();
        let item = job(&tool, &base, src.path(), out.path());
        run_tool(&tool, &[item], out.path()).unwrap();

        let result = image::open(out.path().join("fence.png")).unwrap().to_rgba8();
        assert_eq!(result.dimensions(), (8, 8));
        assert!(result.pixels().all(|p| p[3] == 0));
    }
}
