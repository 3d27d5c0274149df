//! # 颜色透明化工具
//!
//! 将接近指定颜色的像素设为透明，距离越近越透明。
//!
//! ## 依赖关系
//! - 使用 `utils/imaging.rs`

use super::options::{check_range, OptionKind, OptionSpec, ToolOptions};
use super::{stem_of, with_file_name, BatchMode, RunContext, ToolContract, ToolDescriptor, ToolSummary};
use crate::error::{PortError, Result};
use crate::models::JobItem;
use crate::utils::imaging;

use image::RgbaImage;
use std::path::{Path, PathBuf};

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::new("color", OptionKind::Text, "0,0,0", "Target color as r,g,b or #rrggbb"),
    OptionSpec::new("tolerance", OptionKind::Int, "10", "Color tolerance (0-100)"),
    OptionSpec::new("alpha", OptionKind::Int, "0", "Alpha assigned to exact matches (0-255)"),
];

pub static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    id: "color-alpha",
    name: "Color Transparency",
    description: "Make pixels close to a color transparent",
    extensions: &["png", "tga", "bmp", "jpg", "jpeg"],
    mode: BatchMode::PerFile,
    options: OPTIONS,
};

/// 容差 100 对应 RGB 空间最大距离 (255·√3 ≈ 441)
const TOLERANCE_SCALE: f64 = 4.41;

pub fn create() -> Box<dyn ToolContract> {
    Box::new(ColorAlphaTool::default())
}

/// 颜色透明化工具
#[derive(Debug, Clone)]
pub struct ColorAlphaTool {
    color: [u8; 3],
    tolerance: u32,
    alpha: u8,
}

impl Default for ColorAlphaTool {
    fn default() -> Self {
        Self {
            color: [0, 0, 0],
            tolerance: 10,
            alpha: 0,
        }
    }
}

impl ColorAlphaTool {
    /// 处理单个像素的 alpha
    pub fn pixel_alpha(&self, px: &[u8]) -> u8 {
        let d = px[..3]
            .iter()
            .zip(self.color.iter())
            .map(|(a, b)| (*a as f64 - *b as f64).powi(2))
            .sum::<f64>()
            .sqrt();
        let threshold = self.tolerance as f64 * TOLERANCE_SCALE;

        if self.tolerance == 0 {
            return if d == 0.0 { self.alpha } else { px[3] };
        }
        if d > threshold {
            return px[3];
        }
        let target = self.alpha as f64;
        let value = target + (px[3] as f64 - target) * (d / threshold);
        value.clamp(0.0, 255.0) as u8
    }

    pub fn apply(&self, img: &mut RgbaImage) {
        imaging::par_pixels(img, |px| px[3] = self.pixel_alpha(px));
    }
}

impl ToolContract for ColorAlphaTool {
    fn descriptor(&self) -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn configure(&mut self, options: &ToolOptions) -> Result<()> {
        let tolerance = options.int("tolerance");
        let alpha = options.int("alpha");
        let mut problems: Vec<String> = [
            check_range("tolerance", tolerance as f64, 0.0, 100.0),
            check_range("alpha", alpha as f64, 0.0, 255.0),
        ]
        .into_iter()
        .flatten()
        .collect();
        let color = imaging::parse_color(options.text("color")).unwrap_or_else(|e| {
            problems.push(format!("option 'color': {}", e));
            [0, 0, 0]
        });
        if !problems.is_empty() {
            return Err(PortError::ValidationError { problems });
        }

        self.color = color;
        self.tolerance = tolerance as u32;
        self.alpha = alpha as u8;
        Ok(())
    }

    fn check_input(&self, path: &Path) -> Option<String> {
        imaging::read_dimensions(path).err()
    }

    fn output_name(&self, relative: &Path) -> PathBuf {
        with_file_name(relative, &format!("{}.png", stem_of(relative)))
    }

    fn run(&self, jobs: &[JobItem], ctx: &mut RunContext) -> Result<ToolSummary> {
        for (i, job) in jobs.iter().enumerate() {
            ctx.checkpoint()?;
            let mut img = imaging::load_rgba(&job.input)?;
            self.apply(&mut img);
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
    use std::collections::BTreeMap;
    use std::fs;

    fn configured(pairs: &[(&str, &str)]) -> ColorAlphaTool {
        let raw: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut tool = ColorAlphaTool::default();
        tool.configure(&ToolOptions::resolve(OPTIONS, &raw).unwrap())
            .unwrap();
        tool
    }

    #[test]
    fn test_pixel_alpha() {
        let tool = configured(&[("color", "#ff00ff"), ("tolerance", "10")]);
        assert_eq!(tool.pixel_alpha(&[255, 0, 255, 255]), 0);
        assert_eq!(tool.pixel_alpha(&[0, 255, 0, 255]), 255);
        // 距离 22，约为阈值 44.1 的一半
        let half = tool.pixel_alpha(&[255, 0, 255 - 22, 255]);
        assert!((126..=128).contains(&half), "got {}", half);
    }

    #[test]
    fn test_zero_tolerance_exact_only() {
        let tool = configured(&[("tolerance", "0"), ("alpha", "40")]);
        assert_eq!(tool.pixel_alpha(&[0, 0, 0, 255]), 40);
        assert_eq!(tool.pixel_alpha(&[0, 0, 1, 255]), 255);
    }

    #[test]
    fn test_invalid_options() {
        let raw: BTreeMap<String, String> = [("tolerance", "150"), ("color", "blue")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let err = ColorAlphaTool::default()
            .configure(&ToolOptions::resolve(OPTIONS, &raw).unwrap())
            .unwrap_err();
        match err {
            PortError::ValidationError { problems } => assert_eq!(problems.len(), 2),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_non_ascii_color_rejected() {
        let raw: BTreeMap<String, String> =
            [("color".to_string(), "#a\u{e9}bcd".to_string())].into_iter().collect();
        let err = ColorAlphaTool::default()
            .configure(&ToolOptions::resolve(OPTIONS, &raw).unwrap())
            .unwrap_err();
        assert!(matches!(err, PortError::ValidationError { .. }));
    }

    #[test]
    fn test_validate_images() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("sprite.png");
        RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]))
            .save(&good)
            .unwrap();
        let broken = dir.path().join("broken.png");
        fs::write(&broken, b"not an image").unwrap();

        let tool = ColorAlphaTool::default();
        assert!(tool.validate(&[good.clone()]).is_empty());
        assert_eq!(tool.validate(&[good, broken]).len(), 1);
    }

    #[test]
    fn test_run_writes_png() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let input = src.path().join("sprite.tga");
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([200, 200, 200, 255]));
        img.save(&input).unwrap();

        let tool = ColorAlphaTool::default();
        let item = job(&tool, &input, src.path(), out.path());
        assert_eq!(item.output, out.path().join("sprite.png"));
        run_tool(&tool, &[item], out.path()).unwrap();

        let result = image::open(out.path().join("sprite.png")).unwrap().to_rgba8();
        assert_eq!(result.get_pixel(1, 1)[3], 0);
        assert_eq!(result.get_pixel(0, 0)[3], 255);
    }
}
