//! # 亮度转 alpha 工具
//!
//! 按像素亮度阈值生成二值 alpha。

use super::options::{check_range, OptionKind, OptionSpec, ToolOptions};
use super::{stem_of, with_file_name, BatchMode, RunContext, ToolContract, ToolDescriptor, ToolSummary};
use crate::error::{PortError, Result};
use crate::models::JobItem;
use crate::utils::imaging;

use image::RgbaImage;
use std::path::{Path, PathBuf};

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::new("threshold", OptionKind::Int, "200", "Brightness threshold (0-255)"),
    OptionSpec::new("invert", OptionKind::Bool, "false", "Make bright pixels transparent instead"),
];

pub static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    id: "brightness-alpha",
    name: "Brightness to Alpha",
    description: "Derive a binary alpha channel from pixel brightness",
    extensions: &["png", "tga", "bmp", "jpg", "jpeg"],
    mode: BatchMode::PerFile,
    options: OPTIONS,
};

pub fn create() -> Box<dyn ToolContract> {
    Box::new(BrightnessAlphaTool::default())
}

#[derive(Debug, Clone)]
pub struct BrightnessAlphaTool {
    threshold: u8,
    invert: bool,
}

impl Default for BrightnessAlphaTool {
    fn default() -> Self {
        Self {
            threshold: 200,
            invert: false,
        }
    }
}

impl BrightnessAlphaTool {
    pub fn apply(&self, img: &mut RgbaImage) {
        let (threshold, invert) = (self.threshold, self.invert);
        imaging::par_pixels(img, |px| {
            let bright = imaging::luma(px[0], px[1], px[2]) >= threshold;
            px[3] = if bright != invert { 255 } else { 0 };
        });
    }
}

impl ToolContract for BrightnessAlphaTool {
    fn descriptor(&self) -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn configure(&mut self, options: &ToolOptions) -> Result<()> {
        let threshold = options.int("threshold");
        if let Some(problem) = check_range("threshold", threshold as f64, 0.0, 255.0) {
            return Err(PortError::ValidationError {
                problems: vec![problem],
            });
        }
        self.threshold = threshold as u8;
        self.invert = options.bool("invert");
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
