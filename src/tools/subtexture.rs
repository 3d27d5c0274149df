//! # 子纹理提取工具
//!
//! 按 JSON 区域定义从纹理图集中裁剪出多个子图。
//!
//! ## 输入格式
//! ```json
//! { "image_path": "atlas.png",
//!   "regions": [{ "name": "button", "x": 0, "y": 0, "w": 64, "h": 32 }] }
//! ```
//!
//! ## 功能
//! - 相对 `image_path` 以 JSON 所在目录为基准
//! - 区域裁剪到图像范围内，空区域跳过并记录
//! - 输出目录 `<stem>/`，每个区域一个 `<name>.<format>`
//!
//! ## 依赖关系
//! - 使用 `utils/imaging.rs`, `serde_json`

use super::options::{OptionKind, OptionSpec, ToolOptions};
use super::{read_text, stem_of, with_file_name, BatchMode, RunContext, ToolContract, ToolDescriptor, ToolSummary};
use crate::error::{PortError, ReasonCode, Result};
use crate::models::JobItem;
use crate::utils::imaging;

use image::imageops;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const OPTIONS: &[OptionSpec] = &[OptionSpec::new(
    "format",
    OptionKind::Text,
    "png",
    "Output image format: png or tga",
)];

pub static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    id: "subtexture",
    name: "Subtexture Extraction",
    description: "Cut named regions out of a texture atlas",
    extensions: &["json"],
    mode: BatchMode::PerFile,
    options: OPTIONS,
};

pub fn create() -> Box<dyn ToolContract> {
    Box::new(SubtextureTool::default())
}

/// 区域定义
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Region {
    pub name: String,
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

impl Region {
    /// 裁剪到图像范围，返回 (x, y, w, h)；无交集时为 None
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.clamp(0, width as i64);
        let y0 = self.y.clamp(0, height as i64);
        let x1 = (self.x.saturating_add(self.w)).clamp(0, width as i64);
        let y1 = (self.y.saturating_add(self.h)).clamp(0, height as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

/// 区域定义文件
#[derive(Debug, Clone, Deserialize)]
pub struct RegionFile {
    pub image_path: String,
    #[serde(default)]
    pub regions: Vec<Region>,
}

impl RegionFile {
    /// 解析并检查区域名
    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let file: RegionFile = serde_json::from_str(text).map_err(|e| e.to_string())?;
        let mut seen = BTreeSet::new();
        for region in &file.regions {
            let name = region.name.trim();
            if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
                return Err(format!("invalid region name '{}'", region.name));
            }
            if !seen.insert(name.to_lowercase()) {
                return Err(format!("duplicate region name '{}'", name));
            }
        }
        Ok(file)
    }

    /// 图像路径，相对路径以 JSON 所在目录为基准
    pub fn image_for(&self, json_path: &Path) -> PathBuf {
        let image = PathBuf::from(&self.image_path);
        if image.is_absolute() {
            image
        } else {
            json_path
                .parent()
                .map(|dir| dir.join(&image))
                .unwrap_or(image)
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubtextureTool {
    format: &'static str,
}

impl Default for SubtextureTool {
    fn default() -> Self {
        Self { format: "png" }
    }
}

impl SubtextureTool {
    fn load(&self, path: &Path) -> Result<RegionFile> {
        RegionFile::parse(&read_text(path)?)
            .map_err(|reason| PortError::conversion(path, ReasonCode::Malformed, reason))
    }
}

impl ToolContract for SubtextureTool {
    fn descriptor(&self) -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn configure(&mut self, options: &ToolOptions) -> Result<()> {
        self.format = match options.text("format").to_lowercase().as_str() {
            "png" => "png",
            "tga" => "tga",
            other => {
                return Err(PortError::ValidationError {
                    problems: vec![format!("option 'format' must be png or tga, got '{}'", other)],
                })
            }
        };
        Ok(())
    }

    fn check_input(&self, path: &Path) -> Option<String> {
        let file = match self.load(path) {
            Ok(file) => file,
            Err(e) => return Some(e.to_string()),
        };
        let image = file.image_for(path);
        imaging::read_dimensions(&image)
            .err()
            .map(|e| format!("image {}: {}", image.display(), e))
    }

    fn output_name(&self, relative: &Path) -> PathBuf {
        with_file_name(relative, &stem_of(relative))
    }

    fn run(&self, jobs: &[JobItem], ctx: &mut RunContext) -> Result<ToolSummary> {
        let mut summary = ToolSummary::default();

        for (i, job) in jobs.iter().enumerate() {
            ctx.checkpoint()?;
            let file = self.load(&job.input)?;
            let atlas = imaging::load_rgba(&file.image_for(&job.input))?;
            let (width, height) = atlas.dimensions();

            let mut written = 0usize;
            for region in &file.regions {
                let Some((x, y, w, h)) = region.clamp_to(width, height) else {
                    summary.note(format!(
                        "{}: region '{}' lies outside the image, skipped",
                        job.input.display(),
                        region.name
                    ));
                    continue;
                };
                let tile = imageops::crop_imm(&atlas, x, y, w, h).to_image();
                let out = job
                    .output
                    .join(format!("{}.{}", region.name.trim(), self.format));
                ctx.write(&out, &imaging::encode(&tile, &out)?)?;
                written += 1;
            }

            if written == 0 {
                return Err(PortError::conversion(
                    &job.input,
                    ReasonCode::Malformed,
                    "no extractable region",
                ));
            }
            log::info!("{}: extracted {} region(s)", job.input.display(), written);
            ctx.report((i + 1) as f64 / jobs.len() as f64);
        }

        Ok(summary)
    }
}
