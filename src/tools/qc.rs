//! # QC 生成工具
//!
//! 为 SMD 模型生成静态道具的 StudioMDL QC 脚本。
//!
//! ## 功能
//! - `$modelname` / `$body` / `$sequence` 指向同名 SMD
//! - 按名称推断 `$surfaceprop`
//! - 可选追加 `$collisionmodel` 块
//!
//! ## 依赖关系
//! - 使用 `parsers/smd.rs` 检查文件头
//! - 使用 `utils/surface.rs`

use super::options::{OptionKind, OptionSpec, ToolOptions};
use super::{
    read_text, stem_of, with_file_name, BatchMode, RunContext, ToolContract, ToolDescriptor,
    ToolSummary,
};
use crate::error::{PortError, ReasonCode, Result};
use crate::models::JobItem;
use crate::parsers::smd;
use crate::utils::surface::resolve_surfaceprop;

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::new("model_prefix", OptionKind::Text, "props", "Folder prepended to $modelname"),
    OptionSpec::new("materials_path", OptionKind::Text, "models/props", "Value of $cdmaterials"),
    OptionSpec::new("surfaceprop", OptionKind::Text, "default", "Surface property (default = infer from name)"),
    OptionSpec::new("fps", OptionKind::Int, "30", "Frame rate of the idle sequence"),
    OptionSpec::new("collision", OptionKind::Bool, "false", "Append a concave $collisionmodel block"),
];

pub static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    id: "qc",
    name: "QC Generation",
    description: "Generate static-prop QC scripts for SMD meshes",
    extensions: &["smd"],
    mode: BatchMode::PerFile,
    options: OPTIONS,
};

pub fn create() -> Box<dyn ToolContract> {
    Box::new(QcTool::default())
}

/// QC 生成工具
#[derive(Debug, Clone)]
pub struct QcTool {
    model_prefix: String,
    materials_path: String,
    surfaceprop: String,
    fps: u32,
    collision: bool,
}

impl Default for QcTool {
    fn default() -> Self {
        Self {
            model_prefix: "props".into(),
            materials_path: "models/props".into(),
            surfaceprop: "default".into(),
            fps: 30,
            collision: false,
        }
    }
}

impl QcTool {
    /// 生成 QC 文本
    pub fn render(&self, base: &str) -> String {
        let prefix = self.model_prefix.trim_matches('/');
        let modelname = if prefix.is_empty() {
            format!("{}.mdl", base)
        } else {
            format!("{}/{}.mdl", prefix, base)
        };
        let surface = resolve_surfaceprop(&self.surfaceprop, base);
        let materials = self.materials_path.trim_end_matches('/');

        let mut qc = String::new();
        let _ = writeln!(qc, "$modelname \"{}\"", modelname);
        let _ = writeln!(qc, "$body {} \"{}.smd\"", base, base);
        qc.push('\n');
        qc.push_str("$staticprop\n");
        qc.push_str("$contents \"solid\"\n");
        let _ = writeln!(qc, "$surfaceprop \"{}\"", surface);
        qc.push_str("$illumposition 0 0 0\n\n");
        let _ = writeln!(qc, "$cdmaterials \"{}/\"", materials);
        qc.push('\n');
        let _ = writeln!(qc, "$sequence {} \"{}.smd\" fps {}", base, base, self.fps);
        qc.push('\n');

        if self.collision {
            let _ = writeln!(qc, "$collisionmodel \"{}.smd\"", base);
            qc.push_str("{\n");
            qc.push_str("    $concave\n");
            qc.push_str("    $automass\n");
            qc.push_str("    $inertia 1\n");
            qc.push_str("    $damping 0\n");
            qc.push_str("    $rotdamping 0\n");
            qc.push_str("}\n");
        }
        qc
    }
}

impl ToolContract for QcTool {
    fn descriptor(&self) -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn configure(&mut self, options: &ToolOptions) -> Result<()> {
        let fps = options.int("fps");
        if fps <= 0 || fps > 1000 {
            return Err(PortError::ValidationError {
                problems: vec![format!("option 'fps' must be between 1 and 1000, got {}", fps)],
            });
        }
        self.model_prefix = options.text("model_prefix").to_string();
        self.materials_path = options.text("materials_path").to_string();
        self.surfaceprop = options.text("surfaceprop").to_string();
        self.fps = fps as u32;
        self.collision = options.bool("collision");
        Ok(())
    }

    fn check_input(&self, path: &Path) -> Option<String> {
        match read_text(path) {
            Ok(text) => smd::check_header(&text).err(),
            Err(e) => Some(e.to_string()),
        }
    }

    fn output_name(&self, relative: &Path) -> PathBuf {
        with_file_name(relative, &format!("{}.qc", stem_of(relative)))
    }

    fn run(&self, jobs: &[JobItem], ctx: &mut RunContext) -> Result<ToolSummary> {
        for (i, job) in jobs.iter().enumerate() {
            ctx.checkpoint()?;
            let text = read_text(&job.input)?;
            smd::check_header(&text)
                .map_err(|reason| PortError::conversion(&job.input, ReasonCode::Malformed, reason))?;

            let base = stem_of(&job.input);
            ctx.write(&job.output, self.render(&base).as_bytes())?;
            log::debug!("{} -> {}", job.input.display(), job.output.display());
            ctx.report((i + 1) as f64 / jobs.len() as f64);
        }
        Ok(ToolSummary::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::{job, run_tool};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::fs;

    #[test]
    fn test_render_with_collision() {
        let raw: BTreeMap<String, String> = [("collision", "true"), ("fps", "24")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut tool = QcTool::default();
        tool.configure(&ToolOptions::resolve(OPTIONS, &raw).unwrap())
            .unwrap();

        let expected = r#"$modelname "props/wood_crate.mdl"
$body wood_crate "wood_crate.smd"

$staticprop
$contents "solid"
$surfaceprop "wood"
$illumposition 0 0 0

$cdmaterials "models/props/"

$sequence wood_crate "wood_crate.smd" fps 24

$collisionmodel "wood_crate.smd"
{
    $concave
    $automass
    $inertia 1
    $damping 0
    $rotdamping 0
}
"#;
        assert_eq!(tool.render("wood_crate"), expected);
    }

    #[test]
    fn test_rejects_zero_fps() {
        let raw: BTreeMap<String, String> =
            [("fps".to_string(), "0".to_string())].into_iter().collect();
        let mut tool = QcTool::default();
        assert!(tool
            .configure(&ToolOptions::resolve(OPTIONS, &raw).unwrap())
            .is_err());
    }

    #[test]
    fn test_validate_and_run() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let good = src.path().join("barrel.smd");
        fs::write(&good, "version 1\nnodes\n0 \"root\" -1\nend\n").unwrap();
        let bad = src.path().join("broken.smd");
        fs::write(&bad, "garbage\n").unwrap();

        let tool = QcTool::default();
        assert!(tool.validate(&[good.clone()]).is_empty());
        assert_eq!(tool.validate(&[bad]).len(), 1);
        assert_eq!(tool.validate(&[]), vec!["no input files".to_string()]);

        let item = job(&tool, &good, src.path(), out.path());
        let (_, progress) = run_tool(&tool, &[item], out.path()).unwrap();
        let qc = fs::read_to_string(out.path().join("barrel.qc")).unwrap();
        assert!(qc.starts_with("$modelname \"props/barrel.mdl\""));
        assert_eq!(progress.last().copied(), Some(1.0));
    }
}
