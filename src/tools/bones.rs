//! # 骨骼名称回移工具
//!
//! 将 QC/QCI/SMD 中的 Source 2 骨骼名替换为 Source 1 ValveBiped 命名。
//!
//! ## 功能
//! - 内置 Source 2 -> ValveBiped 映射表
//! - 映射文件 (`src = dst`，`#` 注释) 与内联映射 (`a=b;c=d`) 依次覆盖
//! - 只替换完整标识符，长名称优先，单遍替换
//! - 整批处理：同一模型的 QC 与 SMD 必须一起改写
//!
//! ## 依赖关系
//! - 使用 `parsers/smd.rs`
//! - 使用 `regex`

use super::options::{OptionKind, OptionSpec, ToolOptions};
use super::{extension_of, read_text, BatchMode, RunContext, ToolContract, ToolDescriptor, ToolSummary};
use crate::error::{PortError, ReasonCode, Result};
use crate::models::JobItem;
use crate::parsers::smd;

use regex::Regex;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::new("mapping_file", OptionKind::Text, "", "Extra mapping file with 'src = dst' lines"),
    OptionSpec::new("mapping", OptionKind::Text, "", "Inline mapping as src=dst;src2=dst2"),
];

pub static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    id: "bones",
    name: "Bone Backport",
    description: "Rename Source 2 bones to ValveBiped names in QC and SMD files",
    extensions: &["qc", "qci", "smd"],
    mode: BatchMode::Atomic,
    options: OPTIONS,
};

pub fn create() -> Box<dyn ToolContract> {
    Box::new(BonesTool::default())
}

/// 内置映射表
pub const BONE_MAPPING: &[(&str, &str)] = &[
    ("pelvis", "ValveBiped.Bip01_Pelvis"),
    ("spine_0", "ValveBiped.Bip01_Spine"),
    ("spine_1", "ValveBiped.Bip01_Spine1"),
    ("spine_2", "ValveBiped.Bip01_Spine2"),
    ("spine_3", "ValveBiped.Bip01_Spine4"),
    ("neck_0", "ValveBiped.Bip01_Neck1"),
    ("head", "ValveBiped.Bip01_Head1"),
    // 左臂
    ("clavicle_L", "ValveBiped.Bip01_L_Clavicle"),
    ("arm_upper_L", "ValveBiped.Bip01_L_UpperArm"),
    ("arm_lower_L", "ValveBiped.Bip01_L_Forearm"),
    ("hand_L", "ValveBiped.Bip01_L_Hand"),
    ("finger_thumb_0_L", "ValveBiped.Bip01_L_Finger0"),
    ("finger_thumb_1_L", "ValveBiped.Bip01_L_Finger01"),
    ("finger_thumb_2_L", "ValveBiped.Bip01_L_Finger02"),
    ("finger_index_meta_L", "ValveBiped.Bip01_L_Finger1"),
    ("finger_index_0_L", "ValveBiped.Bip01_L_Finger11"),
    ("finger_index_1_L", "ValveBiped.Bip01_L_Finger12"),
    ("finger_middle_meta_L", "ValveBiped.Bip01_L_Finger2"),
    ("finger_middle_0_L", "ValveBiped.Bip01_L_Finger21"),
    ("finger_middle_1_L", "ValveBiped.Bip01_L_Finger22"),
    ("finger_ring_meta_L", "ValveBiped.Bip01_L_Finger3"),
    ("finger_ring_0_L", "ValveBiped.Bip01_L_Finger31"),
    ("finger_ring_1_L", "ValveBiped.Bip01_L_Finger32"),
    ("finger_pinky_meta_L", "ValveBiped.Bip01_L_Finger4"),
    ("finger_pinky_0_L", "ValveBiped.Bip01_L_Finger41"),
    ("finger_pinky_1_L", "ValveBiped.Bip01_L_Finger42"),
    // 右臂
    ("clavicle_R", "ValveBiped.Bip01_R_Clavicle"),
    ("arm_upper_R", "ValveBiped.Bip01_R_UpperArm"),
    ("arm_lower_R", "ValveBiped.Bip01_R_Forearm"),
    ("hand_R", "ValveBiped.Bip01_R_Hand"),
    ("finger_thumb_0_R", "ValveBiped.Bip01_R_Finger0"),
    ("finger_thumb_1_R", "ValveBiped.Bip01_R_Finger01"),
    ("finger_thumb_2_R", "ValveBiped.Bip01_R_Finger02"),
    ("finger_index_meta_R", "ValveBiped.Bip01_R_Finger1"),
    ("finger_index_0_R", "ValveBiped.Bip01_R_Finger11"),
    ("finger_index_1_R", "ValveBiped.Bip01_R_Finger12"),
    ("finger_middle_meta_R", "ValveBiped.Bip01_R_Finger2"),
    ("finger_middle_0_R", "ValveBiped.Bip01_R_Finger21"),
    ("finger_middle_1_R", "ValveBiped.Bip01_R_Finger22"),
    ("finger_ring_meta_R", "ValveBiped.Bip01_R_Finger3"),
    ("finger_ring_0_R", "ValveBiped.Bip01_R_Finger31"),
    ("finger_ring_1_R", "ValveBiped.Bip01_R_Finger32"),
    ("finger_pinky_meta_R", "ValveBiped.Bip01_R_Finger4"),
    ("finger_pinky_0_R", "ValveBiped.Bip01_R_Finger41"),
    ("finger_pinky_1_R", "ValveBiped.Bip01_R_Finger42"),
    // 腿
    ("leg_upper_L", "ValveBiped.Bip01_L_Thigh"),
    ("leg_lower_L", "ValveBiped.Bip01_L_Calf"),
    ("ankle_L", "ValveBiped.Bip01_L_Foot"),
    ("ball_L", "ValveBiped.Bip01_L_Toe0"),
    ("leg_upper_R", "ValveBiped.Bip01_R_Thigh"),
    ("leg_lower_R", "ValveBiped.Bip01_R_Calf"),
    ("ankle_R", "ValveBiped.Bip01_R_Foot"),
    ("ball_R", "ValveBiped.Bip01_R_Toe0"),
];

/// 解析映射文本，`sep` 为条目分隔符
fn parse_mapping(text: &str, sep: char) -> std::result::Result<Vec<(String, String)>, String> {
    text.split(sep)
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(s, d)| (s.trim().to_string(), d.trim().to_string()))
                .filter(|(s, d)| !s.is_empty() && !d.is_empty())
                .ok_or_else(|| format!("invalid mapping entry '{}'", entry))
        })
        .collect()
}

/// 骨骼重命名器
#[derive(Debug, Clone)]
pub struct BoneRenamer {
    mapping: BTreeMap<String, String>,
    pattern: Option<Regex>,
}

impl BoneRenamer {
    pub fn new(mapping: BTreeMap<String, String>) -> Result<Self> {
        let mut names: Vec<&String> = mapping.keys().collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let pattern = if names.is_empty() {
            None
        } else {
            let alternation = names
                .iter()
                .map(|n| regex::escape(n))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&format!(r"\b(?:{})\b", alternation))?)
        };
        Ok(Self { mapping, pattern })
    }

    /// 内置映射
    pub fn builtin() -> Result<Self> {
        Self::new(
            BONE_MAPPING
                .iter()
                .map(|(s, d)| (s.to_string(), d.to_string()))
                .collect(),
        )
    }

    pub fn is_mapped(&self, name: &str) -> bool {
        self.mapping.contains_key(name)
    }

    /// 单遍替换，返回新文本与替换次数
    pub fn rename<'t>(&self, text: &'t str) -> (Cow<'t, str>, usize) {
        let Some(pattern) = &self.pattern else {
            return (Cow::Borrowed(text), 0);
        };
        let mut count = 0usize;
        let out = pattern.replace_all(text, |caps: &regex::Captures| {
            count += 1;
            self.mapping
                .get(&caps[0])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        });
        (out, count)
    }
}

/// 骨骼回移工具
#[derive(Debug, Clone)]
pub struct BonesTool {
    renamer: Option<BoneRenamer>,
}

impl Default for BonesTool {
    fn default() -> Self {
        Self {
            renamer: BoneRenamer::builtin().ok(),
        }
    }
}

impl BonesTool {
    fn renamer(&self) -> Result<&BoneRenamer> {
        self.renamer
            .as_ref()
            .ok_or_else(|| PortError::Other("bone mapping is not configured".to_string()))
    }
}

impl ToolContract for BonesTool {
    fn descriptor(&self) -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn configure(&mut self, options: &ToolOptions) -> Result<()> {
        let mut mapping: BTreeMap<String, String> = BONE_MAPPING
            .iter()
            .map(|(s, d)| (s.to_string(), d.to_string()))
            .collect();
        let mut problems = Vec::new();

        let file = options.text("mapping_file").trim();
        if !file.is_empty() {
            match fs::read_to_string(file) {
                Ok(text) => match parse_mapping(&text, '\n') {
                    Ok(entries) => mapping.extend(entries),
                    Err(e) => problems.push(format!("mapping file {}: {}", file, e)),
                },
                Err(e) => problems.push(format!("mapping file {}: {}", file, e)),
            }
        }
        match parse_mapping(options.text("mapping"), ';') {
            Ok(entries) => mapping.extend(entries),
            Err(e) => problems.push(format!("option 'mapping': {}", e)),
        }

        if !problems.is_empty() {
            return Err(PortError::ValidationError { problems });
        }
        self.renamer = Some(BoneRenamer::new(mapping)?);
        Ok(())
    }

    fn check_input(&self, path: &Path) -> Option<String> {
        let text = match read_text(path) {
            Ok(text) => text,
            Err(e) => return Some(e.to_string()),
        };
        if extension_of(path).as_deref() == Some("smd") {
            return smd::check_header(&text).err();
        }
        None
    }

    fn output_name(&self, relative: &Path) -> PathBuf {
        relative.to_path_buf()
    }

    fn run(&self, jobs: &[JobItem], ctx: &mut RunContext) -> Result<ToolSummary> {
        let renamer = self.renamer()?;
        let mut summary = ToolSummary::default();

        for (i, job) in jobs.iter().enumerate() {
            ctx.checkpoint()?;
            let text = read_text(&job.input)?;
            let is_smd = extension_of(&job.input).as_deref() == Some("smd");
            if is_smd {
                smd::check_header(&text).map_err(|reason| {
                    PortError::conversion(&job.input, ReasonCode::Malformed, reason)
                })?;
            }

            let (renamed, count) = renamer.rename(&text);
            ctx.write(&job.output, renamed.as_bytes())?;

            if is_smd {
                let unmapped: Vec<String> = smd::node_names(&text)
                    .into_iter()
                    .map(|(_, name)| name)
                    .filter(|name| !renamer.is_mapped(name) && !name.starts_with("ValveBiped."))
                    .collect();
                if !unmapped.is_empty() {
                    summary.note(format!(
                        "{}: {} bone(s) left unmapped: {}",
                        job.input.display(),
                        unmapped.len(),
                        unmapped.join(", ")
                    ));
                }
            }
            log::info!("{}: {} bone reference(s) renamed", job.input.display(), count);
            ctx.report((i + 1) as f64 / jobs.len() as f64);
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::{job, run_tool};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_whole_token_rename() {
        let renamer = BoneRenamer::builtin().unwrap();
        let (out, count) = renamer.rename("arm_upper_L arm_upper_L_TWIST hand_L,head\n");
        assert_eq!(
            out,
            "ValveBiped.Bip01_L_UpperArm arm_upper_L_TWIST ValveBiped.Bip01_L_Hand,ValveBiped.Bip01_Head1\n"
        );
        assert_eq!(count, 3);
    }

    #[test]
    fn test_single_pass() {
        let mut mapping = BTreeMap::new();
        mapping.insert("a".to_string(), "b".to_string());
        mapping.insert("b".to_string(), "c".to_string());
        let renamer = BoneRenamer::new(mapping).unwrap();
        assert_eq!(renamer.rename("a b").0, "b c");
    }

    #[test]
    fn test_inline_mapping_overrides_builtin() {
        let raw: BTreeMap<String, String> =
            [("mapping".to_string(), "head=Head_Custom; jaw=Jaw1".to_string())]
                .into_iter()
                .collect();
        let mut tool = BonesTool::default();
        tool.configure(&ToolOptions::resolve(OPTIONS, &raw).unwrap())
            .unwrap();
        let (out, _) = tool.renamer().unwrap().rename("head jaw pelvis");
        assert_eq!(out, "Head_Custom Jaw1 ValveBiped.Bip01_Pelvis");
    }

    #[test]
    fn test_bad_mapping_rejected() {
        let raw: BTreeMap<String, String> =
            [("mapping".to_string(), "nonsense".to_string())].into_iter().collect();
        let mut tool = BonesTool::default();
        assert!(tool
            .configure(&ToolOptions::resolve(OPTIONS, &raw).unwrap())
            .is_err());
    }

    #[test]
    fn test_run_rewrites_model() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let qc = src.path().join("hero.qc");
        fs::write(&qc, "$attachment \"eyes\" \"head\" 0 0 0\n").unwrap();
        let smd_path = src.path().join("hero.smd");
        fs::write(
            &smd_path,
            "version 1\nnodes\n0 \"pelvis\" -1\n1 \"tail_0\" 0\nend\nskeleton\nend\n",
        )
        .unwrap();

        let tool = BonesTool::default();
        let inputs = vec![qc.clone(), smd_path.clone()];
        assert!(tool.validate(&inputs).is_empty());

        let jobs: Vec<_> = inputs
            .iter()
            .map(|p| job(&tool, p, src.path(), out.path()))
            .collect();
        let (summary, _) = run_tool(&tool, &jobs, out.path()).unwrap();

        assert_eq!(
            fs::read_to_string(out.path().join("hero.qc")).unwrap(),
            "$attachment \"eyes\" \"ValveBiped.Bip01_Head1\" 0 0 0\n"
        );
        let smd_out = fs::read_to_string(out.path().join("hero.smd")).unwrap();
        assert!(smd_out.contains("0 \"ValveBiped.Bip01_Pelvis\" -1"));
        assert_eq!(summary.notes.len(), 1);
        assert!(summary.notes[0].contains("tail_0"));
    }
}
