//! # 四声道转立体声工具
//!
//! 将 `<name>_l/_ls/_r/_rs` 四个单独声道文件混合为一个立体声 WAV。
//!
//! ## 功能
//! - balance: 左 = L + LS，右 = R + RS
//! - downmix: 四个声道叠加后同时送往左右
//! - 音量缩放与削波
//!
//! ## 依赖关系
//! - 使用 `utils/audio.rs`

use super::options::{check_range, OptionKind, OptionSpec, ToolOptions};
use super::{extension_of, stem_of, with_file_name, BatchMode, RunContext, ToolContract, ToolDescriptor, ToolSummary};
use crate::error::{PortError, ReasonCode, Result};
use crate::models::JobItem;
use crate::utils::audio::{self, PcmAudio};

use std::fs;
use std::path::{Path, PathBuf};

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::new("mix_mode", OptionKind::Text, "balance", "balance (L+LS / R+RS) or downmix (all channels on both sides)"),
    OptionSpec::new("volume", OptionKind::Float, "1.0", "Output gain multiplier"),
];

pub static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    id: "quad-stereo",
    name: "Quad to Stereo",
    description: "Mix four single-channel files (_l, _ls, _r, _rs) into stereo WAV",
    extensions: &["mp3", "wav", "ogg", "flac"],
    mode: BatchMode::PerFile,
    options: OPTIONS,
};

/// 除主文件 `_l` 之外需要的声道后缀
const SIBLINGS: [&str; 3] = ["ls", "r", "rs"];

pub fn create() -> Box<dyn ToolContract> {
    Box::new(QuadStereoTool::default())
}

/// 混音方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixMode {
    Balance,
    Downmix,
}

/// 主文件名去掉 `_l` 后的基础名
fn quad_base(path: &Path) -> Option<String> {
    let stem = stem_of(path);
    let split = stem.len().checked_sub(2)?;
    match (stem.get(..split), stem.get(split..)) {
        (Some(base), Some(tail)) if !base.is_empty() && tail.eq_ignore_ascii_case("_l") => {
            Some(base.to_string())
        }
        _ => None,
    }
}

/// 查找同目录、同扩展名的声道文件
fn find_sibling(primary: &Path, base: &str, suffix: &str) -> Option<PathBuf> {
    let dir = primary.parent()?;
    let ext = extension_of(primary)?;
    let wanted = format!("{}_{}", base, suffix).to_lowercase();
    let mut found: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && extension_of(p).as_deref() == Some(ext.as_str())
                && stem_of(p).to_lowercase() == wanted
        })
        .collect();
    found.sort();
    found.into_iter().next()
}

/// 混合四个单声道信号
pub fn mix(l: &[f32], ls: &[f32], r: &[f32], rs: &[f32], mode: MixMode, volume: f32) -> (Vec<f32>, Vec<f32>) {
    let len = l.len().min(ls.len()).min(r.len()).min(rs.len());
    let clip = |v: f32| (v * volume).clamp(-1.0, 1.0);

    (0..len)
        .map(|i| match mode {
            MixMode::Balance => (clip(l[i] + ls[i]), clip(r[i] + rs[i])),
            MixMode::Downmix => {
                let all = clip(l[i] + ls[i] + r[i] + rs[i]);
                (all, all)
            }
        })
        .unzip()
}

/// 四声道转立体声工具
#[derive(Debug, Clone)]
pub struct QuadStereoTool {
    mode: MixMode,
    volume: f32,
}

impl Default for QuadStereoTool {
    fn default() -> Self {
        Self {
            mode: MixMode::Balance,
            volume: 1.0,
        }
    }
}

impl ToolContract for QuadStereoTool {
    fn descriptor(&self) -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn configure(&mut self, options: &ToolOptions) -> Result<()> {
        let mut problems = Vec::new();
        let mode = match options.text("mix_mode").to_lowercase().as_str() {
            "balance" => MixMode::Balance,
            "downmix" => MixMode::Downmix,
            other => {
                problems.push(format!(
                    "option 'mix_mode' must be 'balance' or 'downmix', got '{}'",
                    other
                ));
                MixMode::Balance
            }
        };
        let volume = options.float("volume");
        if volume <= 0.0 {
            problems.push(format!("option 'volume' must be greater than 0, got {}", volume));
        } else if let Some(p) = check_range("volume", volume, 0.0, 10.0) {
            problems.push(p);
        }
        if !problems.is_empty() {
            return Err(PortError::ValidationError { problems });
        }
        self.mode = mode;
        self.volume = volume as f32;
        Ok(())
    }

    fn accepts(&self, path: &Path) -> bool {
        DESCRIPTOR.matches_extension(path) && quad_base(path).is_some()
    }

    fn check_input(&self, path: &Path) -> Option<String> {
        let Some(base) = quad_base(path) else {
            return Some("expected the left channel file named <name>_l".to_string());
        };
        let missing: Vec<String> = SIBLINGS
            .iter()
            .filter(|s| find_sibling(path, &base, s).is_none())
            .map(|s| format!("{}_{}", base, s))
            .collect();
        if missing.is_empty() {
            None
        } else {
            Some(format!("missing channel file(s): {}", missing.join(", ")))
        }
    }

    fn output_name(&self, relative: &Path) -> PathBuf {
        let base = quad_base(relative).unwrap_or_else(|| stem_of(relative));
        with_file_name(relative, &format!("{}_stereo.wav", base))
    }

    fn run(&self, jobs: &[JobItem], ctx: &mut RunContext) -> Result<ToolSummary> {
        let mut summary = ToolSummary::default();

        for (i, job) in jobs.iter().enumerate() {
            ctx.checkpoint()?;
            let base = quad_base(&job.input).ok_or_else(|| {
                PortError::conversion(&job.input, ReasonCode::Malformed, "not a left channel file")
            })?;

            let mut channels = vec![audio::decode_file(&job.input)?];
            for suffix in SIBLINGS {
                let path = find_sibling(&job.input, &base, suffix).ok_or_else(|| {
                    PortError::conversion(
                        &job.input,
                        ReasonCode::MissingCompanion,
                        format!("missing channel file {}_{}", base, suffix),
                    )
                })?;
                channels.push(audio::decode_file(&path)?);
            }

            let rate = channels[0].sample_rate;
            if channels.iter().any(|c| c.sample_rate != rate) {
                return Err(PortError::conversion(
                    &job.input,
                    ReasonCode::Unsupported,
                    "channel files have different sample rates",
                ));
            }
            let frames: Vec<usize> = channels.iter().map(PcmAudio::frames).collect();
            if frames.iter().any(|f| *f != frames[0]) {
                summary.note(format!(
                    "{}: channel lengths differ, truncated to {} frames",
                    job.input.display(),
                    frames.iter().min().copied().unwrap_or(0)
                ));
            }

            let mono: Vec<Vec<f32>> = channels.iter().map(PcmAudio::to_mono).collect();
            let (left, right) = mix(&mono[0], &mono[1], &mono[2], &mono[3], self.mode, self.volume);
            let stereo = PcmAudio::new(rate, vec![left, right]);
            let bytes = audio::encode_wav(&stereo, None)
                .map_err(|reason| PortError::conversion(&job.input, ReasonCode::Unsupported, reason))?;
            ctx.write(&job.output, &bytes)?;

            ctx.report((i + 1) as f64 / jobs.len() as f64);
        }

        Ok(summary)
    }
}
