//! # 循环音效转换工具
//!
//! 将循环音效首尾交叉淡化后拼接为两遍，输出带循环点的 16 位 WAV。
//!
//! ## 依赖关系
//! - 使用 `utils/audio.rs`

use super::options::{OptionKind, OptionSpec, ToolOptions};
use super::{stem_of, with_file_name, BatchMode, RunContext, ToolContract, ToolDescriptor, ToolSummary};
use crate::error::{PortError, ReasonCode, Result};
use crate::models::JobItem;
use crate::utils::audio;

use std::path::{Path, PathBuf};

const OPTIONS: &[OptionSpec] = &[
    OptionSpec::new("crossfade_ms", OptionKind::Int, "1000", "Crossfade length in milliseconds"),
    OptionSpec::new("loop_only", OptionKind::Bool, "true", "Only collect files whose name contains '_lp'"),
    OptionSpec::new("cue_point", OptionKind::Bool, "true", "Write a cue chunk marking the loop start"),
];

pub static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    id: "loop-sound",
    name: "Loop Sound Converter",
    description: "Crossfade looping sounds into seamless WAV loops",
    extensions: &["mp3", "wav", "ogg", "flac"],
    mode: BatchMode::PerFile,
    options: OPTIONS,
};

pub fn create() -> Box<dyn ToolContract> {
    Box::new(LoopSoundTool::default())
}

/// 循环音效工具
#[derive(Debug, Clone)]
pub struct LoopSoundTool {
    crossfade_ms: u64,
    loop_only: bool,
    cue_point: bool,
}

impl Default for LoopSoundTool {
    fn default() -> Self {
        Self {
            crossfade_ms: 1000,
            loop_only: true,
            cue_point: true,
        }
    }
}

impl ToolContract for LoopSoundTool {
    fn descriptor(&self) -> &'static ToolDescriptor {
        &DESCRIPTOR
    }

    fn configure(&mut self, options: &ToolOptions) -> Result<()> {
        let crossfade = options.int("crossfade_ms");
        if !(0..=60_000).contains(&crossfade) {
            return Err(PortError::ValidationError {
                problems: vec![format!(
                    "option 'crossfade_ms' must be between 0 and 60000, got {}",
                    crossfade
                )],
            });
        }
        self.crossfade_ms = crossfade as u64;
        self.loop_only = options.bool("loop_only");
        self.cue_point = options.bool("cue_point");
        Ok(())
    }

    fn accepts(&self, path: &Path) -> bool {
        DESCRIPTOR.matches_extension(path)
            && (!self.loop_only || stem_of(path).to_lowercase().contains("_lp"))
    }

    fn output_name(&self, relative: &Path) -> PathBuf {
        with_file_name(relative, &format!("{}.wav", stem_of(relative)))
    }

    fn run(&self, jobs: &[JobItem], ctx: &mut RunContext) -> Result<ToolSummary> {
        let mut summary = ToolSummary::default();

        for (i, job) in jobs.iter().enumerate() {
            ctx.checkpoint()?;
            let clip = audio::decode_file(&job.input)?;
            let requested = clip.ms_to_frames(self.crossfade_ms);
            if requested > clip.frames() {
                summary.note(format!(
                    "{}: crossfade shortened to the clip length ({} frames)",
                    job.input.display(),
                    clip.frames()
                ));
            }

            let (looped, start) = audio::crossfade_loop(&clip, requested);
            let cue = self.cue_point.then_some(start as u32);
            let bytes = audio::encode_wav(&looped, cue)
                .map_err(|reason| PortError::conversion(&job.input, ReasonCode::Unsupported, reason))?;
            ctx.write(&job.output, &bytes)?;

            log::debug!(
                "{}: {} -> {} frames, loop start {}",
                job.input.display(),
                clip.frames(),
                looped.frames(),
                start
            );
            ctx.report((i + 1) as f64 / jobs.len() as f64);
        }

        Ok(summary)
    }
}
