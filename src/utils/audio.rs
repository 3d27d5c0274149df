//! # 音频工具
//!
//! 音频解码（`symphonia`）与 16 位 PCM WAV 编码（`hound`）。
//!
//! ## 功能
//! - 任意受支持格式解码为逐声道 f32 样本
//! - 首尾交叉淡化拼接（循环音效）
//! - WAV 编码，可附加 `cue ` 循环点
//!
//! ## 依赖关系
//! - 被 `tools/loop_sound.rs`, `tools/quad_stereo.rs` 使用

use crate::error::{PortError, ReasonCode, Result};

use std::fs::File;
use std::io::{self, Cursor};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// 逐声道 PCM 音频
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    pub sample_rate: u32,
    /// 每个声道一组样本，长度一致
    pub channels: Vec<Vec<f32>>,
}

impl PcmAudio {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// 帧数
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    /// 混合为单声道
    pub fn to_mono(&self) -> Vec<f32> {
        let n = self.channels.len().max(1) as f32;
        (0..self.frames())
            .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n)
            .collect()
    }

    /// 毫秒转帧数
    pub fn ms_to_frames(&self, ms: u64) -> usize {
        (self.sample_rate as u64 * ms / 1000) as usize
    }
}

// ─────────────────────────────────────────────────────────────
// 解码
// ─────────────────────────────────────────────────────────────

/// 解码音频文件
pub fn decode_file(path: &Path) -> Result<PcmAudio> {
    let file = File::open(path).map_err(|e| PortError::read(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let unreadable = |e: SymphoniaError| PortError::conversion(path, ReasonCode::Unreadable, e.to_string());

    let detected = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(unreadable)?;
    let mut format = detected.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| PortError::conversion(path, ReasonCode::Malformed, "no audio track"))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| PortError::conversion(path, ReasonCode::Unsupported, e.to_string()))?;

    let mut channels: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(unreadable(e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let count = spec.channels.count();
                if count == 0 {
                    continue;
                }
                if channels.is_empty() {
                    channels = vec![Vec::new(); count];
                    sample_rate = spec.rate;
                }
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                for frame in buf.samples().chunks(count) {
                    for (c, sample) in frame.iter().enumerate() {
                        if let Some(channel) = channels.get_mut(c) {
                            channel.push(*sample);
                        }
                    }
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("{}: skipping undecodable packet: {}", path.display(), e);
            }
            Err(e) => return Err(unreadable(e)),
        }
    }

    if channels.is_empty() || channels[0].is_empty() || sample_rate == 0 {
        return Err(PortError::conversion(
            path,
            ReasonCode::Malformed,
            "no audio samples decoded",
        ));
    }

    Ok(PcmAudio::new(sample_rate, channels))
}

// ─────────────────────────────────────────────────────────────
// 处理
// ─────────────────────────────────────────────────────────────

/// 将音频接在自身之后，重叠部分线性交叉淡化。返回结果与第二段起始帧
pub fn crossfade_loop(audio: &PcmAudio, crossfade_frames: usize) -> (PcmAudio, usize) {
    let len = audio.frames();
    let fade = crossfade_frames.min(len);
    let start = len - fade;

    let channels = audio
        .channels
        .iter()
        .map(|ch| {
            let ch = &ch[..len];
            let mut out = Vec::with_capacity(len * 2 - fade);
            out.extend_from_slice(&ch[..start]);
            for i in 0..fade {
                let t = (i as f32 + 0.5) / fade as f32;
                out.push(ch[start + i] * (1.0 - t) + ch[i] * t);
            }
            out.extend_from_slice(&ch[fade..]);
            out
        })
        .collect();

    (PcmAudio::new(audio.sample_rate, channels), start)
}

// ─────────────────────────────────────────────────────────────
// 编码
// ─────────────────────────────────────────────────────────────

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16
}

/// 编码为 16 位 PCM WAV，`cue` 为循环起点帧
pub fn encode_wav(audio: &PcmAudio, cue: Option<u32>) -> std::result::Result<Vec<u8>, String> {
    let count = audio.channels.len();
    if count == 0 || count > u16::MAX as usize {
        return Err(format!("unsupported channel count {}", count));
    }
    let spec = hound::WavSpec {
        channels: count as u16,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(|e| e.to_string())?;
        for i in 0..audio.frames() {
            for channel in &audio.channels {
                writer
                    .write_sample(to_i16(channel[i]))
                    .map_err(|e| e.to_string())?;
            }
        }
        writer.finalize().map_err(|e| e.to_string())?;
    }

    let mut bytes = cursor.into_inner();
    if let Some(frame) = cue {
        append_cue_chunk(&mut bytes, frame);
    }
    Ok(bytes)
}

/// 追加单个 cue 点并修正 RIFF 长度
fn append_cue_chunk(bytes: &mut Vec<u8>, frame: u32) {
    bytes.extend_from_slice(b"cue ");
    bytes.extend_from_slice(&28u32.to_le_bytes());
    bytes.extend_from_slice(&1u32.to_le_bytes()); // cue 点数量
    bytes.extend_from_slice(&1u32.to_le_bytes()); // id
    bytes.extend_from_slice(&frame.to_le_bytes()); // 播放位置
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&0u32.to_le_bytes()); // chunk start
    bytes.extend_from_slice(&0u32.to_le_bytes()); // block start
    bytes.extend_from_slice(&frame.to_le_bytes()); // sample offset

    let riff_size = (bytes.len() - 8) as u32;
    bytes[4..8].copy_from_slice(&riff_size.to_le_bytes());
}

/// 查找 RIFF 子块（测试用）
#[cfg(test)]
pub fn find_chunk<'a>(bytes: &'a [u8], id: &[u8; 4]) -> Option<&'a [u8]> {
    let mut pos = 12usize;
    while pos + 8 <= bytes.len() {
        let size = u32::from_le_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]])
            as usize;
        let body_start = pos + 8;
        let body_end = body_start.checked_add(size)?;
        if &bytes[pos..pos + 4] == id {
            return bytes.get(body_start..body_end);
        }
        pos = body_end + (size & 1);
    }
    None
}
