//! # 图像工具
//!
//! 图像读写与常用变换，封装 `image` crate。
//!
//! ## 功能
//! - 读取为 RGBA8，超出像素上限时拒绝
//! - 限制最大边长、缩放到 2 的幂
//! - 编码为 PNG/TGA 字节（确定性输出）
//! - 基于 rayon 的逐像素并行处理
//!
//! ## 依赖关系
//! - 被图像类工具使用
//! - 使用 `image`, `rayon`

use crate::error::{PortError, ReasonCode, Result};

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbaImage};
use rayon::prelude::*;
use std::io::Cursor;
use std::path::Path;

/// 单张图像的像素上限
pub const MAX_PIXELS: u64 = 50_000_000;

/// 读取图像为 RGBA8
pub fn load_rgba(path: &Path) -> Result<RgbaImage> {
    let (w, h) = image::image_dimensions(path)
        .map_err(|e| PortError::conversion(path, ReasonCode::Unreadable, e.to_string()))?;
    if w as u64 * h as u64 > MAX_PIXELS {
        return Err(PortError::conversion(
            path,
            ReasonCode::Unsupported,
            format!("image is {}x{}, limit is {} pixels", w, h, MAX_PIXELS),
        ));
    }
    let img = image::open(path)
        .map_err(|e| PortError::conversion(path, ReasonCode::Unreadable, e.to_string()))?;
    Ok(img.to_rgba8())
}

/// 读取图像尺寸（校验用）
pub fn read_dimensions(path: &Path) -> std::result::Result<(u32, u32), String> {
    image::image_dimensions(path).map_err(|e| e.to_string())
}

/// 长边超过 `max` 时按比例缩小（`max` 为 0 时不处理）
pub fn clamp_size(img: RgbaImage, max: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    if max == 0 || w.max(h) <= max {
        return img;
    }
    let scale = max as f64 / w.max(h) as f64;
    let nw = ((w as f64 * scale).round() as u32).max(1);
    let nh = ((h as f64 * scale).round() as u32).max(1);
    imageops::resize(&img, nw, nh, FilterType::Lanczos3)
}

/// 最接近的 2 的幂
pub fn nearest_pow2(n: u32) -> u32 {
    if n <= 1 {
        return 1;
    }
    let upper = n.next_power_of_two();
    let lower = upper / 2;
    if n - lower < upper - n {
        lower
    } else {
        upper
    }
}

/// 单边最大像素数（VTF 头以 u16 记录尺寸）
pub const MAX_SIDE: u32 = u16::MAX as u32;

/// 不大于 `n` 的最大 2 的幂
fn floor_pow2(n: u32) -> u32 {
    if n == 0 {
        1
    } else {
        1 << (31 - n.leading_zeros())
    }
}

/// 最接近的 2 的幂，超过 `max` 时向下取（`max` 为 0 时仅受 `MAX_SIDE` 约束）
pub fn pow2_within(n: u32, max: u32) -> u32 {
    let limit = if max == 0 { MAX_SIDE } else { max.min(MAX_SIDE) };
    let p = nearest_pow2(n);
    if p > limit {
        floor_pow2(limit)
    } else {
        p
    }
}

/// 缩放到 2 的幂尺寸，边长不超过 `max`
pub fn resize_pow2(img: RgbaImage, max: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    let (nw, nh) = (pow2_within(w, max), pow2_within(h, max));
    if (nw, nh) == (w, h) {
        return img;
    }
    imageops::resize(&img, nw, nh, FilterType::Lanczos3)
}

/// 按尺寸缩放
pub fn resize_to(img: &RgbaImage, w: u32, h: u32, filter: FilterType) -> RgbaImage {
    if img.dimensions() == (w, h) {
        return img.clone();
    }
    imageops::resize(img, w, h, filter)
}

/// 按输出扩展名编码
pub fn encode(img: &RgbaImage, path: &Path) -> Result<Vec<u8>> {
    let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Png);
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format)
        .map_err(|e| PortError::conversion(path, ReasonCode::WriteFailed, e.to_string()))?;
    Ok(buf.into_inner())
}

/// 逐像素并行处理（每个切片为一个 RGBA 像素）
pub fn par_pixels<F>(img: &mut RgbaImage, f: F)
where
    F: Fn(&mut [u8]) + Sync + Send,
{
    img.par_chunks_mut(4).for_each(|px| f(px));
}

/// 像素亮度 (ITU-R 601)
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}

/// 解析 `r,g,b` 或 `#rrggbb`
pub fn parse_color(s: &str) -> std::result::Result<[u8; 3], String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        if hex.len() == 6 && hex.is_ascii() {
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
            if let (Ok(r), Ok(g), Ok(b)) = (channel(0), channel(2), channel(4)) {
                return Ok([r, g, b]);
            }
        }
        return Err(format!("invalid hex color '{}'", s));
    }

    let parts: Vec<_> = s.split(',').map(|p| p.trim().parse::<u8>()).collect();
    match parts.as_slice() {
        [Ok(r), Ok(g), Ok(b)] => Ok([*r, *g, *b]),
        _ => Err(format!("invalid color '{}', expected r,g,b or #rrggbb", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_clamp_size_keeps_aspect() {
        let img = RgbaImage::from_pixel(400, 200, Rgba([0, 0, 0, 255]));
        let out = clamp_size(img, 100);
        assert_eq!(out.dimensions(), (100, 50));
        let small = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));
        assert_eq!(clamp_size(small, 0).dimensions(), (10, 10));
    }

    #[test]
    fn test_nearest_pow2() {
        assert_eq!(nearest_pow2(1), 1);
        assert_eq!(nearest_pow2(500), 512);
        assert_eq!(nearest_pow2(700), 512);
        assert_eq!(nearest_pow2(800), 1024);
        assert_eq!(nearest_pow2(256), 256);
    }

    #[test]
    fn test_pow2_respects_clamp() {
        assert_eq!(pow2_within(100, 0), 128);
        assert_eq!(pow2_within(100, 100), 64);
        assert_eq!(pow2_within(60000, 65535), 32768);
        assert_eq!(pow2_within(60000, 0), 32768);
        assert_eq!(pow2_within(3, 1), 1);

        let img = RgbaImage::from_pixel(100, 50, Rgba([1, 2, 3, 255]));
        assert_eq!(resize_pow2(img, 100).dimensions(), (64, 64));
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("255, 0, 10"), Ok([255, 0, 10]));
        assert_eq!(parse_color("#FF8000"), Ok([255, 128, 0]));
        assert!(parse_color("300,0,0").is_err());
        assert!(parse_color("#12").is_err());
        // 6 字节但含多字节字符
        assert!(parse_color("#a\u{e9}bcd").is_err());
        assert!(parse_color("#\u{e9}\u{e9}\u{e9}").is_err());
    }

    #[test]
    fn test_luma() {
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 0, 0), 76);
    }
}
