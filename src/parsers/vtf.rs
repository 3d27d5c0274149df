//! # VTF 纹理写入器
//!
//! 生成未压缩的 VTF 7.2 文件（Source 1 引擎纹理容器）。
//!
//! ## 格式
//! - 80 字节文件头，无低分辨率缩略图
//! - 高分辨率数据：RGBA8888，全不透明时为 RGB888
//! - mipmap 从最小到最大依次存放
//!
//! ## 依赖关系
//! - 被 `tools/texture.rs`, `tools/vmat.rs`, `tools/vmt_gen.rs` 使用
//! - 使用 `image` 生成 mipmap

use image::imageops::{self, FilterType};
use image::RgbaImage;

/// 文件签名
pub const VTF_MAGIC: &[u8; 4] = b"VTF\0";

/// 7.2 文件头长度
pub const HEADER_SIZE: usize = 80;

// ─────────────────────────────────────────────────────────────
// 标志位与格式
// ─────────────────────────────────────────────────────────────

pub const FLAG_NOMIP: u32 = 0x0000_0100;
pub const FLAG_NOLOD: u32 = 0x0000_0200;
pub const FLAG_EIGHTBITALPHA: u32 = 0x0000_2000;

pub const FORMAT_RGBA8888: u32 = 0;
pub const FORMAT_RGB888: u32 = 2;
const FORMAT_NONE: u32 = 0xFFFF_FFFF;

/// 解析出的文件头（用于校验已有 VTF）
#[derive(Debug, Clone, PartialEq)]
pub struct VtfHeader {
    pub version: (u32, u32),
    pub width: u16,
    pub height: u16,
    pub flags: u32,
    pub format: u32,
    pub mip_count: u8,
}

/// 是否带有 VTF 签名
pub fn is_vtf(head: &[u8]) -> bool {
    head.len() >= 4 && &head[..4] == VTF_MAGIC
}

/// 读取文件头
pub fn read_header(bytes: &[u8]) -> Option<VtfHeader> {
    if bytes.len() < 64 || !is_vtf(bytes) {
        return None;
    }
    let u32_at = |o: usize| u32::from_le_bytes([bytes[o], bytes[o + 1], bytes[o + 2], bytes[o + 3]]);
    let u16_at = |o: usize| u16::from_le_bytes([bytes[o], bytes[o + 1]]);
    Some(VtfHeader {
        version: (u32_at(4), u32_at(8)),
        width: u16_at(16),
        height: u16_at(18),
        flags: u32_at(20),
        format: u32_at(52),
        mip_count: bytes[56],
    })
}

/// mipmap 层数
pub fn mip_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// 编码为 VTF
pub fn encode(image: &RgbaImage, mipmaps: bool) -> Result<Vec<u8>, String> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err("image has zero size".to_string());
    }
    if width > u16::MAX as u32 || height > u16::MAX as u32 {
        return Err(format!("image {}x{} exceeds VTF limits", width, height));
    }

    let has_alpha = image.pixels().any(|p| p[3] != 255);
    let format = if has_alpha {
        FORMAT_RGBA8888
    } else {
        FORMAT_RGB888
    };
    let levels = if mipmaps { mip_count(width, height) } else { 1 };

    let mut flags = 0u32;
    if has_alpha {
        flags |= FLAG_EIGHTBITALPHA;
    }
    if !mipmaps {
        flags |= FLAG_NOMIP | FLAG_NOLOD;
    }

    let mut out = Vec::with_capacity(HEADER_SIZE + image.as_raw().len() * 2);
    write_header(&mut out, width, height, flags, format, levels, reflectivity(image));

    // 最小的 mip 在前
    for level in (0..levels).rev() {
        let w = (width >> level).max(1);
        let h = (height >> level).max(1);
        if level == 0 {
            push_pixels(&mut out, image, has_alpha);
        } else {
            let mip = imageops::resize(image, w, h, FilterType::Triangle);
            push_pixels(&mut out, &mip, has_alpha);
        }
    }

    Ok(out)
}

fn write_header(
    out: &mut Vec<u8>,
    width: u32,
    height: u32,
    flags: u32,
    format: u32,
    levels: u32,
    reflectivity: [f32; 3],
) {
    out.extend_from_slice(VTF_MAGIC);
    out.extend_from_slice(&7u32.to_le_bytes());
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(HEADER_SIZE as u32).to_le_bytes());
    out.extend_from_slice(&(width as u16).to_le_bytes());
    out.extend_from_slice(&(height as u16).to_le_bytes());
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // frames
    out.extend_from_slice(&0u16.to_le_bytes()); // first frame
    out.extend_from_slice(&[0u8; 4]);
    for channel in reflectivity {
        out.extend_from_slice(&channel.to_le_bytes());
    }
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&1.0f32.to_le_bytes()); // bumpmap scale
    out.extend_from_slice(&format.to_le_bytes());
    out.push(levels as u8);
    out.extend_from_slice(&FORMAT_NONE.to_le_bytes());
    out.push(0); // low-res width
    out.push(0); // low-res height
    out.extend_from_slice(&1u16.to_le_bytes()); // depth
    out.resize(HEADER_SIZE, 0);
}

fn push_pixels(out: &mut Vec<u8>, image: &RgbaImage, with_alpha: bool) {
    if with_alpha {
        out.extend_from_slice(image.as_raw());
    } else {
        for px in image.pixels() {
            out.extend_from_slice(&px.0[..3]);
        }
    }
}

/// 平均线性反射率
fn reflectivity(image: &RgbaImage) -> [f32; 3] {
    let mut sum = [0f64; 3];
    for px in image.pixels() {
        for (c, s) in sum.iter_mut().enumerate() {
            *s += (px[c] as f64 / 255.0).powf(2.2);
        }
    }
    let n = (image.width() as f64 * image.height() as f64).max(1.0);
    [
        (sum[0] / n) as f32,
        (sum[1] / n) as f32,
        (sum[2] / n) as f32,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_header_layout() {
        let img = RgbaImage::from_pixel(8, 4, Rgba([255, 0, 0, 128]));
        let bytes = encode(&img, true).unwrap();
        let header = read_header(&bytes).unwrap();

        assert_eq!(header.version, (7, 2));
        assert_eq!((header.width, header.height), (8, 4));
        assert_eq!(header.format, FORMAT_RGBA8888);
        assert_eq!(header.mip_count, 4);
        assert_eq!(header.flags & FLAG_EIGHTBITALPHA, FLAG_EIGHTBITALPHA);
        assert_eq!(u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]), 80);
        assert_eq!(&bytes[57..61], &[0xFF; 4]);

        // 8x4 + 4x2 + 2x1 + 1x1 像素
        assert_eq!(bytes.len(), HEADER_SIZE + (32 + 8 + 2 + 1) * 4);
        // 最后 32 个像素是原图
        assert_eq!(&bytes[bytes.len() - 4..], &[255, 0, 0, 128]);
    }

    #[test]
    fn test_opaque_without_mips() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        let bytes = encode(&img, false).unwrap();
        let header = read_header(&bytes).unwrap();
        assert_eq!(header.format, FORMAT_RGB888);
        assert_eq!(header.mip_count, 1);
        assert_eq!(header.flags, FLAG_NOMIP | FLAG_NOLOD);
        assert_eq!(bytes.len(), HEADER_SIZE + 16 * 3);
    }

    #[test]
    fn test_mip_count() {
        assert_eq!(mip_count(1, 1), 1);
        assert_eq!(mip_count(512, 256), 10);
        assert_eq!(mip_count(300, 20), 9);
    }

    #[test]
    fn test_is_vtf() {
        assert!(is_vtf(b"VTF\0rest"));
        assert!(!is_vtf(b"PNG"));
    }
}
