// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Pixel formats for storage images.
//!
//! Each format encodes:
//!
//! - Number of channels (R or RGBA)
//! - Data type per channel (8-bit unorm, 16-bit float, 32-bit float)
//! - Bytes per pixel, which the registry uses to size backing storage
//!
//! Not every backend can use every format as a writable storage image; backends
//! report support through [`crate::imp::Backend::supports_storage_format`] and the
//! registry rejects the rest with [`crate::Error::InvalidResourceSpec`].
//!
//! # Export contract
//!
//! The only format contract exposed to file-writing code is RGBA8: four channels,
//! 8 bits each, produced from float sources by linear scaling into a byte-truncated
//! range.  See [`unorm8_from_f32`] and [`rgba8_from_rgba32f`].
//!
//! ```
//! use dispatch_and_barriers::pixel_formats::{PixelFormat, rgba8_from_rgba32f};
//!
//! assert_eq!(PixelFormat::Rgba32Float.bytes_per_pixel(), 16);
//! let bytes = rgba8_from_rgba32f(&[0.0, 0.5, 1.0, 1.0]);
//! assert_eq!(bytes, vec![0, 127, 255, 255]);
//! ```

pub(crate) mod png_support;

pub use half::f16;
pub use png_support::write_png;

/// Texel layout of a storage image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// 8-bit normalized single channel.
    R8Unorm,
    /// 8-bit normalized RGBA.
    Rgba8Unorm,
    /// Half-precision RGBA.
    Rgba16Float,
    /// Single-precision single channel.
    R32Float,
    /// Single-precision RGBA, the accumulation format used by the progressive demos.
    Rgba32Float,
}

impl PixelFormat {
    /// Number of bytes per pixel for this format.
    pub const fn bytes_per_pixel(self) -> u8 {
        match self {
            PixelFormat::R8Unorm => 1,
            PixelFormat::Rgba8Unorm => 4,
            PixelFormat::Rgba16Float => 8,
            PixelFormat::R32Float => 4,
            PixelFormat::Rgba32Float => 16,
        }
    }

    pub const fn channels(self) -> u8 {
        match self {
            PixelFormat::R8Unorm | PixelFormat::R32Float => 1,
            PixelFormat::Rgba8Unorm | PixelFormat::Rgba16Float | PixelFormat::Rgba32Float => 4,
        }
    }

    /// Decodes one texel into RGBA floats.  Single-channel formats fill green and
    /// blue with zero and alpha with one.
    pub fn decode(self, bytes: &[u8]) -> [f32; 4] {
        let mut out = [0.0, 0.0, 0.0, 1.0];
        match self {
            PixelFormat::R8Unorm => out[0] = bytes[0] as f32 / 255.0,
            PixelFormat::Rgba8Unorm => {
                for (o, b) in out.iter_mut().zip(bytes) {
                    *o = *b as f32 / 255.0;
                }
            }
            PixelFormat::Rgba16Float => {
                for (o, c) in out.iter_mut().zip(bytes.chunks_exact(2)) {
                    *o = f16::from_le_bytes([c[0], c[1]]).to_f32();
                }
            }
            PixelFormat::R32Float => {
                out[0] = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
            }
            PixelFormat::Rgba32Float => {
                for (o, c) in out.iter_mut().zip(bytes.chunks_exact(4)) {
                    *o = f32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                }
            }
        }
        out
    }

    /// Encodes RGBA floats into one texel.  `bytes` must be exactly
    /// [`Self::bytes_per_pixel`] long.
    pub fn encode(self, rgba: [f32; 4], bytes: &mut [u8]) {
        match self {
            PixelFormat::R8Unorm => bytes[0] = unorm8_from_f32(rgba[0]),
            PixelFormat::Rgba8Unorm => {
                for (b, c) in bytes.iter_mut().zip(rgba) {
                    *b = unorm8_from_f32(c);
                }
            }
            PixelFormat::Rgba16Float => {
                for (chunk, c) in bytes.chunks_exact_mut(2).zip(rgba) {
                    chunk.copy_from_slice(&f16::from_f32(c).to_le_bytes());
                }
            }
            PixelFormat::R32Float => bytes.copy_from_slice(&rgba[0].to_le_bytes()),
            PixelFormat::Rgba32Float => {
                for (chunk, c) in bytes.chunks_exact_mut(4).zip(rgba) {
                    chunk.copy_from_slice(&c.to_le_bytes());
                }
            }
        }
    }
}

/// Linear scale into `0..=255`, truncating toward zero.  Out-of-range inputs
/// saturate.
#[inline]
pub fn unorm8_from_f32(value: f32) -> u8 {
    (value * 255.0) as u8
}

/// Converts a tightly packed RGBA32F block into RGBA8.
pub fn rgba8_from_rgba32f(floats: &[f32]) -> Vec<u8> {
    floats.iter().map(|f| unorm8_from_f32(*f)).collect()
}

/// Converts raw little-endian bytes of any format into RGBA8, one pixel at a time.
pub fn rgba8_from_bytes(format: PixelFormat, bytes: &[u8]) -> Vec<u8> {
    if format == PixelFormat::Rgba8Unorm {
        return bytes[..bytes.len() / 4 * 4].to_vec();
    }
    let bpp = format.bytes_per_pixel() as usize;
    let mut out = Vec::with_capacity(bytes.len() / bpp * 4);
    for texel in bytes.chunks_exact(bpp) {
        let rgba = format.decode(texel);
        out.extend(rgba.map(unorm8_from_f32));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_matches_linear_scaling() {
        assert_eq!(unorm8_from_f32(0.0), 0);
        assert_eq!(unorm8_from_f32(1.0), 255);
        // 0.999 * 255 = 254.745, truncated
        assert_eq!(unorm8_from_f32(0.999), 254);
        assert_eq!(unorm8_from_f32(-0.5), 0);
        assert_eq!(unorm8_from_f32(7.0), 255);
    }

    #[test]
    fn half_texels_survive_encode() {
        let mut bytes = [0u8; 8];
        PixelFormat::Rgba16Float.encode([0.25, 0.5, 1.0, 0.0], &mut bytes);
        assert_eq!(PixelFormat::Rgba16Float.decode(&bytes), [0.25, 0.5, 1.0, 0.0]);
    }

    #[test]
    fn single_channel_decodes_with_opaque_alpha() {
        let bytes = 0.75f32.to_le_bytes();
        assert_eq!(PixelFormat::R32Float.decode(&bytes), [0.75, 0.0, 0.0, 1.0]);
        assert_eq!(rgba8_from_bytes(PixelFormat::R32Float, &bytes), vec![191, 0, 0, 255]);
    }
}
