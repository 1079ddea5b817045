// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::pixel_formats::PixelFormat;
use wgpu::TextureFormat;

/// The wgpu format backing a storage image, if WebGPU allows the format as storage
/// at all.  `R8Unorm` is not a storage format there.
pub(super) const fn storage_format(format: PixelFormat) -> Option<TextureFormat> {
    match format {
        PixelFormat::R8Unorm => None,
        PixelFormat::Rgba8Unorm => Some(TextureFormat::Rgba8Unorm),
        PixelFormat::Rgba16Float => Some(TextureFormat::Rgba16Float),
        PixelFormat::R32Float => Some(TextureFormat::R32Float),
        PixelFormat::Rgba32Float => Some(TextureFormat::Rgba32Float),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn r8_is_not_storage() {
        assert_eq!(storage_format(PixelFormat::R8Unorm), None);
        assert_eq!(
            storage_format(PixelFormat::Rgba32Float),
            Some(TextureFormat::Rgba32Float)
        );
    }
}
