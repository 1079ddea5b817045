// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Host-readable copies of device resources.
//!
//! Texture-to-buffer copies need rows aligned to
//! [`wgpu::COPY_BYTES_PER_ROW_ALIGNMENT`], so an image's staging buffer is usually
//! wider than the image.  [`RowLayout`] records both widths and strips the padding
//! again on the way out.

/// Padded vs. tight row widths of a staged image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct RowLayout {
    pub(super) padded: usize,
    pub(super) tight: usize,
    pub(super) rows: usize,
}

impl RowLayout {
    pub(super) fn for_image(width: u32, height: u32, bytes_per_pixel: u8) -> Self {
        let tight = width as usize * bytes_per_pixel as usize;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
        Self {
            padded: tight.div_ceil(align) * align,
            tight,
            rows: height as usize,
        }
    }

    pub(super) fn staging_len(&self) -> usize {
        self.padded * self.rows
    }
}

/// A `MAP_READ` buffer holding the result of one host-reaching barrier.
#[derive(Debug)]
pub(super) struct Staged {
    pub(super) buffer: wgpu::Buffer,
    pub(super) byte_len: usize,
    pub(super) rows: Option<RowLayout>,
}

impl Staged {
    /// Copies the resource's bytes out of a mapped staging range.
    pub(super) fn copy_out(&self, mapped: &[u8]) -> Vec<u8> {
        depad(mapped, self.byte_len, self.rows)
    }
}

fn depad(mapped: &[u8], byte_len: usize, rows: Option<RowLayout>) -> Vec<u8> {
    match rows {
        None => mapped[..byte_len].to_vec(),
        Some(layout) => {
            let mut out = Vec::with_capacity(layout.tight * layout.rows);
            for row in mapped.chunks(layout.padded).take(layout.rows) {
                out.extend_from_slice(&row[..layout.tight]);
            }
            out
        }
    }
}

/// Buffers are allocated in whole words; copies and uploads work in 4-byte units.
pub(super) fn word_padded(byte_len: usize) -> u64 {
    (byte_len.div_ceil(4) * 4) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_pad_to_256() {
        let layout = RowLayout::for_image(3, 2, 16);
        assert_eq!(layout.tight, 48);
        assert_eq!(layout.padded, 256);
        assert_eq!(layout.staging_len(), 512);

        let exact = RowLayout::for_image(64, 1, 4);
        assert_eq!(exact.padded, exact.tight);
    }

    #[test]
    fn depad_strips_row_tails() {
        let layout = RowLayout::for_image(1, 3, 4);
        let mut mapped = vec![0u8; layout.staging_len()];
        for row in 0..3 {
            mapped[row * 256..row * 256 + 4].copy_from_slice(&[row as u8; 4]);
        }
        assert_eq!(
            depad(&mapped, 12, Some(layout)),
            vec![0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2]
        );
        assert_eq!(depad(&[7, 8, 9, 0], 3, None), vec![7, 8, 9]);
        assert_eq!(word_padded(5), 8);
    }
}
