// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use png::{BitDepth, ColorType};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Writes one RGBA8 frame as a PNG file.
///
/// `rgba8` must hold exactly `width * height * 4` bytes, which is what
/// [`crate::readback::Snapshot::to_rgba8`] produces.
pub fn write_png(path: &Path, width: u32, height: u32, rgba8: &[u8]) -> std::io::Result<()> {
    let expected = width as usize * height as usize * 4;
    if rgba8.len() != expected {
        return Err(std::io::Error::other(format!(
            "expected {expected} bytes for a {width}x{height} RGBA8 frame, got {}",
            rgba8.len()
        )));
    }
    let file = File::create(path)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(ColorType::Rgba);
    encoder.set_depth(BitDepth::Eight);
    let mut writer = encoder.write_header().map_err(std::io::Error::other)?;
    writer
        .write_image_data(rgba8)
        .map_err(std::io::Error::other)?;
    writer.finish().map_err(std::io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_frames() {
        let path = std::env::temp_dir().join("dispatch_and_barriers_short.png");
        let err = write_png(&path, 2, 2, &[0; 4]).unwrap_err();
        assert!(err.to_string().contains("16 bytes"));
    }

    #[test]
    fn writes_a_decodable_frame() {
        let path = std::env::temp_dir().join("dispatch_and_barriers_frame.png");
        let rgba: Vec<u8> = (0..2 * 3 * 4).map(|i| i as u8).collect();
        write_png(&path, 2, 3, &rgba).unwrap();

        let decoder = png::Decoder::new(std::io::BufReader::new(File::open(&path).unwrap()));
        let reader = decoder.read_info().unwrap();
        assert_eq!(reader.info().width, 2);
        assert_eq!(reader.info().height, 3);
        assert_eq!(reader.info().color_type, ColorType::Rgba);
    }
}
