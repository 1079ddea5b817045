// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Kernels and output helpers shared by the demos and integration tests.

use dispatch_and_barriers::images::render_loop::RenderUniforms;
use dispatch_and_barriers::imp::software::SoftwareProgram;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, RgbaImage};
use std::fs::File;
use std::path::Path;

pub const W: u32 = 512;
pub const H: u32 = 256;
pub const FRAMES: usize = 50;
/// Per-frame delay of exported animations.
pub const GIF_FRAME_MS: u32 = 150;

/// Deterministic noise in `0.0..1.0`, four channels per pixel.
pub fn random_rgba32f(width: u32, height: u32, seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    (0..width as usize * height as usize * 4)
        .map(|_| {
            //xorshift64*
            state ^= state >> 12;
            state ^= state << 25;
            state ^= state >> 27;
            let bits = state.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 40;
            bits as f32 / (1u64 << 24) as f32
        })
        .collect()
}

fn pixel_index(x: u32, y: u32, width: u32) -> usize {
    (y as usize * width as usize + x as usize) * 4
}

/// Per-channel 5x5 median over an RGBA32F buffer.  Slot 0 in, slot 1 out.  Edges clamp.
pub fn median5x5(width: u32, height: u32) -> SoftwareProgram {
    SoftwareProgram::from_fn("median5x5", move |inv, io| {
        let (x, y) = (inv.x(), inv.y());
        if x >= width || y >= height {
            return;
        }
        let input = io.f32s(0);
        let mut out = [0.0f32; 4];
        let mut window = [0.0f32; 25];
        for (c, o) in out.iter_mut().enumerate() {
            let mut n = 0;
            for dy in -2i32..=2 {
                for dx in -2i32..=2 {
                    let sx = (x as i32 + dx).clamp(0, width as i32 - 1) as u32;
                    let sy = (y as i32 + dy).clamp(0, height as i32 - 1) as u32;
                    window[n] = input[pixel_index(sx, sy, width) + c];
                    n += 1;
                }
            }
            window.sort_unstable_by(f32::total_cmp);
            *o = window[12];
        }
        let i = pixel_index(x, y, width);
        io.f32s_mut(1)[i..i + 4].copy_from_slice(&out);
    })
}

/// Inverts RGB, keeps alpha.  Slot 0 in, slot 1 out.
pub fn invert(width: u32, height: u32) -> SoftwareProgram {
    SoftwareProgram::from_fn("invert", move |inv, io| {
        let (x, y) = (inv.x(), inv.y());
        if x >= width || y >= height {
            return;
        }
        let i = pixel_index(x, y, width);
        let mut px = [0.0f32; 4];
        px.copy_from_slice(&io.f32s(0)[i..i + 4]);
        for c in &mut px[..3] {
            *c = 1.0 - *c;
        }
        io.f32s_mut(1)[i..i + 4].copy_from_slice(&px);
    })
}

/// Blends the frame's sample into the accumulation image.  The sample is a
/// checkerboard whose phase follows the frame count, so the converged value is 0.5.
pub fn progressive() -> SoftwareProgram {
    SoftwareProgram::from_fn("progressive", |inv, io| {
        let (w, h) = io.image_size(0);
        if inv.x() >= w || inv.y() >= h {
            return;
        }
        let u: RenderUniforms = io.uniform(1);
        let phase = (inv.x() / 8 + inv.y() / 8 + u.accumulation.frame_count) % 2;
        let sample = phase as f32;
        let k = u.accumulation.blend_weight;
        let old = io.load(0, inv.x(), inv.y());
        let blended = [sample, 1.0 - sample, 0.5, 1.0];
        io.store(
            0,
            inv.x(),
            inv.y(),
            std::array::from_fn(|c| old[c] * k + blended[c] * (1.0 - k)),
        );
    })
}

/// Writes an endlessly looping GIF, [`GIF_FRAME_MS`] per frame.
pub fn write_gif(
    path: &Path,
    width: u32,
    height: u32,
    frames: &[Vec<u8>],
) -> image::ImageResult<()> {
    let mut encoder = GifEncoder::new(File::create(path)?);
    encoder.set_repeat(Repeat::Infinite)?;
    for rgba in frames {
        let buffer = RgbaImage::from_raw(width, height, rgba.clone()).ok_or_else(|| {
            image::ImageError::Parameter(image::error::ParameterError::from_kind(
                image::error::ParameterErrorKind::DimensionMismatch,
            ))
        })?;
        encoder.encode_frame(Frame::from_parts(
            buffer,
            0,
            0,
            Delay::from_numer_denom_ms(GIF_FRAME_MS, 1),
        ))?;
    }
    Ok(())
}

/// WGSL for [`median5x5`], specialized to one image size.
pub fn median5x5_wgsl(width: u32, height: u32) -> String {
    format!(
        r#"
const W: i32 = {width};
const H: i32 = {height};

@group(0) @binding(0) var<storage, read> src: array<vec4<f32>>;
@group(0) @binding(1) var<storage, read_write> dst: array<vec4<f32>>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {{
    let x = i32(id.x);
    let y = i32(id.y);
    if (x >= W || y >= H) {{
        return;
    }}
    var out = vec4<f32>(0.0);
    for (var c = 0; c < 4; c++) {{
        var window: array<f32, 25>;
        var n = 0;
        for (var dy = -2; dy <= 2; dy++) {{
            for (var dx = -2; dx <= 2; dx++) {{
                let sx = clamp(x + dx, 0, W - 1);
                let sy = clamp(y + dy, 0, H - 1);
                window[n] = src[sy * W + sx][c];
                n++;
            }}
        }}
        for (var i = 0; i < 25; i++) {{
            for (var j = 0; j < 24 - i; j++) {{
                if (window[j] > window[j + 1]) {{
                    let t = window[j];
                    window[j] = window[j + 1];
                    window[j + 1] = t;
                }}
            }}
        }}
        out[c] = window[12];
    }}
    dst[y * W + x] = out;
}}
"#
    )
}

/// WGSL for [`invert`], specialized to one image size.
pub fn invert_wgsl(width: u32, height: u32) -> String {
    format!(
        r#"
const W: u32 = {width}u;
const H: u32 = {height}u;

@group(0) @binding(0) var<storage, read> src: array<vec4<f32>>;
@group(0) @binding(1) var<storage, read_write> dst: array<vec4<f32>>;

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {{
    if (id.x >= W || id.y >= H) {{
        return;
    }}
    let i = id.y * W + id.x;
    let p = src[i];
    dst[i] = vec4<f32>(1.0 - p.rgb, p.a);
}}
"#
    )
}
