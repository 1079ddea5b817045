// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! A procedural splat drawn into a read-write image that fades every frame.
//!
//! The image is both read and written by each dispatch, so every barrier covers the
//! next dispatch's compute read as well as the display pass's sampling.

#[allow(dead_code)]
mod support;

use dispatch_and_barriers::bindings::bind_style::{Access, BindSlot, BindStyle};
use dispatch_and_barriers::bindings::visible_to::Consumer;
use dispatch_and_barriers::dispatch::WorkGroupShape;
use dispatch_and_barriers::images::engine::{ComputeEngine, EngineConfig};
use dispatch_and_barriers::imp::software::{SoftwareBackend, SoftwareProgram};
use dispatch_and_barriers::pixel_formats::PixelFormat;
use std::path::Path;

const WIDTH: u32 = 256;
const HEIGHT: u32 = 192;
const FRAMES: u32 = 24;
const FADE: f32 = 0.85;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct SplatUniforms {
    center: [f32; 2],
    radius: f32,
    frame: u32,
}

fn splat() -> SoftwareProgram {
    SoftwareProgram::from_fn("splat", |inv, io| {
        let (w, h) = io.image_size(0);
        if inv.x() >= w || inv.y() >= h {
            return;
        }
        let u: SplatUniforms = io.uniform(1);
        let dx = inv.x() as f32 - u.center[0];
        let dy = inv.y() as f32 - u.center[1];
        let falloff = (-(dx * dx + dy * dy) / (u.radius * u.radius)).exp();
        let hue = (u.frame % 3) as usize;
        let old = io.load(0, inv.x(), inv.y());
        let mut out = [old[0] * FADE, old[1] * FADE, old[2] * FADE, 1.0];
        out[hue] = (out[hue] + falloff).min(1.0);
        io.store(0, inv.x(), inv.y(), out);
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = ComputeEngine::new(
        SoftwareBackend::new("splat"),
        EngineConfig::default().with_debug_label("splat"),
    );
    let image = engine.create_image("canvas", WIDTH, HEIGHT, PixelFormat::Rgba8Unorm)?;
    let uniforms = engine.create_buffer("splat", size_of::<SplatUniforms>(), None)?;
    engine.use_program(splat());
    let plan = engine.plan(WIDTH, HEIGHT, 1, WorkGroupShape::SIZE_8X8)?;

    let mut style = BindStyle::new();
    style.bind_compute(BindSlot::new(0), image, Access::ReadWrite)?;
    style.bind_compute(BindSlot::new(1), uniforms, Access::Read)?;

    let mut frames = Vec::with_capacity(FRAMES as usize);
    for frame in 0..FRAMES {
        let t = frame as f32 / FRAMES as f32 * std::f32::consts::TAU;
        let block = SplatUniforms {
            center: [
                WIDTH as f32 * (0.5 + 0.35 * t.cos()),
                HEIGHT as f32 * (0.5 + 0.35 * t.sin()),
            ],
            radius: 18.0,
            frame,
        };
        engine.write_buffer(uniforms, 0, bytemuck::bytes_of(&block))?;
        engine.dispatch(&plan, &style)?.barrier_many(&[
            Consumer::ComputeRead,
            Consumer::ShaderSample,
            Consumer::HostReadback,
        ])?;
        engine.sample(image)?;
        let view = test_executors::sleep_on(engine.read(image))?;
        frames.push(view.to_snapshot().to_rgba8());
        drop(view);
        engine.end_frame();
    }

    support::write_gif(Path::new("splat.gif"), WIDTH, HEIGHT, &frames)?;
    Ok(())
}
