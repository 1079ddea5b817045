// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Progressive accumulation with scripted camera input.
//!
//! Each burst of frames converges until an input event resets it.  Captured frames
//! are written as PNGs into `pathtracer_frames/`.

#[allow(dead_code)]
mod support;

use dispatch_and_barriers::bindings::visible_to::Consumer;
use dispatch_and_barriers::dispatch::WorkGroupShape;
use dispatch_and_barriers::images::engine::{ComputeEngine, EngineConfig};
use dispatch_and_barriers::images::render_loop::{InputEvent, RenderContext};
use dispatch_and_barriers::imp::software::SoftwareBackend;
use dispatch_and_barriers::pixel_formats::PixelFormat;
use dispatch_and_barriers::readback::FrameSequence;
use std::path::Path;

const FRAMES_PER_BURST: u32 = 8;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let engine = ComputeEngine::new(
        SoftwareBackend::new("pathtracer"),
        EngineConfig::default().with_debug_label("pathtracer"),
    );
    let mut ctx = RenderContext::new(
        engine,
        support::progressive(),
        (256, 180),
        PixelFormat::Rgba32Float,
        WorkGroupShape::SIZE_8X8,
    )?;

    let script = [
        None,
        Some(InputEvent::CameraMoved {
            position: [1.0, 2.0, 6.5],
            yaw: -90.0,
            pitch: 0.0,
        }),
        Some(InputEvent::ParameterChanged { zoom: 30.0 }),
    ];
    let mut captured = FrameSequence::new();
    for event in script {
        if let Some(event) = event {
            ctx.handle(event)?;
        }
        for n in 0..FRAMES_PER_BURST {
            let last = n + 1 == FRAMES_PER_BURST;
            let consumers: &[Consumer] = if last {
                &[Consumer::ShaderSample, Consumer::HostReadback]
            } else {
                &[Consumer::ShaderSample]
            };
            ctx.accumulate(consumers)?;
            let shown = ctx.present()?;
            logwise::trace_sync!(
                "presented frame {frame}, blend weight {weight}",
                frame = shown.frame(),
                weight = logwise::privacy::LogIt(&ctx.accumulation().blend_weight())
            );
        }
        let target = ctx.target();
        test_executors::sleep_on(captured.capture(ctx.engine_mut(), target))?;
    }

    let (w, h) = ctx.viewport();
    let dir = Path::new("pathtracer_frames");
    std::fs::create_dir_all(dir)?;
    let paths = captured.write_pngs(dir, "frame", w, h)?;
    logwise::info_sync!("wrote {count} frames", count = paths.len());

    ctx.handle(InputEvent::Resized {
        width: 128,
        height: 90,
    })?;
    ctx.accumulate(&[Consumer::ShaderSample])?;
    ctx.present()?;
    ctx.into_engine()?;
    Ok(())
}
