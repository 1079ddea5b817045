// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The median demo on a GPU.  Writes `out_wgpu.gif`.
//!
//! Run with `cargo run --release --features backend_wgpu --example median5x5_wgpu`.

#[allow(dead_code)]
mod support;

use dispatch_and_barriers::bindings::bind_style::{BindSlot, BindStyle};
use dispatch_and_barriers::bindings::visible_to::Consumer;
use dispatch_and_barriers::dispatch::WorkGroupShape;
use dispatch_and_barriers::images::engine::{ComputeEngine, EngineConfig};
use dispatch_and_barriers::imp::wgpu::{WgpuBackend, WgpuProgram};
use dispatch_and_barriers::multibuffer::Role;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (w, h) = (support::W, support::H);
    let backend = test_executors::sleep_on(WgpuBackend::new("median5x5"))?;
    let program = test_executors::sleep_on(WgpuProgram::compile(
        &backend,
        "median5x5",
        &support::median5x5_wgsl(w, h),
        "main",
    ))?;
    let noise = support::random_rgba32f(w, h, 42);

    let mut engine = ComputeEngine::new(
        backend,
        EngineConfig::default().with_debug_label("median5x5 wgpu"),
    );
    let pair =
        engine.create_ping_pong_buffers("pixels", noise.len() * 4, Some(bytemuck::cast_slice(&noise)))?;
    engine.use_program(program);
    let plan = engine.plan(w, h, 1, WorkGroupShape::SIZE_16X16)?;

    let mut frames = Vec::with_capacity(support::FRAMES);
    for i in 0..support::FRAMES {
        logwise::info_sync!("computing frame {i}", i = i);
        let parity = engine.parity();
        let mut style = BindStyle::new();
        style.bind_ping_pong(&pair, parity, BindSlot::new(0), BindSlot::new(1))?;
        engine
            .dispatch(&plan, &style)?
            .barrier_many(&[Consumer::ComputeRead, Consumer::HostReadback])?;
        let view = test_executors::sleep_on(engine.read(pair.resolve(Role::Output, parity)))?;
        frames.push(view.to_snapshot().to_rgba8());
        drop(view);
        engine.end_frame();
    }

    support::write_gif(Path::new("out_wgpu.gif"), w, h, &frames)?;
    Ok(())
}
