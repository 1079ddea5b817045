// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! 50 iterations of a 5x5 median over random noise, written to `out.gif`.
//!
//! Run with `cargo run --release --example median5x5`.

#[allow(dead_code)]
mod support;

use dispatch_and_barriers::bindings::bind_style::{BindSlot, BindStyle};
use dispatch_and_barriers::bindings::visible_to::Consumer;
use dispatch_and_barriers::dispatch::WorkGroupShape;
use dispatch_and_barriers::images::engine::{ComputeEngine, EngineConfig};
use dispatch_and_barriers::imp::software::SoftwareBackend;
use dispatch_and_barriers::multibuffer::Role;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (w, h) = (support::W, support::H);
    let seed = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos() as u64;
    let noise = support::random_rgba32f(w, h, seed);

    let mut engine = ComputeEngine::new(
        SoftwareBackend::new("median5x5"),
        EngineConfig::default().with_debug_label("median5x5"),
    );
    let pair =
        engine.create_ping_pong_buffers("pixels", noise.len() * 4, Some(bytemuck::cast_slice(&noise)))?;
    engine.use_program(support::median5x5(w, h));
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

    logwise::info_sync!("writing out.gif");
    support::write_gif(Path::new("out.gif"), w, h, &frames)?;
    Ok(())
}
