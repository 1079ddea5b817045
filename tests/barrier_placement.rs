// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Where barriers land and how wide they are.

use dispatch_and_barriers::Error;
use dispatch_and_barriers::barrier::{BarrierPolicy, BarrierScope};
use dispatch_and_barriers::bindings::bind_style::{Access, BindSlot, BindStyle};
use dispatch_and_barriers::bindings::visible_to::Consumer;
use dispatch_and_barriers::dispatch::WorkGroupShape;
use dispatch_and_barriers::images::command_log::{self, Command};
use dispatch_and_barriers::images::engine::{ComputeEngine, EngineConfig};
use dispatch_and_barriers::imp::software::{SoftwareBackend, SoftwareProgram};
use dispatch_and_barriers::pixel_formats::PixelFormat;

fn recording(policy: BarrierPolicy) -> ComputeEngine<SoftwareBackend> {
    ComputeEngine::new(
        SoftwareBackend::new("barrier-placement"),
        EngineConfig::default()
            .with_barrier_policy(policy)
            .with_validation(true)
            .with_record_commands(true),
    )
}

fn add_one() -> SoftwareProgram {
    SoftwareProgram::from_fn("add one", |inv, io| {
        let i = inv.x() as usize;
        if i < io.f32s(1).len() {
            let v = io.f32s(0)[i];
            io.f32s_mut(1)[i] = v + 1.0;
        }
    })
}

/// Fills slot 0 with a horizontal gradient, the way a ray caster writes every texel.
fn gradient() -> SoftwareProgram {
    SoftwareProgram::from_fn("gradient", |inv, io| {
        let (w, h) = io.image_size(0);
        if inv.x() < w && inv.y() < h {
            let t = inv.x() as f32 / w as f32;
            io.store(0, inv.x(), inv.y(), [t, t, t, 1.0]);
        }
    })
}

#[test]
fn every_dispatch_is_followed_by_its_barrier() {
    let mut engine = recording(BarrierPolicy::Minimal);
    let pair = engine.create_ping_pong_buffers("values", 4 * 32, None).unwrap();
    engine.use_program(add_one());
    let plan = engine.plan(32, 1, 1, WorkGroupShape::SIZE_64).unwrap();
    for _ in 0..4 {
        let mut style = BindStyle::new();
        style
            .bind_ping_pong(&pair, engine.parity(), BindSlot::new(0), BindSlot::new(1))
            .unwrap();
        engine
            .dispatch(&plan, &style)
            .unwrap()
            .barrier(Consumer::ComputeRead)
            .unwrap();
        engine.end_frame();
    }

    let commands = engine.commands();
    let dispatches: Vec<usize> = commands
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, Command::Dispatch { .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(dispatches.len(), 4);
    for i in dispatches {
        assert!(matches!(
            &commands[i + 1],
            Command::Barrier { scope, .. } if *scope == BarrierScope::SHADER_STORAGE
        ));
    }
    assert!(engine.validate_commands().is_ok());

    let barriers = engine.backend().barriers();
    assert_eq!(barriers.len(), 4);
    let (a, b) = pair.resources();
    let written: Vec<_> = barriers.iter().map(|b| b.resources[0]).collect();
    assert_eq!(written, vec![b, a, b, a]);
}

#[test]
fn scope_follows_producer_and_consumer() {
    let mut engine = recording(BarrierPolicy::Minimal);
    let image = engine
        .create_image("frame", 8, 8, PixelFormat::Rgba8Unorm)
        .unwrap();
    engine.use_program(gradient());
    let plan = engine.plan(8, 8, 1, WorkGroupShape::SIZE_8X8).unwrap();
    let mut style = BindStyle::new();
    style
        .bind_compute(BindSlot::new(0), image, Access::Write)
        .unwrap();

    let cases = [
        (vec![Consumer::ShaderSample], BarrierScope::TEXTURE_FETCH),
        (vec![Consumer::ComputeRead], BarrierScope::SHADER_IMAGE_ACCESS),
        (vec![Consumer::HostReadback], BarrierScope::TEXTURE_UPDATE),
        (
            vec![Consumer::ShaderSample, Consumer::HostReadback],
            BarrierScope::TEXTURE_FETCH | BarrierScope::TEXTURE_UPDATE,
        ),
    ];
    for (consumers, expected) in cases {
        let settled = engine
            .dispatch(&plan, &style)
            .unwrap()
            .barrier_many(&consumers)
            .unwrap();
        assert_eq!(settled.scope(), expected);
        assert_eq!(settled.consumers(), consumers.as_slice());
    }

    // the last barrier covered sampling and readback
    assert_eq!(engine.sample(image).unwrap().size(), (8, 8));
    let view = test_executors::sleep_on(engine.read(image)).unwrap();
    assert_eq!(view.len(), 8 * 8 * 4);
    let rgba = view.to_snapshot().to_rgba8();
    assert_eq!(&rgba[..4], &[0, 0, 0, 255]);
    drop(view);
    assert!(engine.validate_commands().is_ok());
}

#[test]
fn coarse_policy_is_a_superset() {
    let mut engine = recording(BarrierPolicy::Coarse);
    let pair = engine.create_ping_pong_buffers("values", 4 * 8, None).unwrap();
    engine.use_program(add_one());
    let plan = engine.plan(8, 1, 1, WorkGroupShape::SIZE_64).unwrap();
    let mut style = BindStyle::new();
    style
        .bind_ping_pong(&pair, engine.parity(), BindSlot::new(0), BindSlot::new(1))
        .unwrap();
    let settled = engine
        .dispatch(&plan, &style)
        .unwrap()
        .barrier(Consumer::ComputeRead)
        .unwrap();
    assert_eq!(settled.scope(), BarrierScope::ALL);
    // everything is visible, including to the host
    let view = test_executors::sleep_on(engine.read(pair.output(engine.parity()))).unwrap();
    assert_eq!(view.to_f32_vec(), vec![1.0; 8]);
}

#[test]
fn a_dropped_token_leaves_writes_unsettled() {
    let mut engine = recording(BarrierPolicy::Minimal);
    let image = engine
        .create_image("frame", 4, 4, PixelFormat::Rgba32Float)
        .unwrap();
    engine.use_program(gradient());
    let plan = engine.plan(4, 4, 1, WorkGroupShape::SIZE_8X8).unwrap();
    let mut style = BindStyle::new();
    style
        .bind_compute(BindSlot::new(0), image, Access::Write)
        .unwrap();
    let written = engine.dispatch(&plan, &style).unwrap();
    assert_eq!(written.writes().collect::<Vec<_>>(), vec![image]);
    drop(written);

    assert!(matches!(
        engine.sample(image),
        Err(Error::BarrierOmitted { consumer: Consumer::ShaderSample, .. })
    ));
    assert!(matches!(
        test_executors::sleep_on(engine.read(image)),
        Err(Error::ReadbackStale { .. })
    ));
    assert!(engine.backend().barriers().is_empty());
}

#[test]
fn hand_written_logs_are_checked() {
    let mut engine = recording(BarrierPolicy::Minimal);
    let image = engine
        .create_image("frame", 4, 4, PixelFormat::Rgba32Float)
        .unwrap();
    engine.use_program(gradient());
    let plan = engine.plan(4, 4, 1, WorkGroupShape::SIZE_8X8).unwrap();
    let mut style = BindStyle::new();
    style
        .bind_compute(BindSlot::new(0), image, Access::Write)
        .unwrap();
    engine
        .dispatch(&plan, &style)
        .unwrap()
        .barrier(Consumer::ShaderSample)
        .unwrap();
    engine.sample(image).unwrap();

    let mut log = engine.commands().to_vec();
    assert!(command_log::validate(&log).is_ok());

    // reorder: sample before the barrier
    let barrier = log
        .iter()
        .position(|c| matches!(c, Command::Barrier { .. }))
        .unwrap();
    let moved = log.remove(barrier);
    log.push(moved);
    assert!(matches!(
        command_log::validate(&log),
        Err(Error::BarrierOmitted { .. })
    ));

    // duplicate the barrier
    let mut log = engine.commands().to_vec();
    log.insert(barrier + 1, log[barrier].clone());
    assert!(matches!(
        command_log::validate(&log),
        Err(Error::RedundantBarrier { .. })
    ));
}
