// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Progressive accumulation into one persistent image.

use dispatch_and_barriers::accumulation::AccumulationState;
use dispatch_and_barriers::bindings::bind_style::{Access, BindSlot, BindStyle};
use dispatch_and_barriers::bindings::visible_to::Consumer;
use dispatch_and_barriers::dispatch::WorkGroupShape;
use dispatch_and_barriers::images::engine::{ComputeEngine, EngineConfig};
use dispatch_and_barriers::images::render_loop::{InputEvent, RenderContext, RenderUniforms};
use dispatch_and_barriers::imp::software::{SoftwareBackend, SoftwareProgram};
use dispatch_and_barriers::pixel_formats::PixelFormat;

/// Blends a sample equal to the frame count, so the image holds the mean of
/// `0..frame_count`.
fn running_mean() -> SoftwareProgram {
    SoftwareProgram::from_fn("running mean", |inv, io| {
        let (w, h) = io.image_size(0);
        if inv.x() >= w || inv.y() >= h {
            return;
        }
        let u: RenderUniforms = io.uniform(1);
        let sample = u.accumulation.frame_count as f32;
        let k = u.accumulation.blend_weight;
        let old = io.load(0, inv.x(), inv.y());
        io.store(0, inv.x(), inv.y(), old.map(|c| c * k + sample * (1.0 - k)));
    })
}

fn context() -> RenderContext<SoftwareBackend> {
    let engine = ComputeEngine::new(
        SoftwareBackend::new("progressive"),
        EngineConfig::default()
            .with_validation(true)
            .with_record_commands(true),
    );
    RenderContext::new(
        engine,
        running_mean(),
        (12, 10),
        PixelFormat::Rgba32Float,
        WorkGroupShape::SIZE_8X8,
    )
    .unwrap()
}

fn pixel(ctx: &mut RenderContext<SoftwareBackend>) -> f32 {
    let target = ctx.target();
    let view = test_executors::sleep_on(ctx.engine_mut().read(target)).unwrap();
    view.to_f32_vec()[0]
}

#[test]
fn ten_frames_weigh_ten_elevenths() {
    let mut ctx = context();
    for _ in 0..10 {
        ctx.accumulate(&[Consumer::ShaderSample]).unwrap();
    }
    assert_eq!(ctx.accumulation().frame_count(), 10);
    assert!((ctx.accumulation().blend_weight() - 10.0 / 11.0).abs() < 1e-7);
    assert_eq!(ctx.present().unwrap().frame(), 10);
}

#[test]
fn invalidation_restarts_the_mean() {
    let mut ctx = context();
    for _ in 0..5 {
        ctx.accumulate(&[Consumer::HostReadback]).unwrap();
    }
    assert!((pixel(&mut ctx) - 2.0).abs() < 1e-5);

    ctx.handle(InputEvent::CameraMoved {
        position: [0.0, 1.0, 3.0],
        yaw: -45.0,
        pitch: 10.0,
    })
    .unwrap();
    assert_eq!(ctx.accumulation().frame_count(), 0);
    for _ in 0..5 {
        ctx.accumulate(&[Consumer::HostReadback]).unwrap();
    }
    assert_eq!(ctx.accumulation().frame_count(), 5);
    assert!((ctx.accumulation().blend_weight() - 5.0 / 6.0).abs() < 1e-7);
    // the first post-reset frame had weight zero, discarding the old estimate
    assert!((pixel(&mut ctx) - 2.0).abs() < 1e-5);

    for _ in 0..5 {
        ctx.accumulate(&[Consumer::HostReadback]).unwrap();
    }
    assert!((pixel(&mut ctx) - 4.5).abs() < 1e-5);
    assert!(ctx.engine().validate_commands().is_ok());
}

#[test]
fn accumulation_driven_by_hand() {
    let mut engine = ComputeEngine::new(
        SoftwareBackend::new("by-hand"),
        EngineConfig::default().with_validation(true),
    );
    let image = engine
        .create_image("accumulation", 4, 4, PixelFormat::Rgba32Float)
        .unwrap();
    let uniforms = engine
        .create_buffer("uniforms", size_of::<RenderUniforms>(), None)
        .unwrap();
    engine.use_program(running_mean());
    let plan = engine.plan(4, 4, 1, WorkGroupShape::SIZE_8X8).unwrap();
    assert_eq!(plan.overshoot(), [4, 4, 0]);

    let mut state = AccumulationState::new();
    for frame in 0..10u32 {
        if frame == 5 {
            state.invalidate();
        }
        let block = RenderUniforms {
            accumulation: state.uniforms(),
            viewport: [4, 4],
            position: [0.0; 4],
            orientation: [0.0; 4],
        };
        engine
            .write_buffer(uniforms, 0, bytemuck::bytes_of(&block))
            .unwrap();
        let mut style = BindStyle::new();
        style
            .bind_compute(BindSlot::new(0), image, Access::ReadWrite)
            .unwrap();
        style
            .bind_compute(BindSlot::new(1), uniforms, Access::Read)
            .unwrap();
        let settled = engine
            .dispatch(&plan, &style)
            .unwrap()
            .barrier_many(&[Consumer::ComputeRead, Consumer::ShaderSample])
            .unwrap();
        state.advance(&settled);
        engine.end_frame();
    }
    assert_eq!(state.frame_count(), 5);
    assert!((state.blend_weight() - 5.0 / 6.0).abs() < 1e-7);
    assert_eq!(engine.sample(image).unwrap().size(), (4, 4));
}
