// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The ping-pong filter on a real device.  Skips when no adapter is available.
#![cfg(feature = "backend_wgpu")]

use dispatch_and_barriers::bindings::bind_style::{Access, BindSlot, BindStyle};
use dispatch_and_barriers::bindings::visible_to::Consumer;
use dispatch_and_barriers::dispatch::WorkGroupShape;
use dispatch_and_barriers::images::engine::{ComputeEngine, EngineConfig};
use dispatch_and_barriers::imp::Error as BackendError;
use dispatch_and_barriers::imp::wgpu::{WgpuBackend, WgpuProgram};
use dispatch_and_barriers::multibuffer::Role;
use dispatch_and_barriers::pixel_formats::PixelFormat;
use dispatch_and_barriers::{Error, imp::Backend};

#[allow(dead_code)]
#[path = "../demos/support/mod.rs"]
mod support;

fn backend() -> Option<WgpuBackend> {
    match test_executors::sleep_on(WgpuBackend::new("wgpu-median")) {
        Ok(backend) => Some(backend),
        Err(BackendError::NoSuchAdapter) => {
            eprintln!("no adapter; skipping");
            None
        }
        Err(e) => panic!("device request failed: {e}"),
    }
}

#[test]
fn invert_round_trips_through_the_pair() {
    let Some(backend) = backend() else { return };
    let (w, h) = (64u32, 32u32);
    let program = test_executors::sleep_on(WgpuProgram::compile(
        &backend,
        "invert",
        &support::invert_wgsl(w, h),
        "main",
    ))
    .unwrap();
    let initial = support::random_rgba32f(w, h, 11);
    let mut engine = ComputeEngine::new(backend, EngineConfig::default().with_validation(true));
    let pair = engine
        .create_ping_pong_buffers("pixels", initial.len() * 4, Some(bytemuck::cast_slice(&initial)))
        .unwrap();
    engine.use_program(program);
    let plan = engine.plan(w, h, 1, WorkGroupShape::SIZE_16X16).unwrap();

    for i in 0..4 {
        let parity = engine.parity();
        let mut style = BindStyle::new();
        style
            .bind_ping_pong(&pair, parity, BindSlot::new(0), BindSlot::new(1))
            .unwrap();
        engine
            .dispatch(&plan, &style)
            .unwrap()
            .barrier_many(&[Consumer::ComputeRead, Consumer::HostReadback])
            .unwrap();
        let output = pair.resolve(Role::Output, parity);
        let floats = test_executors::sleep_on(engine.read(output))
            .unwrap()
            .to_f32_vec();
        assert_eq!(floats.len(), initial.len());
        let expected = if i % 2 == 0 {
            1.0 - initial[0]
        } else {
            initial[0]
        };
        assert!((floats[0] - expected).abs() < 1e-5);
        engine.end_frame();
    }
}

#[test]
fn image_readback_strips_row_padding() {
    let Some(backend) = backend() else { return };
    // 5 RGBA32F texels is 80 bytes per row, padded to 256 for the copy
    let (w, h) = (5u32, 3u32);
    let source = format!(
        r#"
@group(0) @binding(0) var dst: texture_storage_2d<rgba32float, write>;

@compute @workgroup_size(8, 8, 1)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {{
    if (id.x >= {w}u || id.y >= {h}u) {{
        return;
    }}
    textureStore(dst, vec2<i32>(id.xy), vec4<f32>(f32(id.x), f32(id.y), 0.0, 1.0));
}}
"#
    );
    let program =
        test_executors::sleep_on(WgpuProgram::compile(&backend, "coords", &source, "main")).unwrap();
    let mut engine = ComputeEngine::new(backend, EngineConfig::default());
    let image = engine
        .create_image("coords", w, h, PixelFormat::Rgba32Float)
        .unwrap();
    engine.use_program(program);
    let plan = engine.plan(w, h, 1, WorkGroupShape::SIZE_8X8).unwrap();
    let mut style = BindStyle::new();
    style
        .bind_compute(BindSlot::new(0), image, Access::Write)
        .unwrap();
    engine
        .dispatch(&plan, &style)
        .unwrap()
        .barrier(Consumer::HostReadback)
        .unwrap();
    let floats = test_executors::sleep_on(engine.read(image))
        .unwrap()
        .to_f32_vec();
    assert_eq!(floats.len(), (w * h * 4) as usize);
    let last = ((h - 1) * w + (w - 1)) as usize * 4;
    assert_eq!(&floats[last..last + 4], &[4.0, 2.0, 0.0, 1.0]);
}

#[test]
fn r8_is_rejected_as_storage() {
    let Some(backend) = backend() else { return };
    assert!(!backend.supports_storage_format(PixelFormat::R8Unorm));
    let mut engine = ComputeEngine::new(backend, EngineConfig::default());
    assert!(matches!(
        engine.create_image("mask", 4, 4, PixelFormat::R8Unorm),
        Err(Error::InvalidResourceSpec(_))
    ));
}
