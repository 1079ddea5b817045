// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Single-pass ray casting against axis-aligned boxes.
//!
//! Each frame uploads the eye and the four corner rays, writes every texel of one
//! image, settles it for sampling and hands it to the display pass.  The last frame
//! is also read back and saved as `raytracer.png`.

#[allow(dead_code)]
mod support;

use dispatch_and_barriers::bindings::bind_style::{Access, BindSlot, BindStyle};
use dispatch_and_barriers::bindings::visible_to::Consumer;
use dispatch_and_barriers::dispatch::WorkGroupShape;
use dispatch_and_barriers::images::engine::{ComputeEngine, EngineConfig};
use dispatch_and_barriers::imp::software::{SoftwareBackend, SoftwareProgram};
use dispatch_and_barriers::pixel_formats::{PixelFormat, write_png};
use std::path::Path;

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;
const FRAMES: u32 = 6;

/// Eye position and the rays through the four viewport corners; `w` unused.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct RayUniforms {
    eye: [f32; 4],
    ray00: [f32; 4],
    ray01: [f32; 4],
    ray10: [f32; 4],
    ray11: [f32; 4],
}

type Vec3 = [f32; 3];

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(a: Vec3) -> Vec3 {
    let len = (a[0] * a[0] + a[1] * a[1] + a[2] * a[2]).sqrt();
    [a[0] / len, a[1] / len, a[2] / len]
}

fn mix(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    std::array::from_fn(|i| a[i] + (b[i] - a[i]) * t)
}

fn ray_uniforms(eye: Vec3, target: Vec3, fov_degrees: f32, aspect: f32) -> RayUniforms {
    let forward = normalize(sub(target, eye));
    let right = normalize(cross(forward, [0.0, 1.0, 0.0]));
    let up = cross(right, forward);
    let half = (fov_degrees.to_radians() / 2.0).tan();
    let corner = |x: f32, y: f32| -> [f32; 4] {
        let d: Vec3 =
            std::array::from_fn(|i| forward[i] + right[i] * x * half * aspect + up[i] * y * half);
        [d[0], d[1], d[2], 0.0]
    };
    RayUniforms {
        eye: [eye[0], eye[1], eye[2], 1.0],
        ray00: corner(-1.0, -1.0),
        ray01: corner(-1.0, 1.0),
        ray10: corner(1.0, -1.0),
        ray11: corner(1.0, 1.0),
    }
}

const BOXES: [(Vec3, Vec3); 3] = [
    ([-5.0, -0.1, -5.0], [5.0, 0.0, 5.0]),
    ([-0.5, 0.0, -0.5], [0.5, 1.0, 0.5]),
    ([1.5, 0.0, -1.0], [2.0, 2.5, -0.5]),
];

/// Nearest slab-test hit as (distance, box index).
fn intersect(origin: Vec3, dir: [f32; 4]) -> Option<(f32, usize)> {
    let mut best: Option<(f32, usize)> = None;
    for (index, (min, max)) in BOXES.iter().enumerate() {
        let mut near = f32::NEG_INFINITY;
        let mut far = f32::INFINITY;
        for axis in 0..3 {
            let t0 = (min[axis] - origin[axis]) / dir[axis];
            let t1 = (max[axis] - origin[axis]) / dir[axis];
            near = near.max(t0.min(t1));
            far = far.min(t0.max(t1));
        }
        if near > 0.0 && near < far && best.is_none_or(|(t, _)| near < t) {
            best = Some((near, index));
        }
    }
    best
}

fn ray_cast() -> SoftwareProgram {
    SoftwareProgram::from_fn("ray cast", |inv, io| {
        let (w, h) = io.image_size(0);
        if inv.x() >= w || inv.y() >= h {
            return;
        }
        let u: RayUniforms = io.uniform(1);
        let px = (inv.x() as f32 + 0.5) / w as f32;
        let py = 1.0 - (inv.y() as f32 + 0.5) / h as f32;
        let dir = mix(mix(u.ray00, u.ray01, py), mix(u.ray10, u.ray11, py), px);
        let eye = [u.eye[0], u.eye[1], u.eye[2]];
        let color = match intersect(eye, dir) {
            Some((t, index)) => {
                let shade = 1.0 / (1.0 + 0.05 * t * t);
                let tint = [[0.8, 0.8, 0.8], [0.9, 0.3, 0.2], [0.2, 0.4, 0.9]][index];
                [tint[0] * shade, tint[1] * shade, tint[2] * shade, 1.0]
            }
            None => [0.1, 0.1, 0.15, 1.0],
        };
        io.store(0, inv.x(), inv.y(), color);
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = ComputeEngine::new(
        SoftwareBackend::new("raytracer"),
        EngineConfig::default().with_debug_label("raytracer"),
    );
    let image = engine.create_image("frame", WIDTH, HEIGHT, PixelFormat::Rgba32Float)?;
    let uniforms = engine.create_buffer("rays", size_of::<RayUniforms>(), None)?;
    engine.use_program(ray_cast());
    let plan = engine.plan(WIDTH, HEIGHT, 1, WorkGroupShape::SIZE_8X8)?;

    let mut style = BindStyle::new();
    style.bind_compute(BindSlot::new(0), image, Access::Write)?;
    style.bind_compute(BindSlot::new(1), uniforms, Access::Read)?;

    let aspect = WIDTH as f32 / HEIGHT as f32;
    for frame in 0..FRAMES {
        let angle = frame as f32 * 0.2;
        let eye = [3.0 * angle.cos() + 3.0 * angle.sin(), 2.0, 7.0 * angle.cos()];
        let rays = ray_uniforms(eye, [0.0, 0.5, 0.0], 60.0, aspect);
        engine.write_buffer(uniforms, 0, bytemuck::bytes_of(&rays))?;

        let consumers: &[Consumer] = if frame + 1 == FRAMES {
            &[Consumer::ShaderSample, Consumer::HostReadback]
        } else {
            &[Consumer::ShaderSample]
        };
        engine.dispatch(&plan, &style)?.barrier_many(consumers)?;
        let shown = engine.sample(image)?;
        logwise::trace_sync!("frame {frame} ready for display", frame = shown.frame());
        engine.end_frame();
    }

    let view = test_executors::sleep_on(engine.read(image))?;
    write_png(Path::new("raytracer.png"), WIDTH, HEIGHT, &view.to_snapshot().to_rgba8())?;
    Ok(())
}
