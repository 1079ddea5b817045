// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Interactive progressive rendering.
//!
//! [`RenderContext`] bundles what an interactive progressive renderer mutates from its
//! input callbacks: the engine, the accumulation counter, the view, and the viewport.
//! Callbacks receive `&mut RenderContext` and report an [`InputEvent`]; there is no
//! global state.
//!
//! Every frame [`RenderContext::accumulate`] uploads the frame uniforms, dispatches the
//! current program over the target image (bound read-write at [`TARGET_SLOT`], uniforms
//! at [`UNIFORM_SLOT`]), issues the barrier and closes the frame.
//!
//! ```
//! use dispatch_and_barriers::bindings::visible_to::Consumer;
//! use dispatch_and_barriers::dispatch::WorkGroupShape;
//! use dispatch_and_barriers::images::engine::{ComputeEngine, EngineConfig};
//! use dispatch_and_barriers::images::render_loop::{InputEvent, RenderContext, RenderUniforms};
//! use dispatch_and_barriers::imp::software::{SoftwareBackend, SoftwareProgram};
//! use dispatch_and_barriers::pixel_formats::PixelFormat;
//!
//! let engine = ComputeEngine::new(SoftwareBackend::new("doc"), EngineConfig::default());
//! let shade = SoftwareProgram::from_fn("shade", |inv, io| {
//!     let (w, h) = io.image_size(0);
//!     if inv.x() >= w || inv.y() >= h {
//!         return;
//!     }
//!     let u: RenderUniforms = io.uniform(1);
//!     let old = io.load(0, inv.x(), inv.y());
//!     let k = u.accumulation.blend_weight;
//!     io.store(0, inv.x(), inv.y(), old.map(|c| c * k + (1.0 - k)));
//! });
//! let mut ctx = RenderContext::new(
//!     engine,
//!     shade,
//!     (16, 16),
//!     PixelFormat::Rgba32Float,
//!     WorkGroupShape::SIZE_8X8,
//! )
//! .unwrap();
//! for _ in 0..4 {
//!     ctx.accumulate(&[Consumer::ShaderSample]).unwrap();
//! }
//! assert_eq!(ctx.accumulation().frame_count(), 4);
//! ctx.handle(InputEvent::Resized { width: 32, height: 8 }).unwrap();
//! assert_eq!(ctx.accumulation().frame_count(), 0);
//! assert_eq!(ctx.plan().group_counts(), [4, 1, 1]);
//! ```

use crate::accumulation::{AccumulationState, AccumulationUniforms};
use crate::bindings::bind_style::{Access, BindSlot, BindStyle};
use crate::bindings::resource::ResourceId;
use crate::bindings::visible_to::Consumer;
use crate::dispatch::{DispatchPlan, WorkGroupShape};
use crate::error::Result;
use crate::images::engine::{ComputeEngine, SampledImage, Settled};
use crate::imp::Backend;
use crate::pixel_formats::PixelFormat;

/// Slot of the accumulation image.
pub const TARGET_SLOT: BindSlot = BindSlot::new(0);
/// Slot of the [`RenderUniforms`] buffer.
pub const UNIFORM_SLOT: BindSlot = BindSlot::new(1);

const MIN_ZOOM: f32 = 1.0;
const MAX_ZOOM: f32 = 45.0;

/// Camera placement.  Angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewParams {
    pub position: [f32; 3],
    pub yaw: f32,
    pub pitch: f32,
    /// Vertical field of view.
    pub zoom: f32,
}

impl Default for ViewParams {
    fn default() -> Self {
        Self {
            position: [1.0, 2.0, 7.0],
            yaw: -90.0,
            pitch: 0.0,
            zoom: MAX_ZOOM,
        }
    }
}

/// Something that invalidates the accumulated estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// The camera moved or turned.
    CameraMoved {
        position: [f32; 3],
        yaw: f32,
        pitch: f32,
    },
    /// A scene parameter changed.  Zoom is clamped to `1..=45` degrees.
    ParameterChanged { zoom: f32 },
    /// The viewport changed size.  The target image is reallocated.
    Resized { width: u32, height: u32 },
}

/// Uniform block written before each accumulation dispatch.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RenderUniforms {
    pub accumulation: AccumulationUniforms,
    pub viewport: [u32; 2],
    /// `w` unused.
    pub position: [f32; 4],
    /// yaw, pitch, zoom; `w` unused.
    pub orientation: [f32; 4],
}

pub struct RenderContext<B: Backend> {
    engine: ComputeEngine<B>,
    accumulation: AccumulationState,
    view: ViewParams,
    viewport: (u32, u32),
    target: ResourceId,
    uniforms: ResourceId,
    shape: WorkGroupShape,
    plan: DispatchPlan,
}

impl<B: Backend> RenderContext<B> {
    /// Creates the accumulation image and the uniform buffer and selects `program`.
    pub fn new(
        mut engine: ComputeEngine<B>,
        program: B::Program,
        viewport: (u32, u32),
        format: PixelFormat,
        shape: WorkGroupShape,
    ) -> Result<Self> {
        let (width, height) = viewport;
        let target = engine.create_image("accumulation", width, height, format)?;
        let uniforms =
            engine.create_buffer("frame uniforms", size_of::<RenderUniforms>(), None)?;
        engine.use_program(program);
        let plan = engine.plan(width, height, 1, shape)?;
        Ok(Self {
            engine,
            accumulation: AccumulationState::new(),
            view: ViewParams::default(),
            viewport,
            target,
            uniforms,
            shape,
            plan,
        })
    }

    pub fn engine(&self) -> &ComputeEngine<B> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ComputeEngine<B> {
        &mut self.engine
    }

    pub fn accumulation(&self) -> AccumulationState {
        self.accumulation
    }

    pub fn view(&self) -> ViewParams {
        self.view
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// The accumulation image.
    pub fn target(&self) -> ResourceId {
        self.target
    }

    pub fn plan(&self) -> &DispatchPlan {
        &self.plan
    }

    /// Applies an input event.  Every event restarts convergence.
    pub fn handle(&mut self, event: InputEvent) -> Result<()> {
        match event {
            InputEvent::CameraMoved {
                position,
                yaw,
                pitch,
            } => {
                self.view.position = position;
                self.view.yaw = yaw;
                self.view.pitch = pitch.clamp(-89.0, 89.0);
            }
            InputEvent::ParameterChanged { zoom } => {
                self.view.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
            }
            InputEvent::Resized { width, height } => {
                let plan = self.engine.plan(width, height, 1, self.shape)?;
                self.engine.resize_image(self.target, width, height)?;
                self.viewport = (width, height);
                self.plan = plan;
                logwise::info_sync!(
                    "viewport resized to {width}x{height}",
                    width = width,
                    height = height
                );
            }
        }
        self.accumulation.invalidate();
        Ok(())
    }

    /// Uniforms for the next dispatch.
    pub fn frame_uniforms(&self) -> RenderUniforms {
        let [x, y, z] = self.view.position;
        RenderUniforms {
            accumulation: self.accumulation.uniforms(),
            viewport: [self.viewport.0, self.viewport.1],
            position: [x, y, z, 0.0],
            orientation: [self.view.yaw, self.view.pitch, self.view.zoom, 0.0],
        }
    }

    /// Runs one accumulation frame.
    ///
    /// The barrier always covers [`Consumer::ComputeRead`], since the next frame reads the
    /// image back; `consumers` adds whoever else looks at it (sampling for display,
    /// host readback for capture).
    pub fn accumulate(&mut self, consumers: &[Consumer]) -> Result<Settled> {
        let uniforms = self.frame_uniforms();
        self.engine
            .write_buffer(self.uniforms, 0, bytemuck::bytes_of(&uniforms))?;

        let mut style = BindStyle::new();
        style.bind_compute(TARGET_SLOT, self.target, Access::ReadWrite)?;
        style.bind_compute(UNIFORM_SLOT, self.uniforms, Access::Read)?;

        let mut all = vec![Consumer::ComputeRead];
        all.extend(consumers.iter().copied().filter(|c| *c != Consumer::ComputeRead));

        let settled = self.engine.dispatch(&self.plan, &style)?.barrier_many(&all)?;
        self.accumulation.advance(&settled);
        self.engine.end_frame();
        Ok(settled)
    }

    /// Hands the accumulation image to the display pass.
    pub fn present(&mut self) -> Result<SampledImage> {
        self.engine.sample(self.target)
    }

    /// Releases the image and buffer and returns the engine.
    pub fn into_engine(mut self) -> Result<ComputeEngine<B>> {
        self.engine.destroy(self.target)?;
        self.engine.destroy(self.uniforms)?;
        Ok(self.engine)
    }
}
