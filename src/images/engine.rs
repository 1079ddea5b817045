// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The compute orchestration engine.
//!
//! [`ComputeEngine`] owns the resource registry, the binding coordinator, the barrier
//! scheduler and a backend.  One control thread drives it; every call is submitted to
//! the backend in program order.
//!
//! # Dispatch and barrier
//!
//! [`ComputeEngine::dispatch`] returns a [`Written`] token that mutably borrows the
//! engine.  Nothing else can be done with the engine until the token's barrier is issued
//! (or the token is dropped, which is logged as an error and leaves the writes
//! unsettled).  The barrier is therefore always the call immediately following its
//! dispatch:
//!
//! ```
//! use dispatch_and_barriers::bindings::bind_style::{BindSlot, BindStyle};
//! use dispatch_and_barriers::bindings::visible_to::Consumer;
//! use dispatch_and_barriers::dispatch::WorkGroupShape;
//! use dispatch_and_barriers::images::engine::{ComputeEngine, EngineConfig};
//! use dispatch_and_barriers::imp::software::SoftwareProgram;
//!
//! let mut engine = ComputeEngine::new(
//!     dispatch_and_barriers::imp::software::SoftwareBackend::new("doc"),
//!     EngineConfig::default(),
//! );
//! let pair = engine.create_ping_pong_buffers("values", 4 * 16, None).unwrap();
//! engine.use_program(SoftwareProgram::from_fn("increment", |inv, io| {
//!     let i = inv.x() as usize;
//!     if i < 16 {
//!         let v = io.f32s(0)[i];
//!         io.f32s_mut(1)[i] = v + 1.0;
//!     }
//! }));
//! let plan = engine.plan(16, 1, 1, WorkGroupShape::SIZE_64).unwrap();
//! for _ in 0..3 {
//!     let mut style = BindStyle::new();
//!     style.bind_ping_pong(&pair, engine.parity(), BindSlot::new(0), BindSlot::new(1)).unwrap();
//!     engine
//!         .dispatch(&plan, &style)
//!         .unwrap()
//!         .barrier_many(&[Consumer::ComputeRead, Consumer::HostReadback])
//!         .unwrap();
//!     engine.end_frame();
//! }
//! // three frames: even, odd, even.  The last output was the second buffer.
//! let (_, b) = pair.resources();
//! let view = test_executors::sleep_on(engine.read(b)).unwrap();
//! assert!(view.to_f32_vec().iter().all(|f| *f == 3.0));
//! ```

use crate::barrier::{BarrierPolicy, BarrierScheduler, BarrierScope};
use crate::bindings::bind_style::BindStyle;
use crate::bindings::coordinator::BindingCoordinator;
use crate::bindings::resource::{GpuResource, Registry, ResourceDesc, ResourceId};
use crate::bindings::visible_to::{Consumer, WriteKind};
use crate::dispatch::{DispatchPlan, WorkGroupShape, plan};
use crate::error::{Error, Result};
use crate::images::command_log::{self, Command};
use crate::imp::Backend;
use crate::multibuffer::{FrameParity, PingPong};
use crate::pixel_formats::PixelFormat;
use crate::readback::ReadView;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// How wide issued barriers are.
    pub barrier_policy: BarrierPolicy,
    /// Check every dispatch's reads against outstanding writes and fail with
    /// [`Error::BarrierOmitted`].  Readback and sampling are always checked.
    pub validation: bool,
    /// Keep a [`Command`] log for [`command_log::validate`].
    pub record_commands: bool,
    pub debug_label: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            barrier_policy: BarrierPolicy::Minimal,
            validation: cfg!(debug_assertions),
            record_commands: false,
            debug_label: "engine".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn with_barrier_policy(mut self, policy: BarrierPolicy) -> Self {
        self.barrier_policy = policy;
        self
    }

    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_record_commands(mut self, record: bool) -> Self {
        self.record_commands = record;
        self
    }

    pub fn with_debug_label(mut self, label: &str) -> Self {
        self.debug_label = label.to_string();
        self
    }
}

/// Proof that one dispatch's writes were settled by a barrier.
#[derive(Debug, Clone, PartialEq)]
pub struct Settled {
    dispatch: u64,
    scope: BarrierScope,
    consumers: Vec<Consumer>,
}

impl Settled {
    pub fn dispatch_index(&self) -> u64 {
        self.dispatch
    }

    /// The scope actually issued.
    pub fn scope(&self) -> BarrierScope {
        self.scope
    }

    pub fn consumers(&self) -> &[Consumer] {
        &self.consumers
    }

    #[cfg(test)]
    pub(crate) fn for_testing() -> Self {
        Self {
            dispatch: 0,
            scope: BarrierScope::ALL,
            consumers: vec![Consumer::ComputeRead],
        }
    }
}

/// The outstanding writes of a dispatch.  Issue its barrier before doing anything else.
#[must_use = "a dispatch's writes are invisible to every consumer until its barrier is issued"]
pub struct Written<'e, B: Backend> {
    engine: &'e mut ComputeEngine<B>,
    dispatch: u64,
    writes: Vec<(ResourceId, WriteKind)>,
    settled: bool,
}

impl<B: Backend> Written<'_, B> {
    pub fn dispatch_index(&self) -> u64 {
        self.dispatch
    }

    /// Resources the dispatch wrote.
    pub fn writes(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.writes.iter().map(|(id, _)| *id)
    }

    /// Issues the barrier for one consumer class.
    pub fn barrier(self, consumer: Consumer) -> Result<Settled> {
        self.barrier_many(&[consumer])
    }

    /// Issues a single barrier sufficient for every listed consumer.
    ///
    /// Each write gets exactly one barrier, so list every consumer that will read the
    /// results before the next write.
    pub fn barrier_many(mut self, consumers: &[Consumer]) -> Result<Settled> {
        if consumers.is_empty() {
            return Err(Error::invalid_dispatch(
                "a barrier needs at least one consumer",
            ));
        }
        self.settled = true;
        let writes = std::mem::take(&mut self.writes);
        self.engine.settle(self.dispatch, &writes, consumers)
    }
}

impl<B: Backend> Drop for Written<'_, B> {
    fn drop(&mut self) {
        if !self.settled && !self.writes.is_empty() {
            logwise::error_sync!(
                "dispatch {dispatch} dropped without a barrier; its {count} writes stay unsettled",
                dispatch = self.dispatch,
                count = self.writes.len()
            );
        }
    }
}

/// A settled image handed to the rasterization stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampledImage {
    resource: ResourceId,
    width: u32,
    height: u32,
    format: PixelFormat,
    frame: u64,
}

impl SampledImage {
    pub fn resource(&self) -> ResourceId {
        self.resource
    }
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
    pub fn format(&self) -> PixelFormat {
        self.format
    }
    /// Frame the image was handed over in.
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

pub struct ComputeEngine<B: Backend> {
    backend: B,
    config: EngineConfig,
    registry: Registry,
    coordinator: BindingCoordinator,
    scheduler: BarrierScheduler,
    program: Option<B::Program>,
    frame: u64,
    dispatches: u64,
    commands: Vec<Command>,
}

impl<B: Backend> ComputeEngine<B> {
    pub fn new(backend: B, config: EngineConfig) -> Self {
        logwise::info_sync!(
            "engine {label} on backend {backend}",
            label = config.debug_label.clone(),
            backend = backend.label().to_string()
        );
        Self {
            scheduler: BarrierScheduler::new(config.barrier_policy, config.validation),
            backend,
            config,
            registry: Registry::new(),
            coordinator: BindingCoordinator::new(),
            program: None,
            frame: 0,
            dispatches: 0,
            commands: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn coordinator(&self) -> &BindingCoordinator {
        &self.coordinator
    }

    /// Frames completed via [`Self::end_frame`].
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn parity(&self) -> FrameParity {
        FrameParity::of(self.frame)
    }

    pub fn dispatch_count(&self) -> u64 {
        self.dispatches
    }

    fn record(&mut self, command: Command) {
        if self.config.record_commands {
            self.commands.push(command);
        }
    }

    fn register(&mut self, id: ResourceId) -> Result<()> {
        let desc = self.registry.get(id)?.desc();
        self.scheduler.register(id, desc.write_kind());
        self.record(Command::Create { resource: id, desc });
        Ok(())
    }

    pub fn create_buffer(
        &mut self,
        label: &str,
        byte_size: usize,
        initial_data: Option<&[u8]>,
    ) -> Result<ResourceId> {
        let id = self
            .registry
            .create_buffer(&mut self.backend, label, byte_size, initial_data)?;
        self.register(id)?;
        Ok(id)
    }

    pub fn create_image(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<ResourceId> {
        let id = self
            .registry
            .create_image(&mut self.backend, label, width, height, format)?;
        self.register(id)?;
        Ok(id)
    }

    /// Creates two equally sized buffers, both holding `initial_data`, as a pair.
    pub fn create_ping_pong_buffers(
        &mut self,
        label: &str,
        byte_size: usize,
        initial_data: Option<&[u8]>,
    ) -> Result<PingPong> {
        let a = self.create_buffer(&format!("{label}.a"), byte_size, initial_data)?;
        let b = self.create_buffer(&format!("{label}.b"), byte_size, initial_data)?;
        PingPong::new(a, b)
    }

    pub fn create_ping_pong_images(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<PingPong> {
        let a = self.create_image(&format!("{label}.a"), width, height, format)?;
        let b = self.create_image(&format!("{label}.b"), width, height, format)?;
        PingPong::new(a, b)
    }

    /// Reallocates an image at a new size.  Its contents and binding are discarded.
    pub fn resize_image(&mut self, id: ResourceId, width: u32, height: u32) -> Result<()> {
        self.registry
            .resize_image(&mut self.backend, id, width, height)?;
        self.scheduler.record_host_write(id);
        self.coordinator.forget(id);
        let desc = self.registry.get(id)?.desc();
        self.record(Command::Resize { resource: id, desc });
        Ok(())
    }

    pub fn destroy(&mut self, id: ResourceId) -> Result<()> {
        self.registry.destroy(&mut self.backend, id)?;
        self.scheduler.forget(id);
        self.coordinator.forget(id);
        self.record(Command::Destroy { resource: id });
        Ok(())
    }

    pub fn resource(&self, id: ResourceId) -> Result<&GpuResource> {
        self.registry.get(id)
    }

    /// Uploads host bytes into a buffer.  Later dispatches observe the upload without a
    /// barrier; host readback of the old contents becomes stale.
    pub fn write_buffer(&mut self, id: ResourceId, offset: usize, bytes: &[u8]) -> Result<()> {
        if self.registry.get(id)?.desc().is_image() {
            return Err(Error::invalid_spec(format!(
                "{id} is an image; host uploads go to buffers"
            )));
        }
        self.backend.write_buffer(id, offset, bytes)?;
        self.scheduler.record_host_write(id);
        self.record(Command::HostWrite { resource: id });
        Ok(())
    }

    /// Selects the program for subsequent dispatches.
    pub fn use_program(&mut self, program: B::Program) {
        logwise::trace_sync!(
            "use program {program}",
            program = logwise::privacy::LogIt(&program)
        );
        self.record(Command::UseProgram {
            program: format!("{program:?}"),
        });
        self.program = Some(program);
    }

    /// Plans a dispatch and checks it against the backend's group limit.
    pub fn plan(
        &self,
        width: u32,
        height: u32,
        depth: u32,
        shape: WorkGroupShape,
    ) -> Result<DispatchPlan> {
        let plan = plan(width, height, depth, shape)?;
        plan.check_limit(self.backend.max_groups_per_dimension())?;
        Ok(plan)
    }

    /// Binds `style`, submits the current program over `plan`, and returns the writes
    /// awaiting their barrier.
    ///
    /// Submission is ordered but completion is not awaited; consumers observe the writes
    /// only after the returned token's barrier.
    pub fn dispatch(&mut self, plan: &DispatchPlan, style: &BindStyle) -> Result<Written<'_, B>> {
        let program = self.program.as_ref().ok_or(Error::NoProgram)?;
        plan.check_limit(self.backend.max_groups_per_dimension())?;
        let resolved = self
            .coordinator
            .bind_for_dispatch(&mut self.registry, style)?;

        let reads: Vec<(ResourceId, Consumer)> = resolved
            .iter()
            .filter(|b| b.access.reads())
            .map(|b| (b.resource, Consumer::for_stage(b.stage)))
            .collect();
        for (id, consumer) in &reads {
            self.scheduler.check(*id, *consumer)?;
        }

        self.backend.dispatch(program, plan, &resolved)?;
        let index = self.dispatches;
        self.dispatches += 1;

        let writes: Vec<(ResourceId, WriteKind)> = resolved
            .iter()
            .filter(|b| b.access.writes())
            .map(|b| (b.resource, b.desc.write_kind()))
            .collect();
        for (id, _) in &writes {
            self.scheduler.record_write(*id, index);
        }
        logwise::trace_sync!(
            "dispatch {index} reads {reads} writes {writes}",
            index = index,
            reads = reads.len(),
            writes = writes.len()
        );
        self.record(Command::Dispatch {
            index,
            groups: plan.group_counts(),
            reads,
            writes: writes.clone(),
        });
        Ok(Written {
            engine: self,
            dispatch: index,
            writes,
            settled: false,
        })
    }

    fn settle(
        &mut self,
        dispatch: u64,
        writes: &[(ResourceId, WriteKind)],
        consumers: &[Consumer],
    ) -> Result<Settled> {
        let mut scope = BarrierScope::NONE;
        if !writes.is_empty() {
            scope = self.scheduler.scope_for(writes, consumers)?;
            let resources: Vec<ResourceId> = writes.iter().map(|(id, _)| *id).collect();
            self.backend.barrier(scope, &resources)?;
            self.scheduler.settle(writes, scope)?;
            self.record(Command::Barrier { scope, resources });
        }
        Ok(Settled {
            dispatch,
            scope,
            consumers: consumers.to_vec(),
        })
    }

    /// Hands an image to the rasterization stage.
    ///
    /// Fails with [`Error::BarrierOmitted`] unless the image's last write was settled for
    /// [`Consumer::ShaderSample`].
    pub fn sample(&mut self, id: ResourceId) -> Result<SampledImage> {
        let ResourceDesc::Image {
            width,
            height,
            format,
        } = self.registry.get(id)?.desc()
        else {
            return Err(Error::invalid_spec(format!(
                "{id} is a buffer; only images can be sampled"
            )));
        };
        self.scheduler.require(id, Consumer::ShaderSample)?;
        self.record(Command::Sample { resource: id });
        Ok(SampledImage {
            resource: id,
            width,
            height,
            format,
            frame: self.frame,
        })
    }

    /// Maps a resource for host readback.
    ///
    /// Fails with [`Error::ReadbackStale`] unless a host-visibility barrier was issued
    /// since the resource's contents last changed.  The view borrows the engine, so no
    /// further write can be submitted while it is alive.  This is the one call that may
    /// stall the host.
    pub async fn read(&mut self, id: ResourceId) -> Result<ReadView<'_, B>> {
        let desc = self.registry.get(id)?.desc();
        self.scheduler.require(id, Consumer::HostReadback)?;
        self.record(Command::Read { resource: id });
        let frame = self.frame;
        let stall = logwise::perfwarn_begin!("host readback");
        let mapped = self.backend.map_read(id).await?;
        drop(stall);
        Ok(ReadView::new(mapped, id, desc, frame))
    }

    /// Closes the current frame.  The frame counter drives [`Self::parity`].
    pub fn end_frame(&mut self) {
        self.backend.end_frame();
        self.frame += 1;
        self.record(Command::EndFrame { frame: self.frame });
    }

    /// Commands recorded so far; empty unless `record_commands` is set.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Runs [`command_log::validate`] over the recorded commands.
    pub fn validate_commands(&self) -> Result<()> {
        command_log::validate(&self.commands)
    }

    #[cfg(test)]
    pub(crate) fn last_write(&self, id: ResourceId) -> Option<u64> {
        self.scheduler.tracker().last_write(id)
    }
}

impl<B: Backend + std::fmt::Debug> std::fmt::Debug for ComputeEngine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeEngine")
            .field("label", &self.config.debug_label)
            .field("backend", &self.backend)
            .field("frame", &self.frame)
            .field("dispatches", &self.dispatches)
            .field("resources", &self.registry.len())
            .finish_non_exhaustive()
    }
}
