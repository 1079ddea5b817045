// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Backend seam.
//!
//! The engine's bookkeeping is backend-independent; everything that touches device
//! memory goes through [`Backend`].  The software backend is always available and is
//! what the tests run against.  The wgpu backend is behind the `backend_wgpu` feature.

use crate::barrier::BarrierScope;
use crate::bindings::coordinator::ResolvedBinding;
use crate::bindings::resource::ResourceId;
use crate::dispatch::DispatchPlan;
use crate::pixel_formats::PixelFormat;
use std::fmt::Debug;
use std::ops::Deref;

pub mod software;

#[cfg(feature = "backend_wgpu")]
pub mod wgpu;

/// Implementation error reported by a backend.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("backend has no storage for {0}")]
    MissingStorage(ResourceId),
    #[error("{0} has not been made host-visible")]
    NotHostVisible(ResourceId),
    #[error("write of {len} bytes at offset {offset} overruns {resource}")]
    WriteOutOfBounds {
        resource: ResourceId,
        offset: usize,
        len: usize,
    },
    #[error("program expects a binding at slot {0}")]
    MissingBinding(u32),
    #[cfg(feature = "backend_wgpu")]
    #[error("no suitable adapter")]
    NoSuchAdapter,
    #[cfg(feature = "backend_wgpu")]
    #[error(transparent)]
    RequestDevice(#[from] ::wgpu::RequestDeviceError),
    #[cfg(feature = "backend_wgpu")]
    #[error("buffer map failed: {0}")]
    Map(#[from] ::wgpu::BufferAsyncError),
    #[cfg(feature = "backend_wgpu")]
    #[error("device poll failed: {0}")]
    Poll(#[from] ::wgpu::PollError),
    #[cfg(feature = "backend_wgpu")]
    #[error("{0:?} cannot back a storage image on this device")]
    NotStorageFormat(PixelFormat),
    #[cfg(feature = "backend_wgpu")]
    #[error("program {label} failed to compile: {message}")]
    Shader { label: String, message: String },
    #[cfg(feature = "backend_wgpu")]
    #[error("write of {len} bytes at offset {offset} into {resource} is not 4-byte aligned")]
    UnalignedWrite {
        resource: ResourceId,
        offset: usize,
        len: usize,
    },
}

/// Device operations the engine needs.
///
/// Calls arrive in program order.  `dispatch` and `barrier` are only submissions;
/// completion is observed through `map_read`.
pub trait Backend {
    /// Opaque handle to a compiled compute program.
    type Program: Clone + Debug;

    /// Host-visible bytes of a resource.  Dropping the value releases the mapping.
    type Mapped<'a>: Deref<Target = [u8]>
    where
        Self: 'a;

    fn label(&self) -> &str;

    fn supports_storage_format(&self, format: PixelFormat) -> bool;

    fn max_image_dimension(&self) -> u32;

    /// Largest buffer, in bytes, that can still be bound as storage.
    fn max_buffer_size(&self) -> u64;

    fn max_groups_per_dimension(&self) -> u32;

    fn create_buffer(
        &mut self,
        id: ResourceId,
        label: &str,
        byte_len: usize,
        initial_data: Option<&[u8]>,
    ) -> Result<(), Error>;

    fn create_image(
        &mut self,
        id: ResourceId,
        label: &str,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), Error>;

    /// Replaces the backing storage of an image.  Contents are not preserved.
    fn resize_image(&mut self, id: ResourceId, width: u32, height: u32) -> Result<(), Error>;

    fn destroy(&mut self, id: ResourceId);

    fn write_buffer(&mut self, id: ResourceId, offset: usize, bytes: &[u8]) -> Result<(), Error>;

    fn dispatch(
        &mut self,
        program: &Self::Program,
        plan: &DispatchPlan,
        bindings: &[ResolvedBinding],
    ) -> Result<(), Error>;

    /// Makes prior writes to `resources` visible within `scope`.
    fn barrier(&mut self, scope: BarrierScope, resources: &[ResourceId]) -> Result<(), Error>;

    /// Maps a resource made host-visible by an earlier barrier.
    fn map_read(
        &self,
        id: ResourceId,
    ) -> impl Future<Output = Result<Self::Mapped<'_>, Error>>;

    fn end_frame(&mut self) {}
}
