// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! dispatch_and_barriers orchestrates GPU compute work: it owns the resources, binds
them to dispatches, sizes the dispatch grid, and places the memory barriers between
a dispatch and whoever reads its results next.

Compute-heavy image work tends to repeat a few shapes:

| Pattern                | Examples                      | Resources                          | Barrier after each dispatch       |
|------------------------|-------------------------------|------------------------------------|-----------------------------------|
| Iterative filter       | median, blur, diffusion       | ping-pong buffers or images        | compute read (+ host for capture) |
| Progressive renderer   | path tracing                  | one read-write accumulation image  | compute read + shader sample      |
| Single-pass generator  | ray casting, splatting        | one write-only image               | shader sample                     |

The engine covers all three with the same few parts:

* [`bindings::resource::Registry`] hands out opaque [`bindings::resource::ResourceId`]s
  and validates every creation request.
* [`multibuffer::PingPong`] resolves logical input/output roles to physical resources
  from the frame parity, so no caller ever swaps handles by hand.
* [`dispatch::plan`] computes ceiling-divided group counts for a problem size.
* [`images::engine::ComputeEngine::dispatch`] returns a `#[must_use]` token whose only
  useful operation is issuing the barrier, which makes "dispatch, then barrier" the
  path of least resistance.  The barrier scope is derived from how the data was
  written and who reads it next; see [`barrier`].
* [`accumulation::AccumulationState`] can only advance with proof that a frame's
  barrier was issued.
* [`readback`] maps settled resources for the host and exports RGBA8 frames.

# Backends

The [`imp::software::SoftwareBackend`] runs kernels on the calling thread and records
every barrier it is asked to issue, which is what the tests inspect.  The
`backend_wgpu` feature adds [`imp`]`::wgpu`, running WGSL on any adapter wgpu supports.

# Validation

With [`images::engine::EngineConfig::validation`] on (the default in debug builds),
a dispatch that reads a resource whose last write was not followed by a sufficient
barrier fails with [`Error::BarrierOmitted`] instead of racing.  Host readback and
sampling are always checked.  Recorded command logs can be checked after the fact
with [`images::command_log::validate`].
*/

pub mod accumulation;
pub mod barrier;
pub mod bindings;
pub mod dispatch;
mod error;
pub mod images;
pub mod imp;
pub mod multibuffer;
pub mod pixel_formats;
pub mod readback;

pub use error::{Error, Result};
