// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Producer and consumer declarations for memory visibility.
//!
//! A compute dispatch produces data in one of two ways ([`WriteKind`]) and that data is
//! consumed in one of three ways ([`Consumer`]).  The pair decides which barrier scope
//! is sufficient; see [`crate::barrier::barrier_after`].
//!
//! ```
//! use dispatch_and_barriers::bindings::visible_to::{Consumer, WriteKind};
//! use dispatch_and_barriers::barrier::{barrier_after, BarrierScope};
//!
//! let scope = barrier_after(WriteKind::StorageImage, Consumer::ShaderSample);
//! assert_eq!(scope, BarrierScope::TEXTURE_FETCH);
//! ```

use crate::bindings::bind_style::Stage;

/// How a dispatch wrote a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    /// Writes through a storage-buffer binding.
    StorageBuffer,
    /// Writes through a storage-image binding.
    StorageImage,
}

/// The class of operation that will next read a written resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Consumer {
    /// A subsequent compute dispatch reads the resource.
    ComputeRead,
    /// The rasterization stage samples the resource as a texture.
    ShaderSample,
    /// The host maps the resource for readback.
    HostReadback,
}

impl Consumer {
    /// The consumer class a binding at `stage` represents.
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Compute => Consumer::ComputeRead,
            Stage::FragmentSample => Consumer::ShaderSample,
        }
    }
}
