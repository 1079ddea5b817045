// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Platform-independent error type.
//!
//! Every error in this crate is a deterministic logic error rather than a transient
//! condition, so nothing here is retried.  Resource creation and binding errors
//! surface immediately to the caller; setup code is expected to report them and abort.

use crate::bindings::bind_style::BindSlot;
use crate::bindings::resource::ResourceId;
use crate::bindings::visible_to::Consumer;
use crate::imp;

/// Errors produced by the orchestration engine.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A malformed creation request: zero size, mismatched initial data, or a pixel
    /// format the backend cannot use as a storage image.
    #[error("invalid resource spec: {0}")]
    InvalidResourceSpec(String),

    /// The same physical resource was bound as both a read source and a write target
    /// (or as two write targets) within one dispatch, or a ping-pong pair was built
    /// from one resource twice.
    #[error("aliasing violation on {resource}: {detail}")]
    AliasingViolation { resource: ResourceId, detail: String },

    /// Two different resources, or one resource with conflicting access modes,
    /// were requested for the same slot.
    #[error("conflicting bindings requested for {slot:?}")]
    SlotConflict { slot: BindSlot },

    /// A resource written by an earlier dispatch was consumed without a barrier
    /// sufficient for that consumer.
    #[error("barrier omitted: {resource} read by {consumer:?} without a sufficient barrier")]
    BarrierOmitted {
        resource: ResourceId,
        consumer: Consumer,
    },

    /// A barrier was issued for a resource with no unsettled write.  Only reported
    /// by the command-log validator.
    #[error("redundant barrier for {resource}: no write since the previous barrier")]
    RedundantBarrier { resource: ResourceId },

    /// Host readback was requested without a preceding host-visibility barrier.
    #[error("readback of {resource} is stale: no host-visibility barrier since its last write")]
    ReadbackStale { resource: ResourceId },

    /// The handle does not name a live resource.
    #[error("unknown resource {0}")]
    UnknownResource(ResourceId),

    /// A dispatch plan that cannot be issued (zero work-group shape, too many groups).
    #[error("invalid dispatch: {0}")]
    InvalidDispatch(String),

    /// A dispatch was issued before any program was selected.
    #[error("no program selected for dispatch")]
    NoProgram,

    /// Implementation error reported by the backend.
    #[error("implementation error {0}")]
    Backend(#[from] imp::Error),
}

impl Error {
    pub(crate) fn invalid_spec(msg: impl Into<String>) -> Self {
        Self::InvalidResourceSpec(msg.into())
    }

    pub(crate) fn invalid_dispatch(msg: impl Into<String>) -> Self {
        Self::InvalidDispatch(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
