// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Memory-visibility barriers.
//!
//! A barrier makes the writes of one dispatch visible to a later consumer.  Which barrier
//! is sufficient depends on how the data was produced and who reads it next:
//!
//! | producer        | compute read          | shader sample     | host readback     |
//! |-----------------|-----------------------|-------------------|-------------------|
//! | storage buffer  | `SHADER_STORAGE`      | `TEXTURE_FETCH`   | `BUFFER_UPDATE`   |
//! | storage image   | `SHADER_IMAGE_ACCESS` | `TEXTURE_FETCH`   | `TEXTURE_UPDATE`  |
//!
//! [`BarrierPolicy::Coarse`] ignores the table and always issues [`BarrierScope::ALL`].
//!
//! The [`BarrierScheduler`] is the engine's runtime half of the bookkeeping; the static
//! half is [`crate::images::command_log::validate`].

use crate::bindings::resource::ResourceId;
use crate::bindings::resource_tracking::ResourceTracker;
use crate::bindings::visible_to::{Consumer, WriteKind};
use crate::error::Result;
use std::fmt::{Debug, Formatter};
use std::ops::{BitOr, BitOrAssign};

/// A set of memory-visibility bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BarrierScope(u32);

impl BarrierScope {
    pub const NONE: BarrierScope = BarrierScope(0);
    /// Storage-buffer reads by later shaders.
    pub const SHADER_STORAGE: BarrierScope = BarrierScope(1 << 0);
    /// Storage-image loads and stores by later shaders.
    pub const SHADER_IMAGE_ACCESS: BarrierScope = BarrierScope(1 << 1);
    /// Texture fetches, including fragment-stage sampling.
    pub const TEXTURE_FETCH: BarrierScope = BarrierScope(1 << 2);
    /// Host-side buffer reads and updates.
    pub const BUFFER_UPDATE: BarrierScope = BarrierScope(1 << 3);
    /// Host-side texture reads and updates.
    pub const TEXTURE_UPDATE: BarrierScope = BarrierScope(1 << 4);
    pub const ALL: BarrierScope = BarrierScope(0b1_1111);

    const NAMES: [(BarrierScope, &'static str); 5] = [
        (Self::SHADER_STORAGE, "SHADER_STORAGE"),
        (Self::SHADER_IMAGE_ACCESS, "SHADER_IMAGE_ACCESS"),
        (Self::TEXTURE_FETCH, "TEXTURE_FETCH"),
        (Self::BUFFER_UPDATE, "BUFFER_UPDATE"),
        (Self::TEXTURE_UPDATE, "TEXTURE_UPDATE"),
    ];

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: BarrierScope) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when the scope makes data visible to the host.
    pub const fn reaches_host(self) -> bool {
        self.0 & (Self::BUFFER_UPDATE.0 | Self::TEXTURE_UPDATE.0) != 0
    }
}

impl BitOr for BarrierScope {
    type Output = BarrierScope;
    fn bitor(self, rhs: Self) -> Self::Output {
        BarrierScope(self.0 | rhs.0)
    }
}

impl BitOrAssign for BarrierScope {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl Debug for BarrierScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let mut first = true;
        for (bit, name) in Self::NAMES {
            if self.contains(bit) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// The minimal scope sufficient for `consumer` to observe a write of kind `producer`.
pub const fn barrier_after(producer: WriteKind, consumer: Consumer) -> BarrierScope {
    match (producer, consumer) {
        (WriteKind::StorageBuffer, Consumer::ComputeRead) => BarrierScope::SHADER_STORAGE,
        (WriteKind::StorageImage, Consumer::ComputeRead) => BarrierScope::SHADER_IMAGE_ACCESS,
        (_, Consumer::ShaderSample) => BarrierScope::TEXTURE_FETCH,
        (WriteKind::StorageBuffer, Consumer::HostReadback) => BarrierScope::BUFFER_UPDATE,
        (WriteKind::StorageImage, Consumer::HostReadback) => BarrierScope::TEXTURE_UPDATE,
    }
}

/// How wide the issued barriers are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarrierPolicy {
    /// Issue exactly the bits each consumer needs.
    #[default]
    Minimal,
    /// Always issue every bit.
    Coarse,
}

impl BarrierPolicy {
    pub fn scope_for(self, producer: WriteKind, consumers: &[Consumer]) -> BarrierScope {
        match self {
            BarrierPolicy::Coarse => BarrierScope::ALL,
            BarrierPolicy::Minimal => consumers
                .iter()
                .fold(BarrierScope::NONE, |acc, c| acc | barrier_after(producer, *c)),
        }
    }
}

/// Runtime barrier bookkeeping for one engine.
#[derive(Debug)]
pub struct BarrierScheduler {
    policy: BarrierPolicy,
    validation: bool,
    tracker: ResourceTracker,
}

impl BarrierScheduler {
    pub fn new(policy: BarrierPolicy, validation: bool) -> Self {
        Self {
            policy,
            validation,
            tracker: ResourceTracker::default(),
        }
    }

    pub fn policy(&self) -> BarrierPolicy {
        self.policy
    }

    #[cfg(test)]
    pub(crate) fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    pub(crate) fn register(&mut self, id: ResourceId, kind: WriteKind) {
        self.tracker.register(id, kind);
    }

    pub(crate) fn forget(&mut self, id: ResourceId) {
        self.tracker.forget(id);
    }

    pub(crate) fn record_write(&mut self, id: ResourceId, dispatch: u64) {
        self.tracker.record_write(id, dispatch);
    }

    pub(crate) fn record_host_write(&mut self, id: ResourceId) {
        self.tracker.record_host_write(id);
    }

    /// Checks a read made as part of a dispatch.  Only enforced with validation on.
    pub(crate) fn check(&self, id: ResourceId, consumer: Consumer) -> Result<()> {
        if self.validation {
            self.tracker.check(id, consumer)
        } else {
            Ok(())
        }
    }

    /// Checks a read regardless of validation.  Used for readback and sampling, whose
    /// preconditions are mandatory.
    pub(crate) fn require(&self, id: ResourceId, consumer: Consumer) -> Result<()> {
        self.tracker.check(id, consumer)
    }

    /// The single scope that settles the writes of one dispatch for every listed
    /// consumer.  Nothing is recorded; fails if any write already had its barrier.
    pub(crate) fn scope_for(
        &self,
        writes: &[(ResourceId, WriteKind)],
        consumers: &[Consumer],
    ) -> Result<BarrierScope> {
        let mut scope = BarrierScope::NONE;
        for (id, kind) in writes {
            self.tracker.check_barrier(*id)?;
            scope |= self.policy.scope_for(*kind, consumers);
        }
        Ok(scope)
    }

    /// Records that `scope` was issued for the writes.  Call only after the backend
    /// accepted the barrier.
    pub(crate) fn settle(
        &mut self,
        writes: &[(ResourceId, WriteKind)],
        scope: BarrierScope,
    ) -> Result<()> {
        for (id, _) in writes {
            self.tracker.record_barrier(*id, scope)?;
        }
        logwise::trace_sync!(
            "settled {count} writes with {scope}",
            count = writes.len(),
            scope = logwise::privacy::LogIt(&scope)
        );
        Ok(())
    }
}
