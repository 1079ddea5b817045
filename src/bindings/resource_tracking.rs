// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Write/visibility tracking per resource.
//!
//! Each resource carries a small state record:
//!
//! - `last_write`: the dispatch that most recently wrote it, if it has not been
//!   superseded by a host upload or resize
//! - `visible`: the union of barrier scopes issued since that write
//! - `barriered`: whether a barrier has already been issued for that write
//!
//! Transitions:
//!
//! - dispatch write: `last_write = Some(n)`, `visible = NONE`, `barriered = false`
//! - host upload or resize: `last_write = None`, `visible = NONE`
//! - barrier: `visible |= scope`, `barriered = true`; a second barrier for the same
//!   write is reported as redundant
//!
//! The same tracker drives the engine at runtime and the command-log validator after
//! the fact, so both agree on what "sufficient" means.

use crate::barrier::{BarrierScope, barrier_after};
use crate::bindings::resource::ResourceId;
use crate::bindings::visible_to::{Consumer, WriteKind};
use crate::error::{Error, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResourceState {
    kind: WriteKind,
    last_write: Option<u64>,
    visible: BarrierScope,
    barriered: bool,
}

impl ResourceState {
    fn new(kind: WriteKind) -> Self {
        Self {
            kind,
            last_write: None,
            visible: BarrierScope::NONE,
            barriered: false,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct ResourceTracker {
    states: HashMap<ResourceId, ResourceState>,
}

impl ResourceTracker {
    pub(crate) fn register(&mut self, id: ResourceId, kind: WriteKind) {
        self.states.insert(id, ResourceState::new(kind));
    }

    pub(crate) fn forget(&mut self, id: ResourceId) {
        self.states.remove(&id);
    }

    pub(crate) fn ensure_known(&self, id: ResourceId) -> Result<()> {
        if self.states.contains_key(&id) {
            Ok(())
        } else {
            Err(Error::UnknownResource(id))
        }
    }

    fn state_mut(&mut self, id: ResourceId) -> Result<&mut ResourceState> {
        self.states.get_mut(&id).ok_or(Error::UnknownResource(id))
    }

    pub(crate) fn record_write(&mut self, id: ResourceId, dispatch: u64) {
        if let Some(state) = self.states.get_mut(&id) {
            state.last_write = Some(dispatch);
            state.visible = BarrierScope::NONE;
            state.barriered = false;
        }
    }

    pub(crate) fn record_host_write(&mut self, id: ResourceId) {
        if let Some(state) = self.states.get_mut(&id) {
            *state = ResourceState::new(state.kind);
        }
    }

    /// Fails unless `id` has a write still waiting for its barrier.
    pub(crate) fn check_barrier(&self, id: ResourceId) -> Result<()> {
        let state = self.states.get(&id).ok_or(Error::UnknownResource(id))?;
        if state.last_write.is_none() || state.barriered {
            return Err(Error::RedundantBarrier { resource: id });
        }
        Ok(())
    }

    pub(crate) fn record_barrier(&mut self, id: ResourceId, scope: BarrierScope) -> Result<()> {
        self.check_barrier(id)?;
        let state = self.state_mut(id)?;
        state.visible |= scope;
        state.barriered = true;
        Ok(())
    }

    /// Whether `consumer` may read `id` now.
    ///
    /// Host readback always needs a host-reaching barrier since the last change of
    /// contents.  Device-side consumers only need one if a dispatch wrote the resource.
    pub(crate) fn check(&self, id: ResourceId, consumer: Consumer) -> Result<()> {
        let state = self.states.get(&id).ok_or(Error::UnknownResource(id))?;
        let required = barrier_after(state.kind, consumer);
        match consumer {
            Consumer::HostReadback if !state.visible.contains(required) => {
                Err(Error::ReadbackStale { resource: id })
            }
            Consumer::ComputeRead | Consumer::ShaderSample
                if state.last_write.is_some() && !state.visible.contains(required) =>
            {
                Err(Error::BarrierOmitted {
                    resource: id,
                    consumer,
                })
            }
            _ => Ok(()),
        }
    }

    #[cfg(test)]
    pub(crate) fn last_write(&self, id: ResourceId) -> Option<u64> {
        self.states.get(&id).and_then(|s| s.last_write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_readback_needs_a_host_barrier() {
        let id = ResourceId::for_testing(90);
        let mut t = ResourceTracker::default();
        t.register(id, WriteKind::StorageBuffer);
        assert!(matches!(
            t.check(id, Consumer::HostReadback),
            Err(Error::ReadbackStale { .. })
        ));
        t.record_write(id, 3);
        t.record_barrier(id, BarrierScope::SHADER_STORAGE).unwrap();
        assert!(matches!(
            t.check(id, Consumer::HostReadback),
            Err(Error::ReadbackStale { .. })
        ));
        assert!(t.check(id, Consumer::ComputeRead).is_ok());
    }

    #[test]
    fn second_barrier_for_one_write_is_redundant() {
        let id = ResourceId::for_testing(91);
        let mut t = ResourceTracker::default();
        t.register(id, WriteKind::StorageImage);
        assert!(matches!(
            t.record_barrier(id, BarrierScope::ALL),
            Err(Error::RedundantBarrier { .. })
        ));
        t.record_write(id, 0);
        t.record_barrier(id, BarrierScope::TEXTURE_FETCH).unwrap();
        assert!(t.record_barrier(id, BarrierScope::TEXTURE_FETCH).is_err());
        t.record_write(id, 1);
        assert!(t.record_barrier(id, BarrierScope::TEXTURE_FETCH).is_ok());
        assert_eq!(t.last_write(id), Some(1));
    }

    #[test]
    fn host_upload_needs_no_device_barrier() {
        let id = ResourceId::for_testing(92);
        let mut t = ResourceTracker::default();
        t.register(id, WriteKind::StorageBuffer);
        t.record_write(id, 0);
        assert!(t.check(id, Consumer::ComputeRead).is_err());
        t.record_host_write(id);
        assert!(t.check(id, Consumer::ComputeRead).is_ok());
        assert!(t.check(id, Consumer::HostReadback).is_err());
    }
}
