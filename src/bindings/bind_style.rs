// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Defines the way resources are bound for a dispatch.
//!
//! A `BindStyle` is a description, not an action: it records which resource should occupy
//! which slot, with which access, for one dispatch.  The
//! [`BindingCoordinator`](crate::bindings::coordinator::BindingCoordinator) resolves the
//! description against live resources when the dispatch is issued.
//!
//! # Key Concepts
//!
//! - **Bind Slots**: numbered binding locations matching the program's declarations
//! - **Access**: read, write or read-write for the current pass
//! - **Stages**: compute bindings, or fragment-stage sampling
//! - **Ping-pong roles**: callers of [`BindStyle::bind_ping_pong`] name the logical
//!   role of each slot and let the frame parity pick the physical resource
//!
//! # Example
//!
//! ```
//! use dispatch_and_barriers::bindings::bind_style::{Access, BindSlot, BindStyle};
//! use dispatch_and_barriers::imp::software::SoftwareBackend;
//! use dispatch_and_barriers::images::engine::{ComputeEngine, EngineConfig};
//! use dispatch_and_barriers::multibuffer::FrameParity;
//!
//! let mut engine = ComputeEngine::new(SoftwareBackend::new("doc"), EngineConfig::default());
//! let pair = engine.create_ping_pong_buffers("median", 64, None).unwrap();
//! let params = engine.create_buffer("params", 16, None).unwrap();
//!
//! let mut style = BindStyle::new();
//! style.bind_ping_pong(&pair, FrameParity::Even, BindSlot::new(0), BindSlot::new(1)).unwrap();
//! style.bind_compute(BindSlot::new(2), params, Access::Read).unwrap();
//! assert_eq!(style.len(), 3);
//! ```

use crate::bindings::resource::ResourceId;
use crate::error::{Error, Result};
use crate::multibuffer::{FrameParity, PingPong, Role};
use std::collections::BTreeMap;

/// A numbered binding location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindSlot {
    pub pass_index: u32,
}

impl BindSlot {
    pub const fn new(pass_index: u32) -> Self {
        Self { pass_index }
    }

    pub const fn index(self) -> u32 {
        self.pass_index
    }
}

/// Access mode of a binding for the current pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub const fn reads(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub const fn writes(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// Pipeline stage a binding is visible to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Compute,
    /// Sampled by the fragment stage.  Always read-only.
    FragmentSample,
}

/// A single requested binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindInfo {
    pub resource: ResourceId,
    pub access: Access,
    pub stage: Stage,
}

/// Describes how resources are bound for one dispatch.
///
/// Slots are kept in ascending order, which is also the order the coordinator
/// resolves and reports them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindStyle {
    pub(crate) binds: BTreeMap<u32, BindInfo>,
}

impl BindStyle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests `info` at `slot`.  Requesting the identical binding twice is a no-op;
    /// anything else already occupying the slot is a [`Error::SlotConflict`].
    fn bind(&mut self, slot: BindSlot, info: BindInfo) -> Result<()> {
        match self.binds.get(&slot.pass_index) {
            Some(existing) if *existing == info => Ok(()),
            Some(_) => Err(Error::SlotConflict { slot }),
            None => {
                self.binds.insert(slot.pass_index, info);
                Ok(())
            }
        }
    }

    /// Binds a buffer or image for compute access.
    pub fn bind_compute(&mut self, slot: BindSlot, resource: ResourceId, access: Access) -> Result<()> {
        self.bind(
            slot,
            BindInfo {
                resource,
                access,
                stage: Stage::Compute,
            },
        )
    }

    /// Binds an image for fragment-stage sampling.
    pub fn bind_sampled(&mut self, slot: BindSlot, resource: ResourceId) -> Result<()> {
        self.bind(
            slot,
            BindInfo {
                resource,
                access: Access::Read,
                stage: Stage::FragmentSample,
            },
        )
    }

    /// Binds both halves of a ping-pong pair by role.
    ///
    /// The physical resource behind each role is chosen by `parity`: on even frames the
    /// input is the pair's first resource and the output its second; odd frames swap.
    pub fn bind_ping_pong(
        &mut self,
        pair: &PingPong,
        parity: FrameParity,
        input_slot: BindSlot,
        output_slot: BindSlot,
    ) -> Result<()> {
        self.bind_compute(input_slot, pair.resolve(Role::Input, parity), Access::Read)?;
        self.bind_compute(output_slot, pair.resolve(Role::Output, parity), Access::Write)
    }

    pub fn iter(&self) -> impl Iterator<Item = (BindSlot, &BindInfo)> {
        self.binds.iter().map(|(k, v)| (BindSlot::new(*k), v))
    }

    pub fn get(&self, slot: BindSlot) -> Option<&BindInfo> {
        self.binds.get(&slot.pass_index)
    }

    pub fn len(&self) -> usize {
        self.binds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebinding_identically_is_idempotent() {
        let r = ResourceId::for_testing(1);
        let mut style = BindStyle::new();
        style.bind_compute(BindSlot::new(0), r, Access::Read).unwrap();
        style.bind_compute(BindSlot::new(0), r, Access::Read).unwrap();
        assert_eq!(style.len(), 1);
    }

    #[test]
    fn conflicting_slot_is_rejected() {
        let mut style = BindStyle::new();
        style
            .bind_compute(BindSlot::new(3), ResourceId::for_testing(1), Access::Read)
            .unwrap();
        let err = style
            .bind_compute(BindSlot::new(3), ResourceId::for_testing(2), Access::Read)
            .unwrap_err();
        assert!(matches!(err, Error::SlotConflict { slot } if slot == BindSlot::new(3)));
        // same resource, different access
        let err = style
            .bind_compute(BindSlot::new(3), ResourceId::for_testing(1), Access::Write)
            .unwrap_err();
        assert!(matches!(err, Error::SlotConflict { .. }));
    }

    #[test]
    fn ping_pong_roles_follow_parity() {
        let a = ResourceId::for_testing(10);
        let b = ResourceId::for_testing(11);
        let pair = PingPong::new(a, b).unwrap();

        let mut even = BindStyle::new();
        even.bind_ping_pong(&pair, FrameParity::Even, BindSlot::new(0), BindSlot::new(1))
            .unwrap();
        assert_eq!(even.get(BindSlot::new(0)).unwrap().resource, a);
        assert_eq!(even.get(BindSlot::new(1)).unwrap().resource, b);
        assert_eq!(even.get(BindSlot::new(1)).unwrap().access, Access::Write);

        let mut odd = BindStyle::new();
        odd.bind_ping_pong(&pair, FrameParity::Odd, BindSlot::new(0), BindSlot::new(1))
            .unwrap();
        assert_eq!(odd.get(BindSlot::new(0)).unwrap().resource, b);
        assert_eq!(odd.get(BindSlot::new(1)).unwrap().resource, a);
    }

    #[test]
    fn access_predicates() {
        assert!(Access::ReadWrite.reads() && Access::ReadWrite.writes());
        assert!(!Access::Read.writes());
        assert!(!Access::Write.reads());
    }
}
