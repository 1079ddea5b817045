// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Resolves a [`BindStyle`] into concrete bindings for one dispatch.

use crate::bindings::bind_style::{Access, BindInfo, BindSlot, BindStyle, Stage};
use crate::bindings::resource::{CurrentBinding, Registry, ResourceDesc, ResourceId};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};

/// A binding after resolution, as handed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedBinding {
    pub slot: BindSlot,
    pub resource: ResourceId,
    pub access: Access,
    pub stage: Stage,
    pub desc: ResourceDesc,
}

/// The slot table as of the most recent dispatch.
#[derive(Debug, Default)]
pub struct BindingCoordinator {
    slots: BTreeMap<u32, BindInfo>,
}

impl BindingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds every slot `style` requests.
    ///
    /// On success each requested slot holds exactly the requested resource and access,
    /// and any resource previously occupying one of those slots no longer reports it.
    /// Slots this dispatch does not mention are left alone.
    ///
    /// Fails with [`Error::AliasingViolation`] if one resource is requested in two slots
    /// and either of them writes, and with [`Error::UnknownResource`] for a dead handle.
    /// On failure the table is unchanged.
    pub fn bind_for_dispatch(
        &mut self,
        registry: &mut Registry,
        style: &BindStyle,
    ) -> Result<Vec<ResolvedBinding>> {
        let mut seen: HashMap<ResourceId, (BindSlot, Access)> = HashMap::new();
        let mut resolved = Vec::with_capacity(style.len());
        for (slot, info) in style.iter() {
            let desc = registry.get(info.resource)?.desc();
            if let Some((first_slot, first_access)) = seen.get(&info.resource) {
                if first_access.writes() || info.access.writes() {
                    return Err(Error::AliasingViolation {
                        resource: info.resource,
                        detail: format!(
                            "bound as {first_access:?} at slot {} and {:?} at slot {}",
                            first_slot.index(),
                            info.access,
                            slot.index()
                        ),
                    });
                }
            } else {
                seen.insert(info.resource, (slot, info.access));
            }
            resolved.push(ResolvedBinding {
                slot,
                resource: info.resource,
                access: info.access,
                stage: info.stage,
                desc,
            });
        }

        for binding in &resolved {
            let info = BindInfo {
                resource: binding.resource,
                access: binding.access,
                stage: binding.stage,
            };
            if let Some(old) = self.slots.insert(binding.slot.index(), info)
                && old.resource != binding.resource
                && let Ok(previous) = registry.get_mut(old.resource)
                && previous.binding.is_some_and(|b| b.slot == binding.slot)
            {
                previous.binding = None;
            }
            registry.get_mut(binding.resource)?.binding = Some(CurrentBinding {
                slot: binding.slot,
                access: binding.access,
            });
            logwise::trace_sync!(
                "slot {slot} <- {resource}",
                slot = binding.slot.index(),
                resource = binding.resource.raw()
            );
        }
        Ok(resolved)
    }

    /// What currently occupies `slot`.
    pub fn bound(&self, slot: BindSlot) -> Option<&BindInfo> {
        self.slots.get(&slot.index())
    }

    /// Drops every slot that refers to `id`.
    pub fn forget(&mut self, id: ResourceId) {
        self.slots.retain(|_, info| info.resource != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imp::software::SoftwareBackend;
    use crate::multibuffer::{FrameParity, PingPong};

    fn setup() -> (SoftwareBackend, Registry, ResourceId, ResourceId) {
        let mut backend = SoftwareBackend::new("coordinator");
        let mut registry = Registry::new();
        let a = registry.create_buffer(&mut backend, "a", 16, None).unwrap();
        let b = registry.create_buffer(&mut backend, "b", 16, None).unwrap();
        (backend, registry, a, b)
    }

    #[test]
    fn same_resource_as_input_and_output_is_rejected() {
        let (_backend, mut registry, a, _) = setup();
        let mut coordinator = BindingCoordinator::new();
        let mut style = BindStyle::new();
        style.bind_compute(BindSlot::new(0), a, Access::Read).unwrap();
        style.bind_compute(BindSlot::new(1), a, Access::Write).unwrap();
        let err = coordinator.bind_for_dispatch(&mut registry, &style).unwrap_err();
        assert!(matches!(err, Error::AliasingViolation { resource, .. } if resource == a));
        assert!(coordinator.bound(BindSlot::new(0)).is_none());
    }

    #[test]
    fn shared_reads_are_allowed() {
        let (_backend, mut registry, a, b) = setup();
        let mut coordinator = BindingCoordinator::new();
        let mut style = BindStyle::new();
        style.bind_compute(BindSlot::new(0), a, Access::Read).unwrap();
        style.bind_compute(BindSlot::new(1), a, Access::Read).unwrap();
        style.bind_compute(BindSlot::new(2), b, Access::Write).unwrap();
        let resolved = coordinator.bind_for_dispatch(&mut registry, &style).unwrap();
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[2].resource, b);
    }

    #[test]
    fn rebinding_clears_the_previous_occupant() {
        let (_backend, mut registry, a, b) = setup();
        let pair = PingPong::new(a, b).unwrap();
        let mut coordinator = BindingCoordinator::new();

        let mut even = BindStyle::new();
        even.bind_ping_pong(&pair, FrameParity::Even, BindSlot::new(0), BindSlot::new(1))
            .unwrap();
        coordinator.bind_for_dispatch(&mut registry, &even).unwrap();
        assert_eq!(registry.get(b).unwrap().binding().unwrap().access, Access::Write);

        let mut odd = BindStyle::new();
        odd.bind_ping_pong(&pair, FrameParity::Odd, BindSlot::new(0), BindSlot::new(1))
            .unwrap();
        coordinator.bind_for_dispatch(&mut registry, &odd).unwrap();
        let b_binding = registry.get(b).unwrap().binding().unwrap();
        assert_eq!(b_binding.slot, BindSlot::new(0));
        assert_eq!(b_binding.access, Access::Read);
        assert_eq!(coordinator.bound(BindSlot::new(1)).unwrap().resource, a);
        assert_eq!(coordinator.bound(BindSlot::new(1)).unwrap().access, Access::Write);
    }

    #[test]
    fn unknown_handles_fail() {
        let (mut backend, mut registry, a, _) = setup();
        registry.destroy(&mut backend, a).unwrap();
        let mut coordinator = BindingCoordinator::new();
        let mut style = BindStyle::new();
        style.bind_compute(BindSlot::new(0), a, Access::Read).unwrap();
        assert!(matches!(
            coordinator.bind_for_dispatch(&mut registry, &style),
            Err(Error::UnknownResource(_))
        ));
    }
}
