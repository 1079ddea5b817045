// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Recorded engine commands and their static check.
//!
//! With `record_commands` set, the engine appends one [`Command`] per submission.
//! [`validate`] replays a log and checks that every write was followed by exactly one
//! sufficient barrier before its next read, regardless of the engine's own validation
//! setting.  Logs can also be written by hand to test a sequencing scheme before any
//! resource exists.

use crate::barrier::BarrierScope;
use crate::bindings::resource::{ResourceDesc, ResourceId};
use crate::bindings::resource_tracking::ResourceTracker;
use crate::bindings::visible_to::{Consumer, WriteKind};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Create {
        resource: ResourceId,
        desc: ResourceDesc,
    },
    Resize {
        resource: ResourceId,
        desc: ResourceDesc,
    },
    Destroy {
        resource: ResourceId,
    },
    HostWrite {
        resource: ResourceId,
    },
    UseProgram {
        program: String,
    },
    Dispatch {
        index: u64,
        groups: [u32; 3],
        reads: Vec<(ResourceId, Consumer)>,
        writes: Vec<(ResourceId, WriteKind)>,
    },
    Barrier {
        scope: BarrierScope,
        resources: Vec<ResourceId>,
    },
    Sample {
        resource: ResourceId,
    },
    Read {
        resource: ResourceId,
    },
    EndFrame {
        frame: u64,
    },
}

/// Replays `commands` and reports the first sequencing error.
///
/// - a read without a sufficient barrier since the last write: [`Error::BarrierOmitted`]
///   (or [`Error::ReadbackStale`] for host reads)
/// - a second barrier for the same write, or a barrier with no write: [`Error::RedundantBarrier`]
/// - a dispatch before any program: [`Error::NoProgram`]
/// - a handle used before `Create` or after `Destroy`: [`Error::UnknownResource`]
pub fn validate(commands: &[Command]) -> Result<()> {
    let mut tracker = ResourceTracker::default();
    let mut program_selected = false;
    for command in commands {
        match command {
            Command::Create { resource, desc } => tracker.register(*resource, desc.write_kind()),
            Command::Resize { resource, .. } | Command::HostWrite { resource } => {
                tracker.ensure_known(*resource)?;
                tracker.record_host_write(*resource);
            }
            Command::Destroy { resource } => tracker.forget(*resource),
            Command::UseProgram { .. } => program_selected = true,
            Command::Dispatch {
                index,
                reads,
                writes,
                ..
            } => {
                if !program_selected {
                    return Err(Error::NoProgram);
                }
                for (resource, consumer) in reads {
                    tracker.check(*resource, *consumer)?;
                }
                for (resource, _) in writes {
                    tracker.ensure_known(*resource)?;
                    tracker.record_write(*resource, *index);
                }
            }
            Command::Barrier { scope, resources } => {
                for resource in resources {
                    tracker.record_barrier(*resource, *scope)?;
                }
            }
            Command::Sample { resource } => tracker.check(*resource, Consumer::ShaderSample)?,
            Command::Read { resource } => tracker.check(*resource, Consumer::HostReadback)?,
            Command::EndFrame { .. } => {}
        }
    }
    Ok(())
}
