// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! CPU compute programs.
//!
//! A [`Kernel`] is invoked once per invocation of the dispatch grid, in group order,
//! with a [`KernelIo`] exposing the bound resources by slot.  Over-shoot invocations
//! past the problem edge are invoked too; kernels mask them the way a shader would:
//!
//! ```
//! use dispatch_and_barriers::imp::software::{Invocation, KernelIo, SoftwareProgram};
//!
//! let invert = SoftwareProgram::from_fn("invert", |inv: Invocation, io: &mut KernelIo<'_>| {
//!     let (w, h) = io.image_size(1);
//!     if inv.x() >= w || inv.y() >= h {
//!         return;
//!     }
//!     let [r, g, b, a] = io.load(0, inv.x(), inv.y());
//!     io.store(1, inv.x(), inv.y(), [1.0 - r, 1.0 - g, 1.0 - b, a]);
//! });
//! assert_eq!(invert.label(), "invert");
//! ```

use super::Storage;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Ids of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    pub global: [u32; 3],
    pub group: [u32; 3],
    pub local: [u32; 3],
}

impl Invocation {
    pub const fn x(&self) -> u32 {
        self.global[0]
    }
    pub const fn y(&self) -> u32 {
        self.global[1]
    }
    pub const fn z(&self) -> u32 {
        self.global[2]
    }
}

pub trait Kernel {
    fn invoke(&self, invocation: Invocation, io: &mut KernelIo<'_>);
}

struct FnKernel<F>(F);

impl<F> Kernel for FnKernel<F>
where
    F: Fn(Invocation, &mut KernelIo<'_>),
{
    fn invoke(&self, invocation: Invocation, io: &mut KernelIo<'_>) {
        (self.0)(invocation, io)
    }
}

/// A labelled kernel, cheap to clone.
#[derive(Clone)]
pub struct SoftwareProgram {
    label: String,
    kernel: Arc<dyn Kernel>,
}

impl SoftwareProgram {
    pub fn new(label: &str, kernel: impl Kernel + 'static) -> Self {
        Self {
            label: label.to_string(),
            kernel: Arc::new(kernel),
        }
    }

    pub fn from_fn<F>(label: &str, f: F) -> Self
    where
        F: Fn(Invocation, &mut KernelIo<'_>) + 'static,
    {
        Self::new(label, FnKernel(f))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(super) fn kernel(&self) -> &dyn Kernel {
        self.kernel.as_ref()
    }
}

impl Debug for SoftwareProgram {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareProgram")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

pub(super) enum SlotRef<'a> {
    Read(&'a Storage),
    Write(&'a mut Storage),
}

/// Resources bound to the running dispatch.
///
/// # Panics
///
/// Accessors panic when the slot is unbound, when a read-only slot is written, or when
/// an image accessor is used on a buffer.  These are mismatches between the kernel and
/// its bind style, the CPU equivalent of a pipeline layout error.
pub struct KernelIo<'a> {
    slots: Vec<Option<SlotRef<'a>>>,
}

impl<'a> KernelIo<'a> {
    pub(super) fn new(slots: Vec<Option<SlotRef<'a>>>) -> Self {
        Self { slots }
    }

    fn storage(&self, slot: u32) -> &Storage {
        match self.slots.get(slot as usize).and_then(Option::as_ref) {
            Some(SlotRef::Read(s)) => *s,
            Some(SlotRef::Write(s)) => &**s,
            None => panic!("no resource bound at slot {slot}"),
        }
    }

    fn storage_mut(&mut self, slot: u32) -> &mut Storage {
        match self.slots.get_mut(slot as usize).and_then(Option::as_mut) {
            Some(SlotRef::Write(s)) => &mut **s,
            Some(SlotRef::Read(_)) => panic!("slot {slot} is bound read-only"),
            None => panic!("no resource bound at slot {slot}"),
        }
    }

    pub fn bytes(&self, slot: u32) -> &[u8] {
        self.storage(slot).bytes()
    }

    pub fn bytes_mut(&mut self, slot: u32) -> &mut [u8] {
        self.storage_mut(slot).bytes_mut()
    }

    pub fn f32s(&self, slot: u32) -> &[f32] {
        self.storage(slot).f32s()
    }

    pub fn f32s_mut(&mut self, slot: u32) -> &mut [f32] {
        self.storage_mut(slot).f32s_mut()
    }

    /// Reads a uniform block from the start of the slot.
    pub fn uniform<T: bytemuck::Pod>(&self, slot: u32) -> T {
        let bytes = self.bytes(slot);
        bytemuck::pod_read_unaligned(&bytes[..size_of::<T>()])
    }

    pub fn image_size(&self, slot: u32) -> (u32, u32) {
        self.storage(slot).image_size()
    }

    /// Loads a texel as RGBA floats.
    pub fn load(&self, slot: u32, x: u32, y: u32) -> [f32; 4] {
        let storage = self.storage(slot);
        let (format, range) = storage.texel_range(x, y);
        format.decode(&storage.bytes()[range])
    }

    /// Stores RGBA floats into a texel, converting to the image's format.
    pub fn store(&mut self, slot: u32, x: u32, y: u32, rgba: [f32; 4]) {
        let storage = self.storage_mut(slot);
        let (format, range) = storage.texel_range(x, y);
        format.encode(rgba, &mut storage.bytes_mut()[range]);
    }
}
