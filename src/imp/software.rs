// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! CPU reference backend.
//!
//! Resources live in word-aligned host memory.  Dispatches run synchronously on the
//! calling thread, invoking the program once per grid invocation.  Barriers that reach
//! the host copy the resource into a staging area, which is what [`SoftwareBackend::map_read`]
//! returns; a readback without such a barrier has nothing to map.
//!
//! Every barrier issued is recorded so tests can inspect placement and scope.

mod kernel;

pub use kernel::{Invocation, Kernel, KernelIo, SoftwareProgram};

use crate::barrier::BarrierScope;
use crate::bindings::coordinator::ResolvedBinding;
use crate::bindings::resource::ResourceId;
use crate::dispatch::DispatchPlan;
use crate::imp::{Backend, Error};
use crate::pixel_formats::PixelFormat;
use kernel::SlotRef;
use std::cell::Cell;
use std::collections::HashMap;
use std::ops::{Deref, Range};

const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 16_384;
const DEFAULT_MAX_GROUPS: u32 = 65_535;
const DEFAULT_MAX_BUFFER_SIZE: u64 = 1 << 28;

#[derive(Debug, Clone, Copy)]
enum Layout {
    Buffer,
    Image {
        width: u32,
        height: u32,
        format: PixelFormat,
    },
}

/// Backing memory of one resource, rounded up to whole words.
#[derive(Debug)]
pub(crate) struct Storage {
    words: Vec<u32>,
    byte_len: usize,
    layout: Layout,
}

impl Storage {
    fn zeroed(byte_len: usize, layout: Layout) -> Self {
        Self {
            words: vec![0; byte_len.div_ceil(4)],
            byte_len,
            layout,
        }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[..self.byte_len]
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.words)[..self.byte_len]
    }

    pub(crate) fn f32s(&self) -> &[f32] {
        bytemuck::cast_slice(&self.words[..self.byte_len / 4])
    }

    pub(crate) fn f32s_mut(&mut self) -> &mut [f32] {
        bytemuck::cast_slice_mut(&mut self.words[..self.byte_len / 4])
    }

    pub(crate) fn image_size(&self) -> (u32, u32) {
        match self.layout {
            Layout::Image { width, height, .. } => (width, height),
            Layout::Buffer => panic!("buffer bound where an image was expected"),
        }
    }

    pub(crate) fn texel_range(&self, x: u32, y: u32) -> (PixelFormat, Range<usize>) {
        let Layout::Image {
            width,
            height,
            format,
        } = self.layout
        else {
            panic!("buffer bound where an image was expected");
        };
        assert!(x < width && y < height, "texel ({x}, {y}) outside {width}x{height}");
        let bpp = format.bytes_per_pixel() as usize;
        let start = (y as usize * width as usize + x as usize) * bpp;
        (format, start..start + bpp)
    }
}

/// One barrier as issued, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedBarrier {
    pub scope: BarrierScope,
    pub resources: Vec<ResourceId>,
}

/// Host bytes staged by a host-reaching barrier.
pub struct SoftwareMapping<'a> {
    bytes: &'a [u8],
    outstanding: &'a Cell<usize>,
}

impl Deref for SoftwareMapping<'_> {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.bytes
    }
}

impl Drop for SoftwareMapping<'_> {
    fn drop(&mut self) {
        self.outstanding.set(self.outstanding.get() - 1);
    }
}

#[derive(Debug)]
pub struct SoftwareBackend {
    label: String,
    storage: HashMap<ResourceId, Storage>,
    staged: HashMap<ResourceId, Vec<u8>>,
    storage_formats: Option<Vec<PixelFormat>>,
    max_image_dimension: u32,
    max_buffer_size: u64,
    max_groups: u32,
    barriers: Vec<IssuedBarrier>,
    dispatches: u64,
    frames: u64,
    outstanding_maps: Cell<usize>,
    #[cfg(test)]
    fail_barriers: bool,
}

impl SoftwareBackend {
    /// A backend accepting every pixel format as storage.
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            storage: HashMap::new(),
            staged: HashMap::new(),
            storage_formats: None,
            max_image_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            max_groups: DEFAULT_MAX_GROUPS,
            barriers: Vec::new(),
            dispatches: 0,
            frames: 0,
            outstanding_maps: Cell::new(0),
            #[cfg(test)]
            fail_barriers: false,
        }
    }

    /// Restricts storage images to `formats`, to mimic a device with fewer formats.
    pub fn with_storage_formats(mut self, formats: &[PixelFormat]) -> Self {
        self.storage_formats = Some(formats.to_vec());
        self
    }

    pub fn with_max_groups(mut self, max: u32) -> Self {
        self.max_groups = max;
        self
    }

    pub fn with_max_image_dimension(mut self, max: u32) -> Self {
        self.max_image_dimension = max;
        self
    }

    pub fn with_max_buffer_size(mut self, max: u64) -> Self {
        self.max_buffer_size = max;
        self
    }

    /// Every barrier issued so far, in order.
    pub fn barriers(&self) -> &[IssuedBarrier] {
        &self.barriers
    }

    pub fn dispatch_count(&self) -> u64 {
        self.dispatches
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Mappings handed out and not yet dropped.
    pub fn outstanding_maps(&self) -> usize {
        self.outstanding_maps.get()
    }

    /// Makes every later barrier fail as if its first resource had no storage.
    #[cfg(test)]
    pub(crate) fn fail_barriers(&mut self) {
        self.fail_barriers = true;
    }

    fn storage_mut(&mut self, id: ResourceId) -> Result<&mut Storage, Error> {
        self.storage.get_mut(&id).ok_or(Error::MissingStorage(id))
    }
}

impl Backend for SoftwareBackend {
    type Program = SoftwareProgram;
    type Mapped<'a>
        = SoftwareMapping<'a>
    where
        Self: 'a;

    fn label(&self) -> &str {
        &self.label
    }

    fn supports_storage_format(&self, format: PixelFormat) -> bool {
        self.storage_formats
            .as_ref()
            .is_none_or(|formats| formats.contains(&format))
    }

    fn max_image_dimension(&self) -> u32 {
        self.max_image_dimension
    }

    fn max_buffer_size(&self) -> u64 {
        self.max_buffer_size
    }

    fn max_groups_per_dimension(&self) -> u32 {
        self.max_groups
    }

    fn create_buffer(
        &mut self,
        id: ResourceId,
        _label: &str,
        byte_len: usize,
        initial_data: Option<&[u8]>,
    ) -> Result<(), Error> {
        let mut storage = Storage::zeroed(byte_len, Layout::Buffer);
        if let Some(data) = initial_data {
            storage.bytes_mut().copy_from_slice(data);
        }
        self.storage.insert(id, storage);
        Ok(())
    }

    fn create_image(
        &mut self,
        id: ResourceId,
        _label: &str,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), Error> {
        let byte_len = width as usize * height as usize * format.bytes_per_pixel() as usize;
        self.storage.insert(
            id,
            Storage::zeroed(
                byte_len,
                Layout::Image {
                    width,
                    height,
                    format,
                },
            ),
        );
        Ok(())
    }

    fn resize_image(&mut self, id: ResourceId, width: u32, height: u32) -> Result<(), Error> {
        let format = match self.storage_mut(id)?.layout {
            Layout::Image { format, .. } => format,
            Layout::Buffer => return Err(Error::MissingStorage(id)),
        };
        self.staged.remove(&id);
        self.create_image(id, "", width, height, format)
    }

    fn destroy(&mut self, id: ResourceId) {
        self.storage.remove(&id);
        self.staged.remove(&id);
    }

    fn write_buffer(&mut self, id: ResourceId, offset: usize, bytes: &[u8]) -> Result<(), Error> {
        let storage = self.storage_mut(id)?;
        let dst = storage.bytes_mut();
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= dst.len())
            .ok_or(Error::WriteOutOfBounds {
                resource: id,
                offset,
                len: bytes.len(),
            })?;
        dst[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    fn dispatch(
        &mut self,
        program: &SoftwareProgram,
        plan: &DispatchPlan,
        bindings: &[ResolvedBinding],
    ) -> Result<(), Error> {
        if let Some(missing) = bindings.iter().find(|b| !self.storage.contains_key(&b.resource)) {
            return Err(Error::MissingStorage(missing.resource));
        }
        // written resources leave the map for the duration so reads can borrow the rest
        let mut taken: Vec<(ResourceId, Storage)> = bindings
            .iter()
            .filter(|b| b.access.writes())
            .filter_map(|b| self.storage.remove(&b.resource).map(|s| (b.resource, s)))
            .collect();

        let slot_count = bindings
            .iter()
            .map(|b| b.slot.index() as usize + 1)
            .max()
            .unwrap_or(0);
        let mut slots: Vec<Option<SlotRef<'_>>> = (0..slot_count).map(|_| None).collect();
        let mut written = taken.iter_mut();
        for binding in bindings {
            let index = binding.slot.index() as usize;
            if binding.access.writes() {
                if let Some((_, storage)) = written.next() {
                    slots[index] = Some(SlotRef::Write(storage));
                }
            } else if let Some(storage) = self.storage.get(&binding.resource) {
                slots[index] = Some(SlotRef::Read(storage));
            }
        }

        let mut io = KernelIo::new(slots);
        let kernel = program.kernel();
        let shape = plan.shape().to_array();
        let [gx, gy, gz] = plan.group_counts();
        for wz in 0..gz {
            for wy in 0..gy {
                for wx in 0..gx {
                    let group = [wx, wy, wz];
                    for lz in 0..shape[2] {
                        for ly in 0..shape[1] {
                            for lx in 0..shape[0] {
                                let local = [lx, ly, lz];
                                let global =
                                    std::array::from_fn(|i| group[i] * shape[i] + local[i]);
                                kernel.invoke(
                                    Invocation {
                                        global,
                                        group,
                                        local,
                                    },
                                    &mut io,
                                );
                            }
                        }
                    }
                }
            }
        }
        drop(io);
        self.storage.extend(taken);
        self.dispatches += 1;
        logwise::trace_sync!(
            "software dispatch {program} over {groups} groups",
            program = program.label().to_string(),
            groups = plan.total_groups()
        );
        Ok(())
    }

    fn barrier(&mut self, scope: BarrierScope, resources: &[ResourceId]) -> Result<(), Error> {
        #[cfg(test)]
        if self.fail_barriers
            && let Some(id) = resources.first()
        {
            return Err(Error::MissingStorage(*id));
        }
        if scope.reaches_host() {
            for id in resources {
                let storage = self.storage.get(id).ok_or(Error::MissingStorage(*id))?;
                self.staged.insert(*id, storage.bytes().to_vec());
            }
        }
        self.barriers.push(IssuedBarrier {
            scope,
            resources: resources.to_vec(),
        });
        Ok(())
    }

    fn map_read(
        &self,
        id: ResourceId,
    ) -> impl Future<Output = Result<SoftwareMapping<'_>, Error>> {
        let mapping = match self.staged.get(&id) {
            Some(bytes) => {
                self.outstanding_maps.set(self.outstanding_maps.get() + 1);
                Ok(SoftwareMapping {
                    bytes,
                    outstanding: &self.outstanding_maps,
                })
            }
            None => Err(Error::NotHostVisible(id)),
        };
        std::future::ready(mapping)
    }

    fn end_frame(&mut self) {
        self.frames += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::bind_style::{Access, BindSlot, Stage};
    use crate::bindings::resource::ResourceDesc;
    use crate::dispatch::{WorkGroupShape, plan_1d, plan_2d};

    fn binding(slot: u32, resource: ResourceId, access: Access, desc: ResourceDesc) -> ResolvedBinding {
        ResolvedBinding {
            slot: BindSlot::new(slot),
            resource,
            access,
            stage: Stage::Compute,
            desc,
        }
    }

    #[test]
    fn odd_sized_buffers_round_to_words() {
        let mut backend = SoftwareBackend::new("words");
        let id = ResourceId::for_testing(200);
        backend.create_buffer(id, "odd", 5, Some(&[1, 2, 3, 4, 5])).unwrap();
        assert_eq!(backend.storage[&id].bytes(), &[1, 2, 3, 4, 5]);
        assert_eq!(backend.storage[&id].words.len(), 2);
        assert!(backend.write_buffer(id, 3, &[9, 9, 9]).is_err());
        backend.write_buffer(id, 3, &[9, 9]).unwrap();
        assert_eq!(backend.storage[&id].bytes(), &[1, 2, 3, 9, 9]);
    }

    #[test]
    fn overshoot_invocations_run() {
        let mut backend = SoftwareBackend::new("overshoot");
        let out = ResourceId::for_testing(201);
        let desc = ResourceDesc::Buffer { byte_len: 4 * 10 };
        backend.create_buffer(out, "out", 40, None).unwrap();
        let program = SoftwareProgram::from_fn("count", |inv, io| {
            let n = io.f32s(0).len() as u32;
            if inv.x() < n {
                io.f32s_mut(0)[inv.x() as usize] = inv.x() as f32;
            }
        });
        let plan = plan_1d(10, WorkGroupShape::SIZE_64).unwrap();
        backend
            .dispatch(&program, &plan, &[binding(0, out, Access::Write, desc)])
            .unwrap();
        let floats = backend.storage[&out].f32s().to_vec();
        assert_eq!(floats, (0..10).map(|i| i as f32).collect::<Vec<_>>());
        assert_eq!(backend.dispatch_count(), 1);
    }

    #[test]
    fn images_store_in_their_format() {
        let mut backend = SoftwareBackend::new("images");
        let src = ResourceId::for_testing(202);
        let dst = ResourceId::for_testing(203);
        backend
            .create_image(src, "src", 3, 2, PixelFormat::Rgba32Float)
            .unwrap();
        backend.create_image(dst, "dst", 3, 2, PixelFormat::Rgba8Unorm).unwrap();
        let program = SoftwareProgram::from_fn("invert", |inv, io| {
            let (w, h) = io.image_size(1);
            if inv.x() >= w || inv.y() >= h {
                return;
            }
            let [r, g, b, a] = io.load(0, inv.x(), inv.y());
            io.store(1, inv.x(), inv.y(), [1.0 - r, 1.0 - g, 1.0 - b, a]);
        });
        let src_desc = ResourceDesc::Image {
            width: 3,
            height: 2,
            format: PixelFormat::Rgba32Float,
        };
        let dst_desc = ResourceDesc::Image {
            width: 3,
            height: 2,
            format: PixelFormat::Rgba8Unorm,
        };
        backend
            .dispatch(
                &program,
                &plan_2d(3, 2, WorkGroupShape::SIZE_8X8).unwrap(),
                &[
                    binding(0, src, Access::Read, src_desc),
                    binding(1, dst, Access::Write, dst_desc),
                ],
            )
            .unwrap();
        // zeroed source inverts to white with zero alpha
        assert!(
            backend.storage[&dst]
                .bytes()
                .chunks_exact(4)
                .all(|px| px == [255, 255, 255, 0])
        );
    }

    #[test]
    fn host_barrier_stages_a_copy() {
        let mut backend = SoftwareBackend::new("staging");
        let id = ResourceId::for_testing(204);
        backend.create_buffer(id, "b", 4, Some(&[1, 2, 3, 4])).unwrap();
        assert!(matches!(
            test_executors::sleep_on(backend.map_read(id)),
            Err(Error::NotHostVisible(_))
        ));

        backend.barrier(BarrierScope::SHADER_STORAGE, &[id]).unwrap();
        assert!(test_executors::sleep_on(backend.map_read(id)).is_err());

        backend.barrier(BarrierScope::BUFFER_UPDATE, &[id]).unwrap();
        backend.write_buffer(id, 0, &[7]).unwrap();
        {
            let mapped = test_executors::sleep_on(backend.map_read(id)).unwrap();
            assert_eq!(&*mapped, &[1, 2, 3, 4]);
            assert_eq!(backend.outstanding_maps(), 1);
        }
        assert_eq!(backend.outstanding_maps(), 0);
        assert_eq!(backend.barriers().len(), 2);
    }

    #[test]
    fn restricted_formats() {
        let backend = SoftwareBackend::new("r").with_storage_formats(&[PixelFormat::R32Float]);
        assert!(backend.supports_storage_format(PixelFormat::R32Float));
        assert!(!backend.supports_storage_format(PixelFormat::Rgba8Unorm));
    }
}
