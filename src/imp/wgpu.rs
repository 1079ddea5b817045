// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! wgpu backend.
//!
//! Buffers are storage buffers (also usable as uniforms); images are 2D storage
//! textures.  Each dispatch records one compute pass and submits it immediately, so
//! submission order equals call order.  wgpu already orders passes within a queue,
//! so device-side barriers only need bookkeeping here.  A barrier reaching the host
//! copies each resource into a fresh `MAP_READ` staging buffer and submits the copy;
//! [`WgpuBackend::map_read`] maps that buffer, waits on the device, and copies out.

mod bound_device;
mod pixel_format;
mod program;
mod staging;

pub use bound_device::BoundDevice;
pub use program::WgpuProgram;

use crate::barrier::BarrierScope;
use crate::bindings::coordinator::ResolvedBinding;
use crate::bindings::resource::ResourceId;
use crate::dispatch::DispatchPlan;
use crate::imp::{Backend, Error};
use crate::pixel_formats::PixelFormat;
use pixel_format::storage_format;
use staging::{RowLayout, Staged, word_padded};
use std::collections::HashMap;
use wgpu::util::DeviceExt;
use wgpu::{BufferUsages, MapMode, PollType, TextureUsages};

#[derive(Debug)]
enum Allocation {
    Buffer {
        buffer: wgpu::Buffer,
        byte_len: usize,
    },
    Image {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
        width: u32,
        height: u32,
        format: PixelFormat,
    },
}

impl Allocation {
    fn release(self) {
        match self {
            Allocation::Buffer { buffer, .. } => buffer.destroy(),
            Allocation::Image { texture, .. } => texture.destroy(),
        }
    }
}

#[derive(Debug)]
pub struct WgpuBackend {
    label: String,
    bound: BoundDevice,
    allocations: HashMap<ResourceId, Allocation>,
    staged: HashMap<ResourceId, Staged>,
    frames: u64,
}

impl WgpuBackend {
    /// Opens a device on the default adapter.
    pub async fn new(label: &str) -> Result<Self, Error> {
        let bound = BoundDevice::request(label).await?;
        Ok(Self::with_device(label, bound))
    }

    /// Uses an already opened device.
    pub fn with_device(label: &str, bound: BoundDevice) -> Self {
        Self {
            label: label.to_string(),
            bound,
            allocations: HashMap::new(),
            staged: HashMap::new(),
            frames: 0,
        }
    }

    pub fn bound(&self) -> &BoundDevice {
        &self.bound
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    fn allocation(&self, id: ResourceId) -> Result<&Allocation, Error> {
        self.allocations.get(&id).ok_or(Error::MissingStorage(id))
    }

    fn allocate_image(
        &self,
        label: &str,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Allocation, Error> {
        let texture_format = storage_format(format).ok_or(Error::NotStorageFormat(format))?;
        let texture = self
            .bound
            .device()
            .create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: texture_format,
                usage: TextureUsages::STORAGE_BINDING
                    | TextureUsages::TEXTURE_BINDING
                    | TextureUsages::COPY_SRC
                    | TextureUsages::COPY_DST,
                view_formats: &[],
            });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Allocation::Image {
            texture,
            view,
            width,
            height,
            format,
        })
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.bound
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Records a copy of `id` into a new staging buffer.
    fn stage(&self, encoder: &mut wgpu::CommandEncoder, id: ResourceId) -> Result<Staged, Error> {
        let device = self.bound.device();
        match self.allocation(id)? {
            Allocation::Buffer { buffer, byte_len } => {
                let size = word_padded(*byte_len);
                let staging = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("readback staging"),
                    size,
                    usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
                Ok(Staged {
                    buffer: staging,
                    byte_len: *byte_len,
                    rows: None,
                })
            }
            Allocation::Image {
                texture,
                width,
                height,
                format,
                ..
            } => {
                let rows = RowLayout::for_image(*width, *height, format.bytes_per_pixel());
                let staging = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("readback staging"),
                    size: rows.staging_len() as u64,
                    usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                encoder.copy_texture_to_buffer(
                    wgpu::TexelCopyTextureInfo {
                        texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::TexelCopyBufferInfo {
                        buffer: &staging,
                        layout: wgpu::TexelCopyBufferLayout {
                            offset: 0,
                            bytes_per_row: Some(rows.padded as u32),
                            rows_per_image: Some(*height),
                        },
                    },
                    wgpu::Extent3d {
                        width: *width,
                        height: *height,
                        depth_or_array_layers: 1,
                    },
                );
                Ok(Staged {
                    buffer: staging,
                    byte_len: rows.tight * rows.rows,
                    rows: Some(rows),
                })
            }
        }
    }
}

impl Backend for WgpuBackend {
    type Program = WgpuProgram;
    type Mapped<'a>
        = Vec<u8>
    where
        Self: 'a;

    fn label(&self) -> &str {
        &self.label
    }

    fn supports_storage_format(&self, format: PixelFormat) -> bool {
        storage_format(format).is_some_and(|f| {
            self.bound
                .adapter()
                .get_texture_format_features(f)
                .allowed_usages
                .contains(TextureUsages::STORAGE_BINDING)
        })
    }

    fn max_image_dimension(&self) -> u32 {
        self.bound.device().limits().max_texture_dimension_2d
    }

    fn max_buffer_size(&self) -> u64 {
        let limits = self.bound.device().limits();
        limits
            .max_buffer_size
            .min(u64::from(limits.max_storage_buffer_binding_size))
    }

    fn max_groups_per_dimension(&self) -> u32 {
        self.bound.device().limits().max_compute_workgroups_per_dimension
    }

    fn create_buffer(
        &mut self,
        id: ResourceId,
        label: &str,
        byte_len: usize,
        initial_data: Option<&[u8]>,
    ) -> Result<(), Error> {
        let usage = BufferUsages::STORAGE
            | BufferUsages::UNIFORM
            | BufferUsages::COPY_SRC
            | BufferUsages::COPY_DST;
        let device = self.bound.device();
        let buffer = match initial_data {
            Some(data) => {
                let mut contents = data.to_vec();
                contents.resize(word_padded(byte_len) as usize, 0);
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: &contents,
                    usage,
                })
            }
            None => device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: word_padded(byte_len),
                usage,
                mapped_at_creation: false,
            }),
        };
        self.allocations
            .insert(id, Allocation::Buffer { buffer, byte_len });
        Ok(())
    }

    fn create_image(
        &mut self,
        id: ResourceId,
        label: &str,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), Error> {
        let allocation = self.allocate_image(label, width, height, format)?;
        self.allocations.insert(id, allocation);
        Ok(())
    }

    fn resize_image(&mut self, id: ResourceId, width: u32, height: u32) -> Result<(), Error> {
        let Allocation::Image { format, .. } = self.allocation(id)? else {
            return Err(Error::MissingStorage(id));
        };
        let allocation = self.allocate_image("resized image", width, height, *format)?;
        self.staged.remove(&id);
        if let Some(old) = self.allocations.insert(id, allocation) {
            old.release();
        }
        Ok(())
    }

    fn destroy(&mut self, id: ResourceId) {
        self.staged.remove(&id);
        if let Some(allocation) = self.allocations.remove(&id) {
            allocation.release();
        }
    }

    fn write_buffer(&mut self, id: ResourceId, offset: usize, bytes: &[u8]) -> Result<(), Error> {
        let Allocation::Buffer { buffer, byte_len } = self.allocation(id)? else {
            return Err(Error::MissingStorage(id));
        };
        let out_of_bounds = offset
            .checked_add(bytes.len())
            .is_none_or(|end| end > *byte_len);
        if out_of_bounds {
            return Err(Error::WriteOutOfBounds {
                resource: id,
                offset,
                len: bytes.len(),
            });
        }
        if offset % 4 != 0 || bytes.len() % 4 != 0 {
            return Err(Error::UnalignedWrite {
                resource: id,
                offset,
                len: bytes.len(),
            });
        }
        self.bound
            .queue()
            .write_buffer(buffer, offset as u64, bytes);
        Ok(())
    }

    fn dispatch(
        &mut self,
        program: &WgpuProgram,
        plan: &DispatchPlan,
        bindings: &[ResolvedBinding],
    ) -> Result<(), Error> {
        let mut entries = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let resource = match self.allocation(binding.resource)? {
                Allocation::Buffer { buffer, .. } => buffer.as_entire_binding(),
                Allocation::Image { view, .. } => wgpu::BindingResource::TextureView(view),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: binding.slot.index(),
                resource,
            });
        }
        let bind_group = self
            .bound
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(program.label()),
                layout: program.layout(),
                entries: &entries,
            });

        let mut encoder = self.encoder("dispatch");
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(program.label()),
                timestamp_writes: None,
            });
            pass.set_pipeline(program.pipeline());
            pass.set_bind_group(0, &bind_group, &[]);
            let [x, y, z] = plan.group_counts();
            pass.dispatch_workgroups(x, y, z);
        }
        self.bound.queue().submit(std::iter::once(encoder.finish()));
        logwise::trace_sync!(
            "wgpu dispatch {program} over {groups} groups",
            program = program.label().to_string(),
            groups = plan.total_groups()
        );
        Ok(())
    }

    fn barrier(&mut self, scope: BarrierScope, resources: &[ResourceId]) -> Result<(), Error> {
        if !scope.reaches_host() {
            return Ok(());
        }
        let mut encoder = self.encoder("readback barrier");
        let mut staged = Vec::with_capacity(resources.len());
        for id in resources {
            staged.push((*id, self.stage(&mut encoder, *id)?));
        }
        self.bound.queue().submit(std::iter::once(encoder.finish()));
        self.staged.extend(staged);
        Ok(())
    }

    fn map_read(&self, id: ResourceId) -> impl Future<Output = Result<Vec<u8>, Error>> {
        async move {
            let staged = self.staged.get(&id).ok_or(Error::NotHostVisible(id))?;
            let slice = staged.buffer.slice(..);
            let (sender, receiver) = r#continue::continuation();
            slice.map_async(MapMode::Read, move |result| sender.send(result));
            if let Err(e) = self.bound.device().poll(PollType::Wait) {
                //aborts the pending map
                staged.buffer.unmap();
                return Err(e.into());
            }
            receiver.await?;
            let bytes = {
                let mapped = slice.get_mapped_range();
                staged.copy_out(&mapped)
            };
            staged.buffer.unmap();
            Ok(bytes)
        }
    }

    fn end_frame(&mut self) {
        self.frames += 1;
    }
}
