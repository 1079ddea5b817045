// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Resource handle registry.
//!
//! The registry tracks every GPU-side buffer and image the engine has created: its
//! size or dimensions and format, and the slot it currently occupies (if any).
//! Backing storage itself belongs to the backend; the registry validates creation
//! requests before the backend is asked to allocate anything.
//!
//! # Guarantees
//!
//! - Every [`ResourceId`] is unique for the lifetime of the process, across engines.
//! - [`Registry::resize_image`] is the only operation that changes a resource's size
//!   after creation.  The id survives the resize; the backing storage does not.

use crate::bindings::bind_style::{Access, BindSlot};
use crate::bindings::visible_to::WriteKind;
use crate::error::{Error, Result};
use crate::imp::Backend;
use crate::pixel_formats::PixelFormat;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle naming a buffer or image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    fn next() -> Self {
        ResourceId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn for_testing(raw: u64) -> Self {
        ResourceId(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "resource#{}", self.0)
    }
}

/// Size and layout of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceDesc {
    /// A storage buffer of `byte_len` bytes.
    Buffer { byte_len: usize },
    /// A 2D storage image.
    Image {
        width: u32,
        height: u32,
        format: PixelFormat,
    },
}

impl ResourceDesc {
    /// Number of bytes a tightly packed copy of this resource occupies.
    pub fn byte_len(&self) -> usize {
        match *self {
            ResourceDesc::Buffer { byte_len } => byte_len,
            ResourceDesc::Image {
                width,
                height,
                format,
            } => width as usize * height as usize * format.bytes_per_pixel() as usize,
        }
    }

    /// How a dispatch writing this resource produces its data.
    pub fn write_kind(&self) -> WriteKind {
        match self {
            ResourceDesc::Buffer { .. } => WriteKind::StorageBuffer,
            ResourceDesc::Image { .. } => WriteKind::StorageImage,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ResourceDesc::Image { .. })
    }
}

/// Where a resource is currently bound, and with which access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentBinding {
    pub slot: BindSlot,
    pub access: Access,
}

/// Registry record for one live resource.
#[derive(Debug, Clone)]
pub struct GpuResource {
    id: ResourceId,
    desc: ResourceDesc,
    label: String,
    pub(crate) binding: Option<CurrentBinding>,
}

impl GpuResource {
    pub fn id(&self) -> ResourceId {
        self.id
    }
    pub fn desc(&self) -> ResourceDesc {
        self.desc
    }
    pub fn label(&self) -> &str {
        &self.label
    }
    /// The slot this resource occupied in the most recent dispatch that bound it.
    pub fn binding(&self) -> Option<CurrentBinding> {
        self.binding
    }
}

/// Tracks every live resource.
#[derive(Debug, Default)]
pub struct Registry {
    resources: BTreeMap<ResourceId, GpuResource>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a storage buffer of `byte_size` bytes, optionally initialized.
    ///
    /// Fails with [`Error::InvalidResourceSpec`] when `byte_size` is zero, exceeds the
    /// backend's buffer limit, or the initial data does not match the requested size.
    pub fn create_buffer<B: Backend>(
        &mut self,
        backend: &mut B,
        label: &str,
        byte_size: usize,
        initial_data: Option<&[u8]>,
    ) -> Result<ResourceId> {
        if byte_size == 0 {
            return Err(Error::invalid_spec(format!(
                "buffer '{label}' requested with zero size"
            )));
        }
        let max = backend.max_buffer_size();
        if byte_size as u64 > max {
            return Err(Error::invalid_spec(format!(
                "buffer '{label}' of {byte_size} bytes exceeds the backend limit of {max}"
            )));
        }
        if let Some(data) = initial_data
            && data.len() != byte_size
        {
            return Err(Error::invalid_spec(format!(
                "buffer '{label}' is {byte_size} bytes but initial data is {} bytes",
                data.len()
            )));
        }
        let id = ResourceId::next();
        backend.create_buffer(id, label, byte_size, initial_data)?;
        logwise::info_sync!(
            "created buffer {label} ({bytes} bytes)",
            label = label.to_string(),
            bytes = byte_size
        );
        self.insert(id, label, ResourceDesc::Buffer { byte_len: byte_size });
        Ok(id)
    }

    /// Creates a 2D storage image.
    ///
    /// Fails with [`Error::InvalidResourceSpec`] when either dimension is zero, exceeds
    /// the backend limit, or the format cannot be used as a storage image.
    pub fn create_image<B: Backend>(
        &mut self,
        backend: &mut B,
        label: &str,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<ResourceId> {
        Self::validate_image(backend, label, width, height, format)?;
        let id = ResourceId::next();
        backend.create_image(id, label, width, height, format)?;
        logwise::info_sync!(
            "created image {label} {width}x{height}",
            label = label.to_string(),
            width = width,
            height = height
        );
        self.insert(
            id,
            label,
            ResourceDesc::Image {
                width,
                height,
                format,
            },
        );
        Ok(id)
    }

    /// Reallocates an image's backing storage at a new size.  Contents are lost and
    /// any binding the image held is dropped.
    pub fn resize_image<B: Backend>(
        &mut self,
        backend: &mut B,
        id: ResourceId,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let resource = self.resources.get(&id).ok_or(Error::UnknownResource(id))?;
        let ResourceDesc::Image { format, .. } = resource.desc else {
            return Err(Error::invalid_spec(format!(
                "{id} is a buffer; only images can be resized"
            )));
        };
        Self::validate_image(backend, &resource.label, width, height, format)?;
        backend.resize_image(id, width, height)?;
        logwise::info_sync!(
            "resized {id} to {width}x{height}",
            id = id.raw(),
            width = width,
            height = height
        );
        if let Some(resource) = self.resources.get_mut(&id) {
            resource.desc = ResourceDesc::Image {
                width,
                height,
                format,
            };
            resource.binding = None;
        }
        Ok(())
    }

    /// Releases a resource.  Its id is never reused.
    pub fn destroy<B: Backend>(&mut self, backend: &mut B, id: ResourceId) -> Result<()> {
        self.resources
            .remove(&id)
            .ok_or(Error::UnknownResource(id))?;
        backend.destroy(id);
        logwise::info_sync!("destroyed {id}", id = id.raw());
        Ok(())
    }

    pub fn get(&self, id: ResourceId) -> Result<&GpuResource> {
        self.resources.get(&id).ok_or(Error::UnknownResource(id))
    }

    pub(crate) fn get_mut(&mut self, id: ResourceId) -> Result<&mut GpuResource> {
        self.resources
            .get_mut(&id)
            .ok_or(Error::UnknownResource(id))
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GpuResource> {
        self.resources.values()
    }

    fn insert(&mut self, id: ResourceId, label: &str, desc: ResourceDesc) {
        self.resources.insert(
            id,
            GpuResource {
                id,
                desc,
                label: label.to_string(),
                binding: None,
            },
        );
    }

    fn validate_image<B: Backend>(
        backend: &B,
        label: &str,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_spec(format!(
                "image '{label}' requested at {width}x{height}"
            )));
        }
        let max = backend.max_image_dimension();
        if width > max || height > max {
            return Err(Error::invalid_spec(format!(
                "image '{label}' at {width}x{height} exceeds the backend limit of {max}"
            )));
        }
        if !backend.supports_storage_format(format) {
            return Err(Error::invalid_spec(format!(
                "{format:?} is not a storage format on this backend"
            )));
        }
        Ok(())
    }
}
