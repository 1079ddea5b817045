// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Host readback and frame export.
//!
//! [`ComputeEngine::read`](crate::images::engine::ComputeEngine::read) yields a
//! [`ReadView`]: a lazy view of mapped bytes that borrows the engine, so the resource
//! cannot be written again while the view is alive.  Anything that must outlive the
//! next dispatch is copied into a [`Snapshot`].
//!
//! The export contract is RGBA8.  Images convert from their own pixel format; buffers
//! are treated as tightly packed RGBA32F, which is how the image-processing demos lay
//! out their storage buffers.

use crate::bindings::resource::{ResourceDesc, ResourceId};
use crate::error::Result;
use crate::images::engine::ComputeEngine;
use crate::imp::Backend;
use crate::pixel_formats::{PixelFormat, rgba8_from_bytes, write_png};
use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// Mapped bytes of one resource.  Unmapped on drop.
pub struct ReadView<'a, B: Backend + 'a> {
    mapped: B::Mapped<'a>,
    resource: ResourceId,
    desc: ResourceDesc,
    frame: u64,
}

impl<'a, B: Backend + 'a> ReadView<'a, B> {
    pub(crate) fn new(mapped: B::Mapped<'a>, resource: ResourceId, desc: ResourceDesc, frame: u64) -> Self {
        Self {
            mapped,
            resource,
            desc,
            frame,
        }
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn desc(&self) -> ResourceDesc {
        self.desc
    }

    /// Little-endian `f32` values, whatever the alignment of the mapping.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.mapped
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    /// Copies the bytes out of the mapping.
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            frame: self.frame,
            resource: self.resource,
            desc: self.desc,
            bytes: self.mapped.to_vec(),
        }
    }
}

impl<'a, B: Backend + 'a> Deref for ReadView<'a, B> {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.mapped
    }
}

impl<'a, B: Backend + 'a> Debug for ReadView<'a, B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadView")
            .field("resource", &self.resource)
            .field("frame", &self.frame)
            .field("len", &self.mapped.len())
            .finish()
    }
}

/// An owned copy of a resource's bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    frame: u64,
    resource: ResourceId,
    desc: ResourceDesc,
    bytes: Vec<u8>,
}

impl Snapshot {
    /// Frame counter at the time of the read.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// The physical resource the bytes came from.
    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn desc(&self) -> ResourceDesc {
        self.desc
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Image dimensions, when the source was an image.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self.desc {
            ResourceDesc::Image { width, height, .. } => Some((width, height)),
            ResourceDesc::Buffer { .. } => None,
        }
    }

    /// Converts to RGBA8, four bytes per pixel.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let format = match self.desc {
            ResourceDesc::Image { format, .. } => format,
            ResourceDesc::Buffer { .. } => PixelFormat::Rgba32Float,
        };
        rgba8_from_bytes(format, &self.bytes)
    }
}

/// Ordered snapshots, one per captured iteration.
#[derive(Debug, Clone, Default)]
pub struct FrameSequence {
    frames: Vec<Snapshot>,
}

impl FrameSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `id` and appends an owned copy.
    pub async fn capture<B: Backend>(
        &mut self,
        engine: &mut ComputeEngine<B>,
        id: ResourceId,
    ) -> Result<()> {
        let view = engine.read(id).await?;
        self.frames.push(view.to_snapshot());
        Ok(())
    }

    pub fn push(&mut self, snapshot: Snapshot) {
        self.frames.push(snapshot);
    }

    pub fn frames(&self) -> &[Snapshot] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Every frame as RGBA8.
    pub fn rgba8_frames(&self) -> Vec<Vec<u8>> {
        self.frames.iter().map(Snapshot::to_rgba8).collect()
    }

    /// Writes `{stem}_{index:04}.png` for every frame into `dir`.
    pub fn write_pngs(
        &self,
        dir: &Path,
        stem: &str,
        width: u32,
        height: u32,
    ) -> std::io::Result<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(self.frames.len());
        for (index, frame) in self.frames.iter().enumerate() {
            let path = dir.join(format!("{stem}_{index:04}.png"));
            write_png(&path, width, height, &frame.to_rgba8())?;
            paths.push(path);
        }
        Ok(paths)
    }
}
