// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::imp::Error;
use wgpu::Trace;

/// An adapter with its device and queue.
///
/// wgpu handles are reference counted, so clones share the same device.
#[derive(Debug, Clone)]
pub struct BoundDevice {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl BoundDevice {
    /// Picks the default high-performance adapter and opens a device on it.
    ///
    /// Fails with [`Error::NoSuchAdapter`] on machines without a usable GPU (or
    /// software rasterizer), which callers use to skip GPU work.
    pub async fn request(label: &str) -> Result<Self, Error> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .map_err(|_| Error::NoSuchAdapter)?;
        let info = adapter.get_info();
        logwise::info_sync!(
            "bound adapter {name} via {api}",
            name = info.name.clone(),
            api = logwise::privacy::LogIt(&info.backend)
        );

        let descriptor = wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            //storage-heavy workloads want whatever the adapter offers
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: Trace::Off,
        };
        let (device, queue) = adapter.request_device(&descriptor).await?;
        Ok(Self {
            adapter,
            device,
            queue,
        })
    }

    pub(super) fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub(super) fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub(super) fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }
}
