// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use super::WgpuBackend;
use crate::imp::Error;
use std::borrow::Cow;

/// A compiled WGSL compute pipeline.
///
/// The bind group layout is derived from the shader: every `@group(0) @binding(n)`
/// declaration is bound from the dispatch's slot `n`.
#[derive(Debug, Clone)]
pub struct WgpuProgram {
    label: String,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

impl WgpuProgram {
    /// Compiles `source` and builds a pipeline for `entry_point`.
    ///
    /// Shader and pipeline validation errors are captured and returned as
    /// [`Error::Shader`] instead of reaching the device's uncaptured-error handler.
    pub async fn compile(
        backend: &WgpuBackend,
        label: &str,
        source: &str,
        entry_point: &str,
    ) -> Result<Self, Error> {
        let device = backend.bound().device();
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: None,
            module: &module,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(error) = device.pop_error_scope().await {
            return Err(Error::Shader {
                label: label.to_string(),
                message: error.to_string(),
            });
        }
        let layout = pipeline.get_bind_group_layout(0);
        Ok(Self {
            label: label.to_string(),
            pipeline,
            layout,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(super) fn pipeline(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    pub(super) fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }
}
