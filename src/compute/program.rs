//! Compiled kernel programs
//!
//! A [`Program`] is one compiled source file plus the lanes it runs on. Each
//! pipeline stage embeds the programs it builds and pulls its [`Kernel`]s
//! from them by entry-point name.

use std::sync::Arc;
use wgpu::{BindGroup, BindGroupLayout, Buffer, ComputePipeline, Device, ShaderModule};

use crate::compute::context::Lane;
use crate::compute::source::{KernelSource, COMMON_SOURCE};
use crate::error::{KarstError, KarstResult};

/// Kind of buffer bound at one binding slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    StorageRead,
    Storage,
    Uniform,
}

impl Binding {
    fn layout_entry(self, binding: u32) -> wgpu::BindGroupLayoutEntry {
        let ty = match self {
            Binding::StorageRead => wgpu::BufferBindingType::Storage { read_only: true },
            Binding::Storage => wgpu::BufferBindingType::Storage { read_only: false },
            Binding::Uniform => wgpu::BufferBindingType::Uniform,
        };
        wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }
    }
}

/// A compiled kernel source shared by the lanes of one context
pub struct Program {
    path: String,
    module: ShaderModule,
    device: Arc<Device>,
    lanes: Vec<Lane>,
}

/// One entry point with its pipeline and binding layout
pub struct Kernel {
    name: String,
    pipeline: ComputePipeline,
    layout: BindGroupLayout,
    threads_per_group: u32,
}

/// Compile `path` with the constants header and shared helpers in front
pub(crate) fn build_program(
    device: &Arc<Device>,
    lanes: &[Lane],
    source: &KernelSource,
    wgsl_header: &str,
    path: &str,
) -> KarstResult<Program> {
    let body = source.load(path).map_err(|error| KarstError::Build {
        path: path.to_string(),
        log: build_log(lanes, error),
    })?;
    let (code, line_offset) = assemble_source(wgsl_header, &body);

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(path),
        source: wgpu::ShaderSource::Wgsl(code.into()),
    });
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        log::error!("[Program] Failed to compile {}", path);
        return Err(KarstError::Build {
            path: path.to_string(),
            log: build_log(
                lanes,
                format!(
                    "{}\n(line 1 of {} is line {} of the compiled module)",
                    error,
                    path,
                    line_offset + 1
                ),
            ),
        });
    }

    log::debug!("[Program] Built {} for {} lane(s)", path, lanes.len());
    Ok(Program {
        path: path.to_string(),
        module,
        device: device.clone(),
        lanes: lanes.to_vec(),
    })
}

/// Prepend the constants header and shared helpers to `body`. Also returns
/// how many lines precede the body in the compiled module.
pub(crate) fn assemble_source(wgsl_header: &str, body: &str) -> (String, usize) {
    let prefix = format!("{}\n{}\n", wgsl_header, COMMON_SOURCE);
    let line_offset = prefix.matches('\n').count();
    (prefix + body, line_offset)
}

/// Format a compile message once per lane, headed by the lane's device
pub fn build_log(lanes: &[Lane], message: impl std::fmt::Display) -> String {
    let message = message.to_string();
    lanes
        .iter()
        .map(|lane| {
            format!(
                "Build log for device {}: {}\n{}",
                lane.index(),
                lane.adapter_name(),
                message
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl Program {
    /// Create the pipeline for `entry`. `bindings` lists the buffers of
    /// group 0 in binding order.
    pub fn kernel(
        &self,
        entry: &str,
        bindings: &[Binding],
        threads_per_group: u32,
    ) -> KarstResult<Kernel> {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = bindings
            .iter()
            .enumerate()
            .map(|(slot, binding)| binding.layout_entry(slot as u32))
            .collect();

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(entry),
            entries: &entries,
        });
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(entry),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(entry),
            layout: Some(&pipeline_layout),
            module: &self.module,
            entry_point: entry,
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            log::error!("[Program] Entry point {} in {} is unusable", entry, self.path);
            return Err(KarstError::Build {
                path: self.path.clone(),
                log: build_log(&self.lanes, format!("entry point {}: {}", entry, error)),
            });
        }

        Ok(Kernel {
            name: entry.to_string(),
            pipeline,
            layout,
            threads_per_group,
        })
    }
}

impl Kernel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threads_per_group(&self) -> u32 {
        self.threads_per_group
    }

    pub fn pipeline(&self) -> &ComputePipeline {
        &self.pipeline
    }

    /// Bind whole buffers to the kernel's slots in order
    pub fn bind_group(&self, device: &Device, buffers: &[&Buffer]) -> BindGroup {
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(slot, buffer)| wgpu::BindGroupEntry {
                binding: slot as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&self.name),
            layout: &self.layout,
            entries: &entries,
        })
    }
}
