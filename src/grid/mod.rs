//! Scalar field lattice with host/device residency
//!
//! A grid of `dim` voxels stores `(dim + 1)` samples per axis, each sample a
//! `[gx, gy, gz, value]` quadruple. Exactly one side holds the authoritative
//! copy at any time:
//! - `Storage::Host`: the host array is valid, no device buffer exists
//! - `Storage::Device`: the device buffer is valid, the host array is stale
//!
//! `copy_to_device` and `copy_to_host` are the only transitions and both are
//! no-ops when the grid is already in the target state.

use bytemuck::{Pod, Zeroable};
use glam::{UVec3, Vec3};
use std::sync::Arc;
use wgpu::{Buffer, Device};

use crate::compute::{
    create_buffer_init, read_buffer, run_1d_kernel, Context, Kernel, Lane, QueuePolicy,
};
use crate::error::{bounds_error, runtime_error, KarstResult};

/// One lattice sample: gradient in xyz, field value in w
pub type Sample = [f32; 4];

/// Which side currently holds the valid samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Host,
    Device,
}

enum Residency {
    Host,
    Device(Buffer),
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct MemSetParams {
    value: f32,
    offset: u32,
    count: u32,
    _padding: u32,
}

/// Scalar field samples over a regular lattice
pub struct Grid {
    dim: UVec3,
    voxel_size: Vec3,
    start_pos: Vec3,
    values: Vec<Sample>,
    residency: Residency,
    transfers: u32,
    device: Arc<Device>,
    lane: Lane,
    mem_set: Arc<Kernel>,
}

impl Grid {
    /// Allocate a host-resident grid with every sample zeroed
    pub fn new(ctx: &Context, dim: UVec3, voxel_size: Vec3, start_pos: Vec3) -> KarstResult<Self> {
        let flat = Self::flat_size(dim);
        if flat > u32::MAX as u64 {
            return Err(bounds_error(
                "Grid::new",
                format!("{} samples exceed the addressable range", flat),
            ));
        }

        log::debug!("[Grid] New {}x{}x{} grid at {:?}", dim.x, dim.y, dim.z, start_pos);

        Ok(Self {
            dim,
            voxel_size,
            start_pos,
            values: vec![[0.0; 4]; flat as usize],
            residency: Residency::Host,
            transfers: 0,
            device: ctx.device().clone(),
            lane: ctx.first_lane().clone(),
            mem_set: ctx.mem_set_kernel().clone(),
        })
    }

    /// Samples needed for `dim` voxels: corners are shared, so one more per axis.
    /// Saturates at `u64::MAX`.
    pub fn flat_size(dim: UVec3) -> u64 {
        (dim.x as u64 + 1)
            .saturating_mul(dim.y as u64 + 1)
            .saturating_mul(dim.z as u64 + 1)
    }

    pub fn dim(&self) -> UVec3 {
        self.dim
    }

    pub fn voxel_size(&self) -> Vec3 {
        self.voxel_size
    }

    pub fn start_pos(&self) -> Vec3 {
        self.start_pos
    }

    pub fn set_start_pos(&mut self, start_pos: Vec3) {
        self.start_pos = start_pos;
    }

    pub fn voxel_count(&self) -> u64 {
        self.dim.x as u64 * self.dim.y as u64 * self.dim.z as u64
    }

    pub fn sample_count(&self) -> usize {
        self.values.len()
    }

    pub fn storage(&self) -> Storage {
        match self.residency {
            Residency::Host => Storage::Host,
            Residency::Device(_) => Storage::Device,
        }
    }

    /// Number of host/device transfers performed so far
    pub fn transfer_count(&self) -> u32 {
        self.transfers
    }

    /// Flat index of lattice point `(x, y, z)`, x varying fastest
    pub fn sample_index(&self, x: u32, y: u32, z: u32) -> usize {
        let sx = self.dim.x as usize + 1;
        let sy = self.dim.y as usize + 1;
        x as usize + y as usize * sx + z as usize * sx * sy
    }

    /// World position of lattice point `(x, y, z)`
    pub fn sample_position(&self, x: u32, y: u32, z: u32) -> Vec3 {
        self.start_pos + self.voxel_size * UVec3::new(x, y, z).as_vec3()
    }

    /// Host samples; only valid while host-resident
    pub fn values(&self) -> KarstResult<&[Sample]> {
        match self.residency {
            Residency::Host => Ok(&self.values),
            Residency::Device(_) => Err(runtime_error(
                "Grid::values",
                "samples are device-resident; call copy_to_host first",
            )),
        }
    }

    pub fn values_mut(&mut self) -> KarstResult<&mut [Sample]> {
        match self.residency {
            Residency::Host => Ok(&mut self.values),
            Residency::Device(_) => Err(runtime_error(
                "Grid::values_mut",
                "samples are device-resident; call copy_to_host first",
            )),
        }
    }

    /// Device buffer; only valid while device-resident
    pub fn device_buffer(&self) -> KarstResult<&Buffer> {
        match &self.residency {
            Residency::Device(buffer) => Ok(buffer),
            Residency::Host => Err(runtime_error(
                "Grid::device_buffer",
                "samples are host-resident; call copy_to_device first",
            )),
        }
    }

    /// Upload the host samples and make the device copy authoritative
    pub fn copy_to_device(&mut self) -> KarstResult<()> {
        if let Residency::Device(_) = self.residency {
            return Ok(());
        }

        let bytes = (self.values.len() * std::mem::size_of::<Sample>()) as u64;
        let max_binding = self.lane.limits().max_storage_buffer_binding_size as u64;
        if bytes > max_binding {
            return Err(bounds_error(
                "Grid::copy_to_device",
                format!("{} bytes exceed the device binding limit of {}", bytes, max_binding),
            ));
        }

        let buffer = create_buffer_init(
            &self.device,
            "Grid Samples",
            bytemuck::cast_slice(&self.values),
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        )?;

        self.residency = Residency::Device(buffer);
        self.transfers += 1;
        log::debug!("[Grid] Copied {} bytes to device", bytes);
        Ok(())
    }

    /// Download the device samples and release the device buffer
    pub fn copy_to_host(&mut self) -> KarstResult<()> {
        let buffer = match &self.residency {
            Residency::Host => return Ok(()),
            Residency::Device(buffer) => buffer,
        };

        let samples: Vec<Sample> = read_buffer(
            &self.device,
            self.lane.queue(),
            buffer,
            0,
            self.values.len(),
        )?;
        self.values.copy_from_slice(&samples);

        if let Residency::Device(buffer) = std::mem::replace(&mut self.residency, Residency::Host) {
            buffer.destroy();
        }
        self.transfers += 1;
        log::debug!("[Grid] Copied {} samples to host", samples.len());
        Ok(())
    }

    /// Set every sample to `value` with a zero gradient, on whichever side is
    /// authoritative
    pub fn clear(&mut self, value: f32) -> KarstResult<()> {
        match &self.residency {
            Residency::Host => {
                self.values.fill([0.0, 0.0, 0.0, value]);
                Ok(())
            }
            Residency::Device(buffer) => {
                let device = &self.device;
                let kernel = &self.mem_set;
                run_1d_kernel(
                    device,
                    std::slice::from_ref(&self.lane),
                    kernel,
                    self.values.len() as u32,
                    QueuePolicy::Single,
                    |range| {
                        let params = MemSetParams {
                            value,
                            offset: range.offset,
                            count: range.count,
                            _padding: 0,
                        };
                        let params_buffer = create_buffer_init(
                            device,
                            "MemSet Params",
                            bytemuck::bytes_of(&params),
                            wgpu::BufferUsages::UNIFORM,
                        )?;
                        Ok(kernel.bind_group(device, &[&params_buffer, buffer]))
                    },
                )
            }
        }
    }
}
