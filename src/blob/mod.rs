//! Blob field rasterizer
//!
//! Adds the field of every blob to the samples of a device-resident grid.
//! Blobs travel to the kernel through a uniform block, so a list longer than
//! the block's capacity is uploaded and evaluated chunk by chunk. The kernel
//! accumulates, so the chunking never changes the result.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use std::sync::Arc;
use wgpu::Device;

use crate::compute::{
    create_buffer, create_buffer_init, run_1d_kernel, Binding, Context, Kernel, Lane,
    QueuePolicy, BLOB_KERNEL,
};
use crate::config::ExtractionConfig;
use crate::constants::{blob::BLOB_RECORD_BYTES, kernels::BLOB_THREADS_PER_WG};
use crate::error::KarstResult;
use crate::grid::Grid;

/// Implicit-surface primitive: position plus radius-like magnitude
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Blob {
    pub position: [f32; 3],
    pub magnitude: f32,
}

impl Blob {
    pub fn new(position: Vec3, magnitude: f32) -> Self {
        Self {
            position: position.to_array(),
            magnitude,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    /// Field value and gradient of this blob at `p`, as evaluated on the device
    pub fn contribution(&self, p: Vec3) -> (f32, Vec3) {
        let offset = p - self.position();
        let d2 = offset
            .length_squared()
            .max(crate::constants::blob::MIN_DISTANCE_SQUARED);
        let m2 = self.magnitude * self.magnitude;
        (m2 / d2, offset * (-2.0 * m2 / (d2 * d2)))
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct BlobParams {
    start_pos: [f32; 4],
    voxel_size: [f32; 4],
    dim: [u32; 4],
    range: [u32; 4],
}

/// Evaluates blob lists into grids
pub struct BlobEvaluator {
    kernel: Kernel,
    device: Arc<Device>,
    lanes: Vec<Lane>,
    capacity: u32,
    chunk_size: u32,
    policy: QueuePolicy,
}

impl BlobEvaluator {
    pub fn new(ctx: &Context, config: &ExtractionConfig) -> KarstResult<Self> {
        let program = ctx.build_program(BLOB_KERNEL)?;
        let kernel = program.kernel(
            "blobValue",
            &[Binding::Uniform, Binding::Uniform, Binding::Storage],
            BLOB_THREADS_PER_WG,
        )?;

        let capacity = ctx.blob_capacity().max(1);
        let chunk_size = config.blobs_per_chunk.unwrap_or(capacity).clamp(1, capacity);
        log::debug!(
            "[BlobEvaluator] Chunk capacity {}, using chunks of {}",
            capacity,
            chunk_size
        );

        Ok(Self {
            kernel,
            device: ctx.device().clone(),
            lanes: ctx.lanes().to_vec(),
            capacity,
            chunk_size,
            policy: config.blob_policy,
        })
    }

    /// Override the chunk size; clamped to `[1, chunk_capacity()]`
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size.clamp(1, self.capacity);
        self
    }

    pub fn with_policy(mut self, policy: QueuePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Largest number of blobs a single upload can carry on this device
    pub fn chunk_capacity(&self) -> u32 {
        self.capacity
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    /// Add the field of `blobs` to `grid`. The grid is moved to the device
    /// and left there.
    pub fn run_blob(&self, blobs: &[Blob], grid: &mut Grid) -> KarstResult<()> {
        grid.copy_to_device()?;
        if blobs.is_empty() {
            return Ok(());
        }

        let blob_buffer = create_buffer(
            &self.device,
            "Blob Chunk",
            self.capacity as u64 * BLOB_RECORD_BYTES as u64,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        )?;

        let samples = grid.device_buffer()?;
        let global = grid.sample_count() as u32;
        let dim = grid.dim();
        let start_pos = grid.start_pos();
        let voxel_size = grid.voxel_size();

        for (index, chunk) in blobs.chunks(self.chunk_size as usize).enumerate() {
            self.lanes[0]
                .queue()
                .write_buffer(&blob_buffer, 0, bytemuck::cast_slice(chunk));

            run_1d_kernel(
                &self.device,
                &self.lanes,
                &self.kernel,
                global,
                self.policy,
                |range| {
                    let params = BlobParams {
                        start_pos: start_pos.extend(0.0).to_array(),
                        voxel_size: voxel_size.extend(0.0).to_array(),
                        dim: [dim.x, dim.y, dim.z, chunk.len() as u32],
                        range: [range.offset, range.count, 0, 0],
                    };
                    let params_buffer = create_buffer_init(
                        &self.device,
                        "Blob Params",
                        bytemuck::bytes_of(&params),
                        wgpu::BufferUsages::UNIFORM,
                    )?;
                    Ok(self
                        .kernel
                        .bind_group(&self.device, &[&params_buffer, &blob_buffer, samples]))
                },
            )?;

            log::debug!(
                "[BlobEvaluator] Chunk {} with {} blobs over {} samples",
                index,
                chunk.len(),
                global
            );
        }

        Ok(())
    }
}
