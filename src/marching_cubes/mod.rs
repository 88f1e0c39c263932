//! Marching cubes isosurface extraction
//!
//! Pipeline per grid:
//! 1. classify every voxel (vertex count and occupancy)
//! 2. scan occupancy, read back the active voxel count
//! 3. compact occupied voxel indices into a dense list
//! 4. scan vertex counts, read back the vertex total
//! 5. generate triangles for the active voxels only
//! 6. read back positions and normals
//!
//! Scan lengths must be powers of two in the scan engine's large range, so
//! the per-voxel arrays are zero-padded to `padded_scan_length`. Totals are
//! rebuilt from the last padded slot as raw value plus exclusive scan.

pub mod tables;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use std::sync::Arc;
use wgpu::{Buffer, Device};

use crate::compute::{
    create_buffer, create_buffer_init, read_buffer, read_element, run_1d_kernel, Binding,
    Context, Kernel, Lane, QueuePolicy, MARCHING_CUBES_KERNEL,
};
use crate::config::ExtractionConfig;
use crate::constants::kernels::{
    CLASSIFY_THREADS_PER_WG, COMPACT_THREADS_PER_WG, GENERATE_THREADS_PER_WG,
};
use crate::constants::scan::{MAX_LARGE_ARRAY_SIZE, MIN_LARGE_ARRAY_SIZE};
use crate::error::{bounds_error, KarstResult};
use crate::grid::Grid;
use crate::scan::Scan;

/// Raw triangle soup: vertex `3 * t + k` is corner `k` of triangle `t`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct McMesh {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
}

impl McMesh {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Vertex positions grouped per triangle
    pub fn triangles(&self) -> impl Iterator<Item = &[Vec3]> {
        self.vertices.chunks_exact(3)
    }
}

/// Scan length covering `num_voxels`: the next power of two, at least the
/// scan engine's smallest large array
pub fn padded_scan_length(num_voxels: u64) -> KarstResult<u32> {
    let padded = num_voxels.max(1).next_power_of_two().max(MIN_LARGE_ARRAY_SIZE as u64);
    if padded > MAX_LARGE_ARRAY_SIZE as u64 {
        return Err(bounds_error(
            "MarchingCubes::compute",
            format!(
                "{} voxels exceed the scannable maximum of {}",
                num_voxels, MAX_LARGE_ARRAY_SIZE
            ),
        ));
    }
    Ok(padded as u32)
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct McParams {
    dim: [u32; 4],
    voxel_size: [f32; 4],
    start_pos: [f32; 4],
    range: [u32; 4],
}

/// Lookup tables uploaded once per extractor
struct MarchTables {
    num_verts: Buffer,
    tri: Buffer,
}

impl MarchTables {
    fn upload(device: &Device) -> KarstResult<Self> {
        let num_verts = create_buffer_init(
            device,
            "MC Num Verts Table",
            bytemuck::cast_slice(&tables::NUM_VERTS_TABLE),
            wgpu::BufferUsages::STORAGE,
        )?;
        let tri = create_buffer_init(
            device,
            "MC Tri Table",
            bytemuck::cast_slice(&tables::TRI_TABLE),
            wgpu::BufferUsages::STORAGE,
        )?;
        Ok(Self { num_verts, tri })
    }
}

/// Per-voxel intermediates of one extraction
struct VoxelBuffers {
    verts: Buffer,
    occupied: Buffer,
    occupied_scan: Buffer,
    verts_scan: Buffer,
}

impl VoxelBuffers {
    fn new(device: &Device, padded: u32) -> KarstResult<Self> {
        let size = padded as u64 * 4;
        let usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC;
        Ok(Self {
            verts: create_buffer(device, "MC Voxel Verts", size, usage)?,
            occupied: create_buffer(device, "MC Voxel Occupied", size, usage)?,
            occupied_scan: create_buffer(device, "MC Occupied Scan", size, usage)?,
            verts_scan: create_buffer(device, "MC Verts Scan", size, usage)?,
        })
    }
}

/// Three-kernel marching cubes extractor over a shared scan engine
pub struct MarchingCubes {
    classify: Kernel,
    compact: Kernel,
    generate: Kernel,
    tables: MarchTables,
    scan: Arc<Scan>,
    device: Arc<Device>,
    lanes: Vec<Lane>,
    classify_policy: QueuePolicy,
    compact_policy: QueuePolicy,
    generate_policy: QueuePolicy,
}

impl MarchingCubes {
    pub fn new(ctx: &Context, scan: Arc<Scan>, config: &ExtractionConfig) -> KarstResult<Self> {
        let program = ctx.build_program(MARCHING_CUBES_KERNEL)?;
        let classify = program.kernel(
            "classifyVoxel",
            &[
                Binding::Uniform,
                Binding::StorageRead,
                Binding::StorageRead,
                Binding::Storage,
                Binding::Storage,
            ],
            CLASSIFY_THREADS_PER_WG,
        )?;
        let compact = program.kernel(
            "compactVoxels",
            &[
                Binding::Uniform,
                Binding::StorageRead,
                Binding::StorageRead,
                Binding::Storage,
            ],
            COMPACT_THREADS_PER_WG,
        )?;
        let generate = program.kernel(
            "generateTriangles",
            &[
                Binding::Uniform,
                Binding::StorageRead,
                Binding::StorageRead,
                Binding::StorageRead,
                Binding::StorageRead,
                Binding::StorageRead,
                Binding::Storage,
                Binding::Storage,
            ],
            GENERATE_THREADS_PER_WG,
        )?;

        let tables = MarchTables::upload(ctx.device())?;

        Ok(Self {
            classify,
            compact,
            generate,
            tables,
            scan,
            device: ctx.device().clone(),
            lanes: ctx.lanes().to_vec(),
            classify_policy: config.classify_policy,
            compact_policy: config.compact_policy,
            generate_policy: config.generate_policy,
        })
    }

    /// Extract the `iso_value` surface of `grid`. The grid is moved to the
    /// device and stays there.
    pub fn compute(&self, grid: &mut Grid, iso_value: f32) -> KarstResult<McMesh> {
        let num_voxels = grid.voxel_count();
        let padded = padded_scan_length(num_voxels)?;
        grid.copy_to_device()?;
        if num_voxels == 0 {
            return Ok(McMesh::empty());
        }

        let params = McParams {
            dim: [grid.dim().x, grid.dim().y, grid.dim().z, num_voxels as u32],
            voxel_size: grid.voxel_size().extend(iso_value).to_array(),
            start_pos: grid.start_pos().extend(0.0).to_array(),
            range: [0; 4],
        };
        let field = grid.device_buffer()?;
        let voxels = VoxelBuffers::new(&self.device, padded)?;

        self.launch_classify(&params, field, &voxels)?;

        self.scan.compute(&voxels.occupied, &voxels.occupied_scan, padded)?;
        let active = self.reconstruct_total(&voxels.occupied, &voxels.occupied_scan, padded)?;
        if active == 0 {
            log::debug!("[MarchingCubes] No active voxels among {}", num_voxels);
            return Ok(McMesh::empty());
        }

        let compacted = create_buffer(
            &self.device,
            "MC Compacted Voxels",
            active as u64 * 4,
            wgpu::BufferUsages::STORAGE,
        )?;
        self.launch_compact(&params, &voxels, &compacted)?;

        self.scan.compute(&voxels.verts, &voxels.verts_scan, padded)?;
        let total_verts = self.reconstruct_total(&voxels.verts, &voxels.verts_scan, padded)?;
        if total_verts == 0 {
            return Ok(McMesh::empty());
        }

        let output_size = total_verts as u64 * 16;
        let output_usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC;
        let positions = create_buffer(&self.device, "MC Positions", output_size, output_usage)?;
        let normals = create_buffer(&self.device, "MC Normals", output_size, output_usage)?;

        let outputs = GenerateOutputs {
            positions: &positions,
            normals: &normals,
            total_verts,
        };
        self.launch_generate(&params, field, &voxels, &compacted, active, &outputs)?;

        let queue = self.scan.lane().queue();
        let raw_positions: Vec<[f32; 4]> =
            read_buffer(&self.device, queue, &positions, 0, total_verts as usize)?;
        let raw_normals: Vec<[f32; 4]> =
            read_buffer(&self.device, queue, &normals, 0, total_verts as usize)?;

        log::debug!(
            "[MarchingCubes] {} active voxels of {}, {} vertices",
            active,
            num_voxels,
            total_verts
        );

        Ok(McMesh {
            vertices: raw_positions.iter().map(|v| Vec3::new(v[0], v[1], v[2])).collect(),
            normals: raw_normals.iter().map(|n| Vec3::new(n[0], n[1], n[2])).collect(),
        })
    }

    /// Exclusive scan total: last raw element plus last scanned element
    fn reconstruct_total(&self, raw: &Buffer, scanned: &Buffer, padded: u32) -> KarstResult<u32> {
        let queue = self.scan.lane().queue();
        let last = padded as u64 - 1;
        let raw_last: u32 = read_element(&self.device, queue, raw, last)?;
        let scan_last: u32 = read_element(&self.device, queue, scanned, last)?;
        Ok(raw_last.wrapping_add(scan_last))
    }

    fn launch_classify(&self, base: &McParams, field: &Buffer, voxels: &VoxelBuffers) -> KarstResult<()> {
        let global = base.dim[3];
        run_1d_kernel(
            &self.device,
            &self.lanes,
            &self.classify,
            global,
            self.classify_policy,
            |range| {
                let params_buffer = self.params_buffer(base, [range.offset, range.count, 0, 0])?;
                Ok(self.classify.bind_group(
                    &self.device,
                    &[
                        &params_buffer,
                        field,
                        &self.tables.num_verts,
                        &voxels.verts,
                        &voxels.occupied,
                    ],
                ))
            },
        )
    }

    fn launch_compact(&self, base: &McParams, voxels: &VoxelBuffers, compacted: &Buffer) -> KarstResult<()> {
        let global = base.dim[3];
        run_1d_kernel(
            &self.device,
            &self.lanes,
            &self.compact,
            global,
            self.compact_policy,
            |range| {
                let params_buffer = self.params_buffer(base, [range.offset, range.count, 0, 0])?;
                Ok(self.compact.bind_group(
                    &self.device,
                    &[&params_buffer, &voxels.occupied, &voxels.occupied_scan, compacted],
                ))
            },
        )
    }

    fn launch_generate(
        &self,
        base: &McParams,
        field: &Buffer,
        voxels: &VoxelBuffers,
        compacted: &Buffer,
        active: u32,
        outputs: &GenerateOutputs<'_>,
    ) -> KarstResult<()> {
        run_1d_kernel(
            &self.device,
            &self.lanes,
            &self.generate,
            active,
            self.generate_policy,
            |range| {
                let params_buffer = self.params_buffer(
                    base,
                    [range.offset, range.count, outputs.total_verts, 0],
                )?;
                Ok(self.generate.bind_group(
                    &self.device,
                    &[
                        &params_buffer,
                        field,
                        &self.tables.num_verts,
                        &self.tables.tri,
                        compacted,
                        &voxels.verts_scan,
                        outputs.positions,
                        outputs.normals,
                    ],
                ))
            },
        )
    }

    fn params_buffer(&self, base: &McParams, range: [u32; 4]) -> KarstResult<Buffer> {
        let params = McParams { range, ..*base };
        create_buffer_init(
            &self.device,
            "MC Params",
            bytemuck::bytes_of(&params),
            wgpu::BufferUsages::UNIFORM,
        )
    }
}

struct GenerateOutputs<'a> {
    positions: &'a Buffer,
    normals: &'a Buffer,
    total_verts: u32,
}

#[cfg(test)]
mod tests;
