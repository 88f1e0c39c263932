//! Block-by-block surface extraction
//!
//! The domain is tiled with equally sized cubic blocks. Each block gets its own
//! grid, the whole blob list is rasterized into it and its surface extracted,
//! so blocks are independent and a run can stop between any two of them.

use glam::{UVec3, Vec3};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::blob::{Blob, BlobEvaluator};
use crate::compute::Context;
use crate::config::ExtractionConfig;
use crate::error::{bounds_error, KarstResult};
use crate::grid::Grid;
use crate::marching_cubes::{MarchingCubes, McMesh};
use crate::scan::Scan;

/// Tiling of the domain into blocks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockLayout {
    /// Minimum corner of the first block
    pub start_point: Vec3,
    /// Blocks along each axis
    pub blocks: UVec3,
    /// World extent of one block
    pub block_size: Vec3,
    /// log2 of the voxels per axis in one block
    pub log_block_dim: u32,
}

impl BlockLayout {
    /// Voxels per block along each axis
    pub fn block_dim(&self) -> KarstResult<UVec3> {
        1u32.checked_shl(self.log_block_dim)
            .map(UVec3::splat)
            .ok_or_else(|| {
                bounds_error(
                    "BlockLayout::block_dim",
                    format!("log2 block dimension {} is too large", self.log_block_dim),
                )
            })
    }

    pub fn voxel_size(&self) -> KarstResult<Vec3> {
        Ok(self.block_size / self.block_dim()?.as_vec3())
    }

    pub fn block_count(&self) -> u64 {
        self.blocks.x as u64 * self.blocks.y as u64 * self.blocks.z as u64
    }

    /// Minimum corner of block `(i, j, k)`
    pub fn block_start(&self, i: u32, j: u32, k: u32) -> Vec3 {
        self.start_point + self.block_size * UVec3::new(i, j, k).as_vec3()
    }
}

/// Owns one instance of every pipeline stage
pub struct Mesher<'a> {
    ctx: &'a Context,
    blob: BlobEvaluator,
    mc: MarchingCubes,
    iso_value: f32,
}

impl<'a> Mesher<'a> {
    pub fn new(ctx: &'a Context, config: &ExtractionConfig) -> KarstResult<Self> {
        let blob = BlobEvaluator::new(ctx, config)?;
        let scan = Arc::new(Scan::new(ctx)?);
        let mc = MarchingCubes::new(ctx, scan, config)?;

        Ok(Self {
            ctx,
            blob,
            mc,
            iso_value: config.iso_value,
        })
    }

    pub fn iso_value(&self) -> f32 {
        self.iso_value
    }

    /// Extract every block in x-major order. Once `bailout` is raised no new
    /// block is started and the meshes produced so far are returned.
    pub fn run(
        &self,
        blobs: &[Blob],
        layout: &BlockLayout,
        bailout: &AtomicBool,
    ) -> KarstResult<Vec<McMesh>> {
        let dim = layout.block_dim()?;
        let voxel_size = layout.voxel_size()?;
        let total = layout.block_count();

        log::debug!(
            "[Mesher] {} blocks of {}^3 voxels, {} blobs",
            total,
            dim.x,
            blobs.len()
        );

        let mut meshes = Vec::new();
        let mut vertices = 0usize;
        let mut grid = Grid::new(self.ctx, dim, voxel_size, layout.start_point)?;

        'blocks: for i in 0..layout.blocks.x {
            for j in 0..layout.blocks.y {
                for k in 0..layout.blocks.z {
                    if bailout.load(Ordering::Relaxed) {
                        log::info!(
                            "[Mesher] Bailout requested after {}/{} blocks",
                            meshes.len(),
                            total
                        );
                        break 'blocks;
                    }

                    grid.set_start_pos(layout.block_start(i, j, k));
                    grid.clear(0.0)?;
                    self.blob.run_blob(blobs, &mut grid)?;
                    let mesh = self.mc.compute(&mut grid, self.iso_value)?;

                    vertices += mesh.len();
                    meshes.push(mesh);
                    log::debug!(
                        "[Mesher] Processed blocks {}/{}, vertices generated {}",
                        meshes.len(),
                        total,
                        vertices
                    );
                }
            }
        }

        Ok(meshes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(log_block_dim: u32) -> BlockLayout {
        BlockLayout {
            start_point: Vec3::new(-1.0, 0.0, 2.0),
            blocks: UVec3::new(4, 4, 4),
            block_size: Vec3::splat(10.0),
            log_block_dim,
        }
    }

    #[test]
    fn test_block_geometry() {
        let layout = layout(5);
        assert_eq!(layout.block_dim().unwrap(), UVec3::splat(32));
        assert_eq!(layout.voxel_size().unwrap(), Vec3::splat(10.0 / 32.0));
        assert_eq!(layout.block_count(), 64);
        assert_eq!(layout.block_start(0, 0, 0), Vec3::new(-1.0, 0.0, 2.0));
        assert_eq!(layout.block_start(1, 2, 3), Vec3::new(9.0, 20.0, 32.0));
    }

    #[test]
    fn test_oversized_block_dim_is_rejected() {
        assert!(layout(32).block_dim().is_err());
        assert!(layout(40).voxel_size().is_err());
    }
}
