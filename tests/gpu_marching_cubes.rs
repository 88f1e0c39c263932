/// GPU Marching Cubes Tests
///
/// Flat-boundary fixtures at both ends of the scan order, padded and
/// unpadded, the empty-surface short circuit, a blob sphere and the
/// scan-length bound.

use glam::{UVec3, Vec3};
use karstgen::{
    Blob, BlobEvaluator, ComputeConfig, Context, ExtractionConfig, Grid, KarstError,
    MarchingCubes, QueuePolicy, Scan, Storage,
};
use std::sync::Arc;

/// Initialize a compute context with `lanes` queue lanes
fn init_gpu(lanes: usize) -> Option<Context> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))?;

    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("GPU Test Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
        },
        None,
    ))
    .ok()?;

    let config = ComputeConfig {
        queue_lanes: lanes,
        ..Default::default()
    };
    let info = adapter.get_info();
    let ctx = Context::from_device(Arc::new(device), Arc::new(queue), &info, &config)
        .expect("context over a working device");
    Some(ctx)
}

fn extractor(ctx: &Context, config: &ExtractionConfig) -> MarchingCubes {
    let scan = Arc::new(Scan::new(ctx).expect("scan engine"));
    MarchingCubes::new(ctx, scan, config).expect("marching cubes")
}

/// 64^3 voxels, bottom sample plane at -1 and everything else at +1
fn flat_boundary_grid(ctx: &Context) -> Grid {
    let mut grid = Grid::new(ctx, UVec3::splat(64), Vec3::ONE, Vec3::ZERO).expect("grid");
    let plane = 65 * 65;
    for (index, sample) in grid.values_mut().expect("host values").iter_mut().enumerate() {
        let value = if index < plane { -1.0 } else { 1.0 };
        *sample = [0.0, 0.0, 0.0, value];
    }
    grid
}

#[test]
fn test_flat_boundary_yields_two_triangles_per_voxel() {
    let Some(ctx) = init_gpu(1) else {
        println!("Skipping GPU test - no GPU available");
        return;
    };
    let mc = extractor(&ctx, &ExtractionConfig::default());

    let mut grid = flat_boundary_grid(&ctx);
    let mesh = mc.compute(&mut grid, 0.0).expect("compute");

    assert_eq!(mesh.len(), 64 * 64 * 6);
    assert_eq!(mesh.normals.len(), mesh.vertices.len());
    assert_eq!(mesh.triangle_count(), 64 * 64 * 2);
    for v in &mesh.vertices {
        assert!((v.z - 0.5).abs() < 1e-6, "vertex off the plane: {:?}", v);
        assert!((0.0..=64.0).contains(&v.x) && (0.0..=64.0).contains(&v.y));
    }
    assert_eq!(grid.storage(), Storage::Device);
}

/// Top sample plane at -1 and everything else at +1, so the last voxel in
/// scan order is occupied
fn top_boundary_grid(ctx: &Context, dim: UVec3) -> Grid {
    let mut grid = Grid::new(ctx, dim, Vec3::ONE, Vec3::ZERO).expect("grid");
    let values = grid.values_mut().expect("host values");
    let plane = ((dim.x + 1) * (dim.y + 1)) as usize;
    let first_top = values.len() - plane;
    for (index, sample) in values.iter_mut().enumerate() {
        let value = if index >= first_top { -1.0 } else { 1.0 };
        *sample = [0.0, 0.0, 0.0, value];
    }
    grid
}

#[test]
fn test_last_voxel_counts_toward_totals() {
    let Some(ctx) = init_gpu(1) else {
        println!("Skipping GPU test - no GPU available");
        return;
    };
    let mc = extractor(&ctx, &ExtractionConfig::default());

    // 64^3 fills the scan exactly, no padding
    let mut grid = top_boundary_grid(&ctx, UVec3::splat(64));
    let mesh = mc.compute(&mut grid, 0.0).expect("compute");
    assert_eq!(mesh.len(), 64 * 64 * 6);
    assert!(mesh.vertices.iter().all(|v| (v.z - 63.5).abs() < 1e-5));
}

#[test]
fn test_last_voxel_counts_toward_totals_when_padded() {
    let Some(ctx) = init_gpu(1) else {
        println!("Skipping GPU test - no GPU available");
        return;
    };
    let mc = extractor(&ctx, &ExtractionConfig::default());

    for dim in [UVec3::new(5, 7, 3), UVec3::new(16, 16, 8)] {
        let mut grid = top_boundary_grid(&ctx, dim);
        let mesh = mc.compute(&mut grid, 0.0).expect("compute");
        assert_eq!(mesh.len(), (dim.x * dim.y * 6) as usize, "grid {:?}", dim);
        let top = dim.z as f32 - 0.5;
        assert!(mesh.vertices.iter().all(|v| (v.z - top).abs() < 1e-5));
    }
}

#[test]
fn test_flat_boundary_with_split_launches() {
    let Some(ctx) = init_gpu(3) else {
        println!("Skipping GPU test - no GPU available");
        return;
    };
    let config = ExtractionConfig {
        classify_policy: QueuePolicy::Split,
        compact_policy: QueuePolicy::Split,
        generate_policy: QueuePolicy::Split,
        ..Default::default()
    };
    let single = extractor(&ctx, &ExtractionConfig::default());
    let split = extractor(&ctx, &config);

    let expected = single
        .compute(&mut flat_boundary_grid(&ctx), 0.0)
        .expect("single compute");
    let mesh = split
        .compute(&mut flat_boundary_grid(&ctx), 0.0)
        .expect("split compute");
    assert_eq!(mesh, expected);
}

#[test]
fn test_uniform_field_gives_empty_mesh() {
    let Some(ctx) = init_gpu(1) else {
        println!("Skipping GPU test - no GPU available");
        return;
    };
    let mc = extractor(&ctx, &ExtractionConfig::default());

    let mut grid = Grid::new(&ctx, UVec3::splat(32), Vec3::ONE, Vec3::ZERO).expect("grid");
    grid.clear(1.0).expect("clear");
    let mesh = mc.compute(&mut grid, 0.0).expect("compute");
    assert!(mesh.is_empty());

    grid.clear(-1.0).expect("device clear");
    assert!(mc.compute(&mut grid, 0.0).expect("compute").is_empty());
}

#[test]
fn test_blob_sphere_surface() {
    let Some(ctx) = init_gpu(1) else {
        println!("Skipping GPU test - no GPU available");
        return;
    };
    let config = ExtractionConfig::default();
    let evaluator = BlobEvaluator::new(&ctx, &config).expect("evaluator");
    let mc = extractor(&ctx, &config);

    let centre = Vec3::new(16.3, 16.1, 15.7);
    let radius = 8.0;
    let mut grid = Grid::new(&ctx, UVec3::splat(32), Vec3::ONE, Vec3::ZERO).expect("grid");
    grid.clear(0.0).expect("clear");
    evaluator
        .run_blob(&[Blob::new(centre, radius)], &mut grid)
        .expect("run_blob");

    // m^2 / d^2 = 1 on the sphere of radius m
    let mesh = mc.compute(&mut grid, 1.0).expect("compute");
    assert!(mesh.triangle_count() > 100);
    for (v, n) in mesh.vertices.iter().zip(&mesh.normals) {
        let offset = *v - centre;
        assert!((offset.length() - radius).abs() < 0.35, "vertex {:?} off the sphere", v);
        assert!((n.length() - 1.0).abs() < 1e-3);
        assert!(n.dot(offset.normalize()) > 0.9, "normal {:?} not outward at {:?}", n, v);
    }
}

#[test]
fn test_grid_too_large_to_scan_is_rejected() {
    let Some(ctx) = init_gpu(1) else {
        println!("Skipping GPU test - no GPU available");
        return;
    };
    let mc = extractor(&ctx, &ExtractionConfig::default());

    let mut grid = Grid::new(&ctx, UVec3::new(65, 64, 64), Vec3::ONE, Vec3::ZERO).expect("grid");
    let err = mc.compute(&mut grid, 0.0).unwrap_err();
    assert!(matches!(err, KarstError::Bounds { .. }));
    assert_eq!(grid.storage(), Storage::Host);
}
