/// GPU Grid and Blob Field Tests
///
/// Verifies grid residency transitions, device-side clearing and that the
/// blob field does not depend on chunking or on how launches are split.

use glam::{UVec3, Vec3};
use karstgen::{
    Blob, BlobEvaluator, ComputeConfig, Context, ExtractionConfig, Grid, KarstError, QueuePolicy,
    Sample, Storage,
};
use std::sync::Arc;

/// Tolerance for floating point comparisons
const FLOAT_TOLERANCE: f32 = 1e-3;

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

fn test_blobs() -> Vec<Blob> {
    (0..11)
        .map(|i| {
            let t = i as f32;
            Blob::new(
                Vec3::new(1.0 + (t * 0.7) % 6.0, 2.0 + (t * 1.3) % 5.0, 0.5 + (t * 2.1) % 7.0),
                0.3 + 0.05 * t,
            )
        })
        .collect()
}

fn evaluate(ctx: &Context, evaluator: &BlobEvaluator, blobs: &[Blob]) -> Vec<Sample> {
    let mut grid = Grid::new(ctx, UVec3::new(16, 12, 20), Vec3::splat(0.4), Vec3::new(-0.5, 0.0, 0.25))
        .expect("grid");
    grid.clear(0.0).expect("clear");
    evaluator.run_blob(blobs, &mut grid).expect("run_blob");
    assert_eq!(grid.storage(), Storage::Device);
    grid.copy_to_host().expect("copy_to_host");
    grid.values().expect("host values").to_vec()
}

fn assert_fields_match(a: &[Sample], b: &[Sample]) {
    assert_eq!(a.len(), b.len());
    for (index, (x, y)) in a.iter().zip(b).enumerate() {
        for c in 0..4 {
            let scale = x[c].abs().max(1.0);
            assert!(
                (x[c] - y[c]).abs() <= FLOAT_TOLERANCE * scale,
                "sample {} component {}: {} vs {}",
                index,
                c,
                x[c],
                y[c]
            );
        }
    }
}

#[test]
fn test_grid_round_trip_is_bit_identical() {
    let Some(ctx) = init_gpu(1) else {
        println!("Skipping GPU test - no GPU available");
        return;
    };

    let mut grid = Grid::new(&ctx, UVec3::new(7, 5, 3), Vec3::ONE, Vec3::ZERO).expect("grid");
    for (i, sample) in grid.values_mut().expect("host values").iter_mut().enumerate() {
        let f = i as f32;
        *sample = [f * 0.5, -f, f.sin(), 1.0 / (f + 1.0)];
    }
    let original = grid.values().expect("host values").to_vec();

    grid.copy_to_device().expect("copy_to_device");
    assert_eq!(grid.storage(), Storage::Device);
    assert!(grid.values().is_err());
    grid.copy_to_host().expect("copy_to_host");
    assert_eq!(grid.storage(), Storage::Host);
    assert!(grid.device_buffer().is_err());

    let restored = grid.values().expect("host values");
    for (a, b) in original.iter().zip(restored) {
        for c in 0..4 {
            assert_eq!(a[c].to_bits(), b[c].to_bits());
        }
    }
}

#[test]
fn test_residency_transitions_are_idempotent() {
    let Some(ctx) = init_gpu(1) else {
        println!("Skipping GPU test - no GPU available");
        return;
    };

    let mut grid = Grid::new(&ctx, UVec3::splat(4), Vec3::ONE, Vec3::ZERO).expect("grid");
    grid.copy_to_host().expect("copy_to_host on host grid");
    assert_eq!(grid.transfer_count(), 0);

    grid.copy_to_device().expect("first copy");
    grid.copy_to_device().expect("second copy");
    assert_eq!(grid.transfer_count(), 1);

    grid.copy_to_host().expect("first copy back");
    grid.copy_to_host().expect("second copy back");
    assert_eq!(grid.transfer_count(), 2);
}

#[test]
fn test_device_clear_resets_samples() {
    let Some(ctx) = init_gpu(1) else {
        println!("Skipping GPU test - no GPU available");
        return;
    };

    let mut grid = Grid::new(&ctx, UVec3::new(9, 9, 9), Vec3::ONE, Vec3::ZERO).expect("grid");
    grid.values_mut().expect("host values").fill([1.0, 2.0, 3.0, 4.0]);
    grid.copy_to_device().expect("copy_to_device");

    grid.clear(2.5).expect("device clear");
    assert_eq!(grid.storage(), Storage::Device);

    grid.copy_to_host().expect("copy_to_host");
    assert!(grid
        .values()
        .expect("host values")
        .iter()
        .all(|s| *s == [0.0, 0.0, 0.0, 2.5]));
}

#[test]
fn test_oversized_grid_is_rejected() {
    let Some(ctx) = init_gpu(1) else {
        println!("Skipping GPU test - no GPU available");
        return;
    };

    let err = Grid::new(&ctx, UVec3::splat(4096), Vec3::ONE, Vec3::ZERO).err();
    assert!(matches!(err, Some(KarstError::Bounds { .. })));
}

#[test]
fn test_blob_field_matches_host_evaluation() {
    let Some(ctx) = init_gpu(1) else {
        println!("Skipping GPU test - no GPU available");
        return;
    };
    let evaluator = BlobEvaluator::new(&ctx, &ExtractionConfig::default()).expect("evaluator");
    let blobs = test_blobs();

    let field = evaluate(&ctx, &evaluator, &blobs);
    let dim = UVec3::new(16, 12, 20);
    let grid = Grid::new(&ctx, dim, Vec3::splat(0.4), Vec3::new(-0.5, 0.0, 0.25)).expect("grid");

    for (x, y, z) in [(0, 0, 0), (3, 7, 11), (16, 12, 20), (9, 1, 17)] {
        let p = grid.sample_position(x, y, z);
        let (mut value, mut gradient) = (0.0f32, Vec3::ZERO);
        for blob in &blobs {
            let (v, g) = blob.contribution(p);
            value += v;
            gradient += g;
        }
        let expected = [gradient.x, gradient.y, gradient.z, value];
        assert_fields_match(&[field[grid.sample_index(x, y, z)]], &[expected]);
    }
}

#[test]
fn test_blob_superposition_over_chunk_sizes() {
    let Some(ctx) = init_gpu(1) else {
        println!("Skipping GPU test - no GPU available");
        return;
    };
    let blobs = test_blobs();
    let evaluator = BlobEvaluator::new(&ctx, &ExtractionConfig::default()).expect("evaluator");
    assert!(evaluator.chunk_capacity() >= blobs.len() as u32);

    let whole = evaluate(&ctx, &evaluator, &blobs);
    for chunk_size in [1u32, 3, 4] {
        let chunked = BlobEvaluator::new(&ctx, &ExtractionConfig::default())
            .expect("evaluator")
            .with_chunk_size(chunk_size);
        assert_eq!(chunked.chunk_size(), chunk_size);
        assert_fields_match(&whole, &evaluate(&ctx, &chunked, &blobs));
    }
}

#[test]
fn test_blob_split_policy_matches_single() {
    let Some(ctx) = init_gpu(3) else {
        println!("Skipping GPU test - no GPU available");
        return;
    };
    assert_eq!(ctx.lanes().len(), 3);
    let blobs = test_blobs();

    let single = BlobEvaluator::new(&ctx, &ExtractionConfig::default())
        .expect("evaluator")
        .with_policy(QueuePolicy::Single);
    let split = BlobEvaluator::new(&ctx, &ExtractionConfig::default())
        .expect("evaluator")
        .with_policy(QueuePolicy::Split);

    assert_fields_match(&evaluate(&ctx, &single, &blobs), &evaluate(&ctx, &split, &blobs));
}

#[test]
fn test_empty_blob_list_only_moves_grid() {
    let Some(ctx) = init_gpu(1) else {
        println!("Skipping GPU test - no GPU available");
        return;
    };
    let evaluator = BlobEvaluator::new(&ctx, &ExtractionConfig::default()).expect("evaluator");

    let field = evaluate(&ctx, &evaluator, &[]);
    assert!(field.iter().all(|s| *s == [0.0; 4]));
}
