/// GPU Scan Validation Tests
///
/// Verifies the exclusive prefix sum against a host reference on both kernel
/// paths, and that rejected lengths leave the destination untouched.

use karstgen::compute::{create_buffer_init, read_buffer};
use karstgen::{ComputeConfig, Context, KarstError, Scan};
use std::sync::Arc;

/// Initialize a compute context for tests
fn init_gpu() -> Option<Context> {
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

    let info = adapter.get_info();
    let ctx = Context::from_device(Arc::new(device), Arc::new(queue), &info, &ComputeConfig::default())
        .expect("context over a working device");
    Some(ctx)
}

fn upload(ctx: &Context, label: &str, data: &[u32]) -> wgpu::Buffer {
    create_buffer_init(
        ctx.device(),
        label,
        bytemuck::cast_slice(data),
        wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
    )
    .expect("upload")
}

fn reference_scan(src: &[u32], n: usize) -> Vec<u32> {
    let mut out = Vec::with_capacity(src.len());
    for array in src.chunks(n) {
        let mut sum = 0u32;
        for &value in array {
            out.push(sum);
            sum = sum.wrapping_add(value);
        }
    }
    out
}

/// Deterministic pseudo-random input
fn lcg_values(len: usize, seed: u32) -> Vec<u32> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            state >> 24
        })
        .collect()
}

fn scan_on_gpu(ctx: &Context, scan: &Scan, src: &[u32], batch: u32, n: u32) -> Vec<u32> {
    let src_buffer = upload(ctx, "Scan Test Src", src);
    let dst_buffer = upload(ctx, "Scan Test Dst", &vec![0u32; src.len()]);
    scan.compute_batch(&src_buffer, &dst_buffer, batch, n)
        .expect("scan");
    read_buffer(ctx.device(), scan.lane().queue(), &dst_buffer, 0, src.len()).expect("readback")
}

#[test]
fn test_scan_of_ones_counts_up() {
    let Some(ctx) = init_gpu() else {
        println!("Skipping GPU test - no GPU available");
        return;
    };
    let scan = Scan::new(&ctx).expect("scan engine");

    let result = scan_on_gpu(&ctx, &scan, &vec![1u32; 2048], 1, 2048);
    let expected: Vec<u32> = (0..2048).collect();
    assert_eq!(result, expected);
}

#[test]
fn test_scan_matches_reference_on_large_path() {
    let Some(ctx) = init_gpu() else {
        println!("Skipping GPU test - no GPU available");
        return;
    };
    let scan = Scan::new(&ctx).expect("scan engine");

    for (n, seed) in [(2048u32, 1u32), (65536, 2), (262144, 3)] {
        let src = lcg_values(n as usize, seed);
        let result = scan_on_gpu(&ctx, &scan, &src, 1, n);
        assert_eq!(result, reference_scan(&src, n as usize), "length {}", n);
    }
}

#[test]
fn test_scan_batches_are_independent() {
    let Some(ctx) = init_gpu() else {
        println!("Skipping GPU test - no GPU available");
        return;
    };
    let scan = Scan::new(&ctx).expect("scan engine");

    let src = lcg_values(4 * 4096, 7);
    let result = scan_on_gpu(&ctx, &scan, &src, 4, 4096);
    assert_eq!(result, reference_scan(&src, 4096));
    assert_eq!(result[4096], 0);
}

#[test]
fn test_scan_short_path() {
    let Some(ctx) = init_gpu() else {
        println!("Skipping GPU test - no GPU available");
        return;
    };
    let scan = Scan::new(&ctx).expect("scan engine");

    let src = lcg_values(1024, 11);
    assert_eq!(scan_on_gpu(&ctx, &scan, &src, 1, 1024), reference_scan(&src, 1024));

    let src = lcg_values(8 * 16, 13);
    assert_eq!(scan_on_gpu(&ctx, &scan, &src, 8, 16), reference_scan(&src, 16));
}

#[test]
fn test_scan_rejects_bad_lengths_without_writing() {
    let Some(ctx) = init_gpu() else {
        println!("Skipping GPU test - no GPU available");
        return;
    };
    let scan = Scan::new(&ctx).expect("scan engine");

    let src = upload(&ctx, "Scan Test Src", &vec![1u32; 4096]);
    let dst = upload(&ctx, "Scan Test Dst", &vec![7u32; 4096]);

    for n in [3000u32, 2, 524288] {
        let err = scan.compute(&src, &dst, n).unwrap_err();
        assert!(matches!(err, KarstError::Bounds { .. }), "length {} accepted", n);
    }

    // valid length, but longer than the buffers
    let err = scan.compute(&src, &dst, 8192).unwrap_err();
    assert!(matches!(err, KarstError::Bounds { .. }));

    let untouched: Vec<u32> =
        read_buffer(ctx.device(), scan.lane().queue(), &dst, 0, 4096).expect("readback");
    assert!(untouched.iter().all(|&v| v == 7));
}
