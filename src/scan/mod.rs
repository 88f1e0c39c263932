//! Hierarchical exclusive prefix sum
//!
//! `dst[0] = 0`, `dst[i] = dst[i - 1] + src[i - 1]` with wrapping u32 addition.
//! Lengths are restricted to powers of two in the short range `[4, 1024]` or
//! the large range `[2048, 262144]`, and a batch may not exceed the scratch
//! buffer's capacity. Violations are reported as `Bounds` errors before any
//! device work is recorded.

use bytemuck::{Pod, Zeroable};
use std::sync::Arc;
use wgpu::{Buffer, Device};

use crate::compute::{
    create_buffer, create_buffer_init, workgroup_grid, Binding, Context, Kernel, Lane,
    SCAN_KERNEL,
};
use crate::constants::scan::{
    LOCAL_MEMORY_BYTES, MAX_BATCH_ELEMENTS, MAX_LARGE_ARRAY_SIZE, MAX_SHORT_ARRAY_SIZE,
    MIN_LARGE_ARRAY_SIZE, MIN_SHORT_ARRAY_SIZE, SCRATCH_ELEMENTS, WORKGROUP_SIZE,
};
use crate::error::{bounds_error, runtime_error, KarstError, KarstResult};

/// Which kernel sequence a length is scanned with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPath {
    /// One local pass, each array fits in a single work-group
    Short,
    /// Local pass, block-sum pass and uniform update
    Large,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ScanParams {
    elements: u32,
    segment: u32,
    write_sums: u32,
    blocks: u32,
}

/// Split `n` into `2^log2 * odd`. Zero yields `(0, 0)`.
pub fn factor_radix2(n: u32) -> (u32, u32) {
    if n == 0 {
        return (0, 0);
    }
    let log2 = n.trailing_zeros();
    (log2, n >> log2)
}

/// Round `dividend` up to a multiple of `divisor`
pub fn snap_up(dividend: u32, divisor: u32) -> u32 {
    let rem = dividend % divisor;
    if rem == 0 {
        dividend
    } else {
        dividend - rem + divisor
    }
}

/// Validate a scan request without touching the device
pub fn check_length(batch: u32, n: u32) -> KarstResult<ScanPath> {
    let (_, odd) = factor_radix2(n);
    if odd != 1 {
        return Err(bounds_error(
            "Scan::compute",
            format!("array length {} is not a power of two", n),
        ));
    }

    let path = if (MIN_SHORT_ARRAY_SIZE..=MAX_SHORT_ARRAY_SIZE).contains(&n) {
        ScanPath::Short
    } else if (MIN_LARGE_ARRAY_SIZE..=MAX_LARGE_ARRAY_SIZE).contains(&n) {
        ScanPath::Large
    } else {
        return Err(bounds_error(
            "Scan::compute",
            format!(
                "array length {} outside [{}, {}] and [{}, {}]",
                n, MIN_SHORT_ARRAY_SIZE, MAX_SHORT_ARRAY_SIZE, MIN_LARGE_ARRAY_SIZE, MAX_LARGE_ARRAY_SIZE
            ),
        ));
    };

    if batch == 0 {
        return Err(bounds_error("Scan::compute", "batch size must be at least 1"));
    }
    if batch as u64 * n as u64 > MAX_BATCH_ELEMENTS as u64 {
        return Err(bounds_error(
            "Scan::compute",
            format!(
                "batch of {} x {} exceeds {} elements",
                batch, n, MAX_BATCH_ELEMENTS
            ),
        ));
    }

    Ok(path)
}

/// Exclusive scan engine with a private block-sums buffer.
///
/// Calls on one engine must be serialised by the caller; the scratch buffer
/// is reused by every call.
pub struct Scan {
    local1: Kernel,
    local2: Kernel,
    update: Kernel,
    lane: Lane,
    scratch: Buffer,
    device: Arc<Device>,
}

impl Scan {
    pub fn new(ctx: &Context) -> KarstResult<Self> {
        let lane = select_lane(ctx.lanes())?;

        let program = ctx.build_program(SCAN_KERNEL)?;
        let bindings = [
            Binding::Uniform,
            Binding::StorageRead,
            Binding::Storage,
            Binding::Storage,
        ];
        let local1 = program.kernel("scanExclusiveLocal1", &bindings, WORKGROUP_SIZE)?;
        let local2 = program.kernel("scanExclusiveLocal2", &bindings, WORKGROUP_SIZE)?;
        let update = program.kernel("uniformUpdate", &bindings, WORKGROUP_SIZE)?;

        let scratch = create_buffer(
            ctx.device(),
            "Scan Block Sums",
            SCRATCH_ELEMENTS as u64 * 4,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        )?;

        log::debug!(
            "[Scan] Using lane {} ({}) with {} block sums",
            lane.index(),
            lane.adapter_name(),
            SCRATCH_ELEMENTS
        );

        Ok(Self {
            local1,
            local2,
            update,
            lane,
            scratch,
            device: ctx.device().clone(),
        })
    }

    /// Lane every scan is submitted on
    pub fn lane(&self) -> &Lane {
        &self.lane
    }

    /// Exclusive scan of the first `n` u32 of `src` into `dst`
    pub fn compute(&self, src: &Buffer, dst: &Buffer, n: u32) -> KarstResult<()> {
        self.compute_batch(src, dst, 1, n)
    }

    /// Scan `batch` consecutive arrays of `n` elements each. `src` and `dst`
    /// must be distinct buffers. The work is submitted but not waited on;
    /// later reads on the same lane observe the result.
    pub fn compute_batch(&self, src: &Buffer, dst: &Buffer, batch: u32, n: u32) -> KarstResult<()> {
        let path = check_length(batch, n)?;
        let elements = batch * n;

        let bytes = elements as u64 * 4;
        if src.size() < bytes || dst.size() < bytes {
            return Err(bounds_error(
                "Scan::compute",
                format!(
                    "buffers of {} and {} bytes cannot hold {} elements",
                    src.size(),
                    dst.size(),
                    elements
                ),
            ));
        }

        match path {
            ScanPath::Short => {
                let local1 = ScanParams {
                    elements,
                    segment: n / 4,
                    write_sums: 0,
                    blocks: 0,
                };
                self.submit(src, dst, &[(&self.local1, local1, elements / 4)])?;
            }
            ScanPath::Large => {
                let blocks = elements / (4 * WORKGROUP_SIZE);
                let local1 = ScanParams {
                    elements,
                    segment: WORKGROUP_SIZE,
                    write_sums: 1,
                    blocks,
                };
                let local2 = ScanParams {
                    elements,
                    segment: n / (4 * WORKGROUP_SIZE),
                    write_sums: 0,
                    blocks,
                };
                let update = ScanParams {
                    elements,
                    segment: WORKGROUP_SIZE,
                    write_sums: 0,
                    blocks,
                };
                self.submit(
                    src,
                    dst,
                    &[
                        (&self.local1, local1, elements / 4),
                        (&self.local2, local2, snap_up(blocks, WORKGROUP_SIZE)),
                        (&self.update, update, elements / 4),
                    ],
                )?;
            }
        }

        log::debug!("[Scan] {:?} scan of {} x {} elements", path, batch, n);
        Ok(())
    }

    /// Record the phases as consecutive passes of one encoder
    fn submit(
        &self,
        src: &Buffer,
        dst: &Buffer,
        phases: &[(&Kernel, ScanParams, u32)],
    ) -> KarstResult<()> {
        let mut params_buffers = Vec::with_capacity(phases.len());
        for (kernel, params, _) in phases {
            params_buffers.push(create_buffer_init(
                &self.device,
                kernel.name(),
                bytemuck::bytes_of(params),
                wgpu::BufferUsages::UNIFORM,
            )?);
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Scan Encoder"),
        });
        for ((kernel, _, threads), params_buffer) in phases.iter().zip(&params_buffers) {
            let bind_group =
                kernel.bind_group(&self.device, &[params_buffer, src, dst, &self.scratch]);
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.name()),
                timestamp_writes: None,
            });
            pass.set_pipeline(kernel.pipeline());
            pass.set_bind_group(0, &bind_group, &[]);
            let (x, y) = workgroup_grid(*threads, kernel.threads_per_group());
            pass.dispatch_workgroups(x, y, 1);
        }
        self.lane.queue().submit(std::iter::once(encoder.finish()));

        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(runtime_error("Scan::compute", error)),
            None => Ok(()),
        }
    }
}

/// First lane able to run the scan kernels
fn select_lane(lanes: &[Lane]) -> KarstResult<Lane> {
    lanes
        .iter()
        .find(|lane| lane_supports_scan(lane.limits()))
        .cloned()
        .ok_or_else(|| KarstError::DeviceCapability {
            component: "Scan".to_string(),
            requirement: format!(
                "{} invocations per work-group and {} bytes of work-group memory",
                WORKGROUP_SIZE, LOCAL_MEMORY_BYTES
            ),
        })
}

pub(crate) fn lane_supports_scan(limits: &wgpu::Limits) -> bool {
    limits.max_compute_invocations_per_workgroup >= WORKGROUP_SIZE
        && limits.max_compute_workgroup_size_x >= WORKGROUP_SIZE
        && limits.max_compute_workgroup_storage_size >= LOCAL_MEMORY_BYTES
}
