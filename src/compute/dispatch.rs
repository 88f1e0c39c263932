//! 1D kernel launches over one or several queue lanes

use serde::{Deserialize, Serialize};
use wgpu::{BindGroup, Device};

use crate::compute::context::Lane;
use crate::compute::program::Kernel;
use crate::constants::dispatch::MAX_WORKGROUPS_PER_DIMENSION;
use crate::error::{runtime_error, ComputeErrorContext, KarstResult};

/// How a launch is distributed over the context's lanes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueuePolicy {
    /// Whole launch on the first lane
    #[default]
    Single,
    /// Even share per lane, remainder on the last lane
    Split,
}

/// Slice of a 1D launch handed to one lane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRange {
    pub offset: u32,
    pub count: u32,
}

/// Divide `global` items across `lanes`: each lane gets `global / lanes`,
/// the last one also takes the remainder
pub fn split_ranges(global: u32, lanes: usize) -> Vec<DispatchRange> {
    let lanes = lanes.max(1) as u32;
    let share = global / lanes;
    (0..lanes)
        .map(|lane| {
            let offset = lane * share;
            let count = if lane == lanes - 1 { global - offset } else { share };
            DispatchRange { offset, count }
        })
        .collect()
}

/// Work-group grid for `threads` invocations. Counts beyond the per-dimension
/// limit fold into a second dimension; kernels linearise the id themselves.
pub fn workgroup_grid(threads: u32, threads_per_group: u32) -> (u32, u32) {
    let groups = threads.div_ceil(threads_per_group.max(1)).max(1);
    if groups <= MAX_WORKGROUPS_PER_DIMENSION {
        (groups, 1)
    } else {
        (
            MAX_WORKGROUPS_PER_DIMENSION,
            groups.div_ceil(MAX_WORKGROUPS_PER_DIMENSION),
        )
    }
}

/// Launch `kernel` over `global` items and wait for every lane to finish.
///
/// `bind` builds the bind group for each range; kernels read the range's
/// offset and count from their parameter block.
pub fn run_1d_kernel<F>(
    device: &Device,
    lanes: &[Lane],
    kernel: &Kernel,
    global: u32,
    policy: QueuePolicy,
    mut bind: F,
) -> KarstResult<()>
where
    F: FnMut(DispatchRange) -> KarstResult<BindGroup>,
{
    if global == 0 {
        return Ok(());
    }

    let first = lanes.first().compute_context(kernel.name())?;
    let ranges: Vec<(&Lane, DispatchRange)> = match policy {
        QueuePolicy::Single => vec![(first, DispatchRange { offset: 0, count: global })],
        QueuePolicy::Split => lanes
            .iter()
            .zip(split_ranges(global, lanes.len()))
            .filter(|(_, range)| range.count > 0)
            .collect(),
    };

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let launches: KarstResult<Vec<_>> = ranges
        .into_iter()
        .map(|(lane, range)| Ok((lane, range, bind(range)?)))
        .collect();
    let launches = match launches {
        Ok(launches) => launches,
        Err(error) => {
            // the scope must be closed before bailing out
            let _ = pollster::block_on(device.pop_error_scope());
            return Err(error);
        }
    };

    for (lane, range, bind_group) in &launches {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(kernel.name()),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.name()),
                timestamp_writes: None,
            });
            pass.set_pipeline(kernel.pipeline());
            pass.set_bind_group(0, bind_group, &[]);
            let (x, y) = workgroup_grid(range.count, kernel.threads_per_group());
            pass.dispatch_workgroups(x, y, 1);
        }
        lane.queue().submit(std::iter::once(encoder.finish()));

        log::debug!(
            "[dispatch] {} on lane {}: offset {} count {}",
            kernel.name(),
            lane.index(),
            range.offset,
            range.count
        );
    }
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(runtime_error(kernel.name(), error));
    }

    let _ = device.poll(wgpu::Maintain::Wait);
    Ok(())
}
