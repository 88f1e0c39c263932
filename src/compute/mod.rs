//! Compute context and kernel plumbing
//!
//! The context owns the wgpu device and its queue lanes. Every pipeline stage
//! builds its kernels through it and dispatches on the lanes it hands out;
//! there is no process-wide GPU state.

pub mod buffers;
pub mod context;
pub mod dispatch;
pub mod program;
pub mod readback;
pub mod source;

pub use buffers::{create_buffer, create_buffer_init};
pub use context::{Context, Lane};
pub use dispatch::{run_1d_kernel, split_ranges, workgroup_grid, DispatchRange, QueuePolicy};
pub use program::{build_log, Binding, Kernel, Program};
pub use readback::{read_buffer, read_element};
pub use source::KernelSource;

/// Kernel source holding `blobValue`
pub const BLOB_KERNEL: &str = "blob.wgsl";

/// Kernel source holding `memSet`
pub const UTIL_KERNEL: &str = "util.wgsl";

/// Kernel source holding `classifyVoxel`, `compactVoxels` and `generateTriangles`
pub const MARCHING_CUBES_KERNEL: &str = "marching_cubes.wgsl";

/// Kernel source holding the three hierarchical scan phases
pub const SCAN_KERNEL: &str = "scan.wgsl";
