// Karstgen constants - SINGLE SOURCE OF TRUTH
//
// Shared by the host code and, through the generated WGSL header, by every
// compute kernel. Do not redefine these in shader sources.

/// Hierarchical scan limits
pub mod scan {
    /// Threads per scan work-group; each thread owns four elements
    pub const WORKGROUP_SIZE: u32 = 256;
    pub const MAX_BATCH_ELEMENTS: u32 = 64 * 1048576;
    pub const MIN_SHORT_ARRAY_SIZE: u32 = 4;
    pub const MAX_SHORT_ARRAY_SIZE: u32 = 4 * WORKGROUP_SIZE;
    pub const MIN_LARGE_ARRAY_SIZE: u32 = 8 * WORKGROUP_SIZE;
    pub const MAX_LARGE_ARRAY_SIZE: u32 = 4 * WORKGROUP_SIZE * WORKGROUP_SIZE;

    /// Work-group memory needed by the local scan kernels
    pub const LOCAL_MEMORY_BYTES: u32 = 2 * WORKGROUP_SIZE * 4;

    /// Block sums buffer length
    pub const SCRATCH_ELEMENTS: u32 = MAX_BATCH_ELEMENTS / (4 * WORKGROUP_SIZE);
}

/// Threads per work-group for the element-wise kernels
pub mod kernels {
    pub const CLASSIFY_THREADS_PER_WG: u32 = 128;
    pub const COMPACT_THREADS_PER_WG: u32 = 128;
    pub const GENERATE_THREADS_PER_WG: u32 = 32;
    pub const BLOB_THREADS_PER_WG: u32 = 64;
    pub const MEMSET_THREADS_PER_WG: u32 = 64;
}

/// Launch geometry
pub mod dispatch {
    /// Largest work-group count accepted in one dispatch dimension
    pub const MAX_WORKGROUPS_PER_DIMENSION: u32 = 65535;
}

/// Blob upload limits
pub mod blob {
    /// Bytes of one blob record (xyz position, w magnitude)
    pub const BLOB_RECORD_BYTES: u32 = 16;

    /// Upper bound on the blob uniform block, whatever the device reports
    pub const MAX_UNIFORM_BLOCK_BYTES: u32 = 65536;

    /// Squared distance floor for the field falloff
    pub const MIN_DISTANCE_SQUARED: f32 = 1.0e-6;
}
