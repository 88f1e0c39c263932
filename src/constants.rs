//! GPU constants - single source of truth for GPU/CPU shared values
//!
//! Re-exports the root constants.rs file and renders the WGSL header that is
//! prepended to every kernel, so shaders never carry their own copies.

include!("../constants.rs");

/// Generate the WGSL constants header.
///
/// `blob_capacity` is the number of blob records that fit in the blob uniform
/// block on the current device; it sizes the uniform array in the blob kernel.
pub fn generate_wgsl_constants(blob_capacity: u32) -> String {
    format!(
        r#"// AUTO-GENERATED GPU CONSTANTS - DO NOT EDIT
// Generated from src/constants.rs

// Scan
const SCAN_WORKGROUP_SIZE: u32 = {}u;
const SCAN_LOCAL_MEMORY: u32 = {}u;
const SCAN_SCRATCH_ELEMENTS: u32 = {}u;

// Element-wise kernels
const CLASSIFY_THREADS_PER_WG: u32 = {}u;
const COMPACT_THREADS_PER_WG: u32 = {}u;
const GENERATE_THREADS_PER_WG: u32 = {}u;
const BLOB_THREADS_PER_WG: u32 = {}u;
const MEMSET_THREADS_PER_WG: u32 = {}u;

// Blobs
const MAX_BLOBS_PER_CHUNK: u32 = {}u;
const MIN_DISTANCE_SQUARED: f32 = {:e};
"#,
        scan::WORKGROUP_SIZE,
        2 * scan::WORKGROUP_SIZE,
        scan::SCRATCH_ELEMENTS,
        kernels::CLASSIFY_THREADS_PER_WG,
        kernels::COMPACT_THREADS_PER_WG,
        kernels::GENERATE_THREADS_PER_WG,
        kernels::BLOB_THREADS_PER_WG,
        kernels::MEMSET_THREADS_PER_WG,
        blob_capacity.max(1),
        blob::MIN_DISTANCE_SQUARED,
    )
}

/// Blob records that fit in a uniform block of `max_uniform_bytes`
pub fn blob_capacity(max_uniform_bytes: u32) -> u32 {
    max_uniform_bytes.min(blob::MAX_UNIFORM_BLOCK_BYTES) / blob::BLOB_RECORD_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_limits_are_consistent() {
        assert_eq!(scan::MAX_SHORT_ARRAY_SIZE, 1024);
        assert_eq!(scan::MIN_LARGE_ARRAY_SIZE, 2048);
        assert_eq!(scan::MAX_LARGE_ARRAY_SIZE, 262144);
        assert_eq!(scan::SCRATCH_ELEMENTS, 65536);
    }

    #[test]
    fn test_blob_capacity_is_capped() {
        assert_eq!(blob_capacity(16384), 1024);
        assert_eq!(blob_capacity(65536), 4096);
        assert_eq!(blob_capacity(u32::MAX), 4096);
    }

    #[test]
    fn test_wgsl_header_carries_values() {
        let header = generate_wgsl_constants(4096);
        assert!(header.contains("const SCAN_WORKGROUP_SIZE: u32 = 256u;"));
        assert!(header.contains("const MAX_BLOBS_PER_CHUNK: u32 = 4096u;"));
        assert!(header.contains("const GENERATE_THREADS_PER_WG: u32 = 32u;"));
        assert!(header.contains("const MIN_DISTANCE_SQUARED: f32 = 1e-6;"));
    }
}
