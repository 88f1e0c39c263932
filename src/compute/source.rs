use std::path::PathBuf;

use crate::compute::{BLOB_KERNEL, MARCHING_CUBES_KERNEL, SCAN_KERNEL, UTIL_KERNEL};

/// Helpers prepended to every kernel after the constants header
pub const COMMON_SOURCE: &str = include_str!("../shaders/common.wgsl");

/// Where kernel sources are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelSource {
    /// Sources compiled into the binary
    Embedded,
    /// `.wgsl` files in a directory, named like the embedded ones
    Directory(PathBuf),
}

impl KernelSource {
    pub fn from_dir(dir: Option<PathBuf>) -> Self {
        match dir {
            Some(dir) => KernelSource::Directory(dir),
            None => KernelSource::Embedded,
        }
    }

    /// Read the source text for a logical kernel path
    pub fn load(&self, path: &str) -> Result<String, String> {
        match self {
            KernelSource::Embedded => embedded(path)
                .map(str::to_string)
                .ok_or_else(|| format!("no built-in kernel source named {}", path)),
            KernelSource::Directory(dir) => {
                let file = dir.join(path);
                std::fs::read_to_string(&file)
                    .map_err(|e| format!("failed to read {}: {}", file.display(), e))
            }
        }
    }
}

fn embedded(path: &str) -> Option<&'static str> {
    match path {
        BLOB_KERNEL => Some(include_str!("../shaders/blob.wgsl")),
        UTIL_KERNEL => Some(include_str!("../shaders/util.wgsl")),
        MARCHING_CUBES_KERNEL => Some(include_str!("../shaders/marching_cubes.wgsl")),
        SCAN_KERNEL => Some(include_str!("../shaders/scan.wgsl")),
        _ => None,
    }
}
