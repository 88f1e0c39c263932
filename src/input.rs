//! Blob scene reader
//!
//! Whitespace separated text, in order:
//! - start point of the block tiling (3 floats)
//! - blocks per axis (3 unsigned)
//! - block size (3 floats)
//! - log2 of voxels per block axis (unsigned)
//! - blob count, then one `x y z magnitude` record per blob

use glam::{UVec3, Vec3};
use std::io::Read;
use std::path::Path;
use std::str::{FromStr, SplitWhitespace};
use thiserror::Error;

use crate::blob::Blob;
use crate::mesher::BlockLayout;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to read scene: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input ended prematurely while reading {field}")]
    UnexpectedEof { field: String },

    #[error("Malformed {field}: {value:?}")]
    Malformed { field: String, value: String },
}

/// Everything needed for one extraction run
#[derive(Debug, Clone, PartialEq)]
pub struct BlobScene {
    pub layout: BlockLayout,
    pub blobs: Vec<Blob>,
}

/// Parse a scene from any reader
pub fn read_scene<R: Read>(mut reader: R) -> Result<BlobScene, InputError> {
    let mut raw = String::new();
    reader.read_to_string(&mut raw)?;
    parse_scene(&raw)
}

/// Read a scene from `path`, or from stdin when `path` is `-`
pub fn load_scene(path: &str) -> Result<BlobScene, InputError> {
    if path == "-" {
        log::debug!("[Input] Reading scene from stdin");
        read_scene(std::io::stdin().lock())
    } else {
        log::debug!("[Input] Reading scene from {}", path);
        read_scene(std::fs::File::open(Path::new(path))?)
    }
}

pub fn parse_scene(raw: &str) -> Result<BlobScene, InputError> {
    let mut tokens = Tokens {
        inner: raw.split_whitespace(),
    };

    let start_point = tokens.vec3("start point")?;
    let blocks = UVec3::new(
        tokens.next("block count x")?,
        tokens.next("block count y")?,
        tokens.next("block count z")?,
    );
    let block_size = tokens.vec3("block size")?;
    let log_block_dim = tokens.next("log2 block dimension")?;

    let count: usize = tokens.next("blob count")?;
    let mut blobs = Vec::with_capacity(count.min(1 << 20));
    for index in 0..count {
        let field = format!("blob {}", index);
        let position = tokens.vec3(&field)?;
        let magnitude = tokens.next(&field)?;
        blobs.push(Blob::new(position, magnitude));
    }

    Ok(BlobScene {
        layout: BlockLayout {
            start_point,
            blocks,
            block_size,
            log_block_dim,
        },
        blobs,
    })
}

struct Tokens<'a> {
    inner: SplitWhitespace<'a>,
}

impl Tokens<'_> {
    fn next<T: FromStr>(&mut self, field: &str) -> Result<T, InputError> {
        let token = self.inner.next().ok_or_else(|| InputError::UnexpectedEof {
            field: field.to_string(),
        })?;
        token.parse().map_err(|_| InputError::Malformed {
            field: field.to_string(),
            value: token.to_string(),
        })
    }

    fn vec3(&mut self, field: &str) -> Result<Vec3, InputError> {
        Ok(Vec3::new(self.next(field)?, self.next(field)?, self.next(field)?))
    }
}
