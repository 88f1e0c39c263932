pub mod blob;
pub mod compute;
pub mod config;
pub mod constants;
pub mod error;
pub mod export;
pub mod grid;
pub mod input;
pub mod marching_cubes;
pub mod mesher;
pub mod scan;

pub use blob::{Blob, BlobEvaluator};
pub use compute::{Context, Lane, QueuePolicy};
pub use config::{ComputeConfig, ConfigError, ExtractionConfig, KarstConfig};
pub use error::{KarstError, KarstResult};
pub use export::{export_wavefront_obj, write_wavefront_obj};
pub use grid::{Grid, Sample, Storage};
pub use input::{load_scene, read_scene, BlobScene, InputError};
pub use marching_cubes::{MarchingCubes, McMesh};
pub use mesher::{BlockLayout, Mesher};
pub use scan::Scan;
