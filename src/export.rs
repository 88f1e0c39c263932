//! Wavefront OBJ export of extracted meshes

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::marching_cubes::McMesh;

/// Write all meshes as one OBJ object. Face indices are 1-based and keep
/// counting across meshes; every face references its own vertex normal.
pub fn write_wavefront_obj<W: Write>(meshes: &[McMesh], mut writer: W) -> std::io::Result<()> {
    for mesh in meshes {
        for v in &mesh.vertices {
            writeln!(writer, "v {} {} {}", v.x, v.y, v.z)?;
        }
        for n in &mesh.normals {
            writeln!(writer, "vn {} {} {}", n.x, n.y, n.z)?;
        }
    }

    let mut base = 1usize;
    for mesh in meshes {
        for triangle in 0..mesh.triangle_count() {
            let a = base + triangle * 3;
            writeln!(writer, "f {a}//{a} {b}//{b} {c}//{c}", b = a + 1, c = a + 2)?;
        }
        base += mesh.len();
    }

    writer.flush()
}

/// Write all meshes to an OBJ file at `path`
pub fn export_wavefront_obj(meshes: &[McMesh], path: &Path) -> std::io::Result<()> {
    let file = File::create(path)?;
    write_wavefront_obj(meshes, BufWriter::new(file))?;

    let vertices: usize = meshes.iter().map(McMesh::len).sum();
    log::info!(
        "[Export] Wrote {} vertices from {} meshes to {}",
        vertices,
        meshes.len(),
        path.display()
    );
    Ok(())
}
