#[cfg(test)]
mod tests {
    use super::super::*;

    #[test]
    fn test_padded_scan_length_has_large_path_floor() {
        assert_eq!(padded_scan_length(0).unwrap(), 2048);
        assert_eq!(padded_scan_length(1).unwrap(), 2048);
        assert_eq!(padded_scan_length(2048).unwrap(), 2048);
        assert_eq!(padded_scan_length(2049).unwrap(), 4096);
    }

    #[test]
    fn test_padded_scan_length_covers_cube_blocks() {
        // 64^3 voxels is exactly the large-path maximum
        assert_eq!(padded_scan_length(64 * 64 * 64).unwrap(), 262144);
        assert_eq!(padded_scan_length(50 * 50 * 50).unwrap(), 131072);
    }

    #[test]
    fn test_padded_scan_length_rejects_oversized_grids() {
        let err = padded_scan_length(64 * 64 * 64 + 1).unwrap_err();
        assert!(err.is_fatal_configuration());
        assert!(padded_scan_length(u64::MAX).is_err());
    }

    #[test]
    fn test_mesh_triangles() {
        let mesh = McMesh {
            vertices: vec![
                Vec3::ZERO,
                Vec3::X,
                Vec3::Y,
                Vec3::ONE,
                Vec3::Z,
                Vec3::X,
            ],
            normals: vec![Vec3::Z; 6],
        };
        assert_eq!(mesh.len(), 6);
        assert_eq!(mesh.triangle_count(), 2);
        let triangles: Vec<&[Vec3]> = mesh.triangles().collect();
        assert_eq!(triangles[1], &[Vec3::ONE, Vec3::Z, Vec3::X]);
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = McMesh::empty();
        assert!(mesh.is_empty());
        assert_eq!(mesh.triangle_count(), 0);
        assert_eq!(mesh.triangles().count(), 0);
    }

    #[test]
    fn test_mc_params_layout() {
        assert_eq!(std::mem::size_of::<McParams>(), 64);
    }
}
