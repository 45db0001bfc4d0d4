/// Triangle meshes: binary STL I/O, measurements and decimation.
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use nalgebra::Vector3;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} is not a binary STL file")]
    Format(String),
    #[error("mesh has no triangles")]
    Empty,
}

/// Triangle soup in STL style: no shared vertex index.
#[derive(Debug, Clone)]
pub struct TriMesh {
    pub triangles: Vec<[Vector3<f64>; 3]>,
}

impl TriMesh {
    pub fn new(triangles: Vec<[Vector3<f64>; 3]>) -> Self {
        Self { triangles }
    }

    /// Reads a binary STL file.
    pub fn from_stl(path: &Path) -> Result<Self, MeshError> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut header = [0u8; 80];
        reader.read_exact(&mut header).map_err(|_| {
            MeshError::Format(path.display().to_string())
        })?;

        let mut count_bytes = [0u8; 4];
        reader
            .read_exact(&mut count_bytes)
            .map_err(|_| MeshError::Format(path.display().to_string()))?;
        let count = u32::from_le_bytes(count_bytes) as usize;

        let mut triangles = Vec::with_capacity(count);
        let mut record = [0u8; 50];
        for _ in 0..count {
            reader
                .read_exact(&mut record)
                .map_err(|_| MeshError::Format(path.display().to_string()))?;
            // Skip the 12-byte normal; it is recomputed on demand.
            let mut vertices = [Vector3::zeros(); 3];
            for (v, vertex) in vertices.iter_mut().enumerate() {
                let base = 12 + v * 12;
                *vertex = Vector3::new(
                    read_f32(&record, base) as f64,
                    read_f32(&record, base + 4) as f64,
                    read_f32(&record, base + 8) as f64,
                );
            }
            triangles.push(vertices);
        }

        if triangles.is_empty() {
            return Err(MeshError::Empty);
        }
        Ok(Self { triangles })
    }

    /// Writes a binary STL file with recomputed facet normals.
    pub fn write_stl(&self, path: &Path) -> Result<(), MeshError> {
        let mut writer = BufWriter::new(File::create(path)?);
        let mut header = [0u8; 80];
        let tag = b"tote-dataset-gen export";
        header[..tag.len()].copy_from_slice(tag);
        writer.write_all(&header)?;
        writer.write_all(&(self.triangles.len() as u32).to_le_bytes())?;

        for tri in &self.triangles {
            let normal = triangle_normal(tri);
            for component in [normal.x, normal.y, normal.z] {
                writer.write_all(&(component as f32).to_le_bytes())?;
            }
            for vertex in tri {
                for component in [vertex.x, vertex.y, vertex.z] {
                    writer.write_all(&(component as f32).to_le_bytes())?;
                }
            }
            writer.write_all(&0u16.to_le_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn bounds(&self) -> (Vector3<f64>, Vector3<f64>) {
        let mut min = Vector3::repeat(f64::INFINITY);
        let mut max = Vector3::repeat(f64::NEG_INFINITY);
        for tri in &self.triangles {
            for vertex in tri {
                min = min.inf(vertex);
                max = max.sup(vertex);
            }
        }
        (min, max)
    }

    pub fn dimensions(&self) -> Vector3<f64> {
        let (min, max) = self.bounds();
        max - min
    }

    pub fn half_extents(&self) -> Vector3<f64> {
        self.dimensions() / 2.0
    }

    /// Center of mass assuming uniform density, from signed tetrahedron
    /// volumes against the origin. Falls back to the area-weighted surface
    /// centroid for degenerate (open or flat) meshes.
    pub fn center_of_mass(&self) -> Vector3<f64> {
        let mut volume = 0.0;
        let mut moment = Vector3::zeros();
        for [a, b, c] in &self.triangles {
            let v = a.dot(&b.cross(c)) / 6.0;
            volume += v;
            moment += (a + b + c) * (v / 4.0);
        }
        if volume.abs() > 1e-12 {
            return moment / volume;
        }

        let mut area = 0.0;
        let mut centroid = Vector3::zeros();
        for [a, b, c] in &self.triangles {
            let tri_area = (b - a).cross(&(c - a)).norm() / 2.0;
            area += tri_area;
            centroid += (a + b + c) * (tri_area / 3.0);
        }
        if area > 0.0 { centroid / area } else { centroid }
    }

    pub fn translate(&mut self, offset: Vector3<f64>) {
        for tri in &mut self.triangles {
            for vertex in tri {
                *vertex += offset;
            }
        }
    }

    pub fn scale(&mut self, factor: f64) {
        for tri in &mut self.triangles {
            for vertex in tri {
                *vertex *= factor;
            }
        }
    }

    /// Recenters the mesh so its center of mass sits at the origin.
    pub fn recenter_to_center_of_mass(&mut self) {
        let com = self.center_of_mass();
        self.translate(-com);
    }

    /// Vertex-clustering decimation: snaps vertices to a grid and drops
    /// collapsed triangles, coarsening the grid until the face count fits
    /// the budget.
    pub fn decimate(&self, max_faces: usize) -> TriMesh {
        if self.triangles.len() <= max_faces || max_faces == 0 {
            return self.clone();
        }

        let (min, max) = self.bounds();
        let span = (max - min).max().max(f64::EPSILON);

        let mut resolution = 256u32;
        loop {
            let cell = span / resolution as f64;
            let snapped = self.cluster(min, cell);
            if snapped.triangles.len() <= max_faces || resolution <= 4 {
                return snapped;
            }
            resolution /= 2;
        }
    }

    fn cluster(&self, origin: Vector3<f64>, cell: f64) -> TriMesh {
        let key = |v: &Vector3<f64>| -> (i64, i64, i64) {
            (
                ((v.x - origin.x) / cell).floor() as i64,
                ((v.y - origin.y) / cell).floor() as i64,
                ((v.z - origin.z) / cell).floor() as i64,
            )
        };

        // Representative position per occupied cell: mean of its vertices.
        let mut cells: HashMap<(i64, i64, i64), (Vector3<f64>, usize)> = HashMap::new();
        for tri in &self.triangles {
            for vertex in tri {
                let entry = cells.entry(key(vertex)).or_insert((Vector3::zeros(), 0));
                entry.0 += vertex;
                entry.1 += 1;
            }
        }

        let mut triangles = Vec::new();
        for tri in &self.triangles {
            let keys = [key(&tri[0]), key(&tri[1]), key(&tri[2])];
            if keys[0] == keys[1] || keys[1] == keys[2] || keys[0] == keys[2] {
                continue;
            }
            let snapped = keys.map(|k| {
                let (sum, n) = cells[&k];
                sum / n as f64
            });
            triangles.push(snapped);
        }
        TriMesh { triangles }
    }

    /// Axis-aligned cube with edge `size` centered at the origin.
    pub fn cube(size: f64) -> TriMesh {
        Self::cuboid(Vector3::repeat(-size / 2.0), Vector3::repeat(size / 2.0))
    }

    /// Axis-aligned box between two corners, 12 triangles.
    pub fn cuboid(min: Vector3<f64>, max: Vector3<f64>) -> TriMesh {
        let corner = |x: bool, y: bool, z: bool| {
            Vector3::new(
                if x { max.x } else { min.x },
                if y { max.y } else { min.y },
                if z { max.z } else { min.z },
            )
        };
        let faces: [[Vector3<f64>; 4]; 6] = [
            // -z, +z
            [
                corner(false, false, false),
                corner(true, false, false),
                corner(true, true, false),
                corner(false, true, false),
            ],
            [
                corner(false, false, true),
                corner(false, true, true),
                corner(true, true, true),
                corner(true, false, true),
            ],
            // -y, +y
            [
                corner(false, false, false),
                corner(false, false, true),
                corner(true, false, true),
                corner(true, false, false),
            ],
            [
                corner(false, true, false),
                corner(true, true, false),
                corner(true, true, true),
                corner(false, true, true),
            ],
            // -x, +x
            [
                corner(false, false, false),
                corner(false, true, false),
                corner(false, true, true),
                corner(false, false, true),
            ],
            [
                corner(true, false, false),
                corner(true, false, true),
                corner(true, true, true),
                corner(true, true, false),
            ],
        ];

        let mut triangles = Vec::with_capacity(12);
        for [a, b, c, d] in faces {
            triangles.push([a, b, c]);
            triangles.push([a, c, d]);
        }
        TriMesh { triangles }
    }

    /// Flat square ground plane of the given side length at z = 0.
    pub fn plane(size: f64) -> TriMesh {
        let h = size / 2.0;
        let a = Vector3::new(-h, -h, 0.0);
        let b = Vector3::new(h, -h, 0.0);
        let c = Vector3::new(h, h, 0.0);
        let d = Vector3::new(-h, h, 0.0);
        TriMesh {
            triangles: vec![[a, b, c], [a, c, d]],
        }
    }

    /// Open-topped tote frame: floor slab plus four walls. Interior spans
    /// `±length/2 × ±width/2`, floor top at `z = thickness`, rim at
    /// `z = thickness + height`.
    pub fn tote_frame(length: f64, width: f64, height: f64, thickness: f64) -> TriMesh {
        let hl = length / 2.0;
        let hw = width / 2.0;
        let top = thickness + height;
        let mut triangles = Vec::new();
        let mut push = |min: Vector3<f64>, max: Vector3<f64>| {
            triangles.extend(Self::cuboid(min, max).triangles);
        };

        // Floor covers the full outer footprint.
        push(
            Vector3::new(-hl - thickness, -hw - thickness, 0.0),
            Vector3::new(hl + thickness, hw + thickness, thickness),
        );
        // Walls along y.
        push(
            Vector3::new(-hl - thickness, -hw - thickness, thickness),
            Vector3::new(-hl, hw + thickness, top),
        );
        push(
            Vector3::new(hl, -hw - thickness, thickness),
            Vector3::new(hl + thickness, hw + thickness, top),
        );
        // Walls along x.
        push(
            Vector3::new(-hl, -hw - thickness, thickness),
            Vector3::new(hl, -hw, top),
        );
        push(
            Vector3::new(-hl, hw, thickness),
            Vector3::new(hl, hw + thickness, top),
        );
        TriMesh { triangles }
    }
}

pub fn triangle_normal(tri: &[Vector3<f64>; 3]) -> Vector3<f64> {
    let n = (tri[1] - tri[0]).cross(&(tri[2] - tri[0]));
    let norm = n.norm();
    if norm > 0.0 { n / norm } else { Vector3::z() }
}

fn read_f32(record: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        record[offset],
        record[offset + 1],
        record[offset + 2],
        record[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_measurements() {
        let cube = TriMesh::cube(0.1);
        assert_eq!(cube.triangles.len(), 12);
        let dims = cube.dimensions();
        assert!((dims.x - 0.1).abs() < 1e-12);
        assert!((dims.y - 0.1).abs() < 1e-12);
        assert!((dims.z - 0.1).abs() < 1e-12);
        assert!(cube.center_of_mass().norm() < 1e-9);
    }

    #[test]
    fn stl_roundtrip_preserves_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.stl");
        let cube = TriMesh::cube(0.05);
        cube.write_stl(&path).unwrap();

        let loaded = TriMesh::from_stl(&path).unwrap();
        assert_eq!(loaded.triangles.len(), 12);
        assert!((loaded.dimensions().x - 0.05).abs() < 1e-6);
    }

    #[test]
    fn recenter_moves_offset_mesh_to_origin() {
        let mut cube = TriMesh::cube(0.1);
        cube.translate(Vector3::new(0.3, -0.2, 0.5));
        cube.recenter_to_center_of_mass();
        assert!(cube.center_of_mass().norm() < 1e-9);
    }

    #[test]
    fn decimate_respects_the_face_budget() {
        // A finely subdivided plane strip.
        let mut triangles = Vec::new();
        for i in 0..512 {
            let x = i as f64 * 0.01;
            triangles.push([
                Vector3::new(x, 0.0, 0.0),
                Vector3::new(x + 0.01, 0.0, 0.0),
                Vector3::new(x, 0.01, (i % 7) as f64 * 0.001),
            ]);
        }
        let mesh = TriMesh::new(triangles);
        let decimated = mesh.decimate(128);
        assert!(decimated.triangles.len() <= 128);
    }

    #[test]
    fn decimate_keeps_small_meshes_untouched() {
        let cube = TriMesh::cube(0.1);
        assert_eq!(cube.decimate(100).triangles.len(), 12);
    }

    #[test]
    fn tote_frame_has_interior_at_the_requested_span() {
        let frame = TriMesh::tote_frame(0.7, 0.6, 0.5, 0.01);
        let (min, max) = frame.bounds();
        assert!((min.x + 0.36).abs() < 1e-12);
        assert!((max.y - 0.31).abs() < 1e-12);
        assert!((max.z - 0.51).abs() < 1e-12);
        assert_eq!(min.z, 0.0);
    }
}
