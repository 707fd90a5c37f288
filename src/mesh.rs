use glam::{Vec2, Vec3};
use std::f32::consts::PI;

use crate::error::MeshError;

/// CPU-side triangle mesh handed to the host's resource table.
#[derive(Clone, Debug, PartialEq)]
pub struct TriangleMesh {
    pub name: String,
    positions: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
    uvs: Vec<Vec2>,
    normals: Vec<Vec3>,
    bounds: MeshBounds,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshBounds {
    pub min: Vec3,
    pub max: Vec3,
    pub center: Vec3,
    pub size: Vec3,
}

impl TriangleMesh {
    /// Builds a mesh and derives normals and bounds. `uvs` may be empty
    /// (no UV channel) or exactly one entry per vertex.
    pub fn new(
        name: impl Into<String>,
        positions: Vec<Vec3>,
        triangles: Vec<[u32; 3]>,
        uvs: Vec<Vec2>,
    ) -> Result<Self, MeshError> {
        if !uvs.is_empty() && uvs.len() != positions.len() {
            return Err(MeshError::UvCountMismatch { uvs: uvs.len(), vertices: positions.len() });
        }
        for (triangle, tri) in triangles.iter().enumerate() {
            if let Some(&index) = tri.iter().find(|&&i| i as usize >= positions.len()) {
                return Err(MeshError::IndexOutOfRange { triangle, index, vertex_count: positions.len() });
            }
        }
        let normals = compute_normals(&positions, &triangles);
        let bounds = MeshBounds::from_positions(&positions);
        Ok(Self { name: name.into(), positions, triangles, uvs, normals, bounds })
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn uvs(&self) -> Option<&[Vec2]> {
        if self.uvs.is_empty() {
            None
        } else {
            Some(&self.uvs)
        }
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    pub fn bounds(&self) -> MeshBounds {
        self.bounds
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn set_uvs(&mut self, uvs: Vec<Vec2>) -> Result<(), MeshError> {
        if !uvs.is_empty() && uvs.len() != self.positions.len() {
            return Err(MeshError::UvCountMismatch { uvs: uvs.len(), vertices: self.positions.len() });
        }
        self.uvs = uvs;
        Ok(())
    }
}

impl MeshBounds {
    pub fn from_positions(positions: &[Vec3]) -> Self {
        if positions.is_empty() {
            return MeshBounds { min: Vec3::ZERO, max: Vec3::ZERO, center: Vec3::ZERO, size: Vec3::ZERO };
        }
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for &pos in positions {
            min = min.min(pos);
            max = max.max(pos);
        }
        MeshBounds { min, max, center: (min + max) * 0.5, size: max - min }
    }
}

/// Wraps U around the vertical axis through the bounds center and maps V
/// linearly over the height. Flat meshes get `v = 0`.
pub fn cylindrical_uvs(positions: &[Vec3]) -> Vec<Vec2> {
    let bounds = MeshBounds::from_positions(positions);
    positions
        .iter()
        .map(|p| {
            let u = (p.z - bounds.center.z).atan2(p.x - bounds.center.x) / (2.0 * PI) + 0.5;
            let v = if bounds.size.y == 0.0 { 0.0 } else { (p.y - bounds.min.y) / bounds.size.y };
            Vec2::new(u, v)
        })
        .collect()
}

fn compute_normals(positions: &[Vec3], triangles: &[[u32; 3]]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in triangles {
        let [i0, i1, i2] = tri.map(|i| i as usize);
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }
        let a = positions[i0];
        let b = positions[i1];
        let c = positions[i2];
        let normal = (b - a).cross(c - a);
        if normal.length_squared() > 0.0 {
            normals[i0] += normal;
            normals[i1] += normal;
            normals[i2] += normal;
        }
    }
    for normal in &mut normals {
        if normal.length_squared() > 0.0 {
            *normal = normal.normalize();
        } else {
            *normal = Vec3::Y;
        }
    }
    normals
}
