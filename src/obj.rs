//! Minimal OBJ text reader for switch sign models.
//!
//! Only `v`, `vt` and `f` records are understood. Faces keep their first three
//! corners; anything past the third corner of a polygon is dropped. Lines that
//! fail to parse are skipped rather than failing the whole file.

use glam::{Vec2, Vec3};
use log::debug;

use crate::error::ObjParseError;
use crate::mesh::{cylindrical_uvs, TriangleMesh};

pub const DEFAULT_MESH_NAME: &str = "Custom OBJ Switch Setter";

/// Where the UV channel of a parsed mesh came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UvSource {
    Parsed,
    Cylindrical,
}

#[derive(Debug, Clone)]
pub struct ParsedObj {
    pub mesh: TriangleMesh,
    pub uv_source: UvSource,
    pub skipped_lines: usize,
}

pub fn parse_obj(text: &str) -> Result<TriangleMesh, ObjParseError> {
    parse_obj_detailed(text).map(|parsed| parsed.mesh)
}

pub fn parse_obj_detailed(text: &str) -> Result<ParsedObj, ObjParseError> {
    let mut positions: Vec<Vec3> = Vec::new();
    let mut uvs: Vec<Vec2> = Vec::new();
    let mut faces: Vec<[i64; 3]> = Vec::new();
    let mut skipped_lines = 0usize;

    for line in text.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            continue;
        }
        let handled = match tokens[0] {
            "v" => parse_floats::<3>(&tokens[1..]).map(|[x, y, z]| positions.push(Vec3::new(x, y, z))),
            "vt" => parse_floats::<2>(&tokens[1..]).map(|[u, v]| uvs.push(Vec2::new(u, v))),
            "f" if tokens.len() >= 4 => parse_face(&tokens[1..4]).map(|face| faces.push(face)),
            "f" => None,
            _ => Some(()),
        };
        if handled.is_none() {
            skipped_lines += 1;
        }
    }

    if positions.is_empty() {
        return Err(ObjParseError::NoVertices);
    }
    if faces.is_empty() {
        return Err(ObjParseError::NoTriangles);
    }

    let vertex_count = positions.len();
    let mut triangles = Vec::with_capacity(faces.len());
    for (face, corners) in faces.iter().enumerate() {
        let mut tri = [0u32; 3];
        for (slot, &one_based) in tri.iter_mut().zip(corners) {
            let index = one_based
                .checked_sub(1)
                .and_then(|index| usize::try_from(index).ok())
                .filter(|&index| index < vertex_count)
                .and_then(|index| u32::try_from(index).ok())
                .ok_or(ObjParseError::IndexOutOfRange { face, index: one_based, vertex_count })?;
            *slot = index;
        }
        triangles.push(tri);
    }

    let (uvs, uv_source) = if uvs.len() == vertex_count {
        (uvs, UvSource::Parsed)
    } else {
        if !uvs.is_empty() {
            debug!("Discarding {} UVs for {} vertices; generating cylindrical UVs", uvs.len(), vertex_count);
        }
        (cylindrical_uvs(&positions), UvSource::Cylindrical)
    };

    let triangle_count = triangles.len();
    let mesh = TriangleMesh::new(DEFAULT_MESH_NAME, positions, triangles, uvs).map_err(|err| {
        // Indices were validated above and the UV channel always matches.
        debug!("OBJ mesh rejected: {err}");
        ObjParseError::NoTriangles
    })?;
    debug!("OBJ mesh parsed: {vertex_count} vertices, {triangle_count} triangles, UVs {uv_source:?}");
    Ok(ParsedObj { mesh, uv_source, skipped_lines })
}

fn parse_floats<const N: usize>(tokens: &[&str]) -> Option<[f32; N]> {
    if tokens.len() < N {
        return None;
    }
    let mut out = [0.0f32; N];
    for (slot, token) in out.iter_mut().zip(tokens) {
        *slot = token.parse().ok()?;
    }
    Some(out)
}

fn parse_face(corners: &[&str]) -> Option<[i64; 3]> {
    let mut face = [0i64; 3];
    for (slot, corner) in face.iter_mut().zip(corners) {
        let index = corner.split('/').next()?;
        *slot = index.parse().ok()?;
    }
    Some(face)
}
