use std::path::PathBuf;

use thiserror::Error;

use crate::host::{MeshHandle, ObjectId};

/// Reasons the OBJ text parser produced no mesh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjParseError {
    #[error("OBJ text contains no vertices")]
    NoVertices,
    #[error("OBJ text contains no faces")]
    NoTriangles,
    #[error("face {face} references vertex {index} but only {vertex_count} vertices exist")]
    IndexOutOfRange { face: usize, index: i64, vertex_count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeshError {
    #[error("UV count {uvs} does not match vertex count {vertices}")]
    UvCountMismatch { uvs: usize, vertices: usize },
    #[error("triangle {triangle} references vertex {index} but only {vertex_count} vertices exist")]
    IndexOutOfRange { triangle: usize, index: u32, vertex_count: usize },
}

/// Failures reported by a host adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("object {0:?} no longer exists")]
    ObjectGone(ObjectId),
    #[error("object {0:?} has no renderer")]
    NoRenderer(ObjectId),
    #[error("mesh {0:?} has been destroyed")]
    MeshDestroyed(MeshHandle),
    #[error("mesh {0:?} is not readable")]
    MeshNotReadable(MeshHandle),
    #[error("container {} could not be opened: {reason}", path.display())]
    ContainerOpen { path: PathBuf, reason: String },
    #[error("prefab could not be instantiated: {0}")]
    Instantiate(String),
    #[error(transparent)]
    Mesh(#[from] MeshError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveError {
    #[error("archive {} failed to open: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: HostError,
    },
    #[error("no archive is open")]
    NotOpen,
    #[error("archive {} contains no usable mesh", .0.display())]
    NoMesh(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplacerError {
    #[error("no custom model available")]
    NoCustomModel,
    #[error("no switch sign renderers found near trigger {0:?}")]
    NoCandidates(ObjectId),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Host(#[from] HostError),
}
