//! On-disk asset bundle read by [`crate::host::memory::MemoryHost`].
//!
//! Layout: the 8-byte magic `SSRBNDL1`, a little-endian `u32` payload length,
//! then a bincode payload holding the typed entries.

use bincode::Options;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

const MAGIC: &[u8; 8] = b"SSRBNDL1";
const LEN_BYTES: usize = 4;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("bundle io: {0}")]
    Io(#[from] std::io::Error),
    #[error("not an asset bundle (bad magic)")]
    BadMagic,
    #[error("bundle payload truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("bundle payload: {0}")]
    Payload(#[from] bincode::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetBundle {
    entries: BTreeMap<String, BundleEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BundleEntry {
    Text(String),
    Mesh(MeshData),
    Material(MaterialData),
    Prefab(PrefabData),
}

impl BundleEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            BundleEntry::Text(_) => "text",
            BundleEntry::Mesh(_) => "mesh",
            BundleEntry::Material(_) => "material",
            BundleEntry::Prefab(_) => "prefab",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,
    #[serde(default)]
    pub uvs: Vec<[f32; 2]>,
    /// Meshes imported without CPU access cannot have their UVs read back.
    #[serde(default)]
    pub readable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialData {
    pub name: String,
    pub shader: String,
    #[serde(default)]
    pub main_texture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefabData {
    pub name: String,
    pub nodes: Vec<PrefabNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefabNode {
    pub name: String,
    /// Index of the parent node; `None` for the root.
    #[serde(default)]
    pub parent: Option<usize>,
    /// Name of a mesh entry in the same bundle.
    #[serde(default)]
    pub mesh: Option<String>,
    /// Names of material entries in the same bundle.
    #[serde(default)]
    pub materials: Vec<String>,
}

impl AssetBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: BundleEntry) -> Option<BundleEntry> {
        self.entries.insert(name.into(), entry)
    }

    pub fn get(&self, name: &str) -> Option<&BundleEntry> {
        self.entries.get(name)
    }

    /// Entry names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &BundleEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, BundleError> {
        let payload = bincode_options().serialize(self)?;
        let len = u32::try_from(payload.len()).map_err(|_| {
            BundleError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, "bundle too large"))
        })?;
        let mut bytes = Vec::with_capacity(MAGIC.len() + LEN_BYTES + payload.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BundleError> {
        if bytes.len() < MAGIC.len() + LEN_BYTES || &bytes[..MAGIC.len()] != MAGIC {
            return Err(BundleError::BadMagic);
        }
        let mut len_buf = [0u8; LEN_BYTES];
        len_buf.copy_from_slice(&bytes[MAGIC.len()..MAGIC.len() + LEN_BYTES]);
        let expected = u32::from_le_bytes(len_buf) as usize;
        let payload = &bytes[MAGIC.len() + LEN_BYTES..];
        if payload.len() < expected {
            return Err(BundleError::Truncated { expected, found: payload.len() });
        }
        Ok(bincode_options().deserialize(&payload[..expected])?)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, BundleError> {
        let bytes = fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<(), BundleError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}

fn bincode_options() -> impl bincode::Options {
    bincode::DefaultOptions::new().with_fixint_encoding()
}
