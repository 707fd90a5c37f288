use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::archive::{MeshArchiveLoader, MeshSource};
use crate::config::ArchiveConfig;
use crate::host::{material_set_usable, Host, MaterialSet, MeshHandle};

struct CachedMesh {
    handle: MeshHandle,
    source: MeshSource,
    archive: PathBuf,
}

struct CachedMaterials {
    set: MaterialSet,
    archive: PathBuf,
}

/// The active custom mesh and material set, derived lazily from the archive
/// and re-derived whenever the host reports them destroyed.
pub struct ReplacementCache {
    loader: MeshArchiveLoader,
    archive_path: Option<PathBuf>,
    broken_shader_name: String,
    mesh: Option<CachedMesh>,
    materials: Option<CachedMaterials>,
    model_unavailable: bool,
}

impl ReplacementCache {
    pub fn new(archive: ArchiveConfig, archive_path: Option<PathBuf>, broken_shader_name: impl Into<String>) -> Self {
        Self {
            loader: MeshArchiveLoader::new(archive),
            archive_path,
            broken_shader_name: broken_shader_name.into(),
            mesh: None,
            materials: None,
            model_unavailable: false,
        }
    }

    pub fn archive_path(&self) -> Option<&Path> {
        self.archive_path.as_deref()
    }

    /// Points the cache at another archive. Cached entries tagged with a
    /// different path are dropped on the next lookup.
    pub fn set_archive_path(&mut self, path: Option<PathBuf>) {
        if self.archive_path != path {
            self.model_unavailable = false;
        }
        self.archive_path = path;
    }

    pub fn loader(&self) -> &MeshArchiveLoader {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut MeshArchiveLoader {
        &mut self.loader
    }

    /// False once a derivation failed or when no archive is configured.
    pub fn is_available(&self) -> bool {
        self.archive_path.is_some() && !self.model_unavailable
    }

    pub fn mesh_source(&self) -> Option<&MeshSource> {
        self.mesh.as_ref().map(|cached| &cached.source)
    }

    pub fn cached_mesh<H: Host + ?Sized>(&self, host: &H) -> Option<MeshHandle> {
        self.mesh
            .as_ref()
            .filter(|cached| Some(cached.archive.as_path()) == self.archive_path.as_deref())
            .map(|cached| cached.handle)
            .filter(|handle| host.is_live((*handle).into()))
    }

    fn cached_materials<H: Host + ?Sized>(&self, host: &H) -> Option<&MaterialSet> {
        self.materials
            .as_ref()
            .filter(|cached| Some(cached.archive.as_path()) == self.archive_path.as_deref())
            .map(|cached| &cached.set)
            .filter(|set| material_set_usable(host, set, &self.broken_shader_name))
    }

    pub fn mesh<H: Host + ?Sized>(&mut self, host: &mut H) -> Option<MeshHandle> {
        if let Some(handle) = self.cached_mesh(host) {
            return Some(handle);
        }
        if self.mesh.take().is_some() {
            debug!("Cached custom mesh invalidated; re-deriving");
        }
        let path = self.archive_path.clone()?;
        match self.loader.resolve_mesh(host, &path) {
            Ok(resolved) => {
                info!("Custom mesh loaded from {} ({:?})", path.display(), resolved.source);
                self.model_unavailable = false;
                self.mesh = Some(CachedMesh { handle: resolved.mesh, source: resolved.source, archive: path });
                Some(resolved.mesh)
            }
            Err(err) => {
                warn!("Custom mesh unavailable: {err}");
                self.model_unavailable = true;
                None
            }
        }
    }

    pub fn materials<H: Host + ?Sized>(&mut self, host: &mut H) -> Option<MaterialSet> {
        if let Some(set) = self.cached_materials(host) {
            return Some(set.clone());
        }
        if self.materials.take().is_some() {
            debug!("Cached custom materials invalidated; re-deriving");
        }
        let path = self.archive_path.clone()?;
        let set = self.loader.resolve_materials(host, &path)?;
        if !material_set_usable(host, &set, &self.broken_shader_name) {
            warn!("Archive {} provided {} materials but not all are usable", path.display(), set.len());
            return None;
        }
        self.materials = Some(CachedMaterials { set: set.clone(), archive: path });
        Some(set)
    }

    /// Drops cached entries so the next lookup re-derives them.
    pub fn invalidate(&mut self) {
        self.mesh = None;
        self.materials = None;
    }

    /// Drops cached entries and releases the archive.
    pub fn clear<H: Host + ?Sized>(&mut self, host: &mut H) {
        self.invalidate();
        self.loader.close(host);
    }
}
