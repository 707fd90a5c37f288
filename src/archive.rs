use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::config::ArchiveConfig;
use crate::error::ArchiveError;
use crate::host::{descendants_preorder, ContainerHandle, Host, MaterialSet, MeshHandle, ObjectId, PrefabHandle};
use crate::obj::parse_obj;

/// Which step of the resolution order produced the custom mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshSource {
    WellKnownText(String),
    ObjText(String),
    Prefab(String),
    NamedMesh(String),
    FirstMesh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMesh {
    pub mesh: MeshHandle,
    pub source: MeshSource,
}

/// What the prefab fallback pulled out of a transient instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefabExtract {
    pub prefab: String,
    pub mesh: MeshHandle,
    pub materials: MaterialSet,
}

struct OpenArchive {
    path: PathBuf,
    container: ContainerHandle,
    entries: Option<Vec<String>>,
}

/// Owns the single open asset container and pulls the custom mesh and
/// materials out of it.
pub struct MeshArchiveLoader {
    config: ArchiveConfig,
    open: Option<OpenArchive>,
}

impl MeshArchiveLoader {
    pub fn new(config: ArchiveConfig) -> Self {
        Self { config, open: None }
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn open_path(&self) -> Option<&Path> {
        self.open.as_ref().map(|open| open.path.as_path())
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Opens `path`, reusing the current container when it is the same live
    /// path. Any other open container is released first.
    pub fn open<H: Host + ?Sized>(&mut self, host: &mut H, path: &Path) -> Result<ContainerHandle, ArchiveError> {
        if let Some(open) = &self.open {
            if open.path == path && host.is_live(open.container.into()) {
                return Ok(open.container);
            }
            if open.path == path {
                debug!("Archive {} went stale; reopening", path.display());
            }
        }
        self.close(host);
        let container = host
            .open_container(path)
            .map_err(|source| ArchiveError::Open { path: path.to_path_buf(), source })?;
        info!("Opened archive {}", path.display());
        self.open = Some(OpenArchive { path: path.to_path_buf(), container, entries: None });
        Ok(container)
    }

    pub fn close<H: Host + ?Sized>(&mut self, host: &mut H) {
        if let Some(open) = self.open.take() {
            host.unload_container(open.container);
            debug!("Closed archive {}", open.path.display());
        }
    }

    fn live_container<H: Host + ?Sized>(&mut self, host: &H) -> Result<ContainerHandle, ArchiveError> {
        match &self.open {
            Some(open) if host.is_live(open.container.into()) => Ok(open.container),
            Some(_) => {
                self.open = None;
                Err(ArchiveError::NotOpen)
            }
            None => Err(ArchiveError::NotOpen),
        }
    }

    pub fn list_entries<H: Host + ?Sized>(&mut self, host: &H) -> Result<Vec<String>, ArchiveError> {
        let container = self.live_container(host)?;
        let open = self.open.as_mut().ok_or(ArchiveError::NotOpen)?;
        let entries = open.entries.get_or_insert_with(|| host.container_entries(container));
        Ok(entries.clone())
    }

    pub fn extract_text<H: Host + ?Sized>(&mut self, host: &mut H, name: &str) -> Option<String> {
        let container = self.live_container(host).ok()?;
        host.load_text(container, name)
    }

    pub fn extract_mesh_directly<H: Host + ?Sized>(&mut self, host: &mut H, name: &str) -> Option<MeshHandle> {
        let container = self.live_container(host).ok()?;
        host.load_mesh(container, name)
    }

    /// Instantiates each prefab in turn and returns the first mesh found on
    /// it or its descendants, plus the materials of the first renderer found.
    pub fn extract_first_prefab_mesh_and_materials<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
    ) -> Option<PrefabExtract> {
        let container = self.live_container(host).ok()?;
        for prefab in host.load_all_prefabs(container) {
            let name = host.prefab_name(prefab).unwrap_or_default();
            let extracted = with_transient_instance(host, prefab, |host, root| {
                let mesh = first_mesh_in_hierarchy(host, root)?;
                Some((mesh, first_materials_in_hierarchy(host, root).unwrap_or_default()))
            });
            if let Some((mesh, materials)) = extracted {
                return Some(PrefabExtract { prefab: name, mesh, materials });
            }
        }
        None
    }

    /// Walks the mesh resolution order against the archive at `path`.
    pub fn resolve_mesh<H: Host + ?Sized>(&mut self, host: &mut H, path: &Path) -> Result<ResolvedMesh, ArchiveError> {
        let container = self.open(host, path)?;
        let entries = self.list_entries(host)?;
        debug!("Archive entries: {}", entries.join(", "));

        let well_known = self.config.well_known_entry.clone();
        if let Some(text) = self.extract_text(host, &well_known) {
            if let Some(mesh) = self.upload_obj(host, &text, &well_known) {
                return Ok(ResolvedMesh { mesh, source: MeshSource::WellKnownText(well_known) });
            }
        }

        for name in entries.iter().filter(|name| name.to_ascii_lowercase().ends_with(".obj")) {
            let Some(text) = self.extract_text(host, name) else {
                continue;
            };
            if let Some(mesh) = self.upload_obj(host, &text, name) {
                return Ok(ResolvedMesh { mesh, source: MeshSource::ObjText(name.clone()) });
            }
        }

        debug!("No OBJ text entries usable, trying prefabs");
        if let Some(extract) = self.extract_first_prefab_mesh_and_materials(host) {
            info!("Using mesh from prefab '{}'", extract.prefab);
            return Ok(ResolvedMesh { mesh: extract.mesh, source: MeshSource::Prefab(extract.prefab) });
        }

        let candidates = self.config.candidate_mesh_names.clone();
        for candidate in &candidates {
            let matching = entries
                .iter()
                .filter(|name| name.eq_ignore_ascii_case(candidate) || entry_stem(name).eq_ignore_ascii_case(candidate));
            for name in matching {
                if let Some(mesh) = self.extract_mesh_directly(host, name) {
                    info!("Using mesh entry '{name}' (may not be readable)");
                    return Ok(ResolvedMesh { mesh, source: MeshSource::NamedMesh(name.clone()) });
                }
            }
        }

        if let Some(&mesh) = host.load_all_meshes(container).first() {
            info!("Using first mesh found in archive (may not be readable)");
            return Ok(ResolvedMesh { mesh, source: MeshSource::FirstMesh });
        }

        warn!("No usable mesh found in archive {}", path.display());
        Err(ArchiveError::NoMesh(path.to_path_buf()))
    }

    /// Prefab renderer materials first, then every material in the archive.
    pub fn resolve_materials<H: Host + ?Sized>(&mut self, host: &mut H, path: &Path) -> Option<MaterialSet> {
        let container = match self.open(host, path) {
            Ok(container) => container,
            Err(err) => {
                warn!("Materials unavailable: {err}");
                return None;
            }
        };
        if let Some(extract) = self.extract_first_prefab_mesh_and_materials(host) {
            if !extract.materials.is_empty() {
                debug!("Loaded {} materials from prefab '{}'", extract.materials.len(), extract.prefab);
                return Some(extract.materials);
            }
        }
        let materials = host.load_all_materials(container);
        if materials.is_empty() {
            warn!("No materials found in archive {}", path.display());
            return None;
        }
        debug!("Loaded {} materials directly from archive", materials.len());
        Some(materials)
    }

    fn upload_obj<H: Host + ?Sized>(&self, host: &mut H, text: &str, entry: &str) -> Option<MeshHandle> {
        match parse_obj(text) {
            Ok(mut mesh) => {
                mesh.name = format!("AssetBundle_OBJ_{}", entry_stem(entry));
                info!(
                    "Parsed OBJ entry '{entry}': {} vertices, {} triangles",
                    mesh.vertex_count(),
                    mesh.triangle_count()
                );
                Some(host.create_mesh(mesh))
            }
            Err(err) => {
                warn!("OBJ entry '{entry}' unusable: {err}");
                None
            }
        }
    }
}

fn entry_stem(entry: &str) -> &str {
    let file = entry.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(entry);
    match file.rfind('.') {
        Some(dot) if dot > 0 => &file[..dot],
        _ => file,
    }
}

/// Runs `f` against a transient instance of `prefab`, destroying it after.
/// Resources pulled out of the instance are shared and outlive it.
fn with_transient_instance<H, T>(
    host: &mut H,
    prefab: PrefabHandle,
    f: impl FnOnce(&H, ObjectId) -> Option<T>,
) -> Option<T>
where
    H: Host + ?Sized,
{
    let root = match host.instantiate(prefab) {
        Ok(root) => root,
        Err(err) => {
            warn!("Failed to instantiate prefab {prefab:?}: {err}");
            return None;
        }
    };
    let result = f(host, root);
    host.destroy_immediate(root);
    result
}

fn first_mesh_in_hierarchy<H: Host + ?Sized>(host: &H, root: ObjectId) -> Option<MeshHandle> {
    descendants_preorder(host, root)
        .into_iter()
        .filter_map(|id| host.renderer_mesh(id))
        .find(|mesh| host.is_live((*mesh).into()))
}

fn first_materials_in_hierarchy<H: Host + ?Sized>(host: &H, root: ObjectId) -> Option<MaterialSet> {
    let materials = descendants_preorder(host, root).into_iter().find_map(|id| host.renderer_materials(id))?;
    (!materials.is_empty()).then_some(materials)
}
