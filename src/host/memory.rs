use glam::{Vec2, Vec3};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use super::{
    AssetPackaging, ContainerHandle, Liveness, MaterialHandle, MaterialSet, MeshHandle, ObjectId,
    PrefabHandle, ResourceHandle, ResourceTable, SceneGraph, ShaderHandle,
};
use crate::bundle::{AssetBundle, BundleEntry, MaterialData, MeshData, PrefabData};
use crate::error::HostError;
use crate::mesh::TriangleMesh;

/// In-process host: a flat scene graph, a resource table and a container
/// store reading [`AssetBundle`] files. Unloading a container destroys every
/// resource loaded from it, as engine asset bundles do.
#[derive(Default)]
pub struct MemoryHost {
    next_id: u64,
    objects: BTreeMap<ObjectId, SceneObject>,
    meshes: HashMap<MeshHandle, MeshRecord>,
    materials: HashMap<MaterialHandle, MaterialRecord>,
    shaders: HashMap<ShaderHandle, ShaderRecord>,
    shader_by_name: HashMap<String, ShaderHandle>,
    containers: HashMap<ContainerHandle, LoadedContainer>,
    prefabs: HashMap<PrefabHandle, LoadedPrefab>,
    virtual_files: HashMap<PathBuf, AssetBundle>,
    stats: HostStats,
}

/// Counters for observing what the kernel did to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    pub containers_opened: usize,
    pub containers_unloaded: usize,
    pub mesh_assignments: usize,
    pub material_assignments: usize,
    pub instantiated: usize,
    pub destroyed: usize,
}

struct SceneObject {
    name: String,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    position: Vec3,
    renderer: Option<Renderer>,
    switch_trigger: bool,
}

struct Renderer {
    mesh: Option<MeshHandle>,
    materials: MaterialSet,
}

struct MeshRecord {
    mesh: TriangleMesh,
    readable: bool,
    destroyed: bool,
}

struct MaterialRecord {
    name: String,
    shader: Option<ShaderHandle>,
    main_texture: Option<String>,
    destroyed: bool,
}

struct ShaderRecord {
    name: String,
    destroyed: bool,
}

struct LoadedContainer {
    path: PathBuf,
    bundle: AssetBundle,
    meshes: HashMap<String, MeshHandle>,
    materials: HashMap<String, MaterialHandle>,
    prefabs: HashMap<String, PrefabHandle>,
}

struct LoadedPrefab {
    container: ContainerHandle,
    data: PrefabData,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_raw(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn stats(&self) -> HostStats {
        self.stats
    }

    pub fn open_container_count(&self) -> usize {
        self.containers.len()
    }

    /// Makes `open_container(path)` serve `bundle` without touching disk.
    pub fn register_container(&mut self, path: impl Into<PathBuf>, bundle: AssetBundle) {
        self.virtual_files.insert(path.into(), bundle);
    }

    pub fn spawn(&mut self, name: impl Into<String>, parent: Option<ObjectId>, position: Vec3) -> ObjectId {
        let id = ObjectId(self.next_raw() as i64);
        let parent = parent.filter(|p| self.objects.contains_key(p));
        if let Some(parent_obj) = parent.and_then(|p| self.objects.get_mut(&p)) {
            parent_obj.children.push(id);
        }
        self.objects.insert(
            id,
            SceneObject {
                name: name.into(),
                parent,
                children: Vec::new(),
                position,
                renderer: None,
                switch_trigger: false,
            },
        );
        id
    }

    pub fn add_renderer(
        &mut self,
        id: ObjectId,
        mesh: Option<MeshHandle>,
        materials: MaterialSet,
    ) -> Result<(), HostError> {
        let object = self.objects.get_mut(&id).ok_or(HostError::ObjectGone(id))?;
        object.renderer = Some(Renderer { mesh, materials });
        Ok(())
    }

    pub fn remove_renderer(&mut self, id: ObjectId) -> Result<(), HostError> {
        let object = self.objects.get_mut(&id).ok_or(HostError::ObjectGone(id))?;
        object.renderer = None;
        Ok(())
    }

    pub fn mark_switch_trigger(&mut self, id: ObjectId) -> Result<(), HostError> {
        let object = self.objects.get_mut(&id).ok_or(HostError::ObjectGone(id))?;
        object.switch_trigger = true;
        Ok(())
    }

    pub fn add_mesh(&mut self, mesh: TriangleMesh, readable: bool) -> MeshHandle {
        let handle = MeshHandle(self.next_raw());
        self.meshes.insert(handle, MeshRecord { mesh, readable, destroyed: false });
        handle
    }

    pub fn mesh(&self, handle: MeshHandle) -> Option<&TriangleMesh> {
        self.meshes.get(&handle).filter(|r| !r.destroyed).map(|r| &r.mesh)
    }

    pub fn add_material(&mut self, name: impl Into<String>, shader: &str) -> MaterialHandle {
        let shader = self.intern_shader(shader);
        let handle = MaterialHandle(self.next_raw());
        self.materials.insert(
            handle,
            MaterialRecord { name: name.into(), shader: Some(shader), main_texture: None, destroyed: false },
        );
        handle
    }

    pub fn material_texture(&self, material: MaterialHandle) -> Option<&str> {
        self.materials.get(&material).and_then(|r| r.main_texture.as_deref())
    }

    /// Points a material at another shader, e.g. the host's error shader.
    pub fn set_material_shader(&mut self, material: MaterialHandle, shader: &str) {
        let shader = self.intern_shader(shader);
        if let Some(record) = self.materials.get_mut(&material) {
            record.shader = Some(shader);
        }
    }

    pub fn destroy_mesh(&mut self, mesh: MeshHandle) {
        if let Some(record) = self.meshes.get_mut(&mesh) {
            record.destroyed = true;
        }
    }

    pub fn destroy_material(&mut self, material: MaterialHandle) {
        if let Some(record) = self.materials.get_mut(&material) {
            record.destroyed = true;
        }
    }

    pub fn destroy_shader(&mut self, shader: ShaderHandle) {
        if let Some(record) = self.shaders.get_mut(&shader) {
            record.destroyed = true;
        }
    }

    fn intern_shader(&mut self, name: &str) -> ShaderHandle {
        if let Some(&handle) = self.shader_by_name.get(name) {
            if self.shaders.get(&handle).is_some_and(|s| !s.destroyed) {
                return handle;
            }
        }
        let handle = ShaderHandle(self.next_raw());
        self.shaders.insert(handle, ShaderRecord { name: name.to_string(), destroyed: false });
        self.shader_by_name.insert(name.to_string(), handle);
        handle
    }

    fn renderer(&self, id: ObjectId) -> Option<&Renderer> {
        self.objects.get(&id).and_then(|o| o.renderer.as_ref())
    }

    fn renderer_mut(&mut self, id: ObjectId) -> Result<&mut Renderer, HostError> {
        let object = self.objects.get_mut(&id).ok_or(HostError::ObjectGone(id))?;
        object.renderer.as_mut().ok_or(HostError::NoRenderer(id))
    }

    fn import_mesh(&mut self, data: &MeshData) -> Option<MeshHandle> {
        let positions = data.positions.iter().copied().map(Vec3::from_array).collect();
        let uvs = data.uvs.iter().copied().map(Vec2::from_array).collect();
        match TriangleMesh::new(data.name.clone(), positions, data.triangles.clone(), uvs) {
            Ok(mesh) => Some(self.add_mesh(mesh, data.readable)),
            Err(err) => {
                warn!("Bundle mesh '{}' is malformed: {err}", data.name);
                None
            }
        }
    }

    fn import_material(&mut self, data: &MaterialData) -> MaterialHandle {
        let handle = self.add_material(data.name.clone(), &data.shader);
        if let Some(record) = self.materials.get_mut(&handle) {
            record.main_texture = data.main_texture.clone();
        }
        handle
    }

    fn load_material(&mut self, container: ContainerHandle, name: &str) -> Option<MaterialHandle> {
        let loaded = self.containers.get(&container)?;
        if let Some(&handle) = loaded.materials.get(name) {
            return Some(handle);
        }
        let BundleEntry::Material(data) = loaded.bundle.get(name)?.clone() else {
            return None;
        };
        let handle = self.import_material(&data);
        if let Some(loaded) = self.containers.get_mut(&container) {
            loaded.materials.insert(name.to_string(), handle);
        }
        Some(handle)
    }

    fn entries_of_kind(&self, container: ContainerHandle, kind: &str) -> Vec<String> {
        self.containers
            .get(&container)
            .map(|loaded| {
                loaded
                    .bundle
                    .entries()
                    .filter(|(_, entry)| entry.kind() == kind)
                    .map(|(name, _)| name.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn remove_object_tree(&mut self, id: ObjectId) {
        let Some(object) = self.objects.remove(&id) else {
            return;
        };
        if let Some(parent) = object.parent.and_then(|p| self.objects.get_mut(&p)) {
            parent.children.retain(|child| *child != id);
        }
        for child in object.children {
            self.remove_object_tree(child);
        }
    }
}

impl Liveness for MemoryHost {
    fn is_live(&self, handle: ResourceHandle) -> bool {
        match handle {
            ResourceHandle::Object(id) => self.objects.contains_key(&id),
            ResourceHandle::Mesh(mesh) => self.meshes.get(&mesh).is_some_and(|r| !r.destroyed),
            ResourceHandle::Material(material) => self.materials.get(&material).is_some_and(|r| !r.destroyed),
            ResourceHandle::Shader(shader) => self.shaders.get(&shader).is_some_and(|r| !r.destroyed),
            ResourceHandle::Container(container) => self.containers.contains_key(&container),
        }
    }
}

impl SceneGraph for MemoryHost {
    fn renderers(&self) -> Vec<ObjectId> {
        self.objects.iter().filter(|(_, o)| o.renderer.is_some()).map(|(id, _)| *id).collect()
    }

    fn switch_triggers(&self) -> Vec<ObjectId> {
        self.objects.iter().filter(|(_, o)| o.switch_trigger).map(|(id, _)| *id).collect()
    }

    fn object_name(&self, id: ObjectId) -> Option<String> {
        self.objects.get(&id).map(|o| o.name.clone())
    }

    fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.objects.get(&id).and_then(|o| o.parent)
    }

    fn children(&self, id: ObjectId) -> Vec<ObjectId> {
        self.objects.get(&id).map(|o| o.children.clone()).unwrap_or_default()
    }

    fn world_position(&self, id: ObjectId) -> Option<Vec3> {
        self.objects.get(&id).map(|o| o.position)
    }

    fn renderer_mesh(&self, id: ObjectId) -> Option<MeshHandle> {
        self.renderer(id).and_then(|r| r.mesh)
    }

    fn renderer_materials(&self, id: ObjectId) -> Option<MaterialSet> {
        self.renderer(id).map(|r| r.materials.clone())
    }

    fn set_renderer_mesh(&mut self, id: ObjectId, mesh: MeshHandle) -> Result<(), HostError> {
        self.renderer_mut(id)?.mesh = Some(mesh);
        self.stats.mesh_assignments += 1;
        Ok(())
    }

    fn set_renderer_materials(&mut self, id: ObjectId, materials: &[MaterialHandle]) -> Result<(), HostError> {
        self.renderer_mut(id)?.materials = materials.to_vec();
        self.stats.material_assignments += 1;
        Ok(())
    }
}

impl ResourceTable for MemoryHost {
    fn create_mesh(&mut self, mesh: TriangleMesh) -> MeshHandle {
        self.add_mesh(mesh, true)
    }

    fn mesh_name(&self, mesh: MeshHandle) -> Option<String> {
        self.mesh(mesh).map(|m| m.name.clone())
    }

    fn mesh_is_readable(&self, mesh: MeshHandle) -> bool {
        self.meshes.get(&mesh).is_some_and(|r| !r.destroyed && r.readable)
    }

    fn mesh_vertex_count(&self, mesh: MeshHandle) -> Option<usize> {
        self.mesh(mesh).map(TriangleMesh::vertex_count)
    }

    fn mesh_uvs(&self, mesh: MeshHandle) -> Result<Vec<Vec2>, HostError> {
        let record = self.meshes.get(&mesh).filter(|r| !r.destroyed).ok_or(HostError::MeshDestroyed(mesh))?;
        if !record.readable {
            return Err(HostError::MeshNotReadable(mesh));
        }
        Ok(record.mesh.uvs().map(<[Vec2]>::to_vec).unwrap_or_default())
    }

    fn set_mesh_uvs(&mut self, mesh: MeshHandle, uvs: Vec<Vec2>) -> Result<(), HostError> {
        let record =
            self.meshes.get_mut(&mesh).filter(|r| !r.destroyed).ok_or(HostError::MeshDestroyed(mesh))?;
        if !record.readable {
            return Err(HostError::MeshNotReadable(mesh));
        }
        record.mesh.set_uvs(uvs)?;
        Ok(())
    }

    fn material_name(&self, material: MaterialHandle) -> Option<String> {
        self.materials.get(&material).filter(|r| !r.destroyed).map(|r| r.name.clone())
    }

    fn material_shader(&self, material: MaterialHandle) -> Option<ShaderHandle> {
        self.materials.get(&material).filter(|r| !r.destroyed).and_then(|r| r.shader)
    }

    fn shader_name(&self, shader: ShaderHandle) -> Option<String> {
        self.shaders.get(&shader).filter(|r| !r.destroyed).map(|r| r.name.clone())
    }
}

impl AssetPackaging for MemoryHost {
    fn open_container(&mut self, path: &Path) -> Result<ContainerHandle, HostError> {
        if self.containers.values().any(|c| c.path == path) {
            return Err(HostError::ContainerOpen {
                path: path.to_path_buf(),
                reason: "a container with the same path is already loaded".to_string(),
            });
        }
        let bundle = match self.virtual_files.get(path) {
            Some(bundle) => bundle.clone(),
            None => AssetBundle::load_from_path(path)
                .map_err(|err| HostError::ContainerOpen { path: path.to_path_buf(), reason: err.to_string() })?,
        };
        let handle = ContainerHandle(self.next_raw());
        debug!("Opened container {} with {} entries", path.display(), bundle.len());
        self.containers.insert(
            handle,
            LoadedContainer {
                path: path.to_path_buf(),
                bundle,
                meshes: HashMap::new(),
                materials: HashMap::new(),
                prefabs: HashMap::new(),
            },
        );
        self.stats.containers_opened += 1;
        Ok(handle)
    }

    fn unload_container(&mut self, container: ContainerHandle) {
        let Some(loaded) = self.containers.remove(&container) else {
            return;
        };
        for mesh in loaded.meshes.values() {
            self.destroy_mesh(*mesh);
        }
        for material in loaded.materials.values() {
            self.destroy_material(*material);
        }
        self.prefabs.retain(|_, prefab| prefab.container != container);
        self.stats.containers_unloaded += 1;
        debug!("Unloaded container {}", loaded.path.display());
    }

    fn container_entries(&self, container: ContainerHandle) -> Vec<String> {
        self.containers
            .get(&container)
            .map(|loaded| loaded.bundle.names().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn load_text(&mut self, container: ContainerHandle, name: &str) -> Option<String> {
        match self.containers.get(&container)?.bundle.get(name)? {
            BundleEntry::Text(text) => Some(text.clone()),
            _ => None,
        }
    }

    fn load_mesh(&mut self, container: ContainerHandle, name: &str) -> Option<MeshHandle> {
        let loaded = self.containers.get(&container)?;
        if let Some(&handle) = loaded.meshes.get(name) {
            return Some(handle);
        }
        let BundleEntry::Mesh(data) = loaded.bundle.get(name)?.clone() else {
            return None;
        };
        let handle = self.import_mesh(&data)?;
        if let Some(loaded) = self.containers.get_mut(&container) {
            loaded.meshes.insert(name.to_string(), handle);
        }
        Some(handle)
    }

    fn load_all_meshes(&mut self, container: ContainerHandle) -> Vec<MeshHandle> {
        self.entries_of_kind(container, "mesh").iter().filter_map(|name| self.load_mesh(container, name)).collect()
    }

    fn load_all_materials(&mut self, container: ContainerHandle) -> Vec<MaterialHandle> {
        self.entries_of_kind(container, "material")
            .iter()
            .filter_map(|name| self.load_material(container, name))
            .collect()
    }

    fn load_all_prefabs(&mut self, container: ContainerHandle) -> Vec<PrefabHandle> {
        let mut handles = Vec::new();
        for name in self.entries_of_kind(container, "prefab") {
            if let Some(&handle) = self.containers.get(&container).and_then(|c| c.prefabs.get(&name)) {
                handles.push(handle);
                continue;
            }
            let Some(BundleEntry::Prefab(data)) =
                self.containers.get(&container).and_then(|c| c.bundle.get(&name)).cloned()
            else {
                continue;
            };
            let handle = PrefabHandle(self.next_raw());
            self.prefabs.insert(handle, LoadedPrefab { container, data });
            if let Some(loaded) = self.containers.get_mut(&container) {
                loaded.prefabs.insert(name, handle);
            }
            handles.push(handle);
        }
        handles
    }

    fn prefab_name(&self, prefab: PrefabHandle) -> Option<String> {
        self.prefabs.get(&prefab).map(|p| p.data.name.clone())
    }

    fn instantiate(&mut self, prefab: PrefabHandle) -> Result<ObjectId, HostError> {
        let (container, data) = self
            .prefabs
            .get(&prefab)
            .map(|p| (p.container, p.data.clone()))
            .ok_or_else(|| HostError::Instantiate(format!("prefab {prefab:?} is not loaded")))?;
        if data.nodes.is_empty() {
            return Err(HostError::Instantiate(format!("prefab '{}' has no nodes", data.name)));
        }
        let mut spawned: Vec<ObjectId> = Vec::with_capacity(data.nodes.len());
        for (index, node) in data.nodes.iter().enumerate() {
            let parent = match node.parent {
                Some(p) if p < index => Some(spawned[p]),
                Some(p) => {
                    if let Some(&root) = spawned.first() {
                        self.remove_object_tree(root);
                    }
                    return Err(HostError::Instantiate(format!(
                        "prefab '{}' node {index} has forward parent {p}",
                        data.name
                    )));
                }
                None if index == 0 => None,
                None => Some(spawned[0]),
            };
            let id = self.spawn(format!("{}(Clone)", node.name), parent, Vec3::ZERO);
            if index == 0 {
                if let Some(object) = self.objects.get_mut(&id) {
                    object.name = format!("{}(Clone)", data.name);
                }
            }
            if node.mesh.is_some() || !node.materials.is_empty() {
                let mesh = node.mesh.as_deref().and_then(|name| self.load_mesh(container, name));
                let materials =
                    node.materials.iter().filter_map(|name| self.load_material(container, name)).collect();
                self.add_renderer(id, mesh, materials)?;
            }
            spawned.push(id);
        }
        self.stats.instantiated += 1;
        Ok(spawned[0])
    }

    fn destroy_immediate(&mut self, id: ObjectId) {
        if self.objects.contains_key(&id) {
            self.remove_object_tree(id);
            self.stats.destroyed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::PrefabNode;

    fn quad_mesh_data(name: &str) -> MeshData {
        MeshData {
            name: name.to_string(),
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            triangles: vec![[0, 1, 2], [0, 2, 3]],
            uvs: Vec::new(),
            readable: false,
        }
    }

    fn prefab_bundle() -> AssetBundle {
        let mut bundle = AssetBundle::new();
        bundle.insert("sign_mesh", BundleEntry::Mesh(quad_mesh_data("sign_mesh")));
        bundle.insert(
            "sign_mat",
            BundleEntry::Material(MaterialData {
                name: "sign_mat".to_string(),
                shader: "Standard".to_string(),
                main_texture: None,
            }),
        );
        bundle.insert(
            "SwitchSign",
            BundleEntry::Prefab(PrefabData {
                name: "SwitchSign".to_string(),
                nodes: vec![
                    PrefabNode { name: "root".to_string(), parent: None, mesh: None, materials: Vec::new() },
                    PrefabNode {
                        name: "board".to_string(),
                        parent: Some(0),
                        mesh: Some("sign_mesh".to_string()),
                        materials: vec!["sign_mat".to_string()],
                    },
                ],
            }),
        );
        bundle
    }

    #[test]
    fn unloading_container_destroys_loaded_resources() {
        let mut host = MemoryHost::new();
        host.register_container("bundles/switchmodel", prefab_bundle());
        let container = host.open_container(Path::new("bundles/switchmodel")).expect("open");
        let mesh = host.load_mesh(container, "sign_mesh").expect("mesh");
        let materials = host.load_all_materials(container);
        assert_eq!(materials.len(), 1);
        assert_eq!(host.load_mesh(container, "sign_mesh"), Some(mesh));

        host.unload_container(container);
        assert!(!host.is_live(mesh.into()));
        assert!(!host.is_live(materials[0].into()));
        assert!(!host.is_live(container.into()));
    }

    #[test]
    fn same_path_cannot_be_loaded_twice() {
        let mut host = MemoryHost::new();
        host.register_container("switchmodel", prefab_bundle());
        let first = host.open_container(Path::new("switchmodel")).expect("open");
        assert!(host.open_container(Path::new("switchmodel")).is_err());
        host.unload_container(first);
        assert!(host.open_container(Path::new("switchmodel")).is_ok());
    }

    #[test]
    fn instantiate_builds_hierarchy_and_destroy_removes_it() {
        let mut host = MemoryHost::new();
        host.register_container("switchmodel", prefab_bundle());
        let container = host.open_container(Path::new("switchmodel")).expect("open");
        let prefab = host.load_all_prefabs(container)[0];
        let root = host.instantiate(prefab).expect("instance");
        let children = host.children(root);
        assert_eq!(children.len(), 1);
        assert!(host.renderer_mesh(children[0]).is_some());
        assert_eq!(host.renderer_materials(children[0]).map(|m| m.len()), Some(1));

        host.destroy_immediate(root);
        assert!(!host.is_live(root.into()));
        assert!(!host.is_live(children[0].into()));
        assert!(host.renderers().is_empty());
    }

    #[test]
    fn unreadable_mesh_refuses_uv_access() {
        let mut host = MemoryHost::new();
        host.register_container("switchmodel", prefab_bundle());
        let container = host.open_container(Path::new("switchmodel")).expect("open");
        let mesh = host.load_mesh(container, "sign_mesh").expect("mesh");
        assert_eq!(host.mesh_uvs(mesh), Err(HostError::MeshNotReadable(mesh)));
        assert!(host.set_mesh_uvs(mesh, vec![Vec2::ZERO; 4]).is_err());
    }
}
