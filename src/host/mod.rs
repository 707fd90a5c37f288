//! Capabilities the replacer needs from the game it runs inside.
//!
//! The kernel never talks to engine APIs directly. Everything it reads or
//! mutates goes through these traits, implemented by an adapter over the host
//! binding. [`memory::MemoryHost`] is a self-contained implementation backed by
//! [`crate::bundle::AssetBundle`] files.

use glam::{Vec2, Vec3};
use std::path::Path;

use crate::error::HostError;
use crate::mesh::TriangleMesh;

pub mod memory;

/// Stable per-instance identifier of a scene object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrefabHandle(pub u64);

/// Ordered material slots of a renderer.
pub type MaterialSet = Vec<MaterialHandle>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceHandle {
    Object(ObjectId),
    Mesh(MeshHandle),
    Material(MaterialHandle),
    Shader(ShaderHandle),
    Container(ContainerHandle),
}

macro_rules! impl_resource_handle {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for ResourceHandle {
            fn from(value: $ty) -> Self {
                ResourceHandle::$variant(value)
            }
        })*
    };
}

impl_resource_handle!(
    ObjectId => Object,
    MeshHandle => Mesh,
    MaterialHandle => Material,
    ShaderHandle => Shader,
    ContainerHandle => Container,
);

/// Whether the host still backs a handle. Handles can die out-of-band, e.g.
/// when the host unloads the container a material came from.
pub trait Liveness {
    fn is_live(&self, handle: ResourceHandle) -> bool;
}

/// Scene queries return snapshots, never live views.
pub trait SceneGraph: Liveness {
    fn renderers(&self) -> Vec<ObjectId>;
    fn switch_triggers(&self) -> Vec<ObjectId>;
    fn object_name(&self, id: ObjectId) -> Option<String>;
    fn parent(&self, id: ObjectId) -> Option<ObjectId>;
    fn children(&self, id: ObjectId) -> Vec<ObjectId>;
    fn world_position(&self, id: ObjectId) -> Option<Vec3>;
    /// `None` when the object carries no renderer.
    fn renderer_mesh(&self, id: ObjectId) -> Option<MeshHandle>;
    fn renderer_materials(&self, id: ObjectId) -> Option<MaterialSet>;
    fn set_renderer_mesh(&mut self, id: ObjectId, mesh: MeshHandle) -> Result<(), HostError>;
    fn set_renderer_materials(&mut self, id: ObjectId, materials: &[MaterialHandle]) -> Result<(), HostError>;
}

pub trait ResourceTable: Liveness {
    fn create_mesh(&mut self, mesh: TriangleMesh) -> MeshHandle;
    fn mesh_name(&self, mesh: MeshHandle) -> Option<String>;
    fn mesh_is_readable(&self, mesh: MeshHandle) -> bool;
    fn mesh_vertex_count(&self, mesh: MeshHandle) -> Option<usize>;
    fn mesh_uvs(&self, mesh: MeshHandle) -> Result<Vec<Vec2>, HostError>;
    fn set_mesh_uvs(&mut self, mesh: MeshHandle, uvs: Vec<Vec2>) -> Result<(), HostError>;
    fn material_name(&self, material: MaterialHandle) -> Option<String>;
    fn material_shader(&self, material: MaterialHandle) -> Option<ShaderHandle>;
    fn shader_name(&self, shader: ShaderHandle) -> Option<String>;
}

/// The packaged-asset container, treated as a key to typed-resource store.
pub trait AssetPackaging: Liveness {
    fn open_container(&mut self, path: &Path) -> Result<ContainerHandle, HostError>;
    /// Releases the container and every resource loaded from it.
    fn unload_container(&mut self, container: ContainerHandle);
    fn container_entries(&self, container: ContainerHandle) -> Vec<String>;
    fn load_text(&mut self, container: ContainerHandle, name: &str) -> Option<String>;
    fn load_mesh(&mut self, container: ContainerHandle, name: &str) -> Option<MeshHandle>;
    fn load_all_meshes(&mut self, container: ContainerHandle) -> Vec<MeshHandle>;
    fn load_all_materials(&mut self, container: ContainerHandle) -> Vec<MaterialHandle>;
    fn load_all_prefabs(&mut self, container: ContainerHandle) -> Vec<PrefabHandle>;
    fn prefab_name(&self, prefab: PrefabHandle) -> Option<String>;
    fn instantiate(&mut self, prefab: PrefabHandle) -> Result<ObjectId, HostError>;
    fn destroy_immediate(&mut self, id: ObjectId);
}

pub trait Host: SceneGraph + ResourceTable + AssetPackaging {}

impl<T> Host for T where T: SceneGraph + ResourceTable + AssetPackaging {}

/// Pre-order walk over `root` and its descendants.
pub fn descendants_preorder<H: SceneGraph + ?Sized>(host: &H, root: ObjectId) -> Vec<ObjectId> {
    let mut order = Vec::new();
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        order.push(id);
        let children = host.children(id);
        stack.extend(children.into_iter().rev());
    }
    order
}

/// Object names from `id` up to the scene root, `id` first.
pub fn ancestor_names<H: SceneGraph + ?Sized>(host: &H, id: ObjectId) -> Vec<String> {
    let mut names = Vec::new();
    let mut current = Some(id);
    while let Some(node) = current {
        if let Some(name) = host.object_name(node) {
            names.push(name);
        }
        current = host.parent(node);
    }
    names
}

/// Condition of one material slot as seen from the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialState {
    Live,
    Destroyed,
    ShaderMissing,
    BrokenShader,
}

impl MaterialState {
    pub fn is_usable(self) -> bool {
        matches!(self, MaterialState::Live)
    }
}

pub fn material_state<H: ResourceTable + ?Sized>(
    host: &H,
    material: MaterialHandle,
    broken_shader_name: &str,
) -> MaterialState {
    if !host.is_live(material.into()) {
        return MaterialState::Destroyed;
    }
    let Some(shader) = host.material_shader(material).filter(|s| host.is_live((*s).into())) else {
        return MaterialState::ShaderMissing;
    };
    match host.shader_name(shader) {
        Some(name) if name == broken_shader_name => MaterialState::BrokenShader,
        _ => MaterialState::Live,
    }
}

/// True when the set is non-empty and every member is usable.
pub fn material_set_usable<H: ResourceTable + ?Sized>(
    host: &H,
    materials: &[MaterialHandle],
    broken_shader_name: &str,
) -> bool {
    !materials.is_empty()
        && materials.iter().all(|&m| material_state(host, m, broken_shader_name).is_usable())
}
