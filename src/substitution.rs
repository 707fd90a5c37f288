//! Swaps switch sign renderers over to the custom model and back.
//!
//! All substituted renderers share the cached mesh and material handles. The
//! best-effort UV copy therefore writes into that shared mesh, and the last
//! renderer processed decides the UV layout every substituted sign shows.

use glam::Vec2;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::cache::ReplacementCache;
use crate::error::{HostError, ReplacerError};
use crate::host::{descendants_preorder, material_state, Host, MaterialSet, MeshHandle, ObjectId};
use crate::matcher::SpatialMatcher;

const DEBUG_DUMP_LIMIT: usize = 3;
const DEBUG_DUMP_DEPTH: usize = 3;
const DEBUG_DUMP_CHILDREN: usize = 10;

/// Pre-substitution state of one renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalSnapshot {
    pub mesh: MeshHandle,
    pub materials: Option<MaterialSet>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub triggers: usize,
    pub renderers_found: usize,
    pub modified: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UvTransfer {
    pub copied: usize,
    pub vertex_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UvTransferError {
    #[error("renderer already shows the custom mesh")]
    SameMesh,
    #[error("original mesh is not readable")]
    NotReadable,
    #[error("original mesh has no UVs")]
    NoUvs,
    #[error("custom mesh has {custom} vertices, original only {original}")]
    CustomLarger { custom: usize, original: usize },
    #[error(transparent)]
    Host(#[from] HostError),
}

pub struct SubstitutionEngine {
    matcher: SpatialMatcher,
    apply_materials: bool,
    debug_structure_dump: bool,
    broken_shader_name: String,
    processed: BTreeSet<ObjectId>,
    snapshots: BTreeMap<ObjectId, OriginalSnapshot>,
}

impl SubstitutionEngine {
    pub fn new(matcher: SpatialMatcher, apply_materials: bool, broken_shader_name: impl Into<String>) -> Self {
        Self {
            matcher,
            apply_materials,
            debug_structure_dump: false,
            broken_shader_name: broken_shader_name.into(),
            processed: BTreeSet::new(),
            snapshots: BTreeMap::new(),
        }
    }

    pub fn with_debug_structure_dump(mut self, enabled: bool) -> Self {
        self.debug_structure_dump = enabled;
        self
    }

    pub fn set_apply_materials(&mut self, apply: bool) {
        self.apply_materials = apply;
    }

    pub fn matcher(&self) -> &SpatialMatcher {
        &self.matcher
    }

    pub fn processed(&self) -> &BTreeSet<ObjectId> {
        &self.processed
    }

    pub fn snapshot(&self, renderer: ObjectId) -> Option<&OriginalSnapshot> {
        self.snapshots.get(&renderer)
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    pub fn clear_processed(&mut self) {
        self.processed.clear();
    }

    pub fn apply_to_all<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        cache: &mut ReplacementCache,
    ) -> Result<ApplySummary, ReplacerError> {
        if !cache.is_available() {
            warn!("No custom model available. Cannot apply modifications.");
            return Err(ReplacerError::NoCustomModel);
        }
        let triggers = host.switch_triggers();
        let mut summary = ApplySummary { triggers: triggers.len(), ..ApplySummary::default() };
        for trigger in triggers {
            summary.renderers_found += descendants_preorder(host, trigger)
                .into_iter()
                .filter(|&id| host.renderer_mesh(id).is_some())
                .count();
            if self.apply_to_instance(host, cache, trigger) {
                summary.modified += 1;
            } else {
                summary.failed += 1;
            }
        }
        info!(
            "Switch replacement completed: {} triggers, {} renderers under triggers, {} modified, {} failed",
            summary.triggers, summary.renderers_found, summary.modified, summary.failed
        );
        Ok(summary)
    }

    /// Substitutes every switch sign renderer near `trigger`. Returns true
    /// when at least one renderer was substituted now or previously.
    pub fn apply_to_instance<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        cache: &mut ReplacementCache,
        trigger: ObjectId,
    ) -> bool {
        match self.try_apply_to_instance(host, cache, trigger) {
            Ok(()) => true,
            Err(ReplacerError::NoCustomModel) => false,
            Err(err) => {
                warn!("Switch {trigger:?} not modified: {err}");
                false
            }
        }
    }

    fn try_apply_to_instance<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        cache: &mut ReplacementCache,
        trigger: ObjectId,
    ) -> Result<(), ReplacerError> {
        let live = host.is_live(trigger.into());
        if self.processed.contains(&trigger) {
            if live {
                return Ok(());
            }
            self.processed.remove(&trigger);
        }
        if !live {
            return Err(HostError::ObjectGone(trigger).into());
        }
        if !cache.is_available() {
            return Err(ReplacerError::NoCustomModel);
        }
        if self.debug_structure_dump && self.processed.len() < DEBUG_DUMP_LIMIT {
            let nodes = dump_structure(host, trigger);
            debug!("Dumped {nodes} nodes under {trigger:?}");
        }

        let position = host.world_position(trigger).ok_or(HostError::ObjectGone(trigger))?;
        let candidates = self.matcher.find_candidates(host, position);
        debug!("Trigger {trigger:?} at {position}: {} candidate renderers", candidates.len());

        let mut any_modified = false;
        for renderer in candidates {
            match self.substitute_renderer(host, cache, renderer) {
                Ok(()) => any_modified = true,
                Err(err) => debug!("Renderer {renderer:?} not substituted: {err}"),
            }
        }
        if !any_modified {
            return Err(ReplacerError::NoCandidates(trigger));
        }
        self.processed.insert(trigger);
        Ok(())
    }

    fn substitute_renderer<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        cache: &mut ReplacementCache,
        renderer: ObjectId,
    ) -> Result<(), ReplacerError> {
        let current_mesh = host.renderer_mesh(renderer).ok_or(HostError::NoRenderer(renderer))?;
        if !self.snapshots.contains_key(&renderer) {
            let materials = host.renderer_materials(renderer);
            self.snapshots.insert(renderer, OriginalSnapshot { mesh: current_mesh, materials });
        }

        let custom = cache.mesh(host).ok_or(ReplacerError::NoCustomModel)?;
        match transfer_uvs(host, current_mesh, custom) {
            Ok(transfer) => debug!(
                "Preserved {} of {} original UVs on custom mesh",
                transfer.copied, transfer.vertex_count
            ),
            Err(err) => debug!("Original UV layout not preserved: {err}"),
        }
        host.set_renderer_mesh(renderer, custom)?;

        if self.apply_materials {
            match cache.materials(host) {
                Some(materials) => {
                    host.set_renderer_materials(renderer, &materials)?;
                    debug!("Applied {} custom materials to {renderer:?}", materials.len());
                }
                None => debug!("No custom materials available, keeping current materials"),
            }
        }
        Ok(())
    }

    /// Puts every snapshotted renderer back to its original mesh and
    /// materials. Returns how many were restored.
    pub fn restore_all<H: Host + ?Sized>(&mut self, host: &mut H, cache: &mut ReplacementCache) -> usize {
        let mut restored = 0;
        let owners: Vec<ObjectId> = self.snapshots.keys().copied().collect();
        for owner in owners {
            if !host.is_live(owner.into()) {
                self.snapshots.remove(&owner);
                continue;
            }
            let Some(snapshot) = self.snapshots.get(&owner).cloned() else {
                continue;
            };
            if !host.is_live(snapshot.mesh.into()) {
                debug!("Original mesh of {owner:?} is gone; leaving renderer as is");
                continue;
            }
            match restore_renderer(host, owner, &snapshot) {
                Ok(()) => {}
                Err(HostError::NoRenderer(_)) => {
                    debug!("{owner:?} no longer has a renderer; dropping its snapshot");
                    self.snapshots.remove(&owner);
                    continue;
                }
                Err(err) => {
                    warn!("Failed to restore {owner:?}: {err}");
                    continue;
                }
            }
            self.snapshots.remove(&owner);
            restored += 1;
        }
        self.processed.clear();
        cache.clear(host);
        info!("Restored {restored} switches to original state");
        restored
    }

    /// Reassigns custom materials on substituted renderers whose current
    /// materials were destroyed or fell back to the error shader.
    pub fn refresh_materials_if_needed<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        cache: &mut ReplacementCache,
    ) -> usize {
        let mut refreshed = 0;
        let owners: Vec<ObjectId> = self.snapshots.keys().copied().collect();
        for owner in owners {
            if !host.is_live(owner.into()) {
                continue;
            }
            let Some(current) = host.renderer_materials(owner) else {
                continue;
            };
            let corrupted = current
                .iter()
                .any(|&m| !material_state(host, m, &self.broken_shader_name).is_usable());
            if !corrupted {
                continue;
            }
            let Some(materials) = cache.materials(host) else {
                debug!("Materials of {owner:?} are corrupted but no replacement is available");
                continue;
            };
            match host.set_renderer_materials(owner, &materials) {
                Ok(()) => refreshed += 1,
                Err(err) => warn!("Failed to refresh materials on {owner:?}: {err}"),
            }
        }
        if refreshed > 0 {
            info!("Refreshed materials on {refreshed} renderers");
        }
        refreshed
    }
}

fn restore_renderer<H: Host + ?Sized>(
    host: &mut H,
    owner: ObjectId,
    snapshot: &OriginalSnapshot,
) -> Result<(), HostError> {
    host.set_renderer_mesh(owner, snapshot.mesh)?;
    if let Some(materials) = &snapshot.materials {
        host.set_renderer_materials(owner, materials)?;
    }
    Ok(())
}

/// Copies the leading UVs of `original` onto `custom` when the original is
/// readable and at least as large. Slots past the original UV count are zero.
pub fn transfer_uvs<H: Host + ?Sized>(
    host: &mut H,
    original: MeshHandle,
    custom: MeshHandle,
) -> Result<UvTransfer, UvTransferError> {
    if original == custom {
        return Err(UvTransferError::SameMesh);
    }
    if !host.mesh_is_readable(original) {
        return Err(UvTransferError::NotReadable);
    }
    let original_uvs = host.mesh_uvs(original)?;
    if original_uvs.is_empty() {
        return Err(UvTransferError::NoUvs);
    }
    let original_count = host.mesh_vertex_count(original).ok_or(HostError::MeshDestroyed(original))?;
    let custom_count = host.mesh_vertex_count(custom).ok_or(HostError::MeshDestroyed(custom))?;
    if custom_count > original_count {
        return Err(UvTransferError::CustomLarger { custom: custom_count, original: original_count });
    }
    let copied = custom_count.min(original_uvs.len());
    let mut uvs = vec![Vec2::ZERO; custom_count];
    uvs[..copied].copy_from_slice(&original_uvs[..copied]);
    host.set_mesh_uvs(custom, uvs)?;
    Ok(UvTransfer { copied, vertex_count: custom_count })
}

/// Logs the hierarchy under `trigger`, bounded in depth and fan-out.
/// Returns how many nodes were written.
fn dump_structure<H: Host + ?Sized>(host: &H, trigger: ObjectId) -> usize {
    debug!("=== Switch trigger {trigger:?} structure ===");
    dump_node(host, trigger, 0)
}

fn dump_node<H: Host + ?Sized>(host: &H, id: ObjectId, depth: usize) -> usize {
    if depth > DEBUG_DUMP_DEPTH {
        return 0;
    }
    let indent = " ".repeat(depth * 2);
    let name = host.object_name(id).unwrap_or_default();
    match host.renderer_mesh(id).and_then(|mesh| host.mesh_name(mesh)) {
        Some(mesh) => debug!("{indent}{name} -> mesh '{mesh}'"),
        None => debug!("{indent}{name}"),
    }
    1 + host
        .children(id)
        .into_iter()
        .take(DEBUG_DUMP_CHILDREN)
        .map(|child| dump_node(host, child, depth + 1))
        .sum::<usize>()
}
