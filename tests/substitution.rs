use glam::{Vec2, Vec3};
use std::path::{Path, PathBuf};
use switch_sign_replacer::bundle::{AssetBundle, BundleEntry, MaterialData};
use switch_sign_replacer::config::ArchiveConfig;
use switch_sign_replacer::host::{AssetPackaging, Liveness, MaterialSet, MeshHandle, ResourceTable, SceneGraph};
use switch_sign_replacer::substitution::{transfer_uvs, UvTransferError};
use switch_sign_replacer::{
    MemoryHost, ObjectId, ReplacementCache, ReplacerError, SpatialMatcher, SubstitutionEngine, TriangleMesh,
};

const BROKEN: &str = "Hidden/InternalErrorShader";
const ARCHIVE: &str = "mods/switchmodel";
const SIGN_OBJ: &str = "v 0 0 0\nv 0 2 0\nv 0.5 2 0\nf 1 2 3\n";

struct Scene {
    host: MemoryHost,
    near_trigger: ObjectId,
    near_sign: ObjectId,
    far_sign: ObjectId,
    original_mesh: MeshHandle,
    original_materials: MaterialSet,
}

fn original_uvs() -> Vec<Vec2> {
    vec![Vec2::new(0.25, 0.25), Vec2::new(0.75, 0.25), Vec2::new(0.75, 0.75), Vec2::new(0.25, 0.75)]
}

fn archive() -> AssetBundle {
    let mut bundle = AssetBundle::new();
    bundle.insert("assets/switch_sign.obj", BundleEntry::Text(SIGN_OBJ.to_string()));
    bundle.insert(
        "sign_paint",
        BundleEntry::Material(MaterialData {
            name: "sign_paint".to_string(),
            shader: "Standard".to_string(),
            main_texture: None,
        }),
    );
    bundle
}

fn scene_with_original(readable: bool) -> Scene {
    let mut host = MemoryHost::new();
    host.register_container(ARCHIVE, archive());
    let quad = TriangleMesh::new(
        "Sign_Board",
        vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
        vec![[0, 1, 2], [0, 2, 3]],
        original_uvs(),
    )
    .expect("quad");
    let original_mesh = host.add_mesh(quad, readable);
    let original_materials = vec![host.add_material("SignBoard", "Standard")];

    let place = |host: &mut MemoryHost, at: Vec3| {
        let trigger = host.spawn("JunctionSwitch", None, at);
        host.mark_switch_trigger(trigger).expect("trigger");
        let sign = host.spawn("switch_sign", Some(trigger), at + Vec3::Y);
        host.add_renderer(sign, Some(original_mesh), original_materials.clone()).expect("renderer");
        (trigger, sign)
    };
    let (near_trigger, near_sign) = place(&mut host, Vec3::ZERO);
    let (_far_trigger, far_sign) = place(&mut host, Vec3::new(100.0, 0.0, 0.0));

    Scene { host, near_trigger, near_sign, far_sign, original_mesh, original_materials }
}

fn scene() -> Scene {
    scene_with_original(true)
}

fn cache_for(path: Option<&str>) -> ReplacementCache {
    ReplacementCache::new(ArchiveConfig::default(), path.map(PathBuf::from), BROKEN)
}

fn engine(apply_materials: bool) -> SubstitutionEngine {
    SubstitutionEngine::new(SpatialMatcher::default(), apply_materials, BROKEN)
}

#[test]
fn apply_to_instance_is_idempotent() {
    let mut scene = scene();
    let mut cache = cache_for(Some(ARCHIVE));
    let mut engine = engine(true);

    assert!(engine.apply_to_instance(&mut scene.host, &mut cache, scene.near_trigger));
    let after_first = scene.host.stats();
    assert_eq!(after_first.mesh_assignments, 1);

    assert!(engine.apply_to_instance(&mut scene.host, &mut cache, scene.near_trigger));
    assert_eq!(scene.host.stats(), after_first);
    assert_eq!(engine.processed().len(), 1);
    assert_eq!(engine.snapshot_count(), 1);
    assert_ne!(scene.host.renderer_mesh(scene.near_sign), Some(scene.original_mesh));
    assert_eq!(scene.host.renderer_mesh(scene.far_sign), Some(scene.original_mesh));
}

#[test]
fn snapshot_keeps_the_true_original_across_reapply() {
    let mut scene = scene();
    let mut cache = cache_for(Some(ARCHIVE));
    let mut engine = engine(true);

    assert!(engine.apply_to_instance(&mut scene.host, &mut cache, scene.near_trigger));
    engine.clear_processed();
    assert!(engine.apply_to_instance(&mut scene.host, &mut cache, scene.near_trigger));
    assert_eq!(scene.host.stats().mesh_assignments, 2);

    let snapshot = engine.snapshot(scene.near_sign).expect("snapshot");
    assert_eq!(snapshot.mesh, scene.original_mesh);
    assert_eq!(snapshot.materials.as_ref(), Some(&scene.original_materials));
}

#[test]
fn restore_all_returns_reference_equal_originals() {
    let mut scene = scene();
    let mut cache = cache_for(Some(ARCHIVE));
    let mut engine = engine(true);

    let summary = engine.apply_to_all(&mut scene.host, &mut cache).expect("apply");
    assert_eq!(summary.triggers, 2);
    assert_eq!(summary.renderers_found, 2);
    assert_eq!(summary.modified, 2);
    assert_eq!(summary.failed, 0);
    let custom = scene.host.renderer_mesh(scene.near_sign).expect("custom mesh");
    assert_eq!(scene.host.mesh_name(custom).as_deref(), Some("AssetBundle_OBJ_switch_sign"));
    assert_eq!(scene.host.renderer_mesh(scene.far_sign), Some(custom));

    assert_eq!(engine.restore_all(&mut scene.host, &mut cache), 2);
    for sign in [scene.near_sign, scene.far_sign] {
        assert_eq!(scene.host.renderer_mesh(sign), Some(scene.original_mesh));
        assert_eq!(scene.host.renderer_materials(sign), Some(scene.original_materials.clone()));
    }
    assert!(engine.processed().is_empty());
    assert_eq!(engine.snapshot_count(), 0);
    assert_eq!(scene.host.open_container_count(), 0);
}

#[test]
fn restore_skips_renderers_whose_original_mesh_died() {
    let mut scene = scene();
    let mut cache = cache_for(Some(ARCHIVE));
    let mut engine = engine(true);
    engine.apply_to_all(&mut scene.host, &mut cache).expect("apply");

    scene.host.destroy_mesh(scene.original_mesh);
    assert_eq!(engine.restore_all(&mut scene.host, &mut cache), 0);
    assert!(engine.processed().is_empty());
    assert_ne!(scene.host.renderer_mesh(scene.near_sign), Some(scene.original_mesh));
}

#[test]
fn custom_mesh_takes_original_uv_layout() {
    let mut scene = scene();
    let mut cache = cache_for(Some(ARCHIVE));
    let mut engine = engine(true);
    assert!(engine.apply_to_instance(&mut scene.host, &mut cache, scene.near_trigger));

    let custom = scene.host.renderer_mesh(scene.near_sign).expect("custom mesh");
    let uvs = scene.host.mesh_uvs(custom).expect("uvs");
    assert_eq!(uvs, original_uvs()[..3].to_vec());
}

#[test]
fn unreadable_original_keeps_generated_uvs_but_still_substitutes() {
    let mut scene = scene_with_original(false);
    let mut cache = cache_for(Some(ARCHIVE));
    let mut engine = engine(true);
    assert!(engine.apply_to_instance(&mut scene.host, &mut cache, scene.near_trigger));

    let custom = scene.host.renderer_mesh(scene.near_sign).expect("custom mesh");
    assert_ne!(custom, scene.original_mesh);
    let uvs = scene.host.mesh_uvs(custom).expect("uvs");
    assert_ne!(uvs, original_uvs()[..3].to_vec());
}

#[test]
fn uv_transfer_refuses_larger_custom_mesh() {
    let mut host = MemoryHost::new();
    let small = TriangleMesh::new("small", vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![[0, 1, 2]], vec![Vec2::ONE; 3])
        .expect("small");
    let large = TriangleMesh::new(
        "large",
        vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE],
        vec![[0, 1, 2], [1, 3, 2]],
        Vec::new(),
    )
    .expect("large");
    let original = host.add_mesh(small, true);
    let custom = host.add_mesh(large, true);
    assert_eq!(
        transfer_uvs(&mut host, original, custom),
        Err(UvTransferError::CustomLarger { custom: 4, original: 3 })
    );
    assert_eq!(transfer_uvs(&mut host, original, original), Err(UvTransferError::SameMesh));

    let copied = transfer_uvs(&mut host, custom, original);
    assert_eq!(copied, Err(UvTransferError::NoUvs));
}

#[test]
fn refresh_is_a_no_op_when_materials_are_valid() {
    let mut scene = scene();
    let mut cache = cache_for(Some(ARCHIVE));
    let mut engine = engine(true);
    engine.apply_to_all(&mut scene.host, &mut cache).expect("apply");
    let before = scene.host.stats();

    assert_eq!(engine.refresh_materials_if_needed(&mut scene.host, &mut cache), 0);
    assert_eq!(scene.host.stats().material_assignments, before.material_assignments);
}

#[test]
fn refresh_reassigns_only_broken_renderers() {
    let mut scene = scene();
    let mut cache = cache_for(Some(ARCHIVE));
    let mut engine = engine(true);
    engine.apply_to_all(&mut scene.host, &mut cache).expect("apply");
    let custom_materials = scene.host.renderer_materials(scene.near_sign).expect("materials");

    let broken = scene.host.add_material("sign_paint", BROKEN);
    scene.host.set_renderer_materials(scene.far_sign, &[broken]).expect("break");

    assert_eq!(engine.refresh_materials_if_needed(&mut scene.host, &mut cache), 1);
    assert_eq!(scene.host.renderer_materials(scene.far_sign), Some(custom_materials.clone()));
    assert_eq!(scene.host.renderer_materials(scene.near_sign), Some(custom_materials));
}

#[test]
fn refresh_recovers_after_host_reclaims_the_archive() {
    let mut scene = scene();
    let mut cache = cache_for(Some(ARCHIVE));
    let mut engine = engine(true);
    engine.apply_to_all(&mut scene.host, &mut cache).expect("apply");
    let stale = scene.host.renderer_materials(scene.near_sign).expect("materials");

    let container = cache.loader_mut().open(&mut scene.host, Path::new(ARCHIVE)).expect("open");
    scene.host.unload_container(container);
    assert!(!scene.host.is_live(stale[0].into()));

    assert_eq!(engine.refresh_materials_if_needed(&mut scene.host, &mut cache), 2);
    let fresh = scene.host.renderer_materials(scene.near_sign).expect("materials");
    assert_ne!(fresh, stale);
    assert!(scene.host.is_live(fresh[0].into()));
    assert_eq!(scene.host.material_name(fresh[0]).as_deref(), Some("sign_paint"));
}

#[test]
fn gated_policy_leaves_materials_alone() {
    let mut scene = scene();
    let mut cache = cache_for(Some(ARCHIVE));
    let mut engine = engine(false);
    engine.apply_to_all(&mut scene.host, &mut cache).expect("apply");

    assert_ne!(scene.host.renderer_mesh(scene.near_sign), Some(scene.original_mesh));
    assert_eq!(scene.host.renderer_materials(scene.near_sign), Some(scene.original_materials.clone()));
    assert_eq!(scene.host.stats().material_assignments, 0);
}

#[test]
fn missing_model_is_reported_not_raised() {
    let mut scene = scene();
    let mut engine = engine(true);

    let mut unconfigured = cache_for(None);
    assert_eq!(engine.apply_to_all(&mut scene.host, &mut unconfigured), Err(ReplacerError::NoCustomModel));

    let mut broken = cache_for(Some("mods/not_there"));
    let summary = engine.apply_to_all(&mut scene.host, &mut broken).expect("first attempt runs");
    assert_eq!(summary.modified, 0);
    assert_eq!(summary.failed, 2);
    assert!(!broken.is_available());
    assert_eq!(engine.apply_to_all(&mut scene.host, &mut broken), Err(ReplacerError::NoCustomModel));
    assert_eq!(scene.host.stats().mesh_assignments, 0);
}

#[test]
fn trigger_without_signs_counts_as_failed() {
    let mut scene = scene();
    let lonely = scene.host.spawn("JunctionSwitch", None, Vec3::new(-50.0, 0.0, 0.0));
    scene.host.mark_switch_trigger(lonely).expect("trigger");
    let mut cache = cache_for(Some(ARCHIVE));
    let mut engine = engine(true);

    let summary = engine.apply_to_all(&mut scene.host, &mut cache).expect("apply");
    assert_eq!(summary.triggers, 3);
    assert_eq!(summary.modified, 2);
    assert_eq!(summary.failed, 1);
    assert!(!engine.processed().contains(&lonely));
}

#[test]
fn destroyed_instances_are_evicted() {
    let mut scene = scene();
    let mut cache = cache_for(Some(ARCHIVE));
    let mut engine = engine(true);
    assert!(engine.apply_to_instance(&mut scene.host, &mut cache, scene.near_trigger));
    assert!(engine.processed().contains(&scene.near_trigger));

    scene.host.destroy_immediate(scene.near_trigger);
    assert!(!engine.apply_to_instance(&mut scene.host, &mut cache, scene.near_trigger));
    assert!(!engine.processed().contains(&scene.near_trigger));

    assert_eq!(engine.restore_all(&mut scene.host, &mut cache), 0);
    assert_eq!(engine.snapshot_count(), 0);
    assert_eq!(scene.host.renderer_mesh(scene.far_sign), Some(scene.original_mesh));
}

#[test]
fn restore_drops_snapshots_of_renderers_that_were_removed() {
    let mut scene = scene();
    let mut cache = cache_for(Some(ARCHIVE));
    let mut engine = engine(true);
    engine.apply_to_all(&mut scene.host, &mut cache).expect("apply");
    assert_eq!(engine.snapshot_count(), 2);

    scene.host.remove_renderer(scene.near_sign).expect("remove renderer");
    assert_eq!(engine.restore_all(&mut scene.host, &mut cache), 1);
    assert!(engine.snapshot(scene.near_sign).is_none());
    assert_eq!(engine.snapshot_count(), 0);
    assert_eq!(scene.host.renderer_mesh(scene.far_sign), Some(scene.original_mesh));

    let assignments = scene.host.stats().mesh_assignments;
    assert_eq!(engine.restore_all(&mut scene.host, &mut cache), 0);
    assert_eq!(scene.host.stats().mesh_assignments, assignments);
}

#[test]
fn structure_dump_handles_deep_and_wide_hierarchies() {
    let mut scene = scene();
    let clutter = |host: &mut MemoryHost, trigger: ObjectId, at: Vec3| -> ObjectId {
        for i in 0..12 {
            host.spawn(format!("Bolt_{i}"), Some(trigger), at);
        }
        let mut parent = trigger;
        for depth in 0..5 {
            parent = host.spawn(format!("Mount_{depth}"), Some(parent), at);
        }
        parent
    };
    clutter(&mut scene.host, scene.near_trigger, Vec3::ZERO);
    let mut extra_signs = Vec::new();
    for at in [Vec3::new(-100.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 100.0)] {
        let trigger = scene.host.spawn("JunctionSwitch", None, at);
        scene.host.mark_switch_trigger(trigger).expect("trigger");
        let deepest = clutter(&mut scene.host, trigger, at);
        let sign = scene.host.spawn("switch_sign", Some(deepest), at + Vec3::Y);
        scene
            .host
            .add_renderer(sign, Some(scene.original_mesh), scene.original_materials.clone())
            .expect("renderer");
        extra_signs.push(sign);
    }

    let mut cache = cache_for(Some(ARCHIVE));
    let mut engine = engine(true).with_debug_structure_dump(true);
    let summary = engine.apply_to_all(&mut scene.host, &mut cache).expect("apply");
    assert_eq!(summary.triggers, 4);
    assert_eq!(summary.renderers_found, 4);
    assert_eq!(summary.modified, 4);
    assert_eq!(summary.failed, 0);
    for sign in extra_signs.into_iter().chain([scene.near_sign, scene.far_sign]) {
        assert_ne!(scene.host.renderer_mesh(sign), Some(scene.original_mesh));
    }
}
