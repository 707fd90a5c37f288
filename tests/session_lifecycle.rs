use glam::{Vec2, Vec3};
use std::path::Path;
use switch_sign_replacer::bundle::{AssetBundle, BundleEntry, MaterialData};
use switch_sign_replacer::host::{MaterialSet, MeshHandle, SceneGraph};
use switch_sign_replacer::{MaterialPolicy, MemoryHost, ObjectId, ReplacerConfig, ReplacerSession, TriangleMesh};
use tempfile::tempdir;

struct Junction {
    trigger: ObjectId,
    sign: ObjectId,
    mesh: MeshHandle,
    materials: MaterialSet,
}

fn write_archive(dir: &Path) {
    let mut bundle = AssetBundle::new();
    bundle.insert("assets/switch_sign.obj", BundleEntry::Text("v 0 0 0\nv 0 2 0\nv 0.5 2 0\nf 1 2 3\n".to_string()));
    bundle.insert(
        "sign_paint",
        BundleEntry::Material(MaterialData {
            name: "sign_paint".to_string(),
            shader: "Standard".to_string(),
            main_texture: Some("sign_paint_albedo".to_string()),
        }),
    );
    bundle.save_to_path(dir.join("switch_sign")).expect("save archive");
}

fn junction(host: &mut MemoryHost) -> Junction {
    let mesh = TriangleMesh::new(
        "SwitchSign_LOD0",
        vec![Vec3::ZERO, Vec3::X, Vec3::Y],
        vec![[0, 1, 2]],
        vec![Vec2::ZERO, Vec2::X, Vec2::Y],
    )
    .expect("mesh");
    let mesh = host.add_mesh(mesh, true);
    let materials = vec![host.add_material("SignBoard", "Standard")];
    let trigger = host.spawn("JunctionSwitch", None, Vec3::ZERO);
    host.mark_switch_trigger(trigger).expect("trigger");
    let board = host.spawn("Board", Some(trigger), Vec3::new(0.0, 1.5, 0.5));
    host.add_renderer(board, Some(mesh), materials.clone()).expect("renderer");
    Junction { trigger, sign: board, mesh, materials }
}

fn config_for(dir: &Path) -> ReplacerConfig {
    ReplacerConfig { archive_search_dir: Some(dir.to_path_buf()), ..Default::default() }
}

#[test]
fn session_applies_reloads_and_shuts_down() {
    let dir = tempdir().expect("temp dir");
    write_archive(dir.path());
    let mut host = MemoryHost::new();
    let junction = junction(&mut host);
    let mut session = ReplacerSession::new(config_for(dir.path()));
    assert_eq!(session.cache().archive_path(), Some(dir.path().join("switch_sign").as_path()));

    assert!(session.on_instance_created(&mut host, junction.trigger));
    assert_ne!(host.renderer_mesh(junction.sign), Some(junction.mesh));

    let summary = session.reload(&mut host).expect("reload reapplies");
    assert_eq!(summary.modified, 1);
    assert_eq!(session.engine().snapshot(junction.sign).map(|s| s.mesh), Some(junction.mesh));

    session.shutdown(&mut host);
    assert_eq!(host.renderer_mesh(junction.sign), Some(junction.mesh));
    assert_eq!(host.renderer_materials(junction.sign), Some(junction.materials.clone()));
    assert_eq!(host.open_container_count(), 0);
    assert!(session.engine().processed().is_empty());
}

#[test]
fn apply_all_reprocesses_processed_instances() {
    let dir = tempdir().expect("temp dir");
    write_archive(dir.path());
    let mut host = MemoryHost::new();
    let junction = junction(&mut host);
    let mut session = ReplacerSession::new(config_for(dir.path()));

    assert!(session.on_instance_created(&mut host, junction.trigger));
    let before = host.stats().mesh_assignments;
    let summary = session.apply_all(&mut host).expect("apply all");
    assert_eq!(summary.modified, 1);
    assert_eq!(host.stats().mesh_assignments, before + 1);
    assert_eq!(session.restore_all(&mut host), 1);
}

#[test]
fn gated_materials_follow_the_toggle() {
    let dir = tempdir().expect("temp dir");
    write_archive(dir.path());
    let mut host = MemoryHost::new();
    let junction = junction(&mut host);
    let config = ReplacerConfig { material_policy: MaterialPolicy::WhenEnabled, ..config_for(dir.path()) };
    let mut session = ReplacerSession::new(config);

    session.apply_all(&mut host).expect("apply");
    assert_eq!(host.renderer_materials(junction.sign), Some(junction.materials.clone()));

    session.set_use_custom_materials(true);
    session.apply_all(&mut host).expect("apply");
    let applied = host.renderer_materials(junction.sign).expect("materials");
    assert_ne!(applied, junction.materials);
    assert_eq!(host.material_texture(applied[0]), Some("sign_paint_albedo"));
    assert_eq!(session.refresh_materials(&mut host), 0);
}

#[test]
fn missing_archive_leaves_scene_untouched() {
    let dir = tempdir().expect("temp dir");
    let mut host = MemoryHost::new();
    let junction = junction(&mut host);
    let mut session = ReplacerSession::new(config_for(dir.path()));

    assert!(session.cache().archive_path().is_none());
    assert!(!session.on_instance_created(&mut host, junction.trigger));
    assert!(session.apply_all(&mut host).is_err());
    assert_eq!(host.renderer_mesh(junction.sign), Some(junction.mesh));

    write_archive(dir.path());
    let summary = session.reload(&mut host).expect("archive appeared");
    assert_eq!(summary.modified, 1);
}
