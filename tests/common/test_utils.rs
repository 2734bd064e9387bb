use flow_placer::{
    Vector3,
    data_structures::{
        aabb::Aabb,
        instance::{Instance, InstanceOptions, Transform},
        scene_graph::{Node, NodeId, SceneGraph},
    },
    resources::mesh::{MeshId, MeshLibrary},
    session::EditingSession,
    settings::EditorSettings,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn vec3(x: f32, y: f32, z: f32) -> Vector3<f32> {
    Vector3::new(x, y, z)
}

pub fn cube(size: f32) -> Aabb {
    Aabb::centered(vec3(size, size, size))
}

/// A session with an open scene. Returns the session and the edited root.
pub fn session_with(settings: EditorSettings) -> (EditingSession, NodeId) {
    init_logger();
    let mut session = EditingSession::new(settings);
    let root = session.open_scene("Level");
    (session, root)
}

pub fn optimized_settings() -> EditorSettings {
    EditorSettings {
        optimized_placement: true,
        ..Default::default()
    }
}

/// Registers a cube mesh and a floating model template using it.
pub fn crate_template(session: &mut EditingSession, size: f32) -> (MeshId, NodeId) {
    let mesh_id = session.meshes_mut().insert("crate", cube(size));
    let mesh = session
        .meshes()
        .get(mesh_id)
        .cloned()
        .expect("mesh was just inserted");
    let node = session
        .scene_mut()
        .insert(Node::model("Crate", mesh_id, &mesh));
    (mesh_id, node)
}

/// A floating group template with one child model per local offset.
pub fn group_template(
    session: &mut EditingSession,
    mesh_id: MeshId,
    offsets: &[Vector3<f32>],
) -> NodeId {
    let mesh = session
        .meshes()
        .get(mesh_id)
        .cloned()
        .expect("mesh is registered");
    let scene = session.scene_mut();
    let group = scene.insert(Node::group("Fence"));
    for (i, offset) in offsets.iter().enumerate() {
        let child = scene.insert(
            Node::model(format!("Post{}", i), mesh_id, &mesh).with_local(Instance::from(*offset)),
        );
        scene.add_child(group, child).expect("fresh nodes attach");
    }
    group
}

/// A bare scene with a root and one placed cube model per position, all on `layer`.
pub fn scene_with_cubes(
    positions: &[Vector3<f32>],
    size: f32,
    layer: i32,
) -> (SceneGraph, MeshId, Vec<NodeId>) {
    init_logger();
    let mut meshes = MeshLibrary::new();
    let mesh_id = meshes.insert("cube", cube(size));
    let mesh = meshes.get(mesh_id).cloned().expect("mesh was just inserted");
    let mut scene = SceneGraph::new();
    let root = scene.insert(Node::group("Level"));
    scene.set_edited_root(root);
    let nodes = positions
        .iter()
        .map(|p| {
            let node = scene.insert(
                Node::model("Cube", mesh_id, &mesh)
                    .with_local(Instance::from(*p))
                    .with_options(InstanceOptions::on_layer(layer)),
            );
            scene.add_child(root, node).expect("fresh nodes attach");
            node
        })
        .collect();
    (scene, mesh_id, nodes)
}

pub fn at(x: f32, y: f32, z: f32) -> Transform {
    Transform::at(vec3(x, y, z))
}

pub fn assert_close(actual: Vector3<f32>, expected: Vector3<f32>) {
    let eps = 1e-5;
    assert!(
        (actual.x - expected.x).abs() < eps
            && (actual.y - expected.y).abs() < eps
            && (actual.z - expected.z).abs() < eps,
        "expected {:?}, got {:?}",
        expected,
        actual
    );
}
