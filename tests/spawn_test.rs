use flow_placer::{
    collision::{CollisionFactory, CollisionKind, CollisionOverride, CollisionShape},
    data_structures::{
        aabb::Aabb,
        instance::{Instance, InstanceOptions, Transform},
        scene_graph::{Node, NodeKind},
    },
    placement::spawn::{Placement, SpawnRequest},
    resources::mesh::MeshId,
    session::EditingSession,
    settings::EditorSettings,
};

use crate::common::test_utils::{
    assert_close, at, crate_template, group_template, init_logger, optimized_settings,
    session_with, vec3,
};

mod common;

struct FailingFactory;

impl CollisionFactory for FailingFactory {
    fn build(
        &self,
        _: MeshId,
        _: &Aabb,
        _: &Instance,
        kind: CollisionKind,
    ) -> anyhow::Result<Node> {
        anyhow::bail!("no {:?} bodies available", kind.shape)
    }
}

#[test]
fn should_place_a_node_in_simple_mode() {
    let (mut session, root) = session_with(EditorSettings::default());
    let (_, template) = crate_template(&mut session, 2.0);

    let placement = session.spawn(&SpawnRequest::new(template, at(3.0, 0.0, 3.0)));
    let Some(Placement::Node { node, collisions }) = placement else {
        panic!("expected a node placement, got {:?}", placement);
    };
    assert!(collisions.is_empty());
    let placed = session.scene().node(node).expect("placed node is alive");
    assert_eq!(placed.parent(), Some(root));
    assert_eq!(placed.owner(), Some(root));
    assert_eq!(placed.local.position, vec3(3.0, 0.0, 3.0));
    assert!(session.waypoints().has(node));
    assert_eq!(session.selection().focused(), Some(node));
    assert_eq!(session.spawner().placed(), 1);
    // the template itself stays floating
    assert_eq!(session.scene().node(template).and_then(Node::parent), None);
}

#[test]
fn should_snap_the_second_placement_against_the_first() {
    let (mut session, _) = session_with(EditorSettings::default());
    let (_, template) = crate_template(&mut session, 2.0);

    session.spawn(&SpawnRequest::new(template, at(0.0, 0.0, 0.0)));
    let second = session
        .spawn(&SpawnRequest::new(template, at(1.5, 0.0, 0.0)))
        .and_then(|p| p.node())
        .expect("second placement succeeds");
    let position = session.scene().node(second).map(|n| n.local.position);
    assert_eq!(position, Some(vec3(2.0, 0.0, 0.0)));

    let unsnapped = session
        .spawn(&SpawnRequest::new(template, at(1.5, 0.0, 0.0)).without_snap())
        .and_then(|p| p.node())
        .expect("third placement succeeds");
    let position = session.scene().node(unsnapped).map(|n| n.local.position);
    assert_eq!(position, Some(vec3(1.5, 0.0, 0.0)));
}

#[test]
fn should_round_to_the_grid_when_enabled() {
    let (mut session, _) = session_with(EditorSettings {
        grid_snap: true,
        ..Default::default()
    });
    let (_, template) = crate_template(&mut session, 2.0);
    let node = session
        .spawn(&SpawnRequest::new(template, at(1.4, 0.5, 2.6)))
        .and_then(|p| p.node())
        .expect("placement succeeds");
    let position = session.scene().node(node).map(|n| n.local.position).expect("alive");
    assert_close(position, vec3(1.0, 0.5, 3.0));
}

#[test]
fn should_keep_unpushed_placements_under_the_plugin_root() {
    let (mut session, root) = session_with(EditorSettings {
        push_to_scene: false,
        ..Default::default()
    });
    let (_, template) = crate_template(&mut session, 2.0);
    let node = session
        .spawn(&SpawnRequest::new(template, at(0.0, 0.0, 0.0)))
        .and_then(|p| p.node())
        .expect("placement succeeds");
    let placed = session.scene().node(node).expect("alive");
    assert_eq!(placed.parent(), Some(session.plugin_root()));
    assert_eq!(placed.owner(), None);
    assert!(session.scene().children(root).is_empty());
}

#[test]
fn should_refuse_to_place_without_an_edited_scene() {
    init_logger();
    let mut session = EditingSession::new(EditorSettings::default());
    let (_, template) = crate_template(&mut session, 2.0);
    let nodes = session.scene().len();

    assert_eq!(session.spawn(&SpawnRequest::new(template, at(0.0, 0.0, 0.0))), None);
    assert_eq!(session.scene().len(), nodes);
    assert_eq!(session.spawner().placed(), 0);
}

#[test]
fn should_refuse_a_freed_source() {
    let (mut session, root) = session_with(EditorSettings::default());
    let (_, template) = crate_template(&mut session, 2.0);
    session.scene_mut().free(template);

    assert_eq!(session.spawn(&SpawnRequest::new(template, at(0.0, 0.0, 0.0))), None);
    assert!(session.scene().children(root).is_empty());
}

#[test]
fn should_accumulate_optimized_placements_in_one_buffer() {
    let (mut session, root) = session_with(optimized_settings());
    let (mesh, template) = crate_template(&mut session, 2.0);

    for (i, x) in [0.0, 5.0, 10.0].into_iter().enumerate() {
        let placement = session.spawn(&SpawnRequest::new(template, at(x, 0.0, 0.0)));
        assert_eq!(
            placement,
            Some(Placement::Instance {
                mesh,
                slot: i,
                collision: None
            })
        );
    }

    assert_eq!(session.instances().len(), 1);
    let buffer = session.instances().buffer(mesh).expect("buffer exists");
    assert_eq!(buffer.live_count(), 3);
    assert_eq!(buffer.raw().len(), 3);
    assert_eq!(session.scene().count_models(root, mesh), 0);
    assert_eq!(session.waypoints().len(), 3);
    assert!((0..3).all(|slot| session.waypoints().has_slot(mesh, slot)));
}

#[test]
fn should_build_one_body_per_optimized_instance() {
    let (mut session, root) = session_with(EditorSettings {
        add_collisions: true,
        ..optimized_settings()
    });
    let (mesh, template) = crate_template(&mut session, 2.0);
    if let Some(node) = session.scene_mut().node_mut(template) {
        node.options = InstanceOptions {
            collision: CollisionOverride {
                shape: Some(CollisionShape::Sphere),
                convex: None,
            },
            ..Default::default()
        };
    }

    session.spawn(&SpawnRequest::new(template, at(0.0, 0.0, 0.0)));
    session.spawn(&SpawnRequest::new(template, at(4.0, 0.0, 0.0)));

    let bodies = session.instances().collision_nodes();
    assert_eq!(bodies.len(), 2);
    for body in &bodies {
        let node = session.scene().node(*body).expect("body is alive");
        assert_eq!(node.parent(), Some(root));
        assert!(matches!(
            node.kind,
            NodeKind::CollisionBody {
                shape: CollisionShape::Sphere,
                ..
            }
        ));
    }
    assert_eq!(session.scene().count_models(root, mesh), 0);

    assert!(session.erase_instance(mesh, 0));
    assert!(!session.scene().contains(bodies[0]));
    assert!(session.scene().contains(bodies[1]));
    assert_eq!(session.instances().collision_nodes().len(), 1);
    assert_eq!(session.instances().buffer(mesh).map(|b| b.live_count()), Some(1));
    assert!(!session.erase_instance(mesh, 0));
}

#[test]
fn should_attach_simple_mode_bodies_to_the_model() {
    let (mut session, _) = session_with(EditorSettings {
        add_collisions: true,
        ..Default::default()
    });
    let (_, template) = crate_template(&mut session, 2.0);
    let Some(Placement::Node { node, collisions }) =
        session.spawn(&SpawnRequest::new(template, at(0.0, 0.0, 0.0)))
    else {
        panic!("expected a node placement");
    };
    assert_eq!(collisions.len(), 1);
    let body = session.scene().node(collisions[0]).expect("body is alive");
    assert_eq!(body.parent(), Some(node));
    assert!(matches!(
        body.kind,
        NodeKind::CollisionBody {
            shape: CollisionShape::Box,
            convex: None,
            ..
        }
    ));
}

#[test]
fn should_roll_back_failed_placements() {
    init_logger();
    for settings in [
        EditorSettings {
            add_collisions: true,
            ..Default::default()
        },
        EditorSettings {
            add_collisions: true,
            ..optimized_settings()
        },
    ] {
        let mut session = EditingSession::with_collision_factory(settings, Box::new(FailingFactory));
        let root = session.open_scene("Level");
        let (_, template) = crate_template(&mut session, 2.0);
        let nodes = session.scene().len();

        assert_eq!(session.spawn(&SpawnRequest::new(template, at(0.0, 0.0, 0.0))), None);
        assert_eq!(session.scene().len(), nodes);
        assert!(session.scene().children(root).is_empty());
        assert!(session.instances().is_empty());
        assert_eq!(session.waypoints().len(), 0);
        assert_eq!(session.selection().focused(), None);
    }
}

#[test]
fn should_not_focus_multi_drop_placements() {
    let (mut session, _) = session_with(EditorSettings::default());
    let (_, template) = crate_template(&mut session, 2.0);
    let placement = session.spawn(&SpawnRequest::new(template, at(0.0, 0.0, 0.0)).multi_drop());
    assert!(placement.is_some());
    assert_eq!(session.selection().focused(), None);
}

#[test]
fn should_spread_optimized_groups_over_instance_buffers() {
    let (mut session, root) = session_with(optimized_settings());
    let (mesh, _) = crate_template(&mut session, 2.0);
    let group = group_template(&mut session, mesh, &[vec3(-1.0, 0.0, 0.0)]);

    // a second member wrapped in a collision body
    let mesh_data = session.meshes().get(mesh).cloned().expect("registered");
    let scene = session.scene_mut();
    let body = scene.insert(
        Node::new(
            "Body",
            NodeKind::CollisionBody {
                shape: CollisionShape::Box,
                convex: None,
                mesh: Some(mesh),
                extents: vec3(1.0, 1.0, 1.0),
            },
        )
        .with_local(Instance::from(vec3(3.0, 0.0, 0.0))),
    );
    let inner = scene.insert(Node::model("Post", mesh, &mesh_data));
    scene.add_child(body, inner).expect("fresh nodes attach");
    scene.add_child(group, body).expect("fresh nodes attach");

    let Some(Placement::Group { proxy, members }) =
        session.spawn(&SpawnRequest::new(group, at(10.0, 0.0, 0.0)))
    else {
        panic!("expected a group placement");
    };
    assert_eq!(members.len(), 2);
    let positions: Vec<_> = members
        .iter()
        .map(|m| {
            session
                .instances()
                .buffer(m.mesh)
                .and_then(|b| b.slot(m.slot))
                .map(|s| s.transform.position)
                .expect("member slot is live")
        })
        .collect();
    assert_eq!(positions, vec![vec3(9.0, 0.0, 0.0), vec3(13.0, 0.0, 0.0)]);
    assert_eq!(session.scene().node(proxy).and_then(Node::parent), Some(root));
    assert!(matches!(
        session.scene().node(proxy).map(|n| &n.kind),
        Some(NodeKind::GroupProxy { .. })
    ));
    assert!(session.waypoints().has(proxy));
    assert!(session.instances().connection(proxy).is_some());
    assert_eq!(session.scene().count_models(root, mesh), 0);
    assert_eq!(session.selection().focused(), Some(proxy));

    assert!(session.move_group(proxy, at(20.0, 0.0, 0.0)));
    let buffer = session.instances().buffer(mesh).expect("buffer exists");
    assert_eq!(buffer.slot(members[0].slot).map(|s| s.transform.position), Some(vec3(19.0, 0.0, 0.0)));
    assert_eq!(buffer.slot(members[1].slot).map(|s| s.transform.position), Some(vec3(23.0, 0.0, 0.0)));
    assert_eq!(
        session.waypoints().iter().find(|w| w.node() == Some(proxy)).map(|w| w.origin),
        Some(vec3(20.0, 0.0, 0.0))
    );

    assert!(session.erase(proxy));
    assert!(session.instances().is_empty());
    assert!(session.instances().connection(proxy).is_none());
    assert!(!session.scene().contains(proxy));
    assert_eq!(session.selection().focused(), None);
}

#[test]
fn should_snap_against_optimized_placements() {
    let (mut session, _) = session_with(optimized_settings());
    let (mesh, template) = crate_template(&mut session, 2.0);
    let slot_position = |session: &EditingSession, slot: usize| {
        session
            .instances()
            .buffer(mesh)
            .and_then(|b| b.slot(slot))
            .map(|s| s.transform.position)
    };

    session.spawn(&SpawnRequest::new(template, at(0.0, 0.0, 0.0)));
    let Some(Placement::Instance { slot, .. }) =
        session.spawn(&SpawnRequest::new(template, at(1.5, 0.0, 0.0)))
    else {
        panic!("expected an instance placement");
    };
    assert_eq!(slot_position(&session, slot), Some(vec3(2.0, 0.0, 0.0)));
    assert!(session.waypoints().has_slot(mesh, slot));
    assert!(session.waypoints().iter().all(|w| w.node().is_none() && w.is_model()));

    assert!(session.erase_instance(mesh, 0));
    assert!(session.erase_instance(mesh, slot));
    assert_eq!(session.waypoints().len(), 0);

    let Some(Placement::Instance { slot, .. }) =
        session.spawn(&SpawnRequest::new(template, at(1.5, 0.0, 0.0)))
    else {
        panic!("expected an instance placement");
    };
    assert_eq!(slot_position(&session, slot), Some(vec3(1.5, 0.0, 0.0)));
}

#[test]
fn should_only_snap_instanced_placements_on_the_same_layer() {
    let (mut session, _) = session_with(optimized_settings());
    let (mesh, template) = crate_template(&mut session, 2.0);
    if let Some(node) = session.scene_mut().node_mut(template) {
        node.options = InstanceOptions::on_layer(2);
    }
    session.spawn(&SpawnRequest::new(template, at(0.0, 0.0, 0.0)));
    assert_eq!(session.waypoints().iter().map(|w| w.layer).collect::<Vec<_>>(), vec![2]);

    let mesh_data = session.meshes().get(mesh).cloned().expect("mesh is registered");
    let ground = session.scene_mut().insert(Node::model("Tile", mesh, &mesh_data));
    let Some(Placement::Instance { slot, .. }) =
        session.spawn(&SpawnRequest::new(ground, at(1.5, 0.0, 0.0)))
    else {
        panic!("expected an instance placement");
    };
    let position = session
        .instances()
        .buffer(mesh)
        .and_then(|b| b.slot(slot))
        .map(|s| s.transform.position);
    assert_eq!(position, Some(vec3(1.5, 0.0, 0.0)));
}

#[test]
fn should_leave_unrelated_instances_alone_when_erasing_an_emptied_group() {
    let (mut session, _) = session_with(EditorSettings {
        snap_enabled: false,
        ..optimized_settings()
    });
    let (mesh, template) = crate_template(&mut session, 2.0);
    let group = group_template(&mut session, mesh, &[vec3(-1.0, 0.0, 0.0), vec3(3.0, 0.0, 0.0)]);
    let Some(Placement::Group { proxy, members }) =
        session.spawn(&SpawnRequest::new(group, at(10.0, 0.0, 0.0)))
    else {
        panic!("expected a group placement");
    };
    for member in &members {
        assert!(session.erase_instance(member.mesh, member.slot));
    }
    assert!(session.instances().buffer(mesh).is_none());
    assert!(session.instances().connection(proxy).is_none());

    let Some(Placement::Instance { slot, .. }) =
        session.spawn(&SpawnRequest::new(template, at(0.0, 0.0, 0.0)))
    else {
        panic!("expected an instance placement");
    };
    assert!(members.iter().all(|m| m.slot != slot));

    assert!(!session.move_group(proxy, at(20.0, 0.0, 0.0)));
    assert!(session.erase(proxy));
    let position = session
        .instances()
        .buffer(mesh)
        .and_then(|b| b.slot(slot))
        .map(|s| s.transform.position);
    assert_eq!(position, Some(vec3(0.0, 0.0, 0.0)));
    assert!(session.waypoints().has_slot(mesh, slot));
}

#[test]
fn should_move_only_the_group_entry_when_moving_a_group() {
    let (mut session, _) = session_with(EditorSettings {
        snap_enabled: false,
        ..optimized_settings()
    });
    let (mesh, template) = crate_template(&mut session, 2.0);
    let group = group_template(&mut session, mesh, &[vec3(-1.0, 0.0, 0.0), vec3(3.0, 0.0, 0.0)]);
    session.spawn(&SpawnRequest::new(template, at(20.0, 0.0, 0.0)));
    let proxy = session
        .spawn(&SpawnRequest::new(group, at(0.0, 0.0, 0.0)))
        .and_then(|p| p.node())
        .expect("group placement succeeds");

    let target = Transform {
        scale: vec3(2.0, 1.0, 2.0),
        ..at(20.0, 0.0, 0.0)
    };
    assert!(session.move_group(proxy, target));

    let scales: Vec<_> = session
        .waypoints()
        .iter()
        .map(|w| (w.node() == Some(proxy), w.scale))
        .collect();
    assert_eq!(
        scales,
        vec![(false, vec3(1.0, 1.0, 1.0)), (true, vec3(2.0, 1.0, 2.0))]
    );
}

#[test]
fn should_erase_placed_nodes_and_their_waypoints() {
    let (mut session, root) = session_with(EditorSettings::default());
    let (_, template) = crate_template(&mut session, 2.0);
    let node = session
        .spawn(&SpawnRequest::new(template, at(0.0, 0.0, 0.0)))
        .and_then(|p| p.node())
        .expect("placement succeeds");

    assert!(session.erase(node));
    assert!(!session.waypoints().has(node));
    assert!(!session.scene().contains(node));
    assert!(session.scene().children(root).is_empty());
    assert!(!session.erase(node));
}

#[test]
fn should_clear_everything_on_teardown() {
    let (mut session, _) = session_with(EditorSettings {
        push_to_scene: false,
        add_collisions: true,
        ..Default::default()
    });
    let (mesh, template) = crate_template(&mut session, 2.0);
    session.spawn(&SpawnRequest::new(template, at(0.0, 0.0, 0.0)));
    session.settings_mut().optimized_placement = true;
    session.spawn(&SpawnRequest::new(template, at(5.0, 0.0, 0.0)));
    assert!(session.instances().buffer(mesh).is_some());

    session.teardown();

    assert!(session.instances().is_empty());
    assert!(session.instances().collision_nodes().is_empty());
    assert_eq!(session.waypoints().len(), 0);
    assert!(session.scene().children(session.plugin_root()).is_empty());
    assert!(session.scene().contains(template));
}

#[test]
fn should_free_pushed_group_proxies_on_teardown() {
    let (mut session, root) = session_with(optimized_settings());
    let (mesh, template) = crate_template(&mut session, 2.0);
    let group = group_template(&mut session, mesh, &[vec3(-1.0, 0.0, 0.0), vec3(3.0, 0.0, 0.0)]);
    let proxy = session
        .spawn(&SpawnRequest::new(group, at(0.0, 0.0, 0.0)))
        .and_then(|p| p.node())
        .expect("group placement succeeds");
    session.settings_mut().optimized_placement = false;
    let kept = session
        .spawn(&SpawnRequest::new(template, at(10.0, 0.0, 10.0)))
        .and_then(|p| p.node())
        .expect("simple placement succeeds");
    assert_eq!(session.scene().children(root).len(), 2);

    session.teardown();

    assert!(!session.scene().contains(proxy));
    assert_eq!(session.scene().children(root), &[kept]);
    assert!(session.scene().contains(group));
}
