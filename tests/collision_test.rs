use flow_placer::{
    collision::{
        CollisionFactory, CollisionFlags, CollisionKind, CollisionOverride, CollisionShape,
        ConvexMode, StaticBodyFactory, resolve_kind,
    },
    data_structures::{aabb::Aabb, instance::Instance, scene_graph::NodeKind},
    resources::mesh::MeshLibrary,
    settings::EditorSettings,
};

use crate::common::test_utils::vec3;

mod common;

#[test]
fn should_prefer_the_instance_override_over_global_flags() {
    let flags = CollisionFlags::from_settings(&EditorSettings {
        collision_convex: true,
        convex_clean: true,
        ..Default::default()
    });
    assert_eq!(
        resolve_kind(&CollisionOverride::default(), &flags),
        CollisionKind {
            shape: CollisionShape::Convex,
            convex: Some(ConvexMode::Clean),
        }
    );

    let sphere = CollisionOverride {
        shape: Some(CollisionShape::Sphere),
        convex: None,
    };
    assert_eq!(
        resolve_kind(&sphere, &flags),
        CollisionKind {
            shape: CollisionShape::Sphere,
            convex: None,
        }
    );

    let simplified = CollisionOverride {
        shape: Some(CollisionShape::Convex),
        convex: Some(ConvexMode::CleanAndSimplify),
    };
    assert_eq!(
        resolve_kind(&simplified, &CollisionFlags::default()).convex,
        Some(ConvexMode::CleanAndSimplify)
    );
}

#[test]
fn should_resolve_global_flags_in_precedence_order() {
    let both = CollisionFlags {
        concave: true,
        sphere: true,
        boxed: true,
        convex_clean: true,
        convex_simplify: true,
        ..Default::default()
    };
    assert_eq!(resolve_kind(&CollisionOverride::default(), &both).shape, CollisionShape::Concave);
    assert_eq!(resolve_kind(&CollisionOverride::default(), &both).convex, None);

    let convex = CollisionFlags {
        convex: true,
        ..both
    };
    assert_eq!(
        resolve_kind(&CollisionOverride::default(), &convex).convex,
        Some(ConvexMode::CleanAndSimplify)
    );
    assert_eq!(
        resolve_kind(&CollisionOverride::default(), &CollisionFlags::default()).shape,
        CollisionShape::Box
    );
}

#[test]
fn should_size_static_bodies_from_mesh_bounds() {
    let mut meshes = MeshLibrary::new();
    let mesh = meshes.insert("crate", Aabb::centered(vec3(2.0, 4.0, 1.0)));
    let transform = Instance::from(vec3(3.0, 0.0, 0.0));
    let factory = StaticBodyFactory;

    let sphere = factory
        .build(
            mesh,
            &Aabb::centered(vec3(2.0, 4.0, 1.0)),
            &transform,
            CollisionKind {
                shape: CollisionShape::Sphere,
                convex: None,
            },
        )
        .expect("bounded meshes get bodies");
    assert_eq!(sphere.local, transform);
    let NodeKind::CollisionBody { extents, mesh: body_mesh, .. } = sphere.kind else {
        panic!("factory builds collision bodies");
    };
    assert_eq!(extents, vec3(2.0, 2.0, 2.0));
    assert_eq!(body_mesh, Some(mesh));

    let unbounded = factory.build(
        mesh,
        &Aabb::empty(),
        &transform,
        CollisionKind {
            shape: CollisionShape::Box,
            convex: None,
        },
    );
    assert!(unbounded.is_err());
}
