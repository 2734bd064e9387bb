//! Collision shape selection and the collision body factory seam.
//!
//! The placement core only decides *which* body to build. Construction is left to
//! a [`CollisionFactory`], which hands back a ready-to-insert [`Node`].
//!
//! Shape precedence: a per-instance [`CollisionOverride`] wins over the global
//! flags. Among the global flags the order is convex, concave, sphere, box. The
//! convex sub-mode (clean/simplify) resolves the same way, with "both enabled"
//! as its own mode.

use anyhow::bail;
use log::debug;

use crate::{
    data_structures::{
        aabb::Aabb,
        instance::{Instance, InstanceOptions},
        scene_graph::{Node, NodeId, NodeKind, SceneGraph},
    },
    resources::mesh::MeshId,
    settings::{SettingsProvider, flag, keys},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CollisionShape {
    Convex,
    Concave,
    Sphere,
    Box,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConvexMode {
    Plain,
    Clean,
    Simplify,
    CleanAndSimplify,
}

/// Per-instance collision override. Unset fields defer to the global flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollisionOverride {
    pub shape: Option<CollisionShape>,
    pub convex: Option<ConvexMode>,
}

/// Snapshot of the global collision-type flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollisionFlags {
    pub convex: bool,
    pub concave: bool,
    pub sphere: bool,
    pub boxed: bool,
    pub convex_clean: bool,
    pub convex_simplify: bool,
}

impl CollisionFlags {
    pub fn from_settings(settings: &dyn SettingsProvider) -> Self {
        Self {
            convex: flag(settings, keys::COLLISION_CONVEX),
            concave: flag(settings, keys::COLLISION_CONCAVE),
            sphere: flag(settings, keys::COLLISION_SPHERE),
            boxed: flag(settings, keys::COLLISION_BOX),
            convex_clean: flag(settings, keys::CONVEX_CLEAN),
            convex_simplify: flag(settings, keys::CONVEX_SIMPLIFY),
        }
    }

    fn shape(&self) -> Option<CollisionShape> {
        [
            (self.convex, CollisionShape::Convex),
            (self.concave, CollisionShape::Concave),
            (self.sphere, CollisionShape::Sphere),
            (self.boxed, CollisionShape::Box),
        ]
        .into_iter()
        .find_map(|(enabled, shape)| enabled.then_some(shape))
    }

    fn convex_mode(&self) -> ConvexMode {
        match (self.convex_clean, self.convex_simplify) {
            (true, true) => ConvexMode::CleanAndSimplify,
            (true, false) => ConvexMode::Clean,
            (false, true) => ConvexMode::Simplify,
            (false, false) => ConvexMode::Plain,
        }
    }
}

/// The `(collisionType, collisionSubType)` pair handed to the factory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollisionKind {
    pub shape: CollisionShape,
    /// Only set for convex shapes.
    pub convex: Option<ConvexMode>,
}

/// Resolves the body to build for one instance. Falls back to a box when neither
/// the override nor any global flag names a shape.
pub fn resolve_kind(overrides: &CollisionOverride, flags: &CollisionFlags) -> CollisionKind {
    let shape = overrides
        .shape
        .or_else(|| flags.shape())
        .unwrap_or(CollisionShape::Box);
    let convex = match shape {
        CollisionShape::Convex => Some(overrides.convex.unwrap_or_else(|| flags.convex_mode())),
        _ => None,
    };
    CollisionKind { shape, convex }
}

/// Builds collision nodes for placed geometry.
pub trait CollisionFactory {
    fn build(
        &self,
        mesh: MeshId,
        bounds: &Aabb,
        transform: &Instance,
        kind: CollisionKind,
    ) -> anyhow::Result<Node>;
}

/// Default factory producing a static body sized from the mesh bounds.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticBodyFactory;

impl CollisionFactory for StaticBodyFactory {
    fn build(
        &self,
        mesh: MeshId,
        bounds: &Aabb,
        transform: &Instance,
        kind: CollisionKind,
    ) -> anyhow::Result<Node> {
        if bounds.is_empty() {
            bail!("cannot build a {:?} body for a mesh without bounds", kind.shape);
        }
        let half = bounds.half_extents();
        let extents = match kind.shape {
            CollisionShape::Sphere => {
                let radius = half.x.max(half.y).max(half.z);
                cgmath::Vector3::new(radius, radius, radius)
            }
            _ => half,
        };
        Ok(Node::new(
            format!("StaticBody_{:?}", kind.shape),
            NodeKind::CollisionBody {
                shape: kind.shape,
                convex: kind.convex,
                mesh: Some(mesh),
                extents,
            },
        )
        .with_local(*transform))
    }
}

/// One collision body to build next to an instance buffer slot.
#[derive(Clone, Copy, Debug)]
pub struct CollisionRequest {
    pub mesh: MeshId,
    pub bounds: Aabb,
    pub transform: Instance,
    pub options: InstanceOptions,
}

/// Multi-instance collision builder: one static body per request, attached under
/// `parent`. Stops at the first failure; bodies built before it are returned to
/// the caller through `built` so they can be freed.
pub fn build_static_bodies(
    factory: &dyn CollisionFactory,
    scene: &mut SceneGraph,
    parent: NodeId,
    owner: Option<NodeId>,
    flags: &CollisionFlags,
    requests: &[CollisionRequest],
    built: &mut Vec<NodeId>,
) -> anyhow::Result<()> {
    for request in requests {
        let kind = resolve_kind(&request.options.collision, flags);
        let node = factory.build(request.mesh, &request.bounds, &request.transform, kind)?;
        let id = scene.insert(node);
        built.push(id);
        scene.add_child(parent, id)?;
        scene.set_owner(id, owner);
        debug!("built {:?} collision body {:?}", kind, id);
    }
    Ok(())
}
