//! Registry of placed objects ("waypoints") used as snap targets.
//!
//! Entries hold a back-reference only: a [`NodeId`] for objects that live in the
//! scene, or a `(mesh, slot)` pair for objects placed into an instance buffer.
//! Whenever the registry is walked, entries whose node has been freed are dropped
//! on the spot, so callers never see stale waypoints and no separate collection
//! pass is needed. Slot entries are dropped when their slot is cleared, see
//! [`WaypointRegistry::remove_slot`] and [`WaypointRegistry::retain_live_slots`].

use cgmath::{InnerSpace, Vector3};
use log::{debug, warn};

use crate::{
    data_structures::{
        aabb::Aabb,
        scene_graph::{NodeId, NodeKind, SceneGraph},
    },
    placement::instancing::InstanceBufferManager,
    resources::mesh::MeshId,
};

/// Two origins closer than this are considered the same placement spot.
const ORIGIN_EPSILON: f32 = 1e-4;

fn same_origin(a: Vector3<f32>, b: Vector3<f32>) -> bool {
    (a - b).magnitude2() <= ORIGIN_EPSILON * ORIGIN_EPSILON
}

/// What a waypoint stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaypointTarget {
    Node(NodeId),
    /// An object placed into the instance buffer of `mesh`.
    Slot { mesh: MeshId, slot: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Waypoint {
    pub origin: Vector3<f32>,
    /// Euler angles in degrees.
    pub rotation: Vector3<f32>,
    pub scale: Vector3<f32>,
    pub bounding_box: Aabb,
    pub target: WaypointTarget,
    pub mesh: Option<MeshId>,
    /// Snap layer captured on registration. Node entries read the live node instead.
    pub layer: i32,
    is_model: bool,
    is_group: bool,
}

impl Waypoint {
    pub fn model(
        node: NodeId,
        mesh: MeshId,
        origin: Vector3<f32>,
        rotation: Vector3<f32>,
        scale: Vector3<f32>,
        bounding_box: Aabb,
    ) -> Self {
        Self {
            origin,
            rotation,
            scale,
            bounding_box,
            target: WaypointTarget::Node(node),
            mesh: Some(mesh),
            layer: 0,
            is_model: true,
            is_group: false,
        }
    }

    /// Entry for an instanced object. It counts as a model.
    pub fn instance(
        mesh: MeshId,
        slot: usize,
        origin: Vector3<f32>,
        rotation: Vector3<f32>,
        scale: Vector3<f32>,
        bounding_box: Aabb,
    ) -> Self {
        Self {
            origin,
            rotation,
            scale,
            bounding_box,
            target: WaypointTarget::Slot { mesh, slot },
            mesh: Some(mesh),
            layer: 0,
            is_model: true,
            is_group: false,
        }
    }

    pub fn on_layer(mut self, layer: i32) -> Self {
        self.layer = layer;
        self
    }

    pub fn group(
        node: NodeId,
        origin: Vector3<f32>,
        rotation: Vector3<f32>,
        scale: Vector3<f32>,
        bounding_box: Aabb,
    ) -> Self {
        Self {
            origin,
            rotation,
            scale,
            bounding_box,
            target: WaypointTarget::Node(node),
            mesh: None,
            layer: 0,
            is_model: false,
            is_group: true,
        }
    }

    /// The scene node behind this entry, `None` for instanced objects.
    pub fn node(&self) -> Option<NodeId> {
        match self.target {
            WaypointTarget::Node(node) => Some(node),
            WaypointTarget::Slot { .. } => None,
        }
    }

    /// Whether the entry still refers to something placed. Slot entries are
    /// trusted here; the registry drops them when their slot is cleared.
    fn is_valid(&self, scene: &SceneGraph) -> bool {
        match self.target {
            WaypointTarget::Node(node) => scene.contains(node),
            WaypointTarget::Slot { .. } => true,
        }
    }

    pub fn is_model(&self) -> bool {
        self.is_model
    }

    pub fn is_group(&self) -> bool {
        self.is_group
    }

    /// Half extents of the footprint, scaled by the waypoint's own scale.
    pub fn half_extents(&self) -> Vector3<f32> {
        self.bounding_box.scaled_half_extents(self.scale)
    }
}

#[derive(Default)]
pub struct WaypointRegistry {
    entries: Vec<Waypoint>,
}

impl WaypointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `node` as placed. Duplicate origins are allowed (stacked objects).
    /// Returns `false` and logs a warning when `node` is no longer valid.
    pub fn add(
        &mut self,
        scene: &SceneGraph,
        node: NodeId,
        origin: Vector3<f32>,
        rotation: Vector3<f32>,
        scale: Vector3<f32>,
    ) -> bool {
        let Some(scene_node) = scene.node(node) else {
            warn!("cannot register waypoint for stale node {:?}", node);
            return false;
        };
        let bounds = scene.local_bounds(node);
        let waypoint = match &scene_node.kind {
            NodeKind::Model { mesh, .. } => {
                Waypoint::model(node, *mesh, origin, rotation, scale, bounds)
            }
            _ => Waypoint::group(node, origin, rotation, scale, bounds),
        };
        debug!("waypoint added for {:?} at {:?}", node, origin);
        self.entries.push(waypoint.on_layer(scene_node.snap_layer()));
        true
    }

    /// Registers an instanced object, see [`Waypoint::instance`].
    pub fn add_instance(&mut self, waypoint: Waypoint) {
        debug!("waypoint added for {:?} at {:?}", waypoint.target, waypoint.origin);
        self.entries.push(waypoint);
    }

    /// Removes stale entries plus every entry placed at `origin` that matches
    /// `node_instance`: same mesh resource for models, same spot for anything else.
    pub fn remove(&mut self, scene: &SceneGraph, node_instance: NodeId, origin: Vector3<f32>) {
        let mesh = scene.node(node_instance).and_then(|node| node.mesh());
        let before = self.entries.len();
        self.entries.retain(|entry| {
            if !entry.is_valid(scene) {
                return false;
            }
            if !same_origin(entry.origin, origin) {
                return true;
            }
            match mesh {
                Some(mesh) => entry.mesh != Some(mesh),
                None => false,
            }
        });
        debug!(
            "removed {} waypoint(s) for {:?}",
            before - self.entries.len(),
            node_instance
        );
    }

    pub fn has(&self, node: NodeId) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.target == WaypointTarget::Node(node))
    }

    pub fn has_slot(&self, mesh: MeshId, slot: usize) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.target == WaypointTarget::Slot { mesh, slot })
    }

    /// Drops the entry of a cleared instance slot.
    pub fn remove_slot(&mut self, mesh: MeshId, slot: usize) {
        self.entries
            .retain(|entry| entry.target != WaypointTarget::Slot { mesh, slot });
    }

    /// Drops slot entries whose slot is no longer live in `instances`.
    pub fn retain_live_slots(&mut self, instances: &InstanceBufferManager) {
        let before = self.entries.len();
        self.entries.retain(|entry| match entry.target {
            WaypointTarget::Slot { mesh, slot } => instances
                .buffer(mesh)
                .is_some_and(|buffer| buffer.slot(slot).is_some()),
            WaypointTarget::Node(_) => true,
        });
        if self.entries.len() != before {
            debug!("pruned {} cleared instance waypoint(s)", before - self.entries.len());
        }
    }

    /// Overwrites the scale of every entry placed at `origin`.
    pub fn update_scale(&mut self, origin: Vector3<f32>, scale: Vector3<f32>) -> usize {
        let mut updated = 0;
        for entry in self
            .entries
            .iter_mut()
            .filter(|entry| same_origin(entry.origin, origin))
        {
            entry.scale = scale;
            updated += 1;
        }
        updated
    }

    /// Moves the entries of `node` to a new origin and scale, e.g. after a group
    /// was dragged. Other entries at that origin are left alone.
    pub fn update_origin(&mut self, node: NodeId, origin: Vector3<f32>, scale: Vector3<f32>) {
        self.entries
            .iter_mut()
            .filter(|entry| entry.target == WaypointTarget::Node(node))
            .for_each(|entry| {
                entry.origin = origin;
                entry.scale = scale;
            });
    }

    /// Drops every entry whose node is no longer part of `scene`.
    pub fn prune(&mut self, scene: &SceneGraph) {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.is_valid(scene));
        if self.entries.len() != before {
            debug!("pruned {} stale waypoint(s)", before - self.entries.len());
        }
    }

    /// Visits every valid entry, pruning stale ones along the way.
    pub fn each(&mut self, scene: &SceneGraph, mut visitor: impl FnMut(&Waypoint)) {
        self.prune(scene);
        self.entries.iter().for_each(|entry| visitor(entry));
    }

    /// Short-circuiting walk: returns the first `Some` produced by `f`.
    pub fn find_map<T>(
        &mut self,
        scene: &SceneGraph,
        f: impl FnMut(&Waypoint) -> Option<T>,
    ) -> Option<T> {
        self.prune(scene);
        self.entries.iter().find_map(f)
    }

    /// True when no entry refers to a live node.
    pub fn is_empty(&self, scene: &SceneGraph) -> bool {
        !self.entries.iter().any(|entry| entry.is_valid(scene))
    }

    /// Number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Waypoint> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
