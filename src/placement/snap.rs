//! Neighbour-relative snapping on the horizontal plane.
//!
//! A candidate qualifies against a neighbour on axis X when it lies within the
//! neighbour's half extent plus [`SNAP_DISTANCE`] along X. Resolving on X moves
//! the candidate so that the two footprints touch edge to edge on X and pins Z
//! exactly to the neighbour's Z; resolving on Z is the mirror image. An axis that
//! is snap-disabled is never pinned, which rules out resolution on the other axis.
//!
//! Neighbours are tried in registry order and the first qualifying one wins,
//! unless [`SnapConfig::nearest`] asks for the closest qualifying neighbour.

use cgmath::{ElementWise, InnerSpace, Vector3};
use log::{debug, trace};

use crate::{
    data_structures::{
        aabb::Aabb,
        scene_graph::{GroupMargins, NodeId, SceneGraph},
    },
    placement::waypoint::{Waypoint, WaypointRegistry, WaypointTarget},
    settings::{SettingsProvider, flag, float, keys},
};

/// Tolerance band around a neighbour's footprint, in world units.
pub const SNAP_DISTANCE: f32 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnapConfig {
    pub distance: f32,
    pub offset_x: f32,
    pub offset_z: f32,
    pub disable_x: bool,
    pub disable_z: bool,
    pub nearest: bool,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            distance: SNAP_DISTANCE,
            offset_x: 0.0,
            offset_z: 0.0,
            disable_x: false,
            disable_z: false,
            nearest: false,
        }
    }
}

impl SnapConfig {
    pub fn from_settings(settings: &dyn SettingsProvider) -> Self {
        Self {
            distance: SNAP_DISTANCE,
            offset_x: float(settings, keys::SNAP_OFFSET_X, 0.0),
            offset_z: float(settings, keys::SNAP_OFFSET_Z, 0.0),
            disable_x: flag(settings, keys::SNAP_DISABLE_X),
            disable_z: flag(settings, keys::SNAP_DISABLE_Z),
            nearest: flag(settings, keys::SNAP_NEAREST),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapAxis {
    X,
    Z,
}

/// The object being moved: its half extents and, for multi-child groups, the
/// directional margins to its outermost members.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnapBody {
    pub half_extents: Vector3<f32>,
    pub margins: Option<GroupMargins>,
}

impl SnapBody {
    pub fn from_bounds(bounds: &Aabb, scale: Vector3<f32>) -> Self {
        Self {
            half_extents: bounds.scaled_half_extents(scale),
            margins: None,
        }
    }

    /// Body for a scene node, picking up group margins when `node` is a group.
    pub fn for_node(scene: &SceneGraph, node: NodeId, scale: Vector3<f32>) -> Self {
        let bounds = scene.local_bounds(node);
        Self {
            half_extents: bounds.scaled_half_extents(scale),
            margins: scene.group_margins(node).map(|m| GroupMargins {
                left: m.left * scale.x,
                right: m.right * scale.x,
                top: m.top * scale.z,
                bottom: m.bottom * scale.z,
            }),
        }
    }

    /// Extent of the body towards the neighbour when it ends up on the
    /// `positive` side of it along `axis`.
    fn facing_extent(&self, axis: SnapAxis, positive: bool) -> f32 {
        match (self.margins, axis, positive) {
            (Some(m), SnapAxis::X, true) => m.left,
            (Some(m), SnapAxis::X, false) => m.right,
            (Some(m), SnapAxis::Z, true) => m.top,
            (Some(m), SnapAxis::Z, false) => m.bottom,
            (None, SnapAxis::X, _) => self.half_extents.x,
            (None, SnapAxis::Z, _) => self.half_extents.z,
        }
    }
}

impl From<Aabb> for SnapBody {
    fn from(bounds: Aabb) -> Self {
        Self::from_bounds(&bounds, Vector3::new(1.0, 1.0, 1.0))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SnapResolver {
    pub config: SnapConfig,
}

impl SnapResolver {
    pub fn new(config: SnapConfig) -> Self {
        Self { config }
    }

    pub fn from_settings(settings: &dyn SettingsProvider) -> Self {
        Self::new(SnapConfig::from_settings(settings))
    }

    /// Axis on which `candidate` would resolve against `neighbour`, if any.
    fn qualifying_axis(&self, neighbour: &Waypoint, candidate: Vector3<f32>) -> Option<SnapAxis> {
        let half = neighbour.half_extents();
        let delta = candidate - neighbour.origin;
        if !self.config.disable_z && delta.x.abs() <= half.x + self.config.distance {
            return Some(SnapAxis::X);
        }
        if !self.config.disable_x && delta.z.abs() <= half.z + self.config.distance {
            return Some(SnapAxis::Z);
        }
        None
    }

    fn on_layer(scene: &SceneGraph, waypoint: &Waypoint, layer: i32) -> bool {
        match waypoint.target {
            WaypointTarget::Node(node) => scene
                .node(node)
                .is_some_and(|node| node.snap_layer() == layer),
            WaypointTarget::Slot { .. } => waypoint.layer == layer,
        }
    }

    pub fn can_snap(
        &self,
        registry: &mut WaypointRegistry,
        scene: &SceneGraph,
        candidate: Vector3<f32>,
        layer: i32,
    ) -> bool {
        registry
            .find_map(scene, |waypoint| {
                (Self::on_layer(scene, waypoint, layer)
                    && self.qualifying_axis(waypoint, candidate).is_some())
                .then_some(())
            })
            .is_some()
    }

    /// Returns the snapped position, or `candidate` unchanged when no neighbour
    /// on `layer` qualifies.
    pub fn snap(
        &self,
        registry: &mut WaypointRegistry,
        scene: &SceneGraph,
        candidate: Vector3<f32>,
        body: &SnapBody,
        layer: i32,
    ) -> Vector3<f32> {
        let hit = if self.config.nearest {
            self.nearest_neighbour(registry, scene, candidate, layer)
        } else {
            registry.find_map(scene, |waypoint| {
                if !Self::on_layer(scene, waypoint, layer) {
                    return None;
                }
                self.qualifying_axis(waypoint, candidate)
                    .map(|axis| (waypoint.clone(), axis))
            })
        };
        let Some((neighbour, axis)) = hit else {
            trace!("no snap target for {:?} on layer {}", candidate, layer);
            return candidate;
        };
        let snapped = self.resolve(&neighbour, axis, candidate, body);
        debug!(
            "snapped {:?} -> {:?} against {:?} on {:?}",
            candidate, snapped, neighbour.target, axis
        );
        snapped
    }

    fn nearest_neighbour(
        &self,
        registry: &mut WaypointRegistry,
        scene: &SceneGraph,
        candidate: Vector3<f32>,
        layer: i32,
    ) -> Option<(Waypoint, SnapAxis)> {
        let mut best: Option<(f32, Waypoint, SnapAxis)> = None;
        registry.each(scene, |waypoint| {
            if !Self::on_layer(scene, waypoint, layer) {
                return;
            }
            let Some(axis) = self.qualifying_axis(waypoint, candidate) else {
                return;
            };
            let offset = (candidate - waypoint.origin).mul_element_wise(Vector3::new(1.0, 0.0, 1.0));
            let distance = offset.magnitude2();
            if best.as_ref().is_none_or(|(d, _, _)| distance < *d) {
                best = Some((distance, waypoint.clone(), axis));
            }
        });
        best.map(|(_, waypoint, axis)| (waypoint, axis))
    }

    fn resolve(
        &self,
        neighbour: &Waypoint,
        axis: SnapAxis,
        candidate: Vector3<f32>,
        body: &SnapBody,
    ) -> Vector3<f32> {
        let half = neighbour.half_extents();
        let origin = neighbour.origin;
        let mut snapped = candidate;
        match axis {
            SnapAxis::X => {
                let positive = candidate.x - origin.x >= 0.0;
                let reach = half.x + body.facing_extent(axis, positive) + self.config.offset_x;
                snapped.x = if positive { origin.x + reach } else { origin.x - reach };
                snapped.z = origin.z;
            }
            SnapAxis::Z => {
                let positive = candidate.z - origin.z >= 0.0;
                let reach = half.z + body.facing_extent(axis, positive) + self.config.offset_z;
                snapped.z = if positive { origin.z + reach } else { origin.z - reach };
                snapped.x = origin.x;
            }
        }
        snapped
    }
}

/// Rounds X and Z to the nearest multiple of `step`. Y is left alone.
pub fn snap_to_grid(position: Vector3<f32>, step: f32) -> Vector3<f32> {
    if step <= 0.0 {
        return position;
    }
    Vector3::new(
        (position.x / step).round() * step,
        position.y,
        (position.z / step).round() * step,
    )
}
