//! Drag-to-place batches.
//!
//! Holding the modifier and dragging with the primary button lays out a row of
//! evenly spaced copies between the press point and the pointer. While dragging,
//! the row is shown as ephemeral preview nodes under the plugin root; releasing
//! commits every point through the [`Spawner`], a secondary click or Escape throws
//! the preview away.

use cgmath::{ElementWise, InnerSpace, Vector3};
use log::{debug, info, warn};

use crate::{
    data_structures::{instance::Transform, scene_graph::NodeId},
    input::{EditorInput, PointerButton},
    placement::spawn::{Placement, PlacementContext, SpawnRequest, Spawner},
    settings::{SettingsProvider, flag, float, keys},
};

/// Size offset change per scrolled line.
const SCROLL_STEP: f32 = 0.1;

/// The size offset is kept at this resolution so repeated scrolling does not drift.
const OFFSET_RESOLUTION: f32 = 1e-3;

/// Smallest spacing, as a fraction of the object's extent along the drag axis.
const MIN_SPACING_RATIO: f32 = 0.01;

/// Upper bound on the number of steps of one path.
pub const MAX_PATH_STEPS: usize = 1024;

/// Evenly spaced positions from `from` to `to`, both included.
///
/// The spacing is the object's `extent` along the dominant drag axis (the first of
/// X, Y, Z that changes) minus `size_offset`. A zero-length drag or a spacing that
/// is not positive yields only `from`. A positive spacing is raised to a small
/// fraction of the extent, and the path never has more than [`MAX_PATH_STEPS`]
/// steps.
pub fn plan_path(
    from: Vector3<f32>,
    to: Vector3<f32>,
    extent: Vector3<f32>,
    size_offset: f32,
) -> Vec<Vector3<f32>> {
    let delta = to - from;
    let distance = delta.magnitude();
    let axis_extent = if delta.x != 0.0 {
        extent.x
    } else if delta.y != 0.0 {
        extent.y
    } else {
        extent.z
    };
    let spacing = axis_extent - size_offset;
    if distance == 0.0 || spacing <= 0.0 {
        return vec![from];
    }
    let spacing = spacing.max(axis_extent.abs() * MIN_SPACING_RATIO);
    let steps = ((distance / spacing).ceil() as usize).clamp(1, MAX_PATH_STEPS);
    (0..=steps)
        .map(|i| from + delta * (i as f32 / steps as f32))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DragState {
    Idle,
    Dragging {
        source: NodeId,
        template: Transform,
        from: Vector3<f32>,
        to: Vector3<f32>,
    },
}

pub struct DragBatchPlanner {
    state: DragState,
    modifier: bool,
    draw_position: Option<Vector3<f32>>,
    armed: Option<(NodeId, Transform)>,
    size_offset: f32,
    path: Vec<Vector3<f32>>,
    preview: Vec<NodeId>,
    committed: usize,
}

impl Default for DragBatchPlanner {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl DragBatchPlanner {
    pub fn new(size_offset: f32) -> Self {
        Self {
            state: DragState::Idle,
            modifier: false,
            draw_position: None,
            armed: None,
            size_offset,
            path: Vec::new(),
            preview: Vec::new(),
            committed: 0,
        }
    }

    pub fn from_settings(settings: &dyn SettingsProvider) -> Self {
        Self::new(float(settings, keys::DRAG_SIZE_OFFSET, 0.0))
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn size_offset(&self) -> f32 {
        self.size_offset
    }

    pub fn path(&self) -> &[Vector3<f32>] {
        &self.path
    }

    pub fn preview(&self) -> &[NodeId] {
        &self.preview
    }

    pub fn set_modifier(&mut self, held: bool) {
        self.modifier = held;
    }

    pub fn set_draw_position(&mut self, position: Vector3<f32>) {
        self.draw_position = Some(position);
    }

    /// Sets the object the next drag lays out, with the rotation and scale to use.
    pub fn arm(&mut self, source: NodeId, template: Transform) {
        self.armed = Some((source, template));
    }

    pub fn disarm(&mut self) {
        self.armed = None;
    }

    /// Starts a drag at the current draw position. Requires the modifier to be
    /// held, multi-drop to be allowed and `source` to still exist.
    pub fn begin(
        &mut self,
        ctx: &PlacementContext<'_>,
        source: NodeId,
        template: Transform,
    ) -> bool {
        if self.is_dragging() || !self.modifier {
            return false;
        }
        if !flag(ctx.settings, keys::ALLOW_MULTI_DROP) {
            debug!("multi-drop is disabled");
            return false;
        }
        let Some(from) = self.draw_position else {
            warn!("cannot start a drag without a draw position");
            return false;
        };
        if !ctx.scene.contains(source) {
            warn!("drag source {:?} is no longer valid", source);
            return false;
        }
        self.state = DragState::Dragging {
            source,
            template,
            from,
            to: from,
        };
        self.path = vec![from];
        debug!("drag started at {:?}", from);
        true
    }

    /// Recomputes the path to `to` and rebuilds the preview.
    pub fn update_drag(&mut self, ctx: &mut PlacementContext<'_>, to: Vector3<f32>) {
        let DragState::Dragging {
            source,
            template,
            from,
            to: end,
        } = &mut self.state
        else {
            return;
        };
        *end = to;
        let (source, template, from) = (*source, *template, *from);

        let bounds = ctx.scene.local_bounds(source);
        let extent = bounds.size.mul_element_wise(template.scale);
        self.path = plan_path(from, to, extent, self.size_offset);
        self.clear_preview(ctx);
        self.spawn_preview(ctx, source, template);
    }

    fn spawn_preview(&mut self, ctx: &mut PlacementContext<'_>, source: NodeId, template: Transform) {
        for origin in &self.path {
            let Some(node) = ctx.scene.duplicate(source) else {
                warn!("drag source {:?} vanished, dropping the preview", source);
                return;
            };
            self.preview.push(node);
            if let Err(e) = ctx.scene.add_child(ctx.plugin_root, node) {
                warn!("cannot attach drag preview: {:#}", e);
                return;
            }
            if let Some(preview) = ctx.scene.node_mut(node) {
                preview.local = Transform {
                    origin: *origin,
                    ..template
                }
                .to_instance();
            }
        }
    }

    fn clear_preview(&mut self, ctx: &mut PlacementContext<'_>) {
        for node in self.preview.drain(..) {
            ctx.scene.free(node);
        }
    }

    /// Changes the spacing offset and persists it to the settings.
    pub fn adjust_size_offset(&mut self, settings: &mut dyn SettingsProvider, delta: f32) -> f32 {
        self.size_offset =
            ((self.size_offset + delta) / OFFSET_RESOLUTION).round() * OFFSET_RESOLUTION;
        if let Err(e) = settings.set_float(keys::DRAG_SIZE_OFFSET, self.size_offset) {
            warn!("could not persist drag size offset: {:#}", e);
        }
        self.size_offset
    }

    /// Places one object per path point and ends the drag.
    pub fn commit(&mut self, ctx: &mut PlacementContext<'_>, spawner: &mut Spawner) -> Vec<Placement> {
        let DragState::Dragging {
            source, template, ..
        } = self.state
        else {
            return Vec::new();
        };
        self.clear_preview(ctx);
        let base = ctx
            .scene
            .node(source)
            .map(|node| node.name.clone())
            .unwrap_or_default();
        let path = std::mem::take(&mut self.path);
        let mut placements = Vec::with_capacity(path.len());
        for origin in path {
            let request = SpawnRequest::new(
                source,
                Transform {
                    origin,
                    ..template
                },
            )
            .with_name(format!("{}_{}", base, self.committed))
            .multi_drop()
            .without_snap();
            self.committed += 1;
            if let Some(placement) = spawner.spawn(ctx, &request) {
                placements.push(placement);
            }
        }
        info!("drag committed {} placement(s) of {:?}", placements.len(), source);
        self.state = DragState::Idle;
        placements
    }

    /// Drops the preview and the endpoints without placing anything.
    pub fn cancel(&mut self, ctx: &mut PlacementContext<'_>) {
        if self.is_dragging() {
            debug!("drag cancelled");
        }
        self.clear_preview(ctx);
        self.path.clear();
        self.state = DragState::Idle;
    }

    /// Drives the drag from editor input. Returns the placements of a commit.
    pub fn on_input(
        &mut self,
        ctx: &mut PlacementContext<'_>,
        spawner: &mut Spawner,
        input: EditorInput,
    ) -> Vec<Placement> {
        match input {
            EditorInput::ModifierChanged(held) => self.set_modifier(held),
            EditorInput::PointerMoved(position) => {
                self.set_draw_position(position);
                self.update_drag(ctx, position);
            }
            EditorInput::PointerPressed(PointerButton::Primary) => {
                if let Some((source, template)) = self.armed {
                    self.begin(ctx, source, template);
                }
            }
            EditorInput::PointerReleased(PointerButton::Primary) => {
                return self.commit(ctx, spawner);
            }
            EditorInput::PointerPressed(PointerButton::Secondary) | EditorInput::Cancel => {
                self.cancel(ctx);
            }
            EditorInput::Scroll(lines) if self.modifier => {
                self.adjust_size_offset(ctx.settings, lines * SCROLL_STEP);
                if let DragState::Dragging { to, .. } = self.state {
                    self.update_drag(ctx, to);
                }
            }
            EditorInput::Scroll(_) | EditorInput::PointerReleased(PointerButton::Secondary) => {}
        }
        Vec::new()
    }
}
