//! Placement orchestration ("spawn").
//!
//! [`Spawner::spawn`] is the single entry point that turns a source object and a
//! target transform into a placed object. Depending on the placement mode the
//! object becomes its own scene node (`Simple`) or one or more slots in shared
//! per-mesh instance buffers (`Optimized`).
//!
//! Failures never reach the host: missing prerequisites are logged as warnings and
//! yield `None`, internal errors are logged and everything built during the
//! attempt is torn down again.

use anyhow::{Context as _, bail};
use log::{debug, error, info, warn};

use crate::{
    collision::{CollisionFactory, CollisionFlags, CollisionRequest, build_static_bodies},
    data_structures::{
        aabb::Aabb,
        instance::{Instance, InstanceOptions, Transform},
        scene_graph::{GroupMargins, Node, NodeId, NodeKind, SceneGraph},
    },
    placement::{
        instancing::{GroupMember, InstanceBufferManager},
        snap::{SnapBody, SnapResolver, snap_to_grid},
        waypoint::{Waypoint, WaypointRegistry},
    },
    resources::mesh::MeshId,
    settings::{SettingsProvider, flag, float, keys},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementMode {
    /// Every object becomes its own scene node.
    Simple,
    /// Objects sharing a mesh accumulate in one instance buffer.
    Optimized,
}

impl PlacementMode {
    pub fn from_settings(settings: &dyn SettingsProvider) -> Self {
        if flag(settings, keys::OPTIMIZED_PLACEMENT) {
            PlacementMode::Optimized
        } else {
            PlacementMode::Simple
        }
    }
}

/// The editor's current focus.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    focused: Option<NodeId>,
}

impl Selection {
    pub fn focus(&mut self, node: NodeId) {
        self.focused = Some(node);
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    pub fn clear(&mut self) {
        self.focused = None;
    }
}

/// Services a placement needs, lent out by the owning editing session.
pub struct PlacementContext<'a> {
    pub scene: &'a mut SceneGraph,
    pub waypoints: &'a mut WaypointRegistry,
    pub instances: &'a mut InstanceBufferManager,
    pub settings: &'a mut dyn SettingsProvider,
    pub collisions: &'a dyn CollisionFactory,
    pub selection: &'a mut Selection,
    /// Parent for placements that are not pushed into the edited scene.
    pub plugin_root: NodeId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpawnRequest {
    pub source: NodeId,
    pub transform: Transform,
    /// Name for the placed object; the source's name is kept when `None`.
    pub name: Option<String>,
    /// Set while a batch of drops is committed; suppresses focusing.
    pub multi_drop: bool,
    /// Run neighbour and grid snapping on the target origin.
    pub snap: bool,
}

impl SpawnRequest {
    pub fn new(source: NodeId, transform: Transform) -> Self {
        Self {
            source,
            transform,
            name: None,
            multi_drop: false,
            snap: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn multi_drop(mut self) -> Self {
        self.multi_drop = true;
        self
    }

    pub fn without_snap(mut self) -> Self {
        self.snap = false;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Placement {
    /// An individually owned scene node.
    Node {
        node: NodeId,
        collisions: Vec<NodeId>,
    },
    /// A slot in the instance buffer of `mesh`.
    Instance {
        mesh: MeshId,
        slot: usize,
        collision: Option<NodeId>,
    },
    /// A group whose members were spread over instance buffers.
    Group {
        proxy: NodeId,
        members: Vec<GroupMember>,
    },
}

impl Placement {
    /// The scene node standing for this placement, if there is one.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Placement::Node { node, .. } => Some(*node),
            Placement::Group { proxy, .. } => Some(*proxy),
            Placement::Instance { .. } => None,
        }
    }
}

#[derive(Clone, Copy)]
enum SourceShape {
    Model,
    Group,
    Other,
}

/// Everything created during one spawn attempt, for rollback.
#[derive(Default)]
struct Attempt {
    nodes: Vec<NodeId>,
    slots: Vec<(MeshId, usize)>,
}

impl Attempt {
    fn rollback(self, ctx: &mut PlacementContext<'_>) {
        for node in self.nodes.into_iter().rev() {
            ctx.scene.free(node);
        }
        for (mesh, slot) in self.slots {
            ctx.instances.clear_slot(mesh, slot);
            ctx.waypoints.remove_slot(mesh, slot);
        }
        ctx.waypoints.prune(ctx.scene);
    }
}

#[derive(Debug, Default)]
pub struct Spawner {
    placed: u64,
}

impl Spawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful placements so far.
    pub fn placed(&self) -> u64 {
        self.placed
    }

    pub fn spawn(
        &mut self,
        ctx: &mut PlacementContext<'_>,
        request: &SpawnRequest,
    ) -> Option<Placement> {
        let Some(root) = ctx.scene.edited_root() else {
            warn!("no edited scene root, cannot place {:?}", request.source);
            return None;
        };
        if !ctx.scene.contains(request.source) {
            warn!("source {:?} is no longer valid", request.source);
            return None;
        }
        let mut attempt = Attempt::default();
        match self.try_spawn(ctx, root, request, &mut attempt) {
            Ok(placement) => {
                self.placed += 1;
                info!("placed {:?} as {:?}", request.source, placement);
                Some(placement)
            }
            Err(e) => {
                error!("placing {:?} failed: {:#}", request.source, e);
                attempt.rollback(ctx);
                None
            }
        }
    }

    fn try_spawn(
        &mut self,
        ctx: &mut PlacementContext<'_>,
        root: NodeId,
        request: &SpawnRequest,
        attempt: &mut Attempt,
    ) -> anyhow::Result<Placement> {
        let transform = self.resolve_transform(ctx, request);
        let source = ctx
            .scene
            .node(request.source)
            .context("source vanished before placement")?;
        let shape = match &source.kind {
            NodeKind::Model { .. } => SourceShape::Model,
            NodeKind::Group if !source.children().is_empty() => SourceShape::Group,
            _ => SourceShape::Other,
        };
        match (PlacementMode::from_settings(ctx.settings), shape) {
            (PlacementMode::Simple, _) => {
                self.spawn_simple(ctx, root, request, transform, attempt)
            }
            (PlacementMode::Optimized, SourceShape::Model) => {
                self.spawn_instanced(ctx, root, request, transform, attempt)
            }
            (PlacementMode::Optimized, SourceShape::Group) => {
                self.spawn_group_instanced(ctx, root, request, transform, attempt)
            }
            (PlacementMode::Optimized, SourceShape::Other) => {
                debug!("{:?} cannot be instanced, placing it as a node", request.source);
                self.spawn_simple(ctx, root, request, transform, attempt)
            }
        }
    }

    /// Applies neighbour snapping and then grid snapping to the requested origin.
    fn resolve_transform(&self, ctx: &mut PlacementContext<'_>, request: &SpawnRequest) -> Transform {
        let mut transform = request.transform;
        if !request.snap {
            return transform;
        }
        if flag(ctx.settings, keys::SNAP_ENABLED) {
            ctx.waypoints.retain_live_slots(ctx.instances);
            let layer = ctx
                .scene
                .node(request.source)
                .map(Node::snap_layer)
                .unwrap_or_default();
            let resolver = SnapResolver::from_settings(ctx.settings);
            if resolver.can_snap(ctx.waypoints, ctx.scene, transform.origin, layer) {
                let body = SnapBody::for_node(ctx.scene, request.source, transform.scale);
                transform.origin =
                    resolver.snap(ctx.waypoints, ctx.scene, transform.origin, &body, layer);
            }
        }
        if flag(ctx.settings, keys::GRID_SNAP) {
            let step = float(ctx.settings, keys::GRID_STEP, 1.0);
            transform.origin = snap_to_grid(transform.origin, step);
        }
        transform
    }

    /// Parent and persistence owner for new nodes.
    fn placement_parent(
        &self,
        ctx: &PlacementContext<'_>,
        root: NodeId,
    ) -> anyhow::Result<(NodeId, Option<NodeId>)> {
        if flag(ctx.settings, keys::PUSH_TO_SCENE) {
            return Ok((root, Some(root)));
        }
        if !ctx.scene.contains(ctx.plugin_root) {
            bail!("plugin root {:?} is gone", ctx.plugin_root);
        }
        Ok((ctx.plugin_root, None))
    }

    fn spawn_simple(
        &mut self,
        ctx: &mut PlacementContext<'_>,
        root: NodeId,
        request: &SpawnRequest,
        transform: Transform,
        attempt: &mut Attempt,
    ) -> anyhow::Result<Placement> {
        let node = ctx
            .scene
            .duplicate(request.source)
            .context("source vanished during duplication")?;
        attempt.nodes.push(node);

        let (parent, owner) = self.placement_parent(ctx, root)?;
        ctx.scene.add_child(parent, node)?;
        ctx.scene.set_owner(node, owner);
        {
            let placed = ctx
                .scene
                .node_mut(node)
                .context("duplicate vanished after insertion")?;
            if let Some(name) = &request.name {
                placed.name = name.clone();
            }
            placed.local = transform.to_instance();
        }

        let collisions = if flag(ctx.settings, keys::ADD_COLLISIONS) {
            self.attach_collisions(ctx, node, owner, attempt)?
        } else {
            Vec::new()
        };

        ctx.waypoints.add(
            ctx.scene,
            node,
            transform.origin,
            transform.rotation,
            transform.scale,
        );
        self.focus(ctx, node, request);
        Ok(Placement::Node { node, collisions })
    }

    /// Builds one body per model in the subtree of `node`, attached to that model.
    fn attach_collisions(
        &self,
        ctx: &mut PlacementContext<'_>,
        node: NodeId,
        owner: Option<NodeId>,
        attempt: &mut Attempt,
    ) -> anyhow::Result<Vec<NodeId>> {
        let flags = CollisionFlags::from_settings(ctx.settings);
        let models: Vec<(NodeId, CollisionRequest)> = ctx
            .scene
            .descendants(node)
            .into_iter()
            .filter_map(|id| {
                let model = ctx.scene.node(id)?;
                match &model.kind {
                    NodeKind::Model { mesh, bounds } => Some((
                        id,
                        CollisionRequest {
                            mesh: *mesh,
                            bounds: *bounds,
                            transform: Instance::default(),
                            options: model.options,
                        },
                    )),
                    _ => None,
                }
            })
            .collect();
        if models.is_empty() {
            warn!("{:?} has no mesh to build collisions from", node);
        }
        let mut built = Vec::new();
        for (model, request) in models {
            let start = built.len();
            let result = build_static_bodies(
                ctx.collisions,
                ctx.scene,
                model,
                owner,
                &flags,
                &[request],
                &mut built,
            );
            attempt.nodes.extend_from_slice(&built[start..]);
            result?;
        }
        Ok(built)
    }

    fn spawn_instanced(
        &mut self,
        ctx: &mut PlacementContext<'_>,
        root: NodeId,
        request: &SpawnRequest,
        transform: Transform,
        attempt: &mut Attempt,
    ) -> anyhow::Result<Placement> {
        let source = ctx
            .scene
            .node(request.source)
            .context("source vanished before instancing")?;
        let NodeKind::Model { mesh, bounds } = source.kind else {
            bail!("{:?} holds no mesh", request.source);
        };
        let options = source.options;
        let instance = transform.to_instance();

        let slot = ctx
            .instances
            .buffer_or_create(mesh, bounds)
            .add_to_buffer(instance, options);
        attempt.slots.push((mesh, slot));

        let mut collision = None;
        if flag(ctx.settings, keys::ADD_COLLISIONS) {
            let (parent, owner) = self.placement_parent(ctx, root)?;
            let flags = CollisionFlags::from_settings(ctx.settings);
            let mut built = Vec::new();
            let result = build_static_bodies(
                ctx.collisions,
                ctx.scene,
                parent,
                owner,
                &flags,
                &[CollisionRequest {
                    mesh,
                    bounds,
                    transform: instance,
                    options,
                }],
                &mut built,
            );
            attempt.nodes.extend(built.iter().copied());
            result?;
            collision = built.first().copied();
        }

        let buffer = ctx
            .instances
            .buffer_mut(mesh)
            .context("instance buffer vanished during placement")?;
        buffer.set_collision(slot, collision);
        buffer.update();
        ctx.waypoints.add_instance(
            Waypoint::instance(
                mesh,
                slot,
                transform.origin,
                transform.rotation,
                transform.scale,
                bounds,
            )
            .on_layer(options.snap_layer),
        );
        debug!("instanced {:?} into slot {} of {:?}", request.source, slot, mesh);
        Ok(Placement::Instance {
            mesh,
            slot,
            collision,
        })
    }

    fn spawn_group_instanced(
        &mut self,
        ctx: &mut PlacementContext<'_>,
        root: NodeId,
        request: &SpawnRequest,
        transform: Transform,
        attempt: &mut Attempt,
    ) -> anyhow::Result<Placement> {
        let group_instance = transform.to_instance();
        let children = ctx.scene.children(request.source).to_vec();
        let mut members = Vec::new();
        let mut collision_requests = Vec::new();

        for child in children {
            let Some((mesh, bounds, options, local)) = mesh_holder(ctx.scene, child) else {
                debug!("skipping non-mesh child {:?} of {:?}", child, request.source);
                continue;
            };
            let world = &group_instance * &local;
            let slot = ctx
                .instances
                .buffer_or_create(mesh, bounds)
                .add_to_buffer(world, options);
            attempt.slots.push((mesh, slot));
            members.push(GroupMember { mesh, slot, local });
            collision_requests.push(CollisionRequest {
                mesh,
                bounds,
                transform: world,
                options,
            });
        }
        if members.is_empty() {
            bail!("group {:?} holds no mesh children", request.source);
        }

        let source = ctx
            .scene
            .node(request.source)
            .context("source vanished during instancing")?;
        let name = request.name.clone().unwrap_or_else(|| source.name.clone());
        let options = source.options;
        let bounds = ctx.scene.local_bounds(request.source);
        let margins = ctx
            .scene
            .group_margins(request.source)
            .unwrap_or_else(|| GroupMargins::from_bounds(&bounds));
        let proxy = ctx.scene.insert(
            Node::new(name, NodeKind::GroupProxy { bounds, margins })
                .with_local(group_instance)
                .with_options(options),
        );
        attempt.nodes.push(proxy);
        let (parent, owner) = self.placement_parent(ctx, root)?;
        ctx.scene.add_child(parent, proxy)?;
        ctx.scene.set_owner(proxy, owner);

        if flag(ctx.settings, keys::ADD_COLLISIONS) {
            let flags = CollisionFlags::from_settings(ctx.settings);
            let mut built = Vec::new();
            let result = build_static_bodies(
                ctx.collisions,
                ctx.scene,
                parent,
                owner,
                &flags,
                &collision_requests,
                &mut built,
            );
            attempt.nodes.extend(built.iter().copied());
            result?;
            for (member, body) in members.iter().zip(built) {
                if let Some(buffer) = ctx.instances.buffer_mut(member.mesh) {
                    buffer.set_collision(member.slot, Some(body));
                }
            }
        }

        let mut touched: Vec<MeshId> = members.iter().map(|m| m.mesh).collect();
        touched.sort();
        touched.dedup();
        for mesh in touched {
            if let Some(buffer) = ctx.instances.buffer_mut(mesh) {
                buffer.update();
            }
        }
        ctx.instances.connect_group(proxy, members.clone());
        ctx.waypoints.add(
            ctx.scene,
            proxy,
            transform.origin,
            transform.rotation,
            transform.scale,
        );
        self.focus(ctx, proxy, request);
        Ok(Placement::Group { proxy, members })
    }

    fn focus(&self, ctx: &mut PlacementContext<'_>, node: NodeId, request: &SpawnRequest) {
        if request.multi_drop || !flag(ctx.settings, keys::FOCUS_ON_PLACE) {
            return;
        }
        ctx.selection.focus(node);
    }

    /// Moves an optimized group: updates its proxy and registry entry, then pushes
    /// the new member transforms into the instance buffers.
    pub fn move_group(
        &self,
        ctx: &mut PlacementContext<'_>,
        proxy: NodeId,
        transform: Transform,
    ) -> bool {
        let Some(node) = ctx.scene.node_mut(proxy) else {
            warn!("group proxy {:?} is no longer valid", proxy);
            return false;
        };
        let instance = transform.to_instance();
        node.local = instance;
        ctx.waypoints
            .update_origin(proxy, transform.origin, transform.scale);
        ctx.instances.propagate_group(proxy, &instance)
    }

    /// Deletes a placed node: unregisters it, releases instance slots owned by a
    /// group proxy together with their collision bodies, and frees the node.
    pub fn erase(&self, ctx: &mut PlacementContext<'_>, node: NodeId) -> bool {
        let Some(origin) = ctx.scene.node(node).map(|n| n.local.position) else {
            warn!("cannot erase stale node {:?}", node);
            return false;
        };
        ctx.waypoints.remove(ctx.scene, node, origin);
        for slot in ctx.instances.disconnect_group(node) {
            if let Some(body) = slot.collision {
                ctx.scene.free(body);
            }
        }
        if ctx.selection.focused() == Some(node) {
            ctx.selection.clear();
        }
        ctx.scene.free(node)
    }

    /// Releases one optimized instance together with its waypoint and collision body.
    pub fn erase_instance(&self, ctx: &mut PlacementContext<'_>, mesh: MeshId, slot: usize) -> bool {
        match ctx.instances.clear_slot(mesh, slot) {
            Some(cleared) => {
                ctx.waypoints.remove_slot(mesh, slot);
                if let Some(body) = cleared.collision {
                    ctx.scene.free(body);
                }
                true
            }
            None => false,
        }
    }
}

/// Mesh data of a group child. Children wrapped in a collision body are read
/// through one level to the model inside.
fn mesh_holder(
    scene: &SceneGraph,
    child: NodeId,
) -> Option<(MeshId, Aabb, InstanceOptions, Instance)> {
    let node = scene.node(child)?;
    let (holder, local) = if node.is_collision_body() {
        let inner = scene
            .children(child)
            .iter()
            .copied()
            .find(|c| scene.node(*c).is_some_and(Node::is_model))?;
        (inner, &node.local * &scene.node(inner)?.local)
    } else {
        (child, node.local)
    };
    let holder = scene.node(holder)?;
    match &holder.kind {
        NodeKind::Model { mesh, bounds } => Some((*mesh, *bounds, holder.options, local)),
        _ => None,
    }
}

