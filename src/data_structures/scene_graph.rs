//! Scene graph and hierarchical scene organization.
//!
//! Nodes live in a generational arena. A [`NodeId`] is a weak handle: when a node
//! is freed its slot generation changes and every stale handle fails
//! [`SceneGraph::contains`]. Registries elsewhere in the crate hold only `NodeId`s
//! and rely on this check instead of probing nullable pointers.
//!
//! The graph is the sole owner of nodes. Two roots matter to placement:
//! - the edited-scene root, whose subtree is what the user persists
//! - the plugin root, holding ephemeral nodes (previews, non-pushed placements)

use anyhow::{Context as _, bail};
use cgmath::Vector3;
use log::warn;
use slotmap::SlotMap;

use crate::{
    collision::{CollisionShape, ConvexMode},
    data_structures::{
        aabb::Aabb,
        instance::{Instance, InstanceOptions},
    },
    resources::mesh::{Mesh, MeshId},
};

slotmap::new_key_type! {
    /// Generational handle to a scene node.
    pub struct NodeId;
}

/// Distances from a group's origin to the outermost edge of its members, per
/// horizontal direction. Left/right run along X, top/bottom along Z (top is -Z).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GroupMargins {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl GroupMargins {
    pub fn from_bounds(bounds: &Aabb) -> Self {
        let (min, max) = (bounds.min(), bounds.max());
        Self {
            left: -min.x,
            right: max.x,
            top: -min.z,
            bottom: max.z,
        }
    }
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    /// Plain container; a group when it holds placeable children.
    Group,
    /// A mesh-holding node.
    Model { mesh: MeshId, bounds: Aabb },
    /// A static collision body, either wrapping a model child or standing alone
    /// next to an instance buffer slot.
    CollisionBody {
        shape: CollisionShape,
        convex: Option<ConvexMode>,
        mesh: Option<MeshId>,
        extents: Vector3<f32>,
    },
    /// Stand-in for a group placed in optimized mode. Its members live in instance
    /// buffers, so it keeps their combined bounds itself.
    GroupProxy { bounds: Aabb, margins: GroupMargins },
}

#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub local: Instance,
    pub options: InstanceOptions,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    owner: Option<NodeId>,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            local: Instance::default(),
            options: InstanceOptions::default(),
            parent: None,
            children: Vec::new(),
            owner: None,
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Group)
    }

    pub fn model(name: impl Into<String>, mesh_id: MeshId, mesh: &Mesh) -> Self {
        Self::new(
            name,
            NodeKind::Model {
                mesh: mesh_id,
                bounds: mesh.bounds,
            },
        )
    }

    pub fn with_local(mut self, local: Instance) -> Self {
        self.local = local;
        self
    }

    pub fn with_options(mut self, options: InstanceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn mesh(&self) -> Option<MeshId> {
        match &self.kind {
            NodeKind::Model { mesh, .. } => Some(*mesh),
            _ => None,
        }
    }

    pub fn is_model(&self) -> bool {
        matches!(self.kind, NodeKind::Model { .. })
    }

    pub fn is_collision_body(&self) -> bool {
        matches!(self.kind, NodeKind::CollisionBody { .. })
    }

    pub fn is_group_proxy(&self) -> bool {
        matches!(self.kind, NodeKind::GroupProxy { .. })
    }

    pub fn snap_layer(&self) -> i32 {
        self.options.snap_layer
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }
}

#[derive(Default)]
pub struct SceneGraph {
    nodes: SlotMap<NodeId, Node>,
    edited_root: Option<NodeId>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `node` detached from any parent. The node is "floating" until it is
    /// attached with [`SceneGraph::add_child`].
    pub fn insert(&mut self, mut node: Node) -> NodeId {
        node.parent = None;
        node.children.clear();
        self.nodes.insert(node)
    }

    pub fn set_edited_root(&mut self, root: NodeId) {
        self.edited_root = Some(root);
    }

    /// The root of the scene being edited, if it is still alive.
    pub fn edited_root(&self) -> Option<NodeId> {
        self.edited_root.filter(|root| self.contains(*root))
    }

    pub fn clear_edited_root(&mut self) {
        self.edited_root = None;
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> anyhow::Result<()> {
        if !self.contains(parent) {
            bail!("parent {:?} is not part of the scene graph", parent);
        }
        let current = self
            .nodes
            .get(child)
            .with_context(|| format!("child {:?} is not part of the scene graph", child))?
            .parent;
        if let Some(current) = current {
            bail!("{:?} already has parent {:?}", child, current);
        }
        if parent == child || self.is_ancestor(child, parent) {
            bail!("attaching {:?} under {:?} would create a cycle", child, parent);
        }
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
        Ok(())
    }

    /// Detaches `child` from `parent` without freeing it.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(parent) else {
            return false;
        };
        let before = node.children.len();
        node.children.retain(|c| *c != child);
        if node.children.len() == before {
            return false;
        }
        if let Some(child) = self.nodes.get_mut(child) {
            child.parent = None;
        }
        true
    }

    /// Sets the persistence owner of `id` and of every node below it.
    pub fn set_owner(&mut self, id: NodeId, owner: Option<NodeId>) {
        for node in self.descendants(id) {
            self.nodes[node].owner = owner;
        }
    }

    /// Frees `id` and its whole subtree. Handles to any of them become invalid.
    pub fn free(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.nodes.get(id).map(|node| node.parent) else {
            return false;
        };
        if let Some(parent) = parent {
            self.remove_child(parent, id);
        }
        for node in self.descendants(id) {
            self.nodes.remove(node);
        }
        if self.edited_root == Some(id) {
            self.edited_root = None;
        }
        true
    }

    /// Deep-copies `id`. The copy is floating and carries no owner.
    pub fn duplicate(&mut self, id: NodeId) -> Option<NodeId> {
        let mut template = self.nodes.get(id)?.clone();
        let children = std::mem::take(&mut template.children);
        template.owner = None;
        let copy = self.insert(template);
        for child in children {
            let Some(child_copy) = self.duplicate(child) else {
                warn!("skipping stale child {:?} while duplicating {:?}", child, id);
                continue;
            };
            self.nodes[child_copy].parent = Some(copy);
            self.nodes[copy].children.push(child_copy);
        }
        Some(copy)
    }

    /// `id` followed by every node below it, depth first.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let Some(node) = self.nodes.get(next) else {
                continue;
            };
            out.push(next);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    fn is_ancestor(&self, ancestor: NodeId, mut id: NodeId) -> bool {
        while let Some(parent) = self.nodes.get(id).and_then(|node| node.parent) {
            if parent == ancestor {
                return true;
            }
            id = parent;
        }
        false
    }

    pub fn world_transform(&self, id: NodeId) -> Option<Instance> {
        let node = self.nodes.get(id)?;
        match node.parent {
            Some(parent) => Some(&self.world_transform(parent)? * &node.local),
            None => Some(node.local),
        }
    }

    /// Bounds of `id` in its own local space, including every placeable child.
    pub fn local_bounds(&self, id: NodeId) -> Aabb {
        let Some(node) = self.nodes.get(id) else {
            return Aabb::empty();
        };
        let own = match &node.kind {
            NodeKind::Model { bounds, .. } => *bounds,
            NodeKind::GroupProxy { bounds, .. } => *bounds,
            NodeKind::CollisionBody { extents, .. } if node.children.is_empty() => {
                Aabb::centered(*extents * 2.0)
            }
            NodeKind::CollisionBody { .. } | NodeKind::Group => Aabb::empty(),
        };
        node.children.iter().fold(own, |acc, child| {
            let Some(child_node) = self.nodes.get(*child) else {
                return acc;
            };
            acc.merge(&self.local_bounds(*child).transformed(&child_node.local))
        })
    }

    /// Directional margins for multi-child groups; `None` for anything else.
    pub fn group_margins(&self, id: NodeId) -> Option<GroupMargins> {
        let node = self.nodes.get(id)?;
        match &node.kind {
            NodeKind::GroupProxy { margins, .. } => Some(*margins),
            NodeKind::Group if node.children.len() > 1 => {
                Some(GroupMargins::from_bounds(&self.local_bounds(id)))
            }
            _ => None,
        }
    }

    /// Number of model nodes using `mesh` inside the subtree of `root`.
    pub fn count_models(&self, root: NodeId, mesh: MeshId) -> usize {
        self.descendants(root)
            .into_iter()
            .filter(|id| self.nodes[*id].mesh() == Some(mesh))
            .count()
    }
}
