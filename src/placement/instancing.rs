//! Per-mesh instance buffers for optimized placement.
//!
//! Objects placed in optimized mode do not become scene nodes. Their transforms
//! accumulate in one [`InstanceBuffer`] per mesh resource, which is rebuilt into a
//! packed [`InstanceRaw`] array and uploaded to the GPU in a single buffer.
//!
//! Slot indices are stable: clearing a slot leaves a hole rather than shifting
//! later slots, so handles kept by grouped connections and collision bodies stay
//! valid until their own slot is cleared. Indices are never handed out twice for
//! the same mesh, not even after its buffer was dropped and created again.

use std::collections::{HashMap, hash_map::Entry};

use log::{debug, warn};
use wgpu::util::DeviceExt;

use crate::{
    data_structures::{
        aabb::Aabb,
        instance::{Instance, InstanceOptions, InstanceRaw},
        scene_graph::NodeId,
    },
    resources::mesh::MeshId,
};

#[derive(Clone, Debug, PartialEq)]
pub struct InstanceSlot {
    pub transform: Instance,
    pub options: InstanceOptions,
    /// Static body built for this slot, if collisions were enabled on placement.
    pub collision: Option<NodeId>,
}

pub struct InstanceBuffer {
    mesh: MeshId,
    mesh_bounds: Aabb,
    /// Index of `slots[0]`.
    first_slot: usize,
    slots: Vec<Option<InstanceSlot>>,
    raw: Vec<InstanceRaw>,
    revision: u64,
    gpu: Option<wgpu::Buffer>,
    gpu_revision: Option<u64>,
    buffer_size_needs_change: bool,
}

impl InstanceBuffer {
    pub fn new(mesh: MeshId, mesh_bounds: Aabb) -> Self {
        Self::starting_at(mesh, mesh_bounds, 0)
    }

    /// A buffer whose first slot gets index `first_slot`.
    pub fn starting_at(mesh: MeshId, mesh_bounds: Aabb, first_slot: usize) -> Self {
        Self {
            mesh,
            mesh_bounds,
            first_slot,
            slots: Vec::new(),
            raw: Vec::new(),
            revision: 0,
            gpu: None,
            gpu_revision: None,
            buffer_size_needs_change: true,
        }
    }

    pub fn mesh(&self) -> MeshId {
        self.mesh
    }

    pub fn mesh_bounds(&self) -> &Aabb {
        &self.mesh_bounds
    }

    /// Appends a transform and returns its slot index. Call [`InstanceBuffer::update`]
    /// afterwards so the render representation catches up.
    pub fn add_to_buffer(&mut self, transform: Instance, options: InstanceOptions) -> usize {
        let slot = self.next_slot();
        self.slots.push(Some(InstanceSlot {
            transform,
            options,
            collision: None,
        }));
        slot
    }

    /// Index the next appended slot will get.
    pub fn next_slot(&self) -> usize {
        self.first_slot + self.slots.len()
    }

    fn entry(&mut self, slot: usize) -> Option<&mut Option<InstanceSlot>> {
        let index = slot.checked_sub(self.first_slot)?;
        self.slots.get_mut(index)
    }

    /// Overwrites one slot and rebuilds. Returns `false` for unknown or cleared slots.
    pub fn update_buffer(
        &mut self,
        slot: usize,
        transform: Instance,
        options: InstanceOptions,
    ) -> bool {
        let Some(Some(entry)) = self.entry(slot) else {
            warn!("instance slot {} of {:?} does not exist", slot, self.mesh);
            return false;
        };
        entry.transform = transform;
        entry.options = options;
        self.update();
        true
    }

    pub fn set_collision(&mut self, slot: usize, collision: Option<NodeId>) {
        if let Some(Some(entry)) = self.entry(slot) {
            entry.collision = collision;
        }
    }

    /// Clears one slot, returning its content. The index is never reused.
    pub fn clear_slot(&mut self, slot: usize) -> Option<InstanceSlot> {
        let cleared = self.entry(slot)?.take();
        if cleared.is_some() {
            self.update();
        }
        cleared
    }

    /// Rebuilds the packed representation from the live slots.
    pub fn update(&mut self) {
        let live = self.raw.len();
        self.raw = self
            .slots
            .iter()
            .flatten()
            .map(|slot| slot.transform.to_raw())
            .collect();
        if self.raw.len() != live {
            self.buffer_size_needs_change = true;
        }
        self.revision += 1;
    }

    pub fn slot(&self, slot: usize) -> Option<&InstanceSlot> {
        let index = slot.checked_sub(self.first_slot)?;
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn slots(&self) -> impl Iterator<Item = (usize, &InstanceSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|s| (self.first_slot + i, s)))
    }

    pub fn transform(&self, slot: usize) -> Option<cgmath::Matrix4<f32>> {
        self.slot(slot).map(|s| s.transform.to_matrix())
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn raw(&self) -> &[InstanceRaw] {
        &self.raw
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// True when the GPU copy lags behind the last rebuild.
    pub fn needs_upload(&self) -> bool {
        self.gpu_revision != Some(self.revision)
    }

    pub fn gpu_buffer(&self) -> Option<&wgpu::Buffer> {
        self.gpu.as_ref()
    }

    pub fn draw_count(&self) -> u32 {
        self.raw.len() as u32
    }

    /// Uploads the packed instances, recreating the GPU buffer when its size changed.
    pub fn write_to_buffer(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        if !self.needs_upload() {
            return;
        }
        match &self.gpu {
            Some(buffer) if !self.buffer_size_needs_change => {
                queue.write_buffer(buffer, 0, bytemuck::cast_slice(&self.raw));
            }
            _ => {
                self.gpu = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Placement Instance Buffer"),
                    contents: bytemuck::cast_slice(&self.raw),
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                }));
                self.buffer_size_needs_change = false;
            }
        }
        self.gpu_revision = Some(self.revision);
    }
}

/// One member of a group placed in optimized mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroupMember {
    pub mesh: MeshId,
    pub slot: usize,
    /// Member transform relative to the group origin.
    pub local: Instance,
}

/// Links a group proxy to the buffer slots holding its members.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupedConnection {
    pub group: NodeId,
    pub members: Vec<GroupMember>,
}

#[derive(Default)]
pub struct InstanceBufferManager {
    buffers: HashMap<MeshId, InstanceBuffer>,
    connections: HashMap<NodeId, GroupedConnection>,
    /// First free index of meshes whose buffer was dropped.
    retired: HashMap<MeshId, usize>,
}

impl InstanceBufferManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self, mesh: MeshId) -> Option<&InstanceBuffer> {
        self.buffers.get(&mesh)
    }

    pub fn buffer_mut(&mut self, mesh: MeshId) -> Option<&mut InstanceBuffer> {
        self.buffers.get_mut(&mesh)
    }

    /// Starts a fresh buffer for `mesh`, replacing any existing one. Slot indices
    /// continue after the ones handed out before.
    pub fn create_buffer(&mut self, mesh: MeshId, bounds: Aabb) -> &mut InstanceBuffer {
        debug!("creating instance buffer for {:?}", mesh);
        let first_slot = match self.buffers.get(&mesh) {
            Some(existing) => existing.next_slot(),
            None => self.retired.get(&mesh).copied().unwrap_or(0),
        };
        self.forget_mesh(mesh);
        let buffer = InstanceBuffer::starting_at(mesh, bounds, first_slot);
        match self.buffers.entry(mesh) {
            Entry::Occupied(mut entry) => {
                entry.insert(buffer);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(buffer),
        }
    }

    pub fn buffer_or_create(&mut self, mesh: MeshId, bounds: Aabb) -> &mut InstanceBuffer {
        let first_slot = self.retired.get(&mesh).copied().unwrap_or(0);
        self.buffers.entry(mesh).or_insert_with(|| {
            debug!("creating instance buffer for {:?}", mesh);
            InstanceBuffer::starting_at(mesh, bounds, first_slot)
        })
    }

    /// Drops the buffer of `mesh`, remembering where its slot indices stopped.
    fn retire(&mut self, mesh: MeshId) -> Option<InstanceBuffer> {
        let buffer = self.buffers.remove(&mesh)?;
        self.retired.insert(mesh, buffer.next_slot());
        Some(buffer)
    }

    fn forget_mesh(&mut self, mesh: MeshId) {
        self.connections.retain(|_, connection| {
            connection.members.retain(|m| m.mesh != mesh);
            !connection.members.is_empty()
        });
    }

    /// Removes the member that lives in `(mesh, slot)` from its connection and
    /// drops connections left without members.
    fn forget_member(&mut self, mesh: MeshId, slot: usize) {
        self.connections.retain(|group, connection| {
            connection
                .members
                .retain(|m| !(m.mesh == mesh && m.slot == slot));
            if connection.members.is_empty() {
                debug!("grouped connection of {:?} has no members left", group);
            }
            !connection.members.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn buffers(&self) -> impl Iterator<Item = &InstanceBuffer> {
        self.buffers.values()
    }

    pub fn buffers_mut(&mut self) -> impl Iterator<Item = &mut InstanceBuffer> {
        self.buffers.values_mut()
    }

    /// Clears one slot and takes it out of any grouped connection. Drops the whole
    /// buffer once no live slot remains.
    pub fn clear_slot(&mut self, mesh: MeshId, slot: usize) -> Option<InstanceSlot> {
        let buffer = self.buffers.get_mut(&mesh)?;
        let cleared = buffer.clear_slot(slot);
        let empty = buffer.live_count() == 0;
        if cleared.is_some() {
            self.forget_member(mesh, slot);
        }
        if empty {
            debug!("instance buffer for {:?} is empty, dropping it", mesh);
            self.retire(mesh);
        }
        cleared
    }

    /// Frees every slot of `mesh` and drops its buffer. Returns the freed slots.
    pub fn clear(&mut self, mesh: MeshId) -> Vec<InstanceSlot> {
        let Some(buffer) = self.retire(mesh) else {
            return Vec::new();
        };
        self.forget_mesh(mesh);
        buffer.slots.into_iter().flatten().collect()
    }

    pub fn clear_all(&mut self) {
        let meshes: Vec<MeshId> = self.buffers.keys().copied().collect();
        for mesh in meshes {
            self.retire(mesh);
        }
        self.connections.clear();
    }

    /// Collision bodies attached to any live slot.
    pub fn collision_nodes(&self) -> Vec<NodeId> {
        self.buffers
            .values()
            .flat_map(|buffer| buffer.slots().filter_map(|(_, slot)| slot.collision))
            .collect()
    }

    pub fn connect_group(&mut self, group: NodeId, members: Vec<GroupMember>) {
        self.connections
            .insert(group, GroupedConnection { group, members });
    }

    pub fn connection(&self, group: NodeId) -> Option<&GroupedConnection> {
        self.connections.get(&group)
    }

    pub fn connections(&self) -> impl Iterator<Item = &GroupedConnection> {
        self.connections.values()
    }

    /// Rewrites every member slot of `group` for a new group transform.
    pub fn propagate_group(&mut self, group: NodeId, transform: &Instance) -> bool {
        let Some(connection) = self.connections.get(&group) else {
            warn!("{:?} has no grouped connection", group);
            return false;
        };
        let mut all_updated = true;
        for member in &connection.members {
            let Some(buffer) = self.buffers.get_mut(&member.mesh) else {
                warn!("instance buffer for {:?} is gone", member.mesh);
                all_updated = false;
                continue;
            };
            let Some(options) = buffer.slot(member.slot).map(|s| s.options) else {
                all_updated = false;
                continue;
            };
            all_updated &= buffer.update_buffer(member.slot, transform * &member.local, options);
        }
        all_updated
    }

    /// Edits one member of `group`: its transform relative to the group and its options.
    pub fn update_group_member(
        &mut self,
        group: NodeId,
        group_transform: &Instance,
        index: usize,
        local: Instance,
        options: InstanceOptions,
    ) -> bool {
        let Some(member) = self
            .connections
            .get_mut(&group)
            .and_then(|c| c.members.get_mut(index))
        else {
            warn!("{:?} has no member {}", group, index);
            return false;
        };
        member.local = local;
        let (mesh, slot) = (member.mesh, member.slot);
        match self.buffers.get_mut(&mesh) {
            Some(buffer) => buffer.update_buffer(slot, group_transform * &local, options),
            None => false,
        }
    }

    /// Removes the connection of `group` and clears all of its member slots.
    pub fn disconnect_group(&mut self, group: NodeId) -> Vec<InstanceSlot> {
        let Some(connection) = self.connections.remove(&group) else {
            return Vec::new();
        };
        connection
            .members
            .iter()
            .filter_map(|member| self.clear_slot(member.mesh, member.slot))
            .collect()
    }
}
