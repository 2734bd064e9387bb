use slotmap::SlotMap;

use crate::data_structures::aabb::Aabb;

slotmap::new_key_type! {
    /// Identity of a mesh resource. Two nodes share a mesh exactly when their ids
    /// are equal, regardless of whether the underlying geometry happens to match.
    pub struct MeshId;
}

/// A mesh resource as the placement core sees it: a name and local bounds.
#[derive(Clone, Debug)]
pub struct Mesh {
    pub name: String,
    pub bounds: Aabb,
}

/// Owns every mesh resource known to the editing session.
#[derive(Default)]
pub struct MeshLibrary {
    meshes: SlotMap<MeshId, Mesh>,
}

impl MeshLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, bounds: Aabb) -> MeshId {
        self.meshes.insert(Mesh {
            name: name.into(),
            bounds,
        })
    }

    pub fn get(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id)
    }

    pub fn remove(&mut self, id: MeshId) -> Option<Mesh> {
        self.meshes.remove(id)
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MeshId, &Mesh)> {
        self.meshes.iter()
    }
}
