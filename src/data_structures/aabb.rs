//! Axis-aligned bounding boxes in node-local space.

use cgmath::{ElementWise, Vector3, Zero};

use crate::data_structures::instance::Instance;

/// An axis-aligned box given by its minimum corner and its size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub position: Vector3<f32>,
    pub size: Vector3<f32>,
}

impl Aabb {
    pub fn new(position: Vector3<f32>, size: Vector3<f32>) -> Self {
        Self { position, size }
    }

    /// A box of the given size centered on the local origin.
    pub fn centered(size: Vector3<f32>) -> Self {
        Self {
            position: size * -0.5,
            size,
        }
    }

    pub fn empty() -> Self {
        Self {
            position: Vector3::zero(),
            size: Vector3::zero(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size.x <= 0.0 && self.size.y <= 0.0 && self.size.z <= 0.0
    }

    pub fn min(&self) -> Vector3<f32> {
        self.position
    }

    pub fn max(&self) -> Vector3<f32> {
        self.position + self.size
    }

    pub fn center(&self) -> Vector3<f32> {
        self.position + self.size * 0.5
    }

    pub fn half_extents(&self) -> Vector3<f32> {
        self.size * 0.5
    }

    /// Half extents after a per-axis scale, as used for neighbour footprints.
    pub fn scaled_half_extents(&self, scale: Vector3<f32>) -> Vector3<f32> {
        self.size.mul_element_wise(scale) * 0.5
    }

    /// Smallest box containing both `self` and `other`. Empty boxes are ignored.
    pub fn merge(&self, other: &Aabb) -> Aabb {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let (a_min, a_max) = (self.min(), self.max());
        let (b_min, b_max) = (other.min(), other.max());
        let min = Vector3::new(
            a_min.x.min(b_min.x),
            a_min.y.min(b_min.y),
            a_min.z.min(b_min.z),
        );
        let max = Vector3::new(
            a_max.x.max(b_max.x),
            a_max.y.max(b_max.y),
            a_max.z.max(b_max.z),
        );
        Aabb::new(min, max - min)
    }

    /// Bounds of this box after applying `transform`, computed from all eight corners.
    pub fn transformed(&self, transform: &Instance) -> Aabb {
        if self.is_empty() {
            return Aabb::new(transform.position, Vector3::zero());
        }
        let matrix = transform.to_matrix();
        let (lo, hi) = (self.min(), self.max());
        let mut min = Vector3::new(f32::MAX, f32::MAX, f32::MAX);
        let mut max = Vector3::new(f32::MIN, f32::MIN, f32::MIN);
        for i in 0..8 {
            let corner = Vector3::new(
                if i & 1 == 0 { lo.x } else { hi.x },
                if i & 2 == 0 { lo.y } else { hi.y },
                if i & 4 == 0 { lo.z } else { hi.z },
            );
            let p = (matrix * corner.extend(1.0)).truncate();
            min = Vector3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
            max = Vector3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
        }
        Aabb::new(min, max - min)
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}
