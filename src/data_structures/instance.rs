//! Instance transformation data for placement and GPU instancing.
//!
//! Every placed object carries an [`Instance`] (position, rotation, scale). Objects
//! placed in optimized mode never become scene nodes; their instance is packed into
//! an [`InstanceRaw`] and written to the per-mesh instance buffer instead.

use std::ops::Mul;

use cgmath::{Deg, Euler, One, SquareMatrix};

use crate::collision::CollisionOverride;

/// Per-instance transformation: position, rotation (as quaternion), and scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instance {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Instance {
    /// Create a new instance with identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            // `Quaternion::one()` is the identity quaternion (no rotation)
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Builds an instance from the editor-facing representation where rotation is
    /// given as euler angles in degrees.
    pub fn from_euler_degrees(
        position: cgmath::Vector3<f32>,
        rotation: cgmath::Vector3<f32>,
        scale: cgmath::Vector3<f32>,
    ) -> Self {
        let euler = Euler::new(Deg(rotation.x), Deg(rotation.y), Deg(rotation.z));
        Self {
            position,
            rotation: euler.into(),
            scale,
        }
    }

    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    pub fn to_raw(&self) -> InstanceRaw {
        let world_matrix = self.to_matrix();
        let handedness = world_matrix.determinant().signum();
        InstanceRaw {
            model: world_matrix.into(),
            normal: cgmath::Matrix3::from(self.rotation).into(),
            handedness,
        }
    }
}

/// The editor-facing transform of a placement: origin, euler rotation in degrees
/// and scale. This is what waypoints store and what spawn requests carry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub origin: cgmath::Vector3<f32>,
    pub rotation: cgmath::Vector3<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Transform {
    pub fn at(origin: cgmath::Vector3<f32>) -> Self {
        Self {
            origin,
            ..Default::default()
        }
    }

    pub fn to_instance(&self) -> Instance {
        Instance::from_euler_degrees(self.origin, self.rotation, self.scale)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            origin: cgmath::Vector3::new(0.0, 0.0, 0.0),
            rotation: cgmath::Vector3::new(0.0, 0.0, 0.0),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Mul<Instance> for Instance {
    type Output = Self;

    fn mul(self, rhs: Instance) -> Self::Output {
        &self * &rhs
    }
}

/// Parent-child composition: `parent * local` yields the child's world transform.
impl<'a, 'b> Mul<&'b Instance> for &'a Instance {
    type Output = Instance;

    fn mul(self, rhs: &'b Instance) -> Self::Output {
        let new_rotation = self.rotation * rhs.rotation;

        let new_scale = cgmath::Vector3::new(
            self.scale.x * rhs.scale.x,
            self.scale.y * rhs.scale.y,
            self.scale.z * rhs.scale.z,
        );
        let scaled_rhs_pos = cgmath::Vector3::new(
            self.scale.x * rhs.position.x,
            self.scale.y * rhs.position.y,
            self.scale.z * rhs.position.z,
        );
        let new_position = self.position + (self.rotation * scaled_rhs_pos);

        Instance {
            position: new_position,
            rotation: new_rotation,
            scale: new_scale,
        }
    }
}

impl From<cgmath::Vector3<f32>> for Instance {
    fn from(position: cgmath::Vector3<f32>) -> Self {
        Instance {
            position,
            ..Default::default()
        }
    }
}

impl From<Transform> for Instance {
    fn from(transform: Transform) -> Self {
        transform.to_instance()
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed per-instance options: collision override, LOD range and snap layer.
///
/// Every placeable node carries one, and each instance buffer slot keeps the
/// options of the object it was created from.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InstanceOptions {
    pub collision: CollisionOverride,
    /// Visibility range end in world units; `None` draws at any distance.
    pub lod: Option<f32>,
    pub snap_layer: i32,
}

impl InstanceOptions {
    pub fn on_layer(snap_layer: i32) -> Self {
        Self {
            snap_layer,
            ..Default::default()
        }
    }
}

/**
 * The raw instance is the actual data stored on the GPU
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    model: [[f32; 4]; 4],
    normal: [[f32; 3]; 3],
    handedness: f32,
}

impl InstanceRaw {
    pub fn model(&self) -> cgmath::Matrix4<f32> {
        self.model.into()
    }

    /**
     * Stride layout here: the model matrix as four vec4 slots followed by the
     * normal matrix as three vec3 slots and the handedness scalar.
     */
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            // shaders only advance to the next instance when a new instance starts
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 5,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    shader_location: 6,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 7,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 12]>() as wgpu::BufferAddress,
                    shader_location: 8,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 16]>() as wgpu::BufferAddress,
                    shader_location: 9,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 19]>() as wgpu::BufferAddress,
                    shader_location: 10,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 22]>() as wgpu::BufferAddress,
                    shader_location: 11,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 25]>() as wgpu::BufferAddress,
                    shader_location: 12,
                    format: wgpu::VertexFormat::Float32,
                },
            ],
        }
    }
}
