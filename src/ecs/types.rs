use crate::camera3d::{Camera3D, OrbitCamera};
use crate::renderer::Material;
use bevy_ecs::prelude::*;
use glam::{Mat4, Quat, Vec3};
use smallvec::SmallVec;
use std::sync::Arc;

#[derive(Component, Debug, Clone, PartialEq, Eq)]
pub struct Name(pub String);

#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self { translation: Vec3::ZERO, rotation: Quat::IDENTITY, scale: Vec3::ONE }
    }
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self { translation, ..Self::default() }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct WorldTransform(pub Mat4);

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parent(pub Entity);

#[derive(Component, Debug, Clone, Default)]
pub struct Children(pub SmallVec<[Entity; 8]>);

/// Mesh reference plus its base material. Mesh data itself lives with the
/// render backend; the core only needs the key and local bounds.
#[derive(Component, Debug, Clone)]
pub struct MeshRender {
    pub mesh: String,
    pub material: Option<Arc<Material>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self { min: Vec3::splat(f32::INFINITY), max: Vec3::splat(f32::NEG_INFINITY) }
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Radius of the bounding sphere around [`Aabb::center`].
    pub fn radius(&self) -> f32 {
        (self.max - self.min).length() * 0.5
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb { min: self.min.min(other.min), max: self.max.max(other.max) }
    }

    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let mut out = Aabb::empty();
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let p = matrix.transform_point3(corner);
            out.min = out.min.min(p);
            out.max = out.max.max(p);
        }
        out
    }
}

/// Local-space bounds of the mesh.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct MeshBounds(pub Aabb);

#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds(pub Aabb);

/// Mesh data changed this frame; cleared in the Post stage.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct MeshDataDirty;

#[derive(Component, Debug, Clone)]
pub struct CameraComponent {
    pub orbit: OrbitCamera,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraComponent {
    fn default() -> Self {
        Self { orbit: OrbitCamera::new(Vec3::ZERO, 5.0), fov_y_radians: 45.0_f32.to_radians(), near: 0.01, far: 1000.0 }
    }
}

impl CameraComponent {
    pub fn camera(&self) -> Camera3D {
        self.orbit.to_camera(self.fov_y_radians, self.near, self.far)
    }
}
