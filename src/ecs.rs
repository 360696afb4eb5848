//! Scene components, the simulation systems that maintain them, and helpers for
//! populating a scene.

pub mod picking;
pub mod systems;
pub mod types;

pub use picking::{pick_entity, ray_aabb_intersection, update_mesh_hovered};
pub use systems::{
    camera_controller, camera_focus_fit, clear_dirty_flags, update_mesh_bounds, update_scene_bounds,
    update_transform_hierarchy,
};
pub use types::*;

use crate::camera3d::OrbitCamera;
use crate::registry::Registry;
use crate::renderer::Material;
use crate::viewport::ViewportComponent;
use bevy_ecs::prelude::*;
use glam::Vec3;
use std::sync::Arc;

pub fn add_camera(registry: &mut Registry, target: Vec3, radius: f32) -> Entity {
    let camera = CameraComponent { orbit: OrbitCamera::new(target, radius), ..CameraComponent::default() };
    registry.world.spawn((Name("Camera".into()), camera)).id()
}

/// Spawns a renderable mesh entity. The mesh is marked dirty for this frame.
pub fn add_mesh(
    registry: &mut Registry,
    name: &str,
    mesh: &str,
    bounds: Aabb,
    transform: Transform,
    material: Option<Arc<Material>>,
) -> Entity {
    registry
        .world
        .spawn((
            Name(name.to_string()),
            transform,
            MeshRender { mesh: mesh.to_string(), material },
            MeshBounds(bounds),
            MeshDataDirty,
        ))
        .id()
}

/// Destroys every mesh entity. Cameras and viewports survive. Returns how many
/// entities were removed.
pub fn clear_scene(registry: &mut Registry) -> usize {
    let world = &mut registry.world;
    let meshes: Vec<Entity> = world
        .query_filtered::<Entity, (Or<(With<MeshRender>, With<MeshBounds>)>, Without<ViewportComponent>)>()
        .iter(world)
        .collect();
    let count = meshes.len();
    for entity in meshes {
        registry.destroy_entity(entity);
    }
    registry.scene_bounds = None;
    count
}
