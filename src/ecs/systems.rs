use super::types::*;
use crate::input::{ACTION_CAMERA_FOCUS, ACTION_CAMERA_PAN, ACTION_CAMERA_ROTATE, CONTEXT_VIEWPORT};
use crate::registry::Registry;
use crate::selection::Selected;
use anyhow::Result;
use bevy_ecs::prelude::*;
use glam::Mat4;
use smallvec::SmallVec;
use std::collections::HashSet;

const ORBIT_SPEED: f32 = 0.01;
const WHEEL_ZOOM_STEP: f32 = 0.1;

/// Composes `WorldTransform` down the `Parent`/`Children` hierarchy. Each node
/// is visited once even when the hierarchy has a cycle.
pub fn update_transform_hierarchy(registry: &mut Registry) -> Result<()> {
    let world = &mut registry.world;
    let missing: Vec<Entity> =
        world.query_filtered::<Entity, (With<Transform>, Without<WorldTransform>)>().iter(world).collect();
    for entity in missing {
        world.entity_mut(entity).insert(WorldTransform::default());
    }

    let mut stack: SmallVec<[(Entity, Mat4); 64]> = world
        .query_filtered::<Entity, (With<Transform>, Without<Parent>)>()
        .iter(world)
        .map(|root| (root, Mat4::IDENTITY))
        .collect();
    let mut visited = HashSet::new();
    while let Some((entity, parent_world)) = stack.pop() {
        if !visited.insert(entity) {
            continue;
        }
        let Some(local) = world.get::<Transform>(entity).map(Transform::matrix) else {
            continue;
        };
        let world_mat = parent_world * local;
        if let Some(mut world_transform) = world.get_mut::<WorldTransform>(entity) {
            world_transform.0 = world_mat;
        }
        if let Some(children) = world.get::<Children>(entity) {
            for &child in children.0.iter().rev() {
                stack.push((child, world_mat));
            }
        }
    }
    Ok(())
}

/// Recomputes `WorldBounds` from local mesh bounds and the world transform.
pub fn update_mesh_bounds(registry: &mut Registry) -> Result<()> {
    let world = &mut registry.world;
    let updates: Vec<(Entity, Aabb)> = world
        .query::<(Entity, &MeshBounds, Option<&WorldTransform>)>()
        .iter(world)
        .map(|(entity, bounds, transform)| {
            let matrix = transform.map_or(Mat4::IDENTITY, |t| t.0);
            (entity, bounds.0.transformed(&matrix))
        })
        .collect();
    for (entity, bounds) in updates {
        world.entity_mut(entity).insert(WorldBounds(bounds));
    }
    Ok(())
}

pub fn update_scene_bounds(registry: &mut Registry) -> Result<()> {
    let world = &mut registry.world;
    let bounds = world
        .query::<&WorldBounds>()
        .iter(world)
        .fold(Aabb::empty(), |acc, bounds| acc.union(&bounds.0));
    registry.scene_bounds = (!bounds.is_empty()).then_some(bounds);
    Ok(())
}

/// Orbit on the rotate action, pan on the pan action, dolly on the wheel. Only
/// the focused viewport's camera moves.
pub fn camera_controller(registry: &mut Registry) -> Result<()> {
    let Some(camera_entity) = registry.focused_camera() else {
        return Ok(());
    };
    let input = &mut registry.input;
    let rotate = input.keybinds.is_down(ACTION_CAMERA_ROTATE);
    let pan = input.keybinds.is_down(ACTION_CAMERA_PAN);
    let delta = input.mouse_delta;
    let wheel = if input.context == CONTEXT_VIEWPORT { input.consume_wheel_delta() } else { None };

    let Some(mut camera) = registry.world.get_mut::<CameraComponent>(camera_entity) else {
        return Ok(());
    };
    if rotate && delta != glam::Vec2::ZERO {
        camera.orbit.orbit(-delta * ORBIT_SPEED);
    } else if pan && delta != glam::Vec2::ZERO {
        let fov = camera.fov_y_radians;
        camera.orbit.pan(delta, fov);
    }
    if let Some(wheel) = wheel {
        camera.orbit.zoom((1.0 - wheel * WHEEL_ZOOM_STEP).clamp(0.5, 1.5));
    }
    Ok(())
}

/// On the focus action, frames the selection, or the whole scene when nothing
/// is selected.
pub fn camera_focus_fit(registry: &mut Registry) -> Result<()> {
    if !registry.input.keybinds.is_pressed(ACTION_CAMERA_FOCUS) {
        return Ok(());
    }
    let Some(camera_entity) = registry.focused_camera() else {
        return Ok(());
    };
    let world = &mut registry.world;
    let selected = world
        .query_filtered::<&WorldBounds, With<Selected>>()
        .iter(world)
        .fold(Aabb::empty(), |acc, bounds| acc.union(&bounds.0));
    let Some(target) = (!selected.is_empty()).then_some(selected).or(registry.scene_bounds) else {
        return Ok(());
    };
    if let Some(mut camera) = world.get_mut::<CameraComponent>(camera_entity) {
        let fov = camera.fov_y_radians;
        camera.orbit.fit(&target, fov);
        log::debug!("[camera] focused on bounds centred at {}", target.center());
    }
    Ok(())
}

/// Post system: per-frame dirty markers do not survive the frame.
pub fn clear_dirty_flags(registry: &mut Registry) -> Result<()> {
    let world = &mut registry.world;
    let dirty: Vec<Entity> = world.query_filtered::<Entity, With<MeshDataDirty>>().iter(world).collect();
    for entity in dirty {
        world.entity_mut(entity).remove::<MeshDataDirty>();
    }
    Ok(())
}
