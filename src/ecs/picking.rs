use super::types::{CameraComponent, WorldBounds};
use crate::layers::layers_of;
use crate::registry::Registry;
use crate::selection::{dehover_all, set_hovered, SelectionBehavior};
use crate::viewport::{cursor_in_viewport, ViewportComponent};
use anyhow::Result;
use bevy_ecs::prelude::*;
use glam::{Vec2, Vec3};

pub fn ray_aabb_intersection(origin: Vec3, dir: Vec3, min: Vec3, max: Vec3) -> Option<(f32, Vec3)> {
    let mut t_min: f32 = 0.0;
    let mut t_max: f32 = f32::INFINITY;
    for axis in 0..3 {
        let o = origin[axis];
        let d = dir[axis];
        if d.abs() < 1e-6 {
            if o < min[axis] || o > max[axis] {
                return None;
            }
            continue;
        }
        let inv_d = 1.0 / d;
        let mut t1 = (min[axis] - o) * inv_d;
        let mut t2 = (max[axis] - o) * inv_d;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        t_min = t_min.max(t1);
        t_max = t_max.min(t2);
        if t_min > t_max {
            return None;
        }
    }
    if t_max < 0.0 {
        return None;
    }
    let t_hit = if t_min >= 0.0 { t_min } else { t_max };
    Some((t_hit, origin + dir * t_hit))
}

/// Nearest entity whose world bounds are hit by the ray through `cursor` in
/// `viewport`, restricted to the viewport's visible layers.
pub fn pick_entity(registry: &mut Registry, viewport: Entity, cursor: Vec2) -> Option<Entity> {
    let world = &mut registry.world;
    let component = world.get::<ViewportComponent>(viewport)?;
    let size = component.size();
    let visible = component.visible_layers;
    let camera = world.get::<CameraComponent>(component.camera)?.camera();
    let (origin, dir) = camera.screen_ray(cursor, size)?;

    let mut candidates = world.query::<(Entity, &WorldBounds)>();
    let hits: Vec<(Entity, f32)> = candidates
        .iter(world)
        .filter_map(|(entity, bounds)| {
            ray_aabb_intersection(origin, dir, bounds.0.min, bounds.0.max).map(|(t, _)| (entity, t))
        })
        .collect();
    hits.into_iter()
        .filter(|(entity, _)| layers_of(world, *entity).intersects(visible))
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
        .map(|(entity, _)| entity)
}

/// Interface system: hover follows the entity under the cursor in the focused
/// viewport. Nothing under the cursor, or a cursor outside the viewport, clears
/// the hover set.
pub fn update_mesh_hovered(registry: &mut Registry) -> Result<()> {
    let Some(focused) = registry.viewports.focused else {
        return Ok(());
    };
    if !registry.input.cursor_known() {
        return Ok(());
    }
    let cursor = registry.input.mouse_position;
    if !registry.input.cursor_in_window() || !cursor_in_viewport(registry, focused, cursor) {
        dehover_all(registry);
        return Ok(());
    }
    match pick_entity(registry, focused, cursor) {
        Some(hit) => {
            set_hovered(registry, hit, SelectionBehavior::Set);
        }
        None => {
            dehover_all(registry);
        }
    }
    Ok(())
}
