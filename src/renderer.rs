//! Rendering boundary. The core hands each viewport's camera, layer mask and
//! material override to a [`RenderBackend`]; shader and material binding live
//! behind the backend.

#[cfg(feature = "gpu")]
mod wgpu_backend;

#[cfg(feature = "gpu")]
pub use wgpu_backend::WgpuBackend;

use crate::ecs::{CameraComponent, MeshRender, WorldTransform};
use crate::layers::{layers_of, Layers};
use crate::registry::Registry;
use crate::viewport::ViewportComponent;
use anyhow::{Context, Result};
use bevy_ecs::prelude::*;
use glam::Mat4;
use std::sync::{Arc, Mutex};
use winit::dpi::PhysicalSize;

/// Recoverable per-frame render failure (the "shader error" kind). The frame
/// driver records it and keeps running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RenderError {
    pub message: String,
    pub detail: Option<String>,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), detail: None }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    Pbr,
    Simple,
    ObjectId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub shader: ShaderKind,
    pub color: [f32; 4],
}

impl Material {
    pub fn pbr(name: impl Into<String>, color: [f32; 4]) -> Self {
        Self { name: name.into(), shader: ShaderKind::Pbr, color }
    }

    pub fn simple(name: impl Into<String>, color: [f32; 4]) -> Self {
        Self { name: name.into(), shader: ShaderKind::Simple, color }
    }

    pub fn object_id() -> Self {
        Self { name: "ObjectID".into(), shader: ShaderKind::ObjectId, color: [0.0, 0.0, 0.0, 1.0] }
    }
}

#[derive(Debug, Clone)]
pub struct DrawItem {
    pub entity: Entity,
    pub model: Mat4,
    pub mesh: String,
    pub material: Option<Arc<Material>>,
    /// Entity index packed for the object-id pass.
    pub object_id: u32,
}

#[derive(Debug)]
pub struct ViewportRenderRequest<'a> {
    pub viewport: Entity,
    pub size: PhysicalSize<u32>,
    pub view_projection: Mat4,
    pub visible_layers: Layers,
    pub material_override: Option<&'a Arc<Material>>,
    pub background: [f32; 4],
    pub post_process_effects: Vec<&'static str>,
    pub draws: &'a [DrawItem],
}

pub trait RenderBackend {
    fn label(&self) -> &str;

    fn begin_frame(&mut self) {}

    fn render_shadow_maps(&mut self, _casters: &[DrawItem]) -> Result<(), RenderError> {
        Ok(())
    }

    fn render_viewport(&mut self, request: &ViewportRenderRequest<'_>) -> Result<(), RenderError>;

    /// Shows the focused viewport's image on screen.
    fn present(&mut self, focused: Option<Entity>) -> Result<()>;

    fn resize(&mut self, _size: PhysicalSize<u32>) {}

    fn clear_shader_cache(&mut self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedViewport {
    pub viewport: Entity,
    pub size: PhysicalSize<u32>,
    pub draws: Vec<Entity>,
    pub material: Option<String>,
}

/// What the [`NullBackend`] has been asked to do; shared so callers can keep a
/// handle after boxing the backend into the registry.
#[derive(Debug, Default)]
pub struct RenderLog {
    pub frames: u64,
    pub shadow_casters: usize,
    pub last_frame: Vec<RenderedViewport>,
    pub presents: u64,
    pub last_presented: Option<Entity>,
    pub shader_cache_clears: u64,
}

/// Backend that draws nothing. Used headless and in tests.
#[derive(Debug, Default)]
pub struct NullBackend {
    log: Arc<Mutex<RenderLog>>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Arc<Mutex<RenderLog>> {
        self.log.clone()
    }

    fn with_log(&self, f: impl FnOnce(&mut RenderLog)) {
        let mut log = self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut log);
    }
}

impl RenderBackend for NullBackend {
    fn label(&self) -> &str {
        "null"
    }

    fn begin_frame(&mut self) {
        self.with_log(|log| {
            log.frames += 1;
            log.last_frame.clear();
        });
    }

    fn render_shadow_maps(&mut self, casters: &[DrawItem]) -> Result<(), RenderError> {
        self.with_log(|log| log.shadow_casters = casters.len());
        Ok(())
    }

    fn render_viewport(&mut self, request: &ViewportRenderRequest<'_>) -> Result<(), RenderError> {
        let rendered = RenderedViewport {
            viewport: request.viewport,
            size: request.size,
            draws: request.draws.iter().map(|draw| draw.entity).collect(),
            material: request.material_override.map(|material| material.name.clone()),
        };
        self.with_log(|log| log.last_frame.push(rendered));
        Ok(())
    }

    fn present(&mut self, focused: Option<Entity>) -> Result<()> {
        self.with_log(|log| {
            log.presents += 1;
            log.last_presented = focused;
        });
        Ok(())
    }

    fn clear_shader_cache(&mut self) {
        self.with_log(|log| log.shader_cache_clears += 1);
    }
}

fn collect_draws(world: &mut World) -> Vec<(DrawItem, Layers)> {
    let mut query = world.query::<(Entity, &MeshRender, Option<&WorldTransform>)>();
    let mut draws: Vec<(DrawItem, Layers)> = query
        .iter(world)
        .map(|(entity, mesh, transform)| {
            let draw = DrawItem {
                entity,
                model: transform.map_or(Mat4::IDENTITY, |t| t.0),
                mesh: mesh.mesh.clone(),
                material: mesh.material.clone(),
                object_id: entity.index(),
            };
            (draw, Layers::empty())
        })
        .collect();
    for (draw, layers) in &mut draws {
        *layers = layers_of(world, draw.entity);
    }
    draws.sort_by_key(|(draw, _)| draw.entity);
    draws
}

/// Render-stage system: shadow maps for every drawable outside NO_SHADOW.
pub fn render_shadowmaps(registry: &mut Registry) -> Result<()> {
    registry.renderer.begin_frame();
    let casters: Vec<DrawItem> = collect_draws(&mut registry.world)
        .into_iter()
        .filter(|(_, layers)| !layers.contains(Layers::NO_SHADOW))
        .map(|(draw, _)| draw)
        .collect();
    registry.renderer.render_shadow_maps(&casters).context("Shadow map pass failed")?;
    Ok(())
}

/// Render-stage system: every enabled viewport in render order, each culled by
/// its visible-layer mask.
pub fn render_viewports(registry: &mut Registry) -> Result<()> {
    let draws = collect_draws(&mut registry.world);
    let order = registry.viewports.render_order.clone();
    for viewport_entity in order {
        let Some(viewport) = registry.world.get::<ViewportComponent>(viewport_entity) else {
            continue;
        };
        if !viewport.enabled {
            continue;
        }
        let Some(camera) = registry.world.get::<CameraComponent>(viewport.camera) else {
            log::debug!("[render] viewport {viewport_entity:?} skipped, camera entity is gone");
            continue;
        };
        let size = viewport.size();
        let visible: Vec<DrawItem> = draws
            .iter()
            .filter(|(_, layers)| layers.intersects(viewport.visible_layers))
            .map(|(draw, _)| draw.clone())
            .collect();
        let request = ViewportRenderRequest {
            viewport: viewport_entity,
            size,
            view_projection: camera.camera().view_projection(size),
            visible_layers: viewport.visible_layers,
            material_override: viewport.material_override.as_ref(),
            background: viewport.background,
            post_process_effects: viewport.post_process_effects.keys().copied().collect(),
            draws: &visible,
        };
        registry
            .renderer
            .render_viewport(&request)
            .with_context(|| format!("Rendering viewport {viewport_entity:?} failed"))?;
    }
    Ok(())
}
