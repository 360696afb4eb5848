//! Viewports: camera + render target + visible-layer mask. The main, focused,
//! selection-mask and object-id roles are registry slots, not component tags.

use crate::layers::Layers;
use crate::registry::Registry;
use crate::renderer::Material;
use crate::selection::ElementType;
use anyhow::Result;
use bevy_ecs::prelude::*;
use glam::Vec2;
use std::collections::BTreeMap;
use std::sync::Arc;
use winit::dpi::PhysicalSize;

pub const SELECTION_OUTLINE: &str = "SelectionOutline";

const SELECTION_MASK_COLOR: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const DEFAULT_BACKGROUND: [f32; 4] = [0.1, 0.1, 0.12, 1.0];

#[derive(Debug, Clone, PartialEq)]
pub struct PostProcessEffect {
    /// Viewport whose output the effect samples.
    pub source: Option<Entity>,
    pub color: [f32; 4],
}

#[derive(Component, Debug, Clone)]
pub struct ViewportComponent {
    /// Not owned: the camera may be destroyed independently.
    pub camera: Entity,
    pub visible_layers: Layers,
    pub width: u32,
    pub height: u32,
    pub material_override: Option<Arc<Material>>,
    pub enabled: bool,
    pub post_process_effects: BTreeMap<&'static str, PostProcessEffect>,
    pub background: [f32; 4],
}

impl ViewportComponent {
    pub fn new(camera: Entity, width: u32, height: u32) -> Self {
        Self {
            camera,
            visible_layers: Layers::all(),
            width,
            height,
            material_override: None,
            enabled: true,
            post_process_effects: BTreeMap::new(),
            background: DEFAULT_BACKGROUND,
        }
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewportSlots {
    pub main: Option<Entity>,
    pub focused: Option<Entity>,
    pub selection: Option<Entity>,
    pub object_id: Option<Entity>,
    /// Derived every frame by [`update_render_order`].
    pub render_order: Vec<Entity>,
}

impl ViewportSlots {
    /// Sort rank: selection mask first, then the focused viewport, then the rest.
    pub fn rank(&self, viewport: Entity) -> u8 {
        if self.selection == Some(viewport) {
            0
        } else if self.focused == Some(viewport) {
            1
        } else {
            2
        }
    }

    pub fn sort(&self, viewports: &mut [Entity]) {
        viewports.sort_by_key(|&viewport| (self.rank(viewport), viewport));
    }
}

/// Creates a viewport onto `camera` sized to the window. Flagging it main
/// replaces any previous main viewport, which stays alive as a plain viewport.
pub fn add_viewport(registry: &mut Registry, camera: Entity, is_main: bool) -> Entity {
    let size = registry.window_size;
    let viewport = registry.world.spawn(ViewportComponent::new(camera, size.width, size.height)).id();
    if is_main {
        if let Some(previous) = registry.viewports.main.replace(viewport) {
            log::info!("[viewport] main viewport {previous:?} replaced by {viewport:?}");
            if registry.viewports.focused == Some(previous) {
                registry.viewports.focused = None;
            }
        }
    }
    if is_main || registry.viewports.focused.is_none() {
        registry.viewports.focused = Some(viewport);
    }
    update_render_order(registry);
    viewport
}

/// Selection-mask viewport: renders only the Selection layer with a flat red
/// material. Replaces (and destroys) any previous selection viewport.
pub fn add_selection_viewport(registry: &mut Registry, camera: Entity) -> Entity {
    let size = registry.window_size;
    let mut component = ViewportComponent::new(camera, size.width, size.height);
    component.visible_layers = Layers::SELECTION;
    component.material_override = Some(Arc::new(Material::simple("SelectionMask", SELECTION_MASK_COLOR)));
    component.background = [0.0, 0.0, 0.0, 0.0];
    let viewport = registry.world.spawn(component).id();
    if let Some(previous) = registry.viewports.selection.replace(viewport) {
        registry.destroy_entity(previous);
    }
    update_render_order(registry);
    viewport
}

/// Object-id viewport: disabled until a consumer needs id readback.
pub fn add_object_id_viewport(registry: &mut Registry, camera: Entity) -> Entity {
    let size = registry.window_size;
    let mut component = ViewportComponent::new(camera, size.width, size.height);
    component.material_override = Some(Arc::new(Material::object_id()));
    component.enabled = false;
    component.background = [0.0, 0.0, 0.0, 0.0];
    let viewport = registry.world.spawn(component).id();
    if let Some(previous) = registry.viewports.object_id.replace(viewport) {
        registry.destroy_entity(previous);
    }
    update_render_order(registry);
    viewport
}

pub fn resize_viewport(registry: &mut Registry, viewport: Entity, width: u32, height: u32) -> bool {
    let Some(mut component) = registry.world.get_mut::<ViewportComponent>(viewport) else {
        return false;
    };
    if component.width == width && component.height == height {
        return false;
    }
    component.width = width;
    component.height = height;
    true
}

/// Focuses `viewport`. The selection-mask and object-id viewports mirror the
/// focused one and cannot take focus themselves.
pub fn set_focused_viewport(registry: &mut Registry, viewport: Entity) -> bool {
    if registry.world.get::<ViewportComponent>(viewport).is_none() {
        return false;
    }
    if registry.viewports.selection == Some(viewport) || registry.viewports.object_id == Some(viewport) {
        log::warn!("[viewport] auxiliary viewport {viewport:?} cannot take focus");
        return false;
    }
    registry.viewports.focused = Some(viewport);
    update_render_order(registry);
    true
}

/// Whether `cursor` (window pixels) lies inside `viewport`. Viewports are
/// anchored at the window origin.
pub fn cursor_in_viewport(registry: &Registry, viewport: Entity, cursor: Vec2) -> bool {
    registry.world.get::<ViewportComponent>(viewport).is_some_and(|component| {
        cursor.x >= 0.0
            && cursor.y >= 0.0
            && cursor.x < component.width as f32
            && cursor.y < component.height as f32
    })
}

/// Re-derives `render_order` from every live viewport.
pub fn update_render_order(registry: &mut Registry) {
    let world = &mut registry.world;
    let mut order: Vec<Entity> = world.query_filtered::<Entity, With<ViewportComponent>>().iter(world).collect();
    registry.viewports.sort(&mut order);
    registry.viewports.render_order = order;
}

pub fn render_order(registry: &Registry) -> &[Entity] {
    &registry.viewports.render_order
}

fn prune_slots(registry: &mut Registry) {
    let world = &registry.world;
    let alive = |slot: Option<Entity>| slot.filter(|&e| world.get::<ViewportComponent>(e).is_some());
    let slots = &mut registry.viewports;
    slots.main = alive(slots.main);
    slots.focused = alive(slots.focused).or(slots.main);
    slots.selection = alive(slots.selection);
    slots.object_id = alive(slots.object_id);
}

/// Keeps the selection outline on exactly the focused viewport while selecting
/// whole objects; other element types get no outline anywhere.
fn apply_selection_outline_rule(registry: &mut Registry) {
    let focused = registry.viewports.focused;
    let source = registry.viewports.selection;
    let outline_on_focused = registry.selection.element_type == ElementType::Object;
    let world = &mut registry.world;
    let mut viewports = world.query::<(Entity, &mut ViewportComponent)>();
    for (entity, mut viewport) in viewports.iter_mut(world) {
        if outline_on_focused && Some(entity) == focused {
            let effect = PostProcessEffect { source, color: [1.0, 0.6, 0.1, 1.0] };
            if viewport.post_process_effects.get(SELECTION_OUTLINE) != Some(&effect) {
                viewport.post_process_effects.insert(SELECTION_OUTLINE, effect);
            }
        } else if viewport.post_process_effects.contains_key(SELECTION_OUTLINE) {
            viewport.post_process_effects.remove(SELECTION_OUTLINE);
        }
    }
}

/// Init system: outline rule, then the auxiliary viewports copy the focused
/// viewport's camera and size, then the render order is re-derived.
pub fn sync_auxiliary_viewports(registry: &mut Registry) -> Result<()> {
    prune_slots(registry);
    apply_selection_outline_rule(registry);

    let source = registry
        .viewports
        .focused
        .and_then(|focused| registry.world.get::<ViewportComponent>(focused))
        .map(|source| (source.camera, source.width, source.height));
    if let Some((camera, width, height)) = source {
        for auxiliary in [registry.viewports.selection, registry.viewports.object_id].into_iter().flatten() {
            if let Some(mut viewport) = registry.world.get_mut::<ViewportComponent>(auxiliary) {
                viewport.camera = camera;
                viewport.width = width;
                viewport.height = height;
            }
        }
    }

    update_render_order(registry);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::add_camera;
    use glam::Vec3;

    #[test]
    fn rank_puts_mask_before_focused_before_rest() {
        let mut world = World::new();
        let a = world.spawn_empty().id();
        let b = world.spawn_empty().id();
        let c = world.spawn_empty().id();
        let slots = ViewportSlots { main: Some(a), focused: Some(a), selection: Some(c), ..Default::default() };
        let mut order = vec![a, b, c];
        slots.sort(&mut order);
        assert_eq!(order, vec![c, a, b]);
        let again = order.clone();
        slots.sort(&mut order);
        assert_eq!(order, again);
    }

    #[test]
    fn flagging_a_second_main_replaces_the_first() {
        let mut registry = Registry::headless();
        let camera = add_camera(&mut registry, Vec3::ZERO, 3.0);
        let first = add_viewport(&mut registry, camera, true);
        let second = add_viewport(&mut registry, camera, true);
        assert_eq!(registry.viewports.main, Some(second));
        assert_eq!(registry.viewports.focused, Some(second));
        assert!(registry.is_valid(first));
    }

    #[test]
    fn replacing_selection_viewport_destroys_old_one() {
        let mut registry = Registry::headless();
        let camera = add_camera(&mut registry, Vec3::ZERO, 3.0);
        let old = add_selection_viewport(&mut registry, camera);
        let new = add_selection_viewport(&mut registry, camera);
        assert!(!registry.is_valid(old));
        assert_eq!(registry.viewports.selection, Some(new));
    }

    #[test]
    fn object_id_viewport_starts_disabled() {
        let mut registry = Registry::headless();
        let camera = add_camera(&mut registry, Vec3::ZERO, 3.0);
        let viewport = add_object_id_viewport(&mut registry, camera);
        let component = registry.world.get::<ViewportComponent>(viewport).unwrap();
        assert!(!component.enabled);
        assert_eq!(component.material_override.as_ref().unwrap().shader, crate::renderer::ShaderKind::ObjectId);
    }

    #[test]
    fn outline_follows_element_type() {
        let mut registry = Registry::headless();
        let camera = add_camera(&mut registry, Vec3::ZERO, 3.0);
        let main = add_viewport(&mut registry, camera, true);
        let other = add_viewport(&mut registry, camera, false);
        let mask = add_selection_viewport(&mut registry, camera);

        sync_auxiliary_viewports(&mut registry).unwrap();
        let outline = |registry: &Registry, e: Entity| {
            registry.world.get::<ViewportComponent>(e).unwrap().post_process_effects.contains_key(SELECTION_OUTLINE)
        };
        assert!(outline(&registry, main));
        assert!(!outline(&registry, other));
        assert!(!outline(&registry, mask));

        registry.set_element_type(ElementType::Facet);
        sync_auxiliary_viewports(&mut registry).unwrap();
        assert!(!outline(&registry, main));
    }

    #[test]
    fn outline_moves_with_focus() {
        let mut registry = Registry::headless();
        let camera = add_camera(&mut registry, Vec3::ZERO, 3.0);
        let main = add_viewport(&mut registry, camera, true);
        let other = add_viewport(&mut registry, camera, false);
        let mask = add_selection_viewport(&mut registry, camera);
        let outline = |registry: &Registry, e: Entity| {
            registry.world.get::<ViewportComponent>(e).unwrap().post_process_effects.get(SELECTION_OUTLINE).cloned()
        };

        sync_auxiliary_viewports(&mut registry).unwrap();
        assert!(outline(&registry, main).is_some());

        assert!(set_focused_viewport(&mut registry, other));
        sync_auxiliary_viewports(&mut registry).unwrap();
        assert!(outline(&registry, main).is_none());
        assert_eq!(outline(&registry, other).and_then(|effect| effect.source), Some(mask));

        assert!(set_focused_viewport(&mut registry, main));
        sync_auxiliary_viewports(&mut registry).unwrap();
        assert!(outline(&registry, main).is_some());
        assert!(outline(&registry, other).is_none());
    }

    #[test]
    fn auxiliary_viewports_cannot_take_focus() {
        let mut registry = Registry::headless();
        let camera = add_camera(&mut registry, Vec3::ZERO, 3.0);
        let main = add_viewport(&mut registry, camera, true);
        let mask = add_selection_viewport(&mut registry, camera);
        let ids = add_object_id_viewport(&mut registry, camera);

        assert!(!set_focused_viewport(&mut registry, mask));
        assert!(!set_focused_viewport(&mut registry, ids));
        assert_eq!(registry.viewports.focused, Some(main));
    }

    #[test]
    fn destroyed_focused_viewport_falls_back_to_main() {
        let mut registry = Registry::headless();
        let camera = add_camera(&mut registry, Vec3::ZERO, 3.0);
        let main = add_viewport(&mut registry, camera, true);
        let other = add_viewport(&mut registry, camera, false);
        assert!(set_focused_viewport(&mut registry, other));
        registry.destroy_entity(other);
        sync_auxiliary_viewports(&mut registry).unwrap();
        assert_eq!(registry.viewports.focused, Some(main));
        assert_eq!(render_order(&registry), &[main]);
    }
}
