//! The single application-state value every system receives by `&mut`.

use crate::ecs::{Aabb, Children, Parent};
use crate::events::{EventBus, ViewerEvent};
use crate::input::InputState;
use crate::layers::LayerNames;
use crate::renderer::{NullBackend, RenderBackend};
use crate::selection::{ElementType, SelectionContext};
use crate::time::Time;
use crate::tools::Tools;
use crate::viewport::{ViewportComponent, ViewportSlots};
use bevy_ecs::prelude::*;
use std::fmt;
use winit::dpi::PhysicalSize;

pub struct Registry {
    pub world: World,
    pub selection: SelectionContext,
    pub input: InputState,
    pub viewports: ViewportSlots,
    pub tools: Tools,
    pub time: Time,
    pub window_size: PhysicalSize<u32>,
    pub layer_names: LayerNames,
    /// Union of all world bounds, refreshed in the Simulation stage.
    pub scene_bounds: Option<Aabb>,
    pub renderer: Box<dyn RenderBackend>,
}

impl Registry {
    pub fn new(renderer: Box<dyn RenderBackend>) -> Self {
        let mut world = World::new();
        world.insert_resource(EventBus::default());
        Self {
            world,
            selection: SelectionContext::default(),
            input: InputState::default(),
            viewports: ViewportSlots::default(),
            tools: Tools::default(),
            time: Time::new(),
            window_size: PhysicalSize::new(1280, 720),
            layer_names: LayerNames::default(),
            scene_bounds: None,
            renderer,
        }
    }

    /// Registry backed by the [`NullBackend`].
    pub fn headless() -> Self {
        Self::new(Box::new(NullBackend::new()))
    }

    pub fn create_entity(&mut self) -> Entity {
        self.world.spawn_empty().id()
    }

    /// Despawns `entity` with all its components. Marker hooks fire, so a
    /// selected entity publishes `Deselected` on the way out. The entity is
    /// detached from its parent and its children become roots.
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        if !self.is_valid(entity) {
            return false;
        }
        if let Some(parent) = self.world.get::<Parent>(entity).copied() {
            if let Some(mut siblings) = self.world.get_mut::<Children>(parent.0) {
                siblings.0.retain(|child| *child != entity);
            }
        }
        let children = self.world.get::<Children>(entity).map(|c| c.0.clone()).unwrap_or_default();
        for child in children {
            let orphaned = self.world.get::<Parent>(child).is_some_and(|p| p.0 == entity);
            if orphaned {
                self.world.entity_mut(child).remove::<Parent>();
            }
        }
        self.world.despawn(entity)
    }

    pub fn is_valid(&self, entity: Entity) -> bool {
        self.world.entities().contains(entity)
    }

    pub fn set_element_type(&mut self, element: ElementType) {
        self.selection.element_type = element;
        self.tools.set_element_type(element);
    }

    pub fn focused_camera(&self) -> Option<Entity> {
        let focused = self.viewports.focused?;
        self.world.get::<ViewportComponent>(focused).map(|viewport| viewport.camera)
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&ViewerEvent) + Send + Sync + 'static) {
        self.world.resource_mut::<EventBus>().subscribe(Box::new(listener));
    }

    pub fn publish(&mut self, event: ViewerEvent) {
        self.world.resource_mut::<EventBus>().publish(event);
    }

    pub fn drain_events(&mut self) -> Vec<ViewerEvent> {
        self.world.get_resource_mut::<EventBus>().map(|mut bus| bus.drain()).unwrap_or_default()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entities", &self.world.entities().len())
            .field("selection", &self.selection)
            .field("viewports", &self.viewports)
            .field("renderer", &self.renderer.label())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn destroyed_entities_are_invalid() {
        let mut registry = Registry::headless();
        let e = registry.create_entity();
        assert!(registry.is_valid(e));
        assert!(registry.destroy_entity(e));
        assert!(!registry.is_valid(e));
        assert!(!registry.destroy_entity(e));
    }

    #[test]
    fn destroying_a_parent_orphans_its_children() {
        use crate::ecs::{update_transform_hierarchy, Transform, WorldTransform};
        use glam::Vec3;
        use smallvec::SmallVec;

        let mut registry = Registry::headless();
        let child = registry.world.spawn(Transform::from_translation(Vec3::new(0.0, 1.0, 0.0))).id();
        let parent = registry
            .world
            .spawn((Transform::from_translation(Vec3::new(2.0, 0.0, 0.0)), Children(SmallVec::from_slice(&[child]))))
            .id();
        registry.world.entity_mut(child).insert(Parent(parent));
        update_transform_hierarchy(&mut registry).unwrap();

        assert!(registry.destroy_entity(parent));
        assert!(registry.is_valid(child));
        assert!(registry.world.get::<Parent>(child).is_none());

        registry.world.get_mut::<Transform>(child).unwrap().translation = Vec3::splat(9.0);
        update_transform_hierarchy(&mut registry).unwrap();
        let world_mat = registry.world.get::<WorldTransform>(child).unwrap().0;
        assert_eq!(world_mat.transform_point3(Vec3::ZERO), Vec3::splat(9.0));
    }

    #[test]
    fn destroying_a_child_detaches_it_from_the_parent() {
        let mut registry = Registry::headless();
        let parent = registry.create_entity();
        let child = registry.world.spawn(Parent(parent)).id();
        let sibling = registry.world.spawn(Parent(parent)).id();
        registry.world.entity_mut(parent).insert(Children([child, sibling].into_iter().collect()));

        assert!(registry.destroy_entity(child));
        assert_eq!(registry.world.get::<Children>(parent).unwrap().0.as_slice(), &[sibling]);
    }

    #[test]
    fn subscribers_receive_published_events() {
        let mut registry = Registry::headless();
        let seen = Arc::new(Mutex::new(0));
        let sink = seen.clone();
        registry.subscribe(move |_| *sink.lock().unwrap() += 1);
        registry.publish(ViewerEvent::WindowClosed);
        assert_eq!(*seen.lock().unwrap(), 1);
        assert_eq!(registry.drain_events(), vec![ViewerEvent::WindowClosed]);
    }

    #[test]
    fn element_type_reaches_tools() {
        let mut registry = Registry::headless();
        registry.set_element_type(ElementType::Edge);
        assert_eq!(registry.tools.current_element_type(), ElementType::Edge);
        assert_eq!(registry.selection.element_type, ElementType::Edge);
    }
}
