//! Selected/hovered state. Membership is the presence of a marker component;
//! the component hooks publish the matching [`ViewerEvent`] the moment a marker
//! is added or removed, including when its entity is destroyed.

use crate::events::{EventBus, ViewerEvent};
use crate::input::Keybinds;
use crate::registry::Registry;
use bevy_ecs::component::{ComponentHooks, ComponentId, StorageType};
use bevy_ecs::prelude::*;
use bevy_ecs::world::DeferredWorld;

pub const ACTION_SELECTION_ADD: &str = "global.selection.add";
pub const ACTION_SELECTION_REMOVE: &str = "global.selection.remove";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ElementType {
    #[default]
    Object,
    Vertex,
    Edge,
    Facet,
    Corner,
}

impl ElementType {
    pub const ALL: [ElementType; 5] =
        [ElementType::Object, ElementType::Vertex, ElementType::Edge, ElementType::Facet, ElementType::Corner];

    pub fn label(self) -> &'static str {
        match self {
            ElementType::Object => "Object",
            ElementType::Vertex => "Vertex",
            ElementType::Edge => "Edge",
            ElementType::Facet => "Facet",
            ElementType::Corner => "Corner",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SelectionBehavior {
    #[default]
    Set,
    Add,
    Remove,
    Toggle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionContext {
    pub element_type: ElementType,
    pub behavior: SelectionBehavior,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Selected;

#[derive(Debug, Clone, Copy, Default)]
pub struct Hovered;

impl Component for Selected {
    const STORAGE_TYPE: StorageType = StorageType::SparseSet;

    fn register_component_hooks(hooks: &mut ComponentHooks) {
        hooks.on_add(publish_selected).on_remove(publish_deselected);
    }
}

impl Component for Hovered {
    const STORAGE_TYPE: StorageType = StorageType::SparseSet;

    fn register_component_hooks(hooks: &mut ComponentHooks) {
        hooks.on_add(publish_hovered).on_remove(publish_dehovered);
    }
}

fn publish(mut world: DeferredWorld, event: ViewerEvent) {
    if let Some(mut bus) = world.get_resource_mut::<EventBus>() {
        bus.publish(event);
    }
}

fn publish_selected(world: DeferredWorld, entity: Entity, _: ComponentId) {
    publish(world, ViewerEvent::Selected { entity });
}

fn publish_deselected(world: DeferredWorld, entity: Entity, _: ComponentId) {
    publish(world, ViewerEvent::Deselected { entity });
}

fn publish_hovered(world: DeferredWorld, entity: Entity, _: ComponentId) {
    publish(world, ViewerEvent::Hovered { entity });
}

fn publish_dehovered(world: DeferredWorld, entity: Entity, _: ComponentId) {
    publish(world, ViewerEvent::Dehovered { entity });
}

fn collect_marked<M: Component>(world: &mut World) -> Vec<Entity> {
    world.query_filtered::<Entity, With<M>>().iter(world).collect()
}

fn set_marker<M: Component + Default>(world: &mut World, entity: Entity, behavior: SelectionBehavior) -> bool {
    if !world.entities().contains(entity) {
        return false;
    }
    let present = world.get::<M>(entity).is_some();
    match behavior {
        SelectionBehavior::Set => {
            let others: Vec<Entity> =
                collect_marked::<M>(world).into_iter().filter(|other| *other != entity).collect();
            if present && others.is_empty() {
                return false;
            }
            for other in others {
                world.entity_mut(other).remove::<M>();
            }
            if !present {
                world.entity_mut(entity).insert(M::default());
            }
            true
        }
        SelectionBehavior::Add => {
            if present {
                return false;
            }
            world.entity_mut(entity).insert(M::default());
            true
        }
        SelectionBehavior::Remove => {
            if !present {
                return false;
            }
            world.entity_mut(entity).remove::<M>();
            true
        }
        SelectionBehavior::Toggle => {
            if present {
                world.entity_mut(entity).remove::<M>();
            } else {
                world.entity_mut(entity).insert(M::default());
            }
            true
        }
    }
}

fn clear_marker<M: Component>(world: &mut World) -> bool {
    let marked = collect_marked::<M>(world);
    if marked.is_empty() {
        return false;
    }
    for entity in marked {
        world.entity_mut(entity).remove::<M>();
    }
    true
}

/// Applies `behavior` to the selection set. Returns `true` iff the set changed.
pub fn set_selected(registry: &mut Registry, entity: Entity, behavior: SelectionBehavior) -> bool {
    set_marker::<Selected>(&mut registry.world, entity, behavior)
}

/// Applies `behavior` to the hover set. Returns `true` iff the set changed.
pub fn set_hovered(registry: &mut Registry, entity: Entity, behavior: SelectionBehavior) -> bool {
    set_marker::<Hovered>(&mut registry.world, entity, behavior)
}

pub fn select(registry: &mut Registry, entity: Entity) -> bool {
    set_selected(registry, entity, SelectionBehavior::Add)
}

pub fn deselect(registry: &mut Registry, entity: Entity) -> bool {
    set_selected(registry, entity, SelectionBehavior::Remove)
}

pub fn hover(registry: &mut Registry, entity: Entity) -> bool {
    set_hovered(registry, entity, SelectionBehavior::Add)
}

pub fn dehover(registry: &mut Registry, entity: Entity) -> bool {
    set_hovered(registry, entity, SelectionBehavior::Remove)
}

pub fn deselect_all(registry: &mut Registry) -> bool {
    clear_marker::<Selected>(&mut registry.world)
}

pub fn dehover_all(registry: &mut Registry) -> bool {
    clear_marker::<Hovered>(&mut registry.world)
}

pub fn is_selected(registry: &Registry, entity: Entity) -> bool {
    registry.world.get::<Selected>(entity).is_some()
}

pub fn is_hovered(registry: &Registry, entity: Entity) -> bool {
    registry.world.get::<Hovered>(entity).is_some()
}

pub fn collect_selected(registry: &mut Registry) -> Vec<Entity> {
    collect_marked::<Selected>(&mut registry.world)
}

pub fn collect_hovered(registry: &mut Registry) -> Vec<Entity> {
    collect_marked::<Hovered>(&mut registry.world)
}

/// Maps modifier state to the behavior of the next selection mutation.
pub fn selection_behavior(keybinds: &Keybinds) -> SelectionBehavior {
    let add = keybinds.is_down(ACTION_SELECTION_ADD);
    let remove = keybinds.is_down(ACTION_SELECTION_REMOVE);
    match (add, remove) {
        (true, true) => SelectionBehavior::Toggle,
        (true, false) => SelectionBehavior::Add,
        (false, true) => SelectionBehavior::Remove,
        (false, false) => SelectionBehavior::Set,
    }
}

pub fn are_selection_keys_down(keybinds: &Keybinds) -> bool {
    keybinds.is_down(ACTION_SELECTION_ADD) || keybinds.is_down(ACTION_SELECTION_REMOVE)
}

pub fn are_selection_keys_pressed(keybinds: &Keybinds) -> bool {
    keybinds.is_pressed(ACTION_SELECTION_ADD) || keybinds.is_pressed(ACTION_SELECTION_REMOVE)
}

pub fn are_selection_keys_released(keybinds: &Keybinds) -> bool {
    keybinds.is_released(ACTION_SELECTION_ADD) || keybinds.is_released(ACTION_SELECTION_REMOVE)
}
