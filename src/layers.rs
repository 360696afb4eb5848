//! Render layers: a per-entity u64 bitmask consumed by viewport culling.

use crate::registry::Registry;
use crate::selection::{Hovered, Selected};
use anyhow::Result;
use bevy_ecs::prelude::*;
use bevy_ecs::query::Has;
use bitflags::bitflags;

pub const MAX_LAYERS: usize = 64;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Layers: u64 {
        const DEFAULT = 1 << 0;
        const SELECTION = 1 << 1;
        const HOVER = 1 << 2;
        const NO_SHADOW = 1 << 3;
        // Every bit is a valid user layer.
        const _ = !0;
    }
}

impl Layers {
    /// Layer with the single bit `index` set. Panics when `index >= 64`.
    pub fn layer(index: usize) -> Self {
        assert!(index < MAX_LAYERS, "layer index {index} out of range (max {MAX_LAYERS})");
        Layers::from_bits_retain(1u64 << index)
    }
}

impl Default for Layers {
    fn default() -> Self {
        Layers::DEFAULT
    }
}

#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Layer(pub Layers);

/// Human readable names for layer indices.
#[derive(Debug, Clone)]
pub struct LayerNames {
    names: Vec<Option<String>>,
}

impl Default for LayerNames {
    fn default() -> Self {
        let mut names = Self { names: vec![None; MAX_LAYERS] };
        names.register(0, "Default");
        names.register(1, "Selection");
        names.register(2, "Hover");
        names.register(3, "No Shadow");
        names
    }
}

impl LayerNames {
    pub fn register(&mut self, index: usize, name: impl Into<String>) {
        assert!(index < MAX_LAYERS, "layer index {index} out of range (max {MAX_LAYERS})");
        self.names[index] = Some(name.into());
    }

    /// Registers `name` at the first free index.
    pub fn register_next(&mut self, name: impl Into<String>) -> usize {
        let index = self
            .names
            .iter()
            .position(Option::is_none)
            .unwrap_or_else(|| panic!("all {MAX_LAYERS} layers are already named"));
        self.register(index, name);
        index
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).and_then(|name| name.as_deref())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.as_deref() == Some(name))
    }
}

/// Layers of `entity`; entities without a [`Layer`] component sit in DEFAULT.
pub fn layers_of(world: &World, entity: Entity) -> Layers {
    world.get::<Layer>(entity).map_or(Layers::DEFAULT, |layer| layer.0)
}

pub fn is_in_layer(world: &World, entity: Entity, layers: Layers) -> bool {
    layers_of(world, entity).intersects(layers)
}

pub fn add_to_layer(world: &mut World, entity: Entity, layers: Layers) {
    if !world.entities().contains(entity) {
        return;
    }
    if let Some(mut layer) = world.get_mut::<Layer>(entity) {
        if !layer.0.contains(layers) {
            layer.0.insert(layers);
        }
        return;
    }
    world.entity_mut(entity).insert(Layer(Layers::DEFAULT | layers));
}

pub fn remove_from_layer(world: &mut World, entity: Entity, layers: Layers) {
    if let Some(mut layer) = world.get_mut::<Layer>(entity) {
        if layer.0.intersects(layers) {
            layer.0.remove(layers);
        }
    }
}

/// Init-stage reconciliation: the SELECTION and HOVER bits end up mirroring the
/// `Selected` and `Hovered` markers. Changes made later in the frame are picked
/// up by the next frame's pass.
pub fn sync_selection_layers(registry: &mut Registry) -> Result<()> {
    let world = &mut registry.world;

    let mut stale = Vec::new();
    let mut layered = world.query::<(Entity, &Layer, Has<Selected>, Has<Hovered>)>();
    for (entity, layer, selected, hovered) in layered.iter(world) {
        let mut clear = Layers::empty();
        if layer.0.contains(Layers::SELECTION) && !selected {
            clear |= Layers::SELECTION;
        }
        if layer.0.contains(Layers::HOVER) && !hovered {
            clear |= Layers::HOVER;
        }
        if !clear.is_empty() {
            stale.push((entity, clear));
        }
    }
    for (entity, clear) in stale {
        remove_from_layer(world, entity, clear);
    }

    let selected: Vec<Entity> = world.query_filtered::<Entity, With<Selected>>().iter(world).collect();
    for entity in selected {
        add_to_layer(world, entity, Layers::SELECTION);
    }
    let hovered: Vec<Entity> = world.query_filtered::<Entity, With<Hovered>>().iter(world).collect();
    for entity in hovered {
        add_to_layer(world, entity, Layers::HOVER);
    }
    Ok(())
}
