//! Interactive tools, registered per (tool, element type) pair.

use crate::ecs::{CameraComponent, Transform};
use crate::input::ACTION_VIEWPORT_SELECT;
use crate::registry::Registry;
use crate::selection::{
    collect_hovered, collect_selected, deselect_all, selection_behavior, set_selected, ElementType, SelectionBehavior,
};
use anyhow::Result;
use glam::{Vec2, Vec3};
use std::collections::HashMap;

pub type ToolSystem = fn(&mut Registry) -> Result<()>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ToolKind {
    #[default]
    Select,
    Translate,
}

#[derive(Debug, Clone)]
pub struct Tools {
    systems: HashMap<(ToolKind, ElementType), ToolSystem>,
    current_tool: ToolKind,
    current_element: ElementType,
}

impl Default for Tools {
    fn default() -> Self {
        let mut tools = Self::empty();
        tools.register(ToolKind::Select, ElementType::Object, select_tool);
        tools.register(ToolKind::Translate, ElementType::Object, translate_tool);
        tools
    }
}

impl Tools {
    pub fn empty() -> Self {
        Self { systems: HashMap::new(), current_tool: ToolKind::Select, current_element: ElementType::Object }
    }

    /// Registers `system`, returning the one it replaced.
    pub fn register(&mut self, tool: ToolKind, element: ElementType, system: ToolSystem) -> Option<ToolSystem> {
        self.systems.insert((tool, element), system)
    }

    pub fn get(&self, tool: ToolKind, element: ElementType) -> Option<ToolSystem> {
        self.systems.get(&(tool, element)).copied()
    }

    pub fn current_tool(&self) -> ToolKind {
        self.current_tool
    }

    pub fn current_element_type(&self) -> ElementType {
        self.current_element
    }

    pub fn set_current_tool(&mut self, tool: ToolKind) {
        self.current_tool = tool;
    }

    pub(crate) fn set_element_type(&mut self, element: ElementType) {
        self.current_element = element;
    }

    pub fn has_tool(&self, tool: ToolKind, element: ElementType) -> bool {
        self.systems.contains_key(&(tool, element))
    }
}

/// Runs the tool registered for the current (tool, element type) pair.
/// Returns `false` when nothing is registered for that pair.
pub fn run_current(registry: &mut Registry) -> Result<bool> {
    let key = (registry.tools.current_tool(), registry.tools.current_element_type());
    let Some(system) = registry.tools.get(key.0, key.1) else {
        return Ok(false);
    };
    system(registry)?;
    Ok(true)
}

/// Interface system wrapper around [`run_current`].
pub fn run_current_tool(registry: &mut Registry) -> Result<()> {
    if !run_current(registry)? {
        log::trace!(
            "[tools] no {:?} tool for {}",
            registry.tools.current_tool(),
            registry.tools.current_element_type().label()
        );
    }
    Ok(())
}

/// Click applies the modifier-derived behavior to the hovered entity. Clicking
/// empty space with no modifier clears the selection.
fn select_tool(registry: &mut Registry) -> Result<()> {
    if !registry.input.keybinds.is_pressed(ACTION_VIEWPORT_SELECT) {
        return Ok(());
    }
    let behavior = selection_behavior(&registry.input.keybinds);
    registry.selection.behavior = behavior;
    match collect_hovered(registry).first().copied() {
        Some(hovered) => {
            set_selected(registry, hovered, behavior);
        }
        None if behavior == SelectionBehavior::Set => {
            deselect_all(registry);
        }
        None => {}
    }
    Ok(())
}

/// Press selects like [`select_tool`]; dragging moves the selection in the
/// focused camera's image plane.
fn translate_tool(registry: &mut Registry) -> Result<()> {
    if registry.input.keybinds.is_pressed(ACTION_VIEWPORT_SELECT) {
        return select_tool(registry);
    }
    let delta = registry.input.mouse_delta;
    if !registry.input.keybinds.is_down(ACTION_VIEWPORT_SELECT) || delta == Vec2::ZERO {
        return Ok(());
    }
    let Some(offset) = drag_offset(registry, delta) else {
        return Ok(());
    };
    for entity in collect_selected(registry) {
        if let Some(mut transform) = registry.world.get_mut::<Transform>(entity) {
            transform.translation += offset;
        }
    }
    Ok(())
}

fn drag_offset(registry: &Registry, delta: Vec2) -> Option<Vec3> {
    let camera = registry.world.get::<CameraComponent>(registry.focused_camera()?)?;
    let (right, up) = camera.camera().plane_axes();
    let scale = camera.orbit.radius * 0.002;
    Some((right * delta.x - up * delta.y) * scale)
}
