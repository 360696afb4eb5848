use crate::ecs::{
    camera_controller, camera_focus_fit, clear_dirty_flags, update_mesh_bounds, update_mesh_hovered,
    update_scene_bounds, update_transform_hierarchy,
};
use crate::input::ACTION_RELOAD;
use crate::layers::sync_selection_layers;
use crate::registry::Registry;
use crate::renderer::{render_shadowmaps, render_viewports};
use crate::scheduler::{Stage, Systems};
use crate::tools::run_current_tool;
use crate::viewport::sync_auxiliary_viewports;
use anyhow::Result;

/// Registers the built-in systems. Order inside each stage is significant.
pub fn register_default_systems(systems: &mut Systems) {
    systems.add(Stage::Init, "update_time", update_time);
    systems.add(Stage::Init, "sync_auxiliary_viewports", sync_auxiliary_viewports);
    systems.add(Stage::Init, "sync_selection_layers", sync_selection_layers);
    systems.add(Stage::Init, "init_misc", init_misc);

    systems.add(Stage::Interface, "update_mesh_hovered", update_mesh_hovered);
    systems.add(Stage::Interface, "run_current_tool", run_current_tool);

    systems.add(Stage::Simulation, "update_transform_hierarchy", update_transform_hierarchy);
    systems.add(Stage::Simulation, "update_mesh_bounds", update_mesh_bounds);
    systems.add(Stage::Simulation, "update_scene_bounds", update_scene_bounds);
    systems.add(Stage::Simulation, "camera_controller", camera_controller);
    systems.add(Stage::Simulation, "camera_focus_fit", camera_focus_fit);

    systems.add(Stage::Render, "render_shadowmaps", render_shadowmaps);
    systems.add(Stage::Render, "render_viewports", render_viewports);

    systems.add(Stage::Post, "clear_dirty_flags", clear_dirty_flags);
}

fn update_time(registry: &mut Registry) -> Result<()> {
    registry.time.advance();
    Ok(())
}

fn init_misc(registry: &mut Registry) -> Result<()> {
    if registry.input.keybinds.is_pressed(ACTION_RELOAD) {
        log::info!("[render] reload requested, clearing {} shader cache", registry.renderer.label());
        registry.renderer.clear_shader_cache();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{InputKey, NamedKeyCode, CONTEXT_GLOBAL};
    use crate::renderer::NullBackend;

    #[test]
    fn stages_are_populated_in_frame_order() {
        let mut systems = Systems::new();
        register_default_systems(&mut systems);
        assert_eq!(
            systems.names(Stage::Init),
            vec!["update_time", "sync_auxiliary_viewports", "sync_selection_layers", "init_misc"]
        );
        assert_eq!(systems.names(Stage::Interface), vec!["update_mesh_hovered", "run_current_tool"]);
        assert_eq!(systems.names(Stage::Render), vec!["render_shadowmaps", "render_viewports"]);
        assert_eq!(systems.names(Stage::Post), vec!["clear_dirty_flags"]);
    }

    #[test]
    fn reload_action_clears_shader_cache() {
        let backend = NullBackend::new();
        let log = backend.log();
        let mut registry = Registry::new(Box::new(backend));
        registry.input.keybinds.set_key_state(InputKey::named(NamedKeyCode::F5), true);
        registry.input.keybinds.update(CONTEXT_GLOBAL);

        init_misc(&mut registry).unwrap();
        assert_eq!(log.lock().unwrap().shader_cache_clears, 1);

        registry.input.keybinds.update(CONTEXT_GLOBAL);
        init_misc(&mut registry).unwrap();
        assert_eq!(log.lock().unwrap().shader_cache_clears, 1, "held key only reloads once");
    }
}
