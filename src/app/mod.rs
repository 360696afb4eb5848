//! The frame loop driver: owns the registry, the window and the staged systems,
//! and runs one iteration per frame until close is requested.

mod default_systems;

pub use default_systems::register_default_systems;

#[cfg(feature = "gpu")]
use crate::cli::CliOverrides;
use crate::config::{AppConfig, IblConfig};
use crate::ecs::add_camera;
use crate::events::ViewerEvent;
use crate::ibl::{add_ibl, generate_ibl, solid_ibl};
use crate::input::{InputState, CONTEXT_GLOBAL, CONTEXT_VIEWPORT};
use crate::registry::Registry;
use crate::renderer::{RenderBackend, RenderError};
use crate::scheduler::{Stage, Systems};
use crate::task_queue::{TaskHandle, TaskQueue};
use crate::viewport::{
    add_object_id_viewport, add_selection_viewport, add_viewport, cursor_in_viewport, resize_viewport,
};
use crate::window::{WindowBackend, WindowSignal};
use anyhow::{bail, Result};
use glam::Vec3;
use std::fmt;
use winit::dpi::PhysicalSize;

const DEFAULT_CAMERA_RADIUS: f32 = 5.0;
const NEUTRAL_AMBIENT: [f32; 3] = [0.3, 0.3, 0.3];

/// Loads the config named on the command line (or the default path), applies
/// the CLI overrides and runs a windowed viewer until it is closed.
#[cfg(feature = "gpu")]
pub fn run_with_overrides(cli: CliOverrides) -> Result<()> {
    let path =
        cli.config_path().cloned().unwrap_or_else(|| crate::config::DEFAULT_CONFIG_PATH.into());
    let mut config = AppConfig::load_or_default(&path);
    let overrides = cli.into_config_overrides();
    if !overrides.is_empty() {
        log::info!("[config] CLI overrides applied: {}", overrides.applied_fields().join(", "));
    }
    config.apply_overrides(&overrides);
    let mut viewer = Viewer::new(config);
    if !viewer.run(|_| true)? {
        bail!("Viewer failed to initialize");
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    NotInitialized,
    Running,
    Stopped,
}

struct Runtime {
    registry: Registry,
    window: Box<dyn WindowBackend>,
}

pub struct Viewer {
    config: AppConfig,
    state: ViewerState,
    runtime: Option<Runtime>,
    systems: Systems,
    tasks: TaskQueue,
    close_requested: bool,
    last_render_error: Option<RenderError>,
    frame_count: u64,
}

impl Viewer {
    /// Opens a winit window with a wgpu backend. Failure is logged and leaves
    /// the viewer in [`ViewerState::NotInitialized`].
    #[cfg(feature = "gpu")]
    pub fn new(config: AppConfig) -> Self {
        match create_gpu_backends(&config) {
            Ok((window, renderer)) => Self::with_backends(config, window, renderer),
            Err(err) => {
                log::error!("[app] failed to initialize window or renderer: {err:#}");
                Self::not_initialized(config)
            }
        }
    }

    pub fn with_backends(
        config: AppConfig,
        window: Box<dyn WindowBackend>,
        renderer: Box<dyn RenderBackend>,
    ) -> Self {
        match build_runtime(&config, window, renderer) {
            Ok(runtime) => {
                let mut systems = Systems::new();
                register_default_systems(&mut systems);
                log::info!(
                    "[app] viewer ready ({} renderer, {}x{})",
                    runtime.registry.renderer.label(),
                    runtime.registry.window_size.width,
                    runtime.registry.window_size.height
                );
                Self {
                    config,
                    state: ViewerState::Running,
                    runtime: Some(runtime),
                    systems,
                    tasks: TaskQueue::new(),
                    close_requested: false,
                    last_render_error: None,
                    frame_count: 0,
                }
            }
            Err(err) => {
                log::error!("[app] initialization failed: {err:#}");
                Self::not_initialized(config)
            }
        }
    }

    fn not_initialized(config: AppConfig) -> Self {
        Self {
            config,
            state: ViewerState::NotInitialized,
            runtime: None,
            systems: Systems::new(),
            tasks: TaskQueue::new(),
            close_requested: false,
            last_render_error: None,
            frame_count: 0,
        }
    }

    pub fn state(&self) -> ViewerState {
        self.state
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Runs frames until close is requested, then tears down. `main_loop` is
    /// called once per frame after the Interface stage; returning `false`
    /// requests close. Returns `Ok(false)` when the viewer never initialized.
    pub fn run(&mut self, mut main_loop: impl FnMut(&mut Registry) -> bool) -> Result<bool> {
        if self.state != ViewerState::Running {
            log::warn!("[app] run called in state {:?}", self.state);
            return Ok(false);
        }
        let result = loop {
            match self.run_frame(&mut main_loop) {
                Ok(true) => {}
                Ok(false) => break Ok(true),
                Err(err) => break Err(err),
            }
        };
        self.shutdown();
        result
    }

    /// One loop iteration. Returns `Ok(false)` without running anything once
    /// close has been requested.
    pub fn run_frame(&mut self, mut main_loop: impl FnMut(&mut Registry) -> bool) -> Result<bool> {
        if self.state != ViewerState::Running {
            return Ok(false);
        }
        let Some(runtime) = self.runtime.as_mut() else {
            return Ok(false);
        };
        if self.close_requested || runtime.window.should_close() {
            return Ok(false);
        }
        let registry = &mut runtime.registry;
        // The event log only holds the current frame; listeners already saw the rest.
        registry.drain_events();

        self.tasks.drain_and_run(registry, self.config.frame.task_budget());

        registry.input.reset_deltas();
        for signal in runtime.window.poll_events() {
            match signal {
                WindowSignal::Input(event) => registry.input.push(event),
                WindowSignal::Resized(size) => handle_resize(registry, size),
                WindowSignal::CloseRequested => {
                    log::info!("[app] window close requested");
                    self.close_requested = true;
                }
                WindowSignal::FileDropped(path) => registry.publish(ViewerEvent::FileDropped { path }),
            }
        }
        let context = keybind_context(registry);
        registry.input.process(context);

        self.systems.run(Stage::Init, registry)?;
        self.systems.run(Stage::Interface, registry)?;
        if !main_loop(registry) {
            self.close_requested = true;
        }
        self.systems.run(Stage::Simulation, registry)?;

        match self.systems.run(Stage::Render, registry) {
            Ok(()) => self.last_render_error = None,
            Err(err) => {
                let Some(render_error) = err.chain().find_map(|cause| cause.downcast_ref::<RenderError>()) else {
                    return Err(err);
                };
                log::error!("[render] {err:#}");
                if let Some(detail) = &render_error.detail {
                    log::debug!("[render] {detail}");
                }
                self.last_render_error = Some(render_error.clone());
            }
        }

        if let Err(err) = registry.renderer.present(registry.viewports.focused) {
            log::error!("[render] present failed: {err:#}");
        }
        runtime.window.present();

        self.systems.run(Stage::Post, registry)?;
        self.frame_count += 1;
        Ok(true)
    }

    fn shutdown(&mut self) {
        if self.state != ViewerState::Running {
            return;
        }
        self.state = ViewerState::Stopped;
        if let Some(runtime) = self.runtime.as_mut() {
            runtime.window.request_close();
            runtime.registry.publish(ViewerEvent::WindowClosed);
        }
        let dropped = self.tasks.len();
        if dropped > 0 {
            log::warn!("[app] {dropped} queued task(s) dropped at shutdown");
        }
        log::info!("[app] viewer stopped after {} frame(s)", self.frame_count);
    }

    /// Queues `task` for the frame thread. Safe to call from any thread via a
    /// [`TaskQueue`] clone.
    pub fn run_on_main_thread<F>(&self, task: F) -> TaskHandle
    where
        F: FnOnce(&mut Registry) + Send + 'static,
    {
        self.tasks.submit(task)
    }

    pub fn task_queue(&self) -> TaskQueue {
        self.tasks.clone()
    }

    /// Takes effect at the top of the next iteration.
    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    /// Render failure of the most recent frame, cleared by the next frame that
    /// renders cleanly.
    pub fn last_render_error(&self) -> Option<&RenderError> {
        self.last_render_error.as_ref()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn registry(&self) -> Option<&Registry> {
        self.runtime.as_ref().map(|runtime| &runtime.registry)
    }

    pub fn registry_mut(&mut self) -> Option<&mut Registry> {
        self.runtime.as_mut().map(|runtime| &mut runtime.registry)
    }

    pub fn systems_mut(&mut self) -> &mut Systems {
        &mut self.systems
    }
}

impl fmt::Debug for Viewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Viewer")
            .field("state", &self.state)
            .field("frame_count", &self.frame_count)
            .field("pending_tasks", &self.tasks.len())
            .field("systems", &self.systems)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "gpu")]
fn create_gpu_backends(config: &AppConfig) -> Result<(Box<dyn WindowBackend>, Box<dyn RenderBackend>)> {
    use anyhow::Context;

    let window = crate::window::WinitWindow::new(&config.window)?;
    let handle = window.window().context("Window handle unavailable after creation")?;
    let renderer = crate::renderer::WgpuBackend::new(handle, config.window.vsync)?;
    Ok((Box::new(window), Box::new(renderer)))
}

fn build_runtime(
    config: &AppConfig,
    window: Box<dyn WindowBackend>,
    renderer: Box<dyn RenderBackend>,
) -> Result<Runtime> {
    let size = window.size();
    if size.width == 0 || size.height == 0 {
        bail!("Window reported an empty surface ({}x{})", size.width, size.height);
    }
    let mut registry = Registry::new(renderer);
    registry.window_size = size;
    if let Some(path) = &config.input.bindings {
        registry.input = InputState::from_config(path);
    }

    let camera = add_camera(&mut registry, Vec3::ZERO, DEFAULT_CAMERA_RADIUS);
    add_viewport(&mut registry, camera, true);
    add_selection_viewport(&mut registry, camera);
    add_object_id_viewport(&mut registry, camera);

    load_default_ibl(&mut registry, &config.ibl);
    Ok(Runtime { registry, window })
}

fn load_default_ibl(registry: &mut Registry, config: &IblConfig) {
    let ibl = match &config.path {
        Some(path) => match generate_ibl(path, config.resolution) {
            Ok(ibl) => ibl,
            Err(err) => {
                log::error!("[ibl] {err:#}");
                return;
            }
        },
        None => solid_ibl(NEUTRAL_AMBIENT, config.resolution),
    };
    add_ibl(registry, ibl);
}

fn handle_resize(registry: &mut Registry, size: PhysicalSize<u32>) {
    if size.width == 0 || size.height == 0 {
        log::debug!("[app] ignoring zero-sized resize");
        return;
    }
    registry.window_size = size;
    if let Some(main) = registry.viewports.main {
        resize_viewport(registry, main, size.width, size.height);
    }
    registry.renderer.resize(size);
    registry.publish(ViewerEvent::WindowResized { width: size.width, height: size.height });
}

fn keybind_context(registry: &Registry) -> &'static str {
    let cursor = registry.input.mouse_position;
    let inside = registry.input.cursor_in_window()
        && registry.viewports.focused.is_some_and(|focused| cursor_in_viewport(registry, focused, cursor));
    if inside {
        CONTEXT_VIEWPORT
    } else {
        CONTEXT_GLOBAL
    }
}
