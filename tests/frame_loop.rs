use anyhow::{anyhow, Result};
use glam::Vec3;
use meshview::config::AppConfig;
use meshview::ecs::{add_mesh, Aabb, MeshDataDirty, Transform, WorldBounds};
use meshview::events::ViewerEvent;
use meshview::input::InputEvent;
use meshview::layers::{is_in_layer, Layers};
use meshview::renderer::{NullBackend, RenderBackend, RenderError, ViewportRenderRequest};
use meshview::scheduler::Stage;
use meshview::selection::{hover, is_selected, select, Hovered, Selected};
use meshview::viewport::ViewportComponent;
use meshview::window::{HeadlessHandle, HeadlessWindow, WindowSignal};
use meshview::{Registry, Viewer, ViewerState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use winit::dpi::PhysicalSize;
use winit::event::MouseButton;

fn headless_viewer(config: AppConfig) -> (Viewer, HeadlessHandle) {
    let window = HeadlessWindow::new(PhysicalSize::new(800, 600));
    let handle = window.handle();
    let viewer = Viewer::with_backends(config, Box::new(window), Box::new(NullBackend::new()));
    (viewer, handle)
}

fn unit_cube(registry: &mut Registry, name: &str) -> bevy_ecs::entity::Entity {
    let bounds = Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5));
    add_mesh(registry, name, "cube", bounds, Transform::default(), None)
}

struct ShaderFailingBackend {
    presents: Arc<AtomicU64>,
}

impl RenderBackend for ShaderFailingBackend {
    fn label(&self) -> &str {
        "failing"
    }

    fn render_viewport(&mut self, _request: &ViewportRenderRequest<'_>) -> Result<(), RenderError> {
        Err(RenderError::new("shader compilation failed").with_detail("pbr.wgsl:12: unknown identifier"))
    }

    fn present(&mut self, _focused: Option<bevy_ecs::entity::Entity>) -> Result<()> {
        self.presents.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn render_failures_are_recorded_and_the_loop_continues() {
    let presents = Arc::new(AtomicU64::new(0));
    let window = HeadlessWindow::new(PhysicalSize::new(640, 480));
    let backend = ShaderFailingBackend { presents: presents.clone() };
    let mut viewer = Viewer::with_backends(AppConfig::default(), Box::new(window), Box::new(backend));
    let post_runs = Arc::new(AtomicU64::new(0));
    let counter = post_runs.clone();
    viewer.systems_mut().add(Stage::Post, "count_post", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    for _ in 0..3 {
        assert!(viewer.run_frame(|_| true).expect("render failures are not fatal"));
    }
    let err = viewer.last_render_error().expect("render error recorded");
    assert_eq!(err.message, "shader compilation failed");
    assert_eq!(err.detail.as_deref(), Some("pbr.wgsl:12: unknown identifier"));
    assert_eq!(viewer.frame_count(), 3);
    assert_eq!(presents.load(Ordering::SeqCst), 3, "present still runs after a failed render");
    assert_eq!(post_runs.load(Ordering::SeqCst), 3);
}

#[test]
fn other_stage_failures_propagate() {
    let (mut viewer, _) = headless_viewer(AppConfig::default());
    viewer.systems_mut().add(Stage::Simulation, "explode", |_| Err(anyhow!("simulation broke")));
    let err = viewer.run(|_| true).unwrap_err();
    assert_eq!(err.root_cause().to_string(), "simulation broke");
    assert_eq!(viewer.state(), ViewerState::Stopped);
}

#[test]
fn layer_bits_match_markers_after_a_frame() {
    let (mut viewer, _) = headless_viewer(AppConfig::default());
    let registry = viewer.registry_mut().unwrap();
    let a = unit_cube(registry, "a");
    let b = unit_cube(registry, "b");
    let c = unit_cube(registry, "c");
    select(registry, a);
    hover(registry, b);

    viewer.run_frame(|_| true).unwrap();
    let registry = viewer.registry_mut().unwrap();
    for entity in [a, b, c] {
        let world = &registry.world;
        assert_eq!(world.get::<Selected>(entity).is_some(), is_in_layer(world, entity, Layers::SELECTION));
        assert_eq!(world.get::<Hovered>(entity).is_some(), is_in_layer(world, entity, Layers::HOVER));
    }
    assert!(is_in_layer(&registry.world, a, Layers::SELECTION));

    viewer.run_on_main_thread(move |registry| {
        meshview::selection::deselect(registry, a);
    });
    viewer.run_frame(|_| true).unwrap();
    let world = &viewer.registry().unwrap().world;
    assert!(!is_in_layer(world, a, Layers::SELECTION));
}

#[test]
fn clicking_a_mesh_selects_it() {
    let (mut viewer, window) = headless_viewer(AppConfig::default());
    let cube = unit_cube(viewer.registry_mut().unwrap(), "cube");

    window.push(WindowSignal::Input(InputEvent::CursorPos { x: 400.0, y: 300.0 }));
    viewer.run_frame(|_| true).unwrap();
    viewer.run_frame(|_| true).unwrap();
    assert!(meshview::selection::is_hovered(viewer.registry().unwrap(), cube));

    window.push(WindowSignal::Input(InputEvent::MouseButton { button: MouseButton::Left, pressed: true }));
    viewer.run_frame(|_| true).unwrap();
    let registry = viewer.registry().unwrap();
    assert_eq!(registry.input.context, "viewport");
    assert!(is_selected(registry, cube));
}

#[test]
fn close_signal_finishes_the_frame_then_stops() {
    let (mut viewer, window) = headless_viewer(AppConfig::default());
    window.push(WindowSignal::CloseRequested);
    let mut frames = 0;
    assert!(viewer
        .run(|_| {
            frames += 1;
            true
        })
        .unwrap());
    assert_eq!(frames, 1);
    assert_eq!(viewer.state(), ViewerState::Stopped);
    let events = viewer.registry_mut().unwrap().drain_events();
    assert_eq!(events.last(), Some(&ViewerEvent::WindowClosed));
    assert!(!viewer.run_frame(|_| true).unwrap(), "a stopped viewer runs no frames");
}

#[test]
fn resize_updates_main_and_auxiliary_viewports() {
    let (mut viewer, window) = headless_viewer(AppConfig::default());
    window.push(WindowSignal::Resized(PhysicalSize::new(1024, 768)));
    viewer.run_frame(|_| true).unwrap();

    let registry = viewer.registry_mut().unwrap();
    assert_eq!(registry.window_size, PhysicalSize::new(1024, 768));
    for slot in [registry.viewports.main, registry.viewports.selection, registry.viewports.object_id] {
        let viewport = registry.world.get::<ViewportComponent>(slot.unwrap()).unwrap();
        assert_eq!((viewport.width, viewport.height), (1024, 768));
    }
    assert!(registry.drain_events().contains(&ViewerEvent::WindowResized { width: 1024, height: 768 }));
}

#[test]
fn post_stage_clears_dirty_markers() {
    let (mut viewer, _) = headless_viewer(AppConfig::default());
    let cube = unit_cube(viewer.registry_mut().unwrap(), "cube");
    viewer.run_frame(|_| true).unwrap();

    let world = &viewer.registry().unwrap().world;
    assert!(world.get::<MeshDataDirty>(cube).is_none());
    assert!(world.get::<WorldBounds>(cube).is_some());
}

#[test]
fn task_draining_is_bounded_per_frame() {
    let mut config = AppConfig::default();
    config.frame.max_tasks_per_frame = 2;
    let (mut viewer, _) = headless_viewer(config);
    let handles: Vec<_> = (0..5).map(|_| viewer.run_on_main_thread(|_| {})).collect();

    viewer.run_frame(|_| true).unwrap();
    assert_eq!(viewer.task_queue().len(), 3);
    assert_eq!(handles.iter().filter(|h| h.is_done()).count(), 2);
    viewer.run_frame(|_| true).unwrap();
    viewer.run_frame(|_| true).unwrap();
    assert!(handles.iter().all(|h| h.is_done()));
}

#[test]
fn zero_task_budget_still_drains_one_task() {
    let mut config = AppConfig::default();
    config.frame.max_tasks_per_frame = 0;
    let (mut viewer, _) = headless_viewer(config);
    let first = viewer.run_on_main_thread(|_| {});
    let second = viewer.run_on_main_thread(|_| {});

    viewer.run_frame(|_| true).unwrap();
    assert!(first.is_done());
    assert!(!second.is_done());
    viewer.run_frame(|_| true).unwrap();
    assert!(second.is_done());
}

#[test]
fn tasks_from_other_threads_run_on_the_frame_thread() {
    let (mut viewer, _) = headless_viewer(AppConfig::default());
    let queue = viewer.task_queue();
    let handle = thread::spawn(move || {
        queue.submit(|registry| {
            let bounds = Aabb::new(Vec3::ZERO, Vec3::ONE);
            add_mesh(registry, "remote", "cube", bounds, Transform::default(), None);
        })
    })
    .join()
    .expect("producer thread");

    viewer.run_frame(|_| true).unwrap();
    assert!(handle.is_done());
    let registry = viewer.registry_mut().unwrap();
    assert!(registry.scene_bounds.is_some(), "task ran before the Simulation stage");
}

#[test]
fn uninitialized_viewer_is_inert() {
    let window = HeadlessWindow::new(PhysicalSize::new(0, 0));
    let mut viewer = Viewer::with_backends(AppConfig::default(), Box::new(window), Box::new(NullBackend::new()));
    assert_eq!(viewer.state(), ViewerState::NotInitialized);
    assert!(!viewer.run(|_| panic!("no frames without initialization")).unwrap());
    assert_eq!(viewer.frame_count(), 0);
}
