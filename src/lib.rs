pub mod app;
pub mod camera3d;
pub mod cli;
pub mod config;
pub mod ecs;
pub mod events;
pub mod ibl;
pub mod input;
pub mod layers;
pub mod profiler;
pub mod registry;
pub mod renderer;
pub mod scheduler;
pub mod selection;
pub mod task_queue;
pub mod time;
pub mod tools;
pub mod viewport;
pub mod window;

#[cfg(feature = "gpu")]
pub use app::run_with_overrides;
pub use app::{Viewer, ViewerState};
pub use registry::Registry;
