//! Windowing boundary: event polling, size, close requests and presentation.

use crate::config::WindowConfig;
use crate::input::InputEvent;
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use winit::application::ApplicationHandler;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Fullscreen, Window, WindowId};

const CREATE_ATTEMPTS: usize = 32;

/// Edge-triggered notifications produced by [`WindowBackend::poll_events`].
#[derive(Debug, Clone)]
pub enum WindowSignal {
    Input(InputEvent),
    Resized(PhysicalSize<u32>),
    CloseRequested,
    FileDropped(PathBuf),
}

pub trait WindowBackend {
    /// Pumps pending OS events and returns what happened since the last call.
    fn poll_events(&mut self) -> Vec<WindowSignal>;

    fn size(&self) -> PhysicalSize<u32>;

    fn set_size(&mut self, size: PhysicalSize<u32>);

    fn request_close(&mut self);

    fn should_close(&self) -> bool;

    fn present(&mut self) {}
}

struct WindowHandler {
    config: WindowConfig,
    window: Option<Arc<Window>>,
    signals: Vec<WindowSignal>,
    error: Option<anyhow::Error>,
}

impl ApplicationHandler for WindowHandler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.error.is_some() {
            return;
        }
        match create_window(event_loop, &self.config) {
            Ok(window) => self.window = Some(Arc::new(window)),
            Err(err) => self.error = Some(err),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match &event {
            WindowEvent::CloseRequested => self.signals.push(WindowSignal::CloseRequested),
            WindowEvent::Resized(size) => self.signals.push(WindowSignal::Resized(*size)),
            WindowEvent::DroppedFile(path) => self.signals.push(WindowSignal::FileDropped(path.clone())),
            _ => {
                let input = InputEvent::from_window_event(&event);
                if !matches!(input, InputEvent::Other) {
                    self.signals.push(WindowSignal::Input(input));
                }
            }
        }
    }
}

fn create_window(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Window> {
    let mut attrs = Window::default_attributes()
        .with_title(config.title.clone())
        .with_inner_size(PhysicalSize::new(config.width, config.height));
    let monitor = config.monitor.and_then(|index| {
        let found = event_loop.available_monitors().nth(index);
        if found.is_none() {
            log::warn!("[window] monitor {index} not found, using the primary monitor");
        }
        found
    });
    if config.fullscreen {
        attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(monitor)));
    } else if let (Some(x), Some(y)) = (config.x, config.y) {
        attrs = attrs.with_position(PhysicalPosition::new(x, y));
    } else if let Some(monitor) = monitor {
        attrs = attrs.with_position(monitor.position());
    }
    event_loop.create_window(attrs).context("Failed to create window")
}

/// winit window driven in poll mode with `pump_app_events`, so the frame loop
/// stays in control of the thread.
pub struct WinitWindow {
    event_loop: EventLoop<()>,
    handler: WindowHandler,
    close_requested: bool,
}

impl WinitWindow {
    pub fn new(config: &WindowConfig) -> Result<Self> {
        let event_loop = EventLoop::new().context("Failed to create event loop")?;
        let mut window = Self {
            event_loop,
            handler: WindowHandler { config: config.clone(), window: None, signals: Vec::new(), error: None },
            close_requested: false,
        };
        for _ in 0..CREATE_ATTEMPTS {
            if let PumpStatus::Exit(code) =
                window.event_loop.pump_app_events(Some(Duration::from_millis(10)), &mut window.handler)
            {
                return Err(anyhow!("Event loop exited with code {code} during startup"));
            }
            if let Some(err) = window.handler.error.take() {
                return Err(err);
            }
            if window.handler.window.is_some() {
                log::info!("[window] created '{}' ({}x{})", config.title, config.width, config.height);
                return Ok(window);
            }
        }
        Err(anyhow!("Window was not created after {CREATE_ATTEMPTS} event loop iterations"))
    }

    pub fn window(&self) -> Option<Arc<Window>> {
        self.handler.window.clone()
    }
}

impl WindowBackend for WinitWindow {
    fn poll_events(&mut self) -> Vec<WindowSignal> {
        if let PumpStatus::Exit(_) = self.event_loop.pump_app_events(Some(Duration::ZERO), &mut self.handler) {
            self.handler.signals.push(WindowSignal::CloseRequested);
        }
        std::mem::take(&mut self.handler.signals)
    }

    fn size(&self) -> PhysicalSize<u32> {
        self.handler
            .window
            .as_ref()
            .map_or(PhysicalSize::new(self.handler.config.width, self.handler.config.height), |w| w.inner_size())
    }

    fn set_size(&mut self, size: PhysicalSize<u32>) {
        if let Some(window) = &self.handler.window {
            let _ = window.request_inner_size(size);
        }
    }

    fn request_close(&mut self) {
        self.close_requested = true;
    }

    fn should_close(&self) -> bool {
        self.close_requested
    }

    fn present(&mut self) {
        if let Some(window) = &self.handler.window {
            window.pre_present_notify();
        }
    }
}

#[derive(Debug, Default)]
struct HeadlessState {
    pending: Vec<WindowSignal>,
    presents: u64,
}

/// Handle for feeding a [`HeadlessWindow`] after it has been boxed.
#[derive(Debug, Clone, Default)]
pub struct HeadlessHandle {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessHandle {
    /// Queues `signal` for the next poll.
    pub fn push(&self, signal: WindowSignal) {
        self.lock().pending.push(signal);
    }

    pub fn presents(&self) -> u64 {
        self.lock().presents
    }

    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Window without an OS surface, for offscreen runs and tests.
#[derive(Debug)]
pub struct HeadlessWindow {
    size: PhysicalSize<u32>,
    close_requested: bool,
    handle: HeadlessHandle,
}

impl HeadlessWindow {
    pub fn new(size: PhysicalSize<u32>) -> Self {
        Self { size, close_requested: false, handle: HeadlessHandle::default() }
    }

    pub fn handle(&self) -> HeadlessHandle {
        self.handle.clone()
    }
}

impl WindowBackend for HeadlessWindow {
    fn poll_events(&mut self) -> Vec<WindowSignal> {
        let signals = std::mem::take(&mut self.handle.lock().pending);
        for signal in &signals {
            if let WindowSignal::Resized(size) = signal {
                self.size = *size;
            }
        }
        signals
    }

    fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    fn set_size(&mut self, size: PhysicalSize<u32>) {
        if size != self.size {
            self.handle.push(WindowSignal::Resized(size));
        }
    }

    fn request_close(&mut self) {
        self.close_requested = true;
    }

    fn should_close(&self) -> bool {
        self.close_requested
    }

    fn present(&mut self) {
        self.handle.lock().presents += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_signals_are_delivered_once() {
        let mut window = HeadlessWindow::new(PhysicalSize::new(640, 480));
        let handle = window.handle();
        handle.push(WindowSignal::CloseRequested);
        assert_eq!(window.poll_events().len(), 1);
        assert!(window.poll_events().is_empty());
    }

    #[test]
    fn set_size_is_reported_as_resize() {
        let mut window = HeadlessWindow::new(PhysicalSize::new(640, 480));
        window.set_size(PhysicalSize::new(800, 600));
        let signals = window.poll_events();
        assert!(matches!(signals.as_slice(), [WindowSignal::Resized(size)] if size.width == 800));
        assert_eq!(window.size(), PhysicalSize::new(800, 600));
    }
}
