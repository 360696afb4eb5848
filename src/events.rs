use bevy_ecs::prelude::{Entity, Resource};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    Selected { entity: Entity },
    Deselected { entity: Entity },
    Hovered { entity: Entity },
    Dehovered { entity: Entity },
    WindowResized { width: u32, height: u32 },
    WindowClosed,
    FileDropped { path: PathBuf },
}

impl ViewerEvent {
    pub fn entity(&self) -> Option<Entity> {
        match self {
            ViewerEvent::Selected { entity }
            | ViewerEvent::Deselected { entity }
            | ViewerEvent::Hovered { entity }
            | ViewerEvent::Dehovered { entity } => Some(*entity),
            _ => None,
        }
    }
}

impl fmt::Display for ViewerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewerEvent::Selected { entity } => write!(f, "Selected entity={}", entity.index()),
            ViewerEvent::Deselected { entity } => write!(f, "Deselected entity={}", entity.index()),
            ViewerEvent::Hovered { entity } => write!(f, "Hovered entity={}", entity.index()),
            ViewerEvent::Dehovered { entity } => write!(f, "Dehovered entity={}", entity.index()),
            ViewerEvent::WindowResized { width, height } => {
                write!(f, "WindowResized width={width} height={height}")
            }
            ViewerEvent::WindowClosed => write!(f, "WindowClosed"),
            ViewerEvent::FileDropped { path } => write!(f, "FileDropped path={}", path.display()),
        }
    }
}

pub type EventListener = Box<dyn FnMut(&ViewerEvent) + Send + Sync>;

/// Synchronous event bus. Listeners run inside [`EventBus::publish`], at the
/// point of mutation; the event is also kept in a log until drained.
#[derive(Default, Resource)]
pub struct EventBus {
    events: Vec<ViewerEvent>,
    listeners: Vec<EventListener>,
}

impl EventBus {
    pub fn publish(&mut self, event: ViewerEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
        self.events.push(event);
    }

    pub fn subscribe(&mut self, listener: EventListener) {
        self.listeners.push(listener);
    }

    pub fn pending(&self) -> &[ViewerEvent] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<ViewerEvent> {
        self.events.drain(..).collect()
    }
}
