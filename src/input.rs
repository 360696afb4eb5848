use glam::Vec2;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{Key, NamedKey};

pub const CONTEXT_GLOBAL: &str = "global";
pub const CONTEXT_VIEWPORT: &str = "viewport";

pub const ACTION_RELOAD: &str = "global.reload";
pub const ACTION_VIEWPORT_SELECT: &str = "viewport.select";
pub const ACTION_CAMERA_ROTATE: &str = "viewport.camera.rotate";
pub const ACTION_CAMERA_PAN: &str = "viewport.camera.pan";
pub const ACTION_CAMERA_FOCUS: &str = "viewport.camera.focus";

/// Per-frame input owned by the frame driver. Window callbacks only append to
/// the queues and accumulate deltas; [`InputState::process`] applies at most
/// one key and one mouse-button transition per frame.
#[derive(Debug, Default)]
pub struct InputState {
    pub keybinds: Keybinds,
    pub mouse_position: Vec2,
    pub mouse_delta: Vec2,
    pub wheel: f32,
    /// Keybind context applied by the last [`InputState::process`].
    pub context: String,
    cursor_known: bool,
    cursor_in_window: bool,
    key_queue: VecDeque<(InputKey, bool)>,
    mouse_queue: VecDeque<(InputKey, bool)>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(path: impl AsRef<Path>) -> Self {
        Self::with_keybinds(Keybinds::load_or_default(path))
    }

    pub fn with_keybinds(keybinds: Keybinds) -> Self {
        Self { keybinds, ..Self::default() }
    }

    pub fn push(&mut self, ev: InputEvent) {
        match ev {
            InputEvent::Key { key, pressed } => {
                if let Some(key) = InputKey::from_event_key(&key) {
                    self.key_queue.push_back((key, pressed));
                }
            }
            InputEvent::MouseButton { button, pressed } => {
                if let Some(code) = MouseCode::from_button(button) {
                    self.mouse_queue.push_back((InputKey::Mouse(code), pressed));
                }
            }
            InputEvent::CursorPos { x, y } => {
                let position = Vec2::new(x, y);
                if self.cursor_known {
                    self.mouse_delta += position - self.mouse_position;
                }
                self.mouse_position = position;
                self.cursor_known = true;
                self.cursor_in_window = true;
            }
            InputEvent::CursorLeft => {
                self.cursor_in_window = false;
            }
            InputEvent::Wheel { delta } => {
                self.wheel += delta;
            }
            InputEvent::Other => {}
        }
    }

    pub fn reset_deltas(&mut self) {
        self.mouse_delta = Vec2::ZERO;
        self.wheel = 0.0;
    }

    /// Applies one queued key transition and one queued mouse transition, then
    /// advances the keybind edge states for `context`.
    pub fn process(&mut self, context: &str) {
        if let Some((key, pressed)) = self.key_queue.pop_front() {
            self.keybinds.set_key_state(key, pressed);
        }
        if let Some((key, pressed)) = self.mouse_queue.pop_front() {
            self.keybinds.set_key_state(key, pressed);
        }
        self.keybinds.update(context);
        if self.context != context {
            self.context = context.to_string();
        }
    }

    /// False until the first cursor position arrives from the window.
    pub fn cursor_known(&self) -> bool {
        self.cursor_known
    }

    /// True between a cursor position and the window reporting the cursor left.
    pub fn cursor_in_window(&self) -> bool {
        self.cursor_in_window
    }

    pub fn pending_transitions(&self) -> usize {
        self.key_queue.len() + self.mouse_queue.len()
    }

    pub fn consume_wheel_delta(&mut self) -> Option<f32> {
        if self.wheel.abs() > 0.0 {
            let d = self.wheel;
            self.wheel = 0.0;
            Some(d)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyState {
    #[default]
    Up,
    Pressed,
    Down,
    Released,
}

impl KeyState {
    fn advance(self, held: bool) -> Self {
        match (self, held) {
            (KeyState::Up | KeyState::Released, true) => KeyState::Pressed,
            (KeyState::Pressed | KeyState::Down, true) => KeyState::Down,
            (KeyState::Pressed | KeyState::Down, false) => KeyState::Released,
            (KeyState::Up | KeyState::Released, false) => KeyState::Up,
        }
    }
}

type Chord = Vec<InputKey>;

#[derive(Debug, Clone, Default)]
struct ActionBinding {
    chords: Vec<Chord>,
    state: KeyState,
}

/// Named actions (`<context>.<name>`) bound to key chords. `global.*` actions
/// are live in every context; other actions only while their context is active.
#[derive(Debug, Clone)]
pub struct Keybinds {
    actions: BTreeMap<String, ActionBinding>,
    down: HashSet<InputKey>,
}

impl Default for Keybinds {
    fn default() -> Self {
        let mut keybinds = Self::empty();
        for (action, chords) in default_action_map() {
            for chord in chords {
                keybinds.add(action, chord);
            }
        }
        keybinds
    }
}

impl Keybinds {
    pub fn empty() -> Self {
        Self { actions: BTreeMap::new(), down: HashSet::new() }
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<InputConfigFile>(&contents) {
                Ok(config) => Self::from_config(config, &path.display().to_string()),
                Err(err) => {
                    log::warn!(
                        "[input] Failed to parse {}: {err}. Falling back to default bindings.",
                        path.display()
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[input] Failed to read {}: {err}. Falling back to default bindings.",
                    path.display()
                );
                Self::default()
            }
        }
    }

    fn from_config(config: InputConfigFile, origin: &str) -> Self {
        let mut keybinds = Self::default();
        for (action, chords) in config.into_overrides(origin) {
            keybinds.clear(&action);
            for chord in chords {
                keybinds.add(&action, chord);
            }
        }
        keybinds
    }

    pub fn add(&mut self, action: &str, chord: Vec<InputKey>) {
        if chord.is_empty() {
            return;
        }
        self.actions.entry(action.to_string()).or_default().chords.push(chord);
    }

    /// Drops every chord bound to `action`; the action itself stays known.
    pub fn clear(&mut self, action: &str) {
        if let Some(binding) = self.actions.get_mut(action) {
            binding.chords.clear();
        }
    }

    pub fn has_action(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn set_key_state(&mut self, key: InputKey, pressed: bool) {
        if pressed {
            self.down.insert(key);
        } else {
            self.down.remove(&key);
        }
    }

    pub fn is_key_down(&self, key: &InputKey) -> bool {
        self.down.contains(key)
    }

    /// Advances every action's edge state from the current key set.
    pub fn update(&mut self, context: &str) {
        let down = &self.down;
        for (name, binding) in &mut self.actions {
            let live = action_context(name) == CONTEXT_GLOBAL || action_context(name) == context;
            let held = live && binding.chords.iter().any(|chord| chord.iter().all(|key| down.contains(key)));
            binding.state = binding.state.advance(held);
        }
    }

    pub fn state(&self, action: &str) -> KeyState {
        self.actions.get(action).map_or(KeyState::Up, |binding| binding.state)
    }

    pub fn is_down(&self, action: &str) -> bool {
        matches!(self.state(action), KeyState::Pressed | KeyState::Down)
    }

    pub fn is_pressed(&self, action: &str) -> bool {
        self.state(action) == KeyState::Pressed
    }

    pub fn is_released(&self, action: &str) -> bool {
        self.state(action) == KeyState::Released
    }
}

fn action_context(action: &str) -> &str {
    action.split_once('.').map_or(action, |(context, _)| context)
}

fn default_action_map() -> Vec<(&'static str, Vec<Chord>)> {
    use crate::selection::{ACTION_SELECTION_ADD, ACTION_SELECTION_REMOVE};
    vec![
        (ACTION_SELECTION_ADD, vec![vec![InputKey::named(NamedKeyCode::Shift)]]),
        (ACTION_SELECTION_REMOVE, vec![vec![InputKey::named(NamedKeyCode::Control)]]),
        (ACTION_RELOAD, vec![vec![InputKey::named(NamedKeyCode::F5)]]),
        (ACTION_VIEWPORT_SELECT, vec![vec![InputKey::Mouse(MouseCode::Left)]]),
        (ACTION_CAMERA_ROTATE, vec![vec![InputKey::Mouse(MouseCode::Right)]]),
        (ACTION_CAMERA_PAN, vec![vec![InputKey::Mouse(MouseCode::Middle)]]),
        (ACTION_CAMERA_FOCUS, vec![vec![InputKey::character("f")]]),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InputKey {
    Character(String),
    Named(NamedKeyCode),
    Mouse(MouseCode),
}

impl InputKey {
    pub fn character(ch: &str) -> Self {
        Self::Character(ch.to_lowercase())
    }

    pub fn named(named: NamedKeyCode) -> Self {
        Self::Named(named)
    }

    fn from_event_key(key: &Key) -> Option<Self> {
        match key {
            Key::Character(ch) => {
                let s = ch.to_string();
                if s.is_empty() {
                    None
                } else {
                    Some(Self::Character(s.to_lowercase()))
                }
            }
            Key::Named(named) => NamedKeyCode::from_named_key(named).map(Self::Named),
            _ => None,
        }
    }

    fn from_config_value(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        if let Some(named) = NamedKeyCode::from_str(&normalized) {
            return Some(Self::Named(named));
        }
        if let Some(code) = MouseCode::from_str(&normalized) {
            return Some(Self::Mouse(code));
        }
        if normalized.chars().count() == 1 {
            return Some(Self::Character(normalized));
        }
        None
    }

    /// Parses `"ctrl+shift+a"` style chords.
    fn chord_from_config_value(raw: &str) -> Option<Chord> {
        raw.split('+').map(Self::from_config_value).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKeyCode {
    Space,
    Shift,
    Control,
    Alt,
    Escape,
    Enter,
    Tab,
    Delete,
    F5,
}

impl NamedKeyCode {
    fn from_named_key(key: &NamedKey) -> Option<Self> {
        match key {
            NamedKey::Space => Some(Self::Space),
            NamedKey::Shift => Some(Self::Shift),
            NamedKey::Control => Some(Self::Control),
            NamedKey::Alt => Some(Self::Alt),
            NamedKey::Escape => Some(Self::Escape),
            NamedKey::Enter => Some(Self::Enter),
            NamedKey::Tab => Some(Self::Tab),
            NamedKey::Delete => Some(Self::Delete),
            NamedKey::F5 => Some(Self::F5),
            _ => None,
        }
    }

    fn from_str(value: &str) -> Option<Self> {
        match value {
            "space" => Some(Self::Space),
            "shift" | "left_shift" | "right_shift" => Some(Self::Shift),
            "ctrl" | "control" | "left_ctrl" | "right_ctrl" => Some(Self::Control),
            "alt" | "left_alt" | "right_alt" => Some(Self::Alt),
            "escape" | "esc" => Some(Self::Escape),
            "enter" | "return" => Some(Self::Enter),
            "tab" => Some(Self::Tab),
            "delete" | "del" => Some(Self::Delete),
            "f5" => Some(Self::F5),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseCode {
    Left,
    Right,
    Middle,
}

impl MouseCode {
    fn from_button(button: MouseButton) -> Option<Self> {
        match button {
            MouseButton::Left => Some(Self::Left),
            MouseButton::Right => Some(Self::Right),
            MouseButton::Middle => Some(Self::Middle),
            _ => None,
        }
    }

    fn from_str(value: &str) -> Option<Self> {
        match value {
            "mouse_left" | "lmb" => Some(Self::Left),
            "mouse_right" | "rmb" => Some(Self::Right),
            "mouse_middle" | "mmb" => Some(Self::Middle),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InputConfigFile {
    #[serde(default)]
    bindings: HashMap<String, Vec<String>>,
}

impl InputConfigFile {
    fn into_overrides(self, origin: &str) -> Vec<(String, Vec<Chord>)> {
        let known: HashSet<&str> = default_action_map().into_iter().map(|(action, _)| action).collect();
        let mut overrides = Vec::new();
        for (action_name, chords) in self.bindings {
            let action = action_name.trim().to_lowercase();
            if !known.contains(action.as_str()) {
                log::warn!("[input] {origin}: unknown action '{action_name}', ignoring.");
                continue;
            }
            let mut parsed = Vec::new();
            for chord in chords {
                match InputKey::chord_from_config_value(&chord) {
                    Some(keys) => parsed.push(keys),
                    None => log::warn!(
                        "[input] {origin}: unknown key '{chord}' for action '{action_name}', ignoring."
                    ),
                }
            }
            if parsed.is_empty() {
                log::warn!("[input] {origin}: action '{action_name}' has no valid keys, keeping defaults.");
                continue;
            }
            overrides.push((action, parsed));
        }
        overrides
    }
}

#[derive(Debug, Clone)]
pub enum InputEvent {
    Key { key: Key, pressed: bool },
    Wheel { delta: f32 },
    MouseButton { button: MouseButton, pressed: bool },
    CursorPos { x: f32, y: f32 },
    CursorLeft,
    Other,
}

impl InputEvent {
    pub fn from_window_event(ev: &WindowEvent) -> Self {
        match ev {
            WindowEvent::MouseWheel { delta, .. } => {
                let d = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32,
                };
                InputEvent::Wheel { delta: d }
            }
            WindowEvent::CursorMoved { position, .. } => {
                InputEvent::CursorPos { x: position.x as f32, y: position.y as f32 }
            }
            WindowEvent::CursorLeft { .. } => InputEvent::CursorLeft,
            WindowEvent::MouseInput { state, button, .. } => {
                InputEvent::MouseButton { button: *button, pressed: *state == ElementState::Pressed }
            }
            WindowEvent::KeyboardInput { event, .. } => InputEvent::Key {
                key: event.logical_key.clone(),
                pressed: event.state == ElementState::Pressed,
            },
            _ => InputEvent::Other,
        }
    }

}
