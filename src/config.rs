use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/viewer.json";

/// Initial window setup. None of these fields are consulted after startup.
#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "WindowConfig::default_title")]
    pub title: String,
    #[serde(default = "WindowConfig::default_width")]
    pub width: u32,
    #[serde(default = "WindowConfig::default_height")]
    pub height: u32,
    #[serde(default)]
    pub x: Option<i32>,
    #[serde(default)]
    pub y: Option<i32>,
    /// Index into the platform's monitor list.
    #[serde(default)]
    pub monitor: Option<usize>,
    #[serde(default)]
    pub fullscreen: bool,
    #[serde(default = "WindowConfig::default_vsync")]
    pub vsync: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IblConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "IblConfig::default_resolution")]
    pub resolution: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameConfig {
    #[serde(default = "FrameConfig::default_max_tasks_per_frame")]
    pub max_tasks_per_frame: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub bindings: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub ibl: IblConfig,
    #[serde(default)]
    pub frame: FrameConfig,
    #[serde(default)]
    pub input: InputConfig,
}

#[derive(Debug, Clone, Default)]
pub struct AppConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub vsync: Option<bool>,
    pub ibl: Option<PathBuf>,
}

impl WindowConfig {
    fn default_title() -> String {
        "Mesh Viewer".to_string()
    }

    const fn default_width() -> u32 {
        1920
    }

    const fn default_height() -> u32 {
        1080
    }

    const fn default_vsync() -> bool {
        true
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: Self::default_title(),
            width: Self::default_width(),
            height: Self::default_height(),
            x: None,
            y: None,
            monitor: None,
            fullscreen: false,
            vsync: Self::default_vsync(),
        }
    }
}

impl IblConfig {
    const fn default_resolution() -> u32 {
        256
    }
}

impl Default for IblConfig {
    fn default() -> Self {
        Self { path: None, resolution: Self::default_resolution() }
    }
}

impl FrameConfig {
    const fn default_max_tasks_per_frame() -> usize {
        16
    }

    /// Tasks drained per frame. Never zero, so queued work always progresses.
    pub fn task_budget(&self) -> usize {
        self.max_tasks_per_frame.max(1)
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { max_tasks_per_frame: Self::default_max_tasks_per_frame() }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut cfg: Self = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        if cfg.frame.max_tasks_per_frame == 0 {
            log::warn!("[config] frame.max_tasks_per_frame is 0 in {}, using 1", path.display());
            cfg.frame.max_tasks_per_frame = 1;
        }
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("[config] {err:#}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &AppConfigOverrides) {
        if let Some(width) = overrides.width {
            self.window.width = width;
        }
        if let Some(height) = overrides.height {
            self.window.height = height;
        }
        if let Some(vsync) = overrides.vsync {
            self.window.vsync = vsync;
        }
        if let Some(ibl) = &overrides.ibl {
            self.ibl.path = Some(ibl.clone());
        }
    }
}

impl AppConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none() && self.vsync.is_none() && self.ibl.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.width.is_some() {
            fields.push("width");
        }
        if self.height.is_some() {
            fields.push("height");
        }
        if self.vsync.is_some() {
            fields.push("vsync");
        }
        if self.ibl.is_some() {
            fields.push("ibl");
        }
        fields
    }
}
