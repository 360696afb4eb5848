//! Staged systems: named callables grouped into the five frame stages and run
//! in registration order.

use crate::profiler::{SystemProfiler, SystemTimingSummary};
use crate::registry::Registry;
use anyhow::{Context, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Init,
    Interface,
    Simulation,
    Render,
    Post,
}

impl Stage {
    /// Frame order.
    pub const ALL: [Stage; 5] = [Stage::Init, Stage::Interface, Stage::Simulation, Stage::Render, Stage::Post];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "Init",
            Stage::Interface => "Interface",
            Stage::Simulation => "Simulation",
            Stage::Render => "Render",
            Stage::Post => "Post",
        };
        f.write_str(name)
    }
}

pub type SystemFn = Box<dyn FnMut(&mut Registry) -> Result<()>>;

struct NamedSystem {
    name: String,
    run: SystemFn,
}

#[derive(Default)]
pub struct Systems {
    stages: [Vec<NamedSystem>; 5],
    profiler: SystemProfiler,
}

impl Systems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `system` to `stage`. A system already registered under the same
    /// name is replaced in place, keeping its position; returns `true` then.
    pub fn add<F>(&mut self, stage: Stage, name: impl Into<String>, system: F) -> bool
    where
        F: FnMut(&mut Registry) -> Result<()> + 'static,
    {
        let name = name.into();
        let systems = &mut self.stages[stage.index()];
        if let Some(existing) = systems.iter_mut().find(|s| s.name == name) {
            log::warn!("[systems] replacing system '{name}' in stage {stage}");
            existing.run = Box::new(system);
            return true;
        }
        systems.push(NamedSystem { name, run: Box::new(system) });
        false
    }

    pub fn remove(&mut self, stage: Stage, name: &str) -> bool {
        let systems = &mut self.stages[stage.index()];
        let before = systems.len();
        systems.retain(|s| s.name != name);
        let removed = systems.len() != before;
        if removed {
            self.profiler.forget(&profile_key(stage, name));
        }
        removed
    }

    pub fn contains(&self, stage: Stage, name: &str) -> bool {
        self.stages[stage.index()].iter().any(|s| s.name == name)
    }

    pub fn names(&self, stage: Stage) -> Vec<&str> {
        self.stages[stage.index()].iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self, stage: Stage) -> usize {
        self.stages[stage.index()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.iter().all(Vec::is_empty)
    }

    /// Runs every system of `stage` in registration order. The first failure
    /// stops the stage and is returned with the stage and system name attached.
    pub fn run(&mut self, stage: Stage, registry: &mut Registry) -> Result<()> {
        for system in &mut self.stages[stage.index()] {
            let _scope = self.profiler.scope(profile_key(stage, &system.name));
            (system.run)(registry).with_context(|| format!("system '{}' in stage {stage} failed", system.name))?;
        }
        Ok(())
    }

    pub fn timings(&self) -> Vec<SystemTimingSummary> {
        self.profiler.summaries()
    }
}

impl fmt::Debug for Systems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for stage in Stage::ALL {
            map.entry(&stage, &self.names(stage));
        }
        map.finish()
    }
}

fn profile_key(stage: Stage, name: &str) -> String {
    format!("{stage}/{name}")
}
