use std::collections::HashMap;
use std::time::Instant;

#[derive(Clone, Debug, PartialEq)]
pub struct SystemTimingSummary {
    pub name: String,
    pub last_ms: f32,
    pub average_ms: f32,
    pub max_ms: f32,
    pub samples: u64,
}

#[derive(Default, Debug)]
struct SystemTiming {
    last_ms: f32,
    total_ms: f32,
    max_ms: f32,
    samples: u64,
}

/// Per-system wall-clock timings, keyed by `"<stage>/<system>"`.
#[derive(Default, Debug)]
pub struct SystemProfiler {
    timings: HashMap<String, SystemTiming>,
}

impl SystemProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&mut self, name: String) -> SystemProfileScope<'_> {
        SystemProfileScope { name: Some(name), profiler: self, start: Instant::now() }
    }

    fn record(&mut self, name: String, duration: f32) {
        let entry = self.timings.entry(name).or_default();
        entry.last_ms = duration;
        entry.max_ms = entry.max_ms.max(duration);
        entry.total_ms += duration;
        entry.samples += 1;
    }

    pub fn forget(&mut self, name: &str) {
        self.timings.remove(name);
    }

    /// Slowest-last-frame first.
    pub fn summaries(&self) -> Vec<SystemTimingSummary> {
        let mut out: Vec<SystemTimingSummary> = self
            .timings
            .iter()
            .map(|(name, timing)| SystemTimingSummary {
                name: name.clone(),
                last_ms: timing.last_ms,
                average_ms: if timing.samples == 0 { 0.0 } else { timing.total_ms / timing.samples as f32 },
                max_ms: timing.max_ms,
                samples: timing.samples,
            })
            .collect();
        out.sort_by(|a, b| b.last_ms.total_cmp(&a.last_ms).then_with(|| a.name.cmp(&b.name)));
        out
    }
}

pub struct SystemProfileScope<'a> {
    name: Option<String>,
    profiler: &'a mut SystemProfiler,
    start: Instant,
}

impl Drop for SystemProfileScope<'_> {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_secs_f32() * 1000.0;
        if let Some(name) = self.name.take() {
            self.profiler.record(name, duration_ms);
        }
    }
}
