use std::time::{Duration, Instant};

/// Wall clock sampled once per frame by the `update_time` Init system.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start: Instant,
    last: Instant,
    pub delta: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self { start: now, last: now, delta: Duration::ZERO }
    }

    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = now - self.last;
        self.last = now;
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn elapsed_seconds(&self) -> f32 {
        self.last.duration_since(self.start).as_secs_f32()
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Time values systems read during a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlobalTime {
    pub frame: u64,
    pub delta_seconds: f32,
    pub elapsed_seconds: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Time {
    clock: FrameClock,
    pub global: GlobalTime,
}

impl Time {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self) {
        self.clock.tick();
        self.global.frame += 1;
        self.global.delta_seconds = self.clock.delta_seconds();
        self.global.elapsed_seconds = self.clock.elapsed_seconds();
    }
}
