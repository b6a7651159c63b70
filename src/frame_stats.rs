use std::time::{Duration, Instant};

/// Frame clock with a periodic FPS report
#[derive(Debug)]
pub struct FrameStats {
    last_tick: Instant,
    report_interval: Duration,
    frames: u32,
    elapsed: Duration,
    total_frames: u64,
    fps: f32,
}

impl FrameStats {
    pub fn new(report_interval: Duration) -> Self {
        Self {
            last_tick: Instant::now(),
            report_interval,
            frames: 0,
            elapsed: Duration::ZERO,
            total_frames: 0,
            fps: 0.0,
        }
    }

    /// Time since the previous tick, advancing the clock
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now.duration_since(self.last_tick);
        self.last_tick = now;
        delta
    }

    /// Count a rendered frame that took `delta`
    ///
    /// Returns the new FPS value once per report interval.
    pub fn record(&mut self, delta: Duration) -> Option<f32> {
        self.frames += 1;
        self.total_frames += 1;
        self.elapsed += delta;

        if self.elapsed < self.report_interval {
            return None;
        }
        self.fps = self.frames as f32 / self.elapsed.as_secs_f32();
        self.frames = 0;
        self.elapsed = Duration::ZERO;
        Some(self.fps)
    }

    /// Tick and record in one step
    pub fn frame(&mut self) -> Option<f32> {
        let delta = self.tick();
        self.record(delta)
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
