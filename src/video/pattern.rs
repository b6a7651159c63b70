//! Synthetic test-pattern decoder.
//!
//! Locators look like `pattern:checker;fps=15;rotate=90;size=320x240`. Every
//! option is optional; defaults are 30 fps, upright, 320x240.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use glam::Mat4;
use log::{debug, warn};

use super::decoder::{DecoderFactory, FrameListener, VideoDecoder};
use super::frame::{FrameLatch, VideoFrame};
use crate::error::DecodeError;
use crate::gpu::TextureId;
use crate::math::Orientation;

const SCHEME: &str = "pattern:";
const DEFAULT_FPS: u32 = 30;
const DEFAULT_SIZE: (u32, u32) = (320, 240);
const MAX_FPS: u32 = 240;
/// Largest accepted frame side; matches common 2D texture limits
pub const MAX_FRAME_DIMENSION: u32 = 8192;

/// 75% colour bars: white, yellow, cyan, green, magenta, red, blue, black
const BAR_COLOURS: [[u8; 3]; 8] = [
    [191, 191, 191],
    [191, 191, 0],
    [0, 191, 191],
    [0, 191, 0],
    [191, 0, 191],
    [191, 0, 0],
    [0, 0, 191],
    [0, 0, 0],
];
const CHECKER_CELL: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Vertical colour bars scrolling left
    Bars,
    /// Black and white squares shifting one pixel per frame
    Checker,
    /// Horizontal grey ramp
    Gradient,
    /// Whole frame fading between black and white
    Pulse,
}

impl Pattern {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "bars" => Some(Pattern::Bars),
            "checker" => Some(Pattern::Checker),
            "gradient" => Some(Pattern::Gradient),
            "pulse" => Some(Pattern::Pulse),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Pattern::Bars => "bars",
            Pattern::Checker => "checker",
            Pattern::Gradient => "gradient",
            Pattern::Pulse => "pulse",
        }
    }

    fn colour(self, x: u32, y: u32, width: u32, frame: u64) -> [u8; 3] {
        match self {
            Pattern::Bars => {
                let shifted = (u64::from(x) + frame) % u64::from(width);
                let bar = (shifted * BAR_COLOURS.len() as u64 / u64::from(width)) as usize;
                BAR_COLOURS[bar]
            }
            Pattern::Checker => {
                let shifted = (u64::from(x) + frame) / u64::from(CHECKER_CELL);
                let row = u64::from(y / CHECKER_CELL);
                if (shifted + row) % 2 == 0 {
                    [255, 255, 255]
                } else {
                    [0, 0, 0]
                }
            }
            Pattern::Gradient => {
                let level = (u64::from(x) * 255 / u64::from(width.saturating_sub(1).max(1))) as u8;
                [level, level, level]
            }
            Pattern::Pulse => {
                let phase = (frame % 120) as f32 / 120.0 * std::f32::consts::TAU;
                let level = ((phase.sin() * 0.5 + 0.5) * 255.0).round() as u8;
                [level, level, level]
            }
        }
    }

    /// Render frame number `frame` at the given size
    pub fn render(self, width: u32, height: u32, frame: u64) -> VideoFrame {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let [r, g, b] = self.colour(x, y, width, frame);
                pixels.extend_from_slice(&[r, g, b, 255]);
            }
        }
        VideoFrame::from_parts(width, height, pixels)
    }
}

/// Parsed `pattern:` locator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternSpec {
    pub pattern: Pattern,
    pub fps: u32,
    pub orientation: Orientation,
    pub width: u32,
    pub height: u32,
}

impl PatternSpec {
    pub fn parse(locator: &str) -> Result<Self, DecodeError> {
        let body = locator
            .strip_prefix(SCHEME)
            .ok_or_else(|| DecodeError::UnsupportedLocator(locator.to_string()))?;
        let mut parts = body.split(';');
        let pattern = parts
            .next()
            .and_then(Pattern::from_name)
            .ok_or_else(|| DecodeError::UnsupportedLocator(locator.to_string()))?;

        let invalid = |option: &str| DecodeError::InvalidOption {
            locator: locator.to_string(),
            option: option.to_string(),
        };

        let mut spec = PatternSpec {
            pattern,
            fps: DEFAULT_FPS,
            orientation: Orientation::Upright,
            width: DEFAULT_SIZE.0,
            height: DEFAULT_SIZE.1,
        };
        for option in parts.filter(|part| !part.is_empty()) {
            let (key, value) = option.split_once('=').ok_or_else(|| invalid(option))?;
            match key.trim() {
                "fps" => {
                    spec.fps = value
                        .trim()
                        .parse()
                        .ok()
                        .filter(|fps| (1..=MAX_FPS).contains(fps))
                        .ok_or_else(|| invalid(option))?;
                }
                "rotate" => {
                    spec.orientation = value
                        .trim()
                        .parse()
                        .ok()
                        .and_then(Orientation::from_degrees)
                        .ok_or_else(|| invalid(option))?;
                }
                "size" => {
                    let (width, height) = value
                        .trim()
                        .split_once('x')
                        .and_then(|(w, h)| Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?)))
                        .filter(|(w, h)| {
                            let side = 1..=MAX_FRAME_DIMENSION;
                            side.contains(w) && side.contains(h)
                        })
                        .ok_or_else(|| invalid(option))?;
                    spec.width = width;
                    spec.height = height;
                }
                _ => return Err(invalid(option)),
            }
        }
        Ok(spec)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps))
    }
}

/// Decoder producing a [`Pattern`] on its own thread
pub struct PatternDecoder {
    spec: PatternSpec,
    latch: FrameLatch,
    texture: Option<TextureId>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    released: bool,
}

impl PatternDecoder {
    pub fn new(spec: PatternSpec) -> Self {
        Self {
            spec,
            latch: FrameLatch::new(),
            texture: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            released: false,
        }
    }

    pub fn spec(&self) -> &PatternSpec {
        &self.spec
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl VideoDecoder for PatternDecoder {
    fn attach(&mut self, texture: TextureId) {
        self.texture = Some(texture);
    }

    fn poll_frame(&mut self) -> Option<VideoFrame> {
        self.latch.take()
    }

    fn latest_frame_transform(&self) -> Mat4 {
        self.spec.orientation.texture_transform()
    }

    fn start(&mut self) -> Result<(), DecodeError> {
        if self.released {
            return Err(DecodeError::Playback("decoder already released".into()));
        }
        if self.worker.is_some() {
            return Ok(());
        }

        let spec = self.spec;
        // First frame is available before start returns
        self.latch
            .publish(spec.pattern.render(spec.width, spec.height, 0));

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let latch = self.latch.clone();
        let worker = thread::Builder::new()
            .name(format!("pattern-{}", spec.pattern.name()))
            .spawn(move || {
                let interval = spec.frame_interval();
                let mut deadline = Instant::now() + interval;
                let mut frame = 1u64;
                while wait_until(&running, deadline) {
                    latch.publish(spec.pattern.render(spec.width, spec.height, frame));
                    frame += 1;
                    deadline += interval;
                }
            })
            .map_err(|err| {
                self.running.store(false, Ordering::SeqCst);
                DecodeError::Playback(format!("failed to spawn decoder thread: {err}"))
            })?;

        debug!("started {} pattern at {} fps", spec.pattern.name(), spec.fps);
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker.thread().unpark();
            if worker.join().is_err() {
                warn!("{} pattern thread panicked", self.spec.pattern.name());
            }
        }
    }

    fn release(&mut self) {
        self.stop();
        self.latch.clear();
        self.texture = None;
        self.released = true;
    }

    fn set_frame_listener(&mut self, listener: FrameListener) {
        self.latch.set_listener(Some(listener));
    }
}

impl Drop for PatternDecoder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Park until `deadline`; false as soon as `running` is cleared
///
/// `stop()` unparks the worker, so it never waits out a full frame interval.
fn wait_until(running: &AtomicBool, deadline: Instant) -> bool {
    loop {
        if !running.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::park_timeout(deadline - now);
    }
}

/// Opens `pattern:` locators
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternDecoderFactory;

impl DecoderFactory for PatternDecoderFactory {
    fn open(&self, locator: &str) -> Result<Box<dyn VideoDecoder>, DecodeError> {
        let spec = PatternSpec::parse(locator)?;
        Ok(Box::new(PatternDecoder::new(spec)))
    }
}
