use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::DecodeError;

use super::decoder::FrameListener;

/// One decoded frame as tightly packed RGBA8 rows, top row first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, DecodeError> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(DecodeError::Playback(format!(
                "frame of {width}x{height} needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Frame from pixels the caller sized correctly
    pub(crate) fn from_parts(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 4);
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Frame filled with a single colour
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let mut rgba = [0; 4];
        rgba.copy_from_slice(&self.pixels[offset..offset + 4]);
        Some(rgba)
    }
}

#[derive(Default)]
struct LatchState {
    slot: Mutex<Option<VideoFrame>>,
    listener: Mutex<Option<FrameListener>>,
    published: AtomicU64,
    skipped: AtomicU64,
}

/// Single-slot hand-off from a decoder thread to the render thread
///
/// Publishing replaces any frame the render thread has not taken yet, so the
/// consumer always sees the most recent frame and never a queue.
#[derive(Clone, Default)]
pub struct FrameLatch {
    state: Arc<LatchState>,
}

impl FrameLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch `frame` and notify the listener
    ///
    /// Returns true when an unconsumed frame was dropped in favour of this one.
    pub fn publish(&self, frame: VideoFrame) -> bool {
        let replaced = self
            .state
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(frame)
            .is_some();
        self.state.published.fetch_add(1, Ordering::Relaxed);
        if replaced {
            self.state.skipped.fetch_add(1, Ordering::Relaxed);
        }

        let listener = self
            .state
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener();
        }
        replaced
    }

    /// Take the latched frame, leaving the slot empty
    pub fn take(&self) -> Option<VideoFrame> {
        self.state
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn has_frame(&self) -> bool {
        self.state
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn set_listener(&self, listener: Option<FrameListener>) {
        *self
            .state
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = listener;
    }

    pub fn clear(&self) {
        self.take();
        self.set_listener(None);
    }

    /// Frames published since creation
    pub fn published(&self) -> u64 {
        self.state.published.load(Ordering::Relaxed)
    }

    /// Frames replaced before the render thread took them
    pub fn skipped(&self) -> u64 {
        self.state.skipped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_frame_length_is_checked() {
        assert!(VideoFrame::new(2, 2, vec![0; 16]).is_ok());
        assert!(VideoFrame::new(2, 2, vec![0; 15]).is_err());
        assert!(VideoFrame::new(0, 2, Vec::new()).is_err());
    }

    #[test]
    fn test_solid_frame_pixels() {
        let frame = VideoFrame::solid(3, 2, [10, 20, 30, 255]);
        assert_eq!(frame.pixels().len(), 24);
        assert_eq!(frame.pixel(2, 1), Some([10, 20, 30, 255]));
        assert_eq!(frame.pixel(3, 0), None);
    }

    #[test]
    fn test_latch_keeps_most_recent() {
        let latch = FrameLatch::new();
        assert!(!latch.publish(VideoFrame::solid(1, 1, [1, 0, 0, 255])));
        assert!(latch.publish(VideoFrame::solid(1, 1, [2, 0, 0, 255])));

        assert_eq!(latch.take().and_then(|f| f.pixel(0, 0)), Some([2, 0, 0, 255]));
        assert_eq!(latch.take(), None);
        assert_eq!(latch.published(), 2);
        assert_eq!(latch.skipped(), 1);
    }

    #[test]
    fn test_latch_notifies_listener() {
        let latch = FrameLatch::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        latch.set_listener(Some(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        latch.publish(VideoFrame::solid(1, 1, [0; 4]));
        latch.publish(VideoFrame::solid(1, 1, [0; 4]));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        latch.clear();
        latch.publish(VideoFrame::solid(1, 1, [0; 4]));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_latch_is_shared_across_threads() {
        let latch = FrameLatch::new();
        let producer = latch.clone();
        std::thread::spawn(move || {
            for value in 0..10u8 {
                producer.publish(VideoFrame::solid(1, 1, [value, 0, 0, 255]));
            }
        })
        .join()
        .unwrap();

        assert_eq!(latch.take().and_then(|f| f.pixel(0, 0)), Some([9, 0, 0, 255]));
    }
}
