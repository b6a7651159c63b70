#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use glam::Mat4;
use video_split::error::DecodeError;
use video_split::gpu::TextureId;
use video_split::video::{DecoderFactory, FrameListener, VideoDecoder, VideoFrame};

/// State shared between a [`StubDecoder`] and the test driving it
#[derive(Default)]
pub struct StubState {
    pub locator: String,
    pub attached: Mutex<Option<TextureId>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub released: AtomicBool,
    pub fail_start: AtomicBool,
    listener: Mutex<Option<FrameListener>>,
    pending: Mutex<Option<VideoFrame>>,
    transform: Mutex<Option<Mat4>>,
}

impl StubState {
    /// Latch a frame as the decoder thread would and notify the listener
    pub fn publish(&self, frame: VideoFrame) {
        *self.pending.lock().unwrap() = Some(frame);
        let listener = self.listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener();
        }
    }

    pub fn set_transform(&self, transform: Mat4) {
        *self.transform.lock().unwrap() = Some(transform);
    }

    pub fn attached(&self) -> Option<TextureId> {
        *self.attached.lock().unwrap()
    }

    pub fn has_listener(&self) -> bool {
        self.listener.lock().unwrap().is_some()
    }
}

/// Decoder with no thread; frames appear only when a test publishes them
pub struct StubDecoder {
    state: Arc<StubState>,
}

impl VideoDecoder for StubDecoder {
    fn attach(&mut self, texture: TextureId) {
        *self.state.attached.lock().unwrap() = Some(texture);
    }

    fn poll_frame(&mut self) -> Option<VideoFrame> {
        self.state.pending.lock().unwrap().take()
    }

    fn latest_frame_transform(&self) -> Mat4 {
        self.state.transform.lock().unwrap().unwrap_or(Mat4::IDENTITY)
    }

    fn start(&mut self) -> Result<(), DecodeError> {
        if self.state.fail_start.load(Ordering::SeqCst) {
            return Err(DecodeError::Playback(format!("{} refused", self.state.locator)));
        }
        self.state.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.state.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&mut self) {
        self.state.released.store(true, Ordering::SeqCst);
    }

    fn set_frame_listener(&mut self, listener: FrameListener) {
        *self.state.listener.lock().unwrap() = Some(listener);
    }
}

/// Factory handing out stub decoders and keeping their state for inspection
#[derive(Clone, Default)]
pub struct StubFactory {
    opened: Arc<Mutex<Vec<Arc<StubState>>>>,
}

impl StubFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of the `index`-th opened decoder
    pub fn decoder(&self, index: usize) -> Arc<StubState> {
        self.opened.lock().unwrap()[index].clone()
    }

    pub fn opened(&self) -> usize {
        self.opened.lock().unwrap().len()
    }
}

impl DecoderFactory for StubFactory {
    fn open(&self, locator: &str) -> Result<Box<dyn VideoDecoder>, DecodeError> {
        if !locator.starts_with("stub:") {
            return Err(DecodeError::UnsupportedLocator(locator.to_string()));
        }
        let state = Arc::new(StubState {
            locator: locator.to_string(),
            ..Default::default()
        });
        self.opened.lock().unwrap().push(state.clone());
        Ok(Box::new(StubDecoder { state }))
    }
}
