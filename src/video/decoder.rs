use std::sync::Arc;

use glam::Mat4;

use crate::error::DecodeError;
use crate::gpu::TextureId;

use super::frame::VideoFrame;

/// Called on the decoder's thread whenever a new frame is latched
pub type FrameListener = Arc<dyn Fn() + Send + Sync>;

/// Decoding and playback of one source, owned by a [`VideoSource`](super::VideoSource)
///
/// Frames are produced on the decoder's own thread; the render thread only ever
/// polls the most recent one.
pub trait VideoDecoder: Send {
    /// Bind the decoded stream to a GPU texture
    fn attach(&mut self, texture: TextureId);

    /// Most recent frame not yet taken, if any
    fn poll_frame(&mut self) -> Option<VideoFrame>;

    /// Texture-coordinate transform of the latest frame (identity when upright)
    fn latest_frame_transform(&self) -> Mat4;

    fn start(&mut self) -> Result<(), DecodeError>;

    fn stop(&mut self);

    /// Stop playback and free decoder resources; the decoder is unusable afterwards
    fn release(&mut self);

    fn set_frame_listener(&mut self, listener: FrameListener);
}

/// Opens a decoder for an opaque source locator
pub trait DecoderFactory {
    fn open(&self, locator: &str) -> Result<Box<dyn VideoDecoder>, DecodeError>;
}

impl<F> DecoderFactory for F
where
    F: Fn(&str) -> Result<Box<dyn VideoDecoder>, DecodeError>,
{
    fn open(&self, locator: &str) -> Result<Box<dyn VideoDecoder>, DecodeError> {
        self(locator)
    }
}
