//! Video sources and the decoder collaborator interface.

mod decoder;
mod frame;
mod pattern;
mod source;

pub use decoder::{DecoderFactory, FrameListener, VideoDecoder};
pub use frame::{FrameLatch, VideoFrame};
pub use pattern::{
    Pattern, PatternDecoder, PatternDecoderFactory, PatternSpec, MAX_FRAME_DIMENSION,
};
pub use source::VideoSource;
