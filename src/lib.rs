pub mod cli;
pub mod compositor;
pub mod effect;
pub mod error;
pub mod frame_stats;
pub mod gpu;
pub mod layout;
pub mod math;
pub mod shader;
pub mod video;

pub use compositor::{CompositingProgram, CompositorState, RedrawSignal};
pub use error::{CompositorError, DecodeError, Result};
