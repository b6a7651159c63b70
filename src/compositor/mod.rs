//! The compositing program: lifecycle, per-frame draw sequence and the
//! area-to-source mapping.

mod mapping;
mod program;
mod redraw;
mod state;

pub use mapping::source_index_for_area;
pub use program::{CompositingProgram, CLEAR_COLOR, UNIT_QUAD};
pub use redraw::RedrawSignal;
pub use state::CompositorState;
