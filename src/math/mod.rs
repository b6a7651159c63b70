mod rect;
mod transform;

pub use rect::{Rect, Viewport};
pub use transform::{
    model_for_rect, orthographic_projection, vertical_flip, FrameTransforms, Orientation,
};
