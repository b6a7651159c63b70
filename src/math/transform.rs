use glam::{Mat4, Vec2, Vec3, Vec4};

use super::rect::{Rect, Viewport};

/// Orthographic projection mapping [0, width] x [0, height] onto clip space, near/far = [-1, 1]
pub fn orthographic_projection(viewport: Viewport) -> Mat4 {
    Mat4::orthographic_rh_gl(
        0.0,
        viewport.width as f32,
        0.0,
        viewport.height as f32,
        -1.0,
        1.0,
    )
}

/// Flips logical Y-down coordinates into the Y-up convention of the projection
///
/// Translate by the viewport height, then scale Y by -1.
pub fn vertical_flip(viewport: Viewport) -> Mat4 {
    Mat4::from_translation(Vec3::new(0.0, viewport.height as f32, 0.0))
        * Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
}

/// Places the unit quad [0, 1]² onto `rect`
pub fn model_for_rect(rect: &Rect) -> Mat4 {
    Mat4::from_translation(Vec3::new(rect.x, rect.y, 0.0))
        * Mat4::from_scale(Vec3::new(rect.width, rect.height, 1.0))
}

/// Native orientation of decoded frames, in counter-clockwise quarter turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Upright,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Orientation {
    /// Parse a rotation in degrees; only multiples of 90 are accepted
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Orientation::Upright),
            90 => Some(Orientation::Rotate90),
            180 => Some(Orientation::Rotate180),
            270 => Some(Orientation::Rotate270),
            _ => None,
        }
    }

    /// Texture-coordinate transform rotating about the texture centre
    ///
    /// Built from exact coefficients so quarter turns carry no rounding error.
    pub fn texture_transform(self) -> Mat4 {
        match self {
            Orientation::Upright => Mat4::IDENTITY,
            Orientation::Rotate90 => Mat4::from_cols(
                Vec4::new(0.0, 1.0, 0.0, 0.0),
                Vec4::new(-1.0, 0.0, 0.0, 0.0),
                Vec4::Z,
                Vec4::new(1.0, 0.0, 0.0, 1.0),
            ),
            Orientation::Rotate180 => Mat4::from_cols(
                Vec4::new(-1.0, 0.0, 0.0, 0.0),
                Vec4::new(0.0, -1.0, 0.0, 0.0),
                Vec4::Z,
                Vec4::new(1.0, 1.0, 0.0, 1.0),
            ),
            Orientation::Rotate270 => Mat4::from_cols(
                Vec4::new(0.0, -1.0, 0.0, 0.0),
                Vec4::new(1.0, 0.0, 0.0, 0.0),
                Vec4::Z,
                Vec4::new(0.0, 1.0, 0.0, 1.0),
            ),
        }
    }
}

/// Projection and view matrices for one prepared session
///
/// Derived solely from the viewport and computed once per `prepare()`. Per-area
/// matrices are computed from this by reference, so the frame loop never mutates it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTransforms {
    viewport: Viewport,
    projection: Mat4,
    view: Mat4,
}

impl FrameTransforms {
    pub fn for_viewport(viewport: Viewport) -> Self {
        Self {
            viewport,
            projection: orthographic_projection(viewport),
            view: vertical_flip(viewport),
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    /// projection * view
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Model-view-projection matrix mapping the unit quad onto `rect`
    pub fn area_mvp(&self, rect: &Rect) -> Mat4 {
        self.view_projection() * model_for_rect(rect)
    }

    /// Clip-space position of a logical point
    pub fn logical_to_clip(&self, point: Vec2) -> Vec2 {
        let clip = self.view_projection() * point.extend(0.0).extend(1.0);
        Vec2::new(clip.x / clip.w, clip.y / clip.w)
    }
}
