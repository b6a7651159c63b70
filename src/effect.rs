//! CPU mirror of the luminance-threshold effect applied by the fragment stage.

/// Average channel value above which a pixel turns white
///
/// Deliberately 0.255 rather than 0.5; the fragment shader declares the same literal.
pub const LUMINANCE_THRESHOLD: f32 = 0.255;

pub const WHITE: [f32; 3] = [1.0, 1.0, 1.0];
pub const BLACK: [f32; 3] = [0.0, 0.0, 0.0];

/// Mean of the three colour channels
pub fn average_intensity(rgb: [f32; 3]) -> f32 {
    (rgb[0] + rgb[1] + rgb[2]) / 3.0
}

/// 1.0 when `average` is strictly above the threshold, otherwise 0.0
pub fn binarize(average: f32) -> f32 {
    if average > LUMINANCE_THRESHOLD {
        1.0
    } else {
        0.0
    }
}

/// Pure white or pure black for an input colour, exactly as the shader computes it
pub fn white_black(rgb: [f32; 3]) -> [f32; 3] {
    let value = binarize(average_intensity(rgb));
    [value, value, value]
}
