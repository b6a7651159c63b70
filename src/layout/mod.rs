//! Puzzle layouts: the ordered destination areas of the collage.
//!
//! The layout engine itself lives outside the compositor; the core only reads
//! `area_count()` and `area(index)`.

mod grid;

pub use grid::GridLayout;

use crate::math::Rect;

/// One destination region of the composited output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Area {
    pub index: usize,
    pub rect: Rect,
}

impl Area {
    pub fn new(index: usize, rect: Rect) -> Self {
        Self { index, rect }
    }
}

/// Ordered sequence of areas, consumed read-only by the compositor
pub trait PuzzleLayout {
    fn area_count(&self) -> usize;

    /// Area at `index`; callers only pass indices below `area_count()`
    fn area(&self, index: usize) -> Area;
}

impl PuzzleLayout for Vec<Area> {
    fn area_count(&self) -> usize {
        self.len()
    }

    fn area(&self, index: usize) -> Area {
        self[index]
    }
}

impl<L: PuzzleLayout + ?Sized> PuzzleLayout for Box<L> {
    fn area_count(&self) -> usize {
        (**self).area_count()
    }

    fn area(&self, index: usize) -> Area {
        (**self).area(index)
    }
}
