use super::{Area, PuzzleLayout};
use crate::math::Rect;

/// Straight grid of `rows` x `columns` equal cells, numbered row-major
#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    bounds: Rect,
    rows: usize,
    columns: usize,
    spacing: f32,
}

impl GridLayout {
    pub fn new(bounds: Rect, rows: usize, columns: usize) -> Self {
        Self {
            bounds,
            rows,
            columns,
            spacing: 0.0,
        }
    }

    /// Gap in logical pixels between cells and around the outer edge
    pub fn with_spacing(mut self, spacing: f32) -> Self {
        self.spacing = spacing.max(0.0);
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    fn cell_size(&self) -> (f32, f32) {
        let gaps_x = self.spacing * (self.columns as f32 + 1.0);
        let gaps_y = self.spacing * (self.rows as f32 + 1.0);
        (
            ((self.bounds.width - gaps_x) / self.columns as f32).max(0.0),
            ((self.bounds.height - gaps_y) / self.rows as f32).max(0.0),
        )
    }
}

impl PuzzleLayout for GridLayout {
    fn area_count(&self) -> usize {
        self.rows * self.columns
    }

    fn area(&self, index: usize) -> Area {
        let row = index / self.columns;
        let column = index % self.columns;
        let (width, height) = self.cell_size();

        let x = self.bounds.x + self.spacing + column as f32 * (width + self.spacing);
        let y = self.bounds.y + self.spacing + row as f32 * (height + self.spacing);

        Area::new(index, Rect::new(x, y, width, height))
    }
}
