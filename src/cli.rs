// cli.rs - Command-line interface configuration
use clap::Parser;

use crate::layout::GridLayout;
use crate::math::Rect;

#[derive(Parser, Debug, Clone)]
#[command(name = "video-split")]
#[command(about = "Composites video sources into a grid with a black and white threshold effect", long_about = None)]
pub struct Cli {
    /// Source locators, e.g. `pattern:checker;fps=15;rotate=90`
    #[arg(default_values_t = [String::from("pattern:bars"), String::from("pattern:checker")])]
    pub sources: Vec<String>,

    /// Grid rows
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u16).range(1..))]
    pub rows: u16,

    /// Grid columns
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u16).range(1..))]
    pub cols: u16,

    /// Gap between areas in pixels
    #[arg(long, default_value_t = 0.0)]
    pub spacing: f32,

    /// Surface width in pixels
    #[arg(long, default_value_t = 800)]
    pub width: u32,

    /// Surface height in pixels
    #[arg(long, default_value_t = 600)]
    pub height: u32,

    /// Render offscreen instead of opening a window
    #[arg(long)]
    pub headless: bool,

    /// Frames to render in headless or dry-run mode
    #[arg(long, default_value_t = 120)]
    pub frames: u32,

    /// Validate and log the command stream without touching the GPU
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Grid layout covering a `width` x `height` surface
    pub fn layout(&self, width: u32, height: u32) -> GridLayout {
        GridLayout::new(
            Rect::from_size(width as f32, height as f32),
            usize::from(self.rows),
            usize::from(self.cols),
        )
        .with_spacing(self.spacing)
    }
}
