use crate::error::{CompositorError, Result};
use crate::shader::ProgramInterface;
use crate::video::VideoFrame;

use super::command::CommandList;

/// Linked program object owned by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

/// Vertex buffer object owned by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Sampleable texture object owned by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Reject frames that do not fit one 2D texture of at most `max_dimension` per side
pub(crate) fn check_frame_size(width: u32, height: u32, max_dimension: u32) -> Result<()> {
    if width == 0 || height == 0 || width > max_dimension || height > max_dimension {
        return Err(CompositorError::ResourceExhaustion(format!(
            "{width}x{height} frame exceeds the {max_dimension}px texture limit"
        )));
    }
    Ok(())
}

/// WGSL sources of one program
#[derive(Debug, Clone, Copy)]
pub struct ProgramSource<'a> {
    pub vertex: &'a str,
    pub fragment: &'a str,
}

/// GPU seam of the compositor
///
/// Every method is called from the render thread only. Resource creation either
/// fully succeeds or leaves nothing allocated.
pub trait RenderBackend {
    /// Create a program object for an already linked interface
    fn create_program(
        &mut self,
        source: &ProgramSource<'_>,
        interface: &ProgramInterface,
    ) -> Result<ProgramId>;

    fn delete_program(&mut self, program: ProgramId);

    /// Upload tightly packed vertex data into a new buffer
    fn create_vertex_buffer(&mut self, vertices: &[f32]) -> Result<BufferId>;

    fn delete_buffer(&mut self, buffer: BufferId);

    /// Allocate `count` textures, returned in allocation order
    fn generate_textures(&mut self, count: usize) -> Result<Vec<TextureId>>;

    fn delete_texture(&mut self, texture: TextureId);

    /// Replace the contents of a texture with a decoded frame
    fn upload_frame(&mut self, texture: TextureId, frame: &VideoFrame) -> Result<()>;

    /// Execute one frame's command stream
    fn submit(&mut self, commands: &CommandList) -> Result<()>;
}
