use glam::Mat4;

use super::backend::{BufferId, ProgramId, TextureId};
use crate::shader::ParameterHandle;

/// Primitive assembly mode of a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    TriangleStrip,
    TriangleList,
}

/// One state change or draw recorded on the render thread
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    /// Clear the colour target (r, g, b, a)
    ClearColor([f32; 4]),
    Viewport {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    UseProgram(ProgramId),
    UniformMatrix {
        handle: ParameterHandle,
        matrix: Mat4,
    },
    BindTexture {
        handle: ParameterHandle,
        texture: TextureId,
    },
    /// Bind (or unbind with `None`) the vertex buffer that attribute layouts capture
    BindVertexBuffer(Option<BufferId>),
    /// Point an attribute at the bound buffer: `components` floats every `stride` bytes
    VertexAttribLayout {
        handle: ParameterHandle,
        components: u32,
        stride: u32,
        offset: u32,
    },
    EnableAttribute(ParameterHandle),
    DisableAttribute(ParameterHandle),
    DrawArrays {
        topology: Topology,
        first: u32,
        count: u32,
    },
}

/// Ordered command stream for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandList {
    commands: Vec<GpuCommand>,
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: GpuCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn iter(&self) -> impl Iterator<Item = &GpuCommand> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of draw calls in the stream
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, GpuCommand::DrawArrays { .. }))
            .count()
    }
}
