//! Shader compilation, parameter resolution and the program object.

mod parameter;
mod program;
mod reflect;

pub use parameter::{ParameterHandle, ParameterKind, ParameterTable, ShaderParameter};
pub use program::ShaderProgram;
pub use reflect::{InputFormat, ProgramInterface, ResourceKind, ShaderResource, VertexInput};

/// Vertex stage of the split program
pub const SPLIT_VERTEX_SHADER: &str = include_str!("../shaders/split_vertex.wgsl");

/// Fragment stage of the split program, applying the luminance threshold
pub const SPLIT_FRAGMENT_SHADER: &str = include_str!("../shaders/split_fragment.wgsl");
