use std::fmt;

use thiserror::Error;

use crate::compositor::CompositorState;

/// Program stage a compile or link failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    /// Cross-stage checks performed after both stages compiled
    Link,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Link => "link",
        };
        f.write_str(name)
    }
}

/// Errors raised by the compositing core
#[derive(Error, Debug)]
pub enum CompositorError {
    /// A shader stage failed to parse, validate or link
    #[error("{stage} shader failed to compile: {message}")]
    ShaderCompile { stage: ShaderStage, message: String },

    /// A declared parameter is missing from the linked program
    #[error("shader parameter `{name}` is not declared as {expected} by the linked program")]
    ParameterResolution {
        name: &'static str,
        expected: &'static str,
    },

    /// Lookup of a parameter that was never declared at build time
    #[error("unknown shader parameter `{0}`")]
    UnknownParameter(String),

    /// GPU buffer or texture allocation failed
    #[error("GPU resource allocation failed: {0}")]
    ResourceExhaustion(String),

    /// Operation called in a lifecycle state that does not allow it
    #[error("cannot {operation} while the compositor is {state}")]
    InvalidState {
        operation: &'static str,
        state: CompositorState,
    },

    #[error("viewport must be non-empty, got {width}x{height}")]
    InvalidViewport { width: u32, height: u32 },

    /// A submitted command stream broke the draw protocol or the backend rejected it
    #[error("render backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Errors raised by decoder collaborators
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("unsupported source locator `{0}`")]
    UnsupportedLocator(String),

    #[error("invalid option `{option}` in locator `{locator}`")]
    InvalidOption { locator: String, option: String },

    #[error("playback failed: {0}")]
    Playback(String),
}

pub type Result<T> = std::result::Result<T, CompositorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_compile_message_names_stage() {
        let err = CompositorError::ShaderCompile {
            stage: ShaderStage::Fragment,
            message: "expected `;`".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "fragment shader failed to compile: expected `;`"
        );
    }

    #[test]
    fn test_invalid_state_message() {
        let err = CompositorError::InvalidState {
            operation: "run",
            state: CompositorState::Released,
        };
        assert_eq!(err.to_string(), "cannot run while the compositor is released");
    }

    #[test]
    fn test_decode_error_converts() {
        let err: CompositorError = DecodeError::UnsupportedLocator("rtsp://cam".into()).into();
        assert!(matches!(err, CompositorError::Decode(_)));
        assert!(err.to_string().contains("rtsp://cam"));
    }
}
