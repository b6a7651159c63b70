use std::fmt;

/// Lifecycle of a [`CompositingProgram`](super::CompositingProgram)
///
/// `Uninitialized -> Prepared -> Running -> Released`; `Released` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositorState {
    #[default]
    Uninitialized,
    /// GPU resources exist, no frame rendered yet
    Prepared,
    /// At least one frame rendered
    Running,
    Released,
}

impl CompositorState {
    /// True while GPU resources are live and frames may be rendered
    pub fn is_renderable(self) -> bool {
        matches!(self, CompositorState::Prepared | CompositorState::Running)
    }
}

impl fmt::Display for CompositorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompositorState::Uninitialized => "uninitialized",
            CompositorState::Prepared => "prepared",
            CompositorState::Running => "running",
            CompositorState::Released => "released",
        };
        f.write_str(name)
    }
}
