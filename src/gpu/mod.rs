//! Render backend seam and the per-frame command queue.

pub mod backend;
pub mod command;
pub mod context;
pub mod plan;
pub mod presenter;
pub mod recording;
pub mod target;
pub mod wgpu_backend;

pub use backend::{BufferId, ProgramId, ProgramSource, RenderBackend, TextureId};
pub use command::{CommandList, GpuCommand, Topology};
pub use context::GpuContext;
pub use plan::{AttributeSource, FramePlan, PixelRect, PlannedDraw};
pub use presenter::SurfacePresenter;
pub use recording::{BackendCall, RecordingBackend};
pub use target::{OffscreenTarget, OFFSCREEN_FORMAT};
pub use wgpu_backend::{WgpuBackend, VIDEO_TEXTURE_FORMAT};
