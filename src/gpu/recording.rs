use std::collections::BTreeSet;

use log::debug;

use super::backend::{
    check_frame_size, BufferId, ProgramId, ProgramSource, RenderBackend, TextureId,
};
use super::command::CommandList;
use super::plan::{FramePlan, PlannedDraw};
use crate::error::{CompositorError, Result};
use crate::shader::ProgramInterface;
use crate::video::VideoFrame;

/// One call received by a [`RecordingBackend`]
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateProgram(ProgramId),
    DeleteProgram(ProgramId),
    CreateVertexBuffer { buffer: BufferId, vertices: Vec<f32> },
    DeleteBuffer(BufferId),
    GenerateTextures(Vec<TextureId>),
    DeleteTexture(TextureId),
    UploadFrame {
        texture: TextureId,
        width: u32,
        height: u32,
    },
    Submit { draws: usize },
}

/// Headless backend that validates and records everything it is asked to do
///
/// Every submitted frame goes through [`FramePlan`] and must only reference live
/// objects, so the recording doubles as a protocol checker.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    next_id: u32,
    texture_limit: Option<usize>,
    max_texture_dimension: Option<u32>,
    live_programs: BTreeSet<ProgramId>,
    live_buffers: BTreeSet<BufferId>,
    live_textures: BTreeSet<TextureId>,
    calls: Vec<BackendCall>,
    frames: Vec<CommandList>,
    plans: Vec<FramePlan>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail texture allocation once more than `limit` textures would be live
    pub fn with_texture_limit(mut self, limit: usize) -> Self {
        self.texture_limit = Some(limit);
        self
    }

    /// Reject uploads of frames wider or taller than `dimension`, as a device limit would
    pub fn with_max_texture_dimension(mut self, dimension: u32) -> Self {
        self.max_texture_dimension = Some(dimension);
        self
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    /// Command lists of every accepted frame, in submission order
    pub fn frames(&self) -> &[CommandList] {
        &self.frames
    }

    pub fn plans(&self) -> &[FramePlan] {
        &self.plans
    }

    pub fn last_plan(&self) -> Option<&FramePlan> {
        self.plans.last()
    }

    pub fn live_programs(&self) -> usize {
        self.live_programs.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.live_buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.live_textures.len()
    }

    pub fn is_texture_live(&self, texture: TextureId) -> bool {
        self.live_textures.contains(&texture)
    }

    /// Vertex data uploaded for `buffer`, if it was created here
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[f32]> {
        self.calls.iter().find_map(|call| match call {
            BackendCall::CreateVertexBuffer { buffer: id, vertices } if *id == buffer => {
                Some(vertices.as_slice())
            }
            _ => None,
        })
    }

    /// Forget recorded calls and frames; live objects are kept
    pub fn clear_history(&mut self) {
        self.calls.clear();
        self.frames.clear();
        self.plans.clear();
    }

    fn check_live(&self, draw: &PlannedDraw) -> Result<()> {
        if !self.live_programs.contains(&draw.program) {
            return Err(CompositorError::Backend(format!(
                "draw uses deleted program {:?}",
                draw.program
            )));
        }
        if !self.live_buffers.contains(&draw.attribute.buffer) {
            return Err(CompositorError::Backend(format!(
                "draw reads deleted buffer {:?}",
                draw.attribute.buffer
            )));
        }
        if let Some(texture) = draw
            .textures
            .values()
            .find(|texture| !self.live_textures.contains(texture))
        {
            return Err(CompositorError::Backend(format!(
                "draw samples deleted texture {texture:?}"
            )));
        }
        Ok(())
    }
}

impl RenderBackend for RecordingBackend {
    fn create_program(
        &mut self,
        _source: &ProgramSource<'_>,
        _interface: &ProgramInterface,
    ) -> Result<ProgramId> {
        let program = ProgramId(self.next_id());
        self.live_programs.insert(program);
        self.calls.push(BackendCall::CreateProgram(program));
        Ok(program)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.live_programs.remove(&program);
        self.calls.push(BackendCall::DeleteProgram(program));
    }

    fn create_vertex_buffer(&mut self, vertices: &[f32]) -> Result<BufferId> {
        let buffer = BufferId(self.next_id());
        self.live_buffers.insert(buffer);
        self.calls.push(BackendCall::CreateVertexBuffer {
            buffer,
            vertices: vertices.to_vec(),
        });
        Ok(buffer)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.live_buffers.remove(&buffer);
        self.calls.push(BackendCall::DeleteBuffer(buffer));
    }

    fn generate_textures(&mut self, count: usize) -> Result<Vec<TextureId>> {
        if let Some(limit) = self.texture_limit {
            if self.live_textures.len() + count > limit {
                return Err(CompositorError::ResourceExhaustion(format!(
                    "{count} textures requested, {} of {limit} already live",
                    self.live_textures.len()
                )));
            }
        }

        let textures: Vec<_> = (0..count).map(|_| TextureId(self.next_id())).collect();
        self.live_textures.extend(textures.iter().copied());
        self.calls.push(BackendCall::GenerateTextures(textures.clone()));
        Ok(textures)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.live_textures.remove(&texture);
        self.calls.push(BackendCall::DeleteTexture(texture));
    }

    fn upload_frame(&mut self, texture: TextureId, frame: &VideoFrame) -> Result<()> {
        if !self.live_textures.contains(&texture) {
            return Err(CompositorError::Backend(format!(
                "upload into deleted texture {texture:?}"
            )));
        }
        if let Some(max_dimension) = self.max_texture_dimension {
            check_frame_size(frame.width(), frame.height(), max_dimension)?;
        }
        self.calls.push(BackendCall::UploadFrame {
            texture,
            width: frame.width(),
            height: frame.height(),
        });
        Ok(())
    }

    fn submit(&mut self, commands: &CommandList) -> Result<()> {
        let plan = FramePlan::build(commands)?;
        for draw in &plan.draws {
            self.check_live(draw)?;
        }

        debug!(
            "recorded frame {} ({} commands, {} draws)",
            self.frames.len(),
            commands.len(),
            plan.draws.len()
        );
        self.calls.push(BackendCall::Submit {
            draws: plan.draws.len(),
        });
        self.frames.push(commands.clone());
        self.plans.push(plan);
        Ok(())
    }
}
