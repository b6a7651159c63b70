//! Interprets a command stream with GL-style state rules.
//!
//! Backends that render with explicit pipelines (wgpu) and the recording backend
//! both go through [`FramePlan::build`], so a stream that breaks the draw protocol
//! is rejected the same way everywhere.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use glam::Mat4;

use super::backend::{BufferId, ProgramId, TextureId};
use super::command::{CommandList, GpuCommand, Topology};
use crate::error::{CompositorError, Result};
use crate::shader::ParameterHandle;

/// Pixel rectangle of the render target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Vertex source captured by an attribute layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSource {
    pub location: u32,
    pub buffer: BufferId,
    pub components: u32,
    pub stride: u32,
    pub offset: u32,
}

/// Everything one draw call needs, snapshotted at the time it was issued
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedDraw {
    pub program: ProgramId,
    pub attribute: AttributeSource,
    pub viewport: Option<PixelRect>,
    pub topology: Topology,
    pub first: u32,
    pub count: u32,
    /// Matrix uniforms keyed by (group, binding)
    pub matrices: BTreeMap<(u32, u32), Mat4>,
    /// Textures keyed by (group, binding)
    pub textures: BTreeMap<(u32, u32), TextureId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FramePlan {
    pub clear: Option<[f32; 4]>,
    pub draws: Vec<PlannedDraw>,
}

#[derive(Default)]
struct PlanState {
    program: Option<ProgramId>,
    bound_buffer: Option<BufferId>,
    viewport: Option<PixelRect>,
    layouts: HashMap<u32, AttributeSource>,
    enabled: BTreeSet<u32>,
    matrices: BTreeMap<(u32, u32), Mat4>,
    textures: BTreeMap<(u32, u32), TextureId>,
}

fn protocol_error(message: impl Into<String>) -> CompositorError {
    CompositorError::Backend(message.into())
}

fn attribute_location(handle: ParameterHandle, command: &str) -> Result<u32> {
    match handle {
        ParameterHandle::Attribute { location } => Ok(location),
        ParameterHandle::Uniform { group, binding } => Err(protocol_error(format!(
            "{command} on uniform @group({group}) @binding({binding})"
        ))),
    }
}

fn uniform_slot(handle: ParameterHandle, command: &str) -> Result<(u32, u32)> {
    match handle {
        ParameterHandle::Uniform { group, binding } => Ok((group, binding)),
        ParameterHandle::Attribute { location } => Err(protocol_error(format!(
            "{command} on attribute @location({location})"
        ))),
    }
}

impl PlanState {
    fn require_program(&self, command: &str) -> Result<ProgramId> {
        self.program
            .ok_or_else(|| protocol_error(format!("{command} with no program in use")))
    }

    fn draw(&self, topology: Topology, first: u32, count: u32) -> Result<PlannedDraw> {
        let program = self.require_program("draw")?;

        let mut enabled = self.enabled.iter();
        let location = match (enabled.next(), enabled.next()) {
            (Some(location), None) => *location,
            (None, _) => return Err(protocol_error("draw with no enabled vertex attribute")),
            (Some(_), Some(_)) => {
                return Err(protocol_error(
                    "draw with more than one enabled vertex attribute",
                ))
            }
        };
        let attribute = *self.layouts.get(&location).ok_or_else(|| {
            protocol_error(format!(
                "draw with attribute @location({location}) enabled but never described"
            ))
        })?;

        Ok(PlannedDraw {
            program,
            attribute,
            viewport: self.viewport,
            topology,
            first,
            count,
            matrices: self.matrices.clone(),
            textures: self.textures.clone(),
        })
    }
}

impl FramePlan {
    /// Interpret `commands`, rejecting streams that break the draw protocol
    pub fn build(commands: &CommandList) -> Result<Self> {
        let mut plan = FramePlan::default();
        let mut state = PlanState::default();

        for command in commands.iter() {
            match *command {
                GpuCommand::ClearColor(color) => {
                    if !plan.draws.is_empty() {
                        return Err(protocol_error("clear issued after a draw in the same frame"));
                    }
                    plan.clear = Some(color);
                }
                GpuCommand::Viewport {
                    x,
                    y,
                    width,
                    height,
                } => {
                    state.viewport = Some(PixelRect {
                        x,
                        y,
                        width,
                        height,
                    });
                }
                GpuCommand::UseProgram(program) => {
                    if state.program != Some(program) {
                        state.matrices.clear();
                        state.textures.clear();
                    }
                    state.program = Some(program);
                }
                GpuCommand::UniformMatrix { handle, matrix } => {
                    state.require_program("uniform upload")?;
                    let slot = uniform_slot(handle, "uniform upload")?;
                    state.matrices.insert(slot, matrix);
                }
                GpuCommand::BindTexture { handle, texture } => {
                    state.require_program("texture bind")?;
                    let slot = uniform_slot(handle, "texture bind")?;
                    state.textures.insert(slot, texture);
                }
                GpuCommand::BindVertexBuffer(buffer) => state.bound_buffer = buffer,
                GpuCommand::VertexAttribLayout {
                    handle,
                    components,
                    stride,
                    offset,
                } => {
                    let location = attribute_location(handle, "attribute layout")?;
                    let buffer = state.bound_buffer.ok_or_else(|| {
                        protocol_error(format!(
                            "attribute layout for @location({location}) with no vertex buffer bound"
                        ))
                    })?;
                    state.layouts.insert(
                        location,
                        AttributeSource {
                            location,
                            buffer,
                            components,
                            stride,
                            offset,
                        },
                    );
                }
                GpuCommand::EnableAttribute(handle) => {
                    state.enabled.insert(attribute_location(handle, "enable")?);
                }
                GpuCommand::DisableAttribute(handle) => {
                    state.enabled.remove(&attribute_location(handle, "disable")?);
                }
                GpuCommand::DrawArrays {
                    topology,
                    first,
                    count,
                } => plan.draws.push(state.draw(topology, first, count)?),
            }
        }

        if let Some(location) = state.enabled.iter().next() {
            return Err(protocol_error(format!(
                "attribute @location({location}) left enabled at the end of the frame"
            )));
        }

        Ok(plan)
    }
}
