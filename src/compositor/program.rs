use std::marker::PhantomData;

use log::{debug, error, info, warn};

use super::mapping::source_index_for_area;
use super::state::CompositorState;
use crate::error::{CompositorError, Result};
use crate::gpu::{BufferId, CommandList, GpuCommand, RenderBackend, Topology};
use crate::layout::PuzzleLayout;
use crate::math::{FrameTransforms, Viewport};
use crate::shader::{
    ParameterHandle, ShaderParameter, ShaderProgram, SPLIT_FRAGMENT_SHADER, SPLIT_VERTEX_SHADER,
};
use crate::video::{DecoderFactory, FrameListener, VideoSource};

/// Unit quad spanning [0, 1]², drawn as a triangle strip
pub const UNIT_QUAD: [f32; 8] = [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0];

/// Colour the target is cleared to before the areas are drawn
pub const CLEAR_COLOR: [f32; 4] = [1.0, 0.0, 0.0, 0.0];

const POSITION_COMPONENTS: u32 = 2;
const POSITION_STRIDE: u32 = POSITION_COMPONENTS * std::mem::size_of::<f32>() as u32;
const QUAD_VERTEX_COUNT: u32 = 4;

/// Handles looked up once per frame
#[derive(Clone, Copy)]
struct FrameHandles {
    position: ParameterHandle,
    matrix: ParameterHandle,
    texture_matrix: ParameterHandle,
    sampler: ParameterHandle,
}

/// Composites every video source into the areas of a puzzle layout
///
/// Owns the backend and every GPU object it creates. The type is neither `Send`
/// nor `Sync`: all calls stay on the thread that owns the graphics context, and
/// decoder threads reach it only through frame listeners.
pub struct CompositingProgram<B: RenderBackend> {
    backend: B,
    state: CompositorState,
    shader: Option<ShaderProgram>,
    quad: Option<BufferId>,
    sources: Vec<VideoSource>,
    layout: Option<Box<dyn PuzzleLayout>>,
    transforms: Option<FrameTransforms>,
    factory: Box<dyn DecoderFactory>,
    frame_listener: Option<FrameListener>,
    frames_rendered: u64,
    _render_thread: PhantomData<*const ()>,
}

impl<B: RenderBackend> CompositingProgram<B> {
    pub fn new(backend: B, factory: impl DecoderFactory + 'static) -> Self {
        Self {
            backend,
            state: CompositorState::Uninitialized,
            shader: None,
            quad: None,
            sources: Vec::new(),
            layout: None,
            transforms: None,
            factory: Box::new(factory),
            frame_listener: None,
            frames_rendered: 0,
            _render_thread: PhantomData,
        }
    }

    fn require(&self, operation: &'static str, allowed: bool) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(CompositorError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    pub fn set_layout(&mut self, layout: impl PuzzleLayout + 'static) -> Result<()> {
        self.require("set a layout", self.state != CompositorState::Released)?;
        self.layout = Some(Box::new(layout));
        Ok(())
    }

    /// Register a source; returns its index
    ///
    /// Sources must all be added before `prepare()`.
    pub fn add_source(&mut self, locator: &str) -> Result<usize> {
        self.require("add a source", self.state == CompositorState::Uninitialized)?;

        let decoder = self.factory.open(locator)?;
        let mut source = VideoSource::new(locator, decoder);
        if let Some(listener) = &self.frame_listener {
            source.set_frame_listener(listener.clone());
        }
        self.sources.push(source);
        debug!("added source {} `{locator}`", self.sources.len() - 1);
        Ok(self.sources.len() - 1)
    }

    /// Build the shader, upload the unit quad, allocate one texture per source and
    /// derive the frame transforms for `width` x `height`
    ///
    /// On failure every partially created resource is freed and the compositor
    /// stays uninitialized.
    pub fn prepare(&mut self, width: u32, height: u32) -> Result<()> {
        self.require("prepare", self.state == CompositorState::Uninitialized)?;
        let viewport = Viewport::new(width, height);
        if viewport.is_empty() {
            return Err(CompositorError::InvalidViewport { width, height });
        }

        if let Err(err) = self.allocate() {
            error!("prepare failed: {err}");
            self.free_gpu_resources();
            return Err(err);
        }

        self.transforms = Some(FrameTransforms::for_viewport(viewport));
        self.state = CompositorState::Prepared;
        info!(
            "compositor prepared: {width}x{height}, {} sources",
            self.sources.len()
        );
        Ok(())
    }

    fn allocate(&mut self) -> Result<()> {
        self.shader = Some(ShaderProgram::build(
            &mut self.backend,
            SPLIT_VERTEX_SHADER,
            SPLIT_FRAGMENT_SHADER,
            &ShaderParameter::ALL,
        )?);
        self.quad = Some(self.backend.create_vertex_buffer(&UNIT_QUAD)?);

        if !self.sources.is_empty() {
            let textures = self.backend.generate_textures(self.sources.len())?;
            for (source, texture) in self.sources.iter_mut().zip(textures) {
                source.configure_output(texture);
            }
        }
        Ok(())
    }

    fn free_gpu_resources(&mut self) {
        if let Some(mut shader) = self.shader.take() {
            shader.release(&mut self.backend);
        }
        if let Some(quad) = self.quad.take() {
            self.backend.delete_buffer(quad);
        }
    }

    /// Upload the latched frame of every source that has one
    ///
    /// Best effort: a failed upload leaves that source's previous frame in place and
    /// is logged. Returns the number of textures updated.
    pub fn update_textures(&mut self) -> Result<usize> {
        self.require("update textures", self.state.is_renderable())?;

        let mut updated = 0;
        for source in &mut self.sources {
            let (Some(texture), Some(frame)) = (source.texture(), source.take_frame()) else {
                continue;
            };
            match self.backend.upload_frame(texture, &frame) {
                Ok(()) => updated += 1,
                Err(err) => warn!("frame upload for `{}` failed: {err}", source.locator()),
            }
        }
        Ok(updated)
    }

    /// Render one frame: clear, then one draw of the unit quad per layout area
    pub fn run(&mut self) -> Result<()> {
        self.require("run", self.state.is_renderable())?;
        let (Some(shader), Some(quad), Some(transforms)) =
            (self.shader.as_ref(), self.quad, self.transforms)
        else {
            return Err(CompositorError::InvalidState {
                operation: "run",
                state: self.state,
            });
        };

        let handles = FrameHandles {
            position: shader.parameter_handle(ShaderParameter::Position)?,
            matrix: shader.parameter_handle(ShaderParameter::Matrix)?,
            texture_matrix: shader.parameter_handle(ShaderParameter::TextureMatrix)?,
            sampler: shader.parameter_handle(ShaderParameter::TextureSampler)?,
        };

        let viewport = transforms.viewport();
        let mut commands = CommandList::new();
        commands.push(GpuCommand::ClearColor(CLEAR_COLOR));
        commands.push(GpuCommand::Viewport {
            x: 0,
            y: 0,
            width: viewport.width,
            height: viewport.height,
        });
        shader.activate(&mut commands);

        let area_count = self.layout.as_ref().map_or(0, |layout| layout.area_count());
        if self.sources.is_empty() && area_count > 0 {
            debug!("no sources, {area_count} areas left blank");
        }

        for index in 0..area_count {
            let Some(source_index) = source_index_for_area(index, self.sources.len()) else {
                break;
            };
            let Some(area) = self.layout.as_ref().map(|layout| layout.area(index)) else {
                break;
            };
            let source = &mut self.sources[source_index];

            source.set_display_area(area.rect);
            if let Err(err) = source.set_texture(&mut commands, handles.sampler, handles.texture_matrix)
            {
                warn!("area {index} skipped: {err}");
                continue;
            }
            source.set_matrix(&mut commands, handles.matrix, &transforms);
            draw_unit_quad(&mut commands, quad, handles.position);
        }

        self.backend.submit(&commands)?;
        if self.state == CompositorState::Prepared {
            info!("compositor running");
        }
        self.state = CompositorState::Running;
        self.frames_rendered += 1;
        Ok(())
    }

    /// Start playback of every source
    ///
    /// Every source is started even if an earlier one fails; the first failure is
    /// returned.
    pub fn play(&mut self) -> Result<()> {
        self.require("play", self.state != CompositorState::Released)?;

        let mut first_error = None;
        for source in &mut self.sources {
            if let Err(err) = source.play() {
                warn!("playback of `{}` failed: {err}", source.locator());
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Register the callback invoked (on decoder threads) when any source has a
    /// new frame
    pub fn set_on_frame_available(&mut self, listener: FrameListener) {
        for source in &mut self.sources {
            source.set_frame_listener(listener.clone());
        }
        self.frame_listener = Some(listener);
    }

    /// Free the shader, the unit quad and every source; later calls do nothing
    pub fn release(&mut self) {
        if self.state == CompositorState::Released {
            return;
        }

        self.free_gpu_resources();
        for source in &mut self.sources {
            source.release(&mut self.backend);
        }
        self.sources.clear();
        self.transforms = None;
        self.frame_listener = None;
        self.state = CompositorState::Released;
        info!("compositor released after {} frames", self.frames_rendered);
    }

    pub fn state(&self) -> CompositorState {
        self.state
    }

    pub fn sources(&self) -> &[VideoSource] {
        &self.sources
    }

    pub fn shader(&self) -> Option<&ShaderProgram> {
        self.shader.as_ref()
    }

    pub fn transforms(&self) -> Option<&FrameTransforms> {
        self.transforms.as_ref()
    }

    pub fn layout(&self) -> Option<&dyn PuzzleLayout> {
        self.layout.as_deref()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: RenderBackend> Drop for CompositingProgram<B> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Bind, describe, unbind, enable, draw, disable
fn draw_unit_quad(commands: &mut CommandList, quad: BufferId, position: ParameterHandle) {
    commands.push(GpuCommand::BindVertexBuffer(Some(quad)));
    commands.push(GpuCommand::VertexAttribLayout {
        handle: position,
        components: POSITION_COMPONENTS,
        stride: POSITION_STRIDE,
        offset: 0,
    });
    commands.push(GpuCommand::BindVertexBuffer(None));
    commands.push(GpuCommand::EnableAttribute(position));
    commands.push(GpuCommand::DrawArrays {
        topology: Topology::TriangleStrip,
        first: 0,
        count: QUAD_VERTEX_COUNT,
    });
    commands.push(GpuCommand::DisableAttribute(position));
}
