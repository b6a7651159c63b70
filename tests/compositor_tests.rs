mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::Mat4;
use video_split::compositor::{CLEAR_COLOR, UNIT_QUAD};
use video_split::error::{CompositorError, DecodeError};
use video_split::gpu::{
    BackendCall, BufferId, CommandList, GpuCommand, ProgramId, ProgramSource, RecordingBackend,
    RenderBackend, TextureId,
};
use video_split::layout::{Area, GridLayout, PuzzleLayout};
use video_split::math::{Orientation, Rect};
use video_split::shader::{ParameterHandle, ProgramInterface};
use video_split::video::VideoFrame;
use video_split::{CompositingProgram, CompositorState};

use common::StubFactory;

const MATRIX: (u32, u32) = (0, 0);
const TEXTURE_MATRIX: (u32, u32) = (0, 1);
const SAMPLER: (u32, u32) = (1, 0);

fn grid(rows: usize, columns: usize) -> GridLayout {
    GridLayout::new(Rect::from_size(640.0, 480.0), rows, columns)
}

fn compositor_with(
    sources: usize,
    layout: GridLayout,
) -> (CompositingProgram<RecordingBackend>, StubFactory) {
    let factory = StubFactory::new();
    let mut compositor = CompositingProgram::new(RecordingBackend::new(), factory.clone());
    compositor.set_layout(layout).unwrap();
    for i in 0..sources {
        assert_eq!(compositor.add_source(&format!("stub:{i}")).unwrap(), i);
    }
    (compositor, factory)
}

#[cfg(test)]
mod compositor_tests {
    use super::*;

    #[test]
    fn test_two_sources_alternate_over_four_areas() {
        let (mut compositor, _) = compositor_with(2, grid(2, 2));
        compositor.prepare(640, 480).unwrap();
        compositor.run().unwrap();

        let textures: Vec<TextureId> = compositor
            .sources()
            .iter()
            .map(|source| source.texture().expect("texture allocated"))
            .collect();
        let plan = compositor.backend().last_plan().expect("frame submitted");

        assert_eq!(plan.draws.len(), 4, "one draw per area");
        for (i, draw) in plan.draws.iter().enumerate() {
            assert_eq!(
                draw.textures[&SAMPLER],
                textures[i % 2],
                "area {i} should sample source {}",
                i % 2
            );
        }
        assert_eq!(compositor.state(), CompositorState::Running);
    }

    #[test]
    fn test_each_draw_gets_its_area_matrix() {
        let layout = grid(2, 2);
        let (mut compositor, _) = compositor_with(1, layout.clone());
        compositor.prepare(640, 480).unwrap();
        compositor.run().unwrap();

        let transforms = *compositor.transforms().unwrap();
        let plan = compositor.backend().last_plan().unwrap();
        for (i, draw) in plan.draws.iter().enumerate() {
            let expected = transforms.area_mvp(&layout.area(i).rect);
            assert!(
                draw.matrices[&MATRIX].abs_diff_eq(expected, 1e-6),
                "area {i} matrix mismatch"
            );
        }
    }

    #[test]
    fn test_frame_starts_with_clear_and_viewport() {
        let (mut compositor, _) = compositor_with(1, grid(1, 1));
        compositor.prepare(320, 200).unwrap();
        compositor.run().unwrap();

        let frame = compositor.backend().frames().last().unwrap();
        let program = compositor.shader().unwrap().program().unwrap();
        assert_eq!(
            &frame.commands()[..3],
            &[
                GpuCommand::ClearColor(CLEAR_COLOR),
                GpuCommand::Viewport {
                    x: 0,
                    y: 0,
                    width: 320,
                    height: 200
                },
                GpuCommand::UseProgram(program),
            ]
        );
        assert_eq!(compositor.backend().last_plan().unwrap().clear, Some(CLEAR_COLOR));
    }

    #[test]
    fn test_prepare_uploads_unit_quad_and_attaches_textures() {
        let (mut compositor, factory) = compositor_with(2, grid(1, 2));
        compositor.prepare(64, 64).unwrap();

        let quad = compositor
            .backend()
            .calls()
            .iter()
            .find_map(|call| match call {
                BackendCall::CreateVertexBuffer { buffer, .. } => Some(*buffer),
                _ => None,
            })
            .expect("quad buffer created");
        assert_eq!(compositor.backend().buffer_contents(quad), Some(&UNIT_QUAD[..]));

        for i in 0..2 {
            assert_eq!(factory.decoder(i).attached(), compositor.sources()[i].texture());
        }
        assert_eq!(compositor.backend().live_textures(), 2);
        assert_eq!(compositor.state(), CompositorState::Prepared);
    }

    #[test]
    fn test_more_sources_than_areas() {
        let (mut compositor, _) = compositor_with(3, grid(1, 2));
        compositor.prepare(64, 64).unwrap();
        compositor.run().unwrap();

        let first = compositor.sources()[0].texture().unwrap();
        let second = compositor.sources()[1].texture().unwrap();
        let plan = compositor.backend().last_plan().unwrap();
        assert_eq!(plan.draws.len(), 2);
        assert_eq!(plan.draws[0].textures[&SAMPLER], first);
        assert_eq!(plan.draws[1].textures[&SAMPLER], second);
        // The third source still owns a texture even though nothing samples it
        assert_eq!(compositor.backend().live_textures(), 3);
    }

    #[test]
    fn test_no_sources_renders_clear_only() {
        let (mut compositor, _) = compositor_with(0, grid(2, 2));
        compositor.prepare(64, 64).unwrap();
        compositor.run().unwrap();

        let plan = compositor.backend().last_plan().unwrap();
        assert!(plan.draws.is_empty());
        assert_eq!(plan.clear, Some(CLEAR_COLOR));
        assert_eq!(compositor.backend().live_textures(), 0);
    }

    #[test]
    fn test_no_layout_renders_clear_only() {
        let factory = StubFactory::new();
        let mut compositor = CompositingProgram::new(RecordingBackend::new(), factory);
        compositor.add_source("stub:0").unwrap();
        compositor.prepare(64, 64).unwrap();
        compositor.run().unwrap();
        assert!(compositor.backend().last_plan().unwrap().draws.is_empty());
    }

    #[test]
    fn test_area_list_layout() {
        let factory = StubFactory::new();
        let mut compositor = CompositingProgram::new(RecordingBackend::new(), factory);
        compositor
            .set_layout(vec![
                Area::new(0, Rect::new(10.0, 10.0, 100.0, 50.0)),
                Area::new(1, Rect::new(200.0, 10.0, 100.0, 50.0)),
            ])
            .unwrap();
        compositor.add_source("stub:0").unwrap();
        compositor.prepare(400, 300).unwrap();
        compositor.run().unwrap();

        assert_eq!(compositor.backend().last_plan().unwrap().draws.len(), 2);
        // Display area reflects the last area drawn
        assert_eq!(
            compositor.sources()[0].display_area(),
            Rect::new(200.0, 10.0, 100.0, 50.0)
        );
    }

    #[test]
    fn test_decoder_transform_reaches_the_draw() {
        let (mut compositor, factory) = compositor_with(1, grid(1, 1));
        compositor.prepare(64, 64).unwrap();

        let rotation = Orientation::Rotate90.texture_transform();
        factory.decoder(0).set_transform(rotation);
        compositor.run().unwrap();

        let draw = &compositor.backend().last_plan().unwrap().draws[0];
        assert_eq!(draw.matrices[&TEXTURE_MATRIX], rotation);
        assert_eq!(compositor.sources()[0].texture_transform(), rotation);
    }

    #[test]
    fn test_default_texture_transform_is_identity() {
        let (mut compositor, _) = compositor_with(1, grid(1, 1));
        compositor.prepare(64, 64).unwrap();
        compositor.run().unwrap();
        let draw = &compositor.backend().last_plan().unwrap().draws[0];
        assert_eq!(draw.matrices[&TEXTURE_MATRIX], Mat4::IDENTITY);
    }

    // === Lifecycle ===

    #[test]
    fn test_run_before_prepare_is_invalid() {
        let (mut compositor, _) = compositor_with(1, grid(1, 1));
        assert!(matches!(
            compositor.run(),
            Err(CompositorError::InvalidState {
                state: CompositorState::Uninitialized,
                ..
            })
        ));
        assert!(compositor.backend().plans().is_empty());
    }

    #[test]
    fn test_run_after_release_is_invalid() {
        let (mut compositor, _) = compositor_with(1, grid(1, 1));
        compositor.prepare(64, 64).unwrap();
        compositor.run().unwrap();
        compositor.release();

        assert!(matches!(
            compositor.run(),
            Err(CompositorError::InvalidState {
                state: CompositorState::Released,
                ..
            })
        ));
        assert!(compositor.update_textures().is_err());
        assert_eq!(compositor.backend().plans().len(), 1);
    }

    #[test]
    fn test_second_prepare_is_invalid() {
        let (mut compositor, _) = compositor_with(1, grid(1, 1));
        compositor.prepare(64, 64).unwrap();
        let textures = compositor.backend().live_textures();

        assert!(matches!(
            compositor.prepare(64, 64),
            Err(CompositorError::InvalidState { .. })
        ));
        assert_eq!(compositor.backend().live_textures(), textures);
        assert_eq!(compositor.backend().live_programs(), 1);
    }

    #[test]
    fn test_add_source_after_prepare_is_invalid() {
        let (mut compositor, factory) = compositor_with(1, grid(1, 1));
        compositor.prepare(64, 64).unwrap();
        assert!(matches!(
            compositor.add_source("stub:late"),
            Err(CompositorError::InvalidState {
                state: CompositorState::Prepared,
                ..
            })
        ));
        assert_eq!(factory.opened(), 1);
    }

    #[test]
    fn test_set_layout_after_release_is_invalid() {
        let (mut compositor, _) = compositor_with(0, grid(1, 1));
        compositor.release();
        assert!(compositor.set_layout(grid(2, 2)).is_err());
    }

    #[test]
    fn test_release_frees_everything() {
        let (mut compositor, factory) = compositor_with(2, grid(2, 2));
        compositor.prepare(64, 64).unwrap();
        compositor.run().unwrap();
        compositor.release();

        assert_eq!(compositor.state(), CompositorState::Released);
        assert!(compositor.sources().is_empty());
        assert!(compositor.shader().is_none());
        assert!(compositor.transforms().is_none());

        let backend = compositor.backend();
        assert_eq!(backend.live_programs(), 0);
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_textures(), 0);
        for i in 0..2 {
            let decoder = factory.decoder(i);
            assert!(decoder.released.load(Ordering::SeqCst));
            assert_eq!(decoder.stops.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_release_is_idempotent() {
        let (mut compositor, _) = compositor_with(1, grid(1, 1));
        compositor.prepare(64, 64).unwrap();
        compositor.release();
        let calls = compositor.backend().calls().len();

        compositor.release();
        compositor.release();
        assert_eq!(compositor.backend().calls().len(), calls, "no double free");
    }

    #[test]
    fn test_release_without_prepare() {
        let (mut compositor, factory) = compositor_with(2, grid(1, 1));
        compositor.release();
        assert!(compositor.backend().calls().is_empty());
        assert!(factory.decoder(1).released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_prepare_failure_frees_partial_allocation() {
        let factory = StubFactory::new();
        let backend = RecordingBackend::new().with_texture_limit(1);
        let mut compositor = CompositingProgram::new(backend, factory);
        compositor.set_layout(grid(1, 2)).unwrap();
        compositor.add_source("stub:0").unwrap();
        compositor.add_source("stub:1").unwrap();

        let result = compositor.prepare(64, 64);
        assert!(matches!(result, Err(CompositorError::ResourceExhaustion(_))));
        assert_eq!(compositor.state(), CompositorState::Uninitialized);
        assert!(compositor.shader().is_none());

        let backend = compositor.backend();
        assert_eq!(backend.live_programs(), 0);
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_textures(), 0);

        compositor.release();
        assert_eq!(compositor.state(), CompositorState::Released);
    }

    #[test]
    fn test_invalid_viewport_allocates_nothing() {
        let (mut compositor, _) = compositor_with(1, grid(1, 1));
        assert!(matches!(
            compositor.prepare(640, 0),
            Err(CompositorError::InvalidViewport { .. })
        ));
        assert!(compositor.backend().calls().is_empty());
        compositor.prepare(640, 480).unwrap();
    }

    // === Frames and playback ===

    #[test]
    fn test_update_textures_uploads_latched_frames() {
        let (mut compositor, factory) = compositor_with(2, grid(1, 2));
        compositor.prepare(64, 64).unwrap();
        assert_eq!(compositor.update_textures().unwrap(), 0);

        factory.decoder(1).publish(VideoFrame::solid(8, 6, [255, 255, 255, 255]));
        assert_eq!(compositor.update_textures().unwrap(), 1);

        let texture = compositor.sources()[1].texture().unwrap();
        assert!(compositor.backend().calls().contains(&BackendCall::UploadFrame {
            texture,
            width: 8,
            height: 6
        }));
        // The latch was drained
        assert_eq!(compositor.update_textures().unwrap(), 0);
    }

    #[test]
    fn test_play_starts_every_source() {
        let (mut compositor, factory) = compositor_with(3, grid(1, 1));
        compositor.prepare(64, 64).unwrap();
        factory.decoder(0).fail_start.store(true, Ordering::SeqCst);

        let result = compositor.play();
        assert!(matches!(
            result,
            Err(CompositorError::Decode(DecodeError::Playback(_)))
        ));
        assert_eq!(factory.decoder(1).starts.load(Ordering::SeqCst), 1);
        assert_eq!(factory.decoder(2).starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_frame_listener_reaches_existing_and_later_sources() {
        let factory = StubFactory::new();
        let mut compositor = CompositingProgram::new(RecordingBackend::new(), factory.clone());
        compositor.add_source("stub:early").unwrap();

        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        compositor.set_on_frame_available(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        compositor.add_source("stub:late").unwrap();

        assert!(factory.decoder(0).has_listener());
        assert!(factory.decoder(1).has_listener());

        factory.decoder(0).publish(VideoFrame::solid(1, 1, [0, 0, 0, 255]));
        factory.decoder(1).publish(VideoFrame::solid(1, 1, [0, 0, 0, 255]));
        assert_eq!(notified.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_frames_rendered_counts_runs() {
        let (mut compositor, _) = compositor_with(1, grid(1, 1));
        compositor.prepare(64, 64).unwrap();
        for _ in 0..5 {
            compositor.run().unwrap();
        }
        assert_eq!(compositor.frames_rendered(), 5);
        assert_eq!(compositor.backend().plans().len(), 5);
    }
}

/// Recording backend whose uploads into one texture always fail
struct FlakyUploads {
    inner: RecordingBackend,
    broken: Option<TextureId>,
}

impl RenderBackend for FlakyUploads {
    fn create_program(
        &mut self,
        source: &ProgramSource<'_>,
        interface: &ProgramInterface,
    ) -> video_split::Result<ProgramId> {
        self.inner.create_program(source, interface)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.inner.delete_program(program)
    }

    fn create_vertex_buffer(&mut self, vertices: &[f32]) -> video_split::Result<BufferId> {
        self.inner.create_vertex_buffer(vertices)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.inner.delete_buffer(buffer)
    }

    fn generate_textures(&mut self, count: usize) -> video_split::Result<Vec<TextureId>> {
        let textures = self.inner.generate_textures(count)?;
        self.broken = textures.first().copied();
        Ok(textures)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.inner.delete_texture(texture)
    }

    fn upload_frame(&mut self, texture: TextureId, frame: &VideoFrame) -> video_split::Result<()> {
        if Some(texture) == self.broken {
            return Err(CompositorError::Backend("upload rejected".into()));
        }
        self.inner.upload_frame(texture, frame)
    }

    fn submit(&mut self, commands: &CommandList) -> video_split::Result<()> {
        self.inner.submit(commands)
    }
}

#[cfg(test)]
mod best_effort_tests {
    use super::*;

    #[test]
    fn test_failed_upload_does_not_abort_the_frame() {
        let factory = StubFactory::new();
        let backend = FlakyUploads {
            inner: RecordingBackend::new(),
            broken: None,
        };
        let mut compositor = CompositingProgram::new(backend, factory.clone());
        compositor.set_layout(grid(1, 2)).unwrap();
        compositor.add_source("stub:0").unwrap();
        compositor.add_source("stub:1").unwrap();
        compositor.prepare(64, 64).unwrap();

        factory.decoder(0).publish(VideoFrame::solid(2, 2, [9, 9, 9, 255]));
        factory.decoder(1).publish(VideoFrame::solid(2, 2, [9, 9, 9, 255]));
        assert_eq!(compositor.update_textures().unwrap(), 1);

        compositor.run().unwrap();
        let plan = compositor.backend().inner.last_plan().unwrap();
        assert_eq!(plan.draws.len(), 2, "both areas still drawn");
    }

    #[test]
    fn test_oversized_frame_is_skipped_not_fatal() {
        let factory = StubFactory::new();
        let backend = RecordingBackend::new().with_max_texture_dimension(64);
        let mut compositor = CompositingProgram::new(backend, factory.clone());
        compositor.set_layout(grid(1, 2)).unwrap();
        compositor.add_source("stub:huge").unwrap();
        compositor.add_source("stub:small").unwrap();
        compositor.prepare(64, 64).unwrap();

        factory.decoder(0).publish(VideoFrame::solid(20000, 4, [255, 255, 255, 255]));
        factory.decoder(1).publish(VideoFrame::solid(8, 8, [255, 255, 255, 255]));
        assert_eq!(compositor.update_textures().unwrap(), 1);

        compositor.run().unwrap();
        assert_eq!(compositor.backend().last_plan().unwrap().draws.len(), 2);
        assert_eq!(compositor.state(), CompositorState::Running);
    }

    #[test]
    fn test_handles_are_uniform_slots() {
        let (mut compositor, _) = compositor_with(1, grid(1, 1));
        compositor.prepare(64, 64).unwrap();
        let shader = compositor.shader().unwrap();
        assert_eq!(
            shader.parameter_handle_by_name("u_texture_sampler").unwrap(),
            ParameterHandle::Uniform {
                group: SAMPLER.0,
                binding: SAMPLER.1
            }
        );
        assert_eq!(
            shader.parameter_handle_by_name("u_matrix").unwrap(),
            ParameterHandle::Uniform {
                group: MATRIX.0,
                binding: MATRIX.1
            }
        );
    }
}

/// Recording backend whose state outlives the compositor that owns the handle
#[derive(Clone, Default)]
struct SharedRecording(Rc<RefCell<RecordingBackend>>);

impl RenderBackend for SharedRecording {
    fn create_program(
        &mut self,
        source: &ProgramSource<'_>,
        interface: &ProgramInterface,
    ) -> video_split::Result<ProgramId> {
        self.0.borrow_mut().create_program(source, interface)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.0.borrow_mut().delete_program(program)
    }

    fn create_vertex_buffer(&mut self, vertices: &[f32]) -> video_split::Result<BufferId> {
        self.0.borrow_mut().create_vertex_buffer(vertices)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.0.borrow_mut().delete_buffer(buffer)
    }

    fn generate_textures(&mut self, count: usize) -> video_split::Result<Vec<TextureId>> {
        self.0.borrow_mut().generate_textures(count)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.0.borrow_mut().delete_texture(texture)
    }

    fn upload_frame(&mut self, texture: TextureId, frame: &VideoFrame) -> video_split::Result<()> {
        self.0.borrow_mut().upload_frame(texture, frame)
    }

    fn submit(&mut self, commands: &CommandList) -> video_split::Result<()> {
        self.0.borrow_mut().submit(commands)
    }
}

#[cfg(test)]
mod drop_tests {
    use super::*;

    #[test]
    fn test_drop_releases_everything() {
        let factory = StubFactory::new();
        let backend = SharedRecording::default();
        {
            let mut compositor = CompositingProgram::new(backend.clone(), factory.clone());
            compositor.set_layout(grid(2, 2)).unwrap();
            compositor.add_source("stub:0").unwrap();
            compositor.add_source("stub:1").unwrap();
            compositor.prepare(64, 64).unwrap();
            compositor.play().unwrap();
            compositor.run().unwrap();

            let recording = backend.0.borrow();
            assert_eq!(recording.live_programs(), 1);
            assert_eq!(recording.live_buffers(), 1);
            assert_eq!(recording.live_textures(), 2);
        }

        let recording = backend.0.borrow();
        assert_eq!(recording.live_programs(), 0);
        assert_eq!(recording.live_buffers(), 0);
        assert_eq!(recording.live_textures(), 0);
        for i in 0..2 {
            let decoder = factory.decoder(i);
            assert!(decoder.released.load(Ordering::SeqCst), "decoder {i} released");
            assert_eq!(decoder.stops.load(Ordering::SeqCst), 1, "decoder {i} stopped once");
        }
    }

    #[test]
    fn test_drop_after_release_frees_nothing_twice() {
        let factory = StubFactory::new();
        let backend = SharedRecording::default();
        let calls = {
            let mut compositor = CompositingProgram::new(backend.clone(), factory.clone());
            compositor.add_source("stub:0").unwrap();
            compositor.prepare(64, 64).unwrap();
            compositor.release();
            let calls = backend.0.borrow().calls().len();
            calls
        };

        assert_eq!(backend.0.borrow().calls().len(), calls);
        assert_eq!(factory.decoder(0).stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_of_unprepared_compositor() {
        let factory = StubFactory::new();
        let backend = SharedRecording::default();
        {
            let mut compositor = CompositingProgram::new(backend.clone(), factory.clone());
            compositor.add_source("stub:0").unwrap();
        }
        assert!(backend.0.borrow().calls().is_empty());
        assert!(factory.decoder(0).released.load(Ordering::SeqCst));
    }
}
