use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use video_split::cli::Cli;
use video_split::frame_stats::FrameStats;
use video_split::gpu::{
    GpuContext, OffscreenTarget, RecordingBackend, RenderBackend, SurfacePresenter, WgpuBackend,
    OFFSCREEN_FORMAT,
};
use video_split::video::PatternDecoderFactory;
use video_split::{CompositingProgram, RedrawSignal};

const HEADLESS_FRAME_INTERVAL: Duration = Duration::from_millis(16);

// === Compositor setup ===

/// Compositor with the CLI's sources and grid, prepared and playing
fn start_compositor<B: RenderBackend>(
    cli: &Cli,
    backend: B,
    width: u32,
    height: u32,
) -> anyhow::Result<CompositingProgram<B>> {
    let mut compositor = CompositingProgram::new(backend, PatternDecoderFactory);
    compositor.set_layout(cli.layout(width, height))?;
    for locator in &cli.sources {
        compositor
            .add_source(locator)
            .with_context(|| format!("cannot open source `{locator}`"))?;
    }
    compositor
        .prepare(width, height)
        .context("failed to prepare compositor")?;
    compositor.play().context("failed to start playback")?;
    Ok(compositor)
}

fn render_frame<B: RenderBackend>(compositor: &mut CompositingProgram<B>) -> anyhow::Result<()> {
    compositor.update_textures()?;
    compositor.run()?;
    Ok(())
}

// === Offscreen modes ===

fn run_dry(cli: &Cli) -> anyhow::Result<()> {
    let mut compositor = start_compositor(cli, RecordingBackend::new(), cli.width, cli.height)?;
    for _ in 0..cli.frames {
        render_frame(&mut compositor)?;
        thread::sleep(HEADLESS_FRAME_INTERVAL);
    }

    let backend = compositor.backend();
    let draws: usize = backend.plans().iter().map(|plan| plan.draws.len()).sum();
    info!(
        "dry run: {} frames validated, {} draws, {} backend calls",
        backend.plans().len(),
        draws,
        backend.calls().len()
    );
    compositor.release();
    Ok(())
}

fn run_headless(cli: &Cli) -> anyhow::Result<()> {
    let gpu = pollster::block_on(GpuContext::headless())?;
    let target = OffscreenTarget::new(&gpu, cli.width, cli.height);

    let mut backend = WgpuBackend::new(gpu.clone(), OFFSCREEN_FORMAT);
    backend.set_target(target.view(), target.width(), target.height());

    let mut compositor = start_compositor(cli, backend, cli.width, cli.height)?;
    let mut stats = FrameStats::default();
    for _ in 0..cli.frames {
        render_frame(&mut compositor)?;
        if let Some(fps) = stats.frame() {
            info!("FPS: {fps:.1}");
        }
        thread::sleep(HEADLESS_FRAME_INTERVAL);
    }

    let pixels = target.read_rgba(&gpu)?;
    let white = pixels
        .chunks_exact(4)
        .filter(|p| p[0] == 255 && p[1] == 255 && p[2] == 255)
        .count();
    info!(
        "headless: {} frames, {:.1}% of the last frame is white",
        stats.total_frames(),
        100.0 * white as f64 / (pixels.len() / 4).max(1) as f64
    );
    compositor.release();
    Ok(())
}

// === Application ===

#[derive(Debug, Clone, Copy)]
enum UserEvent {
    /// A decoder latched a new frame
    FrameAvailable,
}

struct App {
    cli: Cli,
    signal: RedrawSignal,
    window: Option<Arc<Window>>,
    presenter: Option<SurfacePresenter>,
    gpu: Option<GpuContext>,
    compositor: Option<CompositingProgram<WgpuBackend>>,
    stats: FrameStats,
}

impl App {
    fn new(cli: Cli, proxy: EventLoopProxy<UserEvent>) -> Self {
        let proxy = Mutex::new(proxy);
        let signal = RedrawSignal::with_sender(move || {
            let proxy = proxy.lock().unwrap_or_else(PoisonError::into_inner);
            proxy.send_event(UserEvent::FrameAvailable)
        });

        Self {
            cli,
            signal,
            window: None,
            presenter: None,
            gpu: None,
            compositor: None,
            stats: FrameStats::default(),
        }
    }

    fn init(&mut self, window: Arc<Window>) -> anyhow::Result<()> {
        let (presenter, gpu) = pollster::block_on(SurfacePresenter::new(window.clone()))?;
        let (width, height) = presenter.size();
        let backend = WgpuBackend::new(gpu.clone(), presenter.format());

        let mut compositor = start_compositor(&self.cli, backend, width, height)?;
        compositor.set_on_frame_available(self.signal.frame_listener());

        info!("window {width}x{height}, {} sources", compositor.sources().len());
        self.window = Some(window);
        self.presenter = Some(presenter);
        self.gpu = Some(gpu);
        self.compositor = Some(compositor);
        Ok(())
    }

    fn redraw(&mut self) {
        self.signal.take();
        let (Some(presenter), Some(gpu), Some(compositor)) =
            (&self.presenter, &self.gpu, &mut self.compositor)
        else {
            return;
        };

        let (frame, view) = match presenter.acquire() {
            Ok(acquired) => acquired,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                presenter.reconfigure(gpu);
                return;
            }
            Err(e) => {
                warn!("surface error: {e}");
                return;
            }
        };

        let (width, height) = presenter.size();
        compositor.backend_mut().set_target(view, width, height);
        if let Err(e) = render_frame(compositor) {
            error!("render error: {e:#}");
        }
        compositor.backend_mut().clear_target();
        frame.present();

        if let Some(fps) = self.stats.frame() {
            info!("FPS: {fps:.1}");
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut compositor) = self.compositor.take() {
            compositor.release();
        }
        event_loop.exit();
    }
}

impl ApplicationHandler<UserEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match event_loop.create_window(
            Window::default_attributes()
                .with_title("Video Split")
                .with_resizable(false)
                .with_inner_size(winit::dpi::PhysicalSize::new(self.cli.width, self.cli.height)),
        ) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                error!("failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init(window.clone()) {
            error!("failed to initialize compositor: {e:#}");
            event_loop.exit();
            return;
        }
        window.request_redraw();
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: UserEvent) {
        match event {
            UserEvent::FrameAvailable => {
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        ..
                    },
                ..
            } => self.shutdown(event_loop),
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.dry_run {
        return run_dry(&cli);
    }
    if cli.headless {
        return run_headless(&cli);
    }

    let event_loop = EventLoop::<UserEvent>::with_user_event().build()?;
    let mut app = App::new(cli, event_loop.create_proxy());

    info!("Video Split - Escape to quit");
    event_loop.run_app(&mut app)?;

    Ok(())
}
