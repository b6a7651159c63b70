use std::sync::Arc;

use anyhow::{anyhow, Context};
use winit::window::Window;

use super::context::GpuContext;

/// Window surface the composited frame is presented to
///
/// Presentation stays outside the compositor: the application acquires a frame,
/// points the backend at its view, runs the compositor and then presents.
pub struct SurfacePresenter {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

impl SurfacePresenter {
    /// Create the surface and a device able to present to it
    pub async fn new(window: Arc<Window>) -> anyhow::Result<(Self, GpuContext)> {
        let size = window.inner_size();
        let instance = GpuContext::instance();
        let surface = instance
            .create_surface(window)
            .context("failed to create window surface")?;
        let gpu = GpuContext::for_surface(&instance, &surface).await?;

        let caps = surface.get_capabilities(gpu.adapter());
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(gpu.device(), &config);

        Ok((Self { surface, config }, gpu))
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Reconfigure after a lost or outdated surface
    pub fn reconfigure(&self, gpu: &GpuContext) {
        self.surface.configure(gpu.device(), &self.config);
    }

    /// Next swap-chain texture and a view of it
    pub fn acquire(&self) -> Result<(wgpu::SurfaceTexture, wgpu::TextureView), wgpu::SurfaceError> {
        let frame = self.surface.get_current_texture()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Ok((frame, view))
    }
}
