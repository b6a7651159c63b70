use std::sync::Arc;

use anyhow::{anyhow, Context};
use wgpu::{Adapter, Buffer, Device, DeviceDescriptor, Features, Instance, Limits, Queue, Surface};

/// Shared wgpu device and queue
///
/// Cloning is cheap (Arc). The compositor backend, the presenter and offscreen
/// targets all hold a clone of the same context.
#[derive(Clone)]
pub struct GpuContext {
    device: Arc<Device>,
    queue: Arc<Queue>,
    adapter: Arc<Adapter>,
}

impl GpuContext {
    pub fn instance() -> Instance {
        Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        })
    }

    /// Context without a surface, for offscreen rendering
    pub async fn headless() -> anyhow::Result<Self> {
        let instance = Self::instance();
        Self::with_adapter(&instance, None).await
    }

    /// Context whose adapter can present to `surface`
    ///
    /// `surface` must have been created from `instance`.
    pub async fn for_surface(instance: &Instance, surface: &Surface<'_>) -> anyhow::Result<Self> {
        Self::with_adapter(instance, Some(surface)).await
    }

    async fn with_adapter(
        instance: &Instance,
        compatible_surface: Option<&Surface<'_>>,
    ) -> anyhow::Result<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| anyhow!("failed to find an appropriate adapter: {e:?}"))?;

        let info = adapter.get_info();
        log::info!("using adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = Self::request_device(&adapter).await?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter: Arc::new(adapter),
        })
    }

    async fn request_device(adapter: &Adapter) -> anyhow::Result<(Device, Queue)> {
        let mut requested_features = Features::empty();
        if adapter
            .features()
            .contains(Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES)
        {
            requested_features |= Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;
        }

        adapter
            .request_device(&DeviceDescriptor {
                label: Some("video split device"),
                required_features: requested_features,
                required_limits: Limits::downlevel_defaults().using_resolution(adapter.limits()),
                memory_hints: Default::default(),
                experimental_features: Default::default(),
                trace: Default::default(),
            })
            .await
            .context("failed to create device")
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Map `buffer` for reading and copy its contents out
    ///
    /// Blocks the calling thread until the device has finished all submitted work.
    pub fn read_buffer_sync(&self, buffer: &Buffer) -> anyhow::Result<Vec<u8>> {
        let buffer_slice = buffer.slice(..);

        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            sender.send(result).ok();
        });

        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .context("device poll failed")?;

        match receiver.recv() {
            Ok(Ok(())) => {
                let data = buffer_slice.get_mapped_range();
                let result = data.to_vec();
                drop(data);
                buffer.unmap();
                Ok(result)
            }
            Ok(Err(e)) => Err(anyhow!("buffer mapping failed: {e:?}")),
            Err(_) => Err(anyhow!("channel closed before the buffer was mapped")),
        }
    }
}
