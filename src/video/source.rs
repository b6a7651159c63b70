use glam::Mat4;
use log::{debug, warn};

use super::decoder::{FrameListener, VideoDecoder};
use super::frame::VideoFrame;
use crate::error::{CompositorError, DecodeError, Result};
use crate::gpu::{CommandList, GpuCommand, RenderBackend, TextureId};
use crate::math::{FrameTransforms, Rect};
use crate::shader::ParameterHandle;

/// One decoded stream and the GPU texture it is sampled from
pub struct VideoSource {
    locator: String,
    decoder: Option<Box<dyn VideoDecoder>>,
    texture: Option<TextureId>,
    texture_transform: Mat4,
    display_area: Rect,
}

impl VideoSource {
    pub fn new(locator: impl Into<String>, decoder: Box<dyn VideoDecoder>) -> Self {
        Self {
            locator: locator.into(),
            decoder: Some(decoder),
            texture: None,
            texture_transform: Mat4::IDENTITY,
            display_area: Rect::default(),
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Bind the decoded stream to `texture`; done once while preparing
    pub fn configure_output(&mut self, texture: TextureId) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.attach(texture);
        }
        self.texture = Some(texture);
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    pub fn set_display_area(&mut self, rect: Rect) {
        self.display_area = rect;
    }

    pub fn display_area(&self) -> Rect {
        self.display_area
    }

    /// Snapshot taken at the last [`set_texture`](Self::set_texture)
    pub fn texture_transform(&self) -> Mat4 {
        self.texture_transform
    }

    /// Upload the decoder's texture transform and bind this source's texture
    pub fn set_texture(
        &mut self,
        commands: &mut CommandList,
        sampler: ParameterHandle,
        matrix: ParameterHandle,
    ) -> Result<()> {
        let texture = self.texture.ok_or_else(|| {
            CompositorError::Backend(format!("source `{}` has no texture", self.locator))
        })?;
        if let Some(decoder) = self.decoder.as_ref() {
            self.texture_transform = decoder.latest_frame_transform();
        }

        commands.push(GpuCommand::UniformMatrix {
            handle: matrix,
            matrix: self.texture_transform,
        });
        commands.push(GpuCommand::BindTexture {
            handle: sampler,
            texture,
        });
        Ok(())
    }

    /// Upload the model-view-projection matrix for the current display area
    pub fn set_matrix(
        &self,
        commands: &mut CommandList,
        mvp: ParameterHandle,
        transforms: &FrameTransforms,
    ) {
        commands.push(GpuCommand::UniformMatrix {
            handle: mvp,
            matrix: transforms.area_mvp(&self.display_area),
        });
    }

    pub fn play(&mut self) -> std::result::Result<(), DecodeError> {
        match self.decoder.as_mut() {
            Some(decoder) => decoder.start(),
            None => Err(DecodeError::Playback(format!(
                "source `{}` was released",
                self.locator
            ))),
        }
    }

    pub fn stop(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.stop();
        }
    }

    pub fn set_frame_listener(&mut self, listener: FrameListener) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.set_frame_listener(listener);
        }
    }

    /// Latched frame waiting to be uploaded, if any
    pub fn take_frame(&mut self) -> Option<VideoFrame> {
        self.decoder.as_mut().and_then(|decoder| decoder.poll_frame())
    }

    pub fn is_released(&self) -> bool {
        self.decoder.is_none() && self.texture.is_none()
    }

    /// Stop playback, free the decoder and delete the texture
    pub fn release<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.stop();
            decoder.release();
        }
        if let Some(texture) = self.texture.take() {
            backend.delete_texture(texture);
        }
        debug!("released source `{}`", self.locator);
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.stop();
            decoder.release();
        }
        if let Some(texture) = self.texture {
            warn!("source `{}` dropped with live texture {texture:?}", self.locator);
        }
    }
}
