use anyhow::Result;

use super::camera::Camera;
use super::frame::{FrameRenderer, TEXTURE_FORMAT};
use super::gpu::GpuContext;
use super::pipeline::{CameraUniforms, PointPipeline};
use crate::field::buffers::PointBuffers;

/// Draws one frame of points and hands back RGBA pixels
pub trait FrameBackend {
    /// Upload whichever buffers are dirty (clearing the flags), then draw.
    fn draw(&mut self, points: &mut PointBuffers, offset_y: f32, time_s: f32) -> Result<Vec<u8>>;
}

/// Headless wgpu target shared by the `render` and `live` commands
pub struct OffscreenRenderer {
    gpu: GpuContext,
    pipeline: PointPipeline,
    frame: FrameRenderer,
    camera: Camera,
}

impl OffscreenRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        log::info!("Initializing GPU...");
        let gpu = GpuContext::new(width, height)?;
        let pipeline = PointPipeline::new(&gpu.device, TEXTURE_FORMAT)?;
        let frame = FrameRenderer::new(&gpu, &pipeline, width, height);
        Ok(Self {
            gpu,
            pipeline,
            frame,
            camera: Camera::new(width, height),
        })
    }
}

impl FrameBackend for OffscreenRenderer {
    fn draw(&mut self, points: &mut PointBuffers, offset_y: f32, time_s: f32) -> Result<Vec<u8>> {
        self.frame.upload(&self.gpu, points);
        let uniforms = CameraUniforms::new(self.camera.view_proj(time_s), offset_y);
        self.frame.render_and_readback(&self.gpu, &self.pipeline, &uniforms)
    }
}
