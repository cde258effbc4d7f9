use anyhow::Result;
use wgpu;

use super::gpu::GpuContext;
use super::pipeline::{CameraUniforms, PointPipeline};
use crate::field::buffers::PointBuffers;

pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// GPU-side copies of the point buffers, resized when the field is rebuilt
struct PointVertices {
    positions: wgpu::Buffer,
    colors: wgpu::Buffer,
    count: u32,
}

impl PointVertices {
    fn new(gpu: &GpuContext, count: usize) -> Self {
        let size = (count.max(1) * 3 * std::mem::size_of::<f32>()) as u64;
        let make = |label| {
            gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        Self {
            positions: make("point_positions"),
            colors: make("point_colors"),
            count: count as u32,
        }
    }
}

pub struct FrameRenderer {
    pub render_texture: wgpu::Texture,
    pub render_texture_view: wgpu::TextureView,
    pub output_buffer: wgpu::Buffer,
    pub width: u32,
    pub height: u32,
    pub padded_bytes_per_row: u32,
    pub unpadded_bytes_per_row: u32,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    vertices: PointVertices,
}

impl FrameRenderer {
    pub fn new(gpu: &GpuContext, pipeline: &PointPipeline, width: u32, height: u32) -> Self {
        let render_texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("render_target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let render_texture_view = render_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let unpadded_bytes_per_row = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let output_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("output_buffer"),
            size: (padded_bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let uniform_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("camera_uniforms"),
            size: std::mem::size_of::<CameraUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camera_bind_group"),
            layout: &pipeline.bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        Self {
            render_texture,
            render_texture_view,
            output_buffer,
            width,
            height,
            padded_bytes_per_row,
            unpadded_bytes_per_row,
            uniform_buffer,
            bind_group,
            vertices: PointVertices::new(gpu, 0),
        }
    }

    /// Re-upload whichever point buffers changed since the last call. A point
    /// count change (field rebuilt) reallocates and uploads both.
    pub fn upload(&mut self, gpu: &GpuContext, points: &mut PointBuffers) {
        let mut dirty = points.take_dirty();
        if self.vertices.count as usize != points.len() {
            self.vertices = PointVertices::new(gpu, points.len());
            dirty.positions = true;
            dirty.colors = true;
        }
        if points.is_empty() || !dirty.any() {
            return;
        }
        if dirty.positions {
            gpu.queue
                .write_buffer(&self.vertices.positions, 0, bytemuck::cast_slice(points.positions()));
        }
        if dirty.colors {
            gpu.queue
                .write_buffer(&self.vertices.colors, 0, bytemuck::cast_slice(points.colors()));
        }
    }

    pub fn render_and_readback(
        &self,
        gpu: &GpuContext,
        pipeline: &PointPipeline,
        uniforms: &CameraUniforms,
    ) -> Result<Vec<u8>> {
        gpu.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("points_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.render_texture_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if self.vertices.count > 0 {
                render_pass.set_pipeline(&pipeline.pipeline);
                render_pass.set_bind_group(0, &self.bind_group, &[]);
                render_pass.set_vertex_buffer(0, self.vertices.positions.slice(..));
                render_pass.set_vertex_buffer(1, self.vertices.colors.slice(..));
                render_pass.draw(0..self.vertices.count, 0..1);
            }
        }

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.render_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );

        gpu.queue.submit(std::iter::once(encoder.finish()));

        // Read back
        let buffer_slice = self.output_buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        receiver.recv()??;

        let data = buffer_slice.get_mapped_range();
        let pixels = strip_row_padding(
            &data,
            self.padded_bytes_per_row as usize,
            self.unpadded_bytes_per_row as usize,
            self.height as usize,
        );
        drop(data);
        self.output_buffer.unmap();

        Ok(pixels)
    }
}

fn strip_row_padding(data: &[u8], padded: usize, unpadded: usize, rows: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(unpadded * rows);
    for row in 0..rows {
        let start = row * padded;
        pixels.extend_from_slice(&data[start..start + unpadded]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_padding_is_removed() {
        let data = [1u8, 2, 0, 0, 3, 4, 0, 0];
        assert_eq!(strip_row_padding(&data, 4, 2, 2), vec![1, 2, 3, 4]);
    }
}
