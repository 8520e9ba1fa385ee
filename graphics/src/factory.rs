//! Resource creation capability.
//!
//! Render passes, the scene and the editor overlay create their GPU objects
//! through [`ResourceFactory`] rather than through [`Device`] itself, so they
//! never reach into queues, heaps or the frame loop.

use bytemuck::Pod;

use crate::device::Device;
use crate::error::GraphicsError;
use crate::resources::{Buffer, PipelineState, Sampler, Texture};
use crate::types::{
    BufferDescriptor, BufferUsage, ComputePipelineDescriptor, Extent2d, GraphicsPipelineDescriptor,
    SamplerDescriptor, ShaderBinary, TextureDescriptor, TextureFormat,
};

/// Creates textures, buffers, samplers and pipelines.
pub trait ResourceFactory {
    /// Create a texture, optionally filled with mip 0 data.
    fn create_texture(
        &self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> Result<Texture, GraphicsError>;

    /// Recreate a texture at a new size, keeping its descriptor slots.
    fn resize_texture(
        &self,
        texture: &mut Texture,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError>;

    fn create_buffer(
        &self,
        desc: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> Result<Buffer, GraphicsError>;

    fn create_sampler(&self, desc: &SamplerDescriptor) -> Result<Sampler, GraphicsError>;

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDescriptor,
    ) -> Result<PipelineState, GraphicsError>;

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor,
    ) -> Result<PipelineState, GraphicsError>;

    fn load_shader(&self, name: &str) -> Result<ShaderBinary, GraphicsError>;

    /// Number of frame slots; per-frame buffers are replicated this many times.
    fn frames_in_flight(&self) -> usize;

    fn backbuffer_format(&self) -> TextureFormat;

    fn backbuffer_extent(&self) -> Extent2d;

    /// Load a vertex and pixel shader pair and describe a graphics pipeline.
    fn graphics_pipeline_descriptor(
        &self,
        vertex: &str,
        pixel: &str,
    ) -> Result<GraphicsPipelineDescriptor, GraphicsError> {
        Ok(GraphicsPipelineDescriptor::new(
            self.load_shader(vertex)?,
            self.load_shader(pixel)?,
        ))
    }
}

/// One CPU-visible constant buffer per frame slot, each holding `value`.
///
/// The buffer for a slot may only be rewritten once that slot's previous
/// frame has completed.
pub fn create_constant_buffers<T: Pod>(
    factory: &dyn ResourceFactory,
    label: &str,
    value: &T,
) -> Result<Vec<Buffer>, GraphicsError> {
    let bytes = bytemuck::bytes_of(value);
    (0..factory.frames_in_flight())
        .map(|slot| {
            factory.create_buffer(
                &BufferDescriptor::new(BufferUsage::ConstantBuffer, bytes.len() as u64, 0)
                    .with_label(format!("{label} [{slot}]")),
                Some(bytes),
            )
        })
        .collect()
}

impl ResourceFactory for Device {
    fn create_texture(
        &self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> Result<Texture, GraphicsError> {
        Device::create_texture(self, desc, data)
    }

    fn resize_texture(
        &self,
        texture: &mut Texture,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError> {
        Device::resize_texture(self, texture, width, height)
    }

    fn create_buffer(
        &self,
        desc: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> Result<Buffer, GraphicsError> {
        Device::create_buffer(self, desc, data)
    }

    fn create_sampler(&self, desc: &SamplerDescriptor) -> Result<Sampler, GraphicsError> {
        Device::create_sampler(self, desc)
    }

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDescriptor,
    ) -> Result<PipelineState, GraphicsError> {
        Device::create_graphics_pipeline(self, desc)
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor,
    ) -> Result<PipelineState, GraphicsError> {
        Device::create_compute_pipeline(self, desc)
    }

    fn load_shader(&self, name: &str) -> Result<ShaderBinary, GraphicsError> {
        Device::load_shader(self, name)
    }

    fn frames_in_flight(&self) -> usize {
        Device::frames_in_flight(self)
    }

    fn backbuffer_format(&self) -> TextureFormat {
        Device::backbuffer_format(self)
    }

    fn backbuffer_extent(&self) -> Extent2d {
        Device::backbuffer_extent(self)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{BackendKind, DeviceConfig};
    use crate::shader::InMemoryShaders;
    use crate::types::TextureUsage;

    #[test]
    fn test_device_as_factory() {
        let config = DeviceConfig::new()
            .with_backend(BackendKind::Dummy)
            .with_frames_in_flight(2)
            .with_size(32, 32);
        let device = Device::new(config, Arc::new(InMemoryShaders::placeholder()), None).unwrap();
        let factory: &dyn ResourceFactory = &device;

        assert_eq!(factory.frames_in_flight(), 2);
        assert_eq!(factory.backbuffer_extent(), Extent2d::new(32, 32));

        let target = factory
            .create_texture(
                &TextureDescriptor::new_2d(
                    32,
                    32,
                    TextureFormat::Rgba16Float,
                    TextureUsage::RenderTarget,
                ),
                None,
            )
            .unwrap();
        assert!(target.rtv().is_some());

        let buffer = factory
            .create_buffer(&BufferDescriptor::new(BufferUsage::StructuredBuffer, 64, 16), None)
            .unwrap();
        assert_eq!(buffer.element_count(), 4);

        let desc = factory
            .graphics_pipeline_descriptor("fullscreen_vs", "composite_ps")
            .unwrap();
        let pipeline = factory.create_graphics_pipeline(&desc).unwrap();
        assert_eq!(pipeline.kind(), crate::resources::PipelineKind::Graphics);
    }

    #[test]
    fn test_constant_buffers_per_slot() {
        let config = DeviceConfig::new()
            .with_backend(BackendKind::Dummy)
            .with_frames_in_flight(3);
        let device = Device::new(config, Arc::new(InMemoryShaders::placeholder()), None).unwrap();
        let buffers = create_constant_buffers(&device, "exposure", &[1.5f32, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(buffers.len(), 3);
        for buffer in &buffers {
            assert_eq!(buffer.size(), 256);
            assert_eq!(&buffer.read(0, 4).unwrap(), &1.5f32.to_le_bytes());
        }
        let cbvs: std::collections::HashSet<_> = buffers.iter().map(|b| b.cbv_index()).collect();
        assert_eq!(cbvs.len(), 3);
    }
}
