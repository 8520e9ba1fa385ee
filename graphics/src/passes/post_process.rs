//! Tone mapping: HDR + AO + bloom into the LDR target.
//!
//! Entry: every input and the LDR target in `ShaderResource`. Exit: LDR
//! target back to `ShaderResource`, queued.

use bytemuck::{Pod, Zeroable};

use crate::context::{Context, GraphicsContext};
use crate::error::GraphicsError;
use crate::factory::{ResourceFactory, create_constant_buffers};
use crate::resources::{Buffer, PipelineState, Sampler, Texture};
use crate::types::{ClearColor, ResourceState, TextureFormat};

use super::{
    RenderPass, bind_color_target, create_target, fullscreen_pipeline, linear_clamp_sampler,
    transition,
};

/// Format of the tone-mapped image.
pub const LDR_FORMAT: TextureFormat = TextureFormat::Rgb10A2Unorm;

/// Tone mapping parameters, editable between frames.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PostProcessSettings {
    pub exposure: f32,
    pub gamma: f32,
    pub bloom_strength: f32,
    /// 0 disables ambient occlusion, 1 applies it fully.
    pub ao_strength: f32,
}

impl Default for PostProcessSettings {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            gamma: 2.2,
            bloom_strength: 0.04,
            ao_strength: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct PostProcessConstants {
    hdr_srv: u32,
    ao_srv: u32,
    bloom_srv: u32,
    settings_cbv: u32,
    sampler: u32,
    _pad: [u32; 3],
}

#[derive(Debug)]
pub struct PostProcessPass {
    target: Texture,
    pipeline: PipelineState,
    sampler: Sampler,
    settings_buffers: Vec<Buffer>,
    pub settings: PostProcessSettings,
}

impl PostProcessPass {
    pub fn new(
        factory: &dyn ResourceFactory,
        width: u32,
        height: u32,
    ) -> Result<Self, GraphicsError> {
        let settings = PostProcessSettings::default();
        Ok(Self {
            target: create_target(factory, width, height, LDR_FORMAT, "ldr")?,
            pipeline: fullscreen_pipeline(factory, "tonemap_ps", &[LDR_FORMAT], "tone mapping")?,
            sampler: linear_clamp_sampler(factory, "post process sampler")?,
            settings_buffers: create_constant_buffers(factory, "post process settings", &settings)?,
            settings,
        })
    }

    pub fn output(&self) -> &Texture {
        &self.target
    }

    /// Record tone mapping, writing the settings into `frame_slot`'s buffer.
    pub fn render(
        &self,
        ctx: &mut GraphicsContext,
        frame_slot: usize,
        hdr: &Texture,
        ambient_occlusion: &Texture,
        bloom: &Texture,
    ) -> Result<(), GraphicsError> {
        let settings_buffer = self.settings_buffers.get(frame_slot).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("frame slot {frame_slot} out of range"))
        })?;
        settings_buffer.update(0, bytemuck::bytes_of(&self.settings))?;
        let settings_cbv = settings_buffer.cbv_index().ok_or_else(|| {
            GraphicsError::Internal("post process settings have no CBV".to_string())
        })?;

        transition(
            ctx,
            &self.target,
            ResourceState::ShaderResource,
            ResourceState::RenderTarget,
        );
        ctx.execute_resource_barriers();

        bind_color_target(ctx, &self.target, ClearColor::BLACK)?;
        ctx.set_pipeline_state(&self.pipeline);
        ctx.set_graphics_constants(&PostProcessConstants {
            hdr_srv: hdr.srv_index(),
            ao_srv: ambient_occlusion.srv_index(),
            bloom_srv: bloom.srv_index(),
            settings_cbv,
            sampler: self.sampler.index(),
            _pad: [0; 3],
        })?;
        ctx.draw_fullscreen();

        transition(
            ctx,
            &self.target,
            ResourceState::RenderTarget,
            ResourceState::ShaderResource,
        );
        Ok(())
    }
}

impl RenderPass for PostProcessPass {
    fn name(&self) -> &'static str {
        "post process"
    }

    fn resize(
        &mut self,
        factory: &dyn ResourceFactory,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError> {
        factory.resize_texture(&mut self.target, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::test_support;

    #[test]
    fn test_settings_written_to_slot() {
        let device = test_support::device(16, 16);
        let mut pass = PostProcessPass::new(&device, 16, 16).unwrap();
        let input = create_target(&device, 16, 16, TextureFormat::Rgba16Float, "input").unwrap();
        pass.settings.exposure = 2.5;
        {
            let mut ctx = device.graphics_context();
            ctx.reset().unwrap();
            pass.render(&mut ctx, 1, &input, &input, &input).unwrap();
            assert!(pass.render(&mut ctx, 7, &input, &input, &input).is_err());
        }
        let written = pass.settings_buffers[1].read(0, 4).unwrap();
        assert_eq!(written, 2.5f32.to_le_bytes());
        let untouched = pass.settings_buffers[0].read(0, 4).unwrap();
        assert_eq!(untouched, 1.0f32.to_le_bytes());
    }
}
