//! Deferred shading: GBuffer + AO + shadow map into the HDR target.
//!
//! Entry: every input in `ShaderResource`, the HDR target in
//! `ShaderResource`. Exit: the HDR target is left in `RenderTarget` for the
//! forward pass, which draws into the same target.

use bytemuck::{Pod, Zeroable};

use crate::context::{Context, GraphicsContext};
use crate::error::GraphicsError;
use crate::factory::ResourceFactory;
use crate::resources::{PipelineState, Sampler, Texture};
use crate::scene::{NO_TEXTURE, RenderScene};
use crate::types::{ClearColor, ResourceState, TextureFormat};

use super::{
    RenderPass, bind_color_target, fullscreen_pipeline, linear_clamp_sampler, transition,
};

/// Format of the lit scene before tone mapping.
pub const HDR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

/// Textures the shading pass reads.
#[derive(Debug, Clone, Copy)]
pub struct ShadingInputs<'a> {
    pub albedo: &'a Texture,
    pub normals: &'a Texture,
    pub positions: &'a Texture,
    pub ambient_occlusion: &'a Texture,
    pub shadow_map: &'a Texture,
    pub shadow_sampler: &'a Sampler,
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct ShadingConstants {
    scene_cbv: u32,
    albedo_srv: u32,
    normal_srv: u32,
    position_srv: u32,
    ao_srv: u32,
    shadow_srv: u32,
    environment_srv: u32,
    sampler: u32,
    shadow_sampler: u32,
    _pad: [u32; 3],
}

#[derive(Debug)]
pub struct ShadingPass {
    pipeline: PipelineState,
    sampler: Sampler,
}

impl ShadingPass {
    pub fn new(factory: &dyn ResourceFactory) -> Result<Self, GraphicsError> {
        Ok(Self {
            pipeline: fullscreen_pipeline(factory, "shading_ps", &[HDR_FORMAT], "shading")?,
            sampler: linear_clamp_sampler(factory, "shading sampler")?,
        })
    }

    pub fn render(
        &self,
        scene: &dyn RenderScene,
        ctx: &mut GraphicsContext,
        hdr: &Texture,
        inputs: &ShadingInputs<'_>,
    ) -> Result<(), GraphicsError> {
        transition(
            ctx,
            hdr,
            ResourceState::ShaderResource,
            ResourceState::RenderTarget,
        );
        ctx.execute_resource_barriers();

        bind_color_target(ctx, hdr, ClearColor::BLACK)?;
        ctx.set_pipeline_state(&self.pipeline);
        ctx.set_graphics_constants(&ShadingConstants {
            scene_cbv: scene.scene_constants_index()?,
            albedo_srv: inputs.albedo.srv_index(),
            normal_srv: inputs.normals.srv_index(),
            position_srv: inputs.positions.srv_index(),
            ao_srv: inputs.ambient_occlusion.srv_index(),
            shadow_srv: inputs.shadow_map.srv_index(),
            environment_srv: scene.environment_srv().unwrap_or(NO_TEXTURE),
            sampler: self.sampler.index(),
            shadow_sampler: inputs.shadow_sampler.index(),
            _pad: [0; 3],
        })?;
        ctx.draw_fullscreen();
        Ok(())
    }
}

impl RenderPass for ShadingPass {
    fn name(&self) -> &'static str {
        "shading"
    }

    /// Owns no resolution-dependent targets.
    fn resize(
        &mut self,
        _factory: &dyn ResourceFactory,
        _width: u32,
        _height: u32,
    ) -> Result<(), GraphicsError> {
        Ok(())
    }
}
