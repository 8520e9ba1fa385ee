//! Screen-space ambient occlusion.
//!
//! Reads the depth buffer, so depth makes a round trip
//! `DepthWrite -> ShaderResource -> DepthWrite` around the pass.
//!
//! Entry: depth in `DepthWrite`, normals and the AO target in
//! `ShaderResource`. Exit: AO back to `ShaderResource` and depth back to
//! `DepthWrite`, both queued.

use bytemuck::{Pod, Zeroable};

use crate::context::{Context, GraphicsContext};
use crate::error::GraphicsError;
use crate::factory::ResourceFactory;
use crate::resources::{PipelineState, Sampler, Texture};
use crate::scene::RenderScene;
use crate::types::{ClearColor, ResourceState, TextureFormat};

use super::{
    RenderPass, bind_color_target, create_target, fullscreen_pipeline, linear_clamp_sampler,
    transition,
};

const AO_FORMAT: TextureFormat = TextureFormat::R8Unorm;

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct SsaoConstants {
    scene_cbv: u32,
    depth_srv: u32,
    normal_srv: u32,
    sampler: u32,
    radius: f32,
    bias: f32,
    sample_count: u32,
    _pad: u32,
}

#[derive(Debug)]
pub struct SsaoPass {
    target: Texture,
    pipeline: PipelineState,
    sampler: Sampler,
    /// Sampling hemisphere radius in world units.
    pub radius: f32,
    pub bias: f32,
    pub sample_count: u32,
}

impl SsaoPass {
    pub fn new(
        factory: &dyn ResourceFactory,
        width: u32,
        height: u32,
    ) -> Result<Self, GraphicsError> {
        Ok(Self {
            target: create_target(factory, width, height, AO_FORMAT, "ambient occlusion")?,
            pipeline: fullscreen_pipeline(factory, "ssao_ps", &[AO_FORMAT], "ssao")?,
            sampler: linear_clamp_sampler(factory, "ssao sampler")?,
            radius: 0.5,
            bias: 0.025,
            sample_count: 16,
        })
    }

    /// The occlusion target.
    pub fn output(&self) -> &Texture {
        &self.target
    }

    pub fn render(
        &self,
        scene: &dyn RenderScene,
        ctx: &mut GraphicsContext,
        depth: &Texture,
        normals: &Texture,
    ) -> Result<(), GraphicsError> {
        transition(
            ctx,
            depth,
            ResourceState::DepthWrite,
            ResourceState::ShaderResource,
        );
        transition(
            ctx,
            &self.target,
            ResourceState::ShaderResource,
            ResourceState::RenderTarget,
        );
        ctx.execute_resource_barriers();

        bind_color_target(ctx, &self.target, ClearColor::WHITE)?;
        ctx.set_pipeline_state(&self.pipeline);
        ctx.set_graphics_constants(&SsaoConstants {
            scene_cbv: scene.scene_constants_index()?,
            depth_srv: depth.srv_index(),
            normal_srv: normals.srv_index(),
            sampler: self.sampler.index(),
            radius: self.radius,
            bias: self.bias,
            sample_count: self.sample_count,
            _pad: 0,
        })?;
        ctx.draw_fullscreen();

        transition(
            ctx,
            &self.target,
            ResourceState::RenderTarget,
            ResourceState::ShaderResource,
        );
        transition(
            ctx,
            depth,
            ResourceState::ShaderResource,
            ResourceState::DepthWrite,
        );
        Ok(())
    }
}

impl RenderPass for SsaoPass {
    fn name(&self) -> &'static str {
        "ssao"
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
    use crate::passes::{DEPTH_FORMAT, test_support};
    use crate::scene::Scene;
    use crate::types::{TextureDescriptor, TextureUsage};

    #[test]
    fn test_depth_round_trip() {
        let mut device = test_support::device(32, 32);
        let depth = device
            .create_texture(
                &TextureDescriptor::new_2d(32, 32, DEPTH_FORMAT, TextureUsage::DepthStencil),
                None,
            )
            .unwrap();
        let normals = create_target(&device, 32, 32, TextureFormat::Rgba16Float, "normals").unwrap();
        let pass = SsaoPass::new(&device, 32, 32).unwrap();
        let mut scene = Scene::new(&device).unwrap();

        device.begin_frame().unwrap();
        scene.prepare(device.current_frame_index()).unwrap();
        {
            let mut ctx = device.graphics_context();
            pass.render(&scene, &mut ctx, &depth, &normals).unwrap();
            ctx.execute_resource_barriers();
        }
        assert!(test_support::submit(&device).is_empty());

        let backend = device.dummy_backend().unwrap();
        assert_eq!(
            backend.resource_state(depth.handle()),
            Some(ResourceState::DepthWrite)
        );
        assert_eq!(
            backend.resource_state(pass.output().handle()),
            Some(ResourceState::ShaderResource)
        );
    }
}
