//! Forward pass: light proxies and the skybox, depth tested against the
//! GBuffer depth, drawn into the HDR target.
//!
//! Entry: HDR target in `RenderTarget` (left there by the shading pass),
//! depth in `DepthWrite`. Depth is only read here, so it moves to
//! `DepthRead` for the pass. Exit: HDR to `ShaderResource` and depth back
//! to `DepthWrite`, both queued.

use bytemuck::{Pod, Zeroable};

use crate::context::{Context, GraphicsContext};
use crate::error::GraphicsError;
use crate::factory::ResourceFactory;
use crate::resources::{PipelineState, Sampler, Texture};
use crate::scene::{PassBindings, RenderScene};
use crate::types::{BlendMode, CullMode, DepthState, ResourceState};

use super::{DEPTH_FORMAT, HDR_FORMAT, RenderPass, linear_clamp_sampler, transition};

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct SkyboxConstants {
    scene_cbv: u32,
    environment_srv: u32,
    sampler: u32,
    _pad: u32,
}

#[derive(Debug)]
pub struct ForwardPass {
    light_pipeline: PipelineState,
    skybox_pipeline: PipelineState,
    sampler: Sampler,
}

impl ForwardPass {
    pub fn new(factory: &dyn ResourceFactory) -> Result<Self, GraphicsError> {
        let light_desc = factory
            .graphics_pipeline_descriptor("light_proxy_vs", "light_proxy_ps")?
            .with_label("light proxies")
            .with_render_targets(&[HDR_FORMAT])
            .with_depth(Some(DEPTH_FORMAT), DepthState::READ_ONLY)
            .with_blend(BlendMode::Additive);
        // The skybox is drawn at the far plane, behind everything else.
        let skybox_desc = factory
            .graphics_pipeline_descriptor("skybox_vs", "skybox_ps")?
            .with_label("skybox")
            .with_render_targets(&[HDR_FORMAT])
            .with_depth(Some(DEPTH_FORMAT), DepthState::READ_ONLY)
            .with_cull_mode(CullMode::None);
        Ok(Self {
            light_pipeline: factory.create_graphics_pipeline(&light_desc)?,
            skybox_pipeline: factory.create_graphics_pipeline(&skybox_desc)?,
            sampler: linear_clamp_sampler(factory, "skybox sampler")?,
        })
    }

    pub fn render(
        &self,
        scene: &dyn RenderScene,
        ctx: &mut GraphicsContext,
        hdr: &Texture,
        depth: &Texture,
    ) -> Result<(), GraphicsError> {
        let (Some(rtv), Some(dsv)) = (hdr.rtv(), depth.dsv()) else {
            return Err(GraphicsError::Internal(
                "forward pass targets are missing views".to_string(),
            ));
        };
        transition(ctx, depth, ResourceState::DepthWrite, ResourceState::DepthRead);
        ctx.execute_resource_barriers();

        ctx.set_render_targets(&[rtv], Some(dsv));
        ctx.set_viewport_and_scissor(hdr.extent());

        ctx.set_pipeline_state(&self.light_pipeline);
        scene.render_lights(
            ctx,
            &PassBindings {
                sampler: self.sampler.index(),
                pass_data: [0; 4],
            },
        )?;

        if let Some(environment_srv) = scene.environment_srv() {
            ctx.set_pipeline_state(&self.skybox_pipeline);
            ctx.set_graphics_constants(&SkyboxConstants {
                scene_cbv: scene.scene_constants_index()?,
                environment_srv,
                sampler: self.sampler.index(),
                _pad: 0,
            })?;
            // Fullscreen triangle; the vertex shader places it on the far plane.
            ctx.draw_fullscreen();
        }

        transition(
            ctx,
            hdr,
            ResourceState::RenderTarget,
            ResourceState::ShaderResource,
        );
        transition(ctx, depth, ResourceState::DepthRead, ResourceState::DepthWrite);
        Ok(())
    }
}

impl RenderPass for ForwardPass {
    fn name(&self) -> &'static str {
        "forward"
    }

    fn resize(
        &mut self,
        _factory: &dyn ResourceFactory,
        _width: u32,
        _height: u32,
    ) -> Result<(), GraphicsError> {
        Ok(())
    }
}
