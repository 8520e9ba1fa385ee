//! Composite: draws the LDR image into the swapchain back buffer.
//!
//! Entry: back buffer in `Present`, LDR image in `ShaderResource`. The back
//! buffer is left in `RenderTarget` with its RTV bound, so the editor overlay
//! can draw on top; [`CompositePass::finish`] then returns it to `Present`.

use bytemuck::{Pod, Zeroable};

use crate::backend::GpuResource;
use crate::context::{Context, GraphicsContext};
use crate::descriptor::CpuDescriptorHandle;
use crate::error::GraphicsError;
use crate::factory::ResourceFactory;
use crate::resources::{PipelineState, Sampler, Texture};
use crate::types::{ClearColor, Extent2d, ResourceState};

use super::{RenderPass, fullscreen_pipeline, linear_clamp_sampler};

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct CompositeConstants {
    source_srv: u32,
    sampler: u32,
}

/// The swapchain image a frame ends in.
#[derive(Debug, Clone, Copy)]
pub struct BackBufferTarget<'a> {
    pub resource: &'a GpuResource,
    pub rtv: CpuDescriptorHandle,
    pub extent: Extent2d,
}

#[derive(Debug)]
pub struct CompositePass {
    pipeline: PipelineState,
    sampler: Sampler,
}

impl CompositePass {
    pub fn new(factory: &dyn ResourceFactory) -> Result<Self, GraphicsError> {
        Ok(Self {
            pipeline: fullscreen_pipeline(
                factory,
                "composite_ps",
                &[factory.backbuffer_format()],
                "composite",
            )?,
            sampler: linear_clamp_sampler(factory, "composite sampler")?,
        })
    }

    pub fn render(
        &self,
        ctx: &mut GraphicsContext,
        target: &BackBufferTarget<'_>,
        source: &Texture,
    ) -> Result<(), GraphicsError> {
        ctx.add_resource_barrier(
            target.resource.handle(),
            ResourceState::Present,
            ResourceState::RenderTarget,
        );
        ctx.execute_resource_barriers();

        ctx.set_render_targets(&[target.rtv], None);
        ctx.clear_render_target_view(target.rtv, ClearColor::BLACK);
        ctx.set_viewport_and_scissor(target.extent);
        ctx.set_pipeline_state(&self.pipeline);
        ctx.set_graphics_constants(&CompositeConstants {
            source_srv: source.srv_index(),
            sampler: self.sampler.index(),
        })?;
        ctx.draw_fullscreen();
        Ok(())
    }

    /// Return the back buffer to `Present` and record every pending barrier.
    pub fn finish(&self, ctx: &mut GraphicsContext, target: &BackBufferTarget<'_>) {
        ctx.add_resource_barrier(
            target.resource.handle(),
            ResourceState::RenderTarget,
            ResourceState::Present,
        );
        ctx.execute_resource_barriers();
    }
}

impl RenderPass for CompositePass {
    fn name(&self) -> &'static str {
        "composite"
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
