//! Deferred geometry pass: fills the GBuffer and the main depth buffer.
//!
//! Entry: GBuffer targets in `ShaderResource`, depth in `DepthWrite`.
//! Exit: GBuffer transitions back to `ShaderResource` queued, depth stays in
//! `DepthWrite`.

use crate::context::{Context, GraphicsContext};
use crate::error::GraphicsError;
use crate::factory::ResourceFactory;
use crate::resources::{PipelineState, Sampler, Texture};
use crate::scene::{PassBindings, RenderScene};
use crate::types::{ClearColor, DepthState, ResourceState, TextureFormat};

use super::{DEPTH_FORMAT, RenderPass, create_target, linear_clamp_sampler, transition};

/// Albedo + metallic, world normal + roughness, world position + emissive.
pub const GBUFFER_FORMATS: [TextureFormat; 3] = [
    TextureFormat::Rgba8Unorm,
    TextureFormat::Rgba16Float,
    TextureFormat::Rgba16Float,
];

const GBUFFER_LABELS: [&str; 3] = ["gbuffer albedo", "gbuffer normal", "gbuffer position"];

#[derive(Debug)]
pub struct GeometryPass {
    gbuffer: [Texture; 3],
    pipeline: PipelineState,
    sampler: Sampler,
}

impl GeometryPass {
    pub fn new(
        factory: &dyn ResourceFactory,
        width: u32,
        height: u32,
    ) -> Result<Self, GraphicsError> {
        let gbuffer = [
            create_target(factory, width, height, GBUFFER_FORMATS[0], GBUFFER_LABELS[0])?,
            create_target(factory, width, height, GBUFFER_FORMATS[1], GBUFFER_LABELS[1])?,
            create_target(factory, width, height, GBUFFER_FORMATS[2], GBUFFER_LABELS[2])?,
        ];
        let desc = factory
            .graphics_pipeline_descriptor("gbuffer_vs", "gbuffer_ps")?
            .with_label("gbuffer")
            .with_render_targets(&GBUFFER_FORMATS)
            .with_depth(Some(DEPTH_FORMAT), DepthState::READ_WRITE);
        Ok(Self {
            gbuffer,
            pipeline: factory.create_graphics_pipeline(&desc)?,
            sampler: linear_clamp_sampler(factory, "gbuffer sampler")?,
        })
    }

    pub fn albedo(&self) -> &Texture {
        &self.gbuffer[0]
    }

    pub fn normals(&self) -> &Texture {
        &self.gbuffer[1]
    }

    pub fn positions(&self) -> &Texture {
        &self.gbuffer[2]
    }

    pub fn render(
        &self,
        scene: &dyn RenderScene,
        ctx: &mut GraphicsContext,
        depth: &Texture,
    ) -> Result<(), GraphicsError> {
        let mut rtvs = Vec::with_capacity(self.gbuffer.len());
        for target in &self.gbuffer {
            transition(
                ctx,
                target,
                ResourceState::ShaderResource,
                ResourceState::RenderTarget,
            );
            rtvs.push(target.rtv().ok_or_else(|| {
                GraphicsError::Internal(format!("{:?} has no RTV", target.label()))
            })?);
        }
        let dsv = depth.dsv().ok_or_else(|| {
            GraphicsError::Internal(format!("{:?} has no DSV", depth.label()))
        })?;
        ctx.execute_resource_barriers();

        ctx.set_render_targets(&rtvs, Some(dsv));
        for rtv in &rtvs {
            ctx.clear_render_target_view(*rtv, ClearColor::TRANSPARENT);
        }
        ctx.clear_depth_stencil_view(dsv, 1.0);
        ctx.set_viewport_and_scissor(depth.extent());
        ctx.set_pipeline_state(&self.pipeline);
        scene.render_models(
            ctx,
            &PassBindings {
                sampler: self.sampler.index(),
                pass_data: [0; 4],
            },
        )?;

        for target in &self.gbuffer {
            transition(
                ctx,
                target,
                ResourceState::RenderTarget,
                ResourceState::ShaderResource,
            );
        }
        Ok(())
    }
}

impl RenderPass for GeometryPass {
    fn name(&self) -> &'static str {
        "geometry"
    }

    fn resize(
        &mut self,
        factory: &dyn ResourceFactory,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError> {
        for target in &mut self.gbuffer {
            factory.resize_texture(target, width, height)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::test_support;
    use crate::scene::{MeshData, ModelDescriptor, Scene};
    use crate::types::{TextureDescriptor, TextureUsage};

    #[test]
    fn test_geometry_pass_leaves_gbuffer_readable() {
        let mut device = test_support::device(64, 64);
        let depth = device
            .create_texture(
                &TextureDescriptor::new_2d(64, 64, DEPTH_FORMAT, TextureUsage::DepthStencil),
                None,
            )
            .unwrap();
        let pass = GeometryPass::new(&device, 64, 64).unwrap();
        let mut scene = Scene::new(&device).unwrap();
        scene
            .add_model(&device, &ModelDescriptor::new("cube", MeshData::cube()))
            .unwrap();

        device.begin_frame().unwrap();
        scene.prepare(device.current_frame_index()).unwrap();
        {
            let mut ctx = device.graphics_context();
            pass.render(&scene, &mut ctx, &depth).unwrap();
            assert_eq!(ctx.pending_barriers(), 3);
            ctx.execute_resource_barriers();
        }
        assert!(test_support::submit(&device).is_empty());

        let backend = device.dummy_backend().unwrap();
        for target in [pass.albedo(), pass.normals(), pass.positions()] {
            assert_eq!(
                backend.resource_state(target.handle()),
                Some(ResourceState::ShaderResource)
            );
        }
        assert_eq!(
            backend.resource_state(depth.handle()),
            Some(ResourceState::DepthWrite)
        );
    }

    #[test]
    fn test_resize_keeps_descriptor_slots() {
        let device = test_support::device(64, 64);
        let mut pass = GeometryPass::new(&device, 64, 64).unwrap();
        let before: Vec<_> = pass.gbuffer.iter().map(|t| (t.srv_index(), t.rtv())).collect();
        let cursor = device.cbv_srv_uav_heap().current_descriptor_index();

        pass.resize(&device, 128, 32).unwrap();
        let after: Vec<_> = pass.gbuffer.iter().map(|t| (t.srv_index(), t.rtv())).collect();
        assert_eq!(before, after);
        assert_eq!(pass.albedo().width(), 128);
        assert_eq!(device.cbv_srv_uav_heap().current_descriptor_index(), cursor);
    }
}
