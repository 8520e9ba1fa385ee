//! Shadow map of the first directional light.
//!
//! The shadow map has a fixed resolution and is not affected by window
//! resizes. It rests in `ShaderResource` between frames, like every other
//! private target.
//!
//! Entry: shadow map in `ShaderResource`. Exit: transition back to
//! `ShaderResource` queued.

use crate::context::{Context, GraphicsContext};
use crate::error::GraphicsError;
use crate::factory::ResourceFactory;
use crate::resources::{PipelineState, Sampler, Texture};
use crate::scene::{PassBindings, RenderScene};
use crate::types::{
    AddressMode, CompareFunction, CullMode, DepthState, Extent2d, ResourceState,
    SamplerDescriptor, TextureDescriptor, TextureUsage,
};

use super::{DEPTH_FORMAT, RenderPass, transition};

pub const SHADOW_MAP_SIZE: u32 = 2048;

/// Tells the model shaders to transform with the light-space matrix.
const LIGHT_SPACE: u32 = 1;

#[derive(Debug)]
pub struct ShadowPass {
    shadow_map: Texture,
    pipeline: PipelineState,
    compare_sampler: Sampler,
}

impl ShadowPass {
    pub fn new(factory: &dyn ResourceFactory) -> Result<Self, GraphicsError> {
        let shadow_map = factory.create_texture(
            &TextureDescriptor::new_2d(
                SHADOW_MAP_SIZE,
                SHADOW_MAP_SIZE,
                DEPTH_FORMAT,
                TextureUsage::DepthStencil,
            )
            .with_label("shadow map")
            .with_initial_state(ResourceState::ShaderResource),
            None,
        )?;
        let desc = factory
            .graphics_pipeline_descriptor("gbuffer_vs", "shadow_ps")?
            .with_label("shadow")
            .with_render_targets(&[])
            .with_depth(Some(DEPTH_FORMAT), DepthState::READ_WRITE)
            .with_cull_mode(CullMode::Front);
        let compare_sampler = factory.create_sampler(
            &SamplerDescriptor::linear()
                .with_address_mode(AddressMode::ClampToBorder)
                .with_compare(CompareFunction::LessEqual)
                .with_label("shadow sampler"),
        )?;
        Ok(Self {
            shadow_map,
            pipeline: factory.create_graphics_pipeline(&desc)?,
            compare_sampler,
        })
    }

    pub fn shadow_map(&self) -> &Texture {
        &self.shadow_map
    }

    /// Comparison sampler for reading the shadow map.
    pub fn sampler(&self) -> &Sampler {
        &self.compare_sampler
    }

    pub fn render(
        &self,
        scene: &dyn RenderScene,
        ctx: &mut GraphicsContext,
    ) -> Result<(), GraphicsError> {
        let dsv = self.shadow_map.dsv().ok_or_else(|| {
            GraphicsError::Internal("shadow map has no DSV".to_string())
        })?;
        transition(
            ctx,
            &self.shadow_map,
            ResourceState::ShaderResource,
            ResourceState::DepthWrite,
        );
        ctx.execute_resource_barriers();

        ctx.set_render_targets(&[], Some(dsv));
        ctx.clear_depth_stencil_view(dsv, 1.0);
        ctx.set_viewport_and_scissor(Extent2d::new(SHADOW_MAP_SIZE, SHADOW_MAP_SIZE));
        ctx.set_pipeline_state(&self.pipeline);
        scene.render_models(
            ctx,
            &PassBindings {
                sampler: self.compare_sampler.index(),
                pass_data: [LIGHT_SPACE, 0, 0, 0],
            },
        )?;

        transition(
            ctx,
            &self.shadow_map,
            ResourceState::DepthWrite,
            ResourceState::ShaderResource,
        );
        Ok(())
    }
}

impl RenderPass for ShadowPass {
    fn name(&self) -> &'static str {
        "shadow"
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

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::passes::test_support;
    use crate::scene::{LightDescriptor, MeshData, ModelDescriptor, Scene};

    #[test]
    fn test_shadow_map_rests_in_shader_resource() {
        let mut device = test_support::device(32, 32);
        let mut pass = ShadowPass::new(&device).unwrap();
        let mut scene = Scene::new(&device).unwrap();
        scene
            .add_model(&device, &ModelDescriptor::new("floor", MeshData::cube()))
            .unwrap();
        scene
            .add_light(LightDescriptor::directional(
                Vec3::new(-1.0, -1.0, 0.0),
                Vec3::ONE,
                1.0,
            ))
            .unwrap();

        let backend = device.dummy_backend().unwrap();
        assert_eq!(
            backend.resource_state(pass.shadow_map().handle()),
            Some(ResourceState::ShaderResource)
        );

        device.begin_frame().unwrap();
        scene.prepare(device.current_frame_index()).unwrap();
        {
            let mut ctx = device.graphics_context();
            pass.render(&scene, &mut ctx).unwrap();
            ctx.execute_resource_barriers();
            assert_eq!(ctx.command_list().as_dummy().unwrap().draw_count(), 1);
        }
        assert!(test_support::submit(&device).is_empty());

        let backend = device.dummy_backend().unwrap();
        assert_eq!(
            backend.resource_state(pass.shadow_map().handle()),
            Some(ResourceState::ShaderResource)
        );

        pass.resize(&device, 640, 480).unwrap();
        assert_eq!(pass.shadow_map().width(), SHADOW_MAP_SIZE);
    }
}
