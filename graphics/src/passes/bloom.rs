//! Bloom: a compute downsample/upsample chain over a half-resolution mip
//! pyramid, dispatched on the graphics context.
//!
//! ```text
//! HDR ─down─► mip0 ─down─► mip1 ─down─► ... ─► mipN
//!              ▲            ▲                    │
//!              └────up──────┴────────up──────────┘
//! ```
//!
//! The pyramid stays in `UnorderedAccess` for the whole chain and every
//! step reads the previous mip through its UAV.
//!
//! Entry: HDR target and bloom texture in `ShaderResource`. Exit: bloom
//! texture back to `ShaderResource`, queued. The HDR target is only read.

use bytemuck::{Pod, Zeroable};

use crate::context::{Context, GraphicsContext};
use crate::error::GraphicsError;
use crate::factory::ResourceFactory;
use crate::resources::{PipelineState, Sampler, Texture};
use crate::types::{
    ComputePipelineDescriptor, ResourceState, TextureDescriptor, TextureUsage,
};

use super::{HDR_FORMAT, RenderPass, linear_clamp_sampler, transition, uav};

/// Depth of the bloom mip pyramid.
pub const BLOOM_LEVELS: u32 = 5;

const GROUP_SIZE: u32 = 8;

const SOURCE_SRV: u32 = 0;
const SOURCE_UAV: u32 = 1;

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct BloomConstants {
    source: u32,
    source_kind: u32,
    dest_uav: u32,
    sampler: u32,
    texel_size: [f32; 2],
    threshold: f32,
    filter_radius: f32,
}

#[derive(Debug)]
pub struct BloomPass {
    pyramid: Texture,
    downsample: PipelineState,
    upsample: PipelineState,
    sampler: Sampler,
    /// Luminance above which pixels contribute to bloom.
    pub threshold: f32,
    /// Upsample tent filter radius in texels.
    pub filter_radius: f32,
}

impl BloomPass {
    pub fn new(
        factory: &dyn ResourceFactory,
        width: u32,
        height: u32,
    ) -> Result<Self, GraphicsError> {
        let compute = |shader: &str, label: &str| -> Result<PipelineState, GraphicsError> {
            let desc = ComputePipelineDescriptor::new(factory.load_shader(shader)?).with_label(label);
            factory.create_compute_pipeline(&desc)
        };
        Ok(Self {
            pyramid: factory.create_texture(&Self::pyramid_descriptor(width, height), None)?,
            downsample: compute("bloom_downsample_cs", "bloom downsample")?,
            upsample: compute("bloom_upsample_cs", "bloom upsample")?,
            sampler: linear_clamp_sampler(factory, "bloom sampler")?,
            threshold: 1.0,
            filter_radius: 1.0,
        })
    }

    fn pyramid_descriptor(width: u32, height: u32) -> TextureDescriptor {
        let (width, height) = ((width / 2).max(1), (height / 2).max(1));
        TextureDescriptor::new_2d(width, height, HDR_FORMAT, TextureUsage::UavTexture)
            .with_label("bloom pyramid")
            .with_mip_levels(BLOOM_LEVELS.min(TextureDescriptor::full_mip_chain(width, height)))
            .with_reserved_mip_levels(BLOOM_LEVELS)
    }

    /// The blurred result; mip 0 holds the full bloom contribution.
    pub fn output(&self) -> &Texture {
        &self.pyramid
    }

    pub fn render(&self, ctx: &mut GraphicsContext, hdr: &Texture) -> Result<(), GraphicsError> {
        let levels = self.pyramid.mip_levels();
        let desc = self.pyramid.descriptor();

        transition(
            ctx,
            &self.pyramid,
            ResourceState::ShaderResource,
            ResourceState::UnorderedAccess,
        );
        ctx.execute_resource_barriers();

        ctx.set_pipeline_state(&self.downsample);
        for mip in 0..levels {
            let (source, source_kind) = if mip == 0 {
                (hdr.srv_index(), SOURCE_SRV)
            } else {
                (uav(&self.pyramid, mip - 1)?, SOURCE_UAV)
            };
            let extent = desc.mip_extent(mip);
            ctx.set_compute_constants(&BloomConstants {
                source,
                source_kind,
                dest_uav: uav(&self.pyramid, mip)?,
                sampler: self.sampler.index(),
                texel_size: [1.0 / extent.width as f32, 1.0 / extent.height as f32],
                threshold: if mip == 0 { self.threshold } else { 0.0 },
                filter_radius: self.filter_radius,
            })?;
            ctx.dispatch(
                extent.width.div_ceil(GROUP_SIZE),
                extent.height.div_ceil(GROUP_SIZE),
                1,
            );
        }

        ctx.set_pipeline_state(&self.upsample);
        for mip in (0..levels.saturating_sub(1)).rev() {
            let extent = desc.mip_extent(mip);
            ctx.set_compute_constants(&BloomConstants {
                source: uav(&self.pyramid, mip + 1)?,
                source_kind: SOURCE_UAV,
                dest_uav: uav(&self.pyramid, mip)?,
                sampler: self.sampler.index(),
                texel_size: [1.0 / extent.width as f32, 1.0 / extent.height as f32],
                threshold: 0.0,
                filter_radius: self.filter_radius,
            })?;
            ctx.dispatch(
                extent.width.div_ceil(GROUP_SIZE),
                extent.height.div_ceil(GROUP_SIZE),
                1,
            );
        }

        transition(
            ctx,
            &self.pyramid,
            ResourceState::UnorderedAccess,
            ResourceState::ShaderResource,
        );
        Ok(())
    }
}

impl RenderPass for BloomPass {
    fn name(&self) -> &'static str {
        "bloom"
    }

    fn resize(
        &mut self,
        factory: &dyn ResourceFactory,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError> {
        let target = Self::pyramid_descriptor(width, height);
        factory.resize_texture(&mut self.pyramid, target.width, target.height)?;
        debug_assert_eq!(self.pyramid.mip_levels(), target.mip_levels);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::{create_target, test_support};

    #[test]
    fn test_chain_dispatch_count() {
        let mut device = test_support::device(256, 256);
        let hdr = create_target(&device, 256, 256, HDR_FORMAT, "hdr").unwrap();
        let pass = BloomPass::new(&device, 256, 256).unwrap();
        assert_eq!(pass.output().mip_levels(), BLOOM_LEVELS);
        assert_eq!(pass.output().width(), 128);

        device.begin_frame().unwrap();
        {
            let mut ctx = device.graphics_context();
            pass.render(&mut ctx, &hdr).unwrap();
            ctx.execute_resource_barriers();
            let list = ctx.command_list().as_dummy().unwrap();
            assert_eq!(list.dispatch_count(), BLOOM_LEVELS * 2 - 1);
        }
        assert!(test_support::submit(&device).is_empty());
        assert_eq!(
            device
                .dummy_backend()
                .unwrap()
                .resource_state(pass.output().handle()),
            Some(ResourceState::ShaderResource)
        );
    }

    #[test]
    fn test_small_window_shortens_pyramid() {
        let device = test_support::device(64, 64);
        let mut pass = BloomPass::new(&device, 64, 64).unwrap();
        let srv = pass.output().srv_index();
        pass.resize(&device, 96, 96).unwrap();
        assert_eq!(pass.output().srv_index(), srv);
        assert_eq!(pass.output().width(), 48);

        pass.resize(&device, 8, 8).unwrap();
        assert_eq!(pass.output().mip_levels(), 3);
        assert_eq!(pass.output().srv_index(), srv);
    }

    #[test]
    fn test_resize_across_mip_boundary_keeps_slots() {
        let device = test_support::device(64, 64);
        let mut pass = BloomPass::new(&device, 8, 8).unwrap();
        assert_eq!(pass.output().mip_levels(), 3);
        let srv = pass.output().srv_index();
        let uavs: Vec<u32> = (0..3).map(|mip| pass.output().mip_uav_index(mip).unwrap()).collect();
        let cursor = device.cbv_srv_uav_heap().current_descriptor_index();

        for _ in 0..10 {
            pass.resize(&device, 64, 64).unwrap();
            assert_eq!(pass.output().mip_levels(), BLOOM_LEVELS);
            pass.resize(&device, 8, 8).unwrap();
            assert_eq!(pass.output().mip_levels(), 3);
        }

        assert_eq!(device.cbv_srv_uav_heap().current_descriptor_index(), cursor);
        assert_eq!(pass.output().srv_index(), srv);
        for (mip, uav) in uavs.iter().enumerate() {
            assert_eq!(pass.output().mip_uav_index(mip as u32), Some(*uav));
        }
    }
}
