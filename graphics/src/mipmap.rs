//! Mip chain generation for textures created from data.
//!
//! Runs on the compute queue. The texture arrives in whatever state creation
//! left it (`Common` after a copy queue upload) and ends in `ShaderResource`,
//! the state every sampled texture rests in.

use bytemuck::{Pod, Zeroable};

use crate::backend::GpuBackend;
use crate::context::Context;
use crate::device::Device;
use crate::error::GraphicsError;
use crate::resources::{PipelineKind, PipelineState, Texture};
use crate::shader::ShaderSource;
use crate::types::{ComputePipelineDescriptor, ResourceState};

/// Compute thread group edge of the downsample shader.
const GROUP_SIZE: u32 = 8;

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct MipConstants {
    source_uav: u32,
    dest_uav: u32,
    array_layers: u32,
    _pad: u32,
    texel_size: [f32; 2],
}

/// Downsamples mip N into mip N+1 with a box filter.
#[derive(Debug)]
pub struct MipMapGenerator {
    pipeline: PipelineState,
}

impl MipMapGenerator {
    pub fn new(backend: &dyn GpuBackend, shaders: &dyn ShaderSource) -> Result<Self, GraphicsError> {
        let desc = ComputePipelineDescriptor::new(shaders.load("generate_mips_cs")?)
            .with_label("generate mips");
        let pipeline = backend.create_compute_pipeline(&desc)?;
        Ok(Self {
            pipeline: PipelineState::new(pipeline, PipelineKind::Compute, desc.label),
        })
    }

    /// Fill mips `1..n` of `texture` from mip 0 and move it from `current`
    /// to `ShaderResource`.
    ///
    /// Single-mip textures only get the transition.
    pub fn generate(
        &self,
        device: &Device,
        texture: &Texture,
        current: ResourceState,
    ) -> Result<(), GraphicsError> {
        let mut ctx = device.get_compute_context()?;
        let handle = texture.handle();
        let mips = texture.mip_levels();

        if mips <= 1 {
            ctx.add_resource_barrier(handle, current, ResourceState::ShaderResource);
            ctx.execute_resource_barriers();
            return device.execute_and_flush_compute_context(ctx);
        }

        if texture.mip_uav_index(mips - 1).is_none() {
            return Err(GraphicsError::Unsupported(format!(
                "texture {:?} ({:?}) has no per-mip UAVs for mip generation",
                texture.label(),
                texture.format()
            )));
        }

        ctx.add_resource_barrier(handle, current, ResourceState::UnorderedAccess);
        ctx.execute_resource_barriers();
        ctx.set_pipeline_state(&self.pipeline)?;

        let desc = texture.descriptor();
        for mip in 1..mips {
            let extent = desc.mip_extent(mip);
            let (Some(source_uav), Some(dest_uav)) =
                (texture.mip_uav_index(mip - 1), texture.mip_uav_index(mip))
            else {
                continue;
            };
            ctx.set_compute_constants(&MipConstants {
                source_uav,
                dest_uav,
                array_layers: desc.array_layers,
                _pad: 0,
                texel_size: [1.0 / extent.width as f32, 1.0 / extent.height as f32],
            })?;
            ctx.dispatch(
                extent.width.div_ceil(GROUP_SIZE),
                extent.height.div_ceil(GROUP_SIZE),
                desc.array_layers,
            );
        }

        ctx.add_resource_barrier(
            handle,
            ResourceState::UnorderedAccess,
            ResourceState::ShaderResource,
        );
        ctx.execute_resource_barriers();
        log::trace!("Generated {} mips for {:?}", mips - 1, texture.label());
        device.execute_and_flush_compute_context(ctx)
    }
}
