//! The fixed deferred pipeline, one module per pass.
//!
//! ```text
//! Geometry ─► SSAO ─► Shadow ─► Shading ─► Forward ─► Bloom ─► PostProcess ─► Composite ─► editor ─► Present
//!  GBuffer     AO     shadow     HDR        HDR        bloom      LDR          back buffer
//! ```
//!
//! Every pass owns its private targets and pipeline states, created once at
//! a resolution and recreated by [`RenderPass::resize`]. A pass documents
//! the states its inputs must be in when `render` is called and the states
//! it leaves them in.
//!
//! Barriers follow one rule: a pass queues its entry transitions, records
//! them with a single [`Context::execute_resource_barriers`] call and queues
//! (but does not record) its exit transitions. The exit transitions of one
//! pass and the entry transitions of the next therefore form one transition
//! point and one barrier call, and [`BarrierBatch`](crate::context::BarrierBatch)
//! folds a `ShaderResource -> RenderTarget -> ShaderResource` pair spanning
//! the two away entirely.
//!
//! Between frames every private target rests in `ShaderResource`.

mod bloom;
mod composite;
mod forward;
mod geometry;
mod post_process;
mod shading;
mod shadow;
mod ssao;

pub use bloom::{BLOOM_LEVELS, BloomPass};
pub use composite::{BackBufferTarget, CompositePass};
pub use forward::ForwardPass;
pub use geometry::{GBUFFER_FORMATS, GeometryPass};
pub use post_process::{LDR_FORMAT, PostProcessPass, PostProcessSettings};
pub use shading::{HDR_FORMAT, ShadingInputs, ShadingPass};
pub use shadow::{SHADOW_MAP_SIZE, ShadowPass};
pub use ssao::SsaoPass;

use crate::context::{Context, GraphicsContext};
use crate::error::GraphicsError;
use crate::factory::ResourceFactory;
use crate::resources::{PipelineState, Sampler, Texture};
use crate::types::{
    AddressMode, ClearColor, CullMode, DepthState, ResourceState, SamplerDescriptor,
    TextureDescriptor, TextureFormat, TextureUsage,
};

/// Depth format of the main depth buffer and the shadow map.
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Behavior shared by every pass.
pub trait RenderPass {
    fn name(&self) -> &'static str;

    /// Recreate resolution-dependent targets.
    ///
    /// Targets keep their descriptor slots, so descriptor indices captured
    /// before the resize stay valid.
    fn resize(
        &mut self,
        factory: &dyn ResourceFactory,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError>;
}

/// A color target that rests in `ShaderResource`.
pub(crate) fn create_target(
    factory: &dyn ResourceFactory,
    width: u32,
    height: u32,
    format: TextureFormat,
    label: &str,
) -> Result<Texture, GraphicsError> {
    factory.create_texture(
        &TextureDescriptor::new_2d(width, height, format, TextureUsage::RenderTarget)
            .with_label(label),
        None,
    )
}

/// A pipeline drawing a fullscreen triangle into `targets` without depth.
pub(crate) fn fullscreen_pipeline(
    factory: &dyn ResourceFactory,
    pixel_shader: &str,
    targets: &[TextureFormat],
    label: &str,
) -> Result<PipelineState, GraphicsError> {
    let desc = factory
        .graphics_pipeline_descriptor("fullscreen_vs", pixel_shader)?
        .with_label(label)
        .with_render_targets(targets)
        .with_depth(None, DepthState::DISABLED)
        .with_cull_mode(CullMode::None);
    factory.create_graphics_pipeline(&desc)
}

pub(crate) fn linear_clamp_sampler(
    factory: &dyn ResourceFactory,
    label: &str,
) -> Result<Sampler, GraphicsError> {
    factory.create_sampler(
        &SamplerDescriptor::linear()
            .with_address_mode(AddressMode::ClampToEdge)
            .with_label(label),
    )
}

pub(crate) fn transition(
    ctx: &mut GraphicsContext,
    texture: &Texture,
    before: ResourceState,
    after: ResourceState,
) {
    ctx.add_resource_barrier(texture.handle(), before, after);
}

/// Bind one color target, clear it and cover it with the viewport.
pub(crate) fn bind_color_target(
    ctx: &mut GraphicsContext,
    target: &Texture,
    clear: ClearColor,
) -> Result<(), GraphicsError> {
    let rtv = target.rtv().ok_or_else(|| {
        GraphicsError::Internal(format!("target {:?} has no RTV", target.label()))
    })?;
    ctx.set_render_targets(&[rtv], None);
    ctx.clear_render_target_view(rtv, clear);
    ctx.set_viewport_and_scissor(target.extent());
    Ok(())
}

pub(crate) fn uav(texture: &Texture, mip: u32) -> Result<u32, GraphicsError> {
    texture.mip_uav_index(mip).ok_or_else(|| {
        GraphicsError::Internal(format!("{:?} has no UAV for mip {mip}", texture.label()))
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::config::{BackendKind, DeviceConfig};
    use crate::device::Device;
    use crate::shader::InMemoryShaders;

    pub fn device(width: u32, height: u32) -> Device {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = DeviceConfig::new()
            .with_backend(BackendKind::Dummy)
            .with_frames_in_flight(2)
            .with_size(width, height);
        Device::new(config, Arc::new(InMemoryShaders::placeholder()), None)
            .expect("dummy device")
    }

    /// Submit the current graphics context and return the validation log.
    pub fn submit(device: &Device) -> Vec<String> {
        device.execute_graphics_context().expect("submit");
        device.direct_queue().flush().expect("flush");
        device
            .dummy_backend()
            .map(|backend| backend.validation_errors())
            .unwrap_or_default()
    }
}
