//! # Solstice Graphics
//!
//! Rendering core of the Solstice engine: an explicit GPU device with fenced
//! command queues, bump-allocated descriptor heaps, pooled recording
//! contexts, and a fixed deferred pass pipeline.
//!
//! ## Overview
//!
//! - [`Device`] - owns queues, heaps, allocator and swapchain; runs the frame loop
//! - [`CommandQueue`] - one hardware queue plus a monotonic fence
//! - [`DescriptorHeap`] - fixed-capacity, append-only descriptor slots
//! - [`context`] - graphics, compute and copy recording contexts
//! - [`passes`] - geometry, SSAO, shadow, shading, forward, bloom, post process, composite
//! - [`scene`] - models, lights and camera consumed by the passes
//! - [`FrameRenderer`] - records the passes in their fixed order
//! - [`backend`] - the dummy backend (validation and tests) and, with the
//!   `vulkan-backend` feature, a Vulkan backend
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use solstice_graphics::{
//!     BackendKind, Device, DeviceConfig, FrameRenderer, InMemoryShaders, Scene,
//! };
//!
//! # fn main() -> Result<(), solstice_graphics::GraphicsError> {
//! let config = DeviceConfig::new().with_backend(BackendKind::Dummy);
//! let mut device = Device::new(config, Arc::new(InMemoryShaders::placeholder()), None)?;
//! let mut scene = Scene::new(&device)?;
//! let mut renderer = FrameRenderer::new(&device)?;
//! for _ in 0..3 {
//!     renderer.render_frame(&mut device, &mut scene, None, 1.0 / 60.0)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod assets;
pub mod backend;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod editor;
pub mod error;
pub mod factory;
pub mod memory;
pub mod mipmap;
pub mod passes;
pub mod profiling;
pub mod queue;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod types;

pub use adapter::{AdapterInfo, AdapterType};
pub use backend::dummy::{DummyBackend, DummyOptions};
pub use backend::{BackendCapabilities, BindingTier, GpuBackend, QueueKind};
pub use config::{BackendKind, DeviceConfig, HeapCapacities};
pub use context::{ComputeContext, Context, CopyContext, GraphicsContext};
pub use descriptor::{CpuDescriptorHandle, DescriptorHandle, DescriptorHeap};
pub use device::Device;
pub use editor::{EditorOverlay, FrameView};
pub use error::GraphicsError;
pub use factory::ResourceFactory;
pub use queue::CommandQueue;
pub use renderer::FrameRenderer;
pub use resources::{Buffer, PipelineKind, PipelineState, Sampler, Texture};
pub use scene::{InputState, RenderScene, Scene};
pub use shader::{InMemoryShaders, ShaderDirectory, ShaderSource};
pub use types::{
    BufferDescriptor, BufferUsage, Extent2d, ResourceState, SamplerDescriptor,
    TextureDescriptor, TextureFormat, TextureUsage,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static_assertions::assert_impl_all!(Device: Send, Sync);
static_assertions::assert_impl_all!(Texture: Send, Sync);
static_assertions::assert_impl_all!(Buffer: Send, Sync);
static_assertions::assert_impl_all!(PipelineState: Send, Sync);
static_assertions::assert_impl_all!(Scene: Send, Sync);
static_assertions::assert_impl_all!(GraphicsContext: Send);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
