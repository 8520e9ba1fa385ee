//! Common types and descriptors for graphics resources.
//!
//! This module contains format enums, resource states, usage kinds, and the
//! descriptor structs consumed by the [`Device`](crate::Device) factories.

mod buffer;
mod common;
mod pipeline;
mod sampler;
mod state;
mod texture;
mod view;

pub use buffer::{BufferDescriptor, BufferUsage, IndexFormat, MemoryLocation};
pub use common::{ClearColor, Extent2d, ScissorRect, Viewport};
pub use pipeline::{
    BlendMode, ComputePipelineDescriptor, CullMode, DepthState, GraphicsPipelineDescriptor,
    PrimitiveTopology, ShaderBinary,
};
pub use sampler::{AddressMode, CompareFunction, FilterMode, SamplerDescriptor};
pub use state::ResourceState;
pub use texture::{TextureDescriptor, TextureFormat, TextureUsage};
pub use view::{DescriptorHeapType, ViewDescriptor, ViewDimension};
