//! GPU resources.
//!
//! This module contains the resource types created by [`Device`]:
//! - [`Texture`] - GPU texture with its cached view indices
//! - [`Buffer`] - GPU memory buffer
//! - [`Sampler`] - Texture sampler
//! - [`PipelineState`] - Compiled graphics or compute pipeline
//!
//! Each resource exclusively owns its [`Allocation`](crate::memory::Allocation)
//! and is released when dropped. Descriptor slots are never reclaimed.
//!
//! [`Device`]: crate::Device

mod buffer;
mod pipeline;
mod sampler;
mod texture;

pub use buffer::Buffer;
pub use pipeline::{PipelineKind, PipelineState};
pub use sampler::Sampler;
pub use texture::Texture;

pub(crate) use texture::TextureViews;
