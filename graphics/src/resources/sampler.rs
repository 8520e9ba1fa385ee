//! Texture sampler.

use crate::types::SamplerDescriptor;

/// A sampler written into the sampler heap.
#[derive(Debug, Clone)]
pub struct Sampler {
    index: u32,
    descriptor: SamplerDescriptor,
}

impl Sampler {
    pub(crate) fn new(index: u32, descriptor: SamplerDescriptor) -> Self {
        Self { index, descriptor }
    }

    /// Index in the sampler heap.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn descriptor(&self) -> &SamplerDescriptor {
        &self.descriptor
    }
}
