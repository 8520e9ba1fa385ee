//! Descriptor heap kinds and view descriptions.

use super::TextureFormat;

/// Kind of descriptor heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapType {
    /// Constant buffer, shader resource and unordered access views.
    CbvSrvUav,
    /// Render target views.
    Rtv,
    /// Depth stencil views.
    Dsv,
    /// Samplers.
    Sampler,
}

impl DescriptorHeapType {
    /// Shader-visible heaps expose GPU handles and are bound to command lists.
    pub fn is_shader_visible(self) -> bool {
        matches!(self, Self::CbvSrvUav | Self::Sampler)
    }
}

/// Shape of a shader resource view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewDimension {
    Texture2d,
    TextureCube,
    Texture2dArray,
}

/// A view written into a descriptor heap slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewDescriptor {
    /// Texture read in shaders, covering `mip_count` mips from `most_detailed_mip`.
    ShaderResource {
        format: TextureFormat,
        dimension: ViewDimension,
        most_detailed_mip: u32,
        mip_count: u32,
    },
    /// Texture written from compute shaders at a single mip.
    UnorderedAccess {
        format: TextureFormat,
        mip_slice: u32,
    },
    /// Color attachment at a single mip.
    RenderTarget { format: TextureFormat, mip_slice: u32 },
    /// Depth attachment.
    DepthStencil { format: TextureFormat },
    /// Structured buffer read in shaders.
    StructuredBuffer { stride: u32, element_count: u32 },
    /// Constant buffer.
    ConstantBuffer { size: u64 },
    /// Sampler state.
    Sampler,
}

impl ViewDescriptor {
    /// Heap the view must be written into.
    pub fn heap_type(&self) -> DescriptorHeapType {
        match self {
            Self::ShaderResource { .. }
            | Self::UnorderedAccess { .. }
            | Self::StructuredBuffer { .. }
            | Self::ConstantBuffer { .. } => DescriptorHeapType::CbvSrvUav,
            Self::RenderTarget { .. } => DescriptorHeapType::Rtv,
            Self::DepthStencil { .. } => DescriptorHeapType::Dsv,
            Self::Sampler => DescriptorHeapType::Sampler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_heap_types() {
        let rtv = ViewDescriptor::RenderTarget {
            format: TextureFormat::Rgba8Unorm,
            mip_slice: 0,
        };
        assert_eq!(rtv.heap_type(), DescriptorHeapType::Rtv);
        assert_eq!(
            ViewDescriptor::ConstantBuffer { size: 256 }.heap_type(),
            DescriptorHeapType::CbvSrvUav
        );
        assert!(DescriptorHeapType::Sampler.is_shader_visible());
        assert!(!DescriptorHeapType::Dsv.is_shader_visible());
    }
}
