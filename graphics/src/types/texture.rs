//! Texture types and descriptors.

use super::{Extent2d, ResourceState};

/// Texture format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,
    /// 16-bit red channel, float.
    R16Float,
    /// 32-bit red channel, float.
    R32Float,
    /// 32-bit red channel, unsigned integer.
    R32Uint,
    /// 16-bit RG channels, float.
    Rg16Float,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 8-bit BGRA channels, unsigned normalized.
    Bgra8Unorm,
    /// 10-bit RGB, 2-bit alpha, unsigned normalized.
    Rgb10A2Unorm,
    /// 16-bit RGBA channels, float.
    Rgba16Float,
    /// 32-bit RGBA channels, float.
    Rgba32Float,
    /// 32-bit depth, float.
    Depth32Float,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
}

impl TextureFormat {
    /// Returns true if this is a depth or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(self, Self::Depth32Float | Self::Depth24PlusStencil8)
    }

    /// Returns true for sRGB-encoded formats.
    pub fn is_srgb(&self) -> bool {
        matches!(self, Self::Rgba8UnormSrgb)
    }

    /// Returns the size in bytes per pixel.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::R16Float => 2,
            Self::R32Float
            | Self::R32Uint
            | Self::Rg16Float
            | Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Bgra8Unorm
            | Self::Rgb10A2Unorm
            | Self::Depth32Float
            | Self::Depth24PlusStencil8 => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }

    /// Format used when the texture is read through a shader resource view.
    ///
    /// Depth textures are sampled through their color-compatible alias.
    pub fn srv_format(&self) -> TextureFormat {
        match self {
            Self::Depth32Float => Self::R32Float,
            other => *other,
        }
    }

    /// Format used for unordered access views, if the format allows them.
    ///
    /// sRGB textures are written through their linear alias.
    pub fn uav_format(&self) -> Option<TextureFormat> {
        match self {
            Self::Depth32Float | Self::Depth24PlusStencil8 => None,
            Self::Rgba8UnormSrgb => Some(Self::Rgba8Unorm),
            other => Some(*other),
        }
    }
}

/// What a texture is created for.
///
/// The usage decides which views [`Device::create_texture`](crate::Device::create_texture)
/// builds and the state the texture starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureUsage {
    /// Sampled texture filled from decoded image data; gets a mip chain.
    #[default]
    TextureFromData,
    /// Floating point texture filled from decoded HDR data; gets a mip chain.
    HdrTextureFromData,
    /// Depth buffer, readable as a shader resource.
    DepthStencil,
    /// Color render target, readable as a shader resource.
    RenderTarget,
    /// Compute-writable texture with one UAV per mip.
    UavTexture,
    /// Six-layer cube map, written by compute (e.g. environment maps).
    CubeMap,
}

impl TextureUsage {
    /// Whether the texture is filled from CPU data and then mip-mapped.
    pub fn is_from_data(self) -> bool {
        matches!(self, Self::TextureFromData | Self::HdrTextureFromData)
    }

    /// Whether the texture gets unordered access views.
    pub fn allows_unordered_access(self) -> bool {
        !matches!(self, Self::DepthStencil)
    }

    /// State a freshly created texture is placed in.
    pub fn initial_state(self) -> ResourceState {
        match self {
            Self::TextureFromData | Self::HdrTextureFromData => ResourceState::Common,
            Self::DepthStencil => ResourceState::DepthWrite,
            Self::RenderTarget | Self::UavTexture | Self::CubeMap => {
                ResourceState::ShaderResource
            }
        }
    }
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// What the texture is created for.
    pub usage: TextureUsage,
    /// Size of mip 0.
    pub width: u32,
    pub height: u32,
    /// Array layer count (6 for cube maps).
    pub array_layers: u32,
    /// Mip level count.
    pub mip_levels: u32,
    /// Texture format.
    pub format: TextureFormat,
    /// Overrides the usage's default initial state.
    pub initial_state: Option<ResourceState>,
    /// Per-mip descriptor slots reserved up front, so a resize that grows
    /// the chain up to this many mips keeps its slots.
    pub reserved_mip_levels: Option<u32>,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor with a single mip.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            usage,
            width,
            height,
            array_layers: 1,
            mip_levels: 1,
            format,
            initial_state: None,
            reserved_mip_levels: None,
        }
    }

    /// Create a cube map descriptor with the full mip chain.
    pub fn new_cube(size: u32, format: TextureFormat) -> Self {
        Self {
            array_layers: 6,
            mip_levels: Self::full_mip_chain(size, size),
            ..Self::new_2d(size, size, format, TextureUsage::CubeMap)
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_levels = count.max(1);
        self
    }

    /// Use the full mip chain down to 1x1.
    pub fn with_full_mip_chain(mut self) -> Self {
        self.mip_levels = Self::full_mip_chain(self.width, self.height);
        self
    }

    /// Reserve per-mip views for up to `count` mips.
    ///
    /// The chain then follows the texture size on resize, capped at `count`.
    pub fn with_reserved_mip_levels(mut self, count: u32) -> Self {
        self.reserved_mip_levels = Some(count.max(1));
        self
    }

    /// Mips the texture asks for, regardless of its current size.
    pub fn requested_mip_levels(&self) -> u32 {
        self.mip_levels.max(self.reserved_mip_levels.unwrap_or(0))
    }

    /// Override the initial resource state.
    pub fn with_initial_state(mut self, state: ResourceState) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Number of mips in a full chain for the given size.
    pub fn full_mip_chain(width: u32, height: u32) -> u32 {
        32 - width.max(height).max(1).leading_zeros()
    }

    /// Size of a given mip level, clamped to 1x1.
    pub fn mip_extent(&self, level: u32) -> Extent2d {
        Extent2d::new((self.width >> level).max(1), (self.height >> level).max(1))
    }

    /// Whether the texture is sampled as a cube.
    pub fn is_cube(&self) -> bool {
        self.array_layers == 6
    }

    /// State the texture is created in.
    pub fn resolved_initial_state(&self) -> ResourceState {
        self.initial_state
            .unwrap_or_else(|| self.usage.initial_state())
    }

    /// Size in bytes of tightly packed mip 0 data for all layers.
    pub fn mip0_size(&self) -> u64 {
        u64::from(self.width)
            * u64::from(self.height)
            * u64::from(self.array_layers)
            * u64::from(self.format.block_size())
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self::new_2d(1, 1, TextureFormat::default(), TextureUsage::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_mip_chain() {
        assert_eq!(TextureDescriptor::full_mip_chain(1, 1), 1);
        assert_eq!(TextureDescriptor::full_mip_chain(256, 256), 9);
        assert_eq!(TextureDescriptor::full_mip_chain(1920, 1080), 11);
        assert_eq!(TextureDescriptor::full_mip_chain(0, 0), 1);
    }

    #[test]
    fn test_mip_extent_clamps() {
        let desc = TextureDescriptor::new_2d(8, 2, TextureFormat::Rgba8Unorm, TextureUsage::UavTexture)
            .with_full_mip_chain();
        assert_eq!(desc.mip_levels, 4);
        assert_eq!(desc.mip_extent(1), Extent2d::new(4, 1));
        assert_eq!(desc.mip_extent(3), Extent2d::new(1, 1));
    }

    #[test]
    fn test_depth_srv_alias() {
        assert_eq!(TextureFormat::Depth32Float.srv_format(), TextureFormat::R32Float);
        assert_eq!(TextureFormat::Rgba16Float.srv_format(), TextureFormat::Rgba16Float);
        assert_eq!(TextureFormat::Depth32Float.uav_format(), None);
        assert_eq!(
            TextureFormat::Rgba8UnormSrgb.uav_format(),
            Some(TextureFormat::Rgba8Unorm)
        );
    }

    #[test]
    fn test_initial_states() {
        assert_eq!(TextureUsage::DepthStencil.initial_state(), ResourceState::DepthWrite);
        assert_eq!(TextureUsage::RenderTarget.initial_state(), ResourceState::ShaderResource);
        let desc = TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUsage::RenderTarget)
            .with_initial_state(ResourceState::CopySource);
        assert_eq!(desc.resolved_initial_state(), ResourceState::CopySource);
    }

    #[test]
    fn test_cube_descriptor() {
        let desc = TextureDescriptor::new_cube(64, TextureFormat::Rgba16Float);
        assert!(desc.is_cube());
        assert_eq!(desc.mip_levels, 7);
        assert_eq!(desc.mip0_size(), 64 * 64 * 6 * 8);
    }
}
