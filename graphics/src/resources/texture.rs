//! GPU texture resource.

use crate::backend::{GpuResource, GpuResourceHandle};
use crate::descriptor::CpuDescriptorHandle;
use crate::memory::Allocation;
use crate::types::{Extent2d, TextureDescriptor, TextureFormat, TextureUsage};

/// Descriptor indices of the views created for a texture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TextureViews {
    pub(crate) srv: u32,
    /// Mips the per-mip view slots are laid out for.
    pub(crate) mip_capacity: u32,
    /// One SRV per mip, for UAV textures with more than one mip.
    pub(crate) mip_srvs: Vec<u32>,
    /// One UAV per mip.
    pub(crate) uavs: Vec<u32>,
    pub(crate) rtv: Option<CpuDescriptorHandle>,
    pub(crate) dsv: Option<CpuDescriptorHandle>,
}

/// A GPU texture resource.
///
/// Textures are created by [`Device::create_texture`](crate::Device::create_texture)
/// and own their allocation. Shaders address them by descriptor index:
///
/// ```ignore
/// let albedo = device.create_texture(&desc, Some(&pixels))?;
/// constants.albedo = albedo.srv_index();
/// ```
#[derive(Debug)]
pub struct Texture {
    allocation: Allocation,
    descriptor: TextureDescriptor,
    views: TextureViews,
}

impl Texture {
    pub(crate) fn new(
        allocation: Allocation,
        descriptor: TextureDescriptor,
        views: TextureViews,
    ) -> Self {
        Self {
            allocation,
            descriptor,
            views,
        }
    }

    /// Swap in a new allocation and views, returning the old allocation.
    pub(crate) fn replace(
        &mut self,
        allocation: Allocation,
        descriptor: TextureDescriptor,
        views: TextureViews,
    ) -> Allocation {
        self.descriptor = descriptor;
        self.views = views;
        std::mem::replace(&mut self.allocation, allocation)
    }

    pub(crate) fn views(&self) -> &TextureViews {
        &self.views
    }

    /// Get the texture descriptor.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Get the texture label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    pub fn width(&self) -> u32 {
        self.descriptor.width
    }

    pub fn height(&self) -> u32 {
        self.descriptor.height
    }

    pub fn extent(&self) -> Extent2d {
        Extent2d::new(self.descriptor.width, self.descriptor.height)
    }

    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    pub fn usage(&self) -> TextureUsage {
        self.descriptor.usage
    }

    pub fn mip_levels(&self) -> u32 {
        self.descriptor.mip_levels
    }

    /// The native resource.
    pub fn resource(&self) -> &GpuResource {
        self.allocation.resource()
    }

    /// Identity used in barriers.
    pub fn handle(&self) -> GpuResourceHandle {
        self.allocation.handle()
    }

    /// Descriptor index of the SRV covering all mips.
    pub fn srv_index(&self) -> u32 {
        self.views.srv
    }

    /// SRV of a single mip. Falls back to the full SRV for single-mip textures.
    pub fn mip_srv_index(&self, mip: u32) -> Option<u32> {
        if self.views.mip_srvs.is_empty() && mip == 0 {
            return Some(self.views.srv);
        }
        self.views.mip_srvs.get(mip as usize).copied()
    }

    /// UAV of the first mip.
    pub fn uav_index(&self) -> Option<u32> {
        self.views.uavs.first().copied()
    }

    /// UAV of a given mip.
    pub fn mip_uav_index(&self, mip: u32) -> Option<u32> {
        self.views.uavs.get(mip as usize).copied()
    }

    pub fn rtv(&self) -> Option<CpuDescriptorHandle> {
        self.views.rtv
    }

    pub fn dsv(&self) -> Option<CpuDescriptorHandle> {
        self.views.dsv
    }

    /// Bytes accounted to this texture by the allocator.
    pub fn allocation_size(&self) -> u64 {
        self.allocation.size()
    }
}
