//! Images and buffers backed by gpu-allocator memory.

use std::fmt;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, Extent2d, ResourceState, TextureFormat, TextureUsage};

use super::VulkanShared;
use super::conversion;

/// The raw object behind a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawHandle {
    Image {
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
    },
    Buffer(vk::Buffer),
}

/// Copyable identity of a Vulkan resource, used in barriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VulkanResourceHandle {
    pub id: u64,
    pub raw: RawHandle,
}

/// Shape of an image resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub extent: Extent2d,
    pub format: TextureFormat,
    pub mip_levels: u32,
    pub array_layers: u32,
}

/// A Vulkan image or buffer. Destroyed when dropped.
pub struct VulkanResource {
    handle: VulkanResourceHandle,
    label: String,
    image: Option<ImageInfo>,
    size: u64,
    allocation: Mutex<Option<Allocation>>,
    /// Swapchain images are owned by the swapchain.
    owned: bool,
    shared: Arc<VulkanShared>,
}

impl VulkanResource {
    pub(crate) fn new_texture(
        shared: &Arc<VulkanShared>,
        desc: &crate::types::TextureDescriptor,
    ) -> Result<Self, GraphicsError> {
        let label = desc.label.clone().unwrap_or_else(|| "texture".to_string());
        if desc.width == 0 || desc.height == 0 {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "texture {label} has an empty extent"
            )));
        }
        let format = conversion::texture_format(desc.format);
        let mut flags = vk::ImageCreateFlags::empty();
        if desc.is_cube() {
            flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
        }
        if desc.format.is_srgb() && desc.usage != TextureUsage::DepthStencil {
            // Written through a linear alias, which sRGB storage lacks.
            flags |= vk::ImageCreateFlags::MUTABLE_FORMAT | vk::ImageCreateFlags::EXTENDED_USAGE;
        }
        let (sharing_mode, families) = shared.sharing();
        let create_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(conversion::image_usage(desc.usage, desc.format))
            .sharing_mode(sharing_mode)
            .queue_family_indices(&families)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let device = &shared.device;
        let creation_error =
            |what: &str, e: String| GraphicsError::ResourceCreationFailed(format!("{label}: {what}: {e}"));

        // SAFETY: create_info is fully initialized.
        let image = unsafe { device.create_image(&create_info, None) }
            .map_err(|e| creation_error("create image", format!("{e:?}")))?;
        // SAFETY: image was just created on this device.
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let allocation = shared.with_allocator(|allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name: &label,
                    requirements,
                    location: gpu_allocator::MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| creation_error("allocate", e.to_string()))
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                // SAFETY: the image is unused.
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };
        // SAFETY: the allocation satisfies the image's requirements.
        unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) }
            .map_err(|e| creation_error("bind memory", format!("{e:?}")))?;

        let aspect = conversion::aspect_mask(desc.format);
        let resource = Self {
            handle: VulkanResourceHandle {
                id: shared.allocate_resource_id(),
                raw: RawHandle::Image { image, aspect },
            },
            label,
            image: Some(ImageInfo {
                extent: Extent2d::new(desc.width, desc.height),
                format: desc.format,
                mip_levels: desc.mip_levels,
                array_layers: desc.array_layers,
            }),
            size: requirements.size,
            allocation: Mutex::new(Some(allocation)),
            owned: true,
            shared: Arc::clone(shared),
        };
        resource.transition_from_undefined(desc.resolved_initial_state())?;
        Ok(resource)
    }

    pub(crate) fn new_buffer(
        shared: &Arc<VulkanShared>,
        desc: &BufferDescriptor,
    ) -> Result<Self, GraphicsError> {
        let label = desc.label.clone().unwrap_or_else(|| "buffer".to_string());
        if desc.size == 0 {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "buffer {label} has zero size"
            )));
        }
        let (sharing_mode, families) = shared.sharing();
        let create_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(conversion::buffer_usage(desc.usage))
            .sharing_mode(sharing_mode)
            .queue_family_indices(&families);

        let device = &shared.device;
        let creation_error =
            |what: &str, e: String| GraphicsError::ResourceCreationFailed(format!("{label}: {what}: {e}"));

        // SAFETY: create_info is fully initialized.
        let buffer = unsafe { device.create_buffer(&create_info, None) }
            .map_err(|e| creation_error("create buffer", format!("{e:?}")))?;
        // SAFETY: buffer was just created on this device.
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let allocation = shared.with_allocator(|allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name: &label,
                    requirements,
                    location: conversion::memory_location(desc.usage),
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| creation_error("allocate", e.to_string()))
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                // SAFETY: the buffer is unused.
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };
        // SAFETY: the allocation satisfies the buffer's requirements.
        unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) }
            .map_err(|e| creation_error("bind memory", format!("{e:?}")))?;

        Ok(Self {
            handle: VulkanResourceHandle {
                id: shared.allocate_resource_id(),
                raw: RawHandle::Buffer(buffer),
            },
            label,
            image: None,
            size: desc.size,
            allocation: Mutex::new(Some(allocation)),
            owned: true,
            shared: Arc::clone(shared),
        })
    }

    /// Wrap a swapchain image. The swapchain destroys it.
    pub(crate) fn from_swapchain_image(
        shared: &Arc<VulkanShared>,
        image: vk::Image,
        index: usize,
        info: ImageInfo,
    ) -> Self {
        Self {
            handle: VulkanResourceHandle {
                id: shared.allocate_resource_id(),
                raw: RawHandle::Image {
                    image,
                    aspect: vk::ImageAspectFlags::COLOR,
                },
            },
            label: format!("back buffer {index}"),
            image: Some(info),
            size: 0,
            allocation: Mutex::new(None),
            owned: false,
            shared: Arc::clone(shared),
        }
    }

    /// Move every subresource out of `UNDEFINED` into the layout of `state`.
    pub(crate) fn transition_from_undefined(
        &self,
        state: ResourceState,
    ) -> Result<(), GraphicsError> {
        let RawHandle::Image { image, aspect } = self.handle.raw else {
            return Ok(());
        };
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(conversion::image_layout(state))
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(conversion::access_mask(state))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .level_count(vk::REMAINING_MIP_LEVELS)
                    .layer_count(vk::REMAINING_ARRAY_LAYERS),
            );
        self.shared.immediate_submit(|device, cmd| {
            // SAFETY: cmd is recording and the image is alive.
            unsafe {
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::ALL_COMMANDS,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier],
                )
            }
        })
    }

    pub fn handle(&self) -> VulkanResourceHandle {
        self.handle
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn image_info(&self) -> Option<ImageInfo> {
        self.image
    }

    pub(crate) fn raw_image(&self) -> Option<(vk::Image, vk::ImageAspectFlags)> {
        match self.handle.raw {
            RawHandle::Image { image, aspect } => Some((image, aspect)),
            RawHandle::Buffer(_) => None,
        }
    }

    pub(crate) fn raw_buffer(&self) -> Option<vk::Buffer> {
        match self.handle.raw {
            RawHandle::Buffer(buffer) => Some(buffer),
            RawHandle::Image { .. } => None,
        }
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    fn checked_range(&self, offset: u64, size: u64) -> Result<std::ops::Range<usize>, GraphicsError> {
        match offset.checked_add(size).filter(|end| *end <= self.size) {
            Some(end) => Ok(offset as usize..end as usize),
            None => Err(GraphicsError::InvalidParameter(format!(
                "range {offset}+{size} out of bounds for {} ({} bytes)",
                self.label, self.size
            ))),
        }
    }

    pub(crate) fn write(&self, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        let range = self.checked_range(offset, data.len() as u64)?;
        let mut allocation = self.allocation.lock();
        let mapped = allocation
            .as_mut()
            .and_then(Allocation::mapped_slice_mut)
            .ok_or_else(|| {
                GraphicsError::InvalidParameter(format!("{} is not CPU visible", self.label))
            })?;
        mapped[range].copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn read(&self, offset: u64, size: u64) -> Result<Vec<u8>, GraphicsError> {
        let range = self.checked_range(offset, size)?;
        let allocation = self.allocation.lock();
        let mapped = allocation
            .as_ref()
            .and_then(Allocation::mapped_slice)
            .ok_or_else(|| {
                GraphicsError::InvalidParameter(format!("{} is not CPU visible", self.label))
            })?;
        Ok(mapped[range].to_vec())
    }
}

impl fmt::Debug for VulkanResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanResource")
            .field("id", &self.handle.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl Drop for VulkanResource {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        let device = &self.shared.device;
        // SAFETY: the device only drops resources after flushing the queues
        // that used them.
        unsafe {
            match self.handle.raw {
                RawHandle::Image { image, .. } => device.destroy_image(image, None),
                RawHandle::Buffer(buffer) => device.destroy_buffer(buffer, None),
            }
        }
        if let Some(allocation) = self.allocation.get_mut().take() {
            let freed = self
                .shared
                .with_allocator(|allocator| allocator.free(allocation).map_err(|e| {
                    GraphicsError::Internal(format!("free {}: {e}", self.label))
                }));
            if let Err(e) = freed {
                log::warn!("{e}");
            }
        }
    }
}
