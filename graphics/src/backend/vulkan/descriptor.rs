//! Descriptor heaps.
//!
//! Shader-visible heaps are large descriptor sets indexed from shaders:
//!
//! | heap        | binding | descriptor type  | views                 |
//! |-------------|---------|------------------|-----------------------|
//! | CBV/SRV/UAV | 0       | `SAMPLED_IMAGE`  | shader resource views |
//! | CBV/SRV/UAV | 1       | `STORAGE_IMAGE`  | unordered access      |
//! | CBV/SRV/UAV | 2       | `STORAGE_BUFFER` | structured + constant |
//! | Sampler     | 0       | `SAMPLER`        | samplers              |
//!
//! A slot index is the same in every binding, so shaders index the binding
//! matching the view kind with the descriptor index they were given.
//!
//! RTV and DSV heaps are CPU-only tables of image views.

use std::fmt;
use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;

use crate::backend::GpuResource;
use crate::error::GraphicsError;
use crate::types::{
    DescriptorHeapType, Extent2d, SamplerDescriptor, ViewDescriptor, ViewDimension,
};

use super::VulkanShared;
use super::conversion;
use super::resource::{ImageInfo, VulkanResource};

const SAMPLED_IMAGE_BINDING: u32 = 0;
const STORAGE_IMAGE_BINDING: u32 = 1;
const STORAGE_BUFFER_BINDING: u32 = 2;
const SAMPLER_BINDING: u32 = 0;

/// An image view usable as a render target or depth attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentView {
    pub view: vk::ImageView,
    pub image: vk::Image,
    pub extent: Extent2d,
    pub aspect: vk::ImageAspectFlags,
}

pub(crate) type AttachmentSlots = Mutex<Vec<Option<AttachmentView>>>;

/// Object owned by a slot, destroyed when the slot is overwritten.
#[derive(Debug, Clone, Copy)]
enum SlotObject {
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
}

enum HeapStorage {
    Bindless {
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        set: vk::DescriptorSet,
    },
    Attachments(Arc<AttachmentSlots>),
}

pub struct VulkanDescriptorHeap {
    id: u32,
    heap_type: DescriptorHeapType,
    capacity: u32,
    storage: HeapStorage,
    objects: Mutex<Vec<Option<SlotObject>>>,
    shared: Arc<VulkanShared>,
}

fn heap_error(e: vk::Result) -> GraphicsError {
    GraphicsError::ResourceCreationFailed(format!("descriptor heap: {e:?}"))
}

fn bindless_types(heap_type: DescriptorHeapType) -> &'static [(u32, vk::DescriptorType)] {
    match heap_type {
        DescriptorHeapType::Sampler => &[(SAMPLER_BINDING, vk::DescriptorType::SAMPLER)],
        _ => &[
            (SAMPLED_IMAGE_BINDING, vk::DescriptorType::SAMPLED_IMAGE),
            (STORAGE_IMAGE_BINDING, vk::DescriptorType::STORAGE_IMAGE),
            (STORAGE_BUFFER_BINDING, vk::DescriptorType::STORAGE_BUFFER),
        ],
    }
}

impl VulkanDescriptorHeap {
    pub(crate) fn new(
        shared: Arc<VulkanShared>,
        id: u32,
        heap_type: DescriptorHeapType,
        capacity: u32,
        update_after_bind: bool,
    ) -> Result<Self, GraphicsError> {
        if capacity == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "{heap_type:?} heap needs at least one slot"
            )));
        }
        let storage = if heap_type.is_shader_visible() {
            Self::create_bindless(&shared, heap_type, capacity, update_after_bind)?
        } else {
            let slots = Arc::new(Mutex::new(vec![None; capacity as usize]));
            shared.attachments.write().insert(id, Arc::clone(&slots));
            HeapStorage::Attachments(slots)
        };
        if let HeapStorage::Bindless { layout, set, .. } = storage {
            shared.register_bindless(heap_type, layout, set);
        }
        log::trace!("Vulkan: created {heap_type:?} heap {id} ({capacity} slots)");
        Ok(Self {
            id,
            heap_type,
            capacity,
            storage,
            objects: Mutex::new(vec![None; capacity as usize]),
            shared,
        })
    }

    fn create_bindless(
        shared: &VulkanShared,
        heap_type: DescriptorHeapType,
        capacity: u32,
        update_after_bind: bool,
    ) -> Result<HeapStorage, GraphicsError> {
        let device = &shared.device;
        let types = bindless_types(heap_type);

        let mut binding_flag = vk::DescriptorBindingFlags::PARTIALLY_BOUND;
        let mut layout_flags = vk::DescriptorSetLayoutCreateFlags::empty();
        let mut pool_flags = vk::DescriptorPoolCreateFlags::empty();
        if update_after_bind {
            binding_flag |= vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
                | vk::DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING;
            layout_flags |= vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL;
            pool_flags |= vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND;
        }

        let bindings: Vec<vk::DescriptorSetLayoutBinding<'_>> = types
            .iter()
            .map(|(binding, ty)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(*binding)
                    .descriptor_type(*ty)
                    .descriptor_count(capacity)
                    .stage_flags(vk::ShaderStageFlags::ALL)
            })
            .collect();
        let binding_flags = vec![binding_flag; bindings.len()];
        let mut flags_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .flags(layout_flags)
            .bindings(&bindings)
            .push_next(&mut flags_info);
        // SAFETY: layout_info and its chain outlive the call.
        let layout =
            unsafe { device.create_descriptor_set_layout(&layout_info, None) }.map_err(heap_error)?;

        let pool_sizes: Vec<vk::DescriptorPoolSize> = types
            .iter()
            .map(|(_, ty)| vk::DescriptorPoolSize {
                ty: *ty,
                descriptor_count: capacity,
            })
            .collect();
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .flags(pool_flags)
            .max_sets(1)
            .pool_sizes(&pool_sizes);
        // SAFETY: pool_info outlives the call.
        let pool = match unsafe { device.create_descriptor_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                // SAFETY: the layout is unused.
                unsafe { device.destroy_descriptor_set_layout(layout, None) };
                return Err(heap_error(e));
            }
        };

        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        // SAFETY: the pool has room for exactly this set.
        let set = match unsafe { device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => sets[0],
            Err(e) => {
                // SAFETY: neither object is in use.
                unsafe {
                    device.destroy_descriptor_pool(pool, None);
                    device.destroy_descriptor_set_layout(layout, None);
                }
                return Err(heap_error(e));
            }
        };
        Ok(HeapStorage::Bindless { pool, layout, set })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    fn check_slot(&self, index: u32, heap_type: DescriptorHeapType) -> Result<(), GraphicsError> {
        if index >= self.capacity {
            return Err(GraphicsError::InvalidParameter(format!(
                "descriptor index {index} out of range for {:?} heap of {}",
                self.heap_type, self.capacity
            )));
        }
        if heap_type != self.heap_type {
            return Err(GraphicsError::InvalidParameter(format!(
                "{heap_type:?} descriptor written into {:?} heap",
                self.heap_type
            )));
        }
        Ok(())
    }

    /// Store `object` in slot `index`, destroying what the slot owned before.
    fn replace_object(&self, index: u32, object: Option<SlotObject>) {
        let old = std::mem::replace(&mut self.objects.lock()[index as usize], object);
        if let Some(old) = old {
            self.destroy_object(old);
        }
    }

    fn destroy_object(&self, object: SlotObject) {
        let device = &self.shared.device;
        // SAFETY: slots are only overwritten once the work using them has
        // completed.
        unsafe {
            match object {
                SlotObject::ImageView(view) => device.destroy_image_view(view, None),
                SlotObject::Sampler(sampler) => device.destroy_sampler(sampler, None),
            }
        }
    }

    fn create_view(
        &self,
        image: vk::Image,
        view_type: vk::ImageViewType,
        format: vk::Format,
        range: vk::ImageSubresourceRange,
    ) -> Result<vk::ImageView, GraphicsError> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(view_type)
            .format(format)
            .subresource_range(range);
        // SAFETY: the image is alive and the range lies within it.
        unsafe { self.shared.device.create_image_view(&create_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("image view: {e:?}"))
        })
    }

    fn bindless_set(&self) -> Result<vk::DescriptorSet, GraphicsError> {
        match self.storage {
            HeapStorage::Bindless { set, .. } => Ok(set),
            HeapStorage::Attachments(_) => Err(GraphicsError::Internal(format!(
                "{:?} heap is not shader visible",
                self.heap_type
            ))),
        }
    }

    fn write_image_descriptor(
        &self,
        index: u32,
        binding: u32,
        ty: vk::DescriptorType,
        view: vk::ImageView,
        layout: vk::ImageLayout,
    ) -> Result<(), GraphicsError> {
        let image_info = [vk::DescriptorImageInfo::default()
            .image_view(view)
            .image_layout(layout)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.bindless_set()?)
            .dst_binding(binding)
            .dst_array_element(index)
            .descriptor_type(ty)
            .image_info(&image_info);
        // SAFETY: the set is alive and the element is within its binding.
        unsafe { self.shared.device.update_descriptor_sets(&[write], &[]) };
        Ok(())
    }

    pub(crate) fn write_view(
        &self,
        index: u32,
        resource: &GpuResource,
        view: &ViewDescriptor,
    ) -> Result<(), GraphicsError> {
        self.check_slot(index, view.heap_type())?;
        let GpuResource::Vulkan(resource) = resource else {
            return Err(GraphicsError::InvalidParameter(
                "resource belongs to another backend".to_string(),
            ));
        };

        match *view {
            ViewDescriptor::StructuredBuffer { .. } | ViewDescriptor::ConstantBuffer { .. } => {
                self.write_buffer_view(index, resource, view)
            }
            ViewDescriptor::Sampler => Err(GraphicsError::InvalidParameter(
                "samplers are written with write_sampler".to_string(),
            )),
            _ => self.write_image_view(index, resource, view),
        }
    }

    fn write_buffer_view(
        &self,
        index: u32,
        resource: &VulkanResource,
        view: &ViewDescriptor,
    ) -> Result<(), GraphicsError> {
        let buffer = resource.raw_buffer().ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("{} is not a buffer", resource.label()))
        })?;
        let range = match *view {
            ViewDescriptor::StructuredBuffer {
                stride,
                element_count,
            } => u64::from(stride) * u64::from(element_count),
            ViewDescriptor::ConstantBuffer { size } => size,
            _ => 0,
        };
        let range = if range == 0 || range > resource.size() {
            vk::WHOLE_SIZE
        } else {
            range
        };
        let buffer_info = [vk::DescriptorBufferInfo::default()
            .buffer(buffer)
            .offset(0)
            .range(range)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.bindless_set()?)
            .dst_binding(STORAGE_BUFFER_BINDING)
            .dst_array_element(index)
            .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
            .buffer_info(&buffer_info);
        // SAFETY: the set is alive and the element is within its binding.
        unsafe { self.shared.device.update_descriptor_sets(&[write], &[]) };
        self.replace_object(index, None);
        Ok(())
    }

    fn write_image_view(
        &self,
        index: u32,
        resource: &VulkanResource,
        view: &ViewDescriptor,
    ) -> Result<(), GraphicsError> {
        let (Some((image, aspect)), Some(info)) = (resource.raw_image(), resource.image_info())
        else {
            return Err(GraphicsError::InvalidParameter(format!(
                "{} is not a texture",
                resource.label()
            )));
        };
        let ImageInfo {
            extent,
            format: resource_format,
            array_layers,
            mip_levels,
        } = info;
        let layered_type = if array_layers > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        };

        match *view {
            ViewDescriptor::ShaderResource {
                format,
                dimension,
                most_detailed_mip,
                mip_count,
            } => {
                let layer_count = match dimension {
                    ViewDimension::Texture2d => 1,
                    ViewDimension::TextureCube => 6,
                    ViewDimension::Texture2dArray => array_layers,
                };
                // Depth-stencil images are sampled through their depth aspect.
                let aspect = if aspect.contains(vk::ImageAspectFlags::DEPTH) {
                    vk::ImageAspectFlags::DEPTH
                } else {
                    aspect
                };
                let range = vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(most_detailed_mip)
                    .level_count(mip_count.min(mip_levels - most_detailed_mip.min(mip_levels)))
                    .layer_count(layer_count);
                let image_view = self.create_view(
                    image,
                    conversion::view_type(dimension),
                    conversion::view_format(format, resource_format),
                    range,
                )?;
                self.write_image_descriptor(
                    index,
                    SAMPLED_IMAGE_BINDING,
                    vk::DescriptorType::SAMPLED_IMAGE,
                    image_view,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                )
                .inspect_err(|_| self.destroy_object(SlotObject::ImageView(image_view)))?;
                self.replace_object(index, Some(SlotObject::ImageView(image_view)));
            }
            ViewDescriptor::UnorderedAccess { format, mip_slice } => {
                let range = vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(mip_slice)
                    .level_count(1)
                    .layer_count(array_layers);
                let image_view = self.create_view(
                    image,
                    layered_type,
                    conversion::view_format(format, resource_format),
                    range,
                )?;
                self.write_image_descriptor(
                    index,
                    STORAGE_IMAGE_BINDING,
                    vk::DescriptorType::STORAGE_IMAGE,
                    image_view,
                    vk::ImageLayout::GENERAL,
                )
                .inspect_err(|_| self.destroy_object(SlotObject::ImageView(image_view)))?;
                self.replace_object(index, Some(SlotObject::ImageView(image_view)));
            }
            ViewDescriptor::RenderTarget { format, mip_slice } => {
                let range = vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(mip_slice)
                    .level_count(1)
                    .layer_count(1);
                let image_view = self.create_view(
                    image,
                    vk::ImageViewType::TYPE_2D,
                    conversion::view_format(format, resource_format),
                    range,
                )?;
                let extent = mip_extent(extent, mip_slice);
                self.store_attachment(index, image_view, image, extent, aspect)?;
            }
            ViewDescriptor::DepthStencil { format } => {
                let range = vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .level_count(1)
                    .layer_count(1);
                let image_view = self.create_view(
                    image,
                    vk::ImageViewType::TYPE_2D,
                    conversion::texture_format(format),
                    range,
                )?;
                self.store_attachment(index, image_view, image, extent, aspect)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn store_attachment(
        &self,
        index: u32,
        view: vk::ImageView,
        image: vk::Image,
        extent: Extent2d,
        aspect: vk::ImageAspectFlags,
    ) -> Result<(), GraphicsError> {
        let HeapStorage::Attachments(slots) = &self.storage else {
            self.destroy_object(SlotObject::ImageView(view));
            return Err(GraphicsError::Internal(
                "attachment view written into a shader-visible heap".to_string(),
            ));
        };
        slots.lock()[index as usize] = Some(AttachmentView {
            view,
            image,
            extent,
            aspect,
        });
        self.replace_object(index, Some(SlotObject::ImageView(view)));
        Ok(())
    }

    pub(crate) fn write_sampler(
        &self,
        index: u32,
        desc: &SamplerDescriptor,
    ) -> Result<(), GraphicsError> {
        self.check_slot(index, DescriptorHeapType::Sampler)?;
        let address_mode = conversion::address_mode(desc.address_mode);
        let anisotropy = desc.anisotropy_clamp > 1;
        let mut create_info = vk::SamplerCreateInfo::default()
            .mag_filter(conversion::filter(desc.mag_filter))
            .min_filter(conversion::filter(desc.min_filter))
            .mipmap_mode(conversion::mipmap_mode(desc.mipmap_filter))
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .min_lod(desc.lod_min_clamp)
            .max_lod(desc.lod_max_clamp)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(f32::from(desc.anisotropy_clamp.max(1)))
            .border_color(vk::BorderColor::FLOAT_TRANSPARENT_BLACK);
        if let Some(compare) = desc.compare {
            create_info = create_info
                .compare_enable(true)
                .compare_op(conversion::compare_op(compare));
        }
        // SAFETY: create_info is fully initialized.
        let sampler = unsafe { self.shared.device.create_sampler(&create_info, None) }.map_err(
            |e| GraphicsError::ResourceCreationFailed(format!("sampler: {e:?}")),
        )?;

        let image_info = [vk::DescriptorImageInfo::default().sampler(sampler)];
        let set = match self.bindless_set() {
            Ok(set) => set,
            Err(e) => {
                self.destroy_object(SlotObject::Sampler(sampler));
                return Err(e);
            }
        };
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(SAMPLER_BINDING)
            .dst_array_element(index)
            .descriptor_type(vk::DescriptorType::SAMPLER)
            .image_info(&image_info);
        // SAFETY: the set is alive and the element is within its binding.
        unsafe { self.shared.device.update_descriptor_sets(&[write], &[]) };
        self.replace_object(index, Some(SlotObject::Sampler(sampler)));
        Ok(())
    }
}

fn mip_extent(extent: Extent2d, level: u32) -> Extent2d {
    Extent2d::new((extent.width >> level).max(1), (extent.height >> level).max(1))
}

impl fmt::Debug for VulkanDescriptorHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanDescriptorHeap")
            .field("id", &self.id)
            .field("heap_type", &self.heap_type)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl Drop for VulkanDescriptorHeap {
    fn drop(&mut self) {
        let objects = std::mem::take(self.objects.get_mut());
        for object in objects.into_iter().flatten() {
            self.destroy_object(object);
        }
        match &self.storage {
            HeapStorage::Bindless { pool, layout, set } => {
                self.shared.unregister_bindless(*set);
                // SAFETY: heaps are dropped after the device is idle; the pool
                // frees its set.
                unsafe {
                    self.shared.device.destroy_descriptor_pool(*pool, None);
                    self.shared
                        .device
                        .destroy_descriptor_set_layout(*layout, None);
                }
            }
            HeapStorage::Attachments(_) => {
                self.shared.attachments.write().remove(&self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_heap_has_three_bindings() {
        let types = bindless_types(DescriptorHeapType::CbvSrvUav);
        assert_eq!(types.len(), 3);
        assert_eq!(types[2], (STORAGE_BUFFER_BINDING, vk::DescriptorType::STORAGE_BUFFER));
        assert_eq!(bindless_types(DescriptorHeapType::Sampler).len(), 1);
    }

    #[test]
    fn test_mip_extent_clamps_to_one() {
        assert_eq!(mip_extent(Extent2d::new(8, 2), 3), Extent2d::new(1, 1));
    }
}
