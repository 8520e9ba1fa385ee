//! Physical device selection and logical device creation.

use ash::vk;

use crate::adapter::{AdapterInfo, AdapterType, select_adapter};
use crate::backend::{BindingTier, QueueKind};
use crate::context::MAX_ROOT_CONSTANTS;
use crate::error::GraphicsError;

use super::instance::REQUIRED_API_VERSION;

/// Push constant bytes every pipeline layout reserves.
pub const PUSH_CONSTANT_BYTES: u32 = (MAX_ROOT_CONSTANTS * 4) as u32;

/// A physical device that meets the engine's requirements.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub physical_device: vk::PhysicalDevice,
    pub info: AdapterInfo,
}

/// Queue family index per engine queue kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub direct: u32,
    pub compute: u32,
    pub copy: u32,
}

impl QueueFamilies {
    pub fn family(&self, kind: QueueKind) -> u32 {
        match kind {
            QueueKind::Direct => self.direct,
            QueueKind::Compute => self.compute,
            QueueKind::Copy => self.copy,
        }
    }

    /// Distinct families, direct first.
    pub fn unique(&self) -> Vec<u32> {
        let mut families = vec![self.direct];
        for family in [self.compute, self.copy] {
            if !families.contains(&family) {
                families.push(family);
            }
        }
        families
    }
}

fn adapter_type(device_type: vk::PhysicalDeviceType) -> AdapterType {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => AdapterType::Discrete,
        vk::PhysicalDeviceType::INTEGRATED_GPU => AdapterType::Integrated,
        vk::PhysicalDeviceType::CPU => AdapterType::Software,
        _ => AdapterType::Unknown,
    }
}

/// Enumerate physical devices and pick one with [`select_adapter`].
pub fn select_physical_device(instance: &ash::Instance) -> Result<Candidate, GraphicsError> {
    // SAFETY: the instance is valid for the duration of the call.
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("failed to enumerate GPUs: {e:?}"))
    })?;

    let mut candidates = Vec::with_capacity(devices.len());
    for physical_device in devices {
        // SAFETY: physical_device was just enumerated from this instance.
        let (properties, memory) = unsafe {
            (
                instance.get_physical_device_properties(physical_device),
                instance.get_physical_device_memory_properties(physical_device),
            )
        };
        let name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unnamed GPU".to_string());

        if properties.api_version < REQUIRED_API_VERSION {
            log::debug!("Skipping {name}: Vulkan 1.3 not supported");
            continue;
        }
        if properties.limits.max_push_constants_size < PUSH_CONSTANT_BYTES {
            log::debug!(
                "Skipping {name}: {} push constant bytes",
                properties.limits.max_push_constants_size
            );
            continue;
        }

        let dedicated_video_memory = memory
            .memory_heaps_as_slice()
            .iter()
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum();
        candidates.push(Candidate {
            physical_device,
            info: AdapterInfo {
                name,
                vendor_id: properties.vendor_id,
                adapter_type: adapter_type(properties.device_type),
                dedicated_video_memory,
            },
        });
    }

    let infos: Vec<AdapterInfo> = candidates.iter().map(|c| c.info.clone()).collect();
    let index = select_adapter(&infos)?;
    Ok(candidates.swap_remove(index))
}

/// Prefer dedicated compute and transfer families, falling back to the
/// graphics family.
pub fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<QueueFamilies, GraphicsError> {
    // SAFETY: physical_device belongs to instance.
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
    let find = |required: vk::QueueFlags, excluded: vk::QueueFlags| {
        families
            .iter()
            .position(|f| f.queue_flags.contains(required) && !f.queue_flags.intersects(excluded))
            .map(|index| index as u32)
    };

    let direct = find(
        vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
        vk::QueueFlags::empty(),
    )
    .ok_or_else(|| {
        GraphicsError::InitializationFailed("no graphics queue family".to_string())
    })?;
    let compute = find(vk::QueueFlags::COMPUTE, vk::QueueFlags::GRAPHICS).unwrap_or(direct);
    let copy = find(
        vk::QueueFlags::TRANSFER,
        vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
    )
    .unwrap_or(compute);

    let families = QueueFamilies {
        direct,
        compute,
        copy,
    };
    log::debug!("Vulkan queue families: {families:?}");
    Ok(families)
}

/// Whether descriptors may be written while bound.
pub fn binding_tier(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> BindingTier {
    let mut indexing = vk::PhysicalDeviceDescriptorIndexingFeatures::default();
    let mut features = vk::PhysicalDeviceFeatures2::default().push_next(&mut indexing);
    // SAFETY: the feature chain lives on the stack for the call.
    unsafe { instance.get_physical_device_features2(physical_device, &mut features) };
    let update_after_bind = indexing.descriptor_binding_sampled_image_update_after_bind
        == vk::TRUE
        && indexing.descriptor_binding_storage_image_update_after_bind == vk::TRUE
        && indexing.descriptor_binding_storage_buffer_update_after_bind == vk::TRUE
        && indexing.descriptor_binding_uniform_buffer_update_after_bind == vk::TRUE;
    if update_after_bind {
        BindingTier::Tier1_1
    } else {
        BindingTier::Tier1_0
    }
}

pub fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    families: &QueueFamilies,
    tier: BindingTier,
) -> Result<ash::Device, GraphicsError> {
    let priorities = [1.0f32];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&priorities)
        })
        .collect();

    let extensions = [ash::khr::swapchain::NAME.as_ptr()];
    let features = vk::PhysicalDeviceFeatures::default()
        .sampler_anisotropy(true)
        .shader_storage_image_write_without_format(true);

    let update_after_bind = tier >= BindingTier::Tier1_1;
    let mut vulkan_12 = vk::PhysicalDeviceVulkan12Features::default()
        .timeline_semaphore(true)
        .descriptor_indexing(true)
        .runtime_descriptor_array(true)
        .descriptor_binding_partially_bound(true)
        .shader_sampled_image_array_non_uniform_indexing(true)
        .shader_storage_image_array_non_uniform_indexing(true)
        .shader_storage_buffer_array_non_uniform_indexing(true)
        .descriptor_binding_sampled_image_update_after_bind(update_after_bind)
        .descriptor_binding_storage_image_update_after_bind(update_after_bind)
        .descriptor_binding_storage_buffer_update_after_bind(update_after_bind)
        .descriptor_binding_uniform_buffer_update_after_bind(update_after_bind);
    let mut vulkan_13 = vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&extensions)
        .enabled_features(&features)
        .push_next(&mut vulkan_12)
        .push_next(&mut vulkan_13);

    // SAFETY: create_info and its chain outlive the call.
    unsafe { instance.create_device(physical_device, &create_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("failed to create logical device: {e:?}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_families_keep_direct_first() {
        let families = QueueFamilies {
            direct: 0,
            compute: 2,
            copy: 0,
        };
        assert_eq!(families.unique(), vec![0, 2]);
        assert_eq!(families.family(QueueKind::Copy), 0);
    }

    #[test]
    fn test_push_constants_cover_root_constants() {
        assert_eq!(PUSH_CONSTANT_BYTES, 256);
    }
}
