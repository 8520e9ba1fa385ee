//! Native Vulkan backend using ash.
//!
//! The engine's explicit model maps onto Vulkan 1.3 as follows:
//!
//! - queue fences are timeline semaphores, waited on with `vkWaitSemaphores`
//! - the shader-visible CBV/SRV/UAV and sampler heaps are two bindless
//!   descriptor sets shared by every pipeline; descriptors are addressed by
//!   index through push constants
//! - RTV/DSV heaps hold image views, bound with dynamic rendering
//! - resource states map to image layouts and access masks
//!   ([`conversion::image_layout`]), `Common` being `GENERAL`
//! - memory comes from gpu-allocator
//!
//! Resources are destroyed as soon as they are dropped; the device only
//! drops resources after flushing the queues that reference them.

mod command;
pub(crate) mod conversion;
mod debug;
mod descriptor;
mod device;
mod instance;
mod pipeline;
mod queue;
mod resource;
mod swapchain;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::adapter::AdapterInfo;
use crate::config::DeviceConfig;
use crate::error::GraphicsError;
use crate::types::{
    BufferDescriptor, ComputePipelineDescriptor, DescriptorHeapType, GraphicsPipelineDescriptor,
    TextureDescriptor,
};

use super::{
    BackendCapabilities, BindingTier, GpuBackend, GpuCommandList, GpuDescriptorHeap, GpuPipeline,
    GpuQueue, GpuResource, GpuSwapchain, QueueKind, SwapchainDescriptor, WindowTarget,
};

pub use command::VulkanCommandList;
pub use descriptor::VulkanDescriptorHeap;
pub use pipeline::VulkanPipeline;
pub use queue::VulkanQueue;
pub use resource::{VulkanResource, VulkanResourceHandle};
pub use swapchain::VulkanSwapchain;

use self::descriptor::{AttachmentSlots, AttachmentView};
use self::device::{PUSH_CONSTANT_BYTES, QueueFamilies};

/// Bindless sets registered by the shader-visible heaps.
#[derive(Default)]
struct BindlessState {
    resources: Option<(vk::DescriptorSetLayout, vk::DescriptorSet)>,
    samplers: Option<(vk::DescriptorSetLayout, vk::DescriptorSet)>,
    pipeline_layout: Option<vk::PipelineLayout>,
}

/// Everything the backend's objects need after creation.
///
/// Every handle created by the backend holds an `Arc` to this, so the
/// device and instance outlive all of them.
pub(crate) struct VulkanShared {
    _entry: ash::Entry,
    instance: ash::Instance,
    debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    physical_device: vk::PhysicalDevice,
    pub(crate) device: ash::Device,
    families: QueueFamilies,
    queues: HashMap<u32, Mutex<vk::Queue>>,
    allocator: Mutex<Option<Allocator>>,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    /// Surface created at backend creation, handed to the first swapchain.
    pending_surface: Mutex<Option<vk::SurfaceKHR>>,
    attachments: RwLock<HashMap<u32, Arc<AttachmentSlots>>>,
    bindless: Mutex<BindlessState>,
    immediate_pool: Mutex<vk::CommandPool>,
    next_heap: AtomicU32,
    next_resource: AtomicU64,
    capabilities: BackendCapabilities,
}

impl VulkanShared {
    /// The `vk::Queue` of a family, locked for submission.
    pub(crate) fn lock_queue(&self, family: u32) -> Result<MutexGuard<'_, vk::Queue>, GraphicsError> {
        self.queues
            .get(&family)
            .map(|queue| queue.lock())
            .ok_or_else(|| GraphicsError::Internal(format!("no queue for family {family}")))
    }

    pub(crate) fn families(&self) -> &QueueFamilies {
        &self.families
    }

    fn allocate_resource_id(&self) -> u64 {
        self.next_resource.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Sharing mode for resources touched by every queue family.
    pub(crate) fn sharing(&self) -> (vk::SharingMode, Vec<u32>) {
        let families = self.families.unique();
        if families.len() > 1 {
            (vk::SharingMode::CONCURRENT, families)
        } else {
            (vk::SharingMode::EXCLUSIVE, Vec::new())
        }
    }

    pub(crate) fn attachment(&self, heap_id: u32, index: u32) -> Option<AttachmentView> {
        let heaps = self.attachments.read();
        let slots = heaps.get(&heap_id)?;
        let slots = slots.lock();
        slots.get(index as usize).copied().flatten()
    }

    fn register_bindless(
        &self,
        heap_type: DescriptorHeapType,
        layout: vk::DescriptorSetLayout,
        set: vk::DescriptorSet,
    ) {
        let mut bindless = self.bindless.lock();
        match heap_type {
            DescriptorHeapType::CbvSrvUav => bindless.resources = Some((layout, set)),
            DescriptorHeapType::Sampler => bindless.samplers = Some((layout, set)),
            DescriptorHeapType::Rtv | DescriptorHeapType::Dsv => return,
        }
        if let Some(old) = bindless.pipeline_layout.take() {
            // SAFETY: pipelines keep working after their layout is destroyed;
            // new pipelines pick up the new one.
            unsafe { self.device.destroy_pipeline_layout(old, None) };
        }
    }

    fn unregister_bindless(&self, set: vk::DescriptorSet) {
        let mut bindless = self.bindless.lock();
        if bindless.resources.is_some_and(|(_, s)| s == set) {
            bindless.resources = None;
        }
        if bindless.samplers.is_some_and(|(_, s)| s == set) {
            bindless.samplers = None;
        }
    }

    /// The pipeline layout shared by every pipeline: set 0 resources, set 1
    /// samplers, 256 bytes of push constants.
    pub(crate) fn pipeline_layout(&self) -> Result<vk::PipelineLayout, GraphicsError> {
        let mut bindless = self.bindless.lock();
        if let Some(layout) = bindless.pipeline_layout {
            return Ok(layout);
        }
        let (Some((resources, _)), Some((samplers, _))) = (bindless.resources, bindless.samplers)
        else {
            return Err(GraphicsError::PipelineCreationFailed(
                "the CBV/SRV/UAV and sampler heaps must exist before pipelines".to_string(),
            ));
        };
        let set_layouts = [resources, samplers];
        let push_constants = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::ALL)
            .offset(0)
            .size(PUSH_CONSTANT_BYTES)];
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constants);
        // SAFETY: both set layouts are alive while their heaps are.
        let layout = unsafe { self.device.create_pipeline_layout(&create_info, None) }.map_err(
            |e| GraphicsError::PipelineCreationFailed(format!("pipeline layout: {e:?}")),
        )?;
        bindless.pipeline_layout = Some(layout);
        Ok(layout)
    }

    /// Layout and sets to bind before drawing, once both heaps exist.
    pub(crate) fn bindless_sets(&self) -> Option<(vk::PipelineLayout, [vk::DescriptorSet; 2])> {
        let bindless = self.bindless.lock();
        let layout = bindless.pipeline_layout?;
        let (_, resources) = bindless.resources?;
        let (_, samplers) = bindless.samplers?;
        Some((layout, [resources, samplers]))
    }

    /// Record commands into a one-off command buffer on the direct queue and
    /// wait for them to complete.
    pub(crate) fn immediate_submit(
        &self,
        record: impl FnOnce(&ash::Device, vk::CommandBuffer),
    ) -> Result<(), GraphicsError> {
        let pool = self.immediate_pool.lock();
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let submit_error = |e: vk::Result| GraphicsError::SubmissionFailed(format!("{e:?}"));

        // SAFETY: the pool is externally synchronized by its mutex and the
        // command buffer is freed only after the fence wait.
        unsafe {
            let cmd = self
                .device
                .allocate_command_buffers(&alloc_info)
                .map_err(submit_error)?[0];
            let begin = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device
                .begin_command_buffer(cmd, &begin)
                .map_err(submit_error)?;
            record(&self.device, cmd);
            self.device.end_command_buffer(cmd).map_err(submit_error)?;

            let fence = self
                .device
                .create_fence(&vk::FenceCreateInfo::default(), None)
                .map_err(submit_error)?;
            let buffers = [cmd];
            let submit = vk::SubmitInfo::default().command_buffers(&buffers);
            let result = {
                let queue = self.lock_queue(self.families.direct)?;
                self.device.queue_submit(*queue, &[submit], fence)
            }
            .and_then(|()| self.device.wait_for_fences(&[fence], true, u64::MAX));
            self.device.destroy_fence(fence, None);
            self.device.free_command_buffers(*pool, &buffers);
            result.map_err(|e| match e {
                vk::Result::ERROR_DEVICE_LOST => GraphicsError::DeviceLost,
                other => submit_error(other),
            })
        }
    }

    pub(crate) fn with_allocator<R>(
        &self,
        f: impl FnOnce(&mut Allocator) -> Result<R, GraphicsError>,
    ) -> Result<R, GraphicsError> {
        let mut allocator = self.allocator.lock();
        let allocator = allocator
            .as_mut()
            .ok_or_else(|| GraphicsError::Internal("allocator already destroyed".to_string()))?;
        f(allocator)
    }
}

impl fmt::Debug for VulkanShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanShared")
            .field("families", &self.families)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl Drop for VulkanShared {
    fn drop(&mut self) {
        // SAFETY: every object created from the device holds an Arc to this,
        // so nothing else references the device any more.
        unsafe {
            let _ = self.device.device_wait_idle();
            if let Some(layout) = self.bindless.get_mut().pipeline_layout.take() {
                self.device.destroy_pipeline_layout(layout, None);
            }
            self.device
                .destroy_command_pool(*self.immediate_pool.get_mut(), None);
            // The allocator frees its memory blocks on drop.
            self.allocator.get_mut().take();
            if let Some(surface) = self.pending_surface.get_mut().take() {
                self.surface_loader.destroy_surface(surface, None);
            }
            self.device.destroy_device(None);
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        log::debug!("Vulkan device destroyed");
    }
}

/// Vulkan implementation of [`GpuBackend`].
pub struct VulkanBackend {
    adapter: AdapterInfo,
    shared: Arc<VulkanShared>,
}

impl VulkanBackend {
    /// Load Vulkan, pick an adapter and create the logical device.
    ///
    /// With a window, the instance enables its surface extensions and the
    /// surface is created up front to query present support.
    pub fn new(
        config: &DeviceConfig,
        window: Option<&dyn WindowTarget>,
    ) -> Result<Self, GraphicsError> {
        // SAFETY: loading the system Vulkan loader.
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            GraphicsError::InitializationFailed(format!("failed to load Vulkan: {e}"))
        })?;

        let handles = window
            .map(|window| {
                let display = window.display_handle().map_err(|e| {
                    GraphicsError::InitializationFailed(format!("display handle: {e}"))
                })?;
                let window = window.window_handle().map_err(|e| {
                    GraphicsError::InitializationFailed(format!("window handle: {e}"))
                })?;
                Ok::<_, GraphicsError>((display.as_raw(), window.as_raw()))
            })
            .transpose()?;

        let bundle =
            instance::create_instance(&entry, config.validation, handles.map(|(d, _)| d))?;
        let instance = bundle.instance;
        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        let surface = handles
            .map(|(display, window)| {
                // SAFETY: the handles come from a live window.
                unsafe { ash_window::create_surface(&entry, &instance, display, window, None) }
                    .map_err(|e| GraphicsError::SwapchainFailed(format!("create surface: {e:?}")))
            })
            .transpose()?;

        let candidate = device::select_physical_device(&instance)?;
        let physical_device = candidate.physical_device;
        let families = device::find_queue_families(&instance, physical_device)?;
        let binding_tier = device::binding_tier(&instance, physical_device);
        let device =
            device::create_logical_device(&instance, physical_device, &families, binding_tier)?;

        let queues = families
            .unique()
            .into_iter()
            .map(|family| {
                // SAFETY: one queue was requested for every unique family.
                let queue = unsafe { device.get_device_queue(family, 0) };
                (family, Mutex::new(queue))
            })
            .collect();

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: gpu_allocator::AllocationSizes::default(),
        })
        .map_err(|e| {
            GraphicsError::InitializationFailed(format!("failed to create allocator: {e}"))
        })?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(families.direct)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        // SAFETY: the device is valid and the family exists.
        let immediate_pool = unsafe { device.create_command_pool(&pool_info, None) }.map_err(
            |e| GraphicsError::InitializationFailed(format!("command pool: {e:?}")),
        )?;

        let tearing_supported = match surface {
            Some(surface) => {
                // SAFETY: surface and physical device belong to this instance.
                let modes = unsafe {
                    surface_loader
                        .get_physical_device_surface_present_modes(physical_device, surface)
                }
                .unwrap_or_default();
                modes.contains(&vk::PresentModeKHR::IMMEDIATE)
            }
            None => false,
        };

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);
        log::info!(
            "Vulkan backend initialized on {} (binding tier {binding_tier:?}, tearing: {tearing_supported})",
            candidate.info.name
        );

        Ok(Self {
            adapter: candidate.info,
            shared: Arc::new(VulkanShared {
                _entry: entry,
                instance,
                debug: bundle.debug,
                physical_device,
                device,
                families,
                queues,
                allocator: Mutex::new(Some(allocator)),
                surface_loader,
                swapchain_loader,
                pending_surface: Mutex::new(surface),
                attachments: RwLock::new(HashMap::new()),
                bindless: Mutex::new(BindlessState::default()),
                immediate_pool: Mutex::new(immediate_pool),
                next_heap: AtomicU32::new(0),
                next_resource: AtomicU64::new(0),
                capabilities: BackendCapabilities {
                    tearing_supported,
                    binding_tier,
                },
            }),
        })
    }
}

impl fmt::Debug for VulkanBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanBackend")
            .field("adapter", &self.adapter.name)
            .finish_non_exhaustive()
    }
}

impl GpuBackend for VulkanBackend {
    fn name(&self) -> &'static str {
        "Vulkan Backend (ash)"
    }

    fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.shared.capabilities
    }

    fn create_queue(&self, kind: QueueKind) -> Result<GpuQueue, GraphicsError> {
        Ok(GpuQueue::Vulkan(VulkanQueue::new(
            kind,
            Arc::clone(&self.shared),
        )?))
    }

    fn create_command_list(&self, kind: QueueKind) -> Result<GpuCommandList, GraphicsError> {
        Ok(GpuCommandList::Vulkan(VulkanCommandList::new(
            kind,
            Arc::clone(&self.shared),
        )?))
    }

    fn create_descriptor_heap(
        &self,
        heap_type: DescriptorHeapType,
        capacity: u32,
    ) -> Result<GpuDescriptorHeap, GraphicsError> {
        let id = self.shared.next_heap.fetch_add(1, Ordering::Relaxed);
        let update_after_bind = self.shared.capabilities.binding_tier >= BindingTier::Tier1_1;
        Ok(GpuDescriptorHeap::Vulkan(VulkanDescriptorHeap::new(
            Arc::clone(&self.shared),
            id,
            heap_type,
            capacity,
            update_after_bind,
        )?))
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> Result<GpuResource, GraphicsError> {
        Ok(GpuResource::Vulkan(VulkanResource::new_texture(
            &self.shared,
            desc,
        )?))
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<GpuResource, GraphicsError> {
        Ok(GpuResource::Vulkan(VulkanResource::new_buffer(
            &self.shared,
            desc,
        )?))
    }

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDescriptor,
    ) -> Result<GpuPipeline, GraphicsError> {
        Ok(GpuPipeline::Vulkan(VulkanPipeline::new_graphics(
            &self.shared,
            desc,
        )?))
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor,
    ) -> Result<GpuPipeline, GraphicsError> {
        Ok(GpuPipeline::Vulkan(VulkanPipeline::new_compute(
            &self.shared,
            desc,
        )?))
    }

    fn create_swapchain(
        &self,
        desc: &SwapchainDescriptor,
        window: Option<&dyn WindowTarget>,
    ) -> Result<GpuSwapchain, GraphicsError> {
        Ok(GpuSwapchain::Vulkan(VulkanSwapchain::new(
            Arc::clone(&self.shared),
            desc,
            window,
        )?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
