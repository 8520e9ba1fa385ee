//! Swapchains: a surface swapchain, or an offscreen image ring without a
//! window.
//!
//! The next image is acquired right after each present and waited for on
//! the CPU, so `current_index` is always the image the next frame renders
//! into.

use std::fmt;
use std::sync::Arc;

use ash::vk;

use crate::backend::{GpuQueue, GpuResource, QueueKind, SwapchainDescriptor, WindowTarget};
use crate::error::GraphicsError;
use crate::types::{Extent2d, ResourceState, TextureDescriptor, TextureFormat, TextureUsage};

use super::VulkanShared;
use super::conversion;
use super::resource::{ImageInfo, VulkanResource};

fn swapchain_error(what: &str, e: impl fmt::Debug) -> GraphicsError {
    GraphicsError::SwapchainFailed(format!("{what}: {e:?}"))
}

struct SurfaceState {
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    /// Signaled by the direct queue when an image's frame is done.
    render_done: Vec<vk::Semaphore>,
    acquire_fence: vk::Fence,
    present_mode: vk::PresentModeKHR,
}

pub struct VulkanSwapchain {
    shared: Arc<VulkanShared>,
    backbuffers: Vec<GpuResource>,
    extent: Extent2d,
    format: TextureFormat,
    buffer_count: u32,
    vsync: bool,
    current: usize,
    surface: Option<SurfaceState>,
}

impl VulkanSwapchain {
    pub(crate) fn new(
        shared: Arc<VulkanShared>,
        desc: &SwapchainDescriptor,
        window: Option<&dyn WindowTarget>,
    ) -> Result<Self, GraphicsError> {
        if desc.buffer_count < 2 {
            return Err(GraphicsError::SwapchainFailed(format!(
                "swapchain needs at least 2 buffers, got {}",
                desc.buffer_count
            )));
        }
        let surface = shared.pending_surface.lock().take();
        if window.is_some() && surface.is_none() {
            return Err(GraphicsError::SwapchainFailed(
                "the backend was created without a window".to_string(),
            ));
        }

        let mut swapchain = Self {
            shared,
            backbuffers: Vec::new(),
            extent: desc.extent,
            format: desc.format,
            buffer_count: desc.buffer_count,
            vsync: desc.vsync,
            current: 0,
            surface: None,
        };
        match surface {
            Some(surface) => {
                let state = swapchain.create_surface_state(surface)?;
                swapchain.surface = Some(state);
                swapchain.create_swapchain(vk::SwapchainKHR::null())?;
                swapchain.acquire()?;
            }
            None => swapchain.create_offscreen()?,
        }
        Ok(swapchain)
    }

    fn create_surface_state(&self, surface: vk::SurfaceKHR) -> Result<SurfaceState, GraphicsError> {
        let shared = &self.shared;
        // SAFETY: the surface and physical device belong to the same instance.
        let supported = unsafe {
            shared.surface_loader.get_physical_device_surface_support(
                shared.physical_device,
                shared.families().direct,
                surface,
            )
        }
        .unwrap_or(false);
        // SAFETY: as above.
        let modes = unsafe {
            shared
                .surface_loader
                .get_physical_device_surface_present_modes(shared.physical_device, surface)
        }
        .map_err(|e| swapchain_error("present modes", e))?;

        let destroy_surface = || {
            // SAFETY: no swapchain uses the surface yet.
            unsafe { shared.surface_loader.destroy_surface(surface, None) }
        };
        if !supported {
            destroy_surface();
            return Err(GraphicsError::SwapchainFailed(
                "the direct queue cannot present to this window".to_string(),
            ));
        }
        let present_mode = select_present_mode(&modes, self.vsync);

        let device = &shared.device;
        let render_done = (0..self.buffer_count)
            .map(|_| {
                // SAFETY: plain binary semaphore creation.
                unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
                    .map_err(|e| swapchain_error("semaphore", e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        // SAFETY: plain fence creation.
        let acquire_fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None) }
            .map_err(|e| swapchain_error("fence", e))?;

        log::debug!("Vulkan present mode {present_mode:?}");
        Ok(SurfaceState {
            surface,
            swapchain: vk::SwapchainKHR::null(),
            render_done,
            acquire_fence,
            present_mode,
        })
    }

    fn create_swapchain(&mut self, old: vk::SwapchainKHR) -> Result<(), GraphicsError> {
        let shared = Arc::clone(&self.shared);
        let Some(state) = self.surface.as_mut() else {
            return Ok(());
        };
        // SAFETY: the surface belongs to this instance.
        let capabilities = unsafe {
            shared
                .surface_loader
                .get_physical_device_surface_capabilities(shared.physical_device, state.surface)
        }
        .map_err(|e| swapchain_error("surface capabilities", e))?;

        let extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            vk::Extent2D {
                width: self.extent.width.clamp(
                    capabilities.min_image_extent.width,
                    capabilities.max_image_extent.width,
                ),
                height: self.extent.height.clamp(
                    capabilities.min_image_extent.height,
                    capabilities.max_image_extent.height,
                ),
            }
        };
        let max_images = if capabilities.max_image_count == 0 {
            u32::MAX
        } else {
            capabilities.max_image_count
        };
        if self.buffer_count < capabilities.min_image_count || self.buffer_count > max_images {
            return Err(GraphicsError::SwapchainFailed(format!(
                "surface supports {}..={max_images} images, {} requested",
                capabilities.min_image_count, self.buffer_count
            )));
        }

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(state.surface)
            .min_image_count(self.buffer_count)
            .image_format(conversion::texture_format(self.format))
            .image_color_space(vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(state.present_mode)
            .clipped(true)
            .old_swapchain(old);
        // SAFETY: create_info is fully initialized and `old` is retired by it.
        let swapchain = unsafe { shared.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| swapchain_error("create swapchain", e))?;
        if old != vk::SwapchainKHR::null() {
            // SAFETY: the caller flushed every queue using the old images.
            unsafe { shared.swapchain_loader.destroy_swapchain(old, None) };
        }
        state.swapchain = swapchain;

        // SAFETY: the swapchain was just created.
        let images = unsafe { shared.swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(|e| swapchain_error("swapchain images", e))?;
        if images.len() != self.buffer_count as usize {
            return Err(GraphicsError::SwapchainFailed(format!(
                "driver created {} swapchain images, {} requested",
                images.len(),
                self.buffer_count
            )));
        }

        self.extent = Extent2d::new(extent.width, extent.height);
        let info = ImageInfo {
            extent: self.extent,
            format: self.format,
            mip_levels: 1,
            array_layers: 1,
        };
        self.backbuffers = images
            .into_iter()
            .enumerate()
            .map(|(index, image)| {
                let resource = VulkanResource::from_swapchain_image(&shared, image, index, info);
                resource.transition_from_undefined(ResourceState::Present)?;
                Ok(GpuResource::Vulkan(resource))
            })
            .collect::<Result<Vec<_>, GraphicsError>>()?;
        Ok(())
    }

    fn create_offscreen(&mut self) -> Result<(), GraphicsError> {
        if self.extent.is_empty() {
            return Err(GraphicsError::SwapchainFailed(format!(
                "cannot create {}x{} back buffers",
                self.extent.width, self.extent.height
            )));
        }
        self.backbuffers = (0..self.buffer_count)
            .map(|index| {
                let desc = TextureDescriptor::new_2d(
                    self.extent.width,
                    self.extent.height,
                    self.format,
                    TextureUsage::RenderTarget,
                )
                .with_label(format!("back buffer {index}"))
                .with_initial_state(ResourceState::Present);
                VulkanResource::new_texture(&self.shared, &desc).map(GpuResource::Vulkan)
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.current = 0;
        Ok(())
    }

    /// Acquire the next surface image and wait until it is usable.
    fn acquire(&mut self) -> Result<(), GraphicsError> {
        let Some(state) = self.surface.as_ref() else {
            return Ok(());
        };
        let loader = &self.shared.swapchain_loader;
        let device = &self.shared.device;
        // SAFETY: the fence is unsignaled and owned by this swapchain.
        let (index, suboptimal) = unsafe {
            loader.acquire_next_image(
                state.swapchain,
                u64::MAX,
                vk::Semaphore::null(),
                state.acquire_fence,
            )
        }
        .map_err(|e| swapchain_error("acquire", e))?;
        // SAFETY: the fence was submitted by the acquire above.
        unsafe {
            device
                .wait_for_fences(&[state.acquire_fence], true, u64::MAX)
                .and_then(|()| device.reset_fences(&[state.acquire_fence]))
        }
        .map_err(|e| swapchain_error("acquire fence", e))?;
        if suboptimal {
            log::debug!("Swapchain is suboptimal for the surface");
        }
        self.current = index as usize;
        Ok(())
    }

    pub(crate) fn extent(&self) -> Extent2d {
        self.extent
    }

    pub(crate) fn format(&self) -> TextureFormat {
        self.format
    }

    pub(crate) fn buffer_count(&self) -> usize {
        self.backbuffers.len()
    }

    pub(crate) fn current_index(&self) -> usize {
        self.current
    }

    pub(crate) fn backbuffer(&self, index: usize) -> Option<&GpuResource> {
        self.backbuffers.get(index)
    }

    pub(crate) fn present(
        &mut self,
        queue: &GpuQueue,
        sync_interval: u32,
        allow_tearing: bool,
    ) -> Result<(), GraphicsError> {
        if allow_tearing && (sync_interval != 0 || !self.shared.capabilities.tearing_supported) {
            return Err(GraphicsError::SwapchainFailed(
                "tearing requested without support or with a non-zero sync interval".to_string(),
            ));
        }
        let GpuQueue::Vulkan(queue) = queue else {
            return Err(GraphicsError::SwapchainFailed(
                "present queue belongs to another backend".to_string(),
            ));
        };
        if queue.kind() != QueueKind::Direct {
            return Err(GraphicsError::SwapchainFailed(format!(
                "cannot present from the {:?} queue",
                queue.kind()
            )));
        }

        if self.surface.is_none() {
            self.current = (self.current + 1) % self.backbuffers.len();
            return Ok(());
        }
        let Some(state) = self.surface.as_ref() else {
            return Ok(());
        };
        let render_done = [state.render_done[self.current]];
        let swapchains = [state.swapchain];
        let indices = [self.current as u32];
        let signal = vk::SubmitInfo::default().signal_semaphores(&render_done);
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&render_done)
            .swapchains(&swapchains)
            .image_indices(&indices);
        let device = &self.shared.device;
        let loader = &self.shared.swapchain_loader;
        queue.with_queue(|raw| {
            // SAFETY: the semaphore signal follows every command submitted
            // for this frame; the queue is locked.
            unsafe {
                device
                    .queue_submit(raw, &[signal], vk::Fence::null())
                    .map_err(|e| swapchain_error("signal", e))?;
                match loader.queue_present(raw, &present_info) {
                    Ok(_) => Ok(()),
                    Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                        log::debug!("Swapchain out of date; waiting for a resize");
                        Ok(())
                    }
                    Err(e) => Err(swapchain_error("present", e)),
                }
            }
        })?;
        self.acquire()
    }

    pub(crate) fn resize(&mut self, extent: Extent2d) -> Result<(), GraphicsError> {
        self.backbuffers.clear();
        self.extent = extent;
        self.current = 0;
        match self.surface.as_ref().map(|state| state.swapchain) {
            Some(old) => {
                self.create_swapchain(old)?;
                self.acquire()
            }
            None => self.create_offscreen(),
        }
    }
}

fn select_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

impl fmt::Debug for VulkanSwapchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanSwapchain")
            .field("extent", &self.extent)
            .field("buffer_count", &self.buffer_count)
            .field("current", &self.current)
            .field("windowed", &self.surface.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        self.backbuffers.clear();
        let Some(state) = self.surface.take() else {
            return;
        };
        let shared = &self.shared;
        // SAFETY: the device flushes its queues before dropping the swapchain.
        unsafe {
            let _ = shared.device.device_wait_idle();
            for semaphore in state.render_done {
                shared.device.destroy_semaphore(semaphore, None);
            }
            shared.device.destroy_fence(state.acquire_fence, None);
            shared
                .swapchain_loader
                .destroy_swapchain(state.swapchain, None);
            shared.surface_loader.destroy_surface(state.surface, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vsync_always_uses_fifo() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
        assert_eq!(select_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
        assert_eq!(
            select_present_mode(&modes, false),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
    }
}
