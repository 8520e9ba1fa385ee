//! Offscreen swapchain for the dummy backend.

use std::sync::Arc;

use crate::backend::{GpuQueue, GpuResource, SwapchainDescriptor};
use crate::error::GraphicsError;
use crate::types::{Extent2d, ResourceState, TextureFormat};

use super::DummyShared;

/// A ring of back buffers that rotates on every present.
#[derive(Debug)]
pub struct DummySwapchain {
    shared: Arc<DummyShared>,
    backbuffers: Vec<GpuResource>,
    extent: Extent2d,
    format: TextureFormat,
    current: usize,
    present_count: u64,
    last_present: Option<(u32, bool)>,
}

impl DummySwapchain {
    pub(crate) fn new(
        shared: Arc<DummyShared>,
        desc: &SwapchainDescriptor,
    ) -> Result<Self, GraphicsError> {
        if desc.buffer_count < 2 {
            return Err(GraphicsError::SwapchainFailed(format!(
                "swapchain needs at least 2 buffers, got {}",
                desc.buffer_count
            )));
        }
        let mut swapchain = Self {
            shared,
            backbuffers: Vec::new(),
            extent: desc.extent,
            format: desc.format,
            current: 0,
            present_count: 0,
            last_present: None,
        };
        swapchain.create_backbuffers(desc.buffer_count as usize)?;
        Ok(swapchain)
    }

    fn create_backbuffers(&mut self, count: usize) -> Result<(), GraphicsError> {
        if self.extent.is_empty() {
            return Err(GraphicsError::SwapchainFailed(format!(
                "cannot create {}x{} back buffers",
                self.extent.width, self.extent.height
            )));
        }
        let size = u64::from(self.extent.width)
            * u64::from(self.extent.height)
            * u64::from(self.format.block_size());
        self.backbuffers = (0..count)
            .map(|i| {
                GpuResource::Dummy(self.shared.new_resource(
                    Some(&format!("back buffer {i}")),
                    size,
                    false,
                    ResourceState::Present,
                ))
            })
            .collect();
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

    /// Number of presents since creation.
    pub fn present_count(&self) -> u64 {
        self.present_count
    }

    /// Sync interval and tearing flag of the last present.
    pub fn last_present(&self) -> Option<(u32, bool)> {
        self.last_present
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
        let queue = match queue {
            GpuQueue::Dummy(queue) => queue,
            #[cfg(feature = "vulkan-backend")]
            _ => {
                return Err(GraphicsError::SwapchainFailed(
                    "present queue belongs to another backend".to_string(),
                ));
            }
        };
        let backbuffer = match &self.backbuffers[self.current] {
            GpuResource::Dummy(resource) => resource.id(),
            #[cfg(feature = "vulkan-backend")]
            _ => {
                return Err(GraphicsError::Internal(
                    "dummy swapchain holds a foreign resource".to_string(),
                ));
            }
        };
        queue.present(backbuffer)?;
        self.present_count += 1;
        self.last_present = Some((sync_interval, allow_tearing));
        self.current = (self.current + 1) % self.backbuffers.len();
        Ok(())
    }

    pub(crate) fn resize(&mut self, extent: Extent2d) -> Result<(), GraphicsError> {
        let count = self.backbuffers.len();
        self.backbuffers.clear();
        self.extent = extent;
        self.current = 0;
        self.create_backbuffers(count)
    }
}
