//! GPU backend abstraction layer.
//!
//! Each backend implements the [`GpuBackend`] trait, which creates the
//! native objects the engine builds on: queues, command lists, descriptor
//! heaps, resources, pipelines and swapchains. The objects themselves are
//! enum handles with one variant per compiled-in backend; operations on them
//! dispatch with a `match`.
//!
//! # Available Backends
//!
//! - `dummy` (always compiled): simulated GPU. Every queue runs on its own
//!   thread and executes submitted command lists in order while tracking
//!   per-resource states, which makes it the engine's validation layer.
//! - `vulkan-backend`: native Vulkan using ash, timeline semaphores as
//!   fences and a bindless descriptor model.

pub mod dummy;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use std::any::Any;
use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::adapter::AdapterInfo;
use crate::config::{BackendKind, DeviceConfig};
use crate::descriptor::CpuDescriptorHandle;
use crate::error::GraphicsError;
use crate::types::{
    BufferDescriptor, ClearColor, ComputePipelineDescriptor, DescriptorHeapType, Extent2d,
    GraphicsPipelineDescriptor, IndexFormat, ResourceState, SamplerDescriptor, ScissorRect,
    TextureDescriptor, TextureFormat, ViewDescriptor, Viewport,
};

use self::dummy::{
    DummyCommandList, DummyDescriptorHeap, DummyPipeline, DummyQueue, DummyResource, DummySwapchain,
    ResourceId,
};

/// Dispatch a method call to the backend-specific value inside an enum handle.
macro_rules! dispatch {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            Self::Dummy($inner) => $body,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan($inner) => $body,
        }
    };
}

/// Anything a swapchain can present to.
pub trait WindowTarget: HasWindowHandle + HasDisplayHandle {}

impl<T: HasWindowHandle + HasDisplayHandle + ?Sized> WindowTarget for T {}

/// Hardware queue families the engine submits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Graphics, compute and copy work; presents.
    Direct,
    /// Compute and copy work.
    Compute,
    /// Copy work only.
    Copy,
}

/// Resource binding model support level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingTier {
    /// Descriptors must be written before the command lists using them are
    /// recorded.
    Tier1_0,
    /// Descriptors may be written while bound (update-after-bind).
    Tier1_1,
}

/// Optional features reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Presenting without waiting for vertical blank is supported.
    pub tearing_supported: bool,
    pub binding_tier: BindingTier,
}

/// A single resource state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceBarrier {
    pub resource: GpuResourceHandle,
    pub before: ResourceState,
    pub after: ResourceState,
}

/// Sub-region of a texture addressed by a buffer/texture copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRegion {
    pub mip_level: u32,
    pub extent: Extent2d,
    pub array_layers: u32,
    pub format: TextureFormat,
}

impl TextureRegion {
    /// Size in bytes of the region packed without row padding.
    pub fn byte_size(&self) -> u64 {
        u64::from(self.extent.width)
            * u64::from(self.extent.height)
            * u64::from(self.array_layers)
            * u64::from(self.format.block_size())
    }
}

/// Swapchain creation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDescriptor {
    pub extent: Extent2d,
    pub buffer_count: u32,
    pub format: TextureFormat,
    pub vsync: bool,
}

// ============================================================================
// Handles
// ============================================================================

/// Lightweight copyable identity of a resource, used in barriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuResourceHandle {
    Dummy(ResourceId),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanResourceHandle),
}

/// Handle to a GPU buffer or texture. Destroyed when dropped.
#[derive(Debug)]
pub enum GpuResource {
    Dummy(DummyResource),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanResource),
}

impl GpuResource {
    pub fn handle(&self) -> GpuResourceHandle {
        match self {
            Self::Dummy(resource) => GpuResourceHandle::Dummy(resource.id()),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan(resource) => GpuResourceHandle::Vulkan(resource.handle()),
        }
    }

    /// Write CPU data into a host-visible buffer.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        dispatch!(self, resource => resource.write(offset, data))
    }

    /// Read from a host-visible buffer.
    pub fn read(&self, offset: u64, size: u64) -> Result<Vec<u8>, GraphicsError> {
        dispatch!(self, resource => resource.read(offset, size))
    }
}

/// Handle to a hardware queue with its fence.
#[derive(Debug)]
pub enum GpuQueue {
    Dummy(DummyQueue),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanQueue),
}

impl GpuQueue {
    /// Set the queue's fence to `value` once all previously submitted work
    /// has completed.
    pub fn signal(&self, value: u64) -> Result<(), GraphicsError> {
        dispatch!(self, queue => queue.signal(value))
    }

    /// Last fence value reached by the queue.
    pub fn completed_value(&self) -> Result<u64, GraphicsError> {
        dispatch!(self, queue => queue.completed_value())
    }

    /// Block until the queue's fence reaches `value`.
    pub fn wait_for_value(&self, value: u64) -> Result<(), GraphicsError> {
        dispatch!(self, queue => queue.wait_for_value(value))
    }

    /// Submit closed command lists in order.
    pub fn submit(&self, lists: &mut [&mut GpuCommandList]) -> Result<(), GraphicsError> {
        dispatch!(self, queue => queue.submit(lists))
    }
}

/// Handle to a command list and the allocator backing it.
#[derive(Debug)]
pub enum GpuCommandList {
    Dummy(DummyCommandList),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanCommandList),
}

impl GpuCommandList {
    /// Discard previous commands and start recording.
    pub fn reset(&mut self) -> Result<(), GraphicsError> {
        dispatch!(self, list => list.reset())
    }

    /// Finish recording; the list can be submitted afterwards.
    pub fn close(&mut self) -> Result<(), GraphicsError> {
        dispatch!(self, list => list.close())
    }

    pub fn is_closed(&self) -> bool {
        dispatch!(self, list => list.is_closed())
    }

    pub fn resource_barriers(&mut self, barriers: &[ResourceBarrier]) {
        dispatch!(self, list => list.resource_barriers(barriers))
    }

    pub fn set_render_targets(
        &mut self,
        rtvs: &[CpuDescriptorHandle],
        dsv: Option<CpuDescriptorHandle>,
    ) {
        dispatch!(self, list => list.set_render_targets(rtvs, dsv))
    }

    pub fn clear_render_target(&mut self, rtv: CpuDescriptorHandle, color: ClearColor) {
        dispatch!(self, list => list.clear_render_target(rtv, color))
    }

    pub fn clear_depth(&mut self, dsv: CpuDescriptorHandle, depth: f32) {
        dispatch!(self, list => list.clear_depth(dsv, depth))
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        dispatch!(self, list => list.set_viewport(viewport))
    }

    pub fn set_scissor(&mut self, scissor: ScissorRect) {
        dispatch!(self, list => list.set_scissor(scissor))
    }

    pub fn set_pipeline(&mut self, pipeline: &GpuPipeline) {
        dispatch!(self, list => list.set_pipeline(pipeline))
    }

    /// Set 32-bit root constants for the bound pipeline.
    pub fn set_constants(&mut self, constants: &[u32]) {
        dispatch!(self, list => list.set_constants(constants))
    }

    pub fn set_index_buffer(&mut self, buffer: &GpuResource, format: IndexFormat) {
        dispatch!(self, list => list.set_index_buffer(buffer, format))
    }

    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        dispatch!(self, list => list.draw(vertex_count, instance_count, first_vertex, first_instance))
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) {
        dispatch!(self, list => list.draw_indexed(
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance
        ))
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        dispatch!(self, list => list.dispatch(x, y, z))
    }

    pub fn copy_buffer(&mut self, src: &GpuResource, dst: &GpuResource, size: u64) {
        dispatch!(self, list => list.copy_buffer(src, dst, size))
    }

    pub fn copy_buffer_to_texture(
        &mut self,
        src: &GpuResource,
        dst: &GpuResource,
        region: TextureRegion,
    ) {
        dispatch!(self, list => list.copy_buffer_to_texture(src, dst, region))
    }

    pub fn copy_texture_to_buffer(
        &mut self,
        src: &GpuResource,
        dst: &GpuResource,
        region: TextureRegion,
    ) {
        dispatch!(self, list => list.copy_texture_to_buffer(src, dst, region))
    }

    /// Copy a whole resource into another of identical shape.
    pub fn copy_resource(&mut self, src: &GpuResource, dst: &GpuResource) {
        dispatch!(self, list => list.copy_resource(src, dst))
    }

    /// The dummy command list, for test instrumentation.
    pub fn as_dummy(&self) -> Option<&DummyCommandList> {
        match self {
            Self::Dummy(list) => Some(list),
            #[cfg(feature = "vulkan-backend")]
            _ => None,
        }
    }

    pub fn as_dummy_mut(&mut self) -> Option<&mut DummyCommandList> {
        match self {
            Self::Dummy(list) => Some(list),
            #[cfg(feature = "vulkan-backend")]
            _ => None,
        }
    }
}

/// Handle to a native descriptor heap.
#[derive(Debug)]
pub enum GpuDescriptorHeap {
    Dummy(DummyDescriptorHeap),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanDescriptorHeap),
}

impl GpuDescriptorHeap {
    /// Backend-unique heap id, encoded into CPU descriptor handles.
    pub fn id(&self) -> u32 {
        dispatch!(self, heap => heap.id())
    }

    /// Write a resource view into slot `index`.
    pub fn write_view(
        &self,
        index: u32,
        resource: &GpuResource,
        view: &ViewDescriptor,
    ) -> Result<(), GraphicsError> {
        dispatch!(self, heap => heap.write_view(index, resource, view))
    }

    /// Write a sampler into slot `index`.
    pub fn write_sampler(&self, index: u32, desc: &SamplerDescriptor) -> Result<(), GraphicsError> {
        dispatch!(self, heap => heap.write_sampler(index, desc))
    }
}

/// Handle to a compiled pipeline state.
#[derive(Debug)]
pub enum GpuPipeline {
    Dummy(DummyPipeline),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanPipeline),
}

/// Handle to a swapchain and its back buffers.
#[derive(Debug)]
pub enum GpuSwapchain {
    Dummy(DummySwapchain),
    #[cfg(feature = "vulkan-backend")]
    Vulkan(vulkan::VulkanSwapchain),
}

impl GpuSwapchain {
    pub fn extent(&self) -> Extent2d {
        dispatch!(self, swapchain => swapchain.extent())
    }

    pub fn format(&self) -> TextureFormat {
        dispatch!(self, swapchain => swapchain.format())
    }

    pub fn buffer_count(&self) -> usize {
        dispatch!(self, swapchain => swapchain.buffer_count())
    }

    /// Index of the back buffer the next frame renders into.
    pub fn current_index(&self) -> usize {
        dispatch!(self, swapchain => swapchain.current_index())
    }

    pub fn backbuffer(&self, index: usize) -> Option<&GpuResource> {
        dispatch!(self, swapchain => swapchain.backbuffer(index))
    }

    /// Queue presentation of the current back buffer on `queue`.
    pub fn present(
        &mut self,
        queue: &GpuQueue,
        sync_interval: u32,
        allow_tearing: bool,
    ) -> Result<(), GraphicsError> {
        dispatch!(self, swapchain => swapchain.present(queue, sync_interval, allow_tearing))
    }

    /// Release and recreate the back buffers at a new size.
    ///
    /// The caller must guarantee no submitted work still references them.
    pub fn resize(&mut self, extent: Extent2d) -> Result<(), GraphicsError> {
        dispatch!(self, swapchain => swapchain.resize(extent))
    }

    /// The dummy swapchain, for test instrumentation.
    pub fn as_dummy(&self) -> Option<&DummySwapchain> {
        match self {
            Self::Dummy(swapchain) => Some(swapchain),
            #[cfg(feature = "vulkan-backend")]
            _ => None,
        }
    }
}

// ============================================================================
// Backend trait
// ============================================================================

/// GPU backend trait for abstracting different GPU APIs.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// The adapter the backend selected at creation.
    fn adapter(&self) -> &AdapterInfo;

    fn capabilities(&self) -> BackendCapabilities;

    fn create_queue(&self, kind: QueueKind) -> Result<GpuQueue, GraphicsError>;

    fn create_command_list(&self, kind: QueueKind) -> Result<GpuCommandList, GraphicsError>;

    fn create_descriptor_heap(
        &self,
        heap_type: DescriptorHeapType,
        capacity: u32,
    ) -> Result<GpuDescriptorHeap, GraphicsError>;

    /// Create a texture in `desc.resolved_initial_state()`.
    fn create_texture(&self, desc: &TextureDescriptor) -> Result<GpuResource, GraphicsError>;

    /// Create a buffer in the memory heap its usage calls for.
    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<GpuResource, GraphicsError>;

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDescriptor,
    ) -> Result<GpuPipeline, GraphicsError>;

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor,
    ) -> Result<GpuPipeline, GraphicsError>;

    /// Create a swapchain presenting to `window`, or an offscreen image ring
    /// when there is no window.
    fn create_swapchain(
        &self,
        desc: &SwapchainDescriptor,
        window: Option<&dyn WindowTarget>,
    ) -> Result<GpuSwapchain, GraphicsError>;

    /// Downcast support for backend-specific instrumentation.
    fn as_any(&self) -> &dyn Any;
}

/// Creates the backend requested by `config`.
///
/// `Auto` tries Vulkan first when it is compiled in and falls back to the
/// dummy backend.
pub fn create_backend(
    config: &DeviceConfig,
    window: Option<&dyn WindowTarget>,
) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    let options = dummy::DummyOptions {
        validation: config.validation,
        ..Default::default()
    };

    match config.backend {
        BackendKind::Dummy => {
            log::info!("Using dummy backend");
            Ok(Arc::new(dummy::DummyBackend::with_options(options)?))
        }
        #[cfg(feature = "vulkan-backend")]
        BackendKind::Vulkan => {
            let backend = vulkan::VulkanBackend::new(config, window)?;
            log::info!("Using Vulkan backend (ash)");
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "vulkan-backend"))]
        BackendKind::Vulkan => Err(GraphicsError::Unsupported(
            "vulkan backend requested but the `vulkan-backend` feature is disabled".to_string(),
        )),
        BackendKind::Auto => {
            #[cfg(feature = "vulkan-backend")]
            {
                match vulkan::VulkanBackend::new(config, window) {
                    Ok(backend) => {
                        log::info!("Using Vulkan backend (ash)");
                        return Ok(Arc::new(backend));
                    }
                    Err(e) => {
                        log::warn!("Failed to create Vulkan backend: {}", e);
                    }
                }
            }
            #[cfg(not(feature = "vulkan-backend"))]
            let _ = window;

            log::info!("Using dummy backend");
            Ok(Arc::new(dummy::DummyBackend::with_options(options)?))
        }
    }
}

/// Check if a real GPU backend is compiled in.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "vulkan-backend")
}
