//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to any GPU, but it does behave like one: every
//! queue owns a worker thread that executes submitted command lists in order
//! and advances the queue's fence afterwards, so fence waits really block and
//! frames really overlap. Resources are plain byte vectors, which makes
//! uploads, copies and read-backs observable.
//!
//! While executing, the backend tracks the state of every resource on the
//! GPU timeline and records a validation message whenever a barrier's
//! `before` state is wrong, a transition is redundant, or a resource is used
//! in a state that does not allow it. See [`DummyBackend::validation_errors`].

mod command;
mod queue;
mod swapchain;
mod validation;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::adapter::{AdapterInfo, AdapterType, select_adapter};
use crate::descriptor::CpuDescriptorHandle;
use crate::error::GraphicsError;
use crate::types::{
    BufferDescriptor, ComputePipelineDescriptor, DescriptorHeapType, GraphicsPipelineDescriptor,
    ResourceState, SamplerDescriptor, TextureDescriptor, ViewDescriptor,
};

use super::{
    BackendCapabilities, BindingTier, GpuBackend, GpuCommandList, GpuDescriptorHeap, GpuPipeline,
    GpuQueue, GpuResource, GpuResourceHandle, GpuSwapchain, QueueKind, SwapchainDescriptor,
    WindowTarget,
};

pub use command::{DummyCommandList, StallGate};
pub use queue::DummyQueue;
pub use swapchain::DummySwapchain;

use validation::ValidationLayer;

/// Identity of a dummy resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Construction options for [`DummyBackend`].
#[derive(Debug, Clone)]
pub struct DummyOptions {
    /// Adapters the backend pretends to enumerate.
    pub adapters: Vec<AdapterInfo>,
    pub tearing_supported: bool,
    pub binding_tier: BindingTier,
    /// Record validation messages. State tracking runs either way.
    pub validation: bool,
}

impl Default for DummyOptions {
    fn default() -> Self {
        Self {
            adapters: vec![AdapterInfo {
                name: "Solstice Dummy Adapter".to_string(),
                vendor_id: 0,
                adapter_type: AdapterType::Discrete,
                dedicated_video_memory: 4 * 1024 * 1024 * 1024,
            }],
            tearing_supported: true,
            binding_tier: BindingTier::Tier1_1,
            validation: true,
        }
    }
}

/// State shared by the backend, its queues, command lists and resources.
pub(crate) struct DummyShared {
    pub(crate) validation: ValidationLayer,
    heaps: RwLock<HashMap<u32, Arc<HeapSlots>>>,
    next_resource: AtomicU64,
    next_heap: AtomicU32,
    capabilities: BackendCapabilities,
}

impl fmt::Debug for DummyShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyShared")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl DummyShared {
    fn allocate_resource_id(&self) -> ResourceId {
        ResourceId(self.next_resource.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Resource referenced by a CPU descriptor handle, if the slot was written.
    pub(crate) fn resolve_descriptor(&self, handle: CpuDescriptorHandle) -> Option<ResourceId> {
        let heaps = self.heaps.read();
        let slots = heaps.get(&handle.heap_id())?;
        let slots = slots.lock();
        slots
            .get(handle.index() as usize)
            .and_then(|slot| slot.as_ref())
            .and_then(|slot| slot.resource)
    }

    pub(crate) fn new_resource(
        self: &Arc<Self>,
        label: Option<&str>,
        size: u64,
        host_visible: bool,
        initial_state: ResourceState,
    ) -> DummyResource {
        let id = self.allocate_resource_id();
        let label = label.map_or_else(|| format!("resource {id}"), str::to_string);
        self.validation.register(id, &label, initial_state);
        DummyResource {
            id,
            label,
            storage: Arc::new(Mutex::new(vec![0u8; size as usize])),
            host_visible,
            shared: Arc::clone(self),
        }
    }
}

// ============================================================================
// Resources
// ============================================================================

/// A simulated buffer or texture backed by host memory.
pub struct DummyResource {
    id: ResourceId,
    label: String,
    storage: Arc<Mutex<Vec<u8>>>,
    host_visible: bool,
    shared: Arc<DummyShared>,
}

impl DummyResource {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn storage(&self) -> &Arc<Mutex<Vec<u8>>> {
        &self.storage
    }

    pub(crate) fn write(&self, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        if !self.host_visible {
            return Err(GraphicsError::InvalidParameter(format!(
                "{} is not CPU visible",
                self.label
            )));
        }
        let mut storage = self.storage.lock();
        let range = checked_range(offset, data.len() as u64, storage.len(), &self.label)?;
        storage[range].copy_from_slice(data);
        Ok(())
    }

    pub(crate) fn read(&self, offset: u64, size: u64) -> Result<Vec<u8>, GraphicsError> {
        if !self.host_visible {
            return Err(GraphicsError::InvalidParameter(format!(
                "{} is not CPU visible",
                self.label
            )));
        }
        let storage = self.storage.lock();
        let range = checked_range(offset, size, storage.len(), &self.label)?;
        Ok(storage[range].to_vec())
    }
}

fn checked_range(
    offset: u64,
    size: u64,
    len: usize,
    label: &str,
) -> Result<std::ops::Range<usize>, GraphicsError> {
    let end = offset.checked_add(size).filter(|end| *end <= len as u64);
    match end {
        Some(end) => Ok(offset as usize..end as usize),
        None => Err(GraphicsError::InvalidParameter(format!(
            "range {offset}+{size} out of bounds for {label} ({len} bytes)"
        ))),
    }
}

impl fmt::Debug for DummyResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyResource")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl Drop for DummyResource {
    fn drop(&mut self) {
        self.shared.validation.forget(self.id);
    }
}

// ============================================================================
// Descriptor heaps
// ============================================================================

#[derive(Debug, Clone)]
struct SlotContent {
    resource: Option<ResourceId>,
    #[allow(dead_code)]
    view: Option<ViewDescriptor>,
}

type HeapSlots = Mutex<Vec<Option<SlotContent>>>;

/// A descriptor heap recording which resource each slot views.
pub struct DummyDescriptorHeap {
    id: u32,
    heap_type: DescriptorHeapType,
    capacity: u32,
    slots: Arc<HeapSlots>,
}

impl DummyDescriptorHeap {
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

    pub(crate) fn write_view(
        &self,
        index: u32,
        resource: &GpuResource,
        view: &ViewDescriptor,
    ) -> Result<(), GraphicsError> {
        self.check_slot(index, view.heap_type())?;
        let id = dummy_resource_id(&resource.handle())?;
        self.slots.lock()[index as usize] = Some(SlotContent {
            resource: Some(id),
            view: Some(*view),
        });
        Ok(())
    }

    pub(crate) fn write_sampler(
        &self,
        index: u32,
        _desc: &SamplerDescriptor,
    ) -> Result<(), GraphicsError> {
        self.check_slot(index, DescriptorHeapType::Sampler)?;
        self.slots.lock()[index as usize] = Some(SlotContent {
            resource: None,
            view: None,
        });
        Ok(())
    }
}

impl fmt::Debug for DummyDescriptorHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyDescriptorHeap")
            .field("id", &self.id)
            .field("heap_type", &self.heap_type)
            .field("capacity", &self.capacity)
            .finish()
    }
}

pub(crate) fn dummy_resource_id(handle: &GpuResourceHandle) -> Result<ResourceId, GraphicsError> {
    match handle {
        GpuResourceHandle::Dummy(id) => Ok(*id),
        #[cfg(feature = "vulkan-backend")]
        _ => Err(GraphicsError::InvalidParameter(
            "resource belongs to another backend".to_string(),
        )),
    }
}

// ============================================================================
// Pipelines
// ============================================================================

/// A validated pipeline description.
#[derive(Debug, Clone)]
pub struct DummyPipeline {
    pub(crate) label: Option<String>,
    pub(crate) compute: bool,
    pub(crate) depth_write: bool,
}

fn check_shader(name: &str, bytes: &[u8]) -> Result<(), GraphicsError> {
    if bytes.is_empty() {
        return Err(GraphicsError::PipelineCreationFailed(format!(
            "shader '{name}' is empty"
        )));
    }
    Ok(())
}

// ============================================================================
// Backend
// ============================================================================

/// Dummy GPU backend.
pub struct DummyBackend {
    adapter: AdapterInfo,
    shared: Arc<DummyShared>,
}

impl DummyBackend {
    /// Create a backend with default options.
    pub fn new() -> Result<Self, GraphicsError> {
        Self::with_options(DummyOptions::default())
    }

    pub fn with_options(options: DummyOptions) -> Result<Self, GraphicsError> {
        let index = select_adapter(&options.adapters)?;
        let capabilities = BackendCapabilities {
            tearing_supported: options.tearing_supported,
            binding_tier: options.binding_tier,
        };
        Ok(Self {
            adapter: options.adapters[index].clone(),
            shared: Arc::new(DummyShared {
                validation: ValidationLayer::new(options.validation),
                heaps: RwLock::new(HashMap::new()),
                next_resource: AtomicU64::new(0),
                next_heap: AtomicU32::new(0),
                capabilities,
            }),
        })
    }

    /// Messages recorded by the validation layer so far.
    ///
    /// Messages are produced on queue threads; flush the queues before
    /// inspecting them.
    pub fn validation_errors(&self) -> Vec<String> {
        self.shared.validation.messages()
    }

    pub fn clear_validation_errors(&self) {
        self.shared.validation.clear();
    }

    /// State of a resource on the GPU timeline, as of the last executed
    /// command.
    pub fn resource_state(&self, handle: GpuResourceHandle) -> Option<ResourceState> {
        let id = dummy_resource_id(&handle).ok()?;
        self.shared.validation.state_of(id)
    }

    /// Resource viewed by a descriptor slot.
    pub fn descriptor_target(&self, handle: CpuDescriptorHandle) -> Option<ResourceId> {
        self.shared.resolve_descriptor(handle)
    }

    /// Number of resources currently alive.
    pub fn live_resources(&self) -> usize {
        self.shared.validation.tracked_count()
    }
}

impl fmt::Debug for DummyBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyBackend")
            .field("adapter", &self.adapter.name)
            .finish_non_exhaustive()
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    fn capabilities(&self) -> BackendCapabilities {
        self.shared.capabilities
    }

    fn create_queue(&self, kind: QueueKind) -> Result<GpuQueue, GraphicsError> {
        Ok(GpuQueue::Dummy(DummyQueue::new(kind, Arc::clone(&self.shared))?))
    }

    fn create_command_list(&self, kind: QueueKind) -> Result<GpuCommandList, GraphicsError> {
        Ok(GpuCommandList::Dummy(DummyCommandList::new(
            kind,
            Arc::clone(&self.shared),
        )))
    }

    fn create_descriptor_heap(
        &self,
        heap_type: DescriptorHeapType,
        capacity: u32,
    ) -> Result<GpuDescriptorHeap, GraphicsError> {
        let id = self.shared.next_heap.fetch_add(1, Ordering::Relaxed);
        let slots = Arc::new(Mutex::new(vec![None; capacity as usize]));
        self.shared.heaps.write().insert(id, Arc::clone(&slots));
        log::trace!("DummyBackend: creating {heap_type:?} heap {id} ({capacity} slots)");
        Ok(GpuDescriptorHeap::Dummy(DummyDescriptorHeap {
            id,
            heap_type,
            capacity,
            slots,
        }))
    }

    fn create_texture(&self, desc: &TextureDescriptor) -> Result<GpuResource, GraphicsError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "texture {:?} has an empty extent",
                desc.label
            )));
        }
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}, {} mips)",
            desc.label,
            desc.width,
            desc.height,
            desc.mip_levels
        );
        Ok(GpuResource::Dummy(self.shared.new_resource(
            desc.label.as_deref(),
            desc.mip0_size(),
            false,
            desc.resolved_initial_state(),
        )))
    }

    fn create_buffer(&self, desc: &BufferDescriptor) -> Result<GpuResource, GraphicsError> {
        if desc.size == 0 {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "buffer {:?} has zero size",
                desc.label
            )));
        }
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        let host_visible = desc.usage.memory_location() != crate::types::MemoryLocation::GpuOnly;
        let state = if host_visible {
            desc.usage.resting_state()
        } else {
            ResourceState::Common
        };
        Ok(GpuResource::Dummy(self.shared.new_resource(
            desc.label.as_deref(),
            desc.size,
            host_visible,
            state,
        )))
    }

    fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDescriptor,
    ) -> Result<GpuPipeline, GraphicsError> {
        check_shader(desc.vertex_shader.name(), desc.vertex_shader.bytes())?;
        check_shader(desc.pixel_shader.name(), desc.pixel_shader.bytes())?;
        if desc.render_target_formats.len() > 8 {
            return Err(GraphicsError::PipelineCreationFailed(format!(
                "{} render targets exceed the limit of 8",
                desc.render_target_formats.len()
            )));
        }
        if desc.render_target_formats.iter().any(|f| f.is_depth_stencil()) {
            return Err(GraphicsError::PipelineCreationFailed(
                "depth format used as a color target".to_string(),
            ));
        }
        if desc.depth_format.is_some_and(|f| !f.is_depth_stencil()) {
            return Err(GraphicsError::PipelineCreationFailed(
                "color format used as the depth target".to_string(),
            ));
        }
        Ok(GpuPipeline::Dummy(DummyPipeline {
            label: desc.label.clone(),
            compute: false,
            depth_write: desc.depth_format.is_some() && desc.depth.write_enabled,
        }))
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor,
    ) -> Result<GpuPipeline, GraphicsError> {
        check_shader(desc.shader.name(), desc.shader.bytes())?;
        Ok(GpuPipeline::Dummy(DummyPipeline {
            label: desc.label.clone(),
            compute: true,
            depth_write: false,
        }))
    }

    fn create_swapchain(
        &self,
        desc: &SwapchainDescriptor,
        _window: Option<&dyn WindowTarget>,
    ) -> Result<GpuSwapchain, GraphicsError> {
        Ok(GpuSwapchain::Dummy(DummySwapchain::new(
            Arc::clone(&self.shared),
            desc,
        )?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferUsage, TextureFormat, TextureUsage};

    #[test]
    fn test_host_visible_write_and_read() {
        let backend = DummyBackend::new().unwrap();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(BufferUsage::UploadBuffer, 16, 4))
            .unwrap();
        buffer.write(4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(buffer.read(4, 4).unwrap(), vec![1, 2, 3, 4]);
        assert!(buffer.write(14, &[0; 4]).is_err());
    }

    #[test]
    fn test_device_local_not_mappable() {
        let backend = DummyBackend::new().unwrap();
        let texture = backend
            .create_texture(&TextureDescriptor::new_2d(
                4,
                4,
                TextureFormat::Rgba8Unorm,
                TextureUsage::RenderTarget,
            ))
            .unwrap();
        assert!(texture.write(0, &[0; 4]).is_err());
        assert_eq!(
            backend.resource_state(texture.handle()),
            Some(ResourceState::ShaderResource)
        );
    }

    #[test]
    fn test_dropped_resources_are_forgotten() {
        let backend = DummyBackend::new().unwrap();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(BufferUsage::StructuredBuffer, 64, 16))
            .unwrap();
        assert_eq!(backend.live_resources(), 1);
        drop(buffer);
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    fn test_wrong_heap_type_rejected() {
        let backend = DummyBackend::new().unwrap();
        let heap = backend
            .create_descriptor_heap(DescriptorHeapType::Rtv, 4)
            .unwrap();
        let texture = backend
            .create_texture(&TextureDescriptor::new_2d(
                4,
                4,
                TextureFormat::Rgba8Unorm,
                TextureUsage::RenderTarget,
            ))
            .unwrap();
        let srv = ViewDescriptor::ShaderResource {
            format: TextureFormat::Rgba8Unorm,
            dimension: crate::types::ViewDimension::Texture2d,
            most_detailed_mip: 0,
            mip_count: 1,
        };
        assert!(heap.write_view(0, &texture, &srv).is_err());
        let rtv = ViewDescriptor::RenderTarget {
            format: TextureFormat::Rgba8Unorm,
            mip_slice: 0,
        };
        heap.write_view(0, &texture, &rtv).unwrap();
        assert!(heap.write_view(4, &texture, &rtv).is_err());
        assert_eq!(
            backend.descriptor_target(CpuDescriptorHandle::new(heap.id(), 0)),
            Some(dummy_resource_id(&texture.handle()).unwrap())
        );
    }

    #[test]
    fn test_empty_shader_rejected() {
        let backend = DummyBackend::new().unwrap();
        let shader = crate::types::ShaderBinary::new("empty_cs", Vec::<u8>::new());
        let err = backend
            .create_compute_pipeline(&ComputePipelineDescriptor::new(shader))
            .unwrap_err();
        assert!(matches!(err, GraphicsError::PipelineCreationFailed(_)));
    }
}
