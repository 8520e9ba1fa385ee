//! The graphics device: frame orchestration and resource creation.
//!
//! [`Device`] owns the three command queues, the four descriptor heaps, the
//! memory allocator, the swapchain and everything that is replicated per
//! frame slot (a graphics context and the fence value of the work last
//! submitted from that slot).
//!
//! # Frame Loop
//!
//! ```text
//! begin_frame()          reset the current slot's graphics context
//!      │
//!      ▼
//! record passes          graphics_context(), barriers between passes
//!      │
//!      ▼
//! execute_graphics_context()   submit to the direct queue
//!      │
//!      ▼
//! present()              back buffer index advances
//!      │
//!      ▼
//! end_frame()            signal, remember the value for this slot, move to
//!                        the new back buffer's slot and wait for its value
//! ```
//!
//! With `frames_in_flight = 2` the CPU records frame N+1 while the GPU
//! executes frame N:
//!
//! ```text
//! Slot 0: [record F0][submit] ........ [wait F0][record F2][submit] ...
//! Slot 1:            [record F1][submit] ........ [wait F1][record F3] ...
//! ```
//!
//! A slot's resources (graphics context, per-slot constant buffers) are never
//! touched by the CPU until the fence value recorded for the slot has
//! completed. In debug builds [`Device::begin_frame`] asserts this.
//!
//! # Resource Creation
//!
//! Resource factories hold the device's recursive resource lock for the
//! duration of the call, which keeps the allocator and descriptor heap
//! cursors consistent. Uploads go through the copy queue and are complete
//! when the factory returns.
//!
//! ```ignore
//! let mut device = Device::new(config, shaders, Some(&window))?;
//! loop {
//!     device.begin_frame()?;
//!     renderer.render(&device, &mut scene, &mut editor)?;
//!     device.execute_graphics_context()?;
//!     device.present()?;
//!     device.end_frame()?;
//! }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, ReentrantMutex};

use crate::adapter::AdapterInfo;
use crate::backend::dummy::DummyBackend;
use crate::backend::{
    BackendCapabilities, BindingTier, GpuBackend, GpuResource, GpuSwapchain, QueueKind,
    SwapchainDescriptor, TextureRegion, WindowTarget, create_backend,
};
use crate::config::DeviceConfig;
use crate::context::{ComputeContext, Context, CopyContext, GraphicsContext};
use crate::descriptor::{CpuDescriptorHandle, DescriptorHandle, DescriptorHeap};
use crate::error::GraphicsError;
use crate::memory::{Allocation, MemoryAllocator, MemoryReport};
use crate::mipmap::MipMapGenerator;
use crate::profiling::{profile_function, profile_plot, profile_scope};
use crate::queue::CommandQueue;
use crate::resources::{
    Buffer, PipelineKind, PipelineState, Sampler, Texture, TextureViews,
};
use crate::shader::ShaderSource;
use crate::types::{
    BufferDescriptor, BufferUsage, ComputePipelineDescriptor, DescriptorHeapType, Extent2d,
    GraphicsPipelineDescriptor, MemoryLocation, ResourceState, SamplerDescriptor, ShaderBinary,
    TextureDescriptor, TextureFormat, TextureUsage, ViewDescriptor, ViewDimension,
};

/// Format of the swapchain back buffers.
pub const BACKBUFFER_FORMAT: TextureFormat = TextureFormat::Bgra8Unorm;

/// Constant buffer views must cover a multiple of this many bytes.
const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// The graphics device.
///
/// Created once and passed by reference; every context, pass and resource
/// built from it must be dropped before it.
pub struct Device {
    config: DeviceConfig,
    backend: Arc<dyn GpuBackend>,
    adapter: AdapterInfo,
    capabilities: BackendCapabilities,
    shaders: Arc<dyn ShaderSource>,

    direct_queue: CommandQueue,
    compute_queue: CommandQueue,
    copy_queue: CommandQueue,

    cbv_srv_uav_heap: DescriptorHeap,
    rtv_heap: DescriptorHeap,
    dsv_heap: DescriptorHeap,
    sampler_heap: DescriptorHeap,

    allocator: MemoryAllocator,
    resource_lock: ReentrantMutex<()>,

    swapchain: GpuSwapchain,
    backbuffer_rtvs: Vec<CpuDescriptorHandle>,

    frame_fence_values: Vec<u64>,
    graphics_contexts: Vec<Mutex<GraphicsContext>>,
    compute_contexts: Mutex<VecDeque<ComputeContext>>,
    copy_contexts: Mutex<VecDeque<CopyContext>>,
    current_frame_index: usize,
    frame_count: u64,

    mipmap: MipMapGenerator,
}

impl Device {
    /// Create the backend `config` asks for and a device on top of it.
    pub fn new(
        config: DeviceConfig,
        shaders: Arc<dyn ShaderSource>,
        window: Option<&dyn WindowTarget>,
    ) -> Result<Self, GraphicsError> {
        config.validate()?;
        let backend = create_backend(&config, window)?;
        Self::with_backend(config, backend, shaders, window)
    }

    /// Create a device on an existing backend.
    pub fn with_backend(
        config: DeviceConfig,
        backend: Arc<dyn GpuBackend>,
        shaders: Arc<dyn ShaderSource>,
        window: Option<&dyn WindowTarget>,
    ) -> Result<Self, GraphicsError> {
        profile_function!();
        config.validate()?;

        let adapter = backend.adapter().clone();
        log::info!(
            "Creating device on {} ({}, {:?}, {} MiB)",
            adapter.name,
            backend.name(),
            adapter.adapter_type,
            adapter.dedicated_video_memory / (1024 * 1024)
        );

        let capabilities = Self::resolve_capabilities(&config, backend.capabilities());

        let direct_queue = CommandQueue::new(&*backend, QueueKind::Direct)?;
        let compute_queue = CommandQueue::new(&*backend, QueueKind::Compute)?;
        let copy_queue = CommandQueue::new(&*backend, QueueKind::Copy)?;

        let heaps = config.heaps;
        let cbv_srv_uav_heap =
            DescriptorHeap::new(&*backend, DescriptorHeapType::CbvSrvUav, heaps.cbv_srv_uav)?;
        let rtv_heap = DescriptorHeap::new(&*backend, DescriptorHeapType::Rtv, heaps.rtv)?;
        let dsv_heap = DescriptorHeap::new(&*backend, DescriptorHeapType::Dsv, heaps.dsv)?;
        let sampler_heap =
            DescriptorHeap::new(&*backend, DescriptorHeapType::Sampler, heaps.sampler)?;

        let frames = config.frames_in_flight;
        let swapchain = backend.create_swapchain(
            &SwapchainDescriptor {
                extent: Extent2d::new(config.width, config.height),
                buffer_count: frames as u32,
                format: BACKBUFFER_FORMAT,
                vsync: config.vsync,
            },
            window,
        )?;

        let graphics_contexts = (0..frames)
            .map(|_| GraphicsContext::new(&*backend).map(Mutex::new))
            .collect::<Result<Vec<_>, _>>()?;

        let mipmap = MipMapGenerator::new(&*backend, &*shaders)?;
        let allocator = MemoryAllocator::new(Arc::clone(&backend));
        let current_frame_index = swapchain.current_index();

        let mut device = Self {
            config,
            backend,
            adapter,
            capabilities,
            shaders,
            direct_queue,
            compute_queue,
            copy_queue,
            cbv_srv_uav_heap,
            rtv_heap,
            dsv_heap,
            sampler_heap,
            allocator,
            resource_lock: ReentrantMutex::new(()),
            swapchain,
            backbuffer_rtvs: Vec::with_capacity(frames),
            frame_fence_values: vec![0; frames],
            graphics_contexts,
            compute_contexts: Mutex::new(VecDeque::new()),
            copy_contexts: Mutex::new(VecDeque::new()),
            current_frame_index,
            frame_count: 0,
            mipmap,
        };

        // Back buffer RTVs own the first `frames_in_flight` RTV slots.
        device.rtv_heap.allocate(frames as u32)?;
        device.create_backbuffer_rtvs()?;

        log::info!(
            "Device ready: {frames} frames in flight, {}x{}, vsync {}",
            device.config.width,
            device.config.height,
            device.config.vsync
        );
        Ok(device)
    }

    fn resolve_capabilities(
        config: &DeviceConfig,
        reported: BackendCapabilities,
    ) -> BackendCapabilities {
        let mut capabilities = reported;
        if config.allow_tearing && !reported.tearing_supported {
            log::warn!("Tearing is not supported by the display; presenting without tearing");
        }
        if reported.binding_tier < BindingTier::Tier1_1 {
            log::warn!(
                "Resource binding tier 1.1 is not supported; falling back to tier 1.0 \
                 (descriptors are written before recording)"
            );
            capabilities.binding_tier = BindingTier::Tier1_0;
        }
        capabilities
    }

    // ========================================================================
    // Frame loop
    // ========================================================================

    /// Start recording the current frame slot.
    ///
    /// Resets the slot's graphics context. The slot's previous work must have
    /// completed, which [`end_frame`](Self::end_frame) guarantees.
    pub fn begin_frame(&mut self) -> Result<(), GraphicsError> {
        profile_function!();
        let slot = self.current_frame_index;
        debug_assert!(
            self.direct_queue
                .is_fence_complete(self.frame_fence_values[slot]),
            "frame slot {slot} reused while fence value {} is still pending",
            self.frame_fence_values[slot]
        );
        log::trace!("Begin frame {} (slot {slot})", self.frame_count);
        self.graphics_contexts[slot].get_mut().reset()
    }

    /// The current slot's graphics context.
    pub fn graphics_context(&self) -> MutexGuard<'_, GraphicsContext> {
        self.graphics_contexts[self.current_frame_index].lock()
    }

    /// Close the current slot's graphics context and submit it to the direct
    /// queue.
    pub fn execute_graphics_context(&self) -> Result<(), GraphicsError> {
        profile_scope!("execute_graphics_context");
        let mut ctx = self.graphics_context();
        self.direct_queue.execute_contexts(&mut [&mut *ctx])
    }

    /// Present the current back buffer.
    ///
    /// Sync interval 1 with v-sync; otherwise interval 0, with the tearing
    /// flag when it is enabled and supported.
    pub fn present(&mut self) -> Result<(), GraphicsError> {
        profile_function!();
        let (sync_interval, allow_tearing) = self.present_parameters();
        log::trace!(
            "Present back buffer {} (interval {sync_interval}, tearing {allow_tearing})",
            self.swapchain.current_index()
        );
        self.swapchain
            .present(self.direct_queue.raw(), sync_interval, allow_tearing)
    }

    fn present_parameters(&self) -> (u32, bool) {
        if self.config.vsync {
            (1, false)
        } else {
            (
                0,
                self.config.allow_tearing && self.capabilities.tearing_supported,
            )
        }
    }

    /// Finish the frame: signal the direct queue, move to the next slot and
    /// wait until that slot's previous work has completed.
    pub fn end_frame(&mut self) -> Result<(), GraphicsError> {
        profile_function!();
        let value = self.direct_queue.signal()?;
        self.frame_fence_values[self.current_frame_index] = value;

        self.current_frame_index = self.swapchain.current_index();
        let pending = self.frame_fence_values[self.current_frame_index];
        log::trace!(
            "End frame {} (signaled {value}, next slot {} waits for {pending})",
            self.frame_count,
            self.current_frame_index
        );
        self.direct_queue.wait_for_fence_value(pending)?;

        self.frame_count += 1;
        profile_plot!(
            "frames in flight",
            value - self.direct_queue.completed_fence_value()
        );
        crate::profiling::frame_mark!();
        Ok(())
    }

    /// Recreate the swapchain back buffers at a new size.
    ///
    /// Drains the direct and copy queues first; taking `&mut self` guarantees
    /// no context is mid-recording. A zero-sized request (minimized window)
    /// is ignored.
    pub fn resize_window(&mut self, width: u32, height: u32) -> Result<(), GraphicsError> {
        profile_function!();
        let extent = Extent2d::new(width, height);
        if extent.is_empty() {
            log::debug!("Ignoring resize to {width}x{height}");
            return Ok(());
        }
        log::debug!("Resizing swapchain to {width}x{height}");

        self.direct_queue.flush()?;
        self.copy_queue.flush()?;

        let completed = self.direct_queue.completed_fence_value();
        self.frame_fence_values.fill(completed);

        self.swapchain.resize(extent)?;
        self.current_frame_index = self.swapchain.current_index();
        self.config.width = width;
        self.config.height = height;
        self.create_backbuffer_rtvs()
    }

    /// Write one RTV per back buffer, from the start of the RTV heap.
    fn create_backbuffer_rtvs(&mut self) -> Result<(), GraphicsError> {
        self.backbuffer_rtvs.clear();
        let mut handle = self.rtv_heap.descriptor_handle_from_start();
        for index in 0..self.swapchain.buffer_count() {
            let backbuffer = self.swapchain.backbuffer(index).ok_or_else(|| {
                GraphicsError::SwapchainFailed(format!("back buffer {index} is missing"))
            })?;
            self.rtv_heap.write_view(
                &handle,
                backbuffer,
                &ViewDescriptor::RenderTarget {
                    format: self.swapchain.format(),
                    mip_slice: 0,
                },
            )?;
            self.backbuffer_rtvs.push(handle.cpu);
            self.rtv_heap.offset_descriptor(&mut handle, 1)?;
        }
        Ok(())
    }

    /// Drain all three queues.
    pub fn wait_idle(&self) -> Result<(), GraphicsError> {
        self.direct_queue.flush()?;
        self.compute_queue.flush()?;
        self.copy_queue.flush()?;
        Ok(())
    }

    // ========================================================================
    // Pooled contexts
    // ========================================================================

    /// Take a reset compute context from the pool, creating one if it is empty.
    pub fn get_compute_context(&self) -> Result<ComputeContext, GraphicsError> {
        let pooled = self.compute_contexts.lock().pop_front();
        let mut ctx = match pooled {
            Some(ctx) => ctx,
            None => {
                log::debug!("Creating compute context");
                ComputeContext::new(&*self.backend)?
            }
        };
        ctx.reset()?;
        Ok(ctx)
    }

    /// Submit a compute context, wait for it and return it to the pool.
    pub fn execute_and_flush_compute_context(
        &self,
        mut ctx: ComputeContext,
    ) -> Result<(), GraphicsError> {
        profile_scope!("execute_and_flush_compute_context");
        self.compute_queue.execute_contexts(&mut [&mut ctx])?;
        self.compute_queue.flush()?;
        self.compute_contexts.lock().push_back(ctx);
        Ok(())
    }

    /// Take a reset copy context from the pool, creating one if it is empty.
    pub fn get_copy_context(&self) -> Result<CopyContext, GraphicsError> {
        let pooled = self.copy_contexts.lock().pop_front();
        let mut ctx = match pooled {
            Some(ctx) => ctx,
            None => {
                log::debug!("Creating copy context");
                CopyContext::new(&*self.backend)?
            }
        };
        ctx.reset()?;
        Ok(ctx)
    }

    /// Submit a copy context, wait for it and return it to the pool.
    pub fn execute_and_flush_copy_context(&self, mut ctx: CopyContext) -> Result<(), GraphicsError> {
        profile_scope!("execute_and_flush_copy_context");
        self.copy_queue.execute_contexts(&mut [&mut ctx])?;
        self.copy_queue.flush()?;
        self.copy_contexts.lock().push_back(ctx);
        Ok(())
    }

    pub fn compute_context_pool_len(&self) -> usize {
        self.compute_contexts.lock().len()
    }

    pub fn copy_context_pool_len(&self) -> usize {
        self.copy_contexts.lock().len()
    }

    // ========================================================================
    // Resource creation
    // ========================================================================

    pub fn load_shader(&self, name: &str) -> Result<ShaderBinary, GraphicsError> {
        self.shaders.load(name)
    }

    /// Create a texture, optionally filled with `data` (tightly packed mip 0
    /// for every layer).
    ///
    /// Builds the views the usage calls for and, for textures created from
    /// data, generates the mip chain. The texture is ready to use when this
    /// returns.
    pub fn create_texture(
        &self,
        desc: &TextureDescriptor,
        data: Option<&[u8]>,
    ) -> Result<Texture, GraphicsError> {
        profile_function!();
        Self::check_texture_descriptor(desc)?;
        if let Some(data) = data
            && data.len() as u64 != desc.mip0_size()
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture {:?} expects {} bytes of mip 0 data, got {}",
                desc.label,
                desc.mip0_size(),
                data.len()
            )));
        }

        let _guard = self.resource_lock.lock();
        // Uploads need a state the copy queue can promote from.
        let resting = desc.resolved_initial_state();
        let (allocation, current) = match data {
            Some(data) => {
                let upload_desc = desc.clone().with_initial_state(ResourceState::Common);
                let allocation = self.allocator.allocate_texture(&upload_desc)?;
                self.upload_texture(&allocation, desc, data)?;
                (allocation, ResourceState::Common)
            }
            None => (self.allocator.allocate_texture(desc)?, resting),
        };
        let views = self.create_texture_views(allocation.resource(), desc, None)?;
        let texture = Texture::new(allocation, desc.clone(), views);

        if desc.usage.is_from_data() {
            self.mipmap.generate(self, &texture, current)?;
        } else if current != resting {
            self.transition_on_compute_queue(&texture, current, resting)?;
        }
        Ok(texture)
    }

    fn transition_on_compute_queue(
        &self,
        texture: &Texture,
        before: ResourceState,
        after: ResourceState,
    ) -> Result<(), GraphicsError> {
        let mut ctx = self.get_compute_context()?;
        ctx.add_resource_barrier(texture.handle(), before, after);
        ctx.execute_resource_barriers();
        self.execute_and_flush_compute_context(ctx)
    }

    fn check_texture_descriptor(desc: &TextureDescriptor) -> Result<(), GraphicsError> {
        let depth_usage = desc.usage == TextureUsage::DepthStencil;
        if depth_usage && desc.format == TextureFormat::Depth24PlusStencil8 {
            return Err(GraphicsError::Unsupported(format!(
                "{:?} depth textures; use Depth32Float",
                desc.format
            )));
        }
        if depth_usage != desc.format.is_depth_stencil() {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture {:?}: {:?} usage with {:?} format",
                desc.label, desc.usage, desc.format
            )));
        }
        if desc.usage == TextureUsage::CubeMap && desc.array_layers != 6 {
            return Err(GraphicsError::InvalidParameter(format!(
                "cube map {:?} has {} layers",
                desc.label, desc.array_layers
            )));
        }
        if desc.mip_levels == 0 || desc.mip_levels > TextureDescriptor::full_mip_chain(desc.width, desc.height) {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture {:?} ({}x{}) cannot have {} mips",
                desc.label, desc.width, desc.height, desc.mip_levels
            )));
        }
        Ok(())
    }

    /// Copy queue round trip: staging buffer -> texture, flushed before the
    /// staging buffer is released.
    fn upload_texture(
        &self,
        allocation: &Allocation,
        desc: &TextureDescriptor,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let staging = self.allocator.allocate_buffer(
            &BufferDescriptor::new(BufferUsage::UploadBuffer, data.len() as u64, 0)
                .with_label("texture upload"),
        )?;
        staging.resource().write(0, data)?;

        let mut ctx = self.get_copy_context()?;
        ctx.copy_buffer_to_texture(
            staging.resource(),
            allocation.resource(),
            TextureRegion {
                mip_level: 0,
                extent: desc.mip_extent(0),
                array_layers: desc.array_layers,
                format: desc.format,
            },
        );
        self.execute_and_flush_copy_context(ctx)
    }

    /// Allocate (or reuse) descriptor slots and write the texture's views.
    fn create_texture_views(
        &self,
        resource: &GpuResource,
        desc: &TextureDescriptor,
        reuse: Option<&TextureViews>,
    ) -> Result<TextureViews, GraphicsError> {
        let mips = desc.mip_levels;
        let uav_format = desc
            .format
            .uav_format()
            .filter(|_| desc.usage.allows_unordered_access());
        let per_mip_srvs = desc.usage == TextureUsage::UavTexture;

        // Per-mip views are laid out for `mip_capacity` mips, so their slots
        // stay put when a resize changes the chain length.
        let reusable = reuse.filter(|views| mips <= views.mip_capacity);
        let (mut handle, mip_capacity) = match reusable {
            Some(views) => (
                self.cbv_srv_uav_heap.descriptor_handle_at(views.srv)?,
                views.mip_capacity,
            ),
            None => {
                let capacity = mips.max(desc.requested_mip_levels());
                let per_mip = u32::from(per_mip_srvs && capacity > 1)
                    + u32::from(uav_format.is_some());
                (
                    self.cbv_srv_uav_heap.allocate(1 + per_mip * capacity)?,
                    capacity,
                )
            }
        };

        let dimension = if desc.usage == TextureUsage::CubeMap || desc.is_cube() {
            ViewDimension::TextureCube
        } else if desc.array_layers > 1 {
            ViewDimension::Texture2dArray
        } else {
            ViewDimension::Texture2d
        };
        let srv_format = desc.format.srv_format();

        let heap = &self.cbv_srv_uav_heap;
        let write = |handle: &mut DescriptorHandle, view: &ViewDescriptor| {
            heap.write_view(handle, resource, view)?;
            let index = handle.index;
            heap.offset_descriptor(handle, 1)?;
            Ok::<u32, GraphicsError>(index)
        };

        let mut views = TextureViews {
            srv: handle.index,
            mip_capacity,
            ..Default::default()
        };
        write(
            &mut handle,
            &ViewDescriptor::ShaderResource {
                format: srv_format,
                dimension,
                most_detailed_mip: 0,
                mip_count: mips,
            },
        )?;

        // Slots past the current chain repeat its last mip.
        if per_mip_srvs && mip_capacity > 1 {
            for mip in 0..mip_capacity {
                let index = write(
                    &mut handle,
                    &ViewDescriptor::ShaderResource {
                        format: srv_format,
                        dimension,
                        most_detailed_mip: mip.min(mips - 1),
                        mip_count: 1,
                    },
                )?;
                if mips > 1 && mip < mips {
                    views.mip_srvs.push(index);
                }
            }
        }

        if let Some(format) = uav_format {
            for mip in 0..mip_capacity {
                let index = write(
                    &mut handle,
                    &ViewDescriptor::UnorderedAccess {
                        format,
                        mip_slice: mip.min(mips - 1),
                    },
                )?;
                if mip < mips {
                    views.uavs.push(index);
                }
            }
        }

        if desc.usage == TextureUsage::RenderTarget {
            let rtv = self.reuse_or_allocate(
                &self.rtv_heap,
                reuse.and_then(|views| views.rtv),
            )?;
            self.rtv_heap.write_view(
                &rtv,
                resource,
                &ViewDescriptor::RenderTarget {
                    format: desc.format,
                    mip_slice: 0,
                },
            )?;
            views.rtv = Some(rtv.cpu);
        }

        if desc.usage == TextureUsage::DepthStencil {
            let dsv = self.reuse_or_allocate(
                &self.dsv_heap,
                reuse.and_then(|views| views.dsv),
            )?;
            self.dsv_heap.write_view(
                &dsv,
                resource,
                &ViewDescriptor::DepthStencil {
                    format: desc.format,
                },
            )?;
            views.dsv = Some(dsv.cpu);
        }

        Ok(views)
    }

    fn reuse_or_allocate(
        &self,
        heap: &DescriptorHeap,
        existing: Option<CpuDescriptorHandle>,
    ) -> Result<DescriptorHandle, GraphicsError> {
        match existing {
            Some(cpu) => heap.descriptor_handle_at(cpu.index()),
            None => heap.allocate(1),
        }
    }

    /// Recreate a texture's allocation at a new size, rewriting its views in
    /// the same descriptor slots while the mip chain fits the slots reserved
    /// at creation.
    ///
    /// Drains the direct and compute queues before the old allocation is
    /// released. The new allocation starts in the usage's initial state.
    pub fn resize_texture(
        &self,
        texture: &mut Texture,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError> {
        profile_function!();
        if texture.width() == width && texture.height() == height {
            return Ok(());
        }
        let mut desc = texture.descriptor().clone();
        let full_chain = desc.reserved_mip_levels.is_none()
            && desc.mip_levels == TextureDescriptor::full_mip_chain(desc.width, desc.height);
        let requested = desc.requested_mip_levels();
        desc.width = width;
        desc.height = height;
        desc.mip_levels = if full_chain {
            TextureDescriptor::full_mip_chain(width, height)
        } else {
            requested.min(TextureDescriptor::full_mip_chain(width, height))
        };
        Self::check_texture_descriptor(&desc)?;

        self.direct_queue.flush()?;
        self.compute_queue.flush()?;

        let _guard = self.resource_lock.lock();
        let allocation = self.allocator.allocate_texture(&desc)?;
        let views = self.create_texture_views(allocation.resource(), &desc, Some(texture.views()))?;
        log::debug!(
            "Resized texture {:?} to {width}x{height} (srv {} -> {})",
            desc.label,
            texture.srv_index(),
            views.srv
        );
        let old = texture.replace(allocation, desc, views);
        drop(old);
        Ok(())
    }

    /// Create a buffer, optionally filled with `data`.
    ///
    /// CPU-visible buffers are written directly, device-local ones through
    /// the copy queue. Structured buffers get an SRV and constant buffers a
    /// CBV; constant buffer sizes are rounded up to 256 bytes.
    pub fn create_buffer(
        &self,
        desc: &BufferDescriptor,
        data: Option<&[u8]>,
    ) -> Result<Buffer, GraphicsError> {
        profile_function!();
        let mut desc = desc.clone();
        if desc.usage == BufferUsage::ConstantBuffer {
            desc.size = desc.size.next_multiple_of(CONSTANT_BUFFER_ALIGNMENT);
        }
        if desc.usage == BufferUsage::StructuredBuffer && desc.stride == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "structured buffer {:?} needs a stride",
                desc.label
            )));
        }
        if let Some(data) = data
            && data.len() as u64 > desc.size
        {
            return Err(GraphicsError::InvalidParameter(format!(
                "{} bytes do not fit buffer {:?} of {} bytes",
                data.len(),
                desc.label,
                desc.size
            )));
        }

        let _guard = self.resource_lock.lock();
        let allocation = self.allocator.allocate_buffer(&desc)?;

        if let Some(data) = data.filter(|data| !data.is_empty()) {
            if allocation.location() == MemoryLocation::GpuOnly {
                self.upload_buffer(&allocation, data)?;
            } else {
                allocation.resource().write(0, data)?;
            }
        }

        let (srv, cbv) = match desc.usage {
            BufferUsage::StructuredBuffer => {
                let handle = self.cbv_srv_uav_heap.allocate(1)?;
                self.cbv_srv_uav_heap.write_view(
                    &handle,
                    allocation.resource(),
                    &ViewDescriptor::StructuredBuffer {
                        stride: desc.stride,
                        element_count: desc.element_count(),
                    },
                )?;
                (Some(handle.index), None)
            }
            BufferUsage::ConstantBuffer => {
                let handle = self.cbv_srv_uav_heap.allocate(1)?;
                self.cbv_srv_uav_heap.write_view(
                    &handle,
                    allocation.resource(),
                    &ViewDescriptor::ConstantBuffer { size: desc.size },
                )?;
                (None, Some(handle.index))
            }
            BufferUsage::IndexBuffer | BufferUsage::UploadBuffer | BufferUsage::ReadbackBuffer => {
                (None, None)
            }
        };
        Ok(Buffer::new(allocation, desc, srv, cbv))
    }

    fn upload_buffer(&self, allocation: &Allocation, data: &[u8]) -> Result<(), GraphicsError> {
        let staging = self.allocator.allocate_buffer(
            &BufferDescriptor::new(BufferUsage::UploadBuffer, data.len() as u64, 0)
                .with_label("buffer upload"),
        )?;
        staging.resource().write(0, data)?;
        let mut ctx = self.get_copy_context()?;
        ctx.copy_buffer(staging.resource(), allocation.resource(), data.len() as u64);
        self.execute_and_flush_copy_context(ctx)
    }

    /// Copy a buffer's contents back to the CPU.
    pub fn read_back_buffer(&self, buffer: &Buffer) -> Result<Vec<u8>, GraphicsError> {
        if buffer.location() != MemoryLocation::GpuOnly {
            return buffer.read(0, buffer.size());
        }
        let readback = self.allocator.allocate_buffer(
            &BufferDescriptor::new(BufferUsage::ReadbackBuffer, buffer.size(), 0)
                .with_label("buffer readback"),
        )?;
        let mut ctx = self.get_copy_context()?;
        ctx.copy_buffer(buffer.resource(), readback.resource(), buffer.size());
        self.execute_and_flush_copy_context(ctx)?;
        readback.resource().read(0, buffer.size())
    }

    /// Copy mip 0 of a texture back to the CPU.
    ///
    /// The texture must be resting in `ShaderResource`. The copy runs on the
    /// compute queue, which can transition it to `CopySource` and back.
    pub fn read_back_texture(&self, texture: &Texture) -> Result<Vec<u8>, GraphicsError> {
        let desc = texture.descriptor();
        let region = TextureRegion {
            mip_level: 0,
            extent: desc.mip_extent(0),
            array_layers: desc.array_layers,
            format: desc.format,
        };
        let readback = self.allocator.allocate_buffer(
            &BufferDescriptor::new(BufferUsage::ReadbackBuffer, region.byte_size(), 0)
                .with_label("texture readback"),
        )?;

        let mut ctx = self.get_compute_context()?;
        ctx.add_resource_barrier(
            texture.handle(),
            ResourceState::ShaderResource,
            ResourceState::CopySource,
        );
        ctx.execute_resource_barriers();
        ctx.command_list_mut()
            .copy_texture_to_buffer(texture.resource(), readback.resource(), region);
        ctx.add_resource_barrier(
            texture.handle(),
            ResourceState::CopySource,
            ResourceState::ShaderResource,
        );
        ctx.execute_resource_barriers();
        self.execute_and_flush_compute_context(ctx)?;
        readback.resource().read(0, region.byte_size())
    }

    /// Write a sampler into the sampler heap.
    pub fn create_sampler(&self, desc: &SamplerDescriptor) -> Result<Sampler, GraphicsError> {
        let _guard = self.resource_lock.lock();
        let handle = self.sampler_heap.allocate(1)?;
        self.sampler_heap.write_sampler(&handle, desc)?;
        log::debug!("Created sampler {:?} at {}", desc.label, handle.index);
        Ok(Sampler::new(handle.index, desc.clone()))
    }

    pub fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDescriptor,
    ) -> Result<PipelineState, GraphicsError> {
        let pipeline = self.backend.create_graphics_pipeline(desc)?;
        log::debug!("Created graphics pipeline {:?}", desc.label);
        Ok(PipelineState::new(
            pipeline,
            PipelineKind::Graphics,
            desc.label.clone(),
        ))
    }

    pub fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor,
    ) -> Result<PipelineState, GraphicsError> {
        let pipeline = self.backend.create_compute_pipeline(desc)?;
        log::debug!("Created compute pipeline {:?}", desc.label);
        Ok(PipelineState::new(
            pipeline,
            PipelineKind::Compute,
            desc.label.clone(),
        ))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn GpuBackend> {
        &self.backend
    }

    /// The dummy backend, when the device runs on it.
    pub fn dummy_backend(&self) -> Option<&DummyBackend> {
        self.backend.as_any().downcast_ref::<DummyBackend>()
    }

    pub fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    /// Capabilities after fallbacks.
    pub fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frame_fence_values.len()
    }

    /// Slot currently being recorded; equals the back buffer index.
    pub fn current_frame_index(&self) -> usize {
        self.current_frame_index
    }

    /// Frames completed with [`end_frame`](Self::end_frame).
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Fence value last recorded for a slot.
    pub fn frame_fence_value(&self, slot: usize) -> Option<u64> {
        self.frame_fence_values.get(slot).copied()
    }

    pub fn direct_queue(&self) -> &CommandQueue {
        &self.direct_queue
    }

    pub fn compute_queue(&self) -> &CommandQueue {
        &self.compute_queue
    }

    pub fn copy_queue(&self) -> &CommandQueue {
        &self.copy_queue
    }

    pub fn cbv_srv_uav_heap(&self) -> &DescriptorHeap {
        &self.cbv_srv_uav_heap
    }

    pub fn rtv_heap(&self) -> &DescriptorHeap {
        &self.rtv_heap
    }

    pub fn dsv_heap(&self) -> &DescriptorHeap {
        &self.dsv_heap
    }

    pub fn sampler_heap(&self) -> &DescriptorHeap {
        &self.sampler_heap
    }

    pub fn swapchain(&self) -> &GpuSwapchain {
        &self.swapchain
    }

    pub fn backbuffer_extent(&self) -> Extent2d {
        self.swapchain.extent()
    }

    pub fn backbuffer_format(&self) -> TextureFormat {
        self.swapchain.format()
    }

    /// The back buffer the current frame renders into.
    pub fn current_backbuffer(&self) -> Result<&GpuResource, GraphicsError> {
        let index = self.swapchain.current_index();
        self.swapchain
            .backbuffer(index)
            .ok_or_else(|| GraphicsError::SwapchainFailed(format!("back buffer {index} is missing")))
    }

    pub fn current_backbuffer_rtv(&self) -> Result<CpuDescriptorHandle, GraphicsError> {
        let index = self.swapchain.current_index();
        self.backbuffer_rtvs.get(index).copied().ok_or_else(|| {
            GraphicsError::SwapchainFailed(format!("back buffer {index} has no RTV"))
        })
    }

    /// RTVs of all back buffers, in swapchain order.
    pub fn backbuffer_rtvs(&self) -> &[CpuDescriptorHandle] {
        &self.backbuffer_rtvs
    }

    pub fn memory_report(&self) -> MemoryReport {
        self.allocator.report()
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("adapter", &self.adapter.name)
            .field("backend", &self.backend.name())
            .field("frames_in_flight", &self.frames_in_flight())
            .field("current_frame_index", &self.current_frame_index)
            .field("frame_count", &self.frame_count)
            .finish_non_exhaustive()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        log::debug!("Destroying device after {} frames", self.frame_count);
        if let Err(e) = self.wait_idle() {
            log::error!("Failed to drain queues during teardown: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::InMemoryShaders;

    fn device(frames: usize) -> Device {
        let config = DeviceConfig::new()
            .with_backend(crate::config::BackendKind::Dummy)
            .with_frames_in_flight(frames)
            .with_validation(true)
            .with_size(64, 64);
        Device::new(config, Arc::new(InMemoryShaders::placeholder()), None).unwrap()
    }

    #[test]
    fn test_backbuffer_rtvs_use_first_slots() {
        let device = device(3);
        let indices: Vec<u32> = device.backbuffer_rtvs().iter().map(|h| h.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(device.rtv_heap().current_descriptor_index(), 3);
    }

    #[test]
    fn test_present_parameters() {
        let mut device = device(2);
        assert_eq!(device.present_parameters(), (1, false));
        device.config.vsync = false;
        assert_eq!(device.present_parameters(), (0, false));
        device.config.allow_tearing = true;
        assert_eq!(device.present_parameters(), (0, true));
    }

    #[test]
    fn test_depth24_rejected() {
        let device = device(2);
        let desc = TextureDescriptor::new_2d(
            16,
            16,
            TextureFormat::Depth24PlusStencil8,
            TextureUsage::DepthStencil,
        );
        let err = device.create_texture(&desc, None).unwrap_err();
        assert!(matches!(err, GraphicsError::Unsupported(_)));
    }

    #[test]
    fn test_depth_format_requires_depth_usage() {
        let device = device(2);
        let desc = TextureDescriptor::new_2d(
            16,
            16,
            TextureFormat::Depth32Float,
            TextureUsage::RenderTarget,
        );
        assert!(device.create_texture(&desc, None).is_err());
    }

    #[test]
    fn test_constant_buffer_rounded_up() {
        let device = device(2);
        let buffer = device
            .create_buffer(&BufferDescriptor::new(BufferUsage::ConstantBuffer, 80, 0), None)
            .unwrap();
        assert_eq!(buffer.size(), 256);
        assert!(buffer.cbv_index().is_some());
    }
}
