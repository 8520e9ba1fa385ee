//! Command buffers recorded with dynamic rendering.
//!
//! Render targets are bound lazily: `set_render_targets` only records which
//! attachments to use, and the first draw after it begins a rendering scope.
//! Barriers, dispatches, copies and `close` end the scope again.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ash::vk;

use crate::backend::{
    GpuPipeline, GpuResource, GpuResourceHandle, QueueKind, ResourceBarrier, TextureRegion,
};
use crate::context::MAX_ROOT_CONSTANTS;
use crate::descriptor::CpuDescriptorHandle;
use crate::error::GraphicsError;
use crate::types::{ClearColor, IndexFormat, ResourceState, ScissorRect, Viewport};

use super::conversion;
use super::descriptor::AttachmentView;
use super::VulkanShared;
use super::resource::{RawHandle, VulkanResource, VulkanResourceHandle};

fn record_error(e: vk::Result) -> GraphicsError {
    GraphicsError::SubmissionFailed(format!("command recording: {e:?}"))
}

#[derive(Debug, Clone, Copy)]
struct BoundPipeline {
    bind_point: vk::PipelineBindPoint,
}

/// A command pool with one primary command buffer.
pub struct VulkanCommandList {
    kind: QueueKind,
    pool: vk::CommandPool,
    cmd: vk::CommandBuffer,
    closed: bool,
    /// Image states established by barriers in this list.
    image_states: HashMap<vk::Image, ResourceState>,
    color_targets: Vec<AttachmentView>,
    depth_target: Option<AttachmentView>,
    rendering: bool,
    pipeline: Option<BoundPipeline>,
    /// Set after a dispatch so the next one waits for its writes.
    pending_dispatch: bool,
    shared: Arc<VulkanShared>,
}

impl VulkanCommandList {
    pub(crate) fn new(kind: QueueKind, shared: Arc<VulkanShared>) -> Result<Self, GraphicsError> {
        let device = &shared.device;
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(shared.families().family(kind));
        // SAFETY: the family exists on this device.
        let pool = unsafe { device.create_command_pool(&pool_info, None) }.map_err(|e| {
            GraphicsError::InitializationFailed(format!("failed to create command pool: {e:?}"))
        })?;
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        // SAFETY: the pool was just created.
        let cmd = match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers[0],
            Err(e) => {
                // SAFETY: the pool holds no buffers.
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(GraphicsError::InitializationFailed(format!(
                    "failed to allocate command buffer: {e:?}"
                )));
            }
        };
        Ok(Self {
            kind,
            pool,
            cmd,
            closed: true,
            image_states: HashMap::new(),
            color_targets: Vec::new(),
            depth_target: None,
            rendering: false,
            pipeline: None,
            pending_dispatch: false,
            shared,
        })
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    pub(crate) fn raw(&self) -> vk::CommandBuffer {
        self.cmd
    }

    fn device(&self) -> &ash::Device {
        &self.shared.device
    }

    fn check_recording(&self, what: &str) -> bool {
        if self.closed {
            log::error!("{what} recorded into a closed command list");
            return false;
        }
        true
    }

    fn check_queue(&self, what: &str, allowed: &[QueueKind]) -> bool {
        if !allowed.contains(&self.kind) {
            log::error!("{what} recorded on a {:?} command list", self.kind);
            return false;
        }
        self.check_recording(what)
    }

    fn attachment(&self, handle: CpuDescriptorHandle) -> Option<AttachmentView> {
        let view = self.shared.attachment(handle.heap_id(), handle.index());
        if view.is_none() {
            log::error!("attachment descriptor {handle:?} was never written");
        }
        view
    }

    /// Layout an image is in at this point of the list.
    fn current_layout(&self, image: vk::Image) -> vk::ImageLayout {
        match self.image_states.get(&image) {
            Some(ResourceState::CopyDest) => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            Some(ResourceState::CopySource) => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            Some(state) => conversion::image_layout(*state),
            None => vk::ImageLayout::GENERAL,
        }
    }

    fn ensure_rendering(&mut self) {
        if self.rendering {
            return;
        }
        let colors: Vec<vk::RenderingAttachmentInfo<'_>> = self
            .color_targets
            .iter()
            .map(|target| {
                vk::RenderingAttachmentInfo::default()
                    .image_view(target.view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::LOAD)
                    .store_op(vk::AttachmentStoreOp::STORE)
            })
            .collect();
        let depth = self.depth_target.map(|target| {
            vk::RenderingAttachmentInfo::default()
                .image_view(target.view)
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::LOAD)
                .store_op(vk::AttachmentStoreOp::STORE)
        });
        let Some(extent) = self
            .color_targets
            .first()
            .or(self.depth_target.as_ref())
            .map(|target| target.extent)
        else {
            log::error!("draw without render targets");
            return;
        };
        let mut info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: vk::Extent2D {
                    width: extent.width,
                    height: extent.height,
                },
            })
            .layer_count(1)
            .color_attachments(&colors);
        if let Some(depth) = depth.as_ref() {
            info = info.depth_attachment(depth);
        }
        // SAFETY: the attachment views are alive while their heap slots are.
        unsafe { self.device().cmd_begin_rendering(self.cmd, &info) };
        self.rendering = true;
    }

    fn end_rendering(&mut self) {
        if self.rendering {
            // SAFETY: a rendering scope is open.
            unsafe { self.device().cmd_end_rendering(self.cmd) };
            self.rendering = false;
        }
    }

    /// Run a single-attachment rendering scope that only clears.
    fn clear_attachment(&mut self, target: AttachmentView, clear: vk::ClearValue, depth: bool) {
        self.end_rendering();
        let layout = if depth {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        } else {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        };
        let attachment = vk::RenderingAttachmentInfo::default()
            .image_view(target.view)
            .image_layout(layout)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(clear);
        let colors = [attachment];
        let mut info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: vk::Extent2D {
                    width: target.extent.width,
                    height: target.extent.height,
                },
            })
            .layer_count(1);
        info = if depth {
            info.depth_attachment(&colors[0])
        } else {
            info.color_attachments(&colors)
        };
        // SAFETY: the attachment view is alive and in the layout named above.
        unsafe {
            self.device().cmd_begin_rendering(self.cmd, &info);
            self.device().cmd_end_rendering(self.cmd);
        }
    }

    pub(crate) fn reset(&mut self) -> Result<(), GraphicsError> {
        // SAFETY: the device waits for the list's fence before resetting it.
        unsafe {
            self.device()
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())
                .map_err(record_error)?;
            let begin = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device()
                .begin_command_buffer(self.cmd, &begin)
                .map_err(record_error)?;
        }
        self.closed = false;
        self.image_states.clear();
        self.color_targets.clear();
        self.depth_target = None;
        self.rendering = false;
        self.pipeline = None;
        self.pending_dispatch = false;
        Ok(())
    }

    pub(crate) fn close(&mut self) -> Result<(), GraphicsError> {
        if self.closed {
            return Err(GraphicsError::InvalidParameter(
                "command list closed twice".to_string(),
            ));
        }
        self.end_rendering();
        // SAFETY: the buffer is recording.
        unsafe { self.device().end_command_buffer(self.cmd) }.map_err(record_error)?;
        self.closed = true;
        Ok(())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn resource_barriers(&mut self, barriers: &[ResourceBarrier]) {
        if barriers.is_empty() || !self.check_recording("barrier") {
            return;
        }
        self.end_rendering();

        let mut src_stages = vk::PipelineStageFlags::empty();
        let mut dst_stages = vk::PipelineStageFlags::empty();
        let mut image_barriers = Vec::new();
        let mut buffer_barriers = Vec::new();
        for barrier in barriers {
            let Some(handle) = vulkan_handle(&barrier.resource) else {
                log::error!("barrier names a resource from another backend");
                continue;
            };
            src_stages |= conversion::stage_mask(barrier.before);
            dst_stages |= conversion::stage_mask(barrier.after);
            let src_access = conversion::clamp_access(
                conversion::access_mask(barrier.before),
                self.kind,
            );
            let dst_access =
                conversion::clamp_access(conversion::access_mask(barrier.after), self.kind);
            match handle.raw {
                RawHandle::Image { image, aspect } => {
                    image_barriers.push(
                        vk::ImageMemoryBarrier::default()
                            .old_layout(conversion::image_layout(barrier.before))
                            .new_layout(conversion::image_layout(barrier.after))
                            .src_access_mask(src_access)
                            .dst_access_mask(dst_access)
                            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                            .image(image)
                            .subresource_range(
                                vk::ImageSubresourceRange::default()
                                    .aspect_mask(aspect)
                                    .level_count(vk::REMAINING_MIP_LEVELS)
                                    .layer_count(vk::REMAINING_ARRAY_LAYERS),
                            ),
                    );
                    self.image_states.insert(image, barrier.after);
                }
                RawHandle::Buffer(buffer) => buffer_barriers.push(
                    vk::BufferMemoryBarrier::default()
                        .src_access_mask(src_access)
                        .dst_access_mask(dst_access)
                        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                        .buffer(buffer)
                        .offset(0)
                        .size(vk::WHOLE_SIZE),
                ),
            }
        }
        if image_barriers.is_empty() && buffer_barriers.is_empty() {
            return;
        }
        let src_stages =
            conversion::clamp_stages(src_stages, self.kind, vk::PipelineStageFlags::TOP_OF_PIPE);
        let dst_stages = conversion::clamp_stages(
            dst_stages,
            self.kind,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        );
        // SAFETY: the buffer is recording outside a rendering scope.
        unsafe {
            self.device().cmd_pipeline_barrier(
                self.cmd,
                src_stages,
                dst_stages,
                vk::DependencyFlags::empty(),
                &[],
                &buffer_barriers,
                &image_barriers,
            )
        };
        self.pending_dispatch = false;
    }

    pub(crate) fn set_render_targets(
        &mut self,
        rtvs: &[CpuDescriptorHandle],
        dsv: Option<CpuDescriptorHandle>,
    ) {
        if !self.check_queue("render target binding", &[QueueKind::Direct]) {
            return;
        }
        self.end_rendering();
        self.color_targets = rtvs.iter().filter_map(|h| self.attachment(*h)).collect();
        self.depth_target = dsv.and_then(|h| self.attachment(h));
    }

    pub(crate) fn clear_render_target(&mut self, rtv: CpuDescriptorHandle, color: ClearColor) {
        if !self.check_queue("render target clear", &[QueueKind::Direct]) {
            return;
        }
        if let Some(target) = self.attachment(rtv) {
            let clear = vk::ClearValue {
                color: vk::ClearColorValue { float32: color.0 },
            };
            self.clear_attachment(target, clear, false);
        }
    }

    pub(crate) fn clear_depth(&mut self, dsv: CpuDescriptorHandle, depth: f32) {
        if !self.check_queue("depth clear", &[QueueKind::Direct]) {
            return;
        }
        if let Some(target) = self.attachment(dsv) {
            let clear = vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
            };
            self.clear_attachment(target, clear, true);
        }
    }

    pub(crate) fn set_viewport(&mut self, viewport: Viewport) {
        if !self.check_queue("viewport", &[QueueKind::Direct]) {
            return;
        }
        let viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        // SAFETY: the buffer is recording.
        unsafe { self.device().cmd_set_viewport(self.cmd, 0, &[viewport]) };
    }

    pub(crate) fn set_scissor(&mut self, scissor: ScissorRect) {
        if !self.check_queue("scissor", &[QueueKind::Direct]) {
            return;
        }
        let rect = vk::Rect2D {
            offset: vk::Offset2D {
                x: scissor.x,
                y: scissor.y,
            },
            extent: vk::Extent2D {
                width: scissor.width,
                height: scissor.height,
            },
        };
        // SAFETY: the buffer is recording.
        unsafe { self.device().cmd_set_scissor(self.cmd, 0, &[rect]) };
    }

    pub(crate) fn set_pipeline(&mut self, pipeline: &GpuPipeline) {
        let GpuPipeline::Vulkan(pipeline) = pipeline else {
            log::error!("pipeline belongs to another backend");
            return;
        };
        let bind_point = pipeline.bind_point();
        let allowed: &[QueueKind] = if bind_point == vk::PipelineBindPoint::COMPUTE {
            &[QueueKind::Direct, QueueKind::Compute]
        } else {
            &[QueueKind::Direct]
        };
        if !self.check_queue("pipeline binding", allowed) {
            return;
        }
        // SAFETY: the buffer is recording and the pipeline is alive until the
        // list's fence is reached.
        unsafe {
            self.device()
                .cmd_bind_pipeline(self.cmd, bind_point, pipeline.raw());
            if let Some((layout, sets)) = self.shared.bindless_sets() {
                self.device()
                    .cmd_bind_descriptor_sets(self.cmd, bind_point, layout, 0, &sets, &[]);
            }
        }
        self.pipeline = Some(BoundPipeline { bind_point });
    }

    pub(crate) fn set_constants(&mut self, constants: &[u32]) {
        if constants.len() > MAX_ROOT_CONSTANTS {
            log::error!(
                "{} root constants exceed the limit of {MAX_ROOT_CONSTANTS}",
                constants.len()
            );
            return;
        }
        if self.pipeline.is_none() {
            log::error!("root constants set without a pipeline");
            return;
        }
        let Some((layout, _)) = self.shared.bindless_sets() else {
            log::error!("root constants set before the descriptor heaps exist");
            return;
        };
        // SAFETY: the range fits the layout's push constant block.
        unsafe {
            self.device().cmd_push_constants(
                self.cmd,
                layout,
                vk::ShaderStageFlags::ALL,
                0,
                bytemuck::cast_slice(constants),
            )
        };
    }

    pub(crate) fn set_index_buffer(&mut self, buffer: &GpuResource, format: IndexFormat) {
        if !self.check_queue("index buffer binding", &[QueueKind::Direct]) {
            return;
        }
        let Some(buffer) = vulkan_resource(buffer).and_then(VulkanResource::raw_buffer) else {
            log::error!("index buffer is not a Vulkan buffer");
            return;
        };
        // SAFETY: the buffer was created with INDEX_BUFFER usage.
        unsafe {
            self.device().cmd_bind_index_buffer(
                self.cmd,
                buffer,
                0,
                conversion::index_type(format),
            )
        };
    }

    fn prepare_draw(&mut self) -> bool {
        if !self.check_queue("draw", &[QueueKind::Direct]) {
            return false;
        }
        if !self
            .pipeline
            .is_some_and(|p| p.bind_point == vk::PipelineBindPoint::GRAPHICS)
        {
            log::error!("draw without a graphics pipeline");
            return false;
        }
        self.ensure_rendering();
        self.rendering
    }

    pub(crate) fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        if self.prepare_draw() {
            // SAFETY: a rendering scope is open with a graphics pipeline bound.
            unsafe {
                self.device().cmd_draw(
                    self.cmd,
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                )
            };
        }
    }

    pub(crate) fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) {
        if self.prepare_draw() {
            // SAFETY: a rendering scope is open with a graphics pipeline bound.
            unsafe {
                self.device().cmd_draw_indexed(
                    self.cmd,
                    index_count,
                    instance_count,
                    first_index,
                    base_vertex,
                    first_instance,
                )
            };
        }
    }

    pub(crate) fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        if !self.check_queue("dispatch", &[QueueKind::Direct, QueueKind::Compute]) {
            return;
        }
        if !self
            .pipeline
            .is_some_and(|p| p.bind_point == vk::PipelineBindPoint::COMPUTE)
        {
            log::error!("dispatch without a compute pipeline");
            return;
        }
        self.end_rendering();
        let device = &self.shared.device;
        // SAFETY: the buffer is recording outside a rendering scope.
        unsafe {
            if self.pending_dispatch {
                // Chained compute passes read what the previous one wrote.
                let barrier = vk::MemoryBarrier::default()
                    .src_access_mask(vk::AccessFlags::SHADER_WRITE)
                    .dst_access_mask(vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE);
                device.cmd_pipeline_barrier(
                    self.cmd,
                    vk::PipelineStageFlags::COMPUTE_SHADER,
                    vk::PipelineStageFlags::COMPUTE_SHADER,
                    vk::DependencyFlags::empty(),
                    &[barrier],
                    &[],
                    &[],
                );
            }
            device.cmd_dispatch(self.cmd, x, y, z);
        }
        self.pending_dispatch = true;
    }

    fn prepare_copy(&mut self) -> bool {
        if !self.check_recording("copy") {
            return false;
        }
        self.end_rendering();
        true
    }

    pub(crate) fn copy_buffer(&mut self, src: &GpuResource, dst: &GpuResource, size: u64) {
        if !self.prepare_copy() {
            return;
        }
        let (Some(src), Some(dst)) = (
            vulkan_resource(src).and_then(VulkanResource::raw_buffer),
            vulkan_resource(dst).and_then(VulkanResource::raw_buffer),
        ) else {
            log::error!("copy_buffer needs two Vulkan buffers");
            return;
        };
        let region = vk::BufferCopy::default().size(size);
        // SAFETY: both buffers are alive and were created with transfer usage.
        unsafe { self.device().cmd_copy_buffer(self.cmd, src, dst, &[region]) };
    }

    fn buffer_image_copy(image: &VulkanResource, region: TextureRegion) -> Option<vk::BufferImageCopy> {
        let (_, aspect) = image.raw_image()?;
        Some(
            vk::BufferImageCopy::default()
                .buffer_offset(0)
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(aspect)
                        .mip_level(region.mip_level)
                        .base_array_layer(0)
                        .layer_count(region.array_layers),
                )
                .image_extent(vk::Extent3D {
                    width: region.extent.width,
                    height: region.extent.height,
                    depth: 1,
                }),
        )
    }

    pub(crate) fn copy_buffer_to_texture(
        &mut self,
        src: &GpuResource,
        dst: &GpuResource,
        region: TextureRegion,
    ) {
        if !self.prepare_copy() {
            return;
        }
        let (Some(buffer), Some(texture)) = (
            vulkan_resource(src).and_then(VulkanResource::raw_buffer),
            vulkan_resource(dst),
        ) else {
            log::error!("copy_buffer_to_texture needs a Vulkan buffer and texture");
            return;
        };
        let (Some((image, _)), Some(copy)) =
            (texture.raw_image(), Self::buffer_image_copy(texture, region))
        else {
            log::error!("copy destination {} is not a texture", texture.label());
            return;
        };
        let layout = self.current_layout(image);
        // SAFETY: the image is in `layout`, which allows transfer writes.
        unsafe {
            self.device()
                .cmd_copy_buffer_to_image(self.cmd, buffer, image, layout, &[copy])
        };
    }

    pub(crate) fn copy_texture_to_buffer(
        &mut self,
        src: &GpuResource,
        dst: &GpuResource,
        region: TextureRegion,
    ) {
        if !self.prepare_copy() {
            return;
        }
        let (Some(texture), Some(buffer)) = (
            vulkan_resource(src),
            vulkan_resource(dst).and_then(VulkanResource::raw_buffer),
        ) else {
            log::error!("copy_texture_to_buffer needs a Vulkan texture and buffer");
            return;
        };
        let (Some((image, _)), Some(copy)) =
            (texture.raw_image(), Self::buffer_image_copy(texture, region))
        else {
            log::error!("copy source {} is not a texture", texture.label());
            return;
        };
        let layout = self.current_layout(image);
        // SAFETY: the image is in `layout`, which allows transfer reads.
        unsafe {
            self.device()
                .cmd_copy_image_to_buffer(self.cmd, image, layout, buffer, &[copy])
        };
    }

    pub(crate) fn copy_resource(&mut self, src: &GpuResource, dst: &GpuResource) {
        if !self.prepare_copy() {
            return;
        }
        let (Some(src), Some(dst)) = (vulkan_resource(src), vulkan_resource(dst)) else {
            log::error!("copy_resource uses a resource from another backend");
            return;
        };
        match (src.raw_buffer(), dst.raw_buffer()) {
            (Some(src_buffer), Some(dst_buffer)) => {
                let region = vk::BufferCopy::default().size(src.size().min(dst.size()));
                // SAFETY: both buffers are alive.
                unsafe {
                    self.device()
                        .cmd_copy_buffer(self.cmd, src_buffer, dst_buffer, &[region])
                };
                return;
            }
            (None, None) => {}
            _ => {
                log::error!("copy_resource between a buffer and a texture");
                return;
            }
        }

        let (Some((src_image, aspect)), Some((dst_image, _)), Some(info)) =
            (src.raw_image(), dst.raw_image(), src.image_info())
        else {
            return;
        };
        let regions: Vec<vk::ImageCopy> = (0..info.mip_levels)
            .map(|mip| {
                let layers = vk::ImageSubresourceLayers::default()
                    .aspect_mask(aspect)
                    .mip_level(mip)
                    .base_array_layer(0)
                    .layer_count(info.array_layers);
                vk::ImageCopy::default()
                    .src_subresource(layers)
                    .dst_subresource(layers)
                    .extent(vk::Extent3D {
                        width: (info.extent.width >> mip).max(1),
                        height: (info.extent.height >> mip).max(1),
                        depth: 1,
                    })
            })
            .collect();
        let src_layout = self.current_layout(src_image);
        let dst_layout = self.current_layout(dst_image);
        // SAFETY: both images have the same shape and transfer-capable layouts.
        unsafe {
            self.device().cmd_copy_image(
                self.cmd,
                src_image,
                src_layout,
                dst_image,
                dst_layout,
                &regions,
            )
        };
    }
}

fn vulkan_handle(handle: &GpuResourceHandle) -> Option<VulkanResourceHandle> {
    match handle {
        GpuResourceHandle::Vulkan(handle) => Some(*handle),
        _ => None,
    }
}

fn vulkan_resource(resource: &GpuResource) -> Option<&VulkanResource> {
    match resource {
        GpuResource::Vulkan(resource) => Some(resource),
        _ => None,
    }
}

impl fmt::Debug for VulkanCommandList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanCommandList")
            .field("kind", &self.kind)
            .field("closed", &self.closed)
            .field("rendering", &self.rendering)
            .finish_non_exhaustive()
    }
}

impl Drop for VulkanCommandList {
    fn drop(&mut self) {
        // SAFETY: lists are dropped after the device flushes their queues;
        // destroying the pool frees its command buffer.
        unsafe { self.shared.device.destroy_command_pool(self.pool, None) };
    }
}
