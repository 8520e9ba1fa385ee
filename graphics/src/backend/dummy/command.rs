//! Command recording and execution for the dummy backend.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::backend::{GpuPipeline, GpuResource, QueueKind, ResourceBarrier, TextureRegion};
use crate::descriptor::CpuDescriptorHandle;
use crate::error::GraphicsError;
use crate::types::{ClearColor, IndexFormat, ResourceState, ScissorRect, Viewport};

use super::validation::ValidationLayer;
use super::{DummyShared, ResourceId, dummy_resource_id};

/// Maximum number of 32-bit root constants.
const MAX_ROOT_CONSTANTS: usize = 64;

/// Blocks a queue thread until opened.
///
/// Recorded with [`DummyCommandList::stall_until`] to keep a command list
/// "running on the GPU" for as long as a test needs.
#[derive(Clone, Default)]
pub struct StallGate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StallGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        let (open, cond) = &*self.inner;
        *open.lock() = true;
        cond.notify_all();
    }

    pub fn is_open(&self) -> bool {
        *self.inner.0.lock()
    }

    fn wait(&self) {
        let (open, cond) = &*self.inner;
        let mut open = open.lock();
        while !*open {
            cond.wait(&mut open);
        }
    }
}

impl fmt::Debug for StallGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StallGate")
            .field("open", &self.is_open())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TargetBinding {
    handle: CpuDescriptorHandle,
    resource: Option<ResourceId>,
}

pub(crate) struct CopyEndpoint {
    id: ResourceId,
    storage: Arc<Mutex<Vec<u8>>>,
}

/// Copy regions are byte ranges from offset zero; the dummy backend
/// stores mip 0 only.
pub(crate) enum CopyExtent {
    Bytes(u64),
    Mip { level: u32, bytes: u64 },
    Whole,
}

pub(crate) enum Command {
    Barriers(Vec<(ResourceId, ResourceState, ResourceState)>),
    BindTargets {
        rtvs: Vec<TargetBinding>,
        dsv: Option<TargetBinding>,
    },
    ClearTarget(TargetBinding),
    ClearDepth(TargetBinding),
    Draw {
        depth_write_target: Option<TargetBinding>,
    },
    Copy {
        src: CopyEndpoint,
        dst: CopyEndpoint,
        extent: CopyExtent,
    },
    Stall(StallGate),
}

#[derive(Debug, Clone, Copy)]
struct BoundPipeline {
    compute: bool,
    depth_write: bool,
}

/// A command list recording into host memory.
pub struct DummyCommandList {
    kind: QueueKind,
    shared: Arc<DummyShared>,
    commands: Vec<Command>,
    closed: bool,
    pipeline: Option<BoundPipeline>,
    bound_dsv: Option<TargetBinding>,
    targets_bound: bool,
    draw_count: u32,
    dispatch_count: u32,
}

impl DummyCommandList {
    pub(crate) fn new(kind: QueueKind, shared: Arc<DummyShared>) -> Self {
        Self {
            kind,
            shared,
            commands: Vec::new(),
            // Lists start closed like freshly created native lists that were
            // never opened; `reset` opens them.
            closed: true,
            pipeline: None,
            bound_dsv: None,
            targets_bound: false,
            draw_count: 0,
            dispatch_count: 0,
        }
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Draw calls recorded since the last reset.
    pub fn draw_count(&self) -> u32 {
        self.draw_count
    }

    /// Dispatches recorded since the last reset.
    pub fn dispatch_count(&self) -> u32 {
        self.dispatch_count
    }

    /// Record a command that blocks the executing queue until `gate` opens.
    pub fn stall_until(&mut self, gate: &StallGate) {
        if self.check_recording("stall") {
            self.commands.push(Command::Stall(gate.clone()));
        }
    }

    fn validation(&self) -> &ValidationLayer {
        &self.shared.validation
    }

    fn check_recording(&self, what: &str) -> bool {
        if self.closed {
            self.validation()
                .report(format!("{what} recorded into a closed command list"));
            return false;
        }
        true
    }

    fn check_queue(&self, what: &str, allowed: &[QueueKind]) -> bool {
        if !allowed.contains(&self.kind) {
            self.validation()
                .report(format!("{what} recorded on a {:?} command list", self.kind));
            return false;
        }
        self.check_recording(what)
    }

    fn bind(&self, handle: CpuDescriptorHandle) -> TargetBinding {
        TargetBinding {
            handle,
            resource: self.shared.resolve_descriptor(handle),
        }
    }

    fn endpoint(&self, resource: &GpuResource) -> Option<CopyEndpoint> {
        match resource {
            GpuResource::Dummy(resource) => Some(CopyEndpoint {
                id: resource.id(),
                storage: Arc::clone(resource.storage()),
            }),
            #[cfg(feature = "vulkan-backend")]
            _ => {
                self.validation()
                    .report("copy uses a resource from another backend".to_string());
                None
            }
        }
    }

    fn record_copy(&mut self, src: &GpuResource, dst: &GpuResource, extent: CopyExtent) {
        if !self.check_recording("copy") {
            return;
        }
        if let (Some(src), Some(dst)) = (self.endpoint(src), self.endpoint(dst)) {
            self.commands.push(Command::Copy { src, dst, extent });
        }
    }

    pub(crate) fn reset(&mut self) -> Result<(), GraphicsError> {
        self.commands.clear();
        self.closed = false;
        self.pipeline = None;
        self.bound_dsv = None;
        self.targets_bound = false;
        self.draw_count = 0;
        self.dispatch_count = 0;
        Ok(())
    }

    pub(crate) fn close(&mut self) -> Result<(), GraphicsError> {
        if self.closed {
            return Err(GraphicsError::InvalidParameter(
                "command list closed twice".to_string(),
            ));
        }
        self.closed = true;
        Ok(())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Move the recorded commands out for execution.
    pub(crate) fn take_commands(&mut self) -> Result<Vec<Command>, GraphicsError> {
        if !self.closed {
            return Err(GraphicsError::InvalidParameter(
                "command list submitted while still recording".to_string(),
            ));
        }
        Ok(std::mem::take(&mut self.commands))
    }

    pub(crate) fn resource_barriers(&mut self, barriers: &[ResourceBarrier]) {
        if barriers.is_empty() || !self.check_recording("barrier") {
            return;
        }
        let mut transitions = Vec::with_capacity(barriers.len());
        for barrier in barriers {
            match dummy_resource_id(&barrier.resource) {
                Ok(id) => transitions.push((id, barrier.before, barrier.after)),
                Err(e) => self.validation().report(e.to_string()),
            }
        }
        self.commands.push(Command::Barriers(transitions));
    }

    pub(crate) fn set_render_targets(
        &mut self,
        rtvs: &[CpuDescriptorHandle],
        dsv: Option<CpuDescriptorHandle>,
    ) {
        if !self.check_queue("render target binding", &[QueueKind::Direct]) {
            return;
        }
        let rtvs: Vec<_> = rtvs.iter().map(|h| self.bind(*h)).collect();
        let dsv = dsv.map(|h| self.bind(h));
        self.bound_dsv = dsv;
        self.targets_bound = true;
        self.commands.push(Command::BindTargets { rtvs, dsv });
    }

    pub(crate) fn clear_render_target(&mut self, rtv: CpuDescriptorHandle, _color: ClearColor) {
        if self.check_queue("render target clear", &[QueueKind::Direct]) {
            let binding = self.bind(rtv);
            self.commands.push(Command::ClearTarget(binding));
        }
    }

    pub(crate) fn clear_depth(&mut self, dsv: CpuDescriptorHandle, _depth: f32) {
        if self.check_queue("depth clear", &[QueueKind::Direct]) {
            let binding = self.bind(dsv);
            self.commands.push(Command::ClearDepth(binding));
        }
    }

    pub(crate) fn set_viewport(&mut self, viewport: Viewport) {
        if viewport.width <= 0.0 || viewport.height <= 0.0 {
            self.validation()
                .report(format!("degenerate viewport {viewport:?}"));
        }
    }

    pub(crate) fn set_scissor(&mut self, _scissor: ScissorRect) {}

    pub(crate) fn set_pipeline(&mut self, pipeline: &GpuPipeline) {
        match pipeline {
            GpuPipeline::Dummy(pipeline) => {
                let allowed: &[QueueKind] = if pipeline.compute {
                    &[QueueKind::Direct, QueueKind::Compute]
                } else {
                    &[QueueKind::Direct]
                };
                if self.check_queue("pipeline binding", allowed) {
                    log::trace!("DummyCommandList: binding pipeline {:?}", pipeline.label);
                    self.pipeline = Some(BoundPipeline {
                        compute: pipeline.compute,
                        depth_write: pipeline.depth_write,
                    });
                }
            }
            #[cfg(feature = "vulkan-backend")]
            _ => self
                .validation()
                .report("pipeline belongs to another backend".to_string()),
        }
    }

    pub(crate) fn set_constants(&mut self, constants: &[u32]) {
        if constants.len() > MAX_ROOT_CONSTANTS {
            self.validation().report(format!(
                "{} root constants exceed the limit of {MAX_ROOT_CONSTANTS}",
                constants.len()
            ));
        }
        if self.pipeline.is_none() {
            self.validation()
                .report("root constants set without a pipeline".to_string());
        }
    }

    pub(crate) fn set_index_buffer(&mut self, _buffer: &GpuResource, _format: IndexFormat) {
        self.check_queue("index buffer binding", &[QueueKind::Direct]);
    }

    fn record_draw(&mut self) {
        if !self.check_queue("draw", &[QueueKind::Direct]) {
            return;
        }
        match self.pipeline {
            Some(pipeline) if !pipeline.compute => {}
            _ => {
                self.validation()
                    .report("draw without a graphics pipeline".to_string());
                return;
            }
        }
        if !self.targets_bound {
            self.validation()
                .report("draw without render targets".to_string());
        }
        let depth_write_target = self
            .pipeline
            .filter(|p| p.depth_write)
            .and(self.bound_dsv);
        self.draw_count += 1;
        self.commands.push(Command::Draw { depth_write_target });
    }

    pub(crate) fn draw(&mut self, _vertices: u32, _instances: u32, _first: u32, _first_instance: u32) {
        self.record_draw();
    }

    pub(crate) fn draw_indexed(
        &mut self,
        _indices: u32,
        _instances: u32,
        _first_index: u32,
        _base_vertex: i32,
        _first_instance: u32,
    ) {
        self.record_draw();
    }

    pub(crate) fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        if !self.check_queue("dispatch", &[QueueKind::Direct, QueueKind::Compute]) {
            return;
        }
        if !self.pipeline.is_some_and(|p| p.compute) {
            self.validation()
                .report("dispatch without a compute pipeline".to_string());
            return;
        }
        if x == 0 || y == 0 || z == 0 {
            self.validation()
                .report(format!("empty dispatch {x}x{y}x{z}"));
        }
        self.dispatch_count += 1;
    }

    pub(crate) fn copy_buffer(&mut self, src: &GpuResource, dst: &GpuResource, size: u64) {
        self.record_copy(src, dst, CopyExtent::Bytes(size));
    }

    pub(crate) fn copy_buffer_to_texture(
        &mut self,
        src: &GpuResource,
        dst: &GpuResource,
        region: TextureRegion,
    ) {
        self.record_copy(
            src,
            dst,
            CopyExtent::Mip {
                level: region.mip_level,
                bytes: region.byte_size(),
            },
        );
    }

    pub(crate) fn copy_texture_to_buffer(
        &mut self,
        src: &GpuResource,
        dst: &GpuResource,
        region: TextureRegion,
    ) {
        self.record_copy(
            src,
            dst,
            CopyExtent::Mip {
                level: region.mip_level,
                bytes: region.byte_size(),
            },
        );
    }

    pub(crate) fn copy_resource(&mut self, src: &GpuResource, dst: &GpuResource) {
        self.record_copy(src, dst, CopyExtent::Whole);
    }
}

impl fmt::Debug for DummyCommandList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyCommandList")
            .field("kind", &self.kind)
            .field("commands", &self.commands.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Execution
// ============================================================================

fn check_target(
    validation: &ValidationLayer,
    binding: &TargetBinding,
    allowed: &[ResourceState],
    usage: &str,
) {
    match binding.resource {
        Some(id) => validation.expect_state(id, allowed, usage),
        None => validation.report(format!(
            "{usage} descriptor {:?} was never written",
            binding.handle
        )),
    }
}

/// Execute one command list on the queue thread.
pub(crate) fn execute(kind: QueueKind, commands: Vec<Command>, validation: &ValidationLayer) {
    let mut decaying: Vec<ResourceId> = Vec::new();

    for command in commands {
        match command {
            Command::Barriers(transitions) => {
                for (id, before, after) in transitions {
                    validation.transition(id, before, after);
                }
            }
            Command::BindTargets { rtvs, dsv } => {
                for rtv in &rtvs {
                    check_target(validation, rtv, &[ResourceState::RenderTarget], "render target");
                }
                if let Some(dsv) = &dsv {
                    check_target(
                        validation,
                        dsv,
                        &[ResourceState::DepthWrite, ResourceState::DepthRead],
                        "depth target",
                    );
                }
            }
            Command::ClearTarget(rtv) => {
                check_target(validation, &rtv, &[ResourceState::RenderTarget], "cleared render target");
            }
            Command::ClearDepth(dsv) => {
                check_target(validation, &dsv, &[ResourceState::DepthWrite], "cleared depth target");
            }
            Command::Draw { depth_write_target } => {
                if let Some(dsv) = &depth_write_target {
                    check_target(validation, dsv, &[ResourceState::DepthWrite], "written depth target");
                }
            }
            Command::Copy { src, dst, extent } => {
                if validation.copy_access(src.id, ResourceState::CopySource, &[ResourceState::GenericRead]) {
                    decaying.push(src.id);
                }
                if validation.copy_access(dst.id, ResourceState::CopyDest, &[]) {
                    decaying.push(dst.id);
                }
                if kind == QueueKind::Copy {
                    decaying.extend([src.id, dst.id]);
                }
                copy_bytes(&src, &dst, &extent);
            }
            Command::Stall(gate) => gate.wait(),
        }
    }

    validation.decay(&decaying);
}

fn copy_bytes(src: &CopyEndpoint, dst: &CopyEndpoint, extent: &CopyExtent) {
    if Arc::ptr_eq(&src.storage, &dst.storage) {
        return;
    }
    let bytes = match extent {
        CopyExtent::Bytes(bytes) => Some(*bytes),
        CopyExtent::Mip { level: 0, bytes } => Some(*bytes),
        CopyExtent::Mip { .. } => None,
        CopyExtent::Whole => Some(u64::MAX),
    };
    let Some(bytes) = bytes else {
        return;
    };
    let src = src.storage.lock();
    let mut dst = dst.storage.lock();
    let len = (bytes as usize).min(src.len()).min(dst.len());
    dst[..len].copy_from_slice(&src[..len]);
}
