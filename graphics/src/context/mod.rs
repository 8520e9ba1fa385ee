//! Command recording contexts.
//!
//! A context wraps one command list and the barrier batch being collected
//! for it. Its life cycle is `reset -> record -> submit`:
//!
//! - [`GraphicsContext`]: one per frame slot, reset by
//!   [`Device::begin_frame`](crate::Device::begin_frame) and submitted to the
//!   direct queue.
//! - [`ComputeContext`] and [`CopyContext`]: pooled by the device in free
//!   lists, returned after execute + flush.
//!
//! Barriers added with [`Context::add_resource_barrier`] are held until
//! [`Context::execute_resource_barriers`], so one transition point becomes
//! one barrier call.

mod barrier;
mod compute;
mod copy;
mod graphics;

pub use barrier::BarrierBatch;
pub use compute::ComputeContext;
pub use copy::CopyContext;
pub use graphics::GraphicsContext;

use bytemuck::Pod;

use crate::backend::{GpuBackend, GpuCommandList, GpuResourceHandle, QueueKind};
use crate::error::GraphicsError;
use crate::types::ResourceState;

/// Maximum number of 32-bit root constants a pipeline accepts.
pub const MAX_ROOT_CONSTANTS: usize = 64;

/// Operations shared by every context kind.
pub trait Context {
    /// Queue family this context records for.
    fn kind(&self) -> QueueKind;

    /// Discard recorded commands and pending barriers and reopen the list.
    ///
    /// The caller must guarantee the list is no longer executing.
    fn reset(&mut self) -> Result<(), GraphicsError>;

    /// Record pending barriers and close the list for submission.
    fn close(&mut self) -> Result<(), GraphicsError>;

    fn command_list(&self) -> &GpuCommandList;

    fn command_list_mut(&mut self) -> &mut GpuCommandList;

    /// Queue a transition for the next [`execute_resource_barriers`](Self::execute_resource_barriers).
    fn add_resource_barrier(
        &mut self,
        resource: GpuResourceHandle,
        before: ResourceState,
        after: ResourceState,
    );

    /// Record all queued transitions as one barrier call.
    fn execute_resource_barriers(&mut self);

    /// Number of queued, not yet recorded transitions.
    fn pending_barriers(&self) -> usize;
}

/// Command list plus barrier batch; the state every context shares.
#[derive(Debug)]
pub(crate) struct Recorder {
    kind: QueueKind,
    list: GpuCommandList,
    barriers: BarrierBatch,
}

impl Recorder {
    fn new(backend: &dyn GpuBackend, kind: QueueKind) -> Result<Self, GraphicsError> {
        Ok(Self {
            kind,
            list: backend.create_command_list(kind)?,
            barriers: BarrierBatch::new(),
        })
    }

    fn reset(&mut self) -> Result<(), GraphicsError> {
        self.barriers.clear();
        self.list.reset()
    }

    fn flush_barriers(&mut self) {
        if self.barriers.is_empty() {
            return;
        }
        let barriers = self.barriers.take();
        log::trace!("{:?} context: {} barriers", self.kind, barriers.len());
        self.list.resource_barriers(&barriers);
    }

    fn close(&mut self) -> Result<(), GraphicsError> {
        if !self.barriers.is_empty() {
            log::warn!(
                "{:?} context closed with {} pending barriers; recording them",
                self.kind,
                self.barriers.len()
            );
            self.flush_barriers();
        }
        self.list.close()
    }
}

/// Reinterpret a plain-old-data constant block as 32-bit root constants.
pub(crate) fn root_constants<T: Pod>(constants: &T) -> Result<&[u32], GraphicsError> {
    let words: &[u32] = bytemuck::try_cast_slice(bytemuck::bytes_of(constants)).map_err(|e| {
        GraphicsError::InvalidParameter(format!("root constants are not 32-bit words: {e}"))
    })?;
    if words.len() > MAX_ROOT_CONSTANTS {
        return Err(GraphicsError::InvalidParameter(format!(
            "{} root constants exceed the limit of {MAX_ROOT_CONSTANTS}",
            words.len()
        )));
    }
    Ok(words)
}

macro_rules! impl_context {
    ($ty:ty) => {
        impl $crate::context::Context for $ty {
            fn kind(&self) -> $crate::backend::QueueKind {
                self.recorder.kind
            }

            fn reset(&mut self) -> Result<(), $crate::error::GraphicsError> {
                self.on_reset();
                self.recorder.reset()
            }

            fn close(&mut self) -> Result<(), $crate::error::GraphicsError> {
                self.recorder.close()
            }

            fn command_list(&self) -> &$crate::backend::GpuCommandList {
                &self.recorder.list
            }

            fn command_list_mut(&mut self) -> &mut $crate::backend::GpuCommandList {
                &mut self.recorder.list
            }

            fn add_resource_barrier(
                &mut self,
                resource: $crate::backend::GpuResourceHandle,
                before: $crate::types::ResourceState,
                after: $crate::types::ResourceState,
            ) {
                self.recorder.barriers.add(resource, before, after);
            }

            fn execute_resource_barriers(&mut self) {
                self.recorder.flush_barriers();
            }

            fn pending_barriers(&self) -> usize {
                self.recorder.barriers.len()
            }
        }
    };
}

pub(crate) use impl_context;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;

    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Indices {
        albedo: u32,
        normal: u32,
        scale: f32,
    }

    #[test]
    fn test_root_constants_cast() {
        let constants = Indices {
            albedo: 3,
            normal: 7,
            scale: 1.0,
        };
        let words = root_constants(&constants).unwrap();
        assert_eq!(words.len(), 3);
        assert_eq!(words[0], 3);
        assert_eq!(words[1], 7);
    }

    #[test]
    fn test_root_constants_limit() {
        let too_many = [0u32; MAX_ROOT_CONSTANTS + 1];
        assert!(root_constants(&too_many).is_err());
        let fits = [0u32; MAX_ROOT_CONSTANTS];
        assert!(root_constants(&fits).is_ok());
    }

    #[test]
    fn test_close_records_pending_barriers() {
        let backend = DummyBackend::new().unwrap();
        let mut ctx = CopyContext::new(&backend).unwrap();
        ctx.reset().unwrap();
        let buffer = backend
            .create_buffer(&crate::types::BufferDescriptor::new(
                crate::types::BufferUsage::StructuredBuffer,
                16,
                4,
            ))
            .unwrap();
        ctx.add_resource_barrier(buffer.handle(), ResourceState::Common, ResourceState::CopyDest);
        assert_eq!(ctx.pending_barriers(), 1);
        ctx.close().unwrap();
        assert_eq!(ctx.pending_barriers(), 0);
        assert!(ctx.command_list().is_closed());
    }
}
