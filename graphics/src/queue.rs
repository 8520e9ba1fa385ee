//! Command queues and their fences.
//!
//! A [`CommandQueue`] wraps one hardware queue plus a monotonic 64-bit fence.
//! Work is associated with the fence value signaled after it:
//!
//! ```ignore
//! queue.execute_contexts(&mut [&mut *ctx])?;
//! let value = queue.signal()?;
//! // ... later, before touching anything the work references:
//! queue.wait_for_fence_value(value)?;
//! ```
//!
//! Lists submitted to the same queue execute in submission order. There is
//! no cross-queue dependency tracking: a consumer on another queue must flush
//! the producing queue first.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{GpuBackend, GpuCommandList, GpuQueue, QueueKind};
use crate::context::Context;
use crate::error::GraphicsError;
use crate::profiling::profile_scope;

/// Hardware queue plus fence.
pub struct CommandQueue {
    kind: QueueKind,
    queue: GpuQueue,
    /// Last value handed out by `signal`.
    fence_value: AtomicU64,
}

impl CommandQueue {
    pub fn new(backend: &dyn GpuBackend, kind: QueueKind) -> Result<Self, GraphicsError> {
        let queue = backend.create_queue(kind)?;
        log::debug!("Created {kind:?} command queue");
        Ok(Self {
            kind,
            queue,
            fence_value: AtomicU64::new(0),
        })
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// The backend queue.
    pub fn raw(&self) -> &GpuQueue {
        &self.queue
    }

    /// Insert a fence signal after all queued work and return its value.
    ///
    /// Values strictly increase per queue.
    pub fn signal(&self) -> Result<u64, GraphicsError> {
        let value = self.fence_value.fetch_add(1, Ordering::AcqRel) + 1;
        self.queue.signal(value)?;
        log::trace!("{:?} queue: signal {value}", self.kind);
        Ok(value)
    }

    /// Whether the queue's fence has reached `value`. Never blocks.
    pub fn is_fence_complete(&self, value: u64) -> bool {
        self.completed_fence_value() >= value
    }

    /// Block the calling thread until the fence reaches `value`.
    pub fn wait_for_fence_value(&self, value: u64) -> Result<(), GraphicsError> {
        if self.is_fence_complete(value) {
            return Ok(());
        }
        profile_scope!("wait_for_fence_value");
        log::trace!("{:?} queue: waiting for {value}", self.kind);
        self.queue.wait_for_value(value)
    }

    /// Signal and wait: drains everything submitted so far.
    pub fn flush(&self) -> Result<u64, GraphicsError> {
        let value = self.signal()?;
        self.wait_for_fence_value(value)?;
        Ok(value)
    }

    /// Last value handed out by [`signal`](Self::signal).
    pub fn current_fence_value(&self) -> u64 {
        self.fence_value.load(Ordering::Acquire)
    }

    /// Last value the queue reached. Zero when the backend cannot be queried,
    /// e.g. after device loss.
    pub fn completed_fence_value(&self) -> u64 {
        match self.queue.completed_value() {
            Ok(value) => value,
            Err(e) => {
                log::error!("{:?} queue: fence query failed: {e}", self.kind);
                0
            }
        }
    }

    /// Close the contexts' command lists and submit them in array order.
    pub fn execute_contexts(&self, contexts: &mut [&mut dyn Context]) -> Result<(), GraphicsError> {
        if contexts.is_empty() {
            return Ok(());
        }
        for context in contexts.iter_mut() {
            if context.kind() != self.kind {
                return Err(GraphicsError::SubmissionFailed(format!(
                    "{:?} context submitted to the {:?} queue",
                    context.kind(),
                    self.kind
                )));
            }
            context.close()?;
        }
        let mut lists: Vec<&mut GpuCommandList> = contexts
            .iter_mut()
            .map(|context| context.command_list_mut())
            .collect();
        self.queue.submit(&mut lists).inspect_err(|e| {
            log::error!("{:?} queue: submission failed: {e}", self.kind);
        })
    }
}

impl fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandQueue")
            .field("kind", &self.kind)
            .field("fence_value", &self.current_fence_value())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{DummyBackend, StallGate};
    use crate::context::ComputeContext;

    #[test]
    fn test_signal_is_strictly_increasing() {
        let backend = DummyBackend::new().unwrap();
        let queue = CommandQueue::new(&backend, QueueKind::Copy).unwrap();
        let values: Vec<u64> = (0..5).map(|_| queue.signal().unwrap()).collect();
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        queue.wait_for_fence_value(values[4]).unwrap();
        assert!(values.iter().all(|v| queue.is_fence_complete(*v)));
    }

    #[test]
    fn test_flush_completes_everything() {
        let backend = DummyBackend::new().unwrap();
        let queue = CommandQueue::new(&backend, QueueKind::Direct).unwrap();
        queue.signal().unwrap();
        let value = queue.flush().unwrap();
        assert_eq!(queue.completed_fence_value(), value);
        assert_eq!(queue.current_fence_value(), value);
    }

    #[test]
    fn test_stalled_list_holds_fence() {
        let backend = DummyBackend::new().unwrap();
        let queue = CommandQueue::new(&backend, QueueKind::Compute).unwrap();
        let mut ctx = ComputeContext::new(&backend).unwrap();
        ctx.reset().unwrap();
        let gate = StallGate::new();
        ctx.command_list_mut()
            .as_dummy_mut()
            .unwrap()
            .stall_until(&gate);
        queue.execute_contexts(&mut [&mut ctx]).unwrap();
        let value = queue.signal().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!queue.is_fence_complete(value));
        gate.open();
        queue.wait_for_fence_value(value).unwrap();
        assert!(queue.is_fence_complete(value));
    }

    #[test]
    fn test_wrong_queue_rejected() {
        let backend = DummyBackend::new().unwrap();
        let queue = CommandQueue::new(&backend, QueueKind::Copy).unwrap();
        let mut ctx = ComputeContext::new(&backend).unwrap();
        ctx.reset().unwrap();
        let err = queue.execute_contexts(&mut [&mut ctx]).unwrap_err();
        assert!(matches!(err, GraphicsError::SubmissionFailed(_)));
    }
}
