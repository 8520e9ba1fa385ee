//! Simulated hardware queues.

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::backend::{GpuCommandList, QueueKind};
use crate::error::GraphicsError;

use super::command::{self, Command};
use super::{DummyShared, ResourceId};

enum QueueItem {
    Execute(Vec<Vec<Command>>),
    Signal(u64),
    Present(ResourceId),
}

#[derive(Default)]
struct Fence {
    completed: Mutex<u64>,
    reached: Condvar,
}

/// A queue whose work executes in submission order on a worker thread.
pub struct DummyQueue {
    kind: QueueKind,
    sender: Option<Sender<QueueItem>>,
    fence: Arc<Fence>,
    worker: Option<JoinHandle<()>>,
}

impl DummyQueue {
    pub(crate) fn new(kind: QueueKind, shared: Arc<DummyShared>) -> Result<Self, GraphicsError> {
        let (sender, receiver) = mpsc::channel();
        let fence = Arc::new(Fence::default());
        let worker_fence = Arc::clone(&fence);
        let worker = std::thread::Builder::new()
            .name(format!("dummy-{kind:?}-queue").to_lowercase())
            .spawn(move || run_queue(kind, receiver, worker_fence, shared))
            .map_err(|e| {
                GraphicsError::InitializationFailed(format!("failed to spawn queue thread: {e}"))
            })?;
        Ok(Self {
            kind,
            sender: Some(sender),
            fence,
            worker: Some(worker),
        })
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    fn send(&self, item: QueueItem) -> Result<(), GraphicsError> {
        self.sender
            .as_ref()
            .ok_or(GraphicsError::DeviceLost)?
            .send(item)
            .map_err(|_| GraphicsError::DeviceLost)
    }

    pub(crate) fn signal(&self, value: u64) -> Result<(), GraphicsError> {
        self.send(QueueItem::Signal(value))
    }

    pub(crate) fn completed_value(&self) -> Result<u64, GraphicsError> {
        Ok(*self.fence.completed.lock())
    }

    pub(crate) fn wait_for_value(&self, value: u64) -> Result<(), GraphicsError> {
        let mut completed = self.fence.completed.lock();
        while *completed < value {
            if self.worker.as_ref().is_none_or(|w| w.is_finished()) {
                return Err(GraphicsError::DeviceLost);
            }
            self.fence.reached.wait(&mut completed);
        }
        Ok(())
    }

    pub(crate) fn submit(&self, lists: &mut [&mut GpuCommandList]) -> Result<(), GraphicsError> {
        let mut batch = Vec::with_capacity(lists.len());
        for list in lists.iter_mut() {
            match &mut **list {
                GpuCommandList::Dummy(list) => {
                    if list.kind() != self.kind {
                        return Err(GraphicsError::SubmissionFailed(format!(
                            "{:?} command list submitted to the {:?} queue",
                            list.kind(),
                            self.kind
                        )));
                    }
                    batch.push(list.take_commands()?);
                }
                #[cfg(feature = "vulkan-backend")]
                _ => {
                    return Err(GraphicsError::SubmissionFailed(
                        "command list belongs to another backend".to_string(),
                    ));
                }
            }
        }
        self.send(QueueItem::Execute(batch))
    }

    /// Check the back buffer state when the queue reaches the present.
    pub(crate) fn present(&self, backbuffer: ResourceId) -> Result<(), GraphicsError> {
        self.send(QueueItem::Present(backbuffer))
    }
}

impl fmt::Debug for DummyQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyQueue")
            .field("kind", &self.kind)
            .field("completed", &*self.fence.completed.lock())
            .finish_non_exhaustive()
    }
}

impl Drop for DummyQueue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_queue(
    kind: QueueKind,
    receiver: Receiver<QueueItem>,
    fence: Arc<Fence>,
    shared: Arc<DummyShared>,
) {
    while let Ok(item) = receiver.recv() {
        match item {
            QueueItem::Execute(lists) => {
                for commands in lists {
                    command::execute(kind, commands, &shared.validation);
                }
            }
            QueueItem::Signal(value) => {
                let mut completed = fence.completed.lock();
                *completed = (*completed).max(value);
                fence.reached.notify_all();
            }
            QueueItem::Present(backbuffer) => {
                shared.validation.expect_state(
                    backbuffer,
                    &[crate::types::ResourceState::Present],
                    "presented back buffer",
                );
            }
        }
    }
    log::trace!("dummy {kind:?} queue thread exiting");
}
