//! Queues fenced with timeline semaphores.

use std::fmt;
use std::sync::Arc;

use ash::vk;

use crate::backend::{GpuCommandList, QueueKind};
use crate::error::GraphicsError;

use super::VulkanShared;

fn submission_error(e: vk::Result) -> GraphicsError {
    match e {
        vk::Result::ERROR_DEVICE_LOST => GraphicsError::DeviceLost,
        other => GraphicsError::SubmissionFailed(format!("{other:?}")),
    }
}

/// A hardware queue and the timeline semaphore acting as its fence.
pub struct VulkanQueue {
    kind: QueueKind,
    family: u32,
    timeline: vk::Semaphore,
    shared: Arc<VulkanShared>,
}

impl VulkanQueue {
    pub(crate) fn new(kind: QueueKind, shared: Arc<VulkanShared>) -> Result<Self, GraphicsError> {
        let mut timeline_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut timeline_info);
        // SAFETY: create_info and its chain outlive the call.
        let timeline = unsafe { shared.device.create_semaphore(&create_info, None) }.map_err(
            |e| GraphicsError::InitializationFailed(format!("timeline semaphore: {e:?}")),
        )?;
        Ok(Self {
            kind,
            family: shared.families().family(kind),
            timeline,
            shared,
        })
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Run `f` with the locked `vk::Queue`.
    pub(crate) fn with_queue<R>(
        &self,
        f: impl FnOnce(vk::Queue) -> Result<R, GraphicsError>,
    ) -> Result<R, GraphicsError> {
        let queue = self.shared.lock_queue(self.family)?;
        f(*queue)
    }

    pub(crate) fn signal(&self, value: u64) -> Result<(), GraphicsError> {
        let semaphores = [self.timeline];
        let values = [value];
        let mut timeline_info =
            vk::TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&values);
        let submit = vk::SubmitInfo::default()
            .signal_semaphores(&semaphores)
            .push_next(&mut timeline_info);
        self.with_queue(|queue| {
            // SAFETY: the queue is externally synchronized by its lock.
            unsafe {
                self.shared
                    .device
                    .queue_submit(queue, &[submit], vk::Fence::null())
            }
            .map_err(submission_error)
        })
    }

    pub(crate) fn completed_value(&self) -> Result<u64, GraphicsError> {
        // SAFETY: the semaphore is a timeline semaphore of this device.
        unsafe { self.shared.device.get_semaphore_counter_value(self.timeline) }
            .map_err(submission_error)
    }

    pub(crate) fn wait_for_value(&self, value: u64) -> Result<(), GraphicsError> {
        let semaphores = [self.timeline];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        // SAFETY: wait_info outlives the call.
        unsafe { self.shared.device.wait_semaphores(&wait_info, u64::MAX) }
            .map_err(submission_error)
    }

    pub(crate) fn submit(&self, lists: &mut [&mut GpuCommandList]) -> Result<(), GraphicsError> {
        let mut buffers = Vec::with_capacity(lists.len());
        for list in lists.iter_mut() {
            match &mut **list {
                GpuCommandList::Vulkan(list) => {
                    if list.kind() != self.kind {
                        return Err(GraphicsError::SubmissionFailed(format!(
                            "{:?} command list submitted to the {:?} queue",
                            list.kind(),
                            self.kind
                        )));
                    }
                    if !list.is_closed() {
                        return Err(GraphicsError::InvalidParameter(
                            "command list submitted while still recording".to_string(),
                        ));
                    }
                    buffers.push(list.raw());
                }
                _ => {
                    return Err(GraphicsError::SubmissionFailed(
                        "command list belongs to another backend".to_string(),
                    ));
                }
            }
        }
        if buffers.is_empty() {
            return Ok(());
        }
        let submit = vk::SubmitInfo::default().command_buffers(&buffers);
        self.with_queue(|queue| {
            // SAFETY: every command buffer is in the executable state.
            unsafe {
                self.shared
                    .device
                    .queue_submit(queue, &[submit], vk::Fence::null())
            }
            .map_err(submission_error)
        })
    }
}

impl fmt::Debug for VulkanQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanQueue")
            .field("kind", &self.kind)
            .field("family", &self.family)
            .finish_non_exhaustive()
    }
}

impl Drop for VulkanQueue {
    fn drop(&mut self) {
        // SAFETY: no submission can wait on the semaphore once the queue is
        // idle.
        unsafe {
            let _ = self.with_queue(|queue| {
                self.shared
                    .device
                    .queue_wait_idle(queue)
                    .map_err(submission_error)
            });
            self.shared.device.destroy_semaphore(self.timeline, None);
        }
    }
}
