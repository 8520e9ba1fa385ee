//! Copy context for the copy queue.

use crate::backend::{GpuBackend, GpuResource, QueueKind, TextureRegion};
use crate::error::GraphicsError;

use super::{Recorder, impl_context};

/// Records transfers for the copy queue.
///
/// Resources touched on the copy queue decay to `Common` once the list
/// completes, so uploads need no explicit barriers on this queue.
#[derive(Debug)]
pub struct CopyContext {
    recorder: Recorder,
}

impl CopyContext {
    pub fn new(backend: &dyn GpuBackend) -> Result<Self, GraphicsError> {
        Ok(Self {
            recorder: Recorder::new(backend, QueueKind::Copy)?,
        })
    }

    fn on_reset(&mut self) {}

    pub fn copy_buffer(&mut self, src: &GpuResource, dst: &GpuResource, size: u64) {
        self.recorder.list.copy_buffer(src, dst, size);
    }

    pub fn copy_buffer_to_texture(
        &mut self,
        src: &GpuResource,
        dst: &GpuResource,
        region: TextureRegion,
    ) {
        self.recorder.list.copy_buffer_to_texture(src, dst, region);
    }

    pub fn copy_texture_to_buffer(
        &mut self,
        src: &GpuResource,
        dst: &GpuResource,
        region: TextureRegion,
    ) {
        self.recorder.list.copy_texture_to_buffer(src, dst, region);
    }

    pub fn copy_resource(&mut self, src: &GpuResource, dst: &GpuResource) {
        self.recorder.list.copy_resource(src, dst);
    }
}

impl_context!(CopyContext);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::queue::CommandQueue;
    use crate::backend::dummy::DummyBackend;
    use crate::types::{BufferDescriptor, BufferUsage};

    #[test]
    fn test_buffer_copy_lands_in_destination() {
        let backend = DummyBackend::new().unwrap();
        let queue = CommandQueue::new(&backend, QueueKind::Copy).unwrap();
        let src = backend
            .create_buffer(&BufferDescriptor::new(BufferUsage::UploadBuffer, 8, 4))
            .unwrap();
        let dst = backend
            .create_buffer(&BufferDescriptor::new(BufferUsage::ReadbackBuffer, 8, 4))
            .unwrap();
        src.write(0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        let mut ctx = CopyContext::new(&backend).unwrap();
        ctx.reset().unwrap();
        ctx.copy_buffer(&src, &dst, 8);
        queue.execute_contexts(&mut [&mut ctx]).unwrap();
        queue.flush().unwrap();

        assert_eq!(dst.read(0, 8).unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(backend.validation_errors().is_empty());
    }
}
