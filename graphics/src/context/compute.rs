//! Compute context for the async compute queue.

use bytemuck::Pod;

use crate::backend::{GpuBackend, GpuResource, QueueKind};
use crate::error::GraphicsError;
use crate::resources::{PipelineKind, PipelineState};

use super::{Recorder, impl_context, root_constants};

/// Records dispatches for the compute queue.
///
/// Obtained from [`Device::get_compute_context`](crate::Device::get_compute_context)
/// and handed back through
/// [`Device::execute_and_flush_compute_context`](crate::Device::execute_and_flush_compute_context).
#[derive(Debug)]
pub struct ComputeContext {
    recorder: Recorder,
    pipeline_bound: bool,
}

impl ComputeContext {
    pub fn new(backend: &dyn GpuBackend) -> Result<Self, GraphicsError> {
        Ok(Self {
            recorder: Recorder::new(backend, QueueKind::Compute)?,
            pipeline_bound: false,
        })
    }

    fn on_reset(&mut self) {
        self.pipeline_bound = false;
    }

    pub fn set_pipeline_state(&mut self, pipeline: &PipelineState) -> Result<(), GraphicsError> {
        if pipeline.kind() != PipelineKind::Compute {
            return Err(GraphicsError::InvalidParameter(format!(
                "graphics pipeline {:?} bound on a compute context",
                pipeline.label()
            )));
        }
        self.recorder.list.set_pipeline(pipeline.raw());
        self.pipeline_bound = true;
        Ok(())
    }

    pub fn set_compute_constants<T: Pod>(&mut self, constants: &T) -> Result<(), GraphicsError> {
        if !self.pipeline_bound {
            return Err(GraphicsError::InvalidParameter(
                "compute constants set without a pipeline".to_string(),
            ));
        }
        let words = root_constants(constants)?;
        self.recorder.list.set_constants(words);
        Ok(())
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.recorder.list.dispatch(x, y, z);
    }

    pub fn copy_resource(&mut self, src: &GpuResource, dst: &GpuResource) {
        self.recorder.list.copy_resource(src, dst);
    }
}

impl_context!(ComputeContext);
