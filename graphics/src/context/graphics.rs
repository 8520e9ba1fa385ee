//! Graphics context: draws, dispatches and copies on the direct queue.

use bytemuck::Pod;

use crate::backend::{GpuBackend, GpuResource, QueueKind};
use crate::descriptor::CpuDescriptorHandle;
use crate::error::GraphicsError;
use crate::resources::{Buffer, PipelineKind, PipelineState};
use crate::types::{ClearColor, Extent2d, ScissorRect, Viewport};

use super::{Recorder, impl_context, root_constants};

/// Records work for the direct queue.
///
/// The device keeps one per frame slot; see
/// [`Device::graphics_context`](crate::Device::graphics_context).
#[derive(Debug)]
pub struct GraphicsContext {
    recorder: Recorder,
    bound_pipeline: Option<PipelineKind>,
}

impl GraphicsContext {
    pub fn new(backend: &dyn GpuBackend) -> Result<Self, GraphicsError> {
        Ok(Self {
            recorder: Recorder::new(backend, QueueKind::Direct)?,
            bound_pipeline: None,
        })
    }

    fn on_reset(&mut self) {
        self.bound_pipeline = None;
    }

    fn list(&mut self) -> &mut crate::backend::GpuCommandList {
        &mut self.recorder.list
    }

    /// Bind color targets and an optional depth target.
    pub fn set_render_targets(
        &mut self,
        rtvs: &[CpuDescriptorHandle],
        dsv: Option<CpuDescriptorHandle>,
    ) {
        self.list().set_render_targets(rtvs, dsv);
    }

    pub fn clear_render_target_view(&mut self, rtv: CpuDescriptorHandle, color: ClearColor) {
        self.list().clear_render_target(rtv, color);
    }

    pub fn clear_depth_stencil_view(&mut self, dsv: CpuDescriptorHandle, depth: f32) {
        self.list().clear_depth(dsv, depth);
    }

    /// Full-target viewport and scissor.
    pub fn set_viewport_and_scissor(&mut self, extent: Extent2d) {
        let list = self.list();
        list.set_viewport(Viewport::from_extent(extent));
        list.set_scissor(ScissorRect::from_extent(extent));
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.list().set_viewport(viewport);
    }

    pub fn set_pipeline_state(&mut self, pipeline: &PipelineState) {
        self.bound_pipeline = Some(pipeline.kind());
        self.list().set_pipeline(pipeline.raw());
    }

    /// Set root constants for the bound graphics pipeline.
    pub fn set_graphics_constants<T: Pod>(&mut self, constants: &T) -> Result<(), GraphicsError> {
        self.expect_pipeline(PipelineKind::Graphics)?;
        let words = root_constants(constants)?;
        self.recorder.list.set_constants(words);
        Ok(())
    }

    /// Set root constants for the bound compute pipeline.
    pub fn set_compute_constants<T: Pod>(&mut self, constants: &T) -> Result<(), GraphicsError> {
        self.expect_pipeline(PipelineKind::Compute)?;
        let words = root_constants(constants)?;
        self.recorder.list.set_constants(words);
        Ok(())
    }

    fn expect_pipeline(&self, kind: PipelineKind) -> Result<(), GraphicsError> {
        match self.bound_pipeline {
            Some(bound) if bound == kind => Ok(()),
            bound => Err(GraphicsError::InvalidParameter(format!(
                "{kind:?} root constants set while {bound:?} pipeline is bound"
            ))),
        }
    }

    pub fn set_index_buffer(&mut self, buffer: &Buffer) {
        let format = buffer.index_format();
        self.list().set_index_buffer(buffer.resource(), format);
    }

    pub fn draw_instanced(
        &mut self,
        vertex_count_per_instance: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
    ) {
        self.list().draw(
            vertex_count_per_instance,
            instance_count,
            start_vertex,
            start_instance,
        );
    }

    pub fn draw_indexed_instanced(
        &mut self,
        index_count_per_instance: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) {
        self.list().draw_indexed(
            index_count_per_instance,
            instance_count,
            start_index,
            base_vertex,
            start_instance,
        );
    }

    /// Fullscreen triangle, used by the composite and lighting passes.
    pub fn draw_fullscreen(&mut self) {
        self.draw_instanced(3, 1, 0, 0);
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.list().dispatch(x, y, z);
    }

    pub fn copy_resource(&mut self, src: &GpuResource, dst: &GpuResource) {
        self.list().copy_resource(src, dst);
    }
}

impl_context!(GraphicsContext);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GpuResourceHandle;
    use crate::backend::dummy::{DummyBackend, ResourceId};
    use crate::context::Context;
    use crate::types::{GraphicsPipelineDescriptor, ResourceState, ShaderBinary};

    #[test]
    fn test_constants_require_matching_pipeline() {
        let backend = DummyBackend::new().unwrap();
        let mut ctx = GraphicsContext::new(&backend).unwrap();
        ctx.reset().unwrap();
        assert!(ctx.set_graphics_constants(&[1u32, 2]).is_err());

        let shader = ShaderBinary::new("test", vec![0u8; 4]);
        let pipeline = backend
            .create_graphics_pipeline(&GraphicsPipelineDescriptor::new(shader.clone(), shader))
            .unwrap();
        let pipeline = PipelineState::new(pipeline, PipelineKind::Graphics, None);
        ctx.set_pipeline_state(&pipeline);
        ctx.set_graphics_constants(&[1u32, 2]).unwrap();
        assert!(ctx.set_compute_constants(&[1u32]).is_err());
    }

    #[test]
    fn test_reset_discards_barriers() {
        let backend = DummyBackend::new().unwrap();
        let mut ctx = GraphicsContext::new(&backend).unwrap();
        ctx.reset().unwrap();
        ctx.add_resource_barrier(
            GpuResourceHandle::Dummy(ResourceId(1)),
            ResourceState::ShaderResource,
            ResourceState::RenderTarget,
        );
        ctx.reset().unwrap();
        assert_eq!(ctx.pending_barriers(), 0);
        assert_eq!(ctx.kind(), QueueKind::Direct);
    }
}
