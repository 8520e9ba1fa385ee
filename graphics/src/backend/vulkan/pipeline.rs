//! Graphics and compute pipelines over the shared bindless layout.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

use ash::vk;

use crate::error::GraphicsError;
use crate::types::{
    ComputePipelineDescriptor, GraphicsPipelineDescriptor, ShaderBinary,
};

use super::VulkanShared;
use super::conversion;

const ENTRY_POINT: &std::ffi::CStr = c"main";

fn pipeline_error(label: &Option<String>, e: impl fmt::Debug) -> GraphicsError {
    GraphicsError::PipelineCreationFailed(format!(
        "{}: {e:?}",
        label.as_deref().unwrap_or("pipeline")
    ))
}

/// A shader module destroyed at the end of pipeline creation.
struct ShaderModule<'a> {
    device: &'a ash::Device,
    module: vk::ShaderModule,
}

impl<'a> ShaderModule<'a> {
    fn new(device: &'a ash::Device, shader: &ShaderBinary) -> Result<Self, GraphicsError> {
        let code = ash::util::read_spv(&mut Cursor::new(shader.bytes())).map_err(|e| {
            GraphicsError::PipelineCreationFailed(format!(
                "shader '{}' is not valid SPIR-V: {e}",
                shader.name()
            ))
        })?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        // SAFETY: code is word-aligned SPIR-V.
        let module = unsafe { device.create_shader_module(&create_info, None) }.map_err(|e| {
            GraphicsError::PipelineCreationFailed(format!("shader '{}': {e:?}", shader.name()))
        })?;
        Ok(Self { device, module })
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        // SAFETY: modules may be destroyed once the pipeline is created.
        unsafe { self.device.destroy_shader_module(self.module, None) };
    }
}

/// A compiled pipeline state.
pub struct VulkanPipeline {
    label: Option<String>,
    pipeline: vk::Pipeline,
    bind_point: vk::PipelineBindPoint,
    shared: Arc<VulkanShared>,
}

impl VulkanPipeline {
    pub(crate) fn new_graphics(
        shared: &Arc<VulkanShared>,
        desc: &GraphicsPipelineDescriptor,
    ) -> Result<Self, GraphicsError> {
        let device = &shared.device;
        let layout = shared.pipeline_layout()?;
        let vertex = ShaderModule::new(device, &desc.vertex_shader)?;
        let pixel = ShaderModule::new(device, &desc.pixel_shader)?;

        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex.module)
                .name(ENTRY_POINT),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(pixel.module)
                .name(ENTRY_POINT),
        ];

        // Vertices are fetched from structured buffers.
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(conversion::topology(desc.topology));
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(conversion::cull_mode(desc.cull_mode))
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_format.is_some() && desc.depth.test_enabled)
            .depth_write_enable(desc.depth_format.is_some() && desc.depth.write_enabled)
            .depth_compare_op(conversion::compare_op(desc.depth.compare));
        let attachments =
            vec![conversion::blend_attachment(desc.blend); desc.render_target_formats.len()];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&attachments);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats: Vec<vk::Format> = desc
            .render_target_formats
            .iter()
            .map(|format| conversion::texture_format(*format))
            .collect();
        let mut rendering = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(
                desc.depth_format
                    .map_or(vk::Format::UNDEFINED, conversion::texture_format),
            );

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(layout)
            .push_next(&mut rendering);

        // SAFETY: every state struct outlives the call.
        let pipeline = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
        }
        .map_err(|(_, e)| pipeline_error(&desc.label, e))?[0];

        log::debug!("Created graphics pipeline {:?}", desc.label);
        Ok(Self {
            label: desc.label.clone(),
            pipeline,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            shared: Arc::clone(shared),
        })
    }

    pub(crate) fn new_compute(
        shared: &Arc<VulkanShared>,
        desc: &ComputePipelineDescriptor,
    ) -> Result<Self, GraphicsError> {
        let device = &shared.device;
        let layout = shared.pipeline_layout()?;
        let shader = ShaderModule::new(device, &desc.shader)?;
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader.module)
            .name(ENTRY_POINT);
        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage)
            .layout(layout);

        // SAFETY: create_info outlives the call.
        let pipeline = unsafe {
            device.create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
        }
        .map_err(|(_, e)| pipeline_error(&desc.label, e))?[0];

        log::debug!("Created compute pipeline {:?}", desc.label);
        Ok(Self {
            label: desc.label.clone(),
            pipeline,
            bind_point: vk::PipelineBindPoint::COMPUTE,
            shared: Arc::clone(shared),
        })
    }

    pub(crate) fn raw(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub(crate) fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }
}

impl fmt::Debug for VulkanPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanPipeline")
            .field("label", &self.label)
            .field("bind_point", &self.bind_point)
            .finish_non_exhaustive()
    }
}

impl Drop for VulkanPipeline {
    fn drop(&mut self) {
        // SAFETY: pipelines are dropped after the device is idle.
        unsafe { self.shared.device.destroy_pipeline(self.pipeline, None) };
    }
}
