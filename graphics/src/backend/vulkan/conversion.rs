//! Conversions from engine types to Vulkan types.

use ash::vk;

use crate::backend::QueueKind;
use crate::types::{
    AddressMode, BlendMode, BufferUsage, CompareFunction, CullMode, FilterMode, IndexFormat,
    PrimitiveTopology, ResourceState, TextureFormat, TextureUsage, ViewDimension,
};

pub fn texture_format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::R8Unorm => vk::Format::R8_UNORM,
        TextureFormat::R16Float => vk::Format::R16_SFLOAT,
        TextureFormat::R32Float => vk::Format::R32_SFLOAT,
        TextureFormat::R32Uint => vk::Format::R32_UINT,
        TextureFormat::Rg16Float => vk::Format::R16G16_SFLOAT,
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::Rgb10A2Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
        TextureFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
        TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
        TextureFormat::Depth24PlusStencil8 => vk::Format::D24_UNORM_S8_UINT,
    }
}

/// Views of a depth texture keep the depth format; the shader sees a
/// single-channel float either way.
pub fn view_format(format: TextureFormat, resource_format: TextureFormat) -> vk::Format {
    if resource_format.is_depth_stencil() {
        texture_format(resource_format)
    } else {
        texture_format(format)
    }
}

pub fn aspect_mask(format: TextureFormat) -> vk::ImageAspectFlags {
    match format {
        TextureFormat::Depth32Float => vk::ImageAspectFlags::DEPTH,
        TextureFormat::Depth24PlusStencil8 => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

pub fn image_usage(usage: TextureUsage, format: TextureFormat) -> vk::ImageUsageFlags {
    let transfer = vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
    let base = vk::ImageUsageFlags::SAMPLED | transfer;
    match usage {
        TextureUsage::TextureFromData | TextureUsage::HdrTextureFromData => {
            base | vk::ImageUsageFlags::STORAGE
        }
        TextureUsage::DepthStencil => base | vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        TextureUsage::RenderTarget => {
            let mut flags = base | vk::ImageUsageFlags::COLOR_ATTACHMENT;
            if format.uav_format().is_some() {
                flags |= vk::ImageUsageFlags::STORAGE;
            }
            flags
        }
        TextureUsage::UavTexture | TextureUsage::CubeMap => base | vk::ImageUsageFlags::STORAGE,
    }
}

pub fn buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let transfer = vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;
    match usage {
        BufferUsage::UploadBuffer | BufferUsage::ReadbackBuffer => transfer,
        BufferUsage::IndexBuffer => transfer | vk::BufferUsageFlags::INDEX_BUFFER,
        BufferUsage::StructuredBuffer => transfer | vk::BufferUsageFlags::STORAGE_BUFFER,
        BufferUsage::ConstantBuffer => {
            transfer | vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER
        }
    }
}

pub fn memory_location(usage: BufferUsage) -> gpu_allocator::MemoryLocation {
    match usage.memory_location() {
        crate::types::MemoryLocation::GpuOnly => gpu_allocator::MemoryLocation::GpuOnly,
        crate::types::MemoryLocation::CpuToGpu => gpu_allocator::MemoryLocation::CpuToGpu,
        crate::types::MemoryLocation::GpuToCpu => gpu_allocator::MemoryLocation::GpuToCpu,
    }
}

pub fn view_type(dimension: ViewDimension) -> vk::ImageViewType {
    match dimension {
        ViewDimension::Texture2d => vk::ImageViewType::TYPE_2D,
        ViewDimension::TextureCube => vk::ImageViewType::CUBE,
        ViewDimension::Texture2dArray => vk::ImageViewType::TYPE_2D_ARRAY,
    }
}

pub fn filter(mode: FilterMode) -> vk::Filter {
    match mode {
        FilterMode::Nearest => vk::Filter::NEAREST,
        FilterMode::Linear => vk::Filter::LINEAR,
    }
}

pub fn mipmap_mode(mode: FilterMode) -> vk::SamplerMipmapMode {
    match mode {
        FilterMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        FilterMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub fn address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::MirrorRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

pub fn compare_op(func: CompareFunction) -> vk::CompareOp {
    match func {
        CompareFunction::Never => vk::CompareOp::NEVER,
        CompareFunction::Less => vk::CompareOp::LESS,
        CompareFunction::Equal => vk::CompareOp::EQUAL,
        CompareFunction::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareFunction::Greater => vk::CompareOp::GREATER,
        CompareFunction::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareFunction::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareFunction::Always => vk::CompareOp::ALWAYS,
    }
}

pub fn cull_mode(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub fn topology(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
    }
}

pub fn index_type(format: IndexFormat) -> vk::IndexType {
    match format {
        IndexFormat::Uint16 => vk::IndexType::UINT16,
        IndexFormat::Uint32 => vk::IndexType::UINT32,
    }
}

pub fn blend_attachment(mode: BlendMode) -> vk::PipelineColorBlendAttachmentState {
    let state = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA);
    match mode {
        BlendMode::Opaque => state.blend_enable(false),
        BlendMode::Additive => state
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::ONE)
            .dst_color_blend_factor(vk::BlendFactor::ONE)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE)
            .alpha_blend_op(vk::BlendOp::ADD),
        BlendMode::AlphaBlend => state
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .alpha_blend_op(vk::BlendOp::ADD),
    }
}

/// Image layout a resource state maps to.
///
/// `Common` maps to `GENERAL`, which every queue family can copy from and
/// to; this is what makes implicit copy promotion work.
pub fn image_layout(state: ResourceState) -> vk::ImageLayout {
    match state {
        ResourceState::Common | ResourceState::UnorderedAccess | ResourceState::GenericRead => {
            vk::ImageLayout::GENERAL
        }
        ResourceState::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        ResourceState::RenderTarget => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ResourceState::DepthWrite => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ResourceState::DepthRead => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        ResourceState::ShaderResource => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ResourceState::CopySource => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ResourceState::CopyDest => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ResourceState::VertexAndConstantBuffer | ResourceState::IndexBuffer => {
            vk::ImageLayout::GENERAL
        }
    }
}

/// Access mask of work done in `state`.
pub fn access_mask(state: ResourceState) -> vk::AccessFlags {
    match state {
        ResourceState::Common => {
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE
        }
        ResourceState::Present => vk::AccessFlags::empty(),
        ResourceState::RenderTarget => {
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        }
        ResourceState::DepthWrite => {
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        }
        ResourceState::DepthRead => vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
        ResourceState::ShaderResource => vk::AccessFlags::SHADER_READ,
        ResourceState::UnorderedAccess => {
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE
        }
        ResourceState::CopySource => vk::AccessFlags::TRANSFER_READ,
        ResourceState::CopyDest => vk::AccessFlags::TRANSFER_WRITE,
        ResourceState::VertexAndConstantBuffer => {
            vk::AccessFlags::UNIFORM_READ | vk::AccessFlags::SHADER_READ
        }
        ResourceState::IndexBuffer => vk::AccessFlags::INDEX_READ,
        ResourceState::GenericRead => vk::AccessFlags::HOST_WRITE | vk::AccessFlags::SHADER_READ,
    }
}

/// Pipeline stages that touch a resource in `state`.
pub fn stage_mask(state: ResourceState) -> vk::PipelineStageFlags {
    let shaders = vk::PipelineStageFlags::VERTEX_SHADER
        | vk::PipelineStageFlags::FRAGMENT_SHADER
        | vk::PipelineStageFlags::COMPUTE_SHADER;
    match state {
        ResourceState::Common => vk::PipelineStageFlags::ALL_COMMANDS,
        ResourceState::Present => vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        ResourceState::RenderTarget => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ResourceState::DepthWrite | ResourceState::DepthRead => {
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
        }
        ResourceState::ShaderResource
        | ResourceState::UnorderedAccess
        | ResourceState::VertexAndConstantBuffer
        | ResourceState::GenericRead => shaders,
        ResourceState::CopySource | ResourceState::CopyDest => vk::PipelineStageFlags::TRANSFER,
        ResourceState::IndexBuffer => vk::PipelineStageFlags::VERTEX_INPUT,
    }
}

/// Stages a queue of `kind` may name in a barrier.
fn supported_stages(kind: QueueKind) -> vk::PipelineStageFlags {
    let always = vk::PipelineStageFlags::TOP_OF_PIPE
        | vk::PipelineStageFlags::BOTTOM_OF_PIPE
        | vk::PipelineStageFlags::TRANSFER;
    match kind {
        QueueKind::Direct => vk::PipelineStageFlags::ALL_COMMANDS,
        QueueKind::Compute => always | vk::PipelineStageFlags::COMPUTE_SHADER,
        QueueKind::Copy => always,
    }
}

/// Clamp `stages` to what a queue supports, never returning an empty mask.
pub fn clamp_stages(
    stages: vk::PipelineStageFlags,
    kind: QueueKind,
    fallback: vk::PipelineStageFlags,
) -> vk::PipelineStageFlags {
    if kind == QueueKind::Direct || stages.contains(vk::PipelineStageFlags::ALL_COMMANDS) {
        return stages;
    }
    let clamped = stages & supported_stages(kind);
    if clamped.is_empty() { fallback } else { clamped }
}

/// Drop access bits a queue of `kind` cannot perform.
pub fn clamp_access(access: vk::AccessFlags, kind: QueueKind) -> vk::AccessFlags {
    let transfer = vk::AccessFlags::TRANSFER_READ
        | vk::AccessFlags::TRANSFER_WRITE
        | vk::AccessFlags::MEMORY_READ
        | vk::AccessFlags::MEMORY_WRITE;
    match kind {
        QueueKind::Direct => access,
        QueueKind::Compute => {
            access & (transfer | vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE)
        }
        QueueKind::Copy => access & transfer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_is_general() {
        assert_eq!(image_layout(ResourceState::Common), vk::ImageLayout::GENERAL);
        assert_eq!(
            image_layout(ResourceState::UnorderedAccess),
            vk::ImageLayout::GENERAL
        );
    }

    #[test]
    fn test_depth_aspect() {
        assert_eq!(
            aspect_mask(TextureFormat::Depth32Float),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_mask(TextureFormat::Rgba16Float),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn test_copy_queue_stages_are_clamped() {
        let stages = clamp_stages(
            vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::TRANSFER,
            QueueKind::Copy,
            vk::PipelineStageFlags::TOP_OF_PIPE,
        );
        assert_eq!(stages, vk::PipelineStageFlags::TRANSFER);
        let stages = clamp_stages(
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            QueueKind::Compute,
            vk::PipelineStageFlags::TOP_OF_PIPE,
        );
        assert_eq!(stages, vk::PipelineStageFlags::TOP_OF_PIPE);
    }
}
