//! Pipeline state descriptors.

use std::fmt;
use std::sync::Arc;

use super::{CompareFunction, TextureFormat};

/// An opaque compiled shader binary.
///
/// The engine never inspects the bytes; the backend hands them to the
/// driver (SPIR-V for Vulkan).
#[derive(Clone)]
pub struct ShaderBinary {
    name: Arc<str>,
    bytes: Arc<[u8]>,
}

impl ShaderBinary {
    pub fn new(name: impl Into<Arc<str>>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for ShaderBinary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderBinary")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Primitive assembly topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

/// Face culling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

/// Color blending applied to every render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Opaque,
    Additive,
    AlphaBlend,
}

/// Depth test configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub test_enabled: bool,
    pub write_enabled: bool,
    pub compare: CompareFunction,
}

impl DepthState {
    /// Depth test and write with `LessEqual`.
    pub const READ_WRITE: Self = Self {
        test_enabled: true,
        write_enabled: true,
        compare: CompareFunction::LessEqual,
    };

    /// Depth test without writes.
    pub const READ_ONLY: Self = Self {
        test_enabled: true,
        write_enabled: false,
        compare: CompareFunction::LessEqual,
    };

    /// No depth test.
    pub const DISABLED: Self = Self {
        test_enabled: false,
        write_enabled: false,
        compare: CompareFunction::Always,
    };
}

impl Default for DepthState {
    fn default() -> Self {
        Self::READ_WRITE
    }
}

/// Descriptor for creating a graphics pipeline state.
///
/// All pipelines share the engine's bindless binding layout: resources are
/// addressed by descriptor index through 32-bit root constants, so no vertex
/// input layout is declared.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDescriptor {
    pub label: Option<String>,
    pub vertex_shader: ShaderBinary,
    pub pixel_shader: ShaderBinary,
    pub render_target_formats: Vec<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
    pub depth: DepthState,
    pub cull_mode: CullMode,
    pub blend: BlendMode,
    pub topology: PrimitiveTopology,
}

impl GraphicsPipelineDescriptor {
    pub fn new(vertex_shader: ShaderBinary, pixel_shader: ShaderBinary) -> Self {
        Self {
            label: None,
            vertex_shader,
            pixel_shader,
            render_target_formats: vec![TextureFormat::Rgba8Unorm],
            depth_format: Some(TextureFormat::Depth32Float),
            depth: DepthState::READ_WRITE,
            cull_mode: CullMode::Back,
            blend: BlendMode::Opaque,
            topology: PrimitiveTopology::TriangleList,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_render_targets(mut self, formats: &[TextureFormat]) -> Self {
        self.render_target_formats = formats.to_vec();
        self
    }

    /// Set the depth format, or `None` for passes without a depth buffer.
    pub fn with_depth(mut self, format: Option<TextureFormat>, state: DepthState) -> Self {
        self.depth_format = format;
        self.depth = if format.is_some() {
            state
        } else {
            DepthState::DISABLED
        };
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }
}

/// Descriptor for creating a compute pipeline state.
#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor {
    pub label: Option<String>,
    pub shader: ShaderBinary,
}

impl ComputePipelineDescriptor {
    pub fn new(shader: ShaderBinary) -> Self {
        Self {
            label: None,
            shader,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depthless_pipeline_disables_depth() {
        let vs = ShaderBinary::new("fullscreen_vs", vec![0u8; 4]);
        let ps = ShaderBinary::new("composite_ps", vec![0u8; 4]);
        let desc = GraphicsPipelineDescriptor::new(vs, ps).with_depth(None, DepthState::READ_WRITE);
        assert_eq!(desc.depth, DepthState::DISABLED);
        assert!(desc.depth_format.is_none());
    }

    #[test]
    fn test_shader_binary_debug_hides_bytes() {
        let shader = ShaderBinary::new("gbuffer_ps", vec![1u8; 128]);
        let debug = format!("{shader:?}");
        assert!(debug.contains("gbuffer_ps"));
        assert!(debug.contains("128"));
    }
}
