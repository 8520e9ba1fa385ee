//! GPU resource access states.

/// Access state of a GPU resource.
///
/// A resource is in exactly one state at a time on the GPU timeline. Moving
/// between states requires a resource barrier recorded on a context; using a
/// resource in a state other than the one its barrier declared is a
/// programming error reported by the backend's validation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Initial state of most resources. Copy operations may implicitly
    /// promote a resource out of this state.
    #[default]
    Common,
    /// Swapchain back buffer ready for presentation.
    Present,
    /// Bound as a color render target.
    RenderTarget,
    /// Bound as a writable depth buffer.
    DepthWrite,
    /// Bound as a read-only depth buffer.
    DepthRead,
    /// Sampled or read by any shader stage.
    ShaderResource,
    /// Read and written through an unordered access view.
    UnorderedAccess,
    /// Source of a copy operation.
    CopySource,
    /// Destination of a copy operation.
    CopyDest,
    /// Bound as a constant or vertex buffer.
    VertexAndConstantBuffer,
    /// Bound as an index buffer.
    IndexBuffer,
    /// CPU-visible upload memory.
    GenericRead,
}

impl ResourceState {
    /// Whether the GPU may write to a resource in this state.
    pub fn is_writable(self) -> bool {
        matches!(
            self,
            Self::RenderTarget | Self::DepthWrite | Self::UnorderedAccess | Self::CopyDest
        )
    }

    /// Whether a copy may implicitly promote a resource from this state.
    pub fn allows_copy_promotion(self) -> bool {
        matches!(self, Self::Common | Self::Present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writable_states() {
        assert!(ResourceState::RenderTarget.is_writable());
        assert!(ResourceState::UnorderedAccess.is_writable());
        assert!(!ResourceState::ShaderResource.is_writable());
        assert!(!ResourceState::Present.is_writable());
    }

    #[test]
    fn test_default_is_common() {
        assert_eq!(ResourceState::default(), ResourceState::Common);
        assert!(ResourceState::Common.allows_copy_promotion());
        assert!(!ResourceState::RenderTarget.allows_copy_promotion());
    }
}
