//! Graphics error types.
//!
//! Every fallible call in the crate returns [`GraphicsError`]. Apart from
//! [`GraphicsError::AssetLoad`], all variants are fatal: the engine does not
//! attempt in-frame recovery from partial GPU state, the error is propagated
//! to the application which reports it and terminates.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::DescriptorHeapType;

/// Errors that can occur in the graphics system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// No adapter passed the selection criteria.
    #[error("no compatible GPU adapter found")]
    NoSuitableAdapter,
    /// Failed to initialize the graphics system.
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    /// Failed to create a resource.
    #[error("resource creation failed: {0}")]
    ResourceCreationFailed(String),
    /// Failed to create a pipeline state or its binding layout.
    #[error("pipeline creation failed: {0}")]
    PipelineCreationFailed(String),
    /// A descriptor heap ran out of slots.
    #[error("{heap:?} descriptor heap exhausted (capacity {capacity})")]
    DescriptorHeapExhausted {
        heap: DescriptorHeapType,
        capacity: u32,
    },
    /// Command list submission was rejected.
    #[error("command submission failed: {0}")]
    SubmissionFailed(String),
    /// The GPU device was lost.
    #[error("GPU device lost")]
    DeviceLost,
    /// Presenting or resizing the swapchain failed.
    #[error("swapchain operation failed: {0}")]
    SwapchainFailed(String),
    /// A requested format or feature is not supported.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// An invalid parameter was provided.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// An asset file could not be read or decoded.
    #[error("failed to load asset {}: {reason}", path.display())]
    AssetLoad { path: PathBuf, reason: String },
    /// Device configuration could not be read or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GraphicsError {
    /// Whether the caller may recover, e.g. by substituting a placeholder.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AssetLoad { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::DeviceLost;
        assert_eq!(err.to_string(), "GPU device lost");

        let err = GraphicsError::InitializationFailed("no queue family".to_string());
        assert_eq!(err.to_string(), "initialization failed: no queue family");
    }

    #[test]
    fn test_heap_exhausted_display() {
        let err = GraphicsError::DescriptorHeapExhausted {
            heap: DescriptorHeapType::Rtv,
            capacity: 4,
        };
        assert_eq!(err.to_string(), "Rtv descriptor heap exhausted (capacity 4)");
    }

    #[test]
    fn test_asset_error_names_path() {
        let err = GraphicsError::AssetLoad {
            path: PathBuf::from("textures/missing.png"),
            reason: "file not found".to_string(),
        };
        assert!(err.to_string().contains("textures/missing.png"));
        assert!(err.is_recoverable());
        assert!(!GraphicsError::DeviceLost.is_recoverable());
    }
}
