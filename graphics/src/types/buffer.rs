//! Buffer types and descriptors.

use super::ResourceState;

/// What a buffer is created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    /// CPU-written staging memory used as a copy source.
    UploadBuffer,
    /// CPU-readable memory used as a copy destination.
    ReadbackBuffer,
    /// Index data, device local.
    IndexBuffer,
    /// Structured (bindless vertex or instance) data, device local.
    #[default]
    StructuredBuffer,
    /// Per-frame constants, persistently mapped and updated from the CPU.
    ConstantBuffer,
}

/// Memory heap a resource is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    /// Device local, not CPU visible.
    GpuOnly,
    /// CPU visible, write-combined; the GPU reads it.
    CpuToGpu,
    /// CPU visible, cached; the GPU writes it.
    GpuToCpu,
}

impl BufferUsage {
    /// Heap the buffer is allocated from.
    pub fn memory_location(self) -> MemoryLocation {
        match self {
            Self::UploadBuffer | Self::ConstantBuffer => MemoryLocation::CpuToGpu,
            Self::ReadbackBuffer => MemoryLocation::GpuToCpu,
            Self::IndexBuffer | Self::StructuredBuffer => MemoryLocation::GpuOnly,
        }
    }

    /// State the buffer lives in for its whole lifetime once initialized.
    pub fn resting_state(self) -> ResourceState {
        match self {
            Self::UploadBuffer | Self::ConstantBuffer => ResourceState::GenericRead,
            Self::ReadbackBuffer => ResourceState::CopyDest,
            Self::IndexBuffer => ResourceState::IndexBuffer,
            Self::StructuredBuffer => ResourceState::ShaderResource,
        }
    }
}

/// Index element width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    Uint16,
    #[default]
    Uint32,
}

impl IndexFormat {
    pub fn size(self) -> u32 {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// What the buffer is created for.
    pub usage: BufferUsage,
    /// Size in bytes.
    pub size: u64,
    /// Element size in bytes for structured and index buffers.
    pub stride: u32,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(usage: BufferUsage, size: u64, stride: u32) -> Self {
        Self {
            label: None,
            usage,
            size,
            stride,
        }
    }

    /// Descriptor sized for `count` elements of `T`.
    pub fn for_elements<T>(usage: BufferUsage, count: usize) -> Self {
        let stride = std::mem::size_of::<T>();
        Self::new(usage, (stride * count) as u64, stride as u32)
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Number of whole elements in the buffer.
    pub fn element_count(&self) -> u32 {
        if self.stride == 0 {
            0
        } else {
            (self.size / u64::from(self.stride)) as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_elements() {
        let desc = BufferDescriptor::for_elements::<[f32; 3]>(BufferUsage::StructuredBuffer, 24);
        assert_eq!(desc.stride, 12);
        assert_eq!(desc.size, 288);
        assert_eq!(desc.element_count(), 24);
    }

    #[test]
    fn test_memory_locations() {
        assert_eq!(BufferUsage::ConstantBuffer.memory_location(), MemoryLocation::CpuToGpu);
        assert_eq!(BufferUsage::IndexBuffer.memory_location(), MemoryLocation::GpuOnly);
        assert_eq!(BufferUsage::ReadbackBuffer.memory_location(), MemoryLocation::GpuToCpu);
    }
}
