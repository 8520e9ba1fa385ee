//! GPU buffer resource.

use crate::backend::{GpuResource, GpuResourceHandle};
use crate::error::GraphicsError;
use crate::memory::Allocation;
use crate::types::{BufferDescriptor, BufferUsage, IndexFormat, MemoryLocation};

/// A GPU memory buffer.
///
/// Buffers are created by [`Device::create_buffer`](crate::Device::create_buffer).
/// Structured buffers carry an SRV index, constant buffers a CBV index.
#[derive(Debug)]
pub struct Buffer {
    allocation: Allocation,
    descriptor: BufferDescriptor,
    srv: Option<u32>,
    cbv: Option<u32>,
}

impl Buffer {
    pub(crate) fn new(
        allocation: Allocation,
        descriptor: BufferDescriptor,
        srv: Option<u32>,
        cbv: Option<u32>,
    ) -> Self {
        Self {
            allocation,
            descriptor,
            srv,
            cbv,
        }
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.descriptor.usage
    }

    pub fn element_count(&self) -> u32 {
        self.descriptor.element_count()
    }

    /// Index width, from the stride of an index buffer.
    pub fn index_format(&self) -> IndexFormat {
        if self.descriptor.stride == 2 {
            IndexFormat::Uint16
        } else {
            IndexFormat::Uint32
        }
    }

    pub fn resource(&self) -> &GpuResource {
        self.allocation.resource()
    }

    pub fn handle(&self) -> GpuResourceHandle {
        self.allocation.handle()
    }

    pub fn location(&self) -> MemoryLocation {
        self.allocation.location()
    }

    pub fn srv_index(&self) -> Option<u32> {
        self.srv
    }

    pub fn cbv_index(&self) -> Option<u32> {
        self.cbv
    }

    /// Write into a CPU-visible buffer.
    ///
    /// The caller must make sure the GPU is not reading the written range,
    /// e.g. by keeping one constant buffer per frame slot.
    pub fn update(&self, offset: u64, data: &[u8]) -> Result<(), GraphicsError> {
        if self.location() == MemoryLocation::GpuOnly {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer {:?} is device local and cannot be updated from the CPU",
                self.descriptor.label
            )));
        }
        self.allocation.resource().write(offset, data)
    }

    /// Read from a CPU-visible buffer.
    pub fn read(&self, offset: u64, size: u64) -> Result<Vec<u8>, GraphicsError> {
        if self.location() == MemoryLocation::GpuOnly {
            return Err(GraphicsError::InvalidParameter(format!(
                "buffer {:?} is device local and cannot be read from the CPU",
                self.descriptor.label
            )));
        }
        self.allocation.resource().read(offset, size)
    }
}
