//! GPU memory allocation.
//!
//! The [`MemoryAllocator`] creates backend resources in the heap their usage
//! calls for and wraps each in an [`Allocation`], the exclusive owner of the
//! native resource. Dropping an allocation releases it immediately, so owners
//! must make sure no queue still references it (the device flushes before
//! resize and teardown).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{GpuBackend, GpuResource, GpuResourceHandle};
use crate::error::GraphicsError;
use crate::types::{BufferDescriptor, MemoryLocation, TextureDescriptor};

/// Running totals over all live allocations.
#[derive(Debug, Default)]
struct AllocatorStats {
    live_allocations: AtomicU64,
    live_bytes: AtomicU64,
    total_allocations: AtomicU64,
}

/// Snapshot of allocator statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryReport {
    pub live_allocations: u64,
    pub live_bytes: u64,
    pub total_allocations: u64,
}

/// Exclusive owner of a GPU resource.
pub struct Allocation {
    resource: GpuResource,
    size: u64,
    location: MemoryLocation,
    stats: Arc<AllocatorStats>,
}

impl Allocation {
    pub fn resource(&self) -> &GpuResource {
        &self.resource
    }

    pub fn handle(&self) -> GpuResourceHandle {
        self.resource.handle()
    }

    /// Size in bytes accounted for this allocation.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn location(&self) -> MemoryLocation {
        self.location
    }
}

impl fmt::Debug for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocation")
            .field("resource", &self.resource)
            .field("size", &self.size)
            .field("location", &self.location)
            .finish()
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.stats.live_allocations.fetch_sub(1, Ordering::Relaxed);
        self.stats.live_bytes.fetch_sub(self.size, Ordering::Relaxed);
    }
}

/// Creates resources and tracks how much memory they use.
pub struct MemoryAllocator {
    backend: Arc<dyn GpuBackend>,
    stats: Arc<AllocatorStats>,
}

impl MemoryAllocator {
    pub fn new(backend: Arc<dyn GpuBackend>) -> Self {
        Self {
            backend,
            stats: Arc::new(AllocatorStats::default()),
        }
    }

    fn wrap(&self, resource: GpuResource, size: u64, location: MemoryLocation) -> Allocation {
        self.stats.live_allocations.fetch_add(1, Ordering::Relaxed);
        self.stats.live_bytes.fetch_add(size, Ordering::Relaxed);
        self.stats.total_allocations.fetch_add(1, Ordering::Relaxed);
        Allocation {
            resource,
            size,
            location,
            stats: Arc::clone(&self.stats),
        }
    }

    /// Allocate a device-local texture.
    pub fn allocate_texture(&self, desc: &TextureDescriptor) -> Result<Allocation, GraphicsError> {
        let resource = self.backend.create_texture(desc)?;
        // Full mip chains add roughly a third on top of mip 0.
        let size = (0..desc.mip_levels)
            .map(|level| {
                let extent = desc.mip_extent(level);
                u64::from(extent.width)
                    * u64::from(extent.height)
                    * u64::from(desc.array_layers)
                    * u64::from(desc.format.block_size())
            })
            .sum();
        log::debug!(
            "Allocated texture {:?} ({}x{}, {} bytes)",
            desc.label,
            desc.width,
            desc.height,
            size
        );
        Ok(self.wrap(resource, size, MemoryLocation::GpuOnly))
    }

    /// Allocate a buffer in the heap its usage calls for.
    pub fn allocate_buffer(&self, desc: &BufferDescriptor) -> Result<Allocation, GraphicsError> {
        let resource = self.backend.create_buffer(desc)?;
        let location = desc.usage.memory_location();
        log::debug!(
            "Allocated {:?} buffer {:?} ({} bytes, {:?})",
            desc.usage,
            desc.label,
            desc.size,
            location
        );
        Ok(self.wrap(resource, desc.size, location))
    }

    pub fn report(&self) -> MemoryReport {
        MemoryReport {
            live_allocations: self.stats.live_allocations.load(Ordering::Relaxed),
            live_bytes: self.stats.live_bytes.load(Ordering::Relaxed),
            total_allocations: self.stats.total_allocations.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for MemoryAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryAllocator")
            .field("report", &self.report())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::types::{BufferUsage, TextureFormat, TextureUsage};

    #[test]
    fn test_stats_follow_allocation_lifetime() {
        let allocator = MemoryAllocator::new(Arc::new(DummyBackend::new().unwrap()));
        let buffer = allocator
            .allocate_buffer(&BufferDescriptor::new(BufferUsage::ConstantBuffer, 256, 0))
            .unwrap();
        let texture = allocator
            .allocate_texture(&TextureDescriptor::new_2d(
                4,
                4,
                TextureFormat::Rgba8Unorm,
                TextureUsage::RenderTarget,
            ))
            .unwrap();
        assert_eq!(buffer.location(), MemoryLocation::CpuToGpu);
        assert_eq!(
            allocator.report(),
            MemoryReport {
                live_allocations: 2,
                live_bytes: 256 + 64,
                total_allocations: 2,
            }
        );
        drop(buffer);
        drop(texture);
        let report = allocator.report();
        assert_eq!(report.live_allocations, 0);
        assert_eq!(report.live_bytes, 0);
        assert_eq!(report.total_allocations, 2);
    }

    #[test]
    fn test_mip_chain_accounting() {
        let allocator = MemoryAllocator::new(Arc::new(DummyBackend::new().unwrap()));
        let desc = TextureDescriptor::new_2d(4, 4, TextureFormat::R8Unorm, TextureUsage::UavTexture)
            .with_full_mip_chain();
        let texture = allocator.allocate_texture(&desc).unwrap();
        assert_eq!(texture.size(), 16 + 4 + 1);
    }
}
