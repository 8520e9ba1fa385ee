//! Descriptor heaps.
//!
//! A [`DescriptorHeap`] is a fixed-capacity arena of view slots with a bump
//! cursor. Slots are handed out in order and never reclaimed; the returned
//! index is the stable identity of the view, and shaders address resources by
//! that index. Running past the end is a configuration error reported as
//! [`GraphicsError::DescriptorHeapExhausted`], with the cursor and every
//! existing slot left untouched.
//!
//! The device advances cursors only while holding its resource lock.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::backend::{GpuBackend, GpuDescriptorHeap, GpuResource};
use crate::error::GraphicsError;
use crate::types::{DescriptorHeapType, SamplerDescriptor, ViewDescriptor};

/// CPU address of a descriptor: heap id in the high half, slot in the low half.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CpuDescriptorHandle(u64);

impl CpuDescriptorHandle {
    pub fn new(heap_id: u32, index: u32) -> Self {
        Self((u64::from(heap_id) << 32) | u64::from(index))
    }

    pub fn heap_id(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn index(self) -> u32 {
        self.0 as u32
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for CpuDescriptorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cpu({}:{})", self.heap_id(), self.index())
    }
}

/// GPU address of a descriptor in a shader-visible heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuDescriptorHandle(u64);

impl GpuDescriptorHandle {
    const SHADER_VISIBLE_BIT: u64 = 1 << 63;

    fn new(heap_id: u32, index: u32) -> Self {
        Self(Self::SHADER_VISIBLE_BIT | CpuDescriptorHandle::new(heap_id, index).raw())
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A descriptor slot: CPU handle, GPU handle for shader-visible heaps, and
/// the stable index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorHandle {
    pub cpu: CpuDescriptorHandle,
    pub gpu: Option<GpuDescriptorHandle>,
    pub index: u32,
}

/// Bump-allocated, fixed-capacity descriptor heap.
pub struct DescriptorHeap {
    heap: GpuDescriptorHeap,
    heap_type: DescriptorHeapType,
    capacity: u32,
    cursor: AtomicU32,
}

impl DescriptorHeap {
    pub fn new(
        backend: &dyn GpuBackend,
        heap_type: DescriptorHeapType,
        capacity: u32,
    ) -> Result<Self, GraphicsError> {
        if capacity == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "{heap_type:?} heap needs a non-zero capacity"
            )));
        }
        let heap = backend.create_descriptor_heap(heap_type, capacity)?;
        log::debug!("Created {heap_type:?} descriptor heap with {capacity} slots");
        Ok(Self {
            heap,
            heap_type,
            capacity,
            cursor: AtomicU32::new(0),
        })
    }

    pub fn heap_type(&self) -> DescriptorHeapType {
        self.heap_type
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// The backend heap.
    pub fn raw(&self) -> &GpuDescriptorHeap {
        &self.heap
    }

    fn exhausted(&self) -> GraphicsError {
        GraphicsError::DescriptorHeapExhausted {
            heap: self.heap_type,
            capacity: self.capacity,
        }
    }

    fn make_handle(&self, index: u32) -> DescriptorHandle {
        let id = self.heap.id();
        DescriptorHandle {
            cpu: CpuDescriptorHandle::new(id, index),
            gpu: self
                .heap_type
                .is_shader_visible()
                .then(|| GpuDescriptorHandle::new(id, index)),
            index,
        }
    }

    /// Index of the next free slot, without consuming it.
    pub fn current_descriptor_index(&self) -> u32 {
        self.cursor.load(Ordering::Acquire)
    }

    /// Handle of the next free slot, without consuming it.
    pub fn current_descriptor_handle(&self) -> Result<DescriptorHandle, GraphicsError> {
        let index = self.current_descriptor_index();
        if index >= self.capacity {
            return Err(self.exhausted());
        }
        Ok(self.make_handle(index))
    }

    /// Advance the bump cursor by `count` slots.
    pub fn offset_current_handle(&self, count: u32) -> Result<(), GraphicsError> {
        self.cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                cursor
                    .checked_add(count)
                    .filter(|next| *next <= self.capacity)
            })
            .map(|_| ())
            .map_err(|_| self.exhausted())
    }

    /// Reserve `count` contiguous slots and return the first.
    pub fn allocate(&self, count: u32) -> Result<DescriptorHandle, GraphicsError> {
        let first = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                cursor
                    .checked_add(count)
                    .filter(|next| *next <= self.capacity)
            })
            .map_err(|_| self.exhausted())?;
        Ok(self.make_handle(first))
    }

    /// Advance an independently held handle by `count` slots.
    ///
    /// Used to build a contiguous batch of views without touching the shared
    /// cursor. The handle may end one past the last slot.
    pub fn offset_descriptor(
        &self,
        handle: &mut DescriptorHandle,
        count: u32,
    ) -> Result<(), GraphicsError> {
        let index = handle
            .index
            .checked_add(count)
            .filter(|index| *index <= self.capacity)
            .ok_or_else(|| self.exhausted())?;
        *handle = self.make_handle(index);
        Ok(())
    }

    /// Handle of slot 0, regardless of the cursor.
    pub fn descriptor_handle_from_start(&self) -> DescriptorHandle {
        self.make_handle(0)
    }

    /// Handle of an already allocated slot.
    pub fn descriptor_handle_at(&self, index: u32) -> Result<DescriptorHandle, GraphicsError> {
        if index >= self.current_descriptor_index() {
            return Err(GraphicsError::InvalidParameter(format!(
                "{:?} descriptor {index} has not been allocated",
                self.heap_type
            )));
        }
        Ok(self.make_handle(index))
    }

    /// Stable index of a handle created by this heap.
    pub fn descriptor_index(&self, handle: &DescriptorHandle) -> Result<u32, GraphicsError> {
        if handle.cpu.heap_id() != self.heap.id() {
            return Err(GraphicsError::InvalidParameter(format!(
                "descriptor {:?} does not belong to this {:?} heap",
                handle.cpu, self.heap_type
            )));
        }
        Ok(handle.cpu.index())
    }

    /// Write a resource view into an allocated slot.
    pub fn write_view(
        &self,
        handle: &DescriptorHandle,
        resource: &GpuResource,
        view: &ViewDescriptor,
    ) -> Result<(), GraphicsError> {
        let index = self.descriptor_index(handle)?;
        if index >= self.capacity {
            return Err(self.exhausted());
        }
        self.heap.write_view(index, resource, view)
    }

    /// Write a sampler into an allocated slot.
    pub fn write_sampler(
        &self,
        handle: &DescriptorHandle,
        desc: &SamplerDescriptor,
    ) -> Result<(), GraphicsError> {
        let index = self.descriptor_index(handle)?;
        if index >= self.capacity {
            return Err(self.exhausted());
        }
        self.heap.write_sampler(index, desc)
    }
}

impl fmt::Debug for DescriptorHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorHeap")
            .field("heap_type", &self.heap_type)
            .field("capacity", &self.capacity)
            .field("cursor", &self.current_descriptor_index())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;

    fn heap(heap_type: DescriptorHeapType, capacity: u32) -> DescriptorHeap {
        let backend = DummyBackend::new().unwrap();
        DescriptorHeap::new(&backend, heap_type, capacity).unwrap()
    }

    #[test]
    fn test_current_handle_does_not_consume() {
        let heap = heap(DescriptorHeapType::CbvSrvUav, 8);
        let a = heap.current_descriptor_handle().unwrap();
        let b = heap.current_descriptor_handle().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.index, 0);
        assert!(a.gpu.is_some());
        heap.offset_current_handle(1).unwrap();
        assert_eq!(heap.current_descriptor_index(), 1);
    }

    #[test]
    fn test_rtv_handles_are_cpu_only() {
        let heap = heap(DescriptorHeapType::Rtv, 4);
        let handle = heap.allocate(1).unwrap();
        assert!(handle.gpu.is_none());
        assert_eq!(heap.descriptor_index(&handle).unwrap(), 0);
    }

    #[test]
    fn test_exhaustion_is_deterministic() {
        let heap = heap(DescriptorHeapType::Dsv, 3);
        heap.offset_current_handle(3).unwrap();
        for _ in 0..2 {
            let err = heap.offset_current_handle(1).unwrap_err();
            assert_eq!(
                err,
                GraphicsError::DescriptorHeapExhausted {
                    heap: DescriptorHeapType::Dsv,
                    capacity: 3
                }
            );
            assert_eq!(heap.current_descriptor_index(), 3);
        }
        assert!(heap.current_descriptor_handle().is_err());
        assert!(heap.allocate(1).is_err());
    }

    #[test]
    fn test_partial_batch_does_not_move_cursor() {
        let heap = heap(DescriptorHeapType::CbvSrvUav, 4);
        heap.allocate(3).unwrap();
        assert!(heap.allocate(2).is_err());
        assert_eq!(heap.current_descriptor_index(), 3);
        assert_eq!(heap.allocate(1).unwrap().index, 3);
    }

    #[test]
    fn test_offset_descriptor_leaves_cursor() {
        let heap = heap(DescriptorHeapType::Rtv, 4);
        let mut handle = heap.descriptor_handle_from_start();
        heap.offset_descriptor(&mut handle, 2).unwrap();
        assert_eq!(handle.index, 2);
        assert_eq!(heap.current_descriptor_index(), 0);
        heap.offset_descriptor(&mut handle, 2).unwrap();
        assert_eq!(handle.index, 4);
        assert!(heap.offset_descriptor(&mut handle, 1).is_err());
        assert_eq!(handle.index, 4);
    }

    #[test]
    fn test_handle_at_requires_allocation() {
        let heap = heap(DescriptorHeapType::Sampler, 4);
        assert!(heap.descriptor_handle_at(0).is_err());
        heap.allocate(2).unwrap();
        assert_eq!(heap.descriptor_handle_at(1).unwrap().index, 1);
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let backend = DummyBackend::new().unwrap();
        let a = DescriptorHeap::new(&backend, DescriptorHeapType::Rtv, 2).unwrap();
        let b = DescriptorHeap::new(&backend, DescriptorHeapType::Rtv, 2).unwrap();
        let handle = a.allocate(1).unwrap();
        assert!(b.descriptor_index(&handle).is_err());
    }
}
