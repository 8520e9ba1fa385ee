//! Barrier batching.
//!
//! Transitions are collected for every resource a pass hands over, then
//! recorded as a single barrier call when the batch is flushed.

use crate::backend::{GpuResourceHandle, ResourceBarrier};
use crate::types::ResourceState;

/// A batch of resource transitions to record together.
#[derive(Debug, Default, Clone)]
pub struct BarrierBatch {
    barriers: Vec<ResourceBarrier>,
}

impl BarrierBatch {
    /// Create a new empty barrier batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transition.
    ///
    /// Transitions where `before == after` are skipped. A second transition
    /// of a resource already in the batch is chained onto the first
    /// (`A -> B` then `B -> C` records `A -> C`); a chain that returns to its
    /// starting state cancels out.
    pub fn add(&mut self, resource: GpuResourceHandle, before: ResourceState, after: ResourceState) {
        if before == after {
            return;
        }

        if let Some(pos) = self
            .barriers
            .iter()
            .position(|b| b.resource == resource && b.after == before)
        {
            let first = self.barriers[pos].before;
            if first == after {
                self.barriers.remove(pos);
            } else {
                self.barriers[pos].after = after;
            }
            return;
        }

        self.barriers.push(ResourceBarrier {
            resource,
            before,
            after,
        });
    }

    /// Check if the batch has any barriers.
    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }

    /// Get the number of barriers in the batch.
    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    pub fn barriers(&self) -> &[ResourceBarrier] {
        &self.barriers
    }

    /// Take the collected barriers, leaving the batch empty.
    pub fn take(&mut self) -> Vec<ResourceBarrier> {
        std::mem::take(&mut self.barriers)
    }

    /// Drop all collected barriers.
    pub fn clear(&mut self) {
        self.barriers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::ResourceId;

    fn handle(id: u64) -> GpuResourceHandle {
        GpuResourceHandle::Dummy(ResourceId(id))
    }

    #[test]
    fn test_self_transition_elided() {
        let mut batch = BarrierBatch::new();
        batch.add(handle(1), ResourceState::ShaderResource, ResourceState::ShaderResource);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_order_preserved() {
        let mut batch = BarrierBatch::new();
        batch.add(handle(2), ResourceState::ShaderResource, ResourceState::RenderTarget);
        batch.add(handle(1), ResourceState::DepthWrite, ResourceState::ShaderResource);
        let resources: Vec<_> = batch.barriers().iter().map(|b| b.resource).collect();
        assert_eq!(resources, vec![handle(2), handle(1)]);
    }

    #[test]
    fn test_chained_transitions_merge() {
        let mut batch = BarrierBatch::new();
        batch.add(handle(1), ResourceState::Common, ResourceState::CopyDest);
        batch.add(handle(1), ResourceState::CopyDest, ResourceState::ShaderResource);
        assert_eq!(
            batch.barriers(),
            &[ResourceBarrier {
                resource: handle(1),
                before: ResourceState::Common,
                after: ResourceState::ShaderResource,
            }]
        );
    }

    #[test]
    fn test_round_trip_cancels() {
        let mut batch = BarrierBatch::new();
        batch.add(handle(1), ResourceState::DepthWrite, ResourceState::ShaderResource);
        batch.add(handle(1), ResourceState::ShaderResource, ResourceState::DepthWrite);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_take_empties_batch() {
        let mut batch = BarrierBatch::new();
        batch.add(handle(1), ResourceState::Present, ResourceState::RenderTarget);
        assert_eq!(batch.take().len(), 1);
        assert_eq!(batch.len(), 0);
    }
}
