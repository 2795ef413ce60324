use crate::{ResourceHandle, ResourceState};

/// A state transition inserted before `before_pass` (an execution index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceBarrier {
    pub resource: ResourceHandle,
    pub src_state: ResourceState,
    pub dst_state: ResourceState,
    pub before_pass: u32,
}

impl ResourceBarrier {
    pub fn is_noop(&self) -> bool {
        self.src_state == self.dst_state
    }
}

/// Collects transition requests and produces a sorted list of real transitions.
#[derive(Debug, Default, Clone)]
pub struct ResourceBarrierBuilder {
    pending: Vec<ResourceBarrier>,
}

impl ResourceBarrierBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_texture_transition(
        &mut self,
        handle: ResourceHandle,
        src_state: ResourceState,
        dst_state: ResourceState,
        before_pass: u32,
    ) {
        debug_assert!(handle.is_texture(), "texture transition on {handle:?}");
        self.push(handle, src_state, dst_state, before_pass);
    }

    pub fn add_buffer_transition(
        &mut self,
        handle: ResourceHandle,
        src_state: ResourceState,
        dst_state: ResourceState,
        before_pass: u32,
    ) {
        debug_assert!(handle.is_buffer(), "buffer transition on {handle:?}");
        self.push(handle, src_state, dst_state, before_pass);
    }

    fn push(
        &mut self,
        resource: ResourceHandle,
        src_state: ResourceState,
        dst_state: ResourceState,
        before_pass: u32,
    ) {
        self.pending.push(ResourceBarrier {
            resource,
            src_state,
            dst_state,
            before_pass,
        });
    }

    /// Sorts by `(before_pass, resource id)`, drops no-op and repeated
    /// transitions and returns the result. Requests for the same resource at
    /// the same pass keep their submission order.
    pub fn build(&mut self) -> Vec<ResourceBarrier> {
        self.pending
            .sort_by_key(|barrier| (barrier.before_pass, barrier.resource.id));
        self.pending.retain(|barrier| !barrier.is_noop());
        self.pending.dedup();
        self.pending.clone()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_sorts_by_pass_then_id() {
        let mut builder = ResourceBarrierBuilder::new();
        let a = ResourceHandle::texture(2);
        let b = ResourceHandle::texture(1);
        builder.add_texture_transition(a, ResourceState::Common, ResourceState::RenderTarget, 1);
        builder.add_texture_transition(b, ResourceState::Common, ResourceState::RenderTarget, 1);
        builder.add_texture_transition(a, ResourceState::RenderTarget, ResourceState::ShaderResource, 0);

        let barriers = builder.build();
        let keys: Vec<_> = barriers
            .iter()
            .map(|barrier| (barrier.before_pass, barrier.resource.id))
            .collect();
        assert_eq!(keys, vec![(0, 2), (1, 1), (1, 2)]);
    }

    #[test]
    fn build_drops_noops_and_duplicates() {
        let mut builder = ResourceBarrierBuilder::new();
        let buffer = ResourceHandle::buffer(4);
        builder.add_buffer_transition(buffer, ResourceState::Common, ResourceState::Common, 0);
        builder.add_buffer_transition(buffer, ResourceState::Common, ResourceState::CopyDst, 0);
        builder.add_buffer_transition(buffer, ResourceState::Common, ResourceState::CopyDst, 0);

        let barriers = builder.build();
        assert_eq!(barriers.len(), 1);
        assert!(barriers.iter().all(|barrier| !barrier.is_noop()));
    }

    #[test]
    fn clear_keeps_previous_result() {
        let mut builder = ResourceBarrierBuilder::new();
        builder.add_texture_transition(
            ResourceHandle::texture(1),
            ResourceState::Common,
            ResourceState::RenderTarget,
            0,
        );
        let built = builder.build();
        builder.clear();

        assert!(builder.is_empty());
        assert_eq!(built.len(), 1);
        assert!(builder.build().is_empty());
    }
}
