//! GPU-timeline resource state tracking for the dummy backend.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::types::ResourceState;

use super::ResourceId;

struct Tracked {
    label: String,
    state: ResourceState,
}

/// Per-resource state table plus the messages produced while checking it.
pub(crate) struct ValidationLayer {
    enabled: bool,
    resources: Mutex<HashMap<ResourceId, Tracked>>,
    messages: Mutex<Vec<String>>,
}

impl ValidationLayer {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            resources: Mutex::new(HashMap::new()),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn register(&self, id: ResourceId, label: &str, state: ResourceState) {
        self.resources.lock().insert(
            id,
            Tracked {
                label: label.to_string(),
                state,
            },
        );
    }

    pub(crate) fn forget(&self, id: ResourceId) {
        self.resources.lock().remove(&id);
    }

    pub(crate) fn tracked_count(&self) -> usize {
        self.resources.lock().len()
    }

    pub(crate) fn state_of(&self, id: ResourceId) -> Option<ResourceState> {
        self.resources.lock().get(&id).map(|r| r.state)
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub(crate) fn clear(&self) {
        self.messages.lock().clear();
    }

    pub(crate) fn report(&self, message: String) {
        if !self.enabled {
            return;
        }
        log::error!("validation: {message}");
        self.messages.lock().push(message);
    }

    fn label(&self, id: ResourceId) -> String {
        self.resources
            .lock()
            .get(&id)
            .map_or_else(|| format!("resource {id}"), |r| r.label.clone())
    }

    /// Apply a transition, checking the declared `before` state.
    pub(crate) fn transition(&self, id: ResourceId, before: ResourceState, after: ResourceState) {
        if before == after {
            self.report(format!(
                "redundant transition {before:?} -> {after:?} on {}",
                self.label(id)
            ));
            return;
        }
        let mismatch = {
            let mut resources = self.resources.lock();
            match resources.get_mut(&id) {
                Some(tracked) => {
                    let current = tracked.state;
                    tracked.state = after;
                    (current != before).then(|| (tracked.label.clone(), current))
                }
                None => Some((format!("resource {id}"), ResourceState::Common)),
            }
        };
        if let Some((label, current)) = mismatch {
            self.report(format!(
                "barrier on {label} declares {before:?} but the resource is in {current:?}"
            ));
        }
    }

    /// Check that a resource is in one of `allowed` states for `usage`.
    pub(crate) fn expect_state(&self, id: ResourceId, allowed: &[ResourceState], usage: &str) {
        let current = self.state_of(id);
        match current {
            Some(state) if allowed.contains(&state) => {}
            Some(state) => self.report(format!(
                "{} used as {usage} while in {state:?} (expected {allowed:?})",
                self.label(id)
            )),
            None => self.report(format!("{usage} uses unknown resource {id}")),
        }
    }

    /// Check a copy endpoint, implicitly promoting resources in `Common`.
    ///
    /// Returns true when the resource was promoted; it decays back to
    /// `Common` at the end of the command list.
    pub(crate) fn copy_access(
        &self,
        id: ResourceId,
        required: ResourceState,
        also_allowed: &[ResourceState],
    ) -> bool {
        let outcome = {
            let mut resources = self.resources.lock();
            match resources.get_mut(&id) {
                Some(tracked) if tracked.state == required || also_allowed.contains(&tracked.state) => {
                    Ok(false)
                }
                Some(tracked) if tracked.state.allows_copy_promotion() => {
                    tracked.state = required;
                    Ok(true)
                }
                Some(tracked) => Err(format!(
                    "{} used as copy {} while in {:?}",
                    tracked.label,
                    if required == ResourceState::CopySource {
                        "source"
                    } else {
                        "destination"
                    },
                    tracked.state
                )),
                None => Err(format!("copy uses unknown resource {id}")),
            }
        };
        match outcome {
            Ok(promoted) => promoted,
            Err(message) => {
                self.report(message);
                false
            }
        }
    }

    /// Return resources to `Common`, as happens at the end of a command list
    /// to implicitly promoted resources and everything a copy queue touched.
    pub(crate) fn decay(&self, ids: &[ResourceId]) {
        let mut resources = self.resources.lock();
        for id in ids {
            if let Some(tracked) = resources.get_mut(id) {
                tracked.state = ResourceState::Common;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatched_before_state() {
        let layer = ValidationLayer::new(true);
        let id = ResourceId(1);
        layer.register(id, "gbuffer albedo", ResourceState::ShaderResource);
        layer.transition(id, ResourceState::RenderTarget, ResourceState::ShaderResource);
        let messages = layer.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("gbuffer albedo"));
        assert!(messages[0].contains("RenderTarget"));
    }

    #[test]
    fn test_self_transition_reported() {
        let layer = ValidationLayer::new(true);
        let id = ResourceId(1);
        layer.register(id, "depth", ResourceState::DepthWrite);
        layer.transition(id, ResourceState::DepthWrite, ResourceState::DepthWrite);
        assert_eq!(layer.messages().len(), 1);
        assert_eq!(layer.state_of(id), Some(ResourceState::DepthWrite));
    }

    #[test]
    fn test_copy_promotion_and_decay() {
        let layer = ValidationLayer::new(true);
        let id = ResourceId(7);
        layer.register(id, "upload target", ResourceState::Common);
        assert!(layer.copy_access(id, ResourceState::CopyDest, &[]));
        assert_eq!(layer.state_of(id), Some(ResourceState::CopyDest));
        layer.decay(&[id]);
        assert_eq!(layer.state_of(id), Some(ResourceState::Common));
        assert!(layer.messages().is_empty());
    }

    #[test]
    fn test_copy_from_render_target_reported() {
        let layer = ValidationLayer::new(true);
        let id = ResourceId(2);
        layer.register(id, "hdr", ResourceState::RenderTarget);
        assert!(!layer.copy_access(id, ResourceState::CopySource, &[]));
        assert_eq!(layer.messages().len(), 1);
    }

    #[test]
    fn test_disabled_layer_stays_silent() {
        let layer = ValidationLayer::new(false);
        let id = ResourceId(3);
        layer.register(id, "ao", ResourceState::ShaderResource);
        layer.transition(id, ResourceState::Present, ResourceState::RenderTarget);
        assert!(layer.messages().is_empty());
        assert_eq!(layer.state_of(id), Some(ResourceState::RenderTarget));
    }
}
