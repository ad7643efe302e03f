//! Fixed-point propagation over the constraint registry

use super::{ConstraintId, ConstraintRegistry, Contradiction, DomainStore};
use std::collections::VecDeque;
use tracing::trace;

/// Runs constraints until no domain changes any more.
///
/// Constraints are scheduled on a FIFO worklist. After a constraint shrinks
/// a domain, every constraint watching the changed variable is scheduled
/// again (including the one that caused the change).
#[derive(Debug, Clone, Default)]
pub struct PropagationEngine {
    queue: VecDeque<ConstraintId>,
    queued: Vec<bool>,
    propagations: u64,
}

impl PropagationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule every posted constraint (used at the root of the search)
    pub fn enqueue_all(&mut self, registry: &ConstraintRegistry) {
        for id in registry.ids() {
            self.enqueue(id);
        }
    }

    /// Schedule the constraints watching variables changed since the last run
    pub fn enqueue_modified(&mut self, store: &mut DomainStore, registry: &ConstraintRegistry) {
        for variable in store.take_modified() {
            for &id in registry.watchers(variable) {
                self.enqueue(id);
            }
        }
    }

    fn enqueue(&mut self, id: ConstraintId) {
        if self.queued.len() <= id.index() {
            self.queued.resize(id.index() + 1, false);
        }
        if !self.queued[id.index()] {
            self.queued[id.index()] = true;
            self.queue.push_back(id);
        }
    }

    /// Propagate to a fixed point.
    ///
    /// Picks up any pending modifications in `store` first. On contradiction
    /// the worklist is emptied; the store is left as the failing constraint
    /// found it and must be backtracked by the caller.
    pub fn propagate(
        &mut self,
        store: &mut DomainStore,
        registry: &ConstraintRegistry,
    ) -> Result<(), Contradiction> {
        self.enqueue_modified(store, registry);

        while let Some(id) = self.queue.pop_front() {
            self.queued[id.index()] = false;
            self.propagations += 1;

            match registry.get(id).propagate(store) {
                Ok(status) => {
                    if status.is_changed() {
                        self.enqueue_modified(store, registry);
                    }
                }
                Err(contradiction) => {
                    trace!(constraint = id.index(), %contradiction, "propagation failed");
                    self.clear();
                    store.clear_modified();
                    return Err(contradiction);
                }
            }
        }

        Ok(())
    }

    fn clear(&mut self) {
        for id in self.queue.drain(..) {
            self.queued[id.index()] = false;
        }
    }

    /// Total number of constraint propagations performed
    pub fn propagations(&self) -> u64 {
        self.propagations
    }
}
