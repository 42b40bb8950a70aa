use std::collections::BTreeSet;

use crate::definition::FormDefinition;
use crate::queue::ActionQueue;

/// Progress of one conversation through an active form.
///
/// Owned by the conversation's tracker and only changed by
/// [`crate::FormPolicy`]. `current_required` is a cache re-derived from slot
/// values on every resolution cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormRuntimeState {
    pub(crate) current_required: BTreeSet<String>,
    pub(crate) last_asked_slot: Option<String>,
    pub(crate) queue: ActionQueue,
}

impl FormRuntimeState {
    pub fn new(definition: &FormDefinition) -> Self {
        Self {
            current_required: definition.required_default().clone(),
            last_asked_slot: None,
            queue: ActionQueue::new(),
        }
    }

    pub fn current_required(&self) -> &BTreeSet<String> {
        &self.current_required
    }

    pub fn last_asked_slot(&self) -> Option<&str> {
        self.last_asked_slot.as_deref()
    }

    pub fn pending_actions(&self) -> usize {
        self.queue.len()
    }
}
