use std::sync::Arc;

use crate::definition::FormDefinition;
use crate::resolver::{is_complete, SlotValues};
use crate::tracker::TrackerEvent;

/// Events that open a form: attach a fresh runtime state and flag the kind's
/// active slot.
pub fn activation_events(definition: &Arc<FormDefinition>) -> Vec<TrackerEvent> {
    vec![
        TrackerEvent::StartForm(Arc::clone(definition)),
        TrackerEvent::slot_set(definition.kind().active_slot(), true),
    ]
}

/// Events that close a form. The completion flag reflects `slot_values` at
/// the moment of ending.
pub fn deactivation_events(
    definition: &FormDefinition,
    slot_values: &SlotValues,
) -> Vec<TrackerEvent> {
    let kind = definition.kind();
    vec![
        TrackerEvent::EndForm,
        TrackerEvent::slot_set(kind.active_slot(), false),
        TrackerEvent::slot_set(kind.complete_slot(), is_complete(definition, slot_values)),
    ]
}
