use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use slotform_contracts::ActionId;
use tracing::{debug, info, warn};

use crate::definition::FormDefinition;
use crate::resolver::SlotValues;
use crate::state::FormRuntimeState;

/// What the policy reads from the conversation.
pub trait TrackerView {
    fn latest_intent(&self) -> Option<&str>;

    fn latest_executed_action(&self) -> Option<ActionId>;

    fn current_slot_values(&self) -> SlotValues;
}

#[derive(Debug, Clone)]
pub enum TrackerEvent {
    /// A user message; `slots` carries the values extracted from it.
    UserUttered { intent: String, slots: SlotValues },
    ActionExecuted(ActionId),
    SlotSet { name: String, value: Value },
    StartForm(Arc<FormDefinition>),
    EndForm,
}

impl TrackerEvent {
    pub fn slot_set(name: impl Into<String>, value: impl Into<Value>) -> Self {
        TrackerEvent::SlotSet {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TrackerEvent::UserUttered { .. } => "user_uttered",
            TrackerEvent::ActionExecuted(_) => "action_executed",
            TrackerEvent::SlotSet { .. } => "slot_set",
            TrackerEvent::StartForm(_) => "start_form",
            TrackerEvent::EndForm => "end_form",
        }
    }
}

/// Conversation facts the policy consults between turns.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    latest_intent: Option<String>,
    latest_action: Option<ActionId>,
    slots: SlotValues,
}

impl TrackerView for Conversation {
    fn latest_intent(&self) -> Option<&str> {
        self.latest_intent.as_deref()
    }

    fn latest_executed_action(&self) -> Option<ActionId> {
        self.latest_action
    }

    fn current_slot_values(&self) -> SlotValues {
        self.slots.clone()
    }
}

#[derive(Debug, Clone)]
pub struct ActiveForm {
    pub definition: Arc<FormDefinition>,
    pub state: FormRuntimeState,
}

#[derive(Debug, Clone)]
pub struct LoggedEvent {
    pub at: DateTime<Utc>,
    pub event: TrackerEvent,
}

/// Reference tracker holding one conversation in memory.
#[derive(Debug, Clone)]
pub struct InMemoryTracker {
    sender_id: String,
    conversation: Conversation,
    active_form: Option<ActiveForm>,
    events: Vec<LoggedEvent>,
}

impl InMemoryTracker {
    pub fn new(sender_id: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            conversation: Conversation::default(),
            active_form: None,
            events: Vec::new(),
        }
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn apply(&mut self, event: TrackerEvent) {
        match &event {
            TrackerEvent::UserUttered { intent, slots } => {
                self.conversation.latest_intent = Some(intent.clone());
                self.conversation
                    .slots
                    .extend(slots.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            TrackerEvent::ActionExecuted(action) => {
                self.conversation.latest_action = Some(*action);
            }
            TrackerEvent::SlotSet { name, value } => {
                self.conversation.slots.insert(name.clone(), value.clone());
            }
            TrackerEvent::StartForm(definition) => {
                if let Some(previous) = &self.active_form {
                    warn!(
                        sender_id = %self.sender_id,
                        replaced = previous.definition.identifier(),
                        form = definition.identifier(),
                        "form started while another was active, replacing it"
                    );
                }
                info!(
                    sender_id = %self.sender_id,
                    form = definition.identifier(),
                    kind = definition.kind().as_str(),
                    digest = definition.digest(),
                    "form activated"
                );
                self.active_form = Some(ActiveForm {
                    state: FormRuntimeState::new(definition),
                    definition: Arc::clone(definition),
                });
            }
            TrackerEvent::EndForm => match self.active_form.take() {
                Some(active) => info!(
                    sender_id = %self.sender_id,
                    form = active.definition.identifier(),
                    "form deactivated"
                ),
                None => debug!(sender_id = %self.sender_id, "end_form with no active form"),
            },
        }
        self.events.push(LoggedEvent {
            at: Utc::now(),
            event,
        });
    }

    pub fn apply_all<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = TrackerEvent>,
    {
        for event in events {
            self.apply(event);
        }
    }

    pub fn active_form(&self) -> Option<&ActiveForm> {
        self.active_form.as_ref()
    }

    /// Read view of the conversation alongside the mutable form instance, as
    /// the policy needs both in one call.
    pub fn active_form_parts(&mut self) -> Option<(&Conversation, &mut ActiveForm)> {
        let conversation = &self.conversation;
        self.active_form
            .as_mut()
            .map(|active| (conversation, active))
    }

    pub fn events(&self) -> &[LoggedEvent] {
        &self.events
    }
}

impl TrackerView for InMemoryTracker {
    fn latest_intent(&self) -> Option<&str> {
        self.conversation.latest_intent()
    }

    fn latest_executed_action(&self) -> Option<ActionId> {
        self.conversation.latest_executed_action()
    }

    fn current_slot_values(&self) -> SlotValues {
        self.conversation.current_slot_values()
    }
}
