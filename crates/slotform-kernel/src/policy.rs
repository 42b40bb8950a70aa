use slotform_contracts::{ActionId, ACTION_LISTEN};
use thiserror::Error;
use tracing::{debug, trace};

use crate::catalog::{ActionCatalog, UnknownAction};
use crate::definition::FormDefinition;
use crate::resolver::{required_now, unfilled, SlotValues};
use crate::state::FormRuntimeState;
use crate::tracker::TrackerView;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error(transparent)]
    UnknownAction(#[from] UnknownAction),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySettings {
    pub listen_action: String,
    /// Strip the kind's namespace (`form_` / `plan_`) from incoming intents.
    pub strip_intent_prefix: bool,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            listen_action: ACTION_LISTEN.to_string(),
            strip_intent_prefix: true,
        }
    }
}

/// Branch a resolution cycle took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Exit { intent: String },
    Chitchat { intent: String, resume_slot: String },
    Clarification { slot: String },
    Ask { slot: String },
    Finish,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnSource {
    /// Served from the pending queue; no resolution ran.
    Queue,
    Resolved(Decision),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub action: ActionId,
    pub source: TurnSource,
}

/// Picks which unfilled slot to ask next. `unfilled` is never empty and is
/// already in priority order.
pub trait SlotSelector {
    fn select<'a>(&self, unfilled: &'a [String]) -> Option<&'a str>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LowestPriority;

impl SlotSelector for LowestPriority {
    fn select<'a>(&self, unfilled: &'a [String]) -> Option<&'a str> {
        unfilled.first().map(String::as_str)
    }
}

/// Actions of one resolution cycle, served head first.
struct Plan {
    decision: Decision,
    head: String,
    tail: Vec<String>,
}

pub struct FormPolicy<'a, S = LowestPriority> {
    definition: &'a FormDefinition,
    settings: &'a PolicySettings,
    selector: S,
}

impl<'a> FormPolicy<'a, LowestPriority> {
    pub fn new(definition: &'a FormDefinition, settings: &'a PolicySettings) -> Self {
        Self {
            definition,
            settings,
            selector: LowestPriority,
        }
    }
}

impl<'a, S: SlotSelector> FormPolicy<'a, S> {
    pub fn with_selector<T: SlotSelector>(self, selector: T) -> FormPolicy<'a, T> {
        FormPolicy {
            definition: self.definition,
            settings: self.settings,
            selector,
        }
    }

    pub fn next_action(
        &self,
        state: &mut FormRuntimeState,
        tracker: &dyn TrackerView,
        catalog: &dyn ActionCatalog,
    ) -> Result<ActionId, PolicyError> {
        self.next_turn(state, tracker, catalog).map(|turn| turn.action)
    }

    /// Serves the queue if anything is pending, otherwise runs one
    /// resolution cycle and refills it. Action names are resolved before the
    /// queue is touched, so a failed lookup leaves the state unchanged apart
    /// from the recomputed required set.
    pub fn next_turn(
        &self,
        state: &mut FormRuntimeState,
        tracker: &dyn TrackerView,
        catalog: &dyn ActionCatalog,
    ) -> Result<Turn, PolicyError> {
        if let Some(action) = state.queue.dequeue_next() {
            trace!(form = self.definition.identifier(), %action, "serving queued action");
            return Ok(Turn {
                action,
                source: TurnSource::Queue,
            });
        }

        let intent = self.classify(tracker.latest_intent());
        let slot_values = tracker.current_slot_values();
        state.current_required = required_now(self.definition, &slot_values);

        let plan = self.plan(
            intent,
            state,
            tracker.latest_executed_action(),
            &slot_values,
            catalog,
        )?;
        let action = catalog.index_for_action(&plan.head)?;
        let tail = plan
            .tail
            .iter()
            .map(|name| catalog.index_for_action(name))
            .collect::<Result<Vec<_>, _>>()?;

        if let Decision::Ask { slot } = &plan.decision {
            state.last_asked_slot = Some(slot.clone());
        }
        state.queue.enqueue(tail);

        debug!(
            form = self.definition.identifier(),
            intent,
            decision = ?plan.decision,
            action = %plan.head,
            queued = state.queue.len(),
            "resolved next action"
        );
        Ok(Turn {
            action,
            source: TurnSource::Resolved(plan.decision),
        })
    }

    fn classify<'t>(&self, intent: Option<&'t str>) -> &'t str {
        let intent = intent.unwrap_or_default();
        if self.settings.strip_intent_prefix {
            intent
                .strip_prefix(self.definition.kind().intent_prefix())
                .unwrap_or(intent)
        } else {
            intent
        }
    }

    fn plan(
        &self,
        intent: &str,
        state: &FormRuntimeState,
        latest_action: Option<ActionId>,
        slot_values: &SlotValues,
        catalog: &dyn ActionCatalog,
    ) -> Result<Plan, PolicyError> {
        let definition = self.definition;

        if let Some(exit) = definition.exit_action(intent) {
            return Ok(Plan {
                decision: Decision::Exit {
                    intent: intent.to_string(),
                },
                head: exit.to_string(),
                tail: Vec::new(),
            });
        }

        if let Some(chitchat) = definition.chitchat_action(intent) {
            if !self.latest_is_chitchat(latest_action, catalog)? {
                match state.last_asked_slot() {
                    Some(slot) => {
                        return Ok(Plan {
                            decision: Decision::Chitchat {
                                intent: intent.to_string(),
                                resume_slot: slot.to_string(),
                            },
                            head: chitchat.to_string(),
                            tail: self.resume_question(slot),
                        });
                    }
                    None => debug!(
                        form = definition.identifier(),
                        intent, "chitchat before any question was asked, continuing form"
                    ),
                }
            }
        }

        if definition.clarification_intent() == Some(intent) {
            if let Some(slot) = state.last_asked_slot() {
                match definition.slot(slot).and_then(|s| s.clarify_action.as_deref()) {
                    Some(clarify) => {
                        if !is_latest(latest_action, clarify, catalog)? {
                            return Ok(Plan {
                                decision: Decision::Clarification {
                                    slot: slot.to_string(),
                                },
                                head: clarify.to_string(),
                                tail: self.resume_question(slot),
                            });
                        }
                    }
                    None => debug!(
                        form = definition.identifier(),
                        slot, "no clarify action for slot, continuing form"
                    ),
                }
            }
        }

        let pending = unfilled(definition, &state.current_required, slot_values);
        let next = self
            .selector
            .select(&pending)
            .or_else(|| pending.first().map(String::as_str));
        Ok(match next {
            None => Plan {
                decision: Decision::Finish,
                head: definition.finish_action().to_string(),
                tail: vec![self.settings.listen_action.clone()],
            },
            Some(slot) => Plan {
                decision: Decision::Ask {
                    slot: slot.to_string(),
                },
                head: self.definition.ask_action(slot).into_owned(),
                tail: self.after_question(slot),
            },
        })
    }

    /// `[listen, follow_up?]` served after asking for `slot`.
    fn after_question(&self, slot: &str) -> Vec<String> {
        let mut actions = vec![self.settings.listen_action.clone()];
        actions.extend(
            self.definition
                .slot(slot)
                .and_then(|s| s.follow_up_action.clone()),
        );
        actions
    }

    /// `[ask, listen, follow_up?]`, returning the user to the last question.
    fn resume_question(&self, slot: &str) -> Vec<String> {
        let mut actions = vec![self.definition.ask_action(slot).into_owned()];
        actions.extend(self.after_question(slot));
        actions
    }

    fn latest_is_chitchat(
        &self,
        latest_action: Option<ActionId>,
        catalog: &dyn ActionCatalog,
    ) -> Result<bool, PolicyError> {
        for name in self.definition.chitchat_actions() {
            if is_latest(latest_action, name, catalog)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn is_latest(
    latest_action: Option<ActionId>,
    name: &str,
    catalog: &dyn ActionCatalog,
) -> Result<bool, PolicyError> {
    match latest_action {
        Some(latest) => Ok(catalog.index_for_action(name)? == latest),
        None => Ok(false),
    }
}
