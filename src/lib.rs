//! Engine facade: loads a configuration, builds the action catalog and the
//! form definitions, and answers "what next?" for a tracker once per turn.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

pub use slotform_config as config;
pub use slotform_contracts as contracts;
pub use slotform_kernel as kernel;

use slotform_config::{Config, ConfigError};
use slotform_contracts::ActionId;
use slotform_kernel::{
    activation_events, deactivation_events, ActionCatalog, ActionIndex, ActiveForm,
    DefinitionError, FormDefinition, FormPolicy, InMemoryTracker, PolicyError, PolicySettings,
    TrackerEvent, TrackerView, Turn,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("form `{form}` references action `{action}` missing from the domain")]
    UnregisteredAction { form: String, action: String },
    #[error("unknown form `{0}`")]
    UnknownForm(String),
    #[error("no form is active for `{0}`")]
    NoActiveForm(String),
}

#[derive(Debug, Clone)]
pub struct Engine {
    catalog: ActionIndex,
    forms: BTreeMap<String, Arc<FormDefinition>>,
    settings: PolicySettings,
}

impl Engine {
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let cfg = slotform_config::load_and_validate(path)?;
        Self::from_config(cfg)
    }

    pub fn from_config(cfg: Config) -> Result<Self, EngineError> {
        let settings = PolicySettings {
            listen_action: cfg.policy.listen_action,
            strip_intent_prefix: cfg.policy.strip_intent_prefix,
        };
        let catalog = ActionIndex::with_listen_action(&settings.listen_action, cfg.domain.actions);

        let mut forms = BTreeMap::new();
        for document in cfg.forms {
            let definition = FormDefinition::from_document(document)?;
            if let Some(action) = definition
                .referenced_actions()
                .into_iter()
                .find(|name| catalog.index_for_action(name).is_err())
            {
                return Err(EngineError::UnregisteredAction {
                    form: definition.identifier().to_string(),
                    action: action.to_string(),
                });
            }
            debug!(
                form = definition.identifier(),
                digest = definition.digest(),
                warnings = definition.warnings().len(),
                "form definition loaded"
            );
            forms.insert(definition.identifier().to_string(), Arc::new(definition));
        }

        info!(
            forms = forms.len(),
            actions = catalog.len(),
            listen_action = %settings.listen_action,
            "engine ready"
        );
        Ok(Self {
            catalog,
            forms,
            settings,
        })
    }

    pub fn form(&self, name: &str) -> Option<&Arc<FormDefinition>> {
        self.forms.get(name)
    }

    pub fn forms(&self) -> impl Iterator<Item = &Arc<FormDefinition>> {
        self.forms.values()
    }

    pub fn catalog(&self) -> &ActionIndex {
        &self.catalog
    }

    pub fn settings(&self) -> &PolicySettings {
        &self.settings
    }

    /// Events that activate `name`; apply them to the tracker.
    pub fn start_form(&self, name: &str) -> Result<Vec<TrackerEvent>, EngineError> {
        let definition = self
            .form(name)
            .ok_or_else(|| EngineError::UnknownForm(name.to_string()))?;
        Ok(activation_events(definition))
    }

    /// Events that close the tracker's active form, with the completion flag
    /// taken from the tracker's current slot values.
    pub fn end_form(&self, tracker: &InMemoryTracker) -> Result<Vec<TrackerEvent>, EngineError> {
        let active = tracker
            .active_form()
            .ok_or_else(|| EngineError::NoActiveForm(tracker.sender_id().to_string()))?;
        Ok(deactivation_events(
            &active.definition,
            &tracker.current_slot_values(),
        ))
    }

    pub fn next_action(&self, tracker: &mut InMemoryTracker) -> Result<ActionId, EngineError> {
        self.next_turn(tracker).map(|turn| turn.action)
    }

    pub fn next_turn(&self, tracker: &mut InMemoryTracker) -> Result<Turn, EngineError> {
        let sender_id = tracker.sender_id().to_string();
        let (conversation, active) = tracker
            .active_form_parts()
            .ok_or(EngineError::NoActiveForm(sender_id))?;
        let ActiveForm { definition, state } = active;
        let policy = FormPolicy::new(definition, &self.settings);
        Ok(policy.next_turn(state, conversation, &self.catalog)?)
    }

    pub fn action_name(&self, id: ActionId) -> Option<&str> {
        self.catalog.action_name(id)
    }
}
