use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use slotform_contracts::{FormDocument, FormKind};
use thiserror::Error;
use tracing::warn;

use crate::jcs_sha256_hex;

/// Priority of a slot that does not declare one; such slots are asked last.
pub const DEFAULT_PRIORITY: u32 = u32::MAX;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("form identifier must not be empty")]
    EmptyIdentifier,
    #[error("form `{form}`: slot `{slot}` has no ask action")]
    MissingAskAction { form: String, slot: String },
    #[error("form `{form}`: finish action must not be empty")]
    MissingFinishAction { form: String },
    #[error("form `{form}`: optional slot `{slot}` is not declared")]
    UndeclaredOptionalSlot { form: String, slot: String },
    #[error("form `{form}`: failed to compute definition digest: {reason}")]
    Digest { form: String, reason: String },
}

/// Non-fatal findings from building a definition. They are logged once at
/// construction and kept on the definition for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationWarning {
    #[error("form `{form}`: slot `{slot}` has no clarify action, clarification requests for it are ignored")]
    MissingClarifyAction { form: String, slot: String },
    #[error("form `{form}`: rules require undeclared slot `{slot}`, it will be asked with `{ask_action}`")]
    UndeclaredRuleSlot {
        form: String,
        slot: String,
        ask_action: String,
    },
    #[error("form `{form}`: intent `{intent}` is both an exit and a chitchat route, the exit wins")]
    ExitShadowsChitchat { form: String, intent: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSpec {
    pub ask_prompt_action: String,
    pub clarify_action: Option<String>,
    pub follow_up_action: Option<String>,
    pub priority: u32,
}

/// Effect of observing one `(slot, value)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rule {
    pub add: BTreeSet<String>,
    pub remove: BTreeSet<String>,
}

/// Conditional rules keyed by `(slot, value)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    by_slot: BTreeMap<String, BTreeMap<String, Rule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule. Registering the same key twice unions the effects.
    pub fn insert<A, R>(&mut self, slot: &str, value: &str, add: A, remove: R)
    where
        A: IntoIterator<Item = String>,
        R: IntoIterator<Item = String>,
    {
        let rule = self
            .by_slot
            .entry(slot.to_string())
            .or_default()
            .entry(value.to_string())
            .or_default();
        rule.add.extend(add);
        rule.remove.extend(remove);
    }

    pub fn get(&self, slot: &str, value: &str) -> Option<&Rule> {
        self.by_slot.get(slot)?.get(value)
    }

    /// Rule matching the current value of `slot`, if the value is filled and
    /// has a text form.
    pub fn matching(&self, slot: &str, value: &Value) -> Option<&Rule> {
        let key = rule_key(value)?;
        self.get(slot, &key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Rule)> {
        self.by_slot.iter().flat_map(|(slot, values)| {
            values
                .iter()
                .map(move |(value, rule)| (slot.as_str(), value.as_str(), rule))
        })
    }
}

/// A slot holds a value unless it is null or an empty string.
pub fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Text a slot value is matched against rule keys with. Composite values
/// never match.
pub fn rule_key(value: &Value) -> Option<Cow<'_, str>> {
    if !is_filled(value) {
        return None;
    }
    match value {
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        _ => None,
    }
}

/// Conventional ask action for a slot that has no declaration.
pub fn conventional_ask_action(slot: &str) -> String {
    format!("utter_ask_{slot}")
}

/// Immutable description of a slot-filling sub-dialogue. Safe to share
/// across conversations; per-conversation state lives in
/// [`crate::FormRuntimeState`].
#[derive(Debug, Clone)]
pub struct FormDefinition {
    identifier: String,
    kind: FormKind,
    slots: Vec<(String, SlotSpec)>,
    required_default: BTreeSet<String>,
    finish_action: String,
    exit_routes: BTreeMap<String, String>,
    chitchat_routes: BTreeMap<String, String>,
    clarification_intent: Option<String>,
    rules: RuleSet,
    warnings: Vec<ConfigurationWarning>,
    digest: String,
}

impl FormDefinition {
    pub fn from_document(document: FormDocument) -> Result<Self, DefinitionError> {
        let form = document.name.trim().to_string();
        if form.is_empty() {
            return Err(DefinitionError::EmptyIdentifier);
        }
        if document.finish_action.trim().is_empty() {
            return Err(DefinitionError::MissingFinishAction { form });
        }

        let clarification_intent = document
            .details_intent
            .as_ref()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let mut warnings = Vec::new();
        let mut slots = Vec::with_capacity(document.slots.len());
        for (name, slot) in &document.slots {
            let ask_prompt_action = slot
                .ask_utt
                .as_ref()
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .ok_or_else(|| DefinitionError::MissingAskAction {
                    form: form.clone(),
                    slot: name.clone(),
                })?;
            let clarify_action = slot.clarify_utt.clone().filter(|v| !v.trim().is_empty());
            if clarification_intent.is_some() && clarify_action.is_none() {
                warnings.push(ConfigurationWarning::MissingClarifyAction {
                    form: form.clone(),
                    slot: name.clone(),
                });
            }
            slots.push((
                name.clone(),
                SlotSpec {
                    ask_prompt_action,
                    clarify_action,
                    follow_up_action: slot
                        .follow_up_action
                        .clone()
                        .filter(|v| !v.trim().is_empty()),
                    priority: slot.priority.unwrap_or(DEFAULT_PRIORITY),
                },
            ));
        }

        let declared: BTreeSet<&str> = slots.iter().map(|(n, _)| n.as_str()).collect();
        for optional in &document.optional_slots {
            if !declared.contains(optional.as_str()) {
                return Err(DefinitionError::UndeclaredOptionalSlot {
                    form,
                    slot: optional.clone(),
                });
            }
        }
        let required_default: BTreeSet<String> = slots
            .iter()
            .map(|(n, _)| n.clone())
            .filter(|n| !document.optional_slots.contains(n))
            .collect();

        let mut rules = RuleSet::new();
        for (slot, values) in &document.rules {
            for (value, effect) in values {
                rules.insert(
                    slot,
                    value,
                    effect.need.iter().cloned(),
                    effect.lose.iter().cloned(),
                );
            }
        }
        let undeclared_needs: BTreeSet<&str> = rules
            .iter()
            .flat_map(|(_, _, rule)| rule.add.iter().map(String::as_str))
            .filter(|slot| !declared.contains(slot))
            .collect();
        for slot in undeclared_needs {
            warnings.push(ConfigurationWarning::UndeclaredRuleSlot {
                form: form.clone(),
                slot: slot.to_string(),
                ask_action: conventional_ask_action(slot),
            });
        }

        for intent in document.chitchat_dict.keys() {
            if document.exit_dict.contains_key(intent) {
                warnings.push(ConfigurationWarning::ExitShadowsChitchat {
                    form: form.clone(),
                    intent: intent.clone(),
                });
            }
        }

        for warning in &warnings {
            warn!(form = %form, "{warning}");
        }

        let digest = serde_json::to_value(&document)
            .map_err(|e| e.to_string())
            .and_then(|v| jcs_sha256_hex(&v))
            .map_err(|reason| DefinitionError::Digest {
                form: form.clone(),
                reason,
            })?;

        Ok(Self {
            identifier: form,
            kind: document.kind,
            slots,
            required_default,
            finish_action: document.finish_action,
            exit_routes: document.exit_dict,
            chitchat_routes: document.chitchat_dict,
            clarification_intent,
            rules,
            warnings,
            digest,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn kind(&self) -> FormKind {
        self.kind
    }

    pub fn slot(&self, name: &str) -> Option<&SlotSpec> {
        self.slots.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn required_default(&self) -> &BTreeSet<String> {
        &self.required_default
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn finish_action(&self) -> &str {
        &self.finish_action
    }

    pub fn exit_action(&self, intent: &str) -> Option<&str> {
        self.exit_routes.get(intent).map(String::as_str)
    }

    pub fn chitchat_action(&self, intent: &str) -> Option<&str> {
        self.chitchat_routes.get(intent).map(String::as_str)
    }

    pub fn chitchat_actions(&self) -> impl Iterator<Item = &str> {
        self.chitchat_routes.values().map(String::as_str)
    }

    pub fn clarification_intent(&self) -> Option<&str> {
        self.clarification_intent.as_deref()
    }

    pub fn warnings(&self) -> &[ConfigurationWarning] {
        &self.warnings
    }

    /// SHA-256 of the JCS-canonical source document.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Action that asks for `slot`. Slots only ever required through rules
    /// fall back to `utter_ask_<slot>`.
    pub fn ask_action(&self, slot: &str) -> Cow<'_, str> {
        match self.slot(slot) {
            Some(spec) => Cow::Borrowed(spec.ask_prompt_action.as_str()),
            None => Cow::Owned(conventional_ask_action(slot)),
        }
    }

    /// Sort key for asking order: priority first, then declaration order.
    /// Undeclared slots rank after every declared one.
    pub fn rank(&self, slot: &str) -> (u32, usize) {
        self.slots
            .iter()
            .position(|(n, _)| n == slot)
            .map(|idx| (self.slots[idx].1.priority, idx))
            .unwrap_or((DEFAULT_PRIORITY, usize::MAX))
    }

    /// Every action name the definition can queue, including the fallback
    /// ask actions of slots that only rules require.
    pub fn referenced_actions(&self) -> BTreeSet<Cow<'_, str>> {
        let mut names = BTreeSet::new();
        names.insert(Cow::Borrowed(self.finish_action.as_str()));
        for (_, spec) in &self.slots {
            names.insert(Cow::Borrowed(spec.ask_prompt_action.as_str()));
            names.extend(spec.clarify_action.as_deref().map(Cow::Borrowed));
            names.extend(spec.follow_up_action.as_deref().map(Cow::Borrowed));
        }
        names.extend(self.exit_routes.values().map(|a| Cow::Borrowed(a.as_str())));
        names.extend(self.chitchat_routes.values().map(|a| Cow::Borrowed(a.as_str())));
        for (_, _, rule) in self.rules.iter() {
            names.extend(
                rule.add
                    .iter()
                    .filter(|slot| self.slot(slot).is_none())
                    .map(|slot| Cow::Owned(conventional_ask_action(slot))),
            );
        }
        names
    }
}
