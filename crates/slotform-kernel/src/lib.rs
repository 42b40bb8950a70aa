//! Rule-based decision engine for slot-filling sub-dialogues.
//!
//! A [`FormDefinition`] describes what a form needs; a [`FormRuntimeState`]
//! holds one conversation's progress through it; [`FormPolicy`] picks the
//! next action each turn.

mod catalog;
mod definition;
mod lifecycle;
mod policy;
mod queue;
mod resolver;
mod state;
mod tracker;

pub use catalog::{ActionCatalog, ActionIndex, UnknownAction};
pub use definition::{
    conventional_ask_action, is_filled, rule_key, ConfigurationWarning, DefinitionError,
    FormDefinition, Rule, RuleSet, SlotSpec, DEFAULT_PRIORITY,
};
pub use lifecycle::{activation_events, deactivation_events};
pub use policy::{
    Decision, FormPolicy, LowestPriority, PolicyError, PolicySettings, SlotSelector, Turn,
    TurnSource,
};
pub use queue::ActionQueue;
pub use resolver::{is_complete, required_now, resolve, unfilled, SlotValues};
pub use state::FormRuntimeState;
pub use tracker::{ActiveForm, Conversation, InMemoryTracker, LoggedEvent, TrackerEvent, TrackerView};

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

pub fn jcs_sha256_hex(value: &Value) -> Result<String, String> {
    let canonical = serde_jcs::to_string(value)
        .map_err(|err| format!("failed to canonicalize JSON via JCS: {err}"))?;
    Ok(sha256_hex(canonical.as_bytes()))
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .fold(String::with_capacity(64), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}
