use std::collections::HashMap;

use slotform_contracts::{ActionId, ACTION_LISTEN};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action `{0}`")]
pub struct UnknownAction(pub String);

/// Maps action names to the indices the outer dialogue loop executes.
pub trait ActionCatalog {
    fn index_for_action(&self, name: &str) -> Result<ActionId, UnknownAction>;

    fn action_name(&self, id: ActionId) -> Option<&str>;
}

/// In-memory catalog. The listen action is always registered at index 0.
#[derive(Debug, Clone, Default)]
pub struct ActionIndex {
    names: Vec<String>,
    by_name: HashMap<String, ActionId>,
}

impl ActionIndex {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_listen_action(ACTION_LISTEN, names)
    }

    pub fn with_listen_action<I, S>(listen_action: &str, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = Self::default();
        index.register(listen_action);
        for name in names {
            index.register(name);
        }
        index
    }

    /// Adds `name` unless it is already present; returns its index.
    pub fn register(&mut self, name: impl Into<String>) -> ActionId {
        let name = name.into();
        if let Some(id) = self.by_name.get(&name) {
            return *id;
        }
        let id = ActionId(self.names.len());
        self.by_name.insert(name.clone(), id);
        self.names.push(name);
        id
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl ActionCatalog for ActionIndex {
    fn index_for_action(&self, name: &str) -> Result<ActionId, UnknownAction> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| UnknownAction(name.to_string()))
    }

    fn action_name(&self, id: ActionId) -> Option<&str> {
        self.names.get(id.0).map(String::as_str)
    }
}
