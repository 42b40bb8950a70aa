use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Action the agent runs to wait for the next user message.
pub const ACTION_LISTEN: &str = "action_listen";

pub const FORM_DEFINITION_SCHEMA: &str = "contracts/v1/form_definition.schema.json";
pub const ENGINE_CONFIG_SCHEMA: &str = "contracts/v1/engine_config.schema.json";

#[derive(Debug, Clone)]
pub struct ContractSchemaManifest {
    pub path: &'static str,
    pub sha256: &'static str,
    pub body: &'static str,
}

#[derive(Debug, Clone)]
pub struct ContractsManifest {
    pub contracts_set_sha256: &'static str,
    pub generated_at: &'static str,
    pub schemas: Vec<ContractSchemaManifest>,
}

impl ContractsManifest {
    pub fn schema(&self, path: &str) -> Option<&ContractSchemaManifest> {
        self.schemas.iter().find(|s| s.path == path)
    }
}

include!(concat!(env!("OUT_DIR"), "/generated_contracts.rs"));

pub fn contracts_manifest_v1() -> ContractsManifest {
    ContractsManifest {
        contracts_set_sha256: GENERATED_CONTRACTS_SET_SHA256,
        generated_at: GENERATED_AT_RFC3339,
        schemas: GENERATED_CONTRACT_SCHEMAS
            .iter()
            .map(|(path, sha256, body)| ContractSchemaManifest { path, sha256, body })
            .collect(),
    }
}

/// Index of an action in the bot's action catalog.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ActionId(pub usize);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Vocabulary a slot-filling sub-dialogue is declared under.
///
/// Both kinds run through the same engine; the kind only decides how
/// namespaced intents are prefixed and which bookkeeping slots the
/// lifecycle events write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormKind {
    #[default]
    Form,
    Plan,
}

impl FormKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FormKind::Form => "form",
            FormKind::Plan => "plan",
        }
    }

    pub fn intent_prefix(self) -> &'static str {
        match self {
            FormKind::Form => "form_",
            FormKind::Plan => "plan_",
        }
    }

    pub fn active_slot(self) -> &'static str {
        match self {
            FormKind::Form => "active_form",
            FormKind::Plan => "active_plan",
        }
    }

    pub fn complete_slot(self) -> &'static str {
        match self {
            FormKind::Form => "form_complete",
            FormKind::Plan => "plan_complete",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask_utt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarify_utt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

impl SlotDocument {
    pub fn ask(action: impl Into<String>) -> Self {
        Self {
            ask_utt: Some(action.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleEffect {
    #[serde(default)]
    pub need: Vec<String>,
    #[serde(default)]
    pub lose: Vec<String>,
}

/// Declarative form definition as it appears in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormDocument {
    pub name: String,
    #[serde(default)]
    pub kind: FormKind,
    /// Slot declarations in the order they were written.
    #[serde(with = "ordered_slots")]
    pub slots: Vec<(String, SlotDocument)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optional_slots: Vec<String>,
    pub finish_action: String,
    #[serde(default)]
    pub exit_dict: BTreeMap<String, String>,
    #[serde(default)]
    pub chitchat_dict: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details_intent: Option<String>,
    /// slot -> observed value -> effect. Scalar value keys (`4`, `true`) are
    /// stored by their text.
    #[serde(default, deserialize_with = "rule_values::deserialize")]
    pub rules: BTreeMap<String, BTreeMap<String, RuleEffect>>,
}

impl FormDocument {
    pub fn new(name: impl Into<String>, finish_action: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FormKind::Form,
            slots: Vec::new(),
            optional_slots: Vec::new(),
            finish_action: finish_action.into(),
            exit_dict: BTreeMap::new(),
            chitchat_dict: BTreeMap::new(),
            details_intent: None,
            rules: BTreeMap::new(),
        }
    }
}

mod ordered_slots {
    use super::SlotDocument;
    use serde::de::{Error, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(slots: &[(String, SlotDocument)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(slots.len()))?;
        for (name, slot) in slots {
            map.serialize_entry(name, slot)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, SlotDocument)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(SlotsVisitor)
    }

    struct SlotsVisitor;

    impl<'de> Visitor<'de> for SlotsVisitor {
        type Value = Vec<(String, SlotDocument)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of slot name to slot definition")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut slots: Vec<(String, SlotDocument)> =
                Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((name, slot)) = access.next_entry::<String, SlotDocument>()? {
                if slots.iter().any(|(existing, _)| existing == &name) {
                    return Err(A::Error::custom(format!("duplicate slot `{name}`")));
                }
                slots.push((name, slot));
            }
            Ok(slots)
        }
    }
}

mod rule_values {
    use super::RuleEffect;
    use serde::de::{Error, Visitor};
    use serde::{Deserialize, Deserializer};
    use std::collections::BTreeMap;
    use std::fmt;

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<String, BTreeMap<String, RuleEffect>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let rules = BTreeMap::<String, BTreeMap<ValueKey, RuleEffect>>::deserialize(deserializer)?;
        Ok(rules
            .into_iter()
            .map(|(slot, values)| {
                (
                    slot,
                    values.into_iter().map(|(key, effect)| (key.0, effect)).collect(),
                )
            })
            .collect())
    }

    /// Text of a scalar map key, rendered the way JSON renders the value.
    #[derive(PartialEq, Eq, PartialOrd, Ord)]
    struct ValueKey(String);

    impl<'de> Deserialize<'de> for ValueKey {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            deserializer.deserialize_any(ValueKeyVisitor)
        }
    }

    struct ValueKeyVisitor;

    impl<'de> Visitor<'de> for ValueKeyVisitor {
        type Value = ValueKey;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string, number or boolean slot value")
        }

        fn visit_str<E: Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(ValueKey(v.to_string()))
        }

        fn visit_string<E: Error>(self, v: String) -> Result<Self::Value, E> {
            Ok(ValueKey(v))
        }

        fn visit_bool<E: Error>(self, v: bool) -> Result<Self::Value, E> {
            Ok(ValueKey(v.to_string()))
        }

        fn visit_i64<E: Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(ValueKey(v.to_string()))
        }

        fn visit_u64<E: Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(ValueKey(v.to_string()))
        }

        // `{:?}` keeps the fraction (`3.0`), as JSON does.
        fn visit_f64<E: Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(ValueKey(format!("{v:?}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use sha2::{Digest, Sha256};
    use std::path::PathBuf;

    #[test]
    fn schema_files_are_valid_json_schema() {
        let dir = repo_path("contracts/v1");
        let entries = std::fs::read_dir(dir).unwrap();
        for entry in entries {
            let path = entry.unwrap().path();
            if !path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(".schema.json"))
                .unwrap_or(false)
            {
                continue;
            }
            let text = std::fs::read_to_string(&path).unwrap();
            let schema: Value = serde_json::from_str(&text).unwrap();
            let _validator = jsonschema::validator_for(&schema)
                .unwrap_or_else(|err| panic!("invalid schema {}: {err}", path.display()));
        }
    }

    #[test]
    fn manifest_digests_match_embedded_bodies() {
        let manifest = contracts_manifest_v1();
        assert_eq!(manifest.contracts_set_sha256.len(), 64);
        assert!(manifest.schema(FORM_DEFINITION_SCHEMA).is_some());
        assert!(manifest.schema(ENGINE_CONFIG_SCHEMA).is_some());
        for schema in &manifest.schemas {
            let digest: String = Sha256::digest(schema.body.as_bytes())
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect();
            assert_eq!(digest, schema.sha256, "digest mismatch for {}", schema.path);
        }
    }

    #[test]
    fn yaml_slots_keep_declaration_order() {
        let doc: FormDocument = serde_yaml::from_str(
            r#"
name: restaurant_form
slots:
  people:
    ask_utt: utter_ask_people
  location:
    ask_utt: utter_ask_location
  cuisine:
    ask_utt: utter_ask_cuisine
    priority: 1
finish_action: deactivate_form
"#,
        )
        .unwrap();
        let names: Vec<&str> = doc.slots.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["people", "location", "cuisine"]);
        assert_eq!(doc.kind, FormKind::Form);
        assert_eq!(doc.slots[2].1.priority, Some(1));
    }

    #[test]
    fn json_round_trip_keeps_slot_order() {
        let mut doc = FormDocument::new("p", "deactivate_plan");
        doc.kind = FormKind::Plan;
        doc.slots.push(("zeta".to_string(), SlotDocument::ask("utter_ask_zeta")));
        doc.slots.push(("alpha".to_string(), SlotDocument::ask("utter_ask_alpha")));
        let text = serde_json::to_string(&doc).unwrap();
        assert!(text.find("zeta").unwrap() < text.find("alpha").unwrap());
        let back: FormDocument = serde_json::from_str(&text).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn duplicate_slots_are_rejected() {
        let text = r#"{"name":"f","finish_action":"done","slots":{"a":{"ask_utt":"x"},"a":{"ask_utt":"y"}}}"#;
        let err = serde_json::from_str::<FormDocument>(text).expect_err("duplicate slot");
        assert!(err.to_string().contains("duplicate slot"));
    }

    #[test]
    fn scalar_rule_keys_keep_their_text() {
        let doc: FormDocument = serde_yaml::from_str(
            r#"
name: party_form
slots:
  people:
    ask_utt: utter_ask_people
finish_action: deactivate_form
rules:
  people:
    4: {need: [table]}
    2.5: {need: [high_chair]}
  vip:
    true: {lose: [people]}
  cuisine:
    mcdonalds: {need: [location]}
"#,
        )
        .unwrap();
        assert_eq!(doc.rules["people"]["4"].need, vec!["table"]);
        assert_eq!(doc.rules["people"]["2.5"].need, vec!["high_chair"]);
        assert_eq!(doc.rules["vip"]["true"].lose, vec!["people"]);
        assert!(doc.rules["cuisine"].contains_key("mcdonalds"));

        let text = serde_json::to_string(&doc).unwrap();
        let back: FormDocument = serde_json::from_str(&text).unwrap();
        assert_eq!(back.rules, doc.rules);
    }

    #[test]
    fn composite_rule_keys_are_rejected() {
        let err = serde_yaml::from_str::<FormDocument>(
            "name: f\nslots: {}\nfinish_action: done\nrules:\n  a:\n    [1, 2]: {need: [b]}\n",
        )
        .expect_err("sequence key");
        assert!(err.to_string().contains("slot value"));
    }

    #[test]
    fn kind_vocabulary() {
        assert_eq!(FormKind::Plan.intent_prefix(), "plan_");
        assert_eq!(FormKind::Form.active_slot(), "active_form");
        assert_eq!(FormKind::Plan.complete_slot(), "plan_complete");
    }

    fn repo_path(relative: &str) -> PathBuf {
        let mut base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        base.push("../..");
        base.push(relative);
        base
    }
}
