use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::definition::{is_filled, FormDefinition, RuleSet};

pub type SlotValues = BTreeMap<String, Value>;

/// Required slots after applying every rule whose `(slot, value)` key is
/// currently observed. A slot removed by any firing rule stays removed even
/// if another firing rule adds it.
pub fn resolve(
    required_default: &BTreeSet<String>,
    rules: &RuleSet,
    slot_values: &SlotValues,
) -> BTreeSet<String> {
    let mut needed = required_default.clone();
    let mut dropped = BTreeSet::new();
    for (slot, value) in slot_values {
        if let Some(rule) = rules.matching(slot, value) {
            needed.extend(rule.add.iter().cloned());
            dropped.extend(rule.remove.iter().cloned());
        }
    }
    needed.retain(|slot| !dropped.contains(slot));
    needed
}

pub fn required_now(definition: &FormDefinition, slot_values: &SlotValues) -> BTreeSet<String> {
    resolve(definition.required_default(), definition.rules(), slot_values)
}

/// Required slots without a value, in asking order: ascending priority,
/// ties by declaration order.
pub fn unfilled(
    definition: &FormDefinition,
    current_required: &BTreeSet<String>,
    slot_values: &SlotValues,
) -> Vec<String> {
    let mut pending: Vec<&String> = current_required
        .iter()
        .filter(|slot| !slot_values.get(slot.as_str()).is_some_and(is_filled))
        .collect();
    pending.sort_by_key(|slot| definition.rank(slot));
    pending.into_iter().cloned().collect()
}

/// True once every currently required slot holds a value.
pub fn is_complete(definition: &FormDefinition, slot_values: &SlotValues) -> bool {
    unfilled(definition, &required_now(definition, slot_values), slot_values).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use slotform_contracts::{FormDocument, RuleEffect, SlotDocument};

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn values(pairs: &[(&str, Value)]) -> SlotValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn restaurant() -> FormDefinition {
        let mut doc = FormDocument::new("restaurant_form", "deactivate_form");
        doc.slots
            .push(("people".to_string(), SlotDocument::ask("utter_ask_people")));
        doc.slots.push((
            "location".to_string(),
            SlotDocument::ask("utter_ask_location"),
        ));
        doc.rules.insert(
            "cuisine".to_string(),
            [(
                "mcdonalds".to_string(),
                RuleEffect {
                    need: vec!["location".to_string()],
                    lose: vec!["people".to_string(), "price".to_string()],
                },
            )]
            .into_iter()
            .collect(),
        );
        FormDefinition::from_document(doc).unwrap()
    }

    #[test]
    fn no_rules_keeps_defaults() {
        let required = resolve(&set(&["a", "b"]), &RuleSet::new(), &SlotValues::new());
        assert_eq!(required, set(&["a", "b"]));
    }

    #[test]
    fn remove_dominates_add_across_rules() {
        let mut rules = RuleSet::new();
        rules.insert("x", "v1", ["c".to_string()], Vec::new());
        rules.insert("y", "v2", Vec::new(), ["c".to_string()]);
        let slot_values = values(&[("x", json!("v1")), ("y", json!("v2"))]);
        let required = resolve(&set(&["a", "b"]), &rules, &slot_values);
        assert_eq!(required, set(&["a", "b"]));

        let only_add = values(&[("x", json!("v1"))]);
        assert_eq!(resolve(&set(&["a", "b"]), &rules, &only_add), set(&["a", "b", "c"]));
    }

    #[test]
    fn unset_values_do_not_fire_rules() {
        let mut rules = RuleSet::new();
        rules.insert("x", "", ["c".to_string()], Vec::new());
        let slot_values = values(&[("x", json!("")), ("y", Value::Null)]);
        assert_eq!(resolve(&set(&["a"]), &rules, &slot_values), set(&["a"]));
    }

    #[test]
    fn mcdonalds_rule_needs_location_and_loses_people() {
        let def = restaurant();
        let slot_values = values(&[("cuisine", json!("mcdonalds"))]);
        let required = required_now(&def, &slot_values);
        assert_eq!(required, set(&["location"]));
        let pending = unfilled(&def, &required, &slot_values);
        assert_eq!(pending, vec!["location".to_string()]);
        assert!(!pending.contains(&"people".to_string()));
    }

    #[test]
    fn rule_added_slot_is_asked_even_when_not_declared() {
        let mut doc = FormDocument::new("f", "done");
        doc.slots.push(("people".to_string(), SlotDocument::ask("utter_ask_people")));
        doc.rules.insert(
            "cuisine".to_string(),
            [(
                "mcdonalds".to_string(),
                RuleEffect {
                    need: vec!["location".to_string()],
                    lose: vec![],
                },
            )]
            .into_iter()
            .collect(),
        );
        let def = FormDefinition::from_document(doc).unwrap();
        let slot_values = values(&[("cuisine", json!("mcdonalds"))]);
        let pending = unfilled(&def, &required_now(&def, &slot_values), &slot_values);
        assert_eq!(pending, vec!["people".to_string(), "location".to_string()]);
    }

    #[test]
    fn unfilled_orders_by_priority_then_declaration() {
        let mut doc = FormDocument::new("f", "done");
        for (name, priority) in [("d", None), ("c", Some(5)), ("b", None), ("a", Some(5)), ("e", Some(1))] {
            let mut slot = SlotDocument::ask(format!("utter_ask_{name}"));
            slot.priority = priority;
            doc.slots.push((name.to_string(), slot));
        }
        let def = FormDefinition::from_document(doc).unwrap();
        let slot_values = values(&[("b", json!("filled"))]);
        let pending = unfilled(&def, def.required_default(), &slot_values);
        assert_eq!(pending, vec!["e", "c", "a", "d"]);
    }

    #[test]
    fn completion_predicate() {
        let def = restaurant();
        assert!(!is_complete(&def, &SlotValues::new()));
        let slot_values = values(&[("people", json!(4)), ("location", json!("paris"))]);
        assert!(is_complete(&def, &slot_values));
        let fast_food = values(&[("cuisine", json!("mcdonalds")), ("location", json!("rome"))]);
        assert!(is_complete(&def, &fast_food));
    }

    fn arb_slot_values() -> impl Strategy<Value = SlotValues> {
        prop::collection::btree_map(
            "[a-e]",
            prop_oneof![
                Just(Value::Null),
                Just(json!("")),
                "v[0-2]".prop_map(Value::String),
            ],
            0..5,
        )
    }

    fn arb_rules() -> impl Strategy<Value = RuleSet> {
        prop::collection::vec(
            (
                "[a-e]",
                "v[0-2]",
                prop::collection::vec("[a-h]", 0..3),
                prop::collection::vec("[a-h]", 0..3),
            ),
            0..6,
        )
        .prop_map(|entries| {
            let mut rules = RuleSet::new();
            for (slot, value, add, remove) in entries {
                rules.insert(&slot, &value, add, remove);
            }
            rules
        })
    }

    proptest! {
        #[test]
        fn resolve_is_idempotent(
            defaults in prop::collection::btree_set("[a-h]", 0..5),
            rules in arb_rules(),
            slot_values in arb_slot_values(),
        ) {
            let first = resolve(&defaults, &rules, &slot_values);
            let second = resolve(&defaults, &rules, &slot_values);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn removed_slots_never_survive(
            defaults in prop::collection::btree_set("[a-h]", 0..5),
            rules in arb_rules(),
            slot_values in arb_slot_values(),
        ) {
            let required = resolve(&defaults, &rules, &slot_values);
            for (slot, value) in &slot_values {
                if let Some(rule) = rules.matching(slot, value) {
                    for removed in &rule.remove {
                        prop_assert!(!required.contains(removed));
                    }
                }
            }
        }

        #[test]
        fn unfilled_skips_filled_and_is_sorted(
            priorities in prop::collection::vec(prop::option::of(0u32..4), 1..6),
            slot_values in arb_slot_values(),
        ) {
            let mut doc = FormDocument::new("f", "done");
            for (idx, priority) in priorities.iter().enumerate() {
                let name = ((b'a' + idx as u8) as char).to_string();
                let mut slot = SlotDocument::ask(format!("utter_ask_{name}"));
                slot.priority = *priority;
                doc.slots.push((name, slot));
            }
            let def = FormDefinition::from_document(doc).unwrap();
            let pending = unfilled(&def, def.required_default(), &slot_values);
            for slot in &pending {
                prop_assert!(!slot_values.get(slot).is_some_and(is_filled));
            }
            let ranks: Vec<_> = pending.iter().map(|s| def.rank(s)).collect();
            let mut sorted = ranks.clone();
            sorted.sort();
            prop_assert_eq!(ranks, sorted);
        }
    }
}
