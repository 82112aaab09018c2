//! Workflow definition types.
//!
//! Definitions use the following JSON shape:
//!
//! ```json
//! {
//!   "id": "doc-approval",
//!   "states": [
//!     {"id": "draft", "isInitial": true},
//!     {"id": "review"},
//!     {"id": "approved", "isFinal": true}
//!   ],
//!   "actions": [
//!     {"id": "submit", "fromStates": ["draft"], "toState": "review"},
//!     {"id": "approve", "fromStates": ["review"], "toState": "approved"}
//!   ]
//! }
//! ```
//!
//! Omitted flags default to `isInitial: false`, `isFinal: false` and
//! `enabled: true`. `fromStates` also accepts a single string.

use serde::{Deserialize, Serialize};

fn enabled_by_default() -> bool {
    true
}

/// A named node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub id: String,

    #[serde(default)]
    pub is_initial: bool,

    #[serde(default)]
    pub is_final: bool,

    /// Carried for clients; the executor does not consult it.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl State {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_initial: false,
            is_final: false,
            enabled: true,
        }
    }

    pub fn initial(mut self) -> Self {
        self.is_initial = true;
        self
    }

    pub fn final_state(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A transition rule from a set of source states to one target state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: String,

    /// Source state(s). Duplicates are tolerated.
    #[serde(deserialize_with = "deserialize_from_states")]
    pub from_states: Vec<String>,

    pub to_state: String,

    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl Action {
    pub fn new<I, S>(id: impl Into<String>, from_states: I, to_state: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            from_states: from_states.into_iter().map(Into::into).collect(),
            to_state: to_state.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Returns true if `state` is one of this action's source states.
    pub fn fires_from(&self, state: &str) -> bool {
        self.from_states.iter().any(|s| s == state)
    }
}

fn deserialize_from_states<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct FromStatesVisitor;

    impl<'de> Visitor<'de> for FromStatesVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a state id or an array of state ids")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut states = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(s) = seq.next_element::<String>()? {
                states.push(s);
            }
            Ok(states)
        }
    }

    deserializer.deserialize_any(FromStatesVisitor)
}

/// A workflow template: its states and the actions between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    pub id: String,

    #[serde(default)]
    pub states: Vec<State>,

    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Definition {
    pub fn new(id: impl Into<String>, states: Vec<State>, actions: Vec<Action>) -> Self {
        Self {
            id: id.into(),
            states,
            actions,
        }
    }

    /// Parses a definition from a JSON value.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(json)
    }

    /// Number of states flagged initial.
    pub fn initial_state_count(&self) -> usize {
        self.states.iter().filter(|s| s.is_initial).count()
    }

    /// Returns the first state flagged initial.
    ///
    /// Admitted definitions have exactly one.
    pub fn initial_state(&self) -> Option<&State> {
        self.states.iter().find(|s| s.is_initial)
    }

    /// Looks up a state by id.
    pub fn state(&self, id: &str) -> Option<&State> {
        self.states.iter().find(|s| s.id == id)
    }

    /// Looks up an action by id.
    pub fn action(&self, id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }

    /// Returns true if the given state exists and is final.
    pub fn is_final(&self, state: &str) -> bool {
        self.state(state).is_some_and(|s| s.is_final)
    }

    /// Returns the enabled actions that may fire from `state`.
    pub fn actions_from(&self, state: &str) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.enabled && a.fires_from(state))
            .collect()
    }

    /// Returns the definition as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "states": self.states,
            "actions": self.actions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_definition() -> serde_json::Value {
        json!({
            "id": "order",
            "states": [
                {"id": "created", "isInitial": true},
                {"id": "paid"},
                {"id": "shipped"},
                {"id": "delivered", "isFinal": true},
                {"id": "refunded", "isFinal": true, "enabled": false}
            ],
            "actions": [
                {"id": "pay", "fromStates": ["created"], "toState": "paid"},
                {"id": "ship", "fromStates": "paid", "toState": "shipped"},
                {"id": "deliver", "fromStates": ["shipped"], "toState": "delivered"},
                {"id": "refund", "fromStates": ["paid", "shipped"], "toState": "refunded", "enabled": false}
            ]
        })
    }

    #[test]
    fn test_parse_definition() {
        let def = Definition::from_json(&sample_definition()).unwrap();

        assert_eq!(def.id, "order");
        assert_eq!(def.states.len(), 5);
        assert_eq!(def.actions.len(), 4);
        assert_eq!(def.initial_state_count(), 1);
        assert_eq!(def.initial_state().unwrap().id, "created");
    }

    #[test]
    fn test_flag_defaults() {
        let def = Definition::from_json(&sample_definition()).unwrap();

        let paid = def.state("paid").unwrap();
        assert!(!paid.is_initial);
        assert!(!paid.is_final);
        assert!(paid.enabled);

        assert!(!def.state("refunded").unwrap().enabled);
        assert!(def.action("pay").unwrap().enabled);
        assert!(!def.action("refund").unwrap().enabled);
    }

    #[test]
    fn test_single_string_from_states() {
        let def = Definition::from_json(&sample_definition()).unwrap();
        assert_eq!(def.action("ship").unwrap().from_states, vec!["paid"]);
    }

    #[test]
    fn test_actions_from_skips_disabled() {
        let def = Definition::from_json(&sample_definition()).unwrap();

        let from_paid: Vec<_> = def
            .actions_from("paid")
            .into_iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(from_paid, vec!["ship"]);

        assert!(def.actions_from("delivered").is_empty());
    }

    #[test]
    fn test_is_final() {
        let def = Definition::from_json(&sample_definition()).unwrap();
        assert!(def.is_final("delivered"));
        assert!(!def.is_final("paid"));
        assert!(!def.is_final("nowhere"));
    }

    #[test]
    fn test_camel_case_output() {
        let def = Definition::new(
            "doc",
            vec![State::new("draft").initial()],
            vec![Action::new("noop", ["draft"], "draft")],
        );
        let json = def.to_json();

        assert_eq!(json["states"][0]["isInitial"], true);
        assert_eq!(json["states"][0]["isFinal"], false);
        assert_eq!(json["actions"][0]["fromStates"][0], "draft");
        assert_eq!(json["actions"][0]["toState"], "draft");
    }

    #[test]
    fn test_missing_to_state_is_rejected() {
        let json = json!({
            "id": "broken",
            "states": [{"id": "a", "isInitial": true}],
            "actions": [{"id": "go", "fromStates": ["a"]}]
        });
        assert!(Definition::from_json(&json).is_err());
    }
}
