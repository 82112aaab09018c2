//! Workflow instance state.

use crate::definition::Definition;
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One executed action, as recorded in an instance's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub action_id: String,
    pub from_state: String,
    pub to_state: String,
    /// Wall-clock time of the transition. Ordering comes from the history
    /// position, not from this field.
    pub timestamp: DateTime<Utc>,
}

/// A running execution of a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: Uuid,

    pub definition_id: String,

    pub current_state: String,

    /// Append-only.
    #[serde(default)]
    pub history: Vec<HistoryItem>,
}

impl Instance {
    /// Creates a fresh instance positioned at the definition's initial state.
    pub fn start(definition: &Definition) -> Result<Self, CoreError> {
        let initial = definition
            .initial_state()
            .ok_or(CoreError::InvalidInitialStateCount { found: 0 })?;

        Ok(Self {
            id: Uuid::new_v4(),
            definition_id: definition.id.clone(),
            current_state: initial.id.clone(),
            history: Vec::new(),
        })
    }

    /// Moves the instance to `to_state` and appends the history entry.
    pub fn record_transition(
        &mut self,
        action_id: impl Into<String>,
        to_state: impl Into<String>,
        at: DateTime<Utc>,
    ) {
        let to_state = to_state.into();
        let from_state = std::mem::replace(&mut self.current_state, to_state.clone());
        self.history.push(HistoryItem {
            action_id: action_id.into(),
            from_state,
            to_state,
            timestamp: at,
        });
    }

    /// Returns the most recent history entry.
    pub fn last_transition(&self) -> Option<&HistoryItem> {
        self.history.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Action, State};

    fn doc_approval() -> Definition {
        Definition::new(
            "doc-approval",
            vec![
                State::new("draft").initial(),
                State::new("approved").final_state(),
            ],
            vec![Action::new("approve", ["draft"], "approved")],
        )
    }

    #[test]
    fn test_instance_start() {
        let instance = Instance::start(&doc_approval()).unwrap();

        assert_eq!(instance.definition_id, "doc-approval");
        assert_eq!(instance.current_state, "draft");
        assert!(instance.history.is_empty());
        assert_eq!(instance.id.get_version_num(), 4);
    }

    #[test]
    fn test_instance_ids_are_unique() {
        let def = doc_approval();
        let a = Instance::start(&def).unwrap();
        let b = Instance::start(&def).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_start_without_initial_state() {
        let def = Definition::new("empty", vec![State::new("a")], vec![]);
        assert_eq!(
            Instance::start(&def),
            Err(CoreError::InvalidInitialStateCount { found: 0 })
        );
    }

    #[test]
    fn test_record_transition() {
        let mut instance = Instance::start(&doc_approval()).unwrap();
        let now = Utc::now();

        instance.record_transition("approve", "approved", now);
        let item = instance.last_transition().unwrap().clone();

        assert_eq!(instance.current_state, "approved");
        assert_eq!(item.action_id, "approve");
        assert_eq!(item.from_state, "draft");
        assert_eq!(item.to_state, "approved");
        assert_eq!(item.timestamp, now);
        assert_eq!(instance.history.len(), 1);
    }

    #[test]
    fn test_wire_shape() {
        let mut instance = Instance::start(&doc_approval()).unwrap();
        instance.record_transition("approve", "approved", Utc::now());

        let json = serde_json::to_value(&instance).unwrap();
        assert_eq!(json["definitionId"], "doc-approval");
        assert_eq!(json["currentState"], "approved");
        assert_eq!(json["history"][0]["actionId"], "approve");
        assert_eq!(json["history"][0]["fromState"], "draft");
        assert!(json["history"][0]["timestamp"].is_string());

        let back: Instance = serde_json::from_value(json).unwrap();
        assert_eq!(back, instance);
    }
}
