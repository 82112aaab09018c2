//! Transition rules.
//!
//! [`apply_action`] is the whole transition function for one instance. It
//! runs its checks in a fixed order and touches the instance only after all of
//! them pass:
//!
//! 1. the current state is not final
//! 2. the action exists in the instance's own definition
//! 3. the action is enabled
//! 4. the current state is one of the action's source states
//!
//! The target state is taken as-is; it is not required to be declared or
//! enabled.

use crate::definition::{Action, Definition};
use crate::error::CoreError;
use crate::instance::Instance;
use chrono::{DateTime, Utc};

/// Checks whether `action_id` may fire on `instance` and returns the action.
pub fn check_action<'d>(
    definition: &'d Definition,
    instance: &Instance,
    action_id: &str,
) -> Result<&'d Action, CoreError> {
    if definition.is_final(&instance.current_state) {
        return Err(CoreError::InstanceInFinalState {
            state: instance.current_state.clone(),
        });
    }

    let action = definition
        .action(action_id)
        .ok_or_else(|| CoreError::ActionNotFound {
            action: action_id.to_string(),
        })?;

    if !action.enabled {
        return Err(CoreError::ActionDisabled {
            action: action_id.to_string(),
        });
    }

    if !action.fires_from(&instance.current_state) {
        return Err(CoreError::InvalidSourceState {
            action: action_id.to_string(),
            state: instance.current_state.clone(),
        });
    }

    Ok(action)
}

/// Applies `action_id` to `instance`, stamping the history entry with `at`.
pub fn apply_action(
    definition: &Definition,
    instance: &mut Instance,
    action_id: &str,
    at: DateTime<Utc>,
) -> Result<(), CoreError> {
    let action = check_action(definition, instance, action_id)?;
    instance.record_transition(action.id.as_str(), action.to_state.as_str(), at);
    Ok(())
}

/// Returns the actions that may fire on `instance` right now.
pub fn available_actions<'d>(definition: &'d Definition, instance: &Instance) -> Vec<&'d Action> {
    if definition.is_final(&instance.current_state) {
        return Vec::new();
    }
    definition.actions_from(&instance.current_state)
}
