//! Definition admission checks.

use crate::definition::Definition;
use crate::error::CoreError;
use crate::repository::Repository;
use std::collections::HashSet;

/// How much structure is checked before a definition is admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Id collision and the single-initial-state rule only.
    #[default]
    Standard,
    /// Additionally require unique state ids, unique action ids and that every
    /// action references declared states.
    Strict,
}

/// Checks whether `definition` may be admitted into `repository`.
///
/// Has no side effects. Callers still admit through
/// [`Repository::put_definition`], which repeats the id check atomically.
pub fn validate(
    definition: &Definition,
    repository: &dyn Repository,
    mode: ValidationMode,
) -> Result<(), CoreError> {
    if repository.contains_definition(&definition.id) {
        return Err(CoreError::DuplicateDefinitionId {
            definition_id: definition.id.clone(),
        });
    }

    let found = definition.initial_state_count();
    if found != 1 {
        return Err(CoreError::InvalidInitialStateCount { found });
    }

    if mode == ValidationMode::Strict {
        check_references(definition)?;
    }

    Ok(())
}

fn check_references(definition: &Definition) -> Result<(), CoreError> {
    let mut states = HashSet::with_capacity(definition.states.len());
    for state in &definition.states {
        if !states.insert(state.id.as_str()) {
            return Err(CoreError::DuplicateStateId {
                state: state.id.clone(),
            });
        }
    }

    let mut actions = HashSet::with_capacity(definition.actions.len());
    for action in &definition.actions {
        if !actions.insert(action.id.as_str()) {
            return Err(CoreError::DuplicateActionId {
                action: action.id.clone(),
            });
        }
    }

    for action in &definition.actions {
        let unknown = action
            .from_states
            .iter()
            .chain(std::iter::once(&action.to_state))
            .find(|s| !states.contains(s.as_str()));
        if let Some(state) = unknown {
            return Err(CoreError::UnknownStateReference {
                action: action.id.clone(),
                state: state.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{Action, State};
    use crate::repository::MemoryRepository;
    use proptest::prelude::*;

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
    fn test_valid_definition() {
        let repo = MemoryRepository::new();
        assert_eq!(validate(&doc_approval(), &repo, ValidationMode::Standard), Ok(()));
        assert_eq!(validate(&doc_approval(), &repo, ValidationMode::Strict), Ok(()));
    }

    #[test]
    fn test_two_initial_states() {
        let repo = MemoryRepository::new();
        let def = Definition::new(
            "twin",
            vec![State::new("a").initial(), State::new("b").initial()],
            vec![],
        );

        let err = validate(&def, &repo, ValidationMode::Standard).unwrap_err();
        assert_eq!(err, CoreError::InvalidInitialStateCount { found: 2 });
        assert!(err.to_string().contains("Found 2"));
    }

    #[test]
    fn test_no_initial_state() {
        let repo = MemoryRepository::new();
        let def = Definition::new("none", vec![State::new("a")], vec![]);
        assert_eq!(
            validate(&def, &repo, ValidationMode::Standard),
            Err(CoreError::InvalidInitialStateCount { found: 0 })
        );
    }

    #[test]
    fn test_duplicate_id_checked_first() {
        let repo = MemoryRepository::new();
        repo.put_definition(doc_approval()).unwrap();

        // Also has no initial state, but the id collision wins.
        let def = Definition::new("doc-approval", vec![], vec![]);
        assert_eq!(
            validate(&def, &repo, ValidationMode::Standard),
            Err(CoreError::DuplicateDefinitionId {
                definition_id: "doc-approval".to_string()
            })
        );
    }

    #[test]
    fn test_dangling_reference_allowed_in_standard_mode() {
        let repo = MemoryRepository::new();
        let def = Definition::new(
            "loose",
            vec![State::new("a").initial()],
            vec![Action::new("go", ["a"], "nowhere")],
        );
        assert_eq!(validate(&def, &repo, ValidationMode::Standard), Ok(()));
        assert_eq!(
            validate(&def, &repo, ValidationMode::Strict),
            Err(CoreError::UnknownStateReference {
                action: "go".to_string(),
                state: "nowhere".to_string()
            })
        );
    }

    #[test]
    fn test_strict_unknown_source_state() {
        let repo = MemoryRepository::new();
        let def = Definition::new(
            "loose",
            vec![State::new("a").initial(), State::new("b")],
            vec![Action::new("go", ["a", "ghost"], "b")],
        );
        assert_eq!(
            validate(&def, &repo, ValidationMode::Strict),
            Err(CoreError::UnknownStateReference {
                action: "go".to_string(),
                state: "ghost".to_string()
            })
        );
    }

    #[test]
    fn test_strict_duplicate_ids() {
        let repo = MemoryRepository::new();

        let def = Definition::new(
            "dup-state",
            vec![State::new("a").initial(), State::new("a")],
            vec![],
        );
        assert_eq!(
            validate(&def, &repo, ValidationMode::Strict),
            Err(CoreError::DuplicateStateId {
                state: "a".to_string()
            })
        );

        let def = Definition::new(
            "dup-action",
            vec![State::new("a").initial(), State::new("b")],
            vec![
                Action::new("go", ["a"], "b"),
                Action::new("go", ["b"], "a"),
            ],
        );
        assert_eq!(
            validate(&def, &repo, ValidationMode::Strict),
            Err(CoreError::DuplicateActionId {
                action: "go".to_string()
            })
        );
    }

    proptest! {
        #[test]
        fn prop_admission_iff_single_initial(flags in prop::collection::vec(any::<bool>(), 0..12)) {
            let repo = MemoryRepository::new();
            let states = flags
                .iter()
                .enumerate()
                .map(|(i, initial)| {
                    let state = State::new(format!("s{i}"));
                    if *initial { state.initial() } else { state }
                })
                .collect();
            let def = Definition::new("generated", states, vec![]);
            let initial = flags.iter().filter(|f| **f).count();

            let result = validate(&def, &repo, ValidationMode::Standard);
            if initial == 1 {
                prop_assert_eq!(result, Ok(()));
            } else {
                prop_assert_eq!(result, Err(CoreError::InvalidInitialStateCount { found: initial }));
            }
        }
    }
}
