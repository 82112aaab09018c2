//! # wfengine-core
//!
//! Workflow engine core.
//!
//! This crate provides:
//! - Workflow definition types and admission validation
//! - Instance creation from a definition's initial state
//! - The transition executor (action legality and history recording)
//! - The `Repository` abstraction and an in-memory implementation

pub mod definition;
pub mod engine;
pub mod error;
pub mod instance;
pub mod repository;
pub mod transition;
pub mod validate;

pub use definition::{Action, Definition, State};
pub use engine::WorkflowEngine;
pub use error::{CoreError, ErrorClass, ErrorCode};
pub use instance::{HistoryItem, Instance};
pub use repository::{MemoryRepository, Repository};
pub use validate::{validate, ValidationMode};
