//! # wfengine-storage
//!
//! Storage layer for wfengine.
//!
//! This crate provides:
//! - A durable `Repository` that writes every change through to disk
//! - Checksummed JSON record files with atomic replacement

pub mod error;
pub mod file;
pub mod record;

pub use error::StorageError;
pub use file::FileRepository;
