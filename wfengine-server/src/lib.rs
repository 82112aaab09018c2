//! # wfengine-server
//!
//! HTTP server for wfengine.
//!
//! This crate provides:
//! - Configuration loading (YAML file plus environment overrides)
//! - Routing of HTTP requests onto engine operations
//! - Command handlers with JSON request/response bodies
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod server;

pub use config::{Config, EngineConfig, MetricsConfig, NetworkConfig, StorageBackend, StorageConfig};
pub use error::ServerError;
pub use handler::CommandHandler;
pub use metrics::Metrics;
pub use server::{Server, ServerConfig};
