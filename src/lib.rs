//! Slack health agent
//!
//! Forwards health alerts published on `alerts/<class>/<identity>` to the
//! Slack channels configured for the announcing component. The channel
//! routing, message template and Slack credential are hot-reloaded from a
//! configuration store.

pub mod app;
pub mod bus;
pub mod cli;
pub mod config;
pub mod config_store;
pub mod core;
pub mod decoder;
pub mod formatting;
pub mod ingest;
pub mod internal_metrics;
pub mod notification;
pub mod pipeline;
pub mod runtime_config;
pub mod subscription;
pub mod task_manager;

// Re-export core types for convenience
pub use core::*;
