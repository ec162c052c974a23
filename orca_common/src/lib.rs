//! Common types and utilities for the Orca projects.

pub mod address;
pub mod config;
pub mod error;
pub mod function;
pub mod rpc;
pub mod task;

// Re-export the shared stack so that the head, workers and clients stay on the same versions.
pub use ::anyhow;
pub use ::futures;
pub use ::serde;
pub use ::serde_json;
pub use ::tarpc;
pub use ::tokio;
pub use ::tracing;
pub use ::tracing_subscriber;
