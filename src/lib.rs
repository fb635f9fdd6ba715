//! agentctl
//!
//! A thin asynchronous command-line client for an agent-serving HTTP
//! backend. All business logic (agent execution, session persistence,
//! artifact storage) lives on the server; this crate marshals requests,
//! parses responses, and formats output for a terminal.
//!
//! # Modules
//!
//! - [`client`]: HTTP transport and one-shot resource operations
//! - [`stream`]: incremental SSE decoding for streaming agent runs
//! - [`cli`]: subcommand tree, dispatch, and output formatting
//! - [`types`]: wire DTOs mirroring the server contract
//! - [`error`]: error taxonomy

pub mod cli;
pub mod client;
pub mod error;
pub mod stream;
pub mod types;

// Re-exports
pub use client::ApiClient;
pub use error::{Error, Result};
