//! Core types, errors, and settings for Margin.
//!
//! - [`types`] — messages, per-call [`types::QueryConfig`], [`types::Completion`]
//! - [`error`] — the [`error::PipelineError`] taxonomy every handler reports through
//! - [`config`] — `~/.margin/config.json` settings with env overrides

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use error::{ErrorKind, PipelineError, PipelineResult};
pub use types::{ApiParams, Completion, Features, Message, QueryConfig, Role, SystemConfig};
