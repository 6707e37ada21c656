//! Shared utilities for genllm
//!
//! This crate provides tracing setup and environment-driven settings for
//! the genllm binaries.

pub mod config;
pub mod logging;

pub use config::{Provider, Settings, SettingsError};
pub use logging::{init_json_tracing, init_tracing, init_tracing_with_filter};
