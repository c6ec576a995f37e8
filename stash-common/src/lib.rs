//! # Stash Common Library
//!
//! Shared code for the Stash Engine service:
//! - Common error type and `Result` alias
//! - Configuration file loading (TOML) and credential resolution helpers

pub mod config;
pub mod error;

pub use error::{Error, Result};
