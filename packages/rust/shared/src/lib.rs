//! Shared error model and configuration for textmark.
//!
//! This crate is the foundation depended on by the other textmark crates.
//! It provides:
//! - [`TextmarkError`] — the unified error type
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BatchConfig, ConverterConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, validate_config,
};
pub use error::{Result, TextmarkError};
