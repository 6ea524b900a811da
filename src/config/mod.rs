//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (platform config dir, e.g. ~/.config/repodoc/config.toml)
//! 3. Project config (.repodoc/config.toml)
//! 4. Environment variables (REPODOC_*, `__` separates nested keys)
//! 5. CLI arguments (highest priority)

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
