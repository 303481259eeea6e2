// src/config/mod.rs

//! Configuration loading and validation for pkbridge.
//!
//! - `model.rs`: the TOML data model, raw and validated
//! - `loader.rs`: reading a config file from disk
//! - `validate.rs`: path and cache-layout invariants

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{CacheSection, ConfigFile, EngineSection, PolicySection, RawConfigFile};
