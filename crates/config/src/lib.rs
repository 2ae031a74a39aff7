//! Configuration loading, validation, and env substitution.
//!
//! Config files: `natter.toml`, `natter.yaml`, or `natter.json`,
//! searched in `./` then `~/.config/natter/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, discover_and_load, load_config},
    schema::{BrokerConfig, ChatConfig, HistoryConfig, NatterConfig},
};
