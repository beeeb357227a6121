//! # relay-settings
//!
//! Configuration for the relay, loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: `~/.relay/settings.json` or an explicit path,
//!    deep-merged over the defaults
//! 3. **Environment variables**: `PORT` and `RELAY_*` overrides (highest)
//!
//! The daemon loads a `.env` file into the process environment before calling
//! [`load_settings_from_path`], so values from `.env` arrive through layer 3.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings_from_path, settings_path,
};
pub use types::{LoggingSettings, RelaySettings, ServerSettings};
