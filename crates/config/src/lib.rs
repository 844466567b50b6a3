//! Host configuration, loaded from environment variables at startup.
//!
//! Missing required identifiers are fatal: the host refuses to serve
//! traffic with an incomplete config. Everything else has a default.

pub mod schema;

pub use schema::{ConfigError, EngineConfig, HostConfig};

use std::path::PathBuf;

/// Per-user data directory (`~/.local/share/huddle` on Linux).
///
/// Falls back to `./.huddle` when no home directory can be resolved.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "huddle")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".huddle"))
}
