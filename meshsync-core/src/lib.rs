//! meshsync core library: domain types, configuration, host environment, errors.
//!
//! - [`types`]: checksum ids, change kinds, changesets and the bus message
//! - [`config`]: YAML configuration and per-folder settings
//! - [`env`]: hostname + home directory threaded through every component
//! - [`paths`]: metadata layout shared by every host
//! - [`error`]: [`CoreError`]

pub mod config;
pub mod env;
pub mod error;
pub mod paths;
pub mod types;

pub use config::{Config, ConnectionConfig, FolderSettings, FolderSpec};
pub use env::HostEnv;
pub use error::CoreError;
pub use types::{normalize_relative, ChangeKind, ChangeSet, ChecksumId, Message};
