//! # Configuration Modules
//!
//! Client configuration: endpoint, credentials, reconnect policy,
//! heartbeats and buffer sizes.

/// Provides the sync client configuration and socket URL derivation.
pub mod sync_config;

pub use sync_config::SyncConfig;
