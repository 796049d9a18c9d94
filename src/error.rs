//! Error types for session control, blocklist editing and persistence.
//!
//! Each lifecycle failure maps onto exactly one outcome:
//! - [`InitError`] is reported as `COULDNT_INITIALIZE` and disables the session
//! - [`TunnelError`] is reported as `NETWORK_ERROR` and is recoverable
//! - [`BlocklistError`] never leaves the edit boundary
//! - [`RejectedOperation`] is returned synchronously without an event

use std::path::PathBuf;
use thiserror::Error;

use crate::state::State;

/// One-time setup failed; the session cannot open a tunnel until restart.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    /// The process lacks the privilege to create a tunnel.
    #[error("Permission to establish a tunnel is unavailable: {0}")]
    PermissionDenied(String),

    /// The TUN facility itself is missing or unusable.
    #[error("Tunnel facility unavailable: {0}")]
    Unavailable(String),
}

/// The OS refused or failed to create the tunnel, or the engine would not start.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// Opening or configuring the TUN device failed.
    #[error("Failed to establish tunnel: {0}")]
    Establish(#[source] std::io::Error),

    /// Interface configuration (address, link state) failed.
    #[error("Failed to configure interface '{interface}': {message}")]
    Configure {
        /// Interface that could not be configured.
        interface: String,
        /// Description of the failure.
        message: String,
    },

    /// The filter engine refused to start on the new tunnel.
    #[error("Filter engine failed to start: {0}")]
    Engine(String),
}

/// A blocklist edit was refused at the edit boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlocklistError {
    /// One or more entries are not dotted-quad IPv4 addresses.
    #[error("Invalid IPv4 address format: {}", .0.join(", "))]
    InvalidAddressFormat(Vec<String>),
}

/// A lifecycle operation was issued in a state that does not permit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectedOperation {
    /// `connect()` or `disconnect()` was called from the wrong state.
    #[error("Operation not allowed while {0}")]
    NotReady(State),

    /// `connect()` was called before a successful `initialize()`.
    #[error("Session is not initialized")]
    NotInitialized,

    /// Initialization failed earlier; the session is permanently disabled.
    #[error("Session is disabled after failed initialization")]
    Disabled,
}

/// Why a `connect()` did not end in `CONNECTED`.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Refused up front; no transition happened.
    #[error(transparent)]
    Rejected(#[from] RejectedOperation),

    /// Accepted, but the tunnel failed; the state is back to `DISCONNECTED`.
    #[error(transparent)]
    Tunnel(#[from] TunnelError),
}

/// Failure reading or writing the persisted blocklist.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File could not be read or written.
    #[error("Blocklist store I/O error at '{path}': {source}")]
    Io {
        /// Path of the store file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// File contents are not a valid store document.
    #[error("Blocklist store at '{path}' is malformed: {source}")]
    Parse {
        /// Path of the store file.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The blocklist could not be encoded for writing.
    #[error("Failed to encode blocklist for '{path}': {source}")]
    Serialize {
        /// Path of the store file.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The document parsed but holds entries that fail validation.
    #[error("Blocklist store at '{path}' holds invalid entries: {source}")]
    Invalid {
        /// Path of the store file.
        path: PathBuf,
        /// Validation failure.
        #[source]
        source: BlocklistError,
    },

    /// No per-user directory could be determined for the default location.
    #[error("Could not determine a data directory for the blocklist store")]
    NoDataDir,
}

/// Failure loading `config.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File exists but could not be read.
    #[error("Failed to read config '{path}': {source}")]
    Io {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// File contents are not valid TOML for [`crate::config::AppConfig`].
    #[error("Failed to parse config '{path}': {source}")]
    Parse {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
}
