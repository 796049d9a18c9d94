//! Application-wide constants and configuration values.
//!
//! This module defines the static configuration values used throughout tunblock,
//! including tunnel defaults, file names, and console messages.

// === Application Metadata ===

/// Application name (from Cargo.toml).
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
/// Current application version (from Cargo.toml).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// === Tunnel Defaults ===

/// Interface name requested when none is configured.
pub const DEFAULT_TUN_NAME: &str = "tunblock0";
/// Default interface MTU.
pub const DEFAULT_MTU: u16 = 1500;
/// Path of the kernel TUN clone device.
pub const TUN_CLONE_DEVICE: &str = "/dev/net/tun";
/// Interface name reported for descriptors handed over by the platform.
pub const INHERITED_TUN_NAME: &str = "inherited";

// === Filter Engine ===

/// Upper bound on a single poll of the tunnel, so the loop notices a stop request.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
/// Extra read-buffer room beyond the MTU.
pub const PACKET_BUFFER_SLACK: usize = 4;
/// Name of the packet loop thread.
pub const FILTER_THREAD_NAME: &str = "tunblock-filter";

// === Path Configuration ===

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Name of the blocklist document inside the data directory.
pub const STORE_FILE_NAME: &str = "blocklist.json";

// === Blocklist ===

/// Entry seeded into a store that has never been saved.
pub const DEFAULT_BLOCKED_IP: &str = "192.168.0.102";

// === Console Messages ===

/// Status line while no tunnel is open.
pub const MSG_NOT_INTERCEPTING: &str = "Not intercepting";
/// Status line while connecting.
pub const MSG_PREPARING: &str = "Preparing interception...";
/// Status line while connected.
pub const MSG_INTERCEPTING: &str = "Intercepting";
/// Status line while disconnecting.
pub const MSG_STOPPING: &str = "Stopping interception...";
/// Shown when a tunnel could not be opened.
pub const MSG_NETWORK_ERROR: &str = "Network Error";
/// Shown when initialization failed.
pub const MSG_COULDNT_INITIALIZE: &str = "Couldn't initialize";
/// Shown when an operation is rejected because another is in flight.
pub const MSG_TRY_AGAIN: &str = "Try Again";
/// Shown when the tunnel is up but the filter loop has exited.
pub const MSG_ENGINE_STOPPED: &str = "Filter stopped on a tunnel error; reconnect to resume";
/// Shown after the blocklist is saved.
pub const MSG_BLOCKLIST_SAVED: &str = "Blocklist saved";

// === Messages: CLI Output ===

pub const CLI_MSG_BLOCKED: &str = "Blocked: ";
pub const CLI_MSG_ALREADY_BLOCKED: &str = "Already blocked: ";
pub const CLI_MSG_UNBLOCKED: &str = "Unblocked: ";
pub const CLI_MSG_NOT_BLOCKED: &str = "Not in blocklist: ";
pub const CLI_MSG_STORE_PATH: &str = "Blocklist: ";
pub const CLI_MSG_EMPTY: &str = "  (empty)";
pub const CLI_MSG_UNSAVED: &str = "Unsaved changes; use 'save' to apply them";
pub const CLI_MSG_UNKNOWN_COMMAND: &str = "Unknown command. Type 'help' for a list.";

/// Console prompt.
pub const PROMPT: &str = "tunblock> ";
/// Console help text.
pub const CONSOLE_HELP: &str = "\
Commands:
  toggle            connect when idle, disconnect when intercepting
  connect           open the tunnel
  disconnect        close the tunnel
  status            show the current state
  add <ip>          add an address to the blocklist
  remove <ip>       remove an address from the blocklist
  list              show the blocklist
  save              persist the blocklist and apply it
  stats             show packet counters
  help              show this help
  quit              disconnect and exit";
