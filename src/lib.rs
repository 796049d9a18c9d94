//! tunblock: a TUN session controller that intercepts traffic to a
//! user-maintained set of IPv4 addresses.
//!
//! The crate is split into:
//! - [`state`]: lifecycle states, events and the validated blocklist
//! - [`core`]: the [`core::SessionController`], listener dispatch, the
//!   blocklist channel and persistent storage
//! - [`vpn`]: tunnel and filter-engine traits, the Linux TUN provider and
//!   the reference packet filter
//! - [`config`], [`error`], [`event`], [`constants`]: ambient plumbing

pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod event;
pub mod state;
pub mod vpn;
