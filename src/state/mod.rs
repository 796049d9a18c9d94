//! Session and blocklist state types.

pub mod blocklist;
pub mod session;

pub use blocklist::{is_valid_address, BlockedIp, BlockedIpSet};
pub use session::{Event, Operation, State};
