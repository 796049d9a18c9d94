//! Session control: the controller, its blocklist channel, listener dispatch
//! and blocklist persistence.

pub mod controller;
pub mod dispatch;
pub mod store;
pub mod sync;

pub use controller::SessionController;
pub use dispatch::{DispatchContext, EventListener, Listener};
pub use store::BlocklistStore;
