//! Tunnel and filter-engine seams.
//!
//! The controller depends only on the traits here. [`tun`] provides the Linux
//! TUN implementation and [`filter`] the reference packet-filter engine.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{InitError, TunnelError};
use crate::state::BlockedIpSet;

pub mod filter;
pub mod packet;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod tun;

pub use filter::{Discard, FilterStats, PacketFilter, PacketSink};

/// Immutable blocklist snapshot shared between the controller and the engine.
pub type Snapshot = Arc<BlockedIpSet>;

/// An open virtual network interface.
///
/// Reads and writes may happen from the engine's thread while the controller
/// holds its own reference for teardown.
pub trait TunnelDevice: Send + Sync {
    /// Interface name.
    fn name(&self) -> &str;

    /// Waits up to `timeout` for one packet. `Ok(None)` means nothing arrived.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the device failed or has been closed.
    fn read_packet(&self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>>;

    /// Writes one packet to the device.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the device failed or has been closed.
    fn write_packet(&self, packet: &[u8]) -> io::Result<usize>;

    /// Releases the OS resource. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the I/O error reported by the OS while releasing.
    fn close(&self) -> io::Result<()>;
}

/// Shared handle to an open tunnel.
pub type TunnelHandle = Arc<dyn TunnelDevice>;

/// Creates tunnels on behalf of the controller.
pub trait TunnelProvider: Send + Sync {
    /// Checks that a tunnel could be established at all.
    ///
    /// # Errors
    ///
    /// Returns [`InitError`] when permission or the TUN facility is missing.
    fn check_permission(&self) -> Result<(), InitError>;

    /// Opens and configures a new tunnel.
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError`] when the OS refuses or configuration fails.
    fn establish(&self) -> Result<TunnelHandle, TunnelError>;
}

/// The packet-filtering engine driven by the controller.
pub trait FilterEngine: Send + Sync {
    /// Starts filtering packets on `tunnel` against `blocklist`.
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::Engine`] if the engine cannot start.
    fn start(&self, tunnel: TunnelHandle, blocklist: Snapshot) -> Result<(), TunnelError>;

    /// Replaces the snapshot the running engine matches against.
    ///
    /// Must not block on tunnel I/O.
    fn update_blocklist(&self, blocklist: Snapshot);

    /// Stops filtering and returns once the packet loop has fully exited.
    ///
    /// # Errors
    ///
    /// Returns a description of any fault observed while stopping; the engine
    /// is stopped regardless.
    fn stop(&self) -> Result<(), String>;

    /// Whether the packet loop is still processing the tunnel. Turns `false`
    /// on its own if the loop gave up on a failed device.
    fn is_running(&self) -> bool;
}
