//! Reference packet-filter engine.
//!
//! Reads packets from the tunnel on a dedicated thread, drops IPv4 packets whose
//! destination is in the current blocklist and hands everything else to a
//! [`PacketSink`]. The blocklist is read through an [`ArcSwap`], so a running
//! loop always matches against one complete snapshot while the controller
//! publishes the next.

use arc_swap::ArcSwap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::packet::ipv4_destination;
use super::{FilterEngine, Snapshot, TunnelHandle};
use crate::config::FilterConfig;
use crate::constants;
use crate::error::TunnelError;
use crate::state::BlockedIpSet;

/// Destination for packets that pass the filter.
pub trait PacketSink: Send + Sync {
    /// Forwards one allowed packet.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the packet could not be forwarded; the loop
    /// counts it and carries on.
    fn forward(&self, packet: &[u8]) -> io::Result<()>;
}

/// Sink that accepts and discards every packet.
#[derive(Clone, Copy, Debug, Default)]
pub struct Discard;

impl PacketSink for Discard {
    fn forward(&self, _packet: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

/// Packet counters since the engine was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Packets read from the tunnel.
    pub inspected: u64,
    /// Packets dropped because their destination is blocked.
    pub dropped: u64,
    /// Packets handed to the sink.
    pub forwarded: u64,
    /// Forwarding or read failures.
    pub errors: u64,
}

#[derive(Default)]
struct Counters {
    inspected: AtomicU64,
    dropped: AtomicU64,
    forwarded: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> FilterStats {
        FilterStats {
            inspected: self.inspected.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

struct Running {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Everything the packet loop thread owns.
struct PacketLoop {
    tunnel: TunnelHandle,
    blocklist: Arc<ArcSwap<BlockedIpSet>>,
    counters: Arc<Counters>,
    sink: Arc<dyn PacketSink>,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
    buffer_len: usize,
}

impl PacketLoop {
    fn run(self) {
        let mut buf = vec![0u8; self.buffer_len];
        debug!(interface = self.tunnel.name(), "Filter loop started");

        while !self.stop.load(Ordering::Acquire) {
            match self.tunnel.read_packet(&mut buf, self.poll_interval) {
                Ok(None | Some(0)) => {}
                Ok(Some(len)) => self.inspect(&buf[..len]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    warn!(interface = self.tunnel.name(), error = %e, "Tunnel read failed, filter loop exiting");
                    break;
                }
            }
        }

        debug!(interface = self.tunnel.name(), "Filter loop stopped");
    }

    fn inspect(&self, packet: &[u8]) {
        self.counters.inspected.fetch_add(1, Ordering::Relaxed);

        let blocked = ipv4_destination(packet).is_some_and(|dst| self.blocklist.load().contains(dst));
        if blocked {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        match self.sink.forward(packet) {
            Ok(()) => {
                self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "Forwarding packet failed");
            }
        }
    }
}

/// Destination-address packet filter running on its own thread.
pub struct PacketFilter {
    poll_interval: Duration,
    buffer_len: usize,
    blocklist: Arc<ArcSwap<BlockedIpSet>>,
    counters: Arc<Counters>,
    sink: Arc<dyn PacketSink>,
    running: Mutex<Option<Running>>,
}

impl PacketFilter {
    /// Creates an engine that discards allowed packets after counting them.
    #[must_use]
    pub fn new(config: &FilterConfig, mtu: u16) -> Self {
        Self::with_sink(config, mtu, Arc::new(Discard))
    }

    /// Creates an engine that forwards allowed packets to `sink`.
    #[must_use]
    pub fn with_sink(config: &FilterConfig, mtu: u16, sink: Arc<dyn PacketSink>) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            buffer_len: usize::from(mtu) + constants::PACKET_BUFFER_SLACK,
            blocklist: Arc::new(ArcSwap::from_pointee(BlockedIpSet::new())),
            counters: Arc::new(Counters::default()),
            sink,
            running: Mutex::new(None),
        }
    }

    /// Packet counters so far.
    #[must_use]
    pub fn stats(&self) -> FilterStats {
        self.counters.snapshot()
    }

    /// The snapshot the loop currently matches against.
    #[must_use]
    pub fn current_blocklist(&self) -> Snapshot {
        self.blocklist.load_full()
    }
}

impl FilterEngine for PacketFilter {
    fn start(&self, tunnel: TunnelHandle, blocklist: Snapshot) -> Result<(), TunnelError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Err(TunnelError::Engine("filter loop already running".to_string()));
        }

        self.blocklist.store(blocklist);

        let stop = Arc::new(AtomicBool::new(false));
        let interface = tunnel.name().to_string();
        let packet_loop = PacketLoop {
            tunnel,
            blocklist: Arc::clone(&self.blocklist),
            counters: Arc::clone(&self.counters),
            sink: Arc::clone(&self.sink),
            stop: Arc::clone(&stop),
            poll_interval: self.poll_interval,
            buffer_len: self.buffer_len,
        };

        let thread = thread::Builder::new()
            .name(constants::FILTER_THREAD_NAME.to_string())
            .spawn(move || packet_loop.run())
            .map_err(|e| TunnelError::Engine(format!("failed to spawn filter loop: {e}")))?;

        *running = Some(Running { stop, thread });
        info!(interface = %interface, blocked = self.blocklist.load().len(), "Filter engine started");
        Ok(())
    }

    fn update_blocklist(&self, blocklist: Snapshot) {
        debug!(entries = blocklist.len(), "Filter engine blocklist replaced");
        self.blocklist.store(blocklist);
    }

    fn stop(&self) -> Result<(), String> {
        let Some(running) = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Ok(());
        };

        running.stop.store(true, Ordering::Release);
        running
            .thread
            .join()
            .map_err(|_| "filter loop panicked".to_string())?;

        info!(stats = ?self.stats(), "Filter engine stopped");
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|running| !running.thread.is_finished())
    }
}

impl Drop for PacketFilter {
    fn drop(&mut self) {
        let _ = FilterEngine::stop(self);
    }
}

/// In-memory tunnel for exercising the engine and controller without a kernel device.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Condvar, Mutex};
    use std::time::Duration;

    use crate::vpn::TunnelDevice;

    #[derive(Default)]
    pub struct MemoryTunnel {
        inbound: Mutex<VecDeque<Vec<u8>>>,
        ready: Condvar,
        pub written: Mutex<Vec<Vec<u8>>>,
        pub closed: AtomicBool,
        pub close_calls: AtomicUsize,
        pub fail_close: bool,
    }

    impl MemoryTunnel {
        pub fn failing_close() -> Self {
            Self {
                fail_close: true,
                ..Self::default()
            }
        }

        pub fn inject(&self, packet: Vec<u8>) {
            self.inbound.lock().unwrap().push_back(packet);
            self.ready.notify_all();
        }
    }

    impl TunnelDevice for MemoryTunnel {
        fn name(&self) -> &str {
            "mem0"
        }

        fn read_packet(&self, buf: &mut [u8], timeout: Duration) -> io::Result<Option<usize>> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "closed"));
            }
            let mut inbound = self.inbound.lock().unwrap();
            if inbound.is_empty() {
                inbound = self.ready.wait_timeout(inbound, timeout).unwrap().0;
            }
            Ok(inbound.pop_front().map(|packet| {
                buf[..packet.len()].copy_from_slice(&packet);
                packet.len()
            }))
        }

        fn write_packet(&self, packet: &[u8]) -> io::Result<usize> {
            self.written.lock().unwrap().push(packet.to_vec());
            Ok(packet.len())
        }

        fn close(&self) -> io::Result<()> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            self.closed.store(true, Ordering::SeqCst);
            if self.fail_close {
                Err(io::Error::other("close failed"))
            } else {
                Ok(())
            }
        }
    }

    /// Polls `condition` for up to two seconds.
    pub fn wait_until(condition: impl Fn() -> bool) -> bool {
        for _ in 0..400 {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }
}
