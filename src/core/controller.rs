//! Tunnel session controller.
//!
//! The controller is the only component that opens or closes the tunnel. Every
//! lifecycle operation first passes a state guard (check and write under one
//! lock), so a second `connect()` can never observe `DISCONNECTED` while the
//! first is still establishing, and operations against `CONNECTING` or
//! `DISCONNECTING` are refused rather than queued.
//!
//! Each state change is published together with its event under the
//! lifecycle gate, so listeners see events in the order the state moved.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};
use tracing::{debug, info, warn};

use super::dispatch::{Listener, ListenerSlot};
use super::sync::BlocklistChannel;
use crate::error::{ConnectError, InitError, RejectedOperation, TunnelError};
use crate::state::{BlockedIpSet, Event, Operation, State};
use crate::vpn::{FilterEngine, Snapshot, TunnelHandle, TunnelProvider};

/// Re-entrant gate serializing "change state, then emit".
///
/// The owning thread may enter again, so a listener called on that thread can
/// issue the next operation from inside its callback.
#[derive(Default)]
struct LifecycleGate {
    owner: Mutex<Option<(ThreadId, usize)>>,
    free: Condvar,
}

impl LifecycleGate {
    fn enter(&self) -> GatePass<'_> {
        let me = thread::current().id();
        let mut owner = self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        while matches!(*owner, Some((holder, _)) if holder != me) {
            owner = self.free.wait(owner).unwrap_or_else(PoisonError::into_inner);
        }
        *owner = match *owner {
            Some((holder, depth)) => Some((holder, depth + 1)),
            None => Some((me, 1)),
        };
        GatePass(self)
    }
}

struct GatePass<'a>(&'a LifecycleGate);

impl Drop for GatePass<'_> {
    fn drop(&mut self) {
        let mut owner = self.0.owner.lock().unwrap_or_else(PoisonError::into_inner);
        *owner = match *owner {
            Some((holder, depth)) if depth > 1 => Some((holder, depth - 1)),
            _ => None,
        };
        if owner.is_none() {
            self.0.free.notify_all();
        }
    }
}

/// Owns the tunnel lifecycle and the blocklist channel for one process.
///
/// Construct once and share through an [`Arc`] with every front end that
/// needs it.
///
/// # Example
///
/// ```ignore
/// let controller = SessionController::new(provider, engine, store.load()?);
/// controller.initialize()?;
/// controller.set_listener(Some(Listener::new(&view, queue.context())));
/// controller.connect()?;
/// ```
pub struct SessionController {
    state: Mutex<State>,
    gate: LifecycleGate,
    init: OnceLock<Result<(), InitError>>,
    provider: Arc<dyn TunnelProvider>,
    engine: Arc<dyn FilterEngine>,
    tunnel: Mutex<Option<TunnelHandle>>,
    blocklist: BlocklistChannel,
    listener: ListenerSlot,
}

impl SessionController {
    /// Creates a controller in `DISCONNECTED` holding `blocklist` as the current snapshot.
    pub fn new(
        provider: Arc<dyn TunnelProvider>,
        engine: Arc<dyn FilterEngine>,
        blocklist: BlockedIpSet,
    ) -> Self {
        Self {
            state: Mutex::new(State::Disconnected),
            gate: LifecycleGate::default(),
            init: OnceLock::new(),
            provider,
            blocklist: BlocklistChannel::new(Arc::clone(&engine), blocklist),
            engine,
            tunnel: Mutex::new(None),
            listener: ListenerSlot::new(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets `state` and emits `event` as one step.
    fn settle(&self, state: State, event: Event) {
        let _pass = self.gate.enter();
        *self.lock_state() = state;
        self.listener.emit(event);
    }

    /// Performs `operation`'s transition and emits `event`, or reports the
    /// state that blocked it.
    fn begin(&self, operation: Operation, event: Event) -> Result<(), RejectedOperation> {
        let _pass = self.gate.enter();
        {
            let mut state = self.lock_state();
            match operation.transition() {
                Some((from, to)) if *state == from => *state = to,
                _ => {
                    debug!(%operation, state = %*state, "Operation rejected");
                    return Err(RejectedOperation::NotReady(*state));
                }
            }
        }
        self.listener.emit(event);
        Ok(())
    }

    /// Current lifecycle state. Never blocks on tunnel I/O.
    #[must_use]
    pub fn current_state(&self) -> State {
        *self.lock_state()
    }

    /// Whether initialization failed and the session is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        matches!(self.init.get(), Some(Err(_)))
    }

    /// Whether packets are actually being filtered: `CONNECTED` with the
    /// engine still running on the tunnel.
    #[must_use]
    pub fn is_intercepting(&self) -> bool {
        self.current_state() == State::Connected && self.engine.is_running()
    }

    /// Verifies tunnel permission once.
    ///
    /// Emits `INITIALIZED` or `COULDNT_INITIALIZE`. Later calls re-report the
    /// first outcome (return value and event) without repeating the check and
    /// without touching the state.
    ///
    /// # Errors
    ///
    /// Returns [`InitError`] if the tunnel cannot be established in this
    /// process; the session stays disabled.
    pub fn initialize(&self) -> Result<(), InitError> {
        let outcome = self
            .init
            .get_or_init(|| {
                let outcome = self.provider.check_permission();
                match &outcome {
                    Ok(()) => info!(operation = %Operation::Initialize, "Session initialized"),
                    Err(e) => warn!(operation = %Operation::Initialize, error = %e, "Session initialization failed"),
                }
                outcome
            })
            .clone();

        let _pass = self.gate.enter();
        self.listener.emit(match outcome {
            Ok(()) => Event::Initialized,
            Err(_) => Event::CouldntInitialize,
        });
        outcome
    }

    fn ensure_initialized(&self) -> Result<(), RejectedOperation> {
        match self.init.get() {
            Some(Ok(())) => Ok(()),
            Some(Err(_)) => Err(RejectedOperation::Disabled),
            None => Err(RejectedOperation::NotInitialized),
        }
    }

    /// Opens the tunnel and starts the filter engine on it.
    ///
    /// Emits `CONNECTING` then `CONNECTED`, or `CONNECTING` then `NETWORK_ERROR`.
    /// The current blocklist snapshot reaches the engine before `CONNECTED` is
    /// observable, and every later push is forwarded until teardown.
    ///
    /// # Errors
    ///
    /// - [`ConnectError::Rejected`] if the state is not `DISCONNECTED` or the
    ///   session is not initialized; nothing changes and no event is emitted.
    /// - [`ConnectError::Tunnel`] if establishment failed; the state is back to
    ///   `DISCONNECTED` and no tunnel is retained.
    pub fn connect(&self) -> Result<(), ConnectError> {
        self.ensure_initialized()?;
        self.begin(Operation::Connect, Event::Connecting)?;
        info!("Connecting");

        match self.open_tunnel() {
            Ok(interface) => {
                self.blocklist.attach();
                info!(%interface, "Connected");
                self.settle(State::Connected, Event::Connected);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Tunnel establishment failed");
                self.settle(State::Disconnected, Event::NetworkError);
                Err(e.into())
            }
        }
    }

    fn open_tunnel(&self) -> Result<String, TunnelError> {
        let tunnel = self.provider.establish()?;
        let interface = tunnel.name().to_string();

        if let Err(e) = self.engine.start(Arc::clone(&tunnel), self.blocklist.current()) {
            if let Err(close_err) = tunnel.close() {
                warn!(%interface, error = %close_err, "Releasing tunnel after engine failure failed");
            }
            return Err(e);
        }

        *self.tunnel.lock().unwrap_or_else(PoisonError::into_inner) = Some(tunnel);
        Ok(interface)
    }

    /// Stops the engine and closes the tunnel.
    ///
    /// Emits `DISCONNECTING` then `DISCONNECTED`. Faults while releasing are
    /// logged; the transition always completes.
    ///
    /// # Errors
    ///
    /// Returns [`RejectedOperation::NotReady`] if the state is not `CONNECTED`.
    pub fn disconnect(&self) -> Result<(), RejectedOperation> {
        self.begin(Operation::Disconnect, Event::Disconnecting)?;
        info!("Disconnecting");

        self.teardown();

        info!("Disconnected");
        self.settle(State::Disconnected, Event::Disconnected);
        Ok(())
    }

    fn teardown(&self) {
        self.blocklist.detach();

        if let Err(e) = self.engine.stop() {
            warn!(error = %e, "Filter engine did not stop cleanly");
        }

        let tunnel = self
            .tunnel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tunnel) = tunnel {
            if let Err(e) = tunnel.close() {
                warn!(interface = tunnel.name(), error = %e, "Releasing tunnel failed");
            }
        }
    }

    /// `DISCONNECTED` → `connect()`, `CONNECTED` → `disconnect()`.
    ///
    /// # Errors
    ///
    /// Returns [`RejectedOperation::NotReady`] while a transition is in flight,
    /// otherwise whatever the chosen operation returns.
    pub fn toggle(&self) -> Result<(), ConnectError> {
        let state = self.current_state();
        match Operation::toggle_from(state) {
            Some(Operation::Disconnect) => Ok(self.disconnect()?),
            Some(_) => self.connect(),
            None => Err(RejectedOperation::NotReady(state).into()),
        }
    }

    /// Replaces the registered listener; `None` detaches.
    ///
    /// Once this returns, the previous listener receives no further events.
    /// A newly attached listener should call [`current_state`](Self::current_state)
    /// to resynchronize, since earlier events are not replayed.
    pub fn set_listener(&self, listener: Option<Listener>) {
        self.listener.set(listener);
    }

    /// Stores `blocklist` as current and forwards it to a running engine.
    ///
    /// Never blocks on tunnel I/O. Concurrent pushes are applied in a single
    /// total order and the engine converges on the last one. Returns the
    /// snapshot's generation.
    pub fn push_blocklist(&self, blocklist: BlockedIpSet) -> u64 {
        self.blocklist.publish(blocklist)
    }

    /// The most recently pushed snapshot.
    #[must_use]
    pub fn current_blocklist(&self) -> Snapshot {
        self.blocklist.current()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if self.current_state() != State::Disconnected {
            self.teardown();
        }
    }
}

/// Test doubles for the tunnel provider and filter engine.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc, Mutex};

    use crate::error::{InitError, TunnelError};
    use crate::vpn::filter::testing::MemoryTunnel;
    use crate::vpn::{FilterEngine, Snapshot, TunnelHandle, TunnelProvider};

    #[derive(Default)]
    pub struct MockProvider {
        pub deny_permission: bool,
        pub fail_establish: AtomicBool,
        pub failing_close: bool,
        pub permission_checks: AtomicUsize,
        pub tunnels: Mutex<Vec<Arc<MemoryTunnel>>>,
        /// When set, `establish` waits for one message before proceeding.
        pub gate: Option<Mutex<mpsc::Receiver<()>>>,
    }

    impl MockProvider {
        pub fn gated() -> (Self, mpsc::Sender<()>) {
            let (tx, rx) = mpsc::channel();
            (
                Self {
                    gate: Some(Mutex::new(rx)),
                    ..Self::default()
                },
                tx,
            )
        }
    }

    impl TunnelProvider for MockProvider {
        fn check_permission(&self) -> Result<(), InitError> {
            self.permission_checks.fetch_add(1, Ordering::SeqCst);
            if self.deny_permission {
                Err(InitError::PermissionDenied("denied by test".to_string()))
            } else {
                Ok(())
            }
        }

        fn establish(&self) -> Result<TunnelHandle, TunnelError> {
            if let Some(gate) = &self.gate {
                let _ = gate.lock().unwrap().recv();
            }
            if self.fail_establish.load(Ordering::SeqCst) {
                return Err(TunnelError::Establish(std::io::Error::other("network unreachable")));
            }
            let tunnel = Arc::new(if self.failing_close {
                MemoryTunnel::failing_close()
            } else {
                MemoryTunnel::default()
            });
            self.tunnels.lock().unwrap().push(Arc::clone(&tunnel));
            Ok(tunnel as TunnelHandle)
        }
    }

    #[derive(Default)]
    pub struct RecordingEngine {
        pub starts: Mutex<Vec<Snapshot>>,
        pub updates: Mutex<Vec<Snapshot>>,
        pub applied: Mutex<Option<Snapshot>>,
        pub running: AtomicBool,
        pub fail_start: bool,
        pub fail_stop: bool,
        pub stops: AtomicUsize,
    }

    impl RecordingEngine {
        pub fn updates(&self) -> Vec<Snapshot> {
            self.updates.lock().unwrap().clone()
        }

        pub fn applied(&self) -> Option<Snapshot> {
            self.applied.lock().unwrap().clone()
        }
    }

    impl FilterEngine for RecordingEngine {
        fn start(&self, _tunnel: TunnelHandle, blocklist: Snapshot) -> Result<(), TunnelError> {
            if self.fail_start {
                return Err(TunnelError::Engine("refused by test".to_string()));
            }
            self.starts.lock().unwrap().push(Arc::clone(&blocklist));
            *self.applied.lock().unwrap() = Some(blocklist);
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn update_blocklist(&self, blocklist: Snapshot) {
            self.updates.lock().unwrap().push(Arc::clone(&blocklist));
            *self.applied.lock().unwrap() = Some(blocklist);
        }

        fn stop(&self) -> Result<(), String> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.running.store(false, Ordering::SeqCst);
            if self.fail_stop {
                Err("stop failed in test".to_string())
            } else {
                Ok(())
            }
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }
}
