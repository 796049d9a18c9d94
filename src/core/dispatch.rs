//! Single-slot event listener registration and delivery.
//!
//! The controller holds at most one [`Listener`], by weak reference, together
//! with the [`DispatchContext`] the listener asked to be called on. Replacing or
//! clearing the registration waits for any callback running on another thread,
//! and bumps a generation counter so deliveries already queued for the old
//! listener are discarded when their turn comes.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};
use tracing::trace;

use crate::state::Event;

/// Receives controller events.
pub trait EventListener: Send + Sync {
    /// Called once per event, on the context chosen at registration.
    fn on_event(&self, event: Event);
}

/// Where a listener's callbacks run.
#[derive(Clone, Debug, Default)]
pub enum DispatchContext {
    /// On the thread that drives the transition.
    #[default]
    Immediate,
    /// Posted to an [`EventQueue`](crate::event::EventQueue) that the
    /// listener's own thread drains.
    Queue(Sender<Delivery>),
}

/// A registration: a weak listener reference plus its dispatch context.
pub struct Listener {
    target: Weak<dyn EventListener>,
    context: DispatchContext,
}

impl Listener {
    /// Registers `listener` without keeping it alive.
    pub fn new<L: EventListener + 'static>(listener: &Arc<L>, context: DispatchContext) -> Self {
        let target: Weak<L> = Arc::downgrade(listener);
        Self { target, context }
    }

    /// Registers `listener` for callbacks on the emitting thread.
    pub fn immediate<L: EventListener + 'static>(listener: &Arc<L>) -> Self {
        Self::new(listener, DispatchContext::Immediate)
    }
}

struct SlotState {
    generation: u64,
    registration: Option<Listener>,
    /// Thread currently inside a callback, with its nesting depth.
    in_flight: Option<(ThreadId, usize)>,
}

struct SlotShared {
    state: Mutex<SlotState>,
    idle: Condvar,
}

impl SlotShared {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until no other thread is inside a callback.
    fn wait_idle<'a>(&'a self, mut state: MutexGuard<'a, SlotState>) -> MutexGuard<'a, SlotState> {
        let me = thread::current().id();
        while matches!(state.in_flight, Some((owner, _)) if owner != me) {
            state = self.idle.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state
    }

    /// Runs the callback if `generation` is still the current registration.
    fn deliver(&self, generation: u64, event: Event) -> bool {
        let me = thread::current().id();
        let mut state = self.wait_idle(self.lock());

        if state.generation != generation {
            trace!(%event, "Dropping event for replaced listener");
            return false;
        }
        let Some(listener) = state.registration.as_ref().and_then(|r| r.target.upgrade()) else {
            trace!(%event, "Dropping event, listener is gone");
            return false;
        };

        state.in_flight = match state.in_flight {
            Some((owner, depth)) => Some((owner, depth + 1)),
            None => Some((me, 1)),
        };
        drop(state);

        let _guard = InFlightGuard(self);
        listener.on_event(event);
        true
    }
}

/// Clears the in-flight marker even if the callback panics.
struct InFlightGuard<'a>(&'a SlotShared);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.in_flight = match state.in_flight {
            Some((owner, depth)) if depth > 1 => Some((owner, depth - 1)),
            _ => None,
        };
        if state.in_flight.is_none() {
            self.0.idle.notify_all();
        }
    }
}

/// One event waiting on a listener-owned queue.
pub struct Delivery {
    slot: Arc<SlotShared>,
    generation: u64,
    event: Event,
}

impl Delivery {
    /// The event being delivered.
    #[must_use]
    pub const fn event(&self) -> Event {
        self.event
    }

    /// Calls the listener if it is still registered. Returns the event if it
    /// was delivered.
    pub fn run(self) -> Option<Event> {
        self.slot
            .deliver(self.generation, self.event)
            .then_some(self.event)
    }
}

/// The controller's single listener slot.
pub struct ListenerSlot {
    shared: Arc<SlotShared>,
}

impl Default for ListenerSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SlotShared {
                state: Mutex::new(SlotState {
                    generation: 0,
                    registration: None,
                    in_flight: None,
                }),
                idle: Condvar::new(),
            }),
        }
    }

    /// Replaces the registration; `None` detaches.
    ///
    /// Returns once no callback to the previous listener is running on another
    /// thread. From then on the previous listener receives nothing, including
    /// deliveries already sitting in its queue. Calling this from inside a
    /// callback is allowed.
    pub fn set(&self, listener: Option<Listener>) {
        let mut state = self.shared.wait_idle(self.shared.lock());
        state.generation = state.generation.wrapping_add(1);
        state.registration = listener;
    }

    /// Whether a live listener is registered.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.shared
            .lock()
            .registration
            .as_ref()
            .is_some_and(|r| r.target.strong_count() > 0)
    }

    /// Delivers `event` to the registered listener, or drops it if there is none.
    pub fn emit(&self, event: Event) {
        let state = self.shared.lock();
        let generation = state.generation;

        match state.registration.as_ref().map(|r| &r.context) {
            None => {
                trace!(%event, "No listener registered, event dropped");
                return;
            }
            Some(DispatchContext::Queue(sender)) => {
                let delivery = Delivery {
                    slot: Arc::clone(&self.shared),
                    generation,
                    event,
                };
                if sender.send(delivery).is_err() {
                    trace!(%event, "Listener queue closed, event dropped");
                }
                return;
            }
            Some(DispatchContext::Immediate) => {}
        }

        drop(state);
        self.shared.deliver(generation, event);
    }
}
