//! Listener-owned event queue.
//!
//! A front end that must update its display from one thread registers with
//! [`EventQueue::context`] and drains the queue from that thread. Deliveries for
//! a listener that has since been detached are skipped when drained.

use color_eyre::Result;
use std::sync::mpsc;
use std::time::Duration;

use crate::core::dispatch::{Delivery, DispatchContext};
use crate::state::Event;

/// Receives controller events on the thread that owns it.
pub struct EventQueue {
    sender: mpsc::Sender<Delivery>,
    receiver: mpsc::Receiver<Delivery>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }

    /// Dispatch context that posts to this queue.
    #[must_use]
    pub fn context(&self) -> DispatchContext {
        DispatchContext::Queue(self.sender.clone())
    }

    /// Blocks until the next delivery and runs it.
    ///
    /// Returns the event if the listener was still registered to receive it.
    ///
    /// # Errors
    ///
    /// Returns an error if the event channel is disconnected.
    pub fn next(&self) -> Result<Option<Event>> {
        Ok(self.receiver.recv()?.run())
    }

    /// Waits up to `timeout` for one delivery and runs it.
    pub fn next_timeout(&self, timeout: Duration) -> Option<Event> {
        self.receiver.recv_timeout(timeout).ok().and_then(Delivery::run)
    }

    /// Runs every delivery already queued. Returns how many reached the listener.
    pub fn drain(&self) -> usize {
        self.receiver
            .try_iter()
            .filter_map(Delivery::run)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatch::{EventListener, Listener, ListenerSlot};
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[derive(Default)]
    struct Display {
        lines: Mutex<Vec<(Event, thread::ThreadId)>>,
    }

    impl EventListener for Display {
        fn on_event(&self, event: Event) {
            self.lines.lock().unwrap().push((event, thread::current().id()));
        }
    }

    #[test]
    fn test_events_run_on_draining_thread() {
        let slot = Arc::new(ListenerSlot::new());
        let queue = EventQueue::new();
        let display = Arc::new(Display::default());
        slot.set(Some(Listener::new(&display, queue.context())));

        let emitter = Arc::clone(&slot);
        thread::spawn(move || {
            emitter.emit(Event::Connecting);
            emitter.emit(Event::Connected);
        })
        .join()
        .unwrap();

        assert_eq!(queue.drain(), 2);
        let lines = display.lines.lock().unwrap();
        assert_eq!(lines[0].0, Event::Connecting);
        assert_eq!(lines[1].0, Event::Connected);
        assert!(lines.iter().all(|(_, id)| *id == thread::current().id()));
    }

    #[test]
    fn test_next_timeout_on_empty_queue() {
        let queue = EventQueue::new();
        assert_eq!(queue.next_timeout(Duration::from_millis(5)), None);
        assert_eq!(queue.drain(), 0);
    }

    #[test]
    fn test_next_runs_single_delivery() {
        let slot = ListenerSlot::new();
        let queue = EventQueue::new();
        let display = Arc::new(Display::default());
        slot.set(Some(Listener::new(&display, queue.context())));

        slot.emit(Event::Initialized);
        assert_eq!(queue.next().unwrap(), Some(Event::Initialized));
    }
}
