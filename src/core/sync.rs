//! Blocklist hand-off from the edit boundary to the filter engine.
//!
//! Snapshots are built in full by the caller and published with one pointer
//! swap, so a reader sees either the old set or the new one. Publishing is
//! serialized by a single writer lock, which also guards whether the engine is
//! currently attached to a live tunnel.

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::state::BlockedIpSet;
use crate::vpn::{FilterEngine, Snapshot};

/// Single-writer blocklist channel feeding one filter engine.
pub struct BlocklistChannel {
    current: ArcSwap<BlockedIpSet>,
    generation: AtomicU64,
    engine: Arc<dyn FilterEngine>,
    /// Whether the engine is running on a tunnel. Held while publishing.
    attached: Mutex<bool>,
}

impl BlocklistChannel {
    /// Creates a channel holding `initial` with the engine detached.
    pub fn new(engine: Arc<dyn FilterEngine>, initial: BlockedIpSet) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            generation: AtomicU64::new(0),
            engine,
            attached: Mutex::new(false),
        }
    }

    /// The most recently published snapshot.
    #[must_use]
    pub fn current(&self) -> Snapshot {
        self.current.load_full()
    }

    /// Number of snapshots published so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Stores `set` as current and forwards it if the engine is attached.
    ///
    /// Returns the generation assigned to this snapshot.
    pub fn publish(&self, set: BlockedIpSet) -> u64 {
        let snapshot = Arc::new(set);
        let attached = self.attached.lock().unwrap_or_else(PoisonError::into_inner);

        self.current.store(Arc::clone(&snapshot));
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        if *attached {
            self.engine.update_blocklist(Arc::clone(&snapshot));
        }
        debug!(generation, entries = snapshot.len(), forwarded = *attached, "Blocklist published");
        generation
    }

    /// Marks the engine live and forwards the current snapshot to it.
    pub fn attach(&self) {
        let mut attached = self.attached.lock().unwrap_or_else(PoisonError::into_inner);
        *attached = true;
        self.engine.update_blocklist(self.current());
    }

    /// Stops forwarding; later snapshots are only stored.
    pub fn detach(&self) {
        *self.attached.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    /// Whether snapshots are currently forwarded.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        *self.attached.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::controller::testing::RecordingEngine;
    use std::thread;

    fn set(list: &str) -> BlockedIpSet {
        BlockedIpSet::parse_list(list).unwrap()
    }

    #[test]
    fn test_publish_while_detached_only_stores() {
        let engine = Arc::new(RecordingEngine::default());
        let channel = BlocklistChannel::new(engine.clone(), BlockedIpSet::new());

        assert_eq!(channel.publish(set("10.0.0.1")), 1);
        assert!(engine.updates().is_empty());
        assert_eq!(*channel.current(), set("10.0.0.1"));
    }

    #[test]
    fn test_attach_forwards_current() {
        let engine = Arc::new(RecordingEngine::default());
        let channel = BlocklistChannel::new(engine.clone(), set("10.0.0.1"));

        channel.attach();
        assert_eq!(engine.updates(), vec![Arc::new(set("10.0.0.1"))]);

        channel.publish(set("10.0.0.2"));
        assert_eq!(*engine.applied().unwrap(), set("10.0.0.2"));

        channel.detach();
        channel.publish(set("10.0.0.3"));
        assert_eq!(engine.updates().len(), 2);
    }

    #[test]
    fn test_concurrent_publishers_converge_on_last() {
        let engine = Arc::new(RecordingEngine::default());
        let channel = Arc::new(BlocklistChannel::new(engine.clone(), BlockedIpSet::new()));
        channel.attach();

        let handles: Vec<_> = (1..=8u8)
            .map(|i| {
                let channel = Arc::clone(&channel);
                thread::spawn(move || {
                    channel.publish(set(&format!("10.0.0.{i}")));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(channel.generation(), 8);
        // Whatever order the writers won in, the engine ends on the stored snapshot.
        assert_eq!(engine.applied().unwrap(), channel.current());
        assert_eq!(engine.applied().unwrap().len(), 1);
    }
}
