//! Per-source sequence index allocation.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Hands out strictly increasing sequence indices per source id.
///
/// Each source has its own async lock; holding a [`SequenceSlot`] excludes
/// every other writer for that source until it is dropped, so the
/// read-seed-write cycle cannot interleave. Slots are never removed from
/// the map; writers that replace a source's records call
/// [`SequenceSlot::reset`] while holding the slot.
#[derive(Debug, Default)]
pub struct Sequencer {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<Option<u64>>>>>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire exclusive access to the counter of `source_id`.
    pub async fn lock(&self, source_id: &str) -> SequenceSlot {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(source_id.to_string()).or_default().clone()
        };
        SequenceSlot {
            guard: slot.lock_owned().await,
        }
    }
}

/// Exclusive handle on one source's counter.
#[derive(Debug)]
pub struct SequenceSlot {
    guard: OwnedMutexGuard<Option<u64>>,
}

impl SequenceSlot {
    /// True when the counter has not been seeded since startup or the last reset.
    pub fn needs_seed(&self) -> bool {
        self.guard.is_none()
    }

    /// Seed the counter with the first free index.
    pub fn seed(&mut self, next: u64) {
        *self.guard = Some(next);
    }

    /// Index the next write would receive.
    pub fn peek(&self) -> u64 {
        self.guard.unwrap_or(0)
    }

    /// Discard the counter so the next holder reseeds from storage.
    pub fn reset(&mut self) {
        *self.guard = None;
    }

    /// Mark the peeked index as used.
    pub fn commit(&mut self) {
        let next = self.peek() + 1;
        *self.guard = Some(next);
    }
}

#[cfg(test)]
mod tests {
    use super::Sequencer;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn indices_increase_per_source() {
        let sequencer = Sequencer::new();
        let mut slot = sequencer.lock("a").await;
        assert!(slot.needs_seed());
        slot.seed(4);
        assert_eq!(slot.peek(), 4);
        slot.commit();
        drop(slot);

        let slot = sequencer.lock("a").await;
        assert!(!slot.needs_seed());
        assert_eq!(slot.peek(), 5);
        drop(slot);

        let slot = sequencer.lock("b").await;
        assert!(slot.needs_seed());
    }

    #[tokio::test]
    async fn reset_requires_reseed() {
        let sequencer = Sequencer::new();
        let mut slot = sequencer.lock("a").await;
        slot.seed(1);
        slot.reset();
        drop(slot);
        assert!(sequencer.lock("a").await.needs_seed());
    }

    #[tokio::test]
    async fn held_slot_blocks_other_writers() {
        let sequencer = Arc::new(Sequencer::new());
        let mut slot = sequencer.lock("a").await;
        slot.seed(3);

        let waiter = {
            let sequencer = sequencer.clone();
            tokio::spawn(async move {
                let mut slot = sequencer.lock("a").await;
                slot.reset();
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        slot.commit();
        assert_eq!(slot.peek(), 4);
        drop(slot);
        waiter.await.expect("join");
        assert!(sequencer.lock("a").await.needs_seed());
    }

    #[tokio::test]
    async fn concurrent_writers_never_share_an_index() {
        let sequencer = Arc::new(Sequencer::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let sequencer = sequencer.clone();
            handles.push(tokio::spawn(async move {
                let mut slot = sequencer.lock("chat").await;
                if slot.needs_seed() {
                    slot.seed(0);
                }
                let index = slot.peek();
                tokio::task::yield_now().await;
                slot.commit();
                index
            }));
        }
        let mut indices = Vec::new();
        for handle in handles {
            indices.push(handle.await.expect("join"));
        }
        indices.sort_unstable();
        assert_eq!(indices, (0..16).collect::<Vec<u64>>());
    }
}
