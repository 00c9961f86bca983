//! Micro-batched size refresh for unmounted Regions.
//!
//! Unmounted Regions hold serialized content only, so a container resize
//! cannot re-measure them all at once without stalling the event loop.
//! Instead they queue here and are re-sampled a few at a time, newest first
//! since those are the ones most likely to scroll back into view. Any full
//! recompute in the meantime naturally supersedes whatever is still queued.

use crate::core::region::{region_ptr_eq, RegionRc};

/// Regions re-measured per event-loop turn.
pub const REFRESH_BATCH_SIZE: usize = 3;

#[derive(Default)]
pub struct DetachedRefreshQueue {
    // Oldest first; batches pop from the tail.
    pending: Vec<RegionRc>,
}

impl DetachedRefreshQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a Region for re-measurement. Requeueing moves it to the newest
    /// position.
    pub fn enqueue(&mut self, region: &RegionRc) {
        self.remove(region);
        self.pending.push(region.clone());
    }

    /// Drop a Region from the queue, typically because it was deleted or
    /// mounted again.
    pub fn remove(&mut self, region: &RegionRc) {
        self.pending.retain(|queued| !region_ptr_eq(queued, region));
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Take the next batch, newest first. Empty when nothing is pending.
    pub fn next_batch(&mut self) -> Vec<RegionRc> {
        let take = self.pending.len().min(REFRESH_BATCH_SIZE);
        let start = self.pending.len() - take;
        let mut batch: Vec<RegionRc> = self.pending.drain(start..).collect();
        batch.reverse();
        batch
    }
}
