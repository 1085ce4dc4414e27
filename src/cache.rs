/// Bounded cache of loaded intervals
///
/// Insertion order is recency: `add` evicts the oldest entry (FIFO, reads do
/// not refresh an entry). Shrinking prefers entries that still cover an active
/// viewport, when that check is cheap enough.
use log::debug;

use crate::interval::LoadInterval;
use crate::range::GenomicRange;

/// Largest (entries x active ranges) product for a containment-aware shrink
pub const SHRINK_CHECK_LIMIT: usize = 25;

#[derive(Debug)]
pub struct IntervalCache {
    max_size: usize,
    shrink_check_limit: usize,
    entries: Vec<LoadInterval>,
}

impl Default for IntervalCache {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IntervalCache {
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        IntervalCache {
            max_size,
            shrink_check_limit: SHRINK_CHECK_LIMIT,
            entries: Vec::with_capacity(max_size),
        }
    }

    pub fn with_shrink_check_limit(mut self, limit: usize) -> Self {
        self.shrink_check_limit = limit;
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert as newest, evicting the oldest entry when full
    pub fn add(&mut self, interval: LoadInterval) {
        if self.entries.len() >= self.max_size {
            let evicted = self.entries.remove(0);
            debug!("Evicting cached interval {}", evicted.range());
        }
        self.entries.push(interval);
        debug_assert!(self.entries.len() <= self.max_size);
    }

    /// First (oldest) entry containing `range`
    pub fn lookup(&self, range: &GenomicRange) -> Option<&LoadInterval> {
        self.entries.iter().find(|iv| iv.range().contains(range))
    }

    pub fn lookup_mut(&mut self, range: &GenomicRange) -> Option<&mut LoadInterval> {
        self.entries.iter_mut().find(|iv| iv.range().contains(range))
    }

    /// Set a new bound; shrinking keeps entries covering `active` where possible
    pub fn resize(&mut self, new_max_size: usize, active: &[GenomicRange]) {
        self.max_size = new_max_size.max(1);
        if self.entries.len() <= self.max_size {
            return;
        }

        let before = self.entries.len();
        if active.len() * self.entries.len() < self.shrink_check_limit {
            let max_size = self.max_size;
            let mut kept = 0;
            self.entries.retain(|iv| {
                if kept < max_size && active.iter().any(|r| iv.range().contains(r)) {
                    kept += 1;
                    true
                } else {
                    false
                }
            });
        } else {
            self.entries.truncate(self.max_size);
        }
        debug!(
            "Resized interval cache to {} ({} -> {} entries)",
            self.max_size,
            before,
            self.entries.len()
        );
        debug_assert!(self.entries.len() <= self.max_size);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &LoadInterval> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LoadInterval> {
        self.entries.iter_mut()
    }
}
