/// Read downsampling for dense pileups
///
/// Reads arrive sorted by start. They are bucketed into windows of
/// `window_size` bp, each window opening at the first read that starts at or
/// after the previous window's end. Each window keeps a uniform random sample
/// of at most `max_per_window` reads (reservoir sampling).
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::alignment::Alignment;

/// Downsampling settings, snapshotted when a load starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownsampleOptions {
    pub enabled: bool,
    pub window_size: u64,
    pub max_per_window: usize,
}

impl Default for DownsampleOptions {
    fn default() -> Self {
        DownsampleOptions {
            enabled: true,
            window_size: 50,
            max_per_window: 100,
        }
    }
}

impl DownsampleOptions {
    pub fn disabled() -> Self {
        DownsampleOptions {
            enabled: false,
            ..Self::default()
        }
    }
}

/// A window in which reads were dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownsampledInterval {
    pub start: u64,
    pub end: u64,
    pub count: usize, // reads dropped
}

pub struct Downsampler {
    options: DownsampleOptions,
    rng: StdRng,
    window_start: u64,
    window_end: u64,
    seen_in_window: usize,
    bucket: Vec<Alignment>,
    kept: Vec<Alignment>,
    downsampled: Vec<DownsampledInterval>,
}

impl Downsampler {
    pub fn new(options: DownsampleOptions) -> Self {
        Self::with_rng(options, StdRng::from_entropy())
    }

    /// Deterministic sampling for tests and reproducible exports
    pub fn with_seed(options: DownsampleOptions, seed: u64) -> Self {
        Self::with_rng(options, StdRng::seed_from_u64(seed))
    }

    fn with_rng(options: DownsampleOptions, rng: StdRng) -> Self {
        Downsampler {
            options,
            rng,
            window_start: 0,
            window_end: 0,
            seen_in_window: 0,
            bucket: Vec::new(),
            kept: Vec::new(),
            downsampled: Vec::new(),
        }
    }

    pub fn push(&mut self, alignment: Alignment) {
        if !self.options.enabled || self.options.max_per_window == 0 {
            self.kept.push(alignment);
            return;
        }

        if self.seen_in_window == 0 || alignment.start >= self.window_end {
            self.flush_window();
            self.window_start = alignment.start;
            self.window_end = alignment.start + self.options.window_size.max(1);
        }

        self.seen_in_window += 1;
        if self.bucket.len() < self.options.max_per_window {
            self.bucket.push(alignment);
        } else {
            let j = self.rng.gen_range(0..self.seen_in_window);
            if j < self.options.max_per_window {
                self.bucket[j] = alignment;
            }
        }
    }

    fn flush_window(&mut self) {
        if self.seen_in_window == 0 {
            return;
        }
        let dropped = self.seen_in_window - self.bucket.len();
        if dropped > 0 {
            self.downsampled.push(DownsampledInterval {
                start: self.window_start,
                end: self.window_end,
                count: dropped,
            });
        }
        // reservoir replacement scrambles start order
        self.bucket.sort_by_key(|a| a.start);
        self.kept.append(&mut self.bucket);
        self.seen_in_window = 0;
    }

    pub fn finish(mut self) -> (Vec<Alignment>, Vec<DownsampledInterval>) {
        self.flush_window();
        (self.kept, self.downsampled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(n: usize, start: u64) -> Vec<Alignment> {
        (0..n)
            .map(|i| Alignment::new(format!("r{start}_{i}"), "chr1", start, start + 100))
            .collect()
    }

    #[test]
    fn test_disabled_keeps_everything() {
        let mut ds = Downsampler::new(DownsampleOptions::disabled());
        for aln in stack(500, 10) {
            ds.push(aln);
        }
        let (kept, marks) = ds.finish();
        assert_eq!(kept.len(), 500);
        assert!(marks.is_empty());
    }

    #[test]
    fn test_dense_window_is_capped() {
        let options = DownsampleOptions { enabled: true, window_size: 50, max_per_window: 10 };
        let mut ds = Downsampler::with_seed(options, 7);
        for aln in stack(25, 100).into_iter().chain(stack(5, 200)) {
            ds.push(aln);
        }
        let (kept, marks) = ds.finish();
        assert_eq!(kept.len(), 15);
        assert_eq!(marks, vec![DownsampledInterval { start: 100, end: 150, count: 15 }]);
        assert!(kept.windows(2).all(|w| w[0].start <= w[1].start));
    }

    #[test]
    fn test_same_seed_same_sample() {
        let options = DownsampleOptions { enabled: true, window_size: 50, max_per_window: 3 };
        let run = || {
            let mut ds = Downsampler::with_seed(options, 42);
            for aln in stack(40, 0) {
                ds.push(aln);
            }
            ds.finish().0.into_iter().map(|a| a.read_name).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
