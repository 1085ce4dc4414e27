/// Splice junction aggregation
///
/// Junctions are collected while a tile is decoded. The collector is a
/// pluggable collaborator: the coordinator creates one per load and keeps it
/// with the loaded interval so filter options can change without reloading.
use std::collections::BTreeMap;
use std::fmt;

use crate::alignment::{Alignment, GapKind, Strand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpliceLoadOptions {
    pub min_junction_coverage: u32,
    pub min_read_flanking_width: u64,
}

impl Default for SpliceLoadOptions {
    fn default() -> Self {
        SpliceLoadOptions {
            min_junction_coverage: 1,
            min_read_flanking_width: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpliceJunction {
    pub chromosome: String,
    pub start: u64, // first intron base
    pub end: u64,   // one past last intron base
    pub strand: Strand,
    pub depth: u32,
    pub flanking_start: u64, // leftmost read start supporting the junction
    pub flanking_end: u64,   // rightmost read end supporting the junction
    max_left_flank: u64,
    max_right_flank: u64,
}

pub trait SpliceJunctionCollector: Send + Sync + fmt::Debug {
    fn add_alignment(&mut self, alignment: &Alignment);

    /// Called once after the last alignment of a tile
    fn finish(&mut self) {}

    /// Junctions passing the current load options
    fn junctions(&self) -> Vec<SpliceJunction>;

    fn load_options(&self) -> SpliceLoadOptions;

    fn set_load_options(&mut self, options: SpliceLoadOptions);
}

/// Default collector: one junction per distinct (start, end, strand)
#[derive(Debug, Default)]
pub struct SpliceJunctionHelper {
    options: SpliceLoadOptions,
    all: BTreeMap<(u64, u64, bool), SpliceJunction>,
}

impl SpliceJunctionHelper {
    pub fn new(options: SpliceLoadOptions) -> Self {
        SpliceJunctionHelper {
            options,
            all: BTreeMap::new(),
        }
    }

    /// Junctions regardless of filters
    pub fn unfiltered_count(&self) -> usize {
        self.all.len()
    }
}

impl SpliceJunctionCollector for SpliceJunctionHelper {
    fn add_alignment(&mut self, alignment: &Alignment) {
        for gap in alignment.gaps.iter().filter(|g| g.kind == GapKind::Skip) {
            let gap_end = gap.start + gap.len;
            // aligned bases directly flanking the intron
            let left_flank = alignment
                .blocks
                .iter()
                .find(|b| b.end() == gap.start)
                .map(|b| b.bases.len() as u64)
                .unwrap_or(0);
            let right_flank = alignment
                .blocks
                .iter()
                .find(|b| b.start == gap_end)
                .map(|b| b.bases.len() as u64)
                .unwrap_or(0);

            let key = (gap.start, gap_end, alignment.strand == Strand::Reverse);
            let junction = self.all.entry(key).or_insert_with(|| SpliceJunction {
                chromosome: alignment.chromosome.clone(),
                start: gap.start,
                end: gap_end,
                strand: alignment.strand,
                depth: 0,
                flanking_start: alignment.start,
                flanking_end: alignment.end,
                max_left_flank: 0,
                max_right_flank: 0,
            });
            junction.depth += 1;
            junction.flanking_start = junction.flanking_start.min(alignment.start);
            junction.flanking_end = junction.flanking_end.max(alignment.end);
            junction.max_left_flank = junction.max_left_flank.max(left_flank);
            junction.max_right_flank = junction.max_right_flank.max(right_flank);
        }
    }

    fn junctions(&self) -> Vec<SpliceJunction> {
        let min_flank = self.options.min_read_flanking_width;
        self.all
            .values()
            .filter(|j| j.depth >= self.options.min_junction_coverage)
            .filter(|j| j.max_left_flank >= min_flank && j.max_right_flank >= min_flank)
            .cloned()
            .collect()
    }

    fn load_options(&self) -> SpliceLoadOptions {
        self.options
    }

    fn set_load_options(&mut self, options: SpliceLoadOptions) {
        self.options = options;
    }
}
