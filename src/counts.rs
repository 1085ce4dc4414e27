/// Per-base summary counts over a loaded interval
///
/// Counts are dense over `[start, end)`; positions outside return zero.
use std::fmt::Write as _;

use crate::alignment::{Alignment, GapKind, Strand};

const BASES: [u8; 5] = [b'A', b'C', b'G', b'T', b'N'];

fn base_index(base: u8) -> usize {
    match base.to_ascii_uppercase() {
        b'A' => 0,
        b'C' => 1,
        b'G' => 2,
        b'T' => 3,
        _ => 4,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentCounts {
    chromosome: String,
    start: u64,
    end: u64,
    pos_counts: Vec<[u32; 5]>,
    neg_counts: Vec<[u32; 5]>,
    base_quality: Vec<[u32; 5]>,
    deletions: Vec<u32>,
    insertions: Vec<u32>,
}

impl AlignmentCounts {
    pub fn new(chromosome: impl Into<String>, start: u64, end: u64) -> Self {
        let len = end.saturating_sub(start) as usize;
        AlignmentCounts {
            chromosome: chromosome.into(),
            start,
            end,
            pos_counts: vec![[0; 5]; len],
            neg_counts: vec![[0; 5]; len],
            base_quality: vec![[0; 5]; len],
            deletions: vec![0; len],
            insertions: vec![0; len],
        }
    }

    pub fn chromosome(&self) -> &str {
        &self.chromosome
    }

    pub(crate) fn set_chromosome(&mut self, chromosome: &str) {
        self.chromosome = chromosome.to_string();
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    fn offset(&self, pos: u64) -> Option<usize> {
        if pos >= self.start && pos < self.end {
            Some((pos - self.start) as usize)
        } else {
            None
        }
    }

    /// Add one alignment's bases, deletions and insertions
    pub fn inc_counts(&mut self, alignment: &Alignment) {
        if alignment.chromosome != self.chromosome {
            return;
        }

        for block in &alignment.blocks {
            for (i, &base) in block.bases.iter().enumerate() {
                let Some(offset) = self.offset(block.start + i as u64) else {
                    continue;
                };
                let idx = base_index(base);
                match alignment.strand {
                    Strand::Forward => self.pos_counts[offset][idx] += 1,
                    Strand::Reverse => self.neg_counts[offset][idx] += 1,
                }
                let q = block.qualities.get(i).copied().unwrap_or(0) as u32;
                self.base_quality[offset][idx] += q;
            }
        }

        for gap in alignment.gaps.iter().filter(|g| g.kind == GapKind::Deletion) {
            for pos in gap.start..gap.start + gap.len {
                if let Some(offset) = self.offset(pos) {
                    self.deletions[offset] += 1;
                }
            }
        }

        for &(pos, _) in &alignment.insertions {
            if let Some(offset) = self.offset(pos) {
                self.insertions[offset] += 1;
            }
        }
    }

    pub fn count(&self, pos: u64, base: u8) -> u32 {
        self.pos_count(pos, base) + self.neg_count(pos, base)
    }

    pub fn pos_count(&self, pos: u64, base: u8) -> u32 {
        self.offset(pos)
            .map(|o| self.pos_counts[o][base_index(base)])
            .unwrap_or(0)
    }

    pub fn neg_count(&self, pos: u64, base: u8) -> u32 {
        self.offset(pos)
            .map(|o| self.neg_counts[o][base_index(base)])
            .unwrap_or(0)
    }

    pub fn total_count(&self, pos: u64) -> u32 {
        self.offset(pos)
            .map(|o| {
                self.pos_counts[o].iter().sum::<u32>() + self.neg_counts[o].iter().sum::<u32>()
            })
            .unwrap_or(0)
    }

    pub fn quality(&self, pos: u64, base: u8) -> u32 {
        self.offset(pos)
            .map(|o| self.base_quality[o][base_index(base)])
            .unwrap_or(0)
    }

    pub fn total_quality(&self, pos: u64) -> u32 {
        self.offset(pos)
            .map(|o| self.base_quality[o].iter().sum())
            .unwrap_or(0)
    }

    pub fn del_count(&self, pos: u64) -> u32 {
        self.offset(pos).map(|o| self.deletions[o]).unwrap_or(0)
    }

    pub fn ins_count(&self, pos: u64) -> u32 {
        self.offset(pos).map(|o| self.insertions[o]).unwrap_or(0)
    }

    pub fn number_of_points(&self) -> usize {
        self.pos_counts.len()
    }

    /// Highest total count in `[origin, end)`
    pub fn max_count(&self, origin: u64, end: u64) -> u32 {
        let from = origin.max(self.start);
        let to = end.min(self.end);
        (from..to).map(|pos| self.total_count(pos)).max().unwrap_or(0)
    }

    /// True when the fraction of non-reference bases exceeds `snp_threshold`
    pub fn is_mismatch(&self, pos: u64, ref_base: u8, snp_threshold: f32) -> bool {
        let total = self.total_count(pos);
        if total == 0 {
            return false;
        }
        let mismatches = total - self.count(pos, ref_base);
        mismatches as f32 / total as f32 > snp_threshold
    }

    /// Human-readable summary of one position
    pub fn value_string(&self, pos: u64) -> String {
        let total = self.total_count(pos);
        let mut out = format!("{}:{}\nTotal count: {}", self.chromosome, pos + 1, total);
        for &base in &BASES {
            let count = self.count(pos, base);
            if count == 0 {
                continue;
            }
            let pct = 100.0 * count as f64 / total as f64;
            let _ = write!(
                out,
                "\n{} : {} ({:.0}%, {}+, {}-)",
                base as char,
                count,
                pct,
                self.pos_count(pos, base),
                self.neg_count(pos, base)
            );
        }
        let dels = self.del_count(pos);
        if dels > 0 {
            let _ = write!(out, "\nDEL: {dels}");
        }
        let ins = self.ins_count(pos);
        if ins > 0 {
            let _ = write!(out, "\nINS: {ins}");
        }
        out
    }
}
