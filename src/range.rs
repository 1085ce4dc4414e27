/// Genomic coordinates and viewport identity
///
/// All coordinates are 0-based half-open. Region strings typed by a user
/// (`chr1:1,001-2,000`) are 1-based inclusive and converted on parse.
use std::fmt;

use crate::error::{LoadError, Result};

/// Name of the whole-genome pseudo chromosome
pub const ALL_CHROMOSOMES: &str = "All";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenomicRange {
    chromosome: String,
    start: u64,
    end: u64,
}

impl GenomicRange {
    pub fn new(chromosome: impl Into<String>, start: u64, end: u64) -> Result<Self> {
        let chromosome = chromosome.into();
        if chromosome.is_empty() {
            return Err(LoadError::invalid_range("empty chromosome name"));
        }
        if end <= start {
            return Err(LoadError::invalid_range(format!(
                "{chromosome}:{start}-{end} has end <= start"
            )));
        }
        Ok(GenomicRange {
            chromosome,
            start,
            end,
        })
    }

    /// Parse `chr:start-end` with optional thousands separators.
    pub fn parse(region: &str) -> Result<Self> {
        let region = region.trim();
        let (chromosome, span) = region
            .rsplit_once(':')
            .ok_or_else(|| LoadError::invalid_range(format!("'{region}' has no coordinates")))?;
        let (start, end) = span
            .split_once('-')
            .ok_or_else(|| LoadError::invalid_range(format!("'{region}' has no end coordinate")))?;

        let start = parse_coordinate(start)?;
        let end = parse_coordinate(end)?;
        if start == 0 {
            return Err(LoadError::invalid_range(format!(
                "'{region}': coordinates are 1-based"
            )));
        }

        Self::new(chromosome, start - 1, end)
    }

    /// Same chromosome, new bounds; callers guarantee `start < end`
    pub(crate) fn with_bounds(&self, start: u64, end: u64) -> GenomicRange {
        debug_assert!(start < end);
        GenomicRange {
            chromosome: self.chromosome.clone(),
            start,
            end,
        }
    }

    pub(crate) fn with_chromosome(&self, chromosome: &str) -> GenomicRange {
        GenomicRange {
            chromosome: chromosome.to_string(),
            start: self.start,
            end: self.end,
        }
    }

    pub fn chromosome(&self) -> &str {
        &self.chromosome
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn center(&self) -> u64 {
        (self.start + self.end) / 2
    }

    pub fn is_whole_genome(&self) -> bool {
        self.chromosome.eq_ignore_ascii_case(ALL_CHROMOSOMES)
    }

    pub fn contains(&self, other: &GenomicRange) -> bool {
        self.contains_coords(&other.chromosome, other.start, other.end)
    }

    pub fn contains_coords(&self, chromosome: &str, start: u64, end: u64) -> bool {
        self.chromosome == chromosome && self.start <= start && end <= self.end
    }

    pub fn overlaps(&self, chromosome: &str, start: u64, end: u64) -> bool {
        self.chromosome == chromosome && start < self.end && self.start < end
    }
}

impl fmt::Display for GenomicRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chromosome, self.start, self.end)
    }
}

fn parse_coordinate(s: &str) -> Result<u64> {
    let digits: String = s.trim().chars().filter(|&c| c != ',').collect();
    digits
        .parse::<u64>()
        .map_err(|e| LoadError::invalid_range(format!("bad coordinate '{s}': {e}")))
}

/// Identity of one on-screen viewport (split-screen panels each get one)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewportId(pub u32);

impl fmt::Display for ViewportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "viewport-{}", self.0)
    }
}

/// A visible window onto the genome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewport {
    pub id: ViewportId,
    pub range: GenomicRange,
}

impl Viewport {
    pub fn new(id: u32, range: GenomicRange) -> Self {
        Viewport {
            id: ViewportId(id),
            range,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_region() {
        let range = GenomicRange::parse("chr1:1,001-2,000").unwrap();
        assert_eq!(range.chromosome(), "chr1");
        assert_eq!(range.start(), 1000);
        assert_eq!(range.end(), 2000);
        assert_eq!(range.len(), 1000);
        assert_eq!(range.to_string(), "chr1:1000-2000");
    }

    #[test]
    fn test_parse_region_with_colon_in_name() {
        let range = GenomicRange::parse("HLA-A*01:01:1-50").unwrap();
        assert_eq!(range.chromosome(), "HLA-A*01:01");
        assert_eq!(range.start(), 0);
        assert_eq!(range.end(), 50);
    }

    #[test]
    fn test_parse_rejects_bad_regions() {
        assert!(GenomicRange::parse("chr1").is_err());
        assert!(GenomicRange::parse("chr1:100").is_err());
        assert!(GenomicRange::parse("chr1:0-10").is_err());
        assert!(GenomicRange::parse("chr1:200-100").is_err());
        assert!(GenomicRange::parse("chr1:abc-100").is_err());
    }

    #[test]
    fn test_containment() {
        let outer = GenomicRange::new("chr1", 100, 200).unwrap();
        let inner = GenomicRange::new("chr1", 150, 160).unwrap();
        let other_chr = GenomicRange::new("chr2", 150, 160).unwrap();
        let straddling = GenomicRange::new("chr1", 150, 250).unwrap();

        assert!(outer.contains(&inner));
        assert!(outer.contains(&outer));
        assert!(!outer.contains(&other_chr));
        assert!(!outer.contains(&straddling));
        assert!(outer.overlaps("chr1", 199, 300));
        assert!(!outer.overlaps("chr1", 200, 300));
    }

    #[test]
    fn test_whole_genome() {
        assert!(GenomicRange::new("All", 0, 10).unwrap().is_whole_genome());
        assert!(GenomicRange::new("all", 0, 10).unwrap().is_whole_genome());
        assert!(!GenomicRange::new("chr1", 0, 10).unwrap().is_whole_genome());
    }
}
