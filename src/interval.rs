/// A loaded genomic region and everything derived from it
use std::sync::Arc;

use crate::alignment::Alignment;
use crate::counts::AlignmentCounts;
use crate::downsample::DownsampledInterval;
use crate::error::{LoadError, Result};
use crate::pack::{pack, PackedRows, PackingOptions};
use crate::range::GenomicRange;
use crate::sort::{sort_rows, SortOption};
use crate::source::AlignmentTile;
use crate::splice::{SpliceJunction, SpliceJunctionCollector, SpliceLoadOptions};

/// Immutable snapshot of one successful load
///
/// Only the packed layout changes after construction: it is rebuilt when the
/// packing options change and reordered by `sort_rows`. Readers hold an `Arc`
/// to the layout they were given, so a sort never mutates what they see.
#[derive(Debug)]
pub struct LoadInterval {
    range: GenomicRange,
    alignments: Vec<Arc<Alignment>>,
    counts: AlignmentCounts,
    splice: Box<dyn SpliceJunctionCollector>,
    downsampled: Vec<DownsampledInterval>,
    packed: Option<Arc<PackedRows>>,
    packed_with: Option<PackingOptions>,
}

impl LoadInterval {
    pub fn new(range: GenomicRange, tile: AlignmentTile, splice: Box<dyn SpliceJunctionCollector>) -> Self {
        LoadInterval {
            range,
            alignments: tile.alignments.into_iter().map(Arc::new).collect(),
            counts: tile.counts,
            splice,
            downsampled: tile.downsampled,
            packed: None,
            packed_with: None,
        }
    }

    /// Every alignment must overlap the advertised range
    pub fn validate(&self) -> Result<()> {
        let range = &self.range;
        match self.alignments.iter().find(|a| {
            !range.overlaps(&a.chromosome, a.start, a.end.max(a.start + 1))
        }) {
            Some(bad) => Err(LoadError::PackingInconsistency {
                name: bad.read_name.clone(),
                start: bad.start,
                end: bad.end,
                range: range.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn range(&self) -> &GenomicRange {
        &self.range
    }

    pub fn contains(&self, chromosome: &str, start: u64, end: u64) -> bool {
        self.range.contains_coords(chromosome, start, end)
    }

    pub fn alignments(&self) -> &[Arc<Alignment>] {
        &self.alignments
    }

    pub fn counts(&self) -> &AlignmentCounts {
        &self.counts
    }

    pub fn downsampled(&self) -> &[DownsampledInterval] {
        &self.downsampled
    }

    pub fn splice_junctions(&self) -> Vec<SpliceJunction> {
        self.splice.junctions()
    }

    pub fn set_splice_options(&mut self, options: SpliceLoadOptions) {
        self.splice.set_load_options(options);
    }

    /// Rebuild the packed layout unconditionally
    pub fn repack(&mut self, options: &PackingOptions) -> Arc<PackedRows> {
        let packed = Arc::new(pack(&self.range, &self.alignments, options));
        self.packed = Some(Arc::clone(&packed));
        self.packed_with = Some(options.clone());
        packed
    }

    /// Pack only if never packed or packed with different options
    pub fn ensure_packed(&mut self, options: &PackingOptions) -> Arc<PackedRows> {
        if let (Some(packed), Some(with)) = (&self.packed, &self.packed_with) {
            if with == options {
                return Arc::clone(packed);
            }
        }
        self.repack(options)
    }

    pub fn packed_rows(&self) -> Option<Arc<PackedRows>> {
        self.packed.clone()
    }

    /// Re-sort rows at `pivot`; false when the interval was never packed
    pub fn sort_rows(&mut self, option: SortOption, pivot: u64, tag: Option<&str>) -> bool {
        let Some(packed) = self.packed.as_mut() else {
            return false;
        };
        // copy-on-write if a reader still holds the previous layout
        let rows = Arc::make_mut(packed);
        sort_rows(rows, option, pivot, tag, &self.counts);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splice::SpliceJunctionHelper;

    fn interval(alignments: Vec<Alignment>) -> LoadInterval {
        let range = GenomicRange::new("chr1", 100, 200).unwrap();
        let tile = AlignmentTile {
            alignments,
            counts: AlignmentCounts::new("chr1", 100, 200),
            downsampled: Vec::new(),
        };
        LoadInterval::new(range, tile, Box::new(SpliceJunctionHelper::default()))
    }

    #[test]
    fn test_validate() {
        let ok = interval(vec![
            Alignment::new("edge", "chr1", 50, 101),
            Alignment::new("inside", "chr1", 120, 130),
        ]);
        assert!(ok.validate().is_ok());

        let outside = interval(vec![Alignment::new("far", "chr1", 500, 600)]);
        assert!(matches!(
            outside.validate(),
            Err(LoadError::PackingInconsistency { ref name, .. }) if name == "far"
        ));

        let wrong_chr = interval(vec![Alignment::new("x", "chr2", 120, 130)]);
        assert!(wrong_chr.validate().is_err());
    }

    #[test]
    fn test_sort_copies_on_write() {
        let mut iv = interval(vec![
            Alignment::new("a", "chr1", 100, 150).with_mapping_quality(1),
            Alignment::new("b", "chr1", 100, 150).with_mapping_quality(50),
        ]);
        assert!(!iv.sort_rows(SortOption::MappingQuality, 120, None));

        let before = iv.ensure_packed(&PackingOptions::default());
        assert!(iv.sort_rows(SortOption::MappingQuality, 120, None));
        let after = iv.packed_rows().unwrap();

        let first = |p: &PackedRows| p.get("").unwrap()[0].placements[0].alignment.read_name.clone();
        assert_eq!(first(&before), "a");
        assert_eq!(first(&after), "b");
    }

    #[test]
    fn test_ensure_packed_reuses_layout() {
        let mut iv = interval(vec![Alignment::new("a", "chr1", 100, 150)]);
        let options = PackingOptions::default();
        let first = iv.ensure_packed(&options);
        let second = iv.ensure_packed(&options);
        assert!(Arc::ptr_eq(&first, &second));

        let pairs = PackingOptions { view_pairs: true, ..options };
        let third = iv.ensure_packed(&pairs);
        assert!(!Arc::ptr_eq(&first, &third));
    }
}
