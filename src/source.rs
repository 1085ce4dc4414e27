/// The alignment source seam: anything that can return decoded alignments,
/// summary counts and splice data for a coordinate range.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::alignment::Alignment;
use crate::counts::AlignmentCounts;
use crate::downsample::{DownsampleOptions, DownsampledInterval, Downsampler};
use crate::error::{LoadError, Result};
use crate::range::GenomicRange;
use crate::splice::SpliceJunctionCollector;

/// Cooperative cancellation flag shared between a coordinator and its job
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancelled, for use with `?` inside decode loops
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(LoadError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Which reads are dropped while decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadFilter {
    pub filter_duplicates: bool,
    pub filter_vendor_failed: bool,
    pub filter_secondary: bool,
    pub filter_supplementary: bool,
    pub min_mapping_quality: u8,
}

impl Default for ReadFilter {
    fn default() -> Self {
        ReadFilter {
            filter_duplicates: true,
            filter_vendor_failed: true,
            filter_secondary: false,
            filter_supplementary: false,
            min_mapping_quality: 0,
        }
    }
}

impl ReadFilter {
    pub fn accepts(&self, alignment: &Alignment) -> bool {
        !(self.filter_duplicates && alignment.is_duplicate()
            || self.filter_vendor_failed && alignment.is_vendor_failed()
            || self.filter_secondary && alignment.is_secondary()
            || self.filter_supplementary && alignment.is_supplementary()
            || alignment.mapping_quality < self.min_mapping_quality)
    }
}

/// Configuration snapshot for one fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub range: GenomicRange, // chromosome named as the source knows it
    pub downsample: DownsampleOptions,
    pub read_filter: ReadFilter,
    pub show_alignments: bool,
}

/// Everything a source returns for one range
#[derive(Debug, Clone)]
pub struct AlignmentTile {
    pub alignments: Vec<Alignment>,
    pub counts: AlignmentCounts,
    pub downsampled: Vec<DownsampledInterval>,
}

/// Streams decoded alignments into a tile
///
/// Every accepted read is counted and offered to the splice collector;
/// downsampling only affects which reads are kept for display.
pub struct TileBuilder<'a> {
    request: &'a FetchRequest,
    splice: &'a mut dyn SpliceJunctionCollector,
    counts: AlignmentCounts,
    downsampler: Downsampler,
}

impl<'a> TileBuilder<'a> {
    pub fn new(request: &'a FetchRequest, splice: &'a mut dyn SpliceJunctionCollector) -> Self {
        let range = &request.range;
        TileBuilder {
            request,
            splice,
            counts: AlignmentCounts::new(range.chromosome(), range.start(), range.end()),
            downsampler: Downsampler::new(request.downsample),
        }
    }

    /// Returns false when the read was rejected by the read filter
    pub fn push(&mut self, alignment: Alignment) -> bool {
        if !self.request.read_filter.accepts(&alignment) {
            return false;
        }
        self.counts.inc_counts(&alignment);
        self.splice.add_alignment(&alignment);
        if self.request.show_alignments {
            self.downsampler.push(alignment);
        }
        true
    }

    pub fn finish(self) -> AlignmentTile {
        self.splice.finish();
        let (alignments, downsampled) = self.downsampler.finish();
        AlignmentTile {
            alignments,
            counts: self.counts,
            downsampled,
        }
    }
}

/// Barcode tag carried by 10x Genomics linked reads
pub const TENX_BARCODE_TAG: &str = "BX";

/// Haplotype assignment tag written by read-phasing tools
pub const HAPLOTYPE_TAG: &str = "HP";

pub trait AlignmentSource: Send + Sync {
    /// Load everything overlapping `request.range`. Blocking; runs on a worker.
    fn fetch(
        &self,
        request: &FetchRequest,
        splice: &mut dyn SpliceJunctionCollector,
        cancel: &CancelToken,
    ) -> Result<AlignmentTile>;

    /// Sequence names as they appear in the source
    fn sequence_names(&self) -> Result<Vec<String>>;

    fn is_paired_end(&self) -> bool {
        false
    }

    fn has_index(&self) -> bool {
        true
    }

    /// Sequencing platforms declared by the source (e.g. `ILLUMINA`)
    fn platforms(&self) -> Vec<String> {
        Vec::new()
    }

    fn is_tenx(&self) -> bool {
        false
    }

    fn is_phased(&self) -> bool {
        false
    }

    fn is_moleculo(&self) -> bool {
        false
    }

    /// Release file handles; later fetches fail with `SourceUnavailable`
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splice::{SpliceJunctionHelper, SpliceLoadOptions};

    fn request(show_alignments: bool) -> FetchRequest {
        FetchRequest {
            range: GenomicRange::new("chr1", 0, 100).unwrap(),
            downsample: DownsampleOptions::disabled(),
            read_filter: ReadFilter::default(),
            show_alignments,
        }
    }

    #[test]
    fn test_read_filter() {
        let filter = ReadFilter { min_mapping_quality: 10, ..ReadFilter::default() };
        let good = Alignment::new("a", "chr1", 0, 10);
        let dup = Alignment::new("b", "chr1", 0, 10).with_flags(Alignment::FLAG_DUPLICATE);
        let low = Alignment::new("c", "chr1", 0, 10).with_mapping_quality(3);
        let secondary = Alignment::new("d", "chr1", 0, 10).with_flags(Alignment::FLAG_SECONDARY);
        assert!(filter.accepts(&good));
        assert!(!filter.accepts(&dup));
        assert!(!filter.accepts(&low));
        assert!(filter.accepts(&secondary));
    }

    #[test]
    fn test_hidden_alignments_still_counted() {
        let req = request(false);
        let mut splice = SpliceJunctionHelper::new(SpliceLoadOptions::default());
        let mut builder = TileBuilder::new(&req, &mut splice);
        assert!(builder.push(Alignment::new("a", "chr1", 0, 4).with_sequence(b"ACGT", &[30; 4])));
        let tile = builder.finish();
        assert!(tile.alignments.is_empty());
        assert_eq!(tile.counts.total_count(2), 1);
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let shared = token.clone();
        assert!(token.check().is_ok());
        shared.cancel();
        assert_eq!(token.check(), Err(LoadError::Cancelled));
    }
}
