/// Viewer settings read by the load coordinator
///
/// Built by the binary from command-line flags, or by an embedding view layer
/// from its own preferences. Loads snapshot the relevant parts by value.
use crate::downsample::DownsampleOptions;
use crate::pack::PackingOptions;
use crate::source::ReadFilter;
use crate::splice::SpliceLoadOptions;

/// Screen width, in pixels, the visibility threshold is defined against
const REFERENCE_SCREEN_PIXELS: f64 = 700.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub max_visible_range_kb: f64, // widest window that shows alignments
    pub downsample: DownsampleOptions,
    pub splice: SpliceLoadOptions,
    pub read_filter: ReadFilter,
    pub show_alignments: bool,
    pub packing: PackingOptions,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        ViewerConfig {
            max_visible_range_kb: 30.0,
            downsample: DownsampleOptions::default(),
            splice: SpliceLoadOptions::default(),
            read_filter: ReadFilter::default(),
            show_alignments: true,
            packing: PackingOptions::default(),
        }
    }
}

impl ViewerConfig {
    pub fn max_visible_range_bp(&self) -> u64 {
        (self.max_visible_range_kb * 1000.0).max(0.0) as u64
    }

    /// Base pairs per pixel above which alignments are not drawn
    pub fn min_visible_scale(&self) -> f64 {
        self.max_visible_range_kb * 1000.0 / REFERENCE_SCREEN_PIXELS
    }
}
