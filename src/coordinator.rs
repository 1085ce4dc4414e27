/// Load coordination for one alignment track
///
/// The coordinator owns the interval cache and decides when to fetch. At most
/// one load is in flight per coordinator; requests that arrive meanwhile are
/// dropped, and the view re-requests when it is notified. Completion (cache
/// insert, repack, notify) happens under the same lock the view reads
/// through, so a reader never observes a half-built interval.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};

use crate::aliases::ChromosomeAliases;
use crate::cache::IntervalCache;
use crate::config::ViewerConfig;
use crate::downsample::DownsampleOptions;
use crate::error::{LoadError, Result};
use crate::events::{LoadEvent, LoadListeners};
use crate::interval::LoadInterval;
use crate::pack::{PackedRows, PackingOptions};
use crate::range::{GenomicRange, Viewport, ViewportId};
use crate::sort::SortOption;
use crate::source::{AlignmentSource, AlignmentTile, CancelToken, FetchRequest};
use crate::splice::{SpliceJunctionCollector, SpliceJunctionHelper, SpliceLoadOptions};
use crate::worker::LoadExecutor;

/// Builds the splice collector handed to each fetch
pub type SpliceFactory =
    Arc<dyn Fn(SpliceLoadOptions) -> Box<dyn SpliceJunctionCollector> + Send + Sync>;

/// Outcome of `request_load`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// Already covered by a cached interval
    Cached,
    /// A fetch for the (possibly expanded) range was submitted
    Scheduled(GenomicRange),
    /// Another load is in flight; the request was dropped
    Busy,
}

/// Widen `range` so small pans stay inside the loaded interval
///
/// The window is four times the request, capped at `max_visible_range_bp`,
/// and never narrower than the request itself.
pub fn expanded_range(range: &GenomicRange, expand: bool, max_visible_range_bp: u64) -> GenomicRange {
    if !expand {
        return range.clone();
    }
    let (start, end) = (range.start(), range.end());
    let len = range.len();
    let window = len.saturating_mul(4).min(max_visible_range_bp);
    let half = len.max(window / 2);
    let center = range.center();
    let adjusted_start = start.min(center.saturating_sub(half));
    let adjusted_end = end.max(center.saturating_add(half));
    range.with_bounds(adjusted_start, adjusted_end)
}

struct InFlight {
    viewport: ViewportId,
    range: GenomicRange,
    cancel: CancelToken,
}

struct State {
    cache: IntervalCache,
    in_flight: Option<InFlight>,
    generation: u64,
    config: ViewerConfig,
    listeners: LoadListeners,
    splice_factory: SpliceFactory,
}

struct Inner {
    source: Arc<dyn AlignmentSource>,
    executor: Arc<dyn LoadExecutor>,
    // canonical name -> name as the source spells it, and back
    source_names: HashMap<String, String>,
    canonical_names: HashMap<String, String>,
    closed: AtomicBool,
    state: Mutex<State>,
}

/// Everything a background load needs, captured when it is scheduled
struct LoadTask {
    viewport: ViewportId,
    range: GenomicRange,
    request: FetchRequest,
    splice: Box<dyn SpliceJunctionCollector>,
    cancel: CancelToken,
    generation: u64,
}

pub struct LoadCoordinator {
    inner: Arc<Inner>,
}

impl LoadCoordinator {
    pub fn new(
        source: Arc<dyn AlignmentSource>,
        executor: Arc<dyn LoadExecutor>,
        config: ViewerConfig,
        aliases: &ChromosomeAliases,
    ) -> Result<Self> {
        let mut source_names = HashMap::new();
        let mut canonical_names = HashMap::new();
        for name in source.sequence_names()? {
            let canonical = aliases.canonical_name(&name);
            if canonical != name {
                source_names.insert(canonical.clone(), name.clone());
                canonical_names.insert(name, canonical);
            }
        }
        debug!(
            "Coordinator ready: {} renamed sequences, max visible range {} kb",
            source_names.len(),
            config.max_visible_range_kb
        );

        let default_factory: SpliceFactory =
            Arc::new(|options| Box::new(SpliceJunctionHelper::new(options)));
        let state = State {
            cache: IntervalCache::default(),
            in_flight: None,
            generation: 0,
            config,
            listeners: LoadListeners::default(),
            splice_factory: default_factory,
        };

        Ok(LoadCoordinator {
            inner: Arc::new(Inner {
                source,
                executor,
                source_names,
                canonical_names,
                closed: AtomicBool::new(false),
                state: Mutex::new(state),
            }),
        })
    }

    pub fn with_listener(self, sender: Sender<LoadEvent>) -> Self {
        self.inner.lock_state().listeners.add(sender);
        self
    }

    pub fn with_splice_factory(self, factory: SpliceFactory) -> Self {
        self.inner.lock_state().splice_factory = factory;
        self
    }

    pub fn with_cache(self, cache: IntervalCache) -> Self {
        self.inner.lock_state().cache = cache;
        self
    }

    pub fn subscribe(&self) -> Receiver<LoadEvent> {
        self.inner.lock_state().listeners.subscribe()
    }

    /// Ask for `viewport.range` to be loaded; never blocks on the fetch
    pub fn request_load(&self, viewport: &Viewport, expand: bool) -> Result<LoadStatus> {
        let range = &self.inner.canonical_range(&viewport.range);
        if range.is_whole_genome() {
            return Err(LoadError::UnsupportedRange {
                chromosome: range.chromosome().to_string(),
            });
        }
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(LoadError::source_unavailable("alignment track is closed"));
        }

        let mut state = self.inner.lock_state();
        if let Some(current) = &state.in_flight {
            debug!(
                "Dropping load of {} for {}: {} still loading for {}",
                range, viewport.id, current.range, current.viewport
            );
            return Ok(LoadStatus::Busy);
        }
        if state.cache.lookup(range).is_some() {
            return Ok(LoadStatus::Cached);
        }

        let adjusted = expanded_range(range, expand, state.config.max_visible_range_bp());
        let source_chromosome = self.inner.source_name(adjusted.chromosome());
        let request = FetchRequest {
            range: adjusted.with_chromosome(&source_chromosome),
            downsample: state.config.downsample,
            read_filter: state.config.read_filter,
            show_alignments: state.config.show_alignments,
        };
        let cancel = CancelToken::new();
        let task = LoadTask {
            viewport: viewport.id,
            range: adjusted.clone(),
            request,
            splice: (state.splice_factory)(state.config.splice),
            cancel: cancel.clone(),
            generation: state.generation,
        };
        state.in_flight = Some(InFlight {
            viewport: viewport.id,
            range: adjusted.clone(),
            cancel,
        });
        drop(state);

        debug!("Scheduling load of {} for {}", adjusted, viewport.id);
        let inner = Arc::clone(&self.inner);
        let submitted = self
            .inner
            .executor
            .submit("loadAlignments", Box::new(move || inner.run_load(task)));
        if let Err(e) = submitted {
            warn!("Could not start load of {}: {}", adjusted, e);
            let mut state = self.inner.lock_state();
            state.in_flight = None;
            state.listeners.emit(LoadEvent::Failed {
                viewport: viewport.id,
                range: adjusted,
                message: e.to_string(),
            });
            return Err(e);
        }
        Ok(LoadStatus::Scheduled(adjusted))
    }

    /// Packed rows for the viewport, or `None` while they are not cached yet
    ///
    /// A miss schedules an unexpanded load of the visible range as a side
    /// effect. Packing happens lazily here if the cached interval has no
    /// layout for the current options.
    pub fn get_packed_rows(&self, viewport: &Viewport) -> Option<Arc<PackedRows>> {
        if let Err(e) = self.request_load(viewport, false) {
            debug!("No rows for {}: {}", viewport.range, e);
            return None;
        }
        let range = self.inner.canonical_range(&viewport.range);
        let mut state = self.inner.lock_state();
        let packing = state.config.packing.clone();
        state
            .cache
            .lookup_mut(&range)
            .map(|interval| interval.ensure_packed(&packing))
    }

    /// Rows of the interval loaded for the viewport, if its layout covers
    /// `position`
    pub fn grouped_alignments_containing(&self, position: u64, viewport: &Viewport) -> Option<Arc<PackedRows>> {
        let range = self.inner.canonical_range(&viewport.range);
        let state = self.inner.lock_state();
        let rows = state.cache.lookup(&range)?.packed_rows()?;
        rows.contains(range.chromosome(), position, position + 1).then_some(rows)
    }

    /// Repack every cached interval with `options`, which also become the
    /// options for future loads
    pub fn repack(&self, options: PackingOptions) {
        let mut state = self.inner.lock_state();
        for interval in state.cache.iter_mut() {
            interval.repack(&options);
        }
        state.config.packing = options;
    }

    /// Returns true when the setting changed and rows were repacked
    pub fn set_view_as_pairs(&self, view_pairs: bool) -> bool {
        let options = {
            let state = self.inner.lock_state();
            if state.config.packing.view_pairs == view_pairs {
                return false;
            }
            PackingOptions {
                view_pairs,
                ..state.config.packing.clone()
            }
        };
        self.repack(options);
        true
    }

    /// Re-sort the rows of the interval covering `range`; false when nothing
    /// is cached for it
    pub fn sort_rows(&self, option: SortOption, pivot: u64, tag: Option<&str>, range: &GenomicRange) -> bool {
        let range = self.inner.canonical_range(range);
        let mut state = self.inner.lock_state();
        let packing = state.config.packing.clone();
        let Some(interval) = state.cache.lookup_mut(&range) else {
            return false;
        };
        interval.ensure_packed(&packing);
        interval.sort_rows(option, pivot, tag)
    }

    pub fn resize(&self, capacity: usize, active: &[GenomicRange]) {
        self.inner.lock_state().cache.resize(capacity, active);
    }

    /// Track the current set of on-screen viewports
    pub fn on_viewports_changed(&self, viewports: &[Viewport]) {
        let active: Vec<GenomicRange> = viewports
            .iter()
            .map(|v| self.inner.canonical_range(&v.range))
            .collect();
        self.resize(active.len(), &active);
    }

    /// Cancel the in-flight load, if any
    pub fn cancel_load(&self) -> bool {
        let state = self.inner.lock_state();
        match &state.in_flight {
            Some(current) => {
                debug!("Cancelling load of {}", current.range);
                current.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock_state().in_flight.is_some()
    }

    /// Drop every cached interval; an in-flight load is cancelled and its
    /// result discarded
    pub fn clear(&self) {
        self.inner.lock_state().clear();
    }

    pub fn set_show_alignments(&self, show: bool) {
        let mut state = self.inner.lock_state();
        if state.config.show_alignments != show {
            state.config.show_alignments = show;
            state.clear();
        }
    }

    /// Applies to cached junctions immediately
    pub fn set_min_junction_coverage(&self, min_coverage: u32) {
        let mut state = self.inner.lock_state();
        state.config.splice.min_junction_coverage = min_coverage;
        let options = state.config.splice;
        for interval in state.cache.iter_mut() {
            interval.set_splice_options(options);
        }
    }

    /// Applies to future loads only
    pub fn set_downsample_options(&self, options: DownsampleOptions) {
        self.inner.lock_state().config.downsample = options;
    }

    pub fn set_max_visible_range_kb(&self, kb: f64) {
        self.inner.lock_state().config.max_visible_range_kb = kb;
    }

    pub fn config(&self) -> ViewerConfig {
        self.inner.lock_state().config.clone()
    }

    pub fn min_visible_scale(&self) -> f64 {
        self.inner.lock_state().config.min_visible_scale()
    }

    /// Run `f` against the cached interval covering `range`
    pub fn with_loaded_interval<R>(&self, range: &GenomicRange, f: impl FnOnce(&LoadInterval) -> R) -> Option<R> {
        let range = self.inner.canonical_range(range);
        let state = self.inner.lock_state();
        state.cache.lookup(&range).map(f)
    }

    /// Ranges currently cached, oldest first
    pub fn loaded_ranges(&self) -> Vec<GenomicRange> {
        let state = self.inner.lock_state();
        state.cache.iter().map(|i| i.range().clone()).collect()
    }

    /// Deepest packed layout across cached intervals
    pub fn n_levels(&self) -> usize {
        let state = self.inner.lock_state();
        state
            .cache
            .iter()
            .filter_map(|i| i.packed_rows())
            .map(|rows| rows.n_levels())
            .max()
            .unwrap_or(0)
    }

    pub fn max_group_count(&self) -> usize {
        let state = self.inner.lock_state();
        state
            .cache
            .iter()
            .filter_map(|i| i.packed_rows())
            .map(|rows| rows.group_count())
            .max()
            .unwrap_or(0)
    }

    /// Sequence names, canonicalized through the alias table
    pub fn sequence_names(&self) -> Result<Vec<String>> {
        Ok(self
            .inner
            .source
            .sequence_names()?
            .into_iter()
            .map(|name| self.inner.canonical_name(&name))
            .collect())
    }

    pub fn is_paired_end(&self) -> bool {
        self.inner.source.is_paired_end()
    }

    pub fn has_index(&self) -> bool {
        self.inner.source.has_index()
    }

    pub fn is_ion_torrent(&self) -> bool {
        self.inner
            .source
            .platforms()
            .iter()
            .any(|p| p.eq_ignore_ascii_case("IONTORRENT"))
    }

    pub fn is_tenx(&self) -> bool {
        self.inner.source.is_tenx()
    }

    pub fn is_phased(&self) -> bool {
        self.inner.source.is_phased()
    }

    pub fn is_moleculo(&self) -> bool {
        self.inner.source.is_moleculo()
    }

    /// Cancel outstanding work, drop the cache and release the source
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.lock_state().clear();
        self.inner.source.close()
    }
}

impl Drop for LoadCoordinator {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Failed to close alignment source: {}", e);
        }
    }
}

impl State {
    fn clear(&mut self) {
        self.cache.clear();
        self.generation += 1;
        if let Some(current) = &self.in_flight {
            current.cancel.cancel();
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn source_name(&self, canonical: &str) -> String {
        self.source_names
            .get(canonical)
            .cloned()
            .unwrap_or_else(|| canonical.to_string())
    }

    fn canonical_name(&self, source_name: &str) -> String {
        self.canonical_names
            .get(source_name)
            .cloned()
            .unwrap_or_else(|| source_name.to_string())
    }

    /// `range` renamed to the canonical chromosome when it uses the source's
    /// spelling
    fn canonical_range(&self, range: &GenomicRange) -> GenomicRange {
        match self.canonical_names.get(range.chromosome()) {
            Some(canonical) => range.with_chromosome(canonical),
            None => range.clone(),
        }
    }

    /// Worker-side half of a load
    fn run_load(&self, task: LoadTask) {
        let LoadTask {
            viewport,
            range,
            request,
            mut splice,
            cancel,
            generation,
        } = task;

        let result = match cancel.check() {
            Ok(()) => self.source.fetch(&request, splice.as_mut(), &cancel),
            Err(e) => Err(e),
        };

        let mut state = self.lock_state();
        state.in_flight = None;

        let tile = match result {
            Ok(tile) => tile,
            Err(e) if e.is_cancelled() => {
                debug!("Load of {} cancelled", range);
                state.listeners.emit(LoadEvent::Cancelled { viewport, range });
                return;
            }
            Err(e) => {
                warn!("Error loading alignments for {}: {}", range, e);
                state.listeners.emit(LoadEvent::Failed {
                    viewport,
                    range,
                    message: e.to_string(),
                });
                return;
            }
        };

        if cancel.is_cancelled() || generation != state.generation {
            debug!("Discarding stale load of {}", range);
            state.listeners.emit(LoadEvent::Cancelled { viewport, range });
            return;
        }

        let tile = self.canonicalize(tile, range.chromosome());
        let alignment_count = tile.alignments.len();
        let interval = LoadInterval::new(range.clone(), tile, splice);
        if let Err(e) = interval.validate() {
            error!("Discarding load of {}: {}", range, e);
            state.listeners.emit(LoadEvent::Failed {
                viewport,
                range,
                message: e.to_string(),
            });
            return;
        }

        state.cache.add(interval);
        let packing = state.config.packing.clone();
        for cached in state.cache.iter_mut() {
            cached.repack(&packing);
        }
        info!("Loaded {} alignments for {}", alignment_count, range);
        state.listeners.emit(LoadEvent::Loaded {
            viewport,
            range,
            alignment_count,
        });
    }

    /// Rename source chromosome names to the canonical ones the view uses
    fn canonicalize(&self, mut tile: AlignmentTile, chromosome: &str) -> AlignmentTile {
        if self.canonical_names.is_empty() {
            return tile;
        }
        tile.counts.set_chromosome(chromosome);
        for alignment in &mut tile.alignments {
            alignment.chromosome = self.canonical_name(&alignment.chromosome);
            if let Some(mate) = alignment.mate.as_mut() {
                mate.chromosome = self.canonical_name(&mate.chromosome);
            }
        }
        tile
    }
}
