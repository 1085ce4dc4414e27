/// End-to-end behavior of the load coordinator against an in-memory source
///
/// Covers single-flight loading, window expansion, FIFO eviction, failure and
/// cancellation handling, and the repack/sort operations the view drives.
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use alncache::alignment::{Alignment, AlignmentBlock, Gap, GapKind, Strand};
use alncache::config::ViewerConfig;
use alncache::events::LoadEvent;
use alncache::pack::{GroupOption, PackedRows, PackingOptions};
use alncache::sort::SortOption;
use alncache::worker::{DeferredExecutor, InlineExecutor, ThreadExecutor};
use alncache::{LoadError, LoadStatus};
use pretty_assertions::assert_eq;

use mock_source::*;

fn names(rows: &PackedRows, group: &str) -> Vec<Vec<String>> {
    rows.get(group)
        .unwrap()
        .iter()
        .map(|row| {
            row.placements
                .iter()
                .flat_map(|p| p.alignments())
                .map(|a| a.read_name.clone())
                .collect()
        })
        .collect()
}

fn next_event(events: &Receiver<LoadEvent>) -> LoadEvent {
    events
        .recv_timeout(Duration::from_secs(10))
        .expect("no load event within timeout")
}

#[test]
fn test_capacity_one_keeps_latest_interval() {
    let source = Arc::new(MockSource::new(tiled_reads("chr1", 0, 20_000, 100)));
    let coord = coordinator(Arc::clone(&source), Arc::new(InlineExecutor));

    let a = viewport(0, "chr1", 100, 200);
    let b = viewport(0, "chr1", 15_000, 15_100);
    assert!(coord.get_packed_rows(&a).is_some());
    assert!(coord.get_packed_rows(&b).is_some());

    let loaded = coord.loaded_ranges();
    assert_eq!(loaded.len(), 1);
    assert!(loaded[0].contains(&b.range));
    assert!(coord.with_loaded_interval(&a.range, |_| ()).is_none());

    // A was evicted, so it has to be fetched again
    assert!(coord.get_packed_rows(&a).is_some());
    assert_eq!(source.fetch_count(), 3);
}

#[test]
fn test_expanded_window_serves_nearby_requests() {
    let source = Arc::new(MockSource::new(tiled_reads("chr2", 0, 5_000, 25)));
    let coord = coordinator(Arc::clone(&source), Arc::new(InlineExecutor));

    let status = coord.request_load(&viewport(0, "chr2", 1000, 1100), true).unwrap();
    assert_eq!(status, LoadStatus::Scheduled(range("chr2", 850, 1250)));
    assert_eq!(source.requested(), vec![range("chr2", 850, 1250)]);

    let nearby = viewport(0, "chr2", 900, 1200);
    assert_eq!(coord.request_load(&nearby, true).unwrap(), LoadStatus::Cached);
    assert!(coord.get_packed_rows(&nearby).is_some());
    assert_eq!(source.fetch_count(), 1);
}

#[test]
fn test_packed_rows_miss_loads_only_the_visible_range() {
    let source = Arc::new(MockSource::new(tiled_reads("chr2", 0, 5_000, 25)));
    let coord = coordinator(Arc::clone(&source), Arc::new(InlineExecutor));

    let view = viewport(0, "chr2", 1000, 1100);
    assert!(coord.get_packed_rows(&view).is_some());
    assert_eq!(source.requested(), vec![range("chr2", 1000, 1100)]);
    assert_eq!(coord.loaded_ranges(), vec![range("chr2", 1000, 1100)]);
}

#[test]
fn test_only_one_load_in_flight() {
    let source = Arc::new(MockSource::new(tiled_reads("chr1", 0, 5_000, 50)));
    let executor = Arc::new(DeferredExecutor::new());
    let coord = coordinator(Arc::clone(&source), executor.clone());
    let events = coord.subscribe();

    let first = viewport(1, "chr1", 100, 200);
    let second = viewport(2, "chr1", 3000, 3100);
    assert!(matches!(coord.request_load(&first, false).unwrap(), LoadStatus::Scheduled(_)));
    assert_eq!(coord.request_load(&second, false).unwrap(), LoadStatus::Busy);
    assert!(coord.get_packed_rows(&second).is_none());
    assert_eq!(executor.pending(), 1);

    executor.run_pending();
    assert_eq!(source.fetch_count(), 1);
    match next_event(&events) {
        LoadEvent::Loaded { viewport, alignment_count, .. } => {
            assert_eq!(viewport, first.id);
            assert!(alignment_count > 0);
        }
        other => panic!("unexpected event {other:?}"),
    }

    // the dropped request is retried by the view after the notification
    assert!(matches!(coord.request_load(&second, false).unwrap(), LoadStatus::Scheduled(_)));
    executor.run_pending();
    assert_eq!(source.fetch_count(), 2);
}

#[test]
fn test_whole_genome_is_rejected() {
    let source = Arc::new(MockSource::new(Vec::new()));
    let coord = coordinator(Arc::clone(&source), Arc::new(InlineExecutor));
    let all = viewport(0, "All", 0, 1_000_000);

    assert!(matches!(
        coord.request_load(&all, true),
        Err(LoadError::UnsupportedRange { .. })
    ));
    assert!(coord.get_packed_rows(&all).is_none());
    assert_eq!(source.fetch_count(), 0);
}

#[test]
fn test_failed_load_keeps_previous_cache() {
    let source = Arc::new(MockSource::new(tiled_reads("chr1", 0, 20_000, 100)));
    let coord = coordinator(Arc::clone(&source), Arc::new(InlineExecutor));
    let events = coord.subscribe();

    let good = viewport(0, "chr1", 100, 200);
    assert!(coord.get_packed_rows(&good).is_some());
    let before = coord.loaded_ranges();

    source.set_failing(true);
    assert!(coord.get_packed_rows(&viewport(0, "chr1", 15_000, 15_100)).is_none());

    assert_eq!(coord.loaded_ranges(), before);
    assert!(!coord.is_loading());
    assert!(matches!(next_event(&events), LoadEvent::Loaded { .. }));
    match next_event(&events) {
        LoadEvent::Failed { message, .. } => assert!(message.contains("mock source failure")),
        other => panic!("unexpected event {other:?}"),
    }

    // the failure is not sticky
    source.set_failing(false);
    assert!(coord.get_packed_rows(&viewport(0, "chr1", 15_000, 15_100)).is_some());
}

#[test]
fn test_cancel_during_fetch() {
    let (source, release) = MockSource::new(tiled_reads("chr1", 0, 5_000, 50)).gated();
    let source = Arc::new(source);
    let coord = coordinator(Arc::clone(&source), Arc::new(ThreadExecutor));
    let events = coord.subscribe();

    let view = viewport(7, "chr1", 100, 200);
    assert!(matches!(coord.request_load(&view, true).unwrap(), LoadStatus::Scheduled(_)));

    let deadline = Instant::now() + Duration::from_secs(10);
    while source.fetch_count() == 0 {
        assert!(Instant::now() < deadline, "fetch never started");
        thread::sleep(Duration::from_millis(5));
    }
    assert!(coord.is_loading());
    assert!(coord.cancel_load());
    release.send(()).unwrap();

    let event = next_event(&events);
    assert_eq!(event, LoadEvent::Cancelled { viewport: view.id, range: range("chr1", 0, 350) });
    assert!(coord.loaded_ranges().is_empty());
    assert!(!coord.is_loading());
    assert!(!coord.cancel_load());
}

#[test]
fn test_clear_discards_pending_result() {
    let source = Arc::new(MockSource::new(tiled_reads("chr1", 0, 5_000, 50)));
    let executor = Arc::new(DeferredExecutor::new());
    let coord = coordinator(Arc::clone(&source), executor.clone());

    coord.request_load(&viewport(0, "chr1", 100, 200), false).unwrap();
    coord.clear();
    executor.run_pending();

    assert!(coord.loaded_ranges().is_empty());
    assert!(!coord.is_loading());
}

#[test]
fn test_repack_is_idempotent() {
    let source = Arc::new(MockSource::new(tiled_reads("chr1", 0, 2_000, 10)));
    let coord = coordinator(Arc::clone(&source), Arc::new(InlineExecutor));
    let view = viewport(0, "chr1", 500, 600);

    let first = coord.get_packed_rows(&view).unwrap();
    let second = coord.get_packed_rows(&view).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    coord.repack(coord.config().packing);
    let third = coord.get_packed_rows(&view).unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(*first, *third);
}

#[test]
fn test_group_by_strand() {
    let source = Arc::new(MockSource::new(tiled_reads("chr1", 0, 2_000, 10)));
    let coord = coordinator(Arc::clone(&source), Arc::new(InlineExecutor));
    let view = viewport(0, "chr1", 500, 600);
    coord.get_packed_rows(&view).unwrap();
    assert_eq!(coord.max_group_count(), 1);

    coord.repack(PackingOptions {
        group_by: GroupOption::Strand,
        ..PackingOptions::default()
    });
    let rows = coord.get_packed_rows(&view).unwrap();
    let keys: Vec<&str> = rows.groups().keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["-", "+"]);
    assert_eq!(coord.max_group_count(), 2);
    assert_eq!(coord.n_levels(), rows.n_levels());
}

#[test]
fn test_view_as_pairs_merges_mates() {
    let reads = vec![
        Alignment::new("frag", "chr1", 100, 150)
            .with_flags(Alignment::FLAG_PAIRED | Alignment::FLAG_FIRST_IN_PAIR)
            .with_mate("chr1", 300, Strand::Reverse, 250),
        Alignment::new("other", "chr1", 200, 250),
        Alignment::new("frag", "chr1", 300, 350)
            .with_flags(Alignment::FLAG_PAIRED | Alignment::FLAG_SECOND_IN_PAIR | Alignment::FLAG_REVERSE)
            .with_mate("chr1", 100, Strand::Forward, -250),
    ];
    let source = Arc::new(MockSource::new(reads));
    let config = ViewerConfig {
        downsample: alncache::downsample::DownsampleOptions::disabled(),
        ..ViewerConfig::default()
    };
    let coord = coordinator_with_config(Arc::clone(&source), Arc::new(InlineExecutor), config);
    let view = viewport(0, "chr1", 100, 400);

    let rows = coord.get_packed_rows(&view).unwrap();
    assert_eq!(names(&rows, ""), vec![vec!["frag", "other", "frag"]]);

    assert!(coord.set_view_as_pairs(true));
    assert!(!coord.set_view_as_pairs(true));
    let rows = coord.get_packed_rows(&view).unwrap();
    assert_eq!(names(&rows, ""), vec![vec!["frag", "frag"], vec!["other"]]);
    assert_eq!(rows.get("").unwrap()[0].end(), 350);
}

#[test]
fn test_sort_rows_by_mapping_quality() {
    let reads = vec![
        Alignment::new("low", "chr1", 100, 150).with_mapping_quality(10),
        Alignment::new("high", "chr1", 100, 150).with_mapping_quality(50),
        Alignment::new("mid", "chr1", 100, 150).with_mapping_quality(30),
        Alignment::new("elsewhere", "chr1", 160, 200).with_mapping_quality(60),
    ];
    let source = Arc::new(MockSource::new(reads));
    let coord = coordinator(Arc::clone(&source), Arc::new(InlineExecutor));
    let view = viewport(0, "chr1", 100, 200);

    let before = coord.get_packed_rows(&view).unwrap();
    assert_eq!(
        names(&before, ""),
        vec![vec!["low", "elsewhere"], vec!["high"], vec!["mid"]]
    );

    assert!(coord.sort_rows(SortOption::MappingQuality, 120, None, &view.range));
    let after = coord.get_packed_rows(&view).unwrap();
    assert_eq!(
        names(&after, ""),
        vec![vec!["high"], vec!["mid"], vec!["low", "elsewhere"]]
    );
    // readers keep the layout they were handed
    assert_eq!(names(&before, "")[0], vec!["low", "elsewhere"]);

    assert!(!coord.sort_rows(SortOption::MappingQuality, 120, None, &range("chr2", 0, 10)));
}

#[test]
fn test_viewport_changes_resize_cache() {
    let source = Arc::new(MockSource::new(tiled_reads("chr1", 0, 20_000, 100)));
    let coord = coordinator(Arc::clone(&source), Arc::new(InlineExecutor));
    let left = viewport(0, "chr1", 100, 200);
    let right = viewport(1, "chr1", 15_000, 15_100);

    coord.on_viewports_changed(&[left.clone(), right.clone()]);
    coord.get_packed_rows(&left).unwrap();
    coord.get_packed_rows(&right).unwrap();
    assert_eq!(coord.loaded_ranges().len(), 2);

    // the surviving viewport keeps its interval even though it is the newer one
    coord.on_viewports_changed(&[left.clone()]);
    let loaded = coord.loaded_ranges();
    assert_eq!(loaded.len(), 1);
    assert!(loaded[0].contains(&left.range));
}

#[test]
fn test_hidden_alignments_still_count_coverage() {
    let source = Arc::new(MockSource::new(tiled_reads("chr1", 0, 2_000, 10)));
    let coord = coordinator(Arc::clone(&source), Arc::new(InlineExecutor));
    let view = viewport(0, "chr1", 500, 600);
    coord.get_packed_rows(&view).unwrap();

    coord.set_show_alignments(false);
    assert!(coord.loaded_ranges().is_empty());

    let rows = coord.get_packed_rows(&view).unwrap();
    assert_eq!(rows.placement_count(), 0);
    let (alignments, coverage) = coord
        .with_loaded_interval(&view.range, |interval| {
            (interval.alignments().len(), interval.counts().total_count(550))
        })
        .unwrap();
    assert_eq!(alignments, 0);
    assert_eq!(coverage, 5);
}

#[test]
fn test_min_junction_coverage_applies_to_cached_intervals() {
    fn spliced(name: &str, intron_start: u64, intron_end: u64) -> Alignment {
        let mut read = Alignment::new(name, "chr1", intron_start - 20, intron_end + 20);
        read.blocks = vec![
            AlignmentBlock { start: intron_start - 20, bases: vec![b'A'; 20], qualities: vec![30; 20] },
            AlignmentBlock { start: intron_end, bases: vec![b'C'; 20], qualities: vec![30; 20] },
        ];
        read.gaps = vec![Gap { start: intron_start, len: intron_end - intron_start, kind: GapKind::Skip }];
        read
    }

    let reads = vec![
        spliced("a", 200, 300),
        spliced("b", 200, 300),
        spliced("c", 400, 500),
    ];
    let source = Arc::new(MockSource::new(reads));
    let coord = coordinator(Arc::clone(&source), Arc::new(InlineExecutor));
    let view = viewport(0, "chr1", 150, 550);
    coord.get_packed_rows(&view).unwrap();

    let junctions = |coord: &alncache::LoadCoordinator| {
        coord
            .with_loaded_interval(&view.range, |iv| iv.splice_junctions())
            .unwrap()
    };
    assert_eq!(junctions(&coord).len(), 2);

    coord.set_min_junction_coverage(2);
    let kept = junctions(&coord);
    assert_eq!(kept.len(), 1);
    assert_eq!((kept[0].start, kept[0].end, kept[0].depth), (200, 300, 2));
}

#[test]
fn test_grouped_alignments_lookup() {
    let source = Arc::new(MockSource::new(tiled_reads("chr1", 0, 2_000, 10)));
    let coord = coordinator(Arc::clone(&source), Arc::new(InlineExecutor));
    let view = viewport(0, "chr1", 500, 600);
    coord.get_packed_rows(&view).unwrap();

    assert!(coord.grouped_alignments_containing(550, &view).is_some());
    assert!(coord.grouped_alignments_containing(1_900, &view).is_none());

    // a viewport with nothing loaded does not borrow another viewport's rows
    let elsewhere = viewport(1, "chr1", 1_500, 1_600);
    assert!(coord.grouped_alignments_containing(550, &elsewhere).is_none());
}

#[test]
fn test_source_properties_and_close() {
    let source = Arc::new(MockSource::new(Vec::new()).with_platforms(&["IONTORRENT"]));
    let coord = coordinator(Arc::clone(&source), Arc::new(InlineExecutor));
    assert!(coord.is_ion_torrent());
    assert!(!coord.is_paired_end());
    assert!(!coord.is_tenx());
    assert!(!coord.is_phased());
    assert!(!coord.is_moleculo());
    assert!(coord.has_index());
    assert_eq!(coord.sequence_names().unwrap(), vec!["chr1", "chr2"]);

    coord.close().unwrap();
    assert!(matches!(
        coord.request_load(&viewport(0, "chr1", 0, 10), false),
        Err(LoadError::SourceUnavailable { .. })
    ));
}

#[test]
fn test_read_tags_drive_capability_flags() {
    let reads = vec![
        Alignment::new("linked", "chr1", 100, 150).with_tag("BX", "ACGT-1"),
        Alignment::new("phased", "chr1", 200, 250).with_tag("HP", "2"),
    ];
    let source = Arc::new(MockSource::new(reads));
    let coord = coordinator(Arc::clone(&source), Arc::new(InlineExecutor));
    assert!(coord.is_tenx());
    assert!(coord.is_phased());
    assert!(!coord.is_ion_torrent());
}
