use std::io::{self, BufWriter, Write};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use alncache::aliases::ChromosomeAliases;
use alncache::config::ViewerConfig;
use alncache::downsample::DownsampleOptions;
use alncache::events::LoadEvent;
use alncache::hts_source::BamSource;
use alncache::pack::{GroupOption, PackedRows, PackingOptions};
use alncache::sort::SortOption;
use alncache::worker::PoolExecutor;
use alncache::{GenomicRange, LoadCoordinator, LoadStatus, Viewport, ViewportId};

/// Parse a number that may have metric suffix (k/K=1000, m/M=1e6)
fn parse_metric_number(s: &str) -> Result<u64, String> {
    if s.is_empty() {
        return Err("Empty string".to_string());
    }

    let (num_part, multiplier) = match s.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => {
            let multiplier = match c {
                'k' | 'K' => 1000.0,
                'm' | 'M' => 1_000_000.0,
                _ => return Err(format!("Unknown suffix '{c}'. Use k/K (1000) or m/M (1e6)")),
            };
            (&s[..idx], multiplier)
        }
        _ => (s, 1.0),
    };

    let base: f64 = num_part
        .parse()
        .map_err(|e| format!("Invalid number: {e}"))?;
    let result = base * multiplier;
    if result < 0.0 || result > u64::MAX as f64 {
        return Err(format!("Value {result} out of range"));
    }
    Ok(result as u64)
}

/// alncache - load, pack and sort BAM alignments the way a genome browser track does
///
/// Each region is loaded through the interval cache, packed into rows and
/// printed one row per line.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Indexed BAM file
    #[clap(value_name = "BAM")]
    bam: String,

    /// Region(s) to load, 1-based inclusive (chr1:1,001-2,000)
    #[clap(short = 'r', long = "region", required = true)]
    regions: Vec<String>,

    /// Expand each load window around the request
    #[clap(short = 'e', long = "expand")]
    expand: bool,

    /// Group rows by: none, strand, sample, read-group, library,
    /// first-of-pair-strand, mate-chromosome, tag, supplementary, mapq
    #[clap(short = 'g', long = "group-by", default_value = "none")]
    group_by: String,

    /// Aux tag used by `--group-by tag` and `--sort tag`
    #[clap(long = "tag")]
    tag: Option<String>,

    /// Sort rows at the pivot: base, strand, start, mapq, sample, read-group,
    /// insert-size, first-of-pair-strand, mate-chromosome, tag, read-name, aligned-length
    #[clap(short = 's', long = "sort")]
    sort: Option<String>,

    /// 1-based sort position (defaults to the region center)
    #[clap(short = 'p', long = "pivot")]
    pivot: Option<u64>,

    /// Draw mates of a pair on one row
    #[clap(long = "view-pairs")]
    view_pairs: bool,

    /// Keep every read instead of sampling dense windows
    #[clap(long = "no-downsample")]
    no_downsample: bool,

    /// Downsampling window width
    #[clap(long = "sampling-window", default_value = "50", value_parser = parse_metric_number)]
    sampling_window: u64,

    /// Reads kept per downsampling window
    #[clap(long = "sampling-count", default_value = "100")]
    sampling_count: usize,

    /// Widest range, in kb, for which alignments are loaded
    #[clap(long = "max-visible-kb", default_value = "30")]
    max_visible_kb: f64,

    /// Minimum supporting reads for a splice junction
    #[clap(long = "min-junction-coverage", default_value = "1")]
    min_junction_coverage: u32,

    /// Also print splice junctions
    #[clap(long = "junctions")]
    junctions: bool,

    /// Tab-separated chromosome alias file (canonical name first)
    #[clap(long = "aliases")]
    aliases: Option<String>,

    /// Quiet mode (warnings and errors only)
    #[clap(long = "quiet")]
    quiet: bool,

    /// Number of loader threads
    #[clap(short = 't', long = "threads", default_value = "2")]
    threads: usize,
}

fn viewer_config(args: &Args) -> Result<ViewerConfig> {
    let group_by = GroupOption::from_name(&args.group_by, args.tag.as_deref())
        .with_context(|| format!("invalid --group-by '{}' (tag grouping needs --tag)", args.group_by))?;

    let downsample = if args.no_downsample {
        DownsampleOptions::disabled()
    } else {
        DownsampleOptions {
            enabled: true,
            window_size: args.sampling_window.max(1),
            max_per_window: args.sampling_count,
        }
    };

    let mut config = ViewerConfig {
        max_visible_range_kb: args.max_visible_kb,
        downsample,
        packing: PackingOptions {
            group_by,
            view_pairs: args.view_pairs,
            ..PackingOptions::default()
        },
        ..ViewerConfig::default()
    };
    config.splice.min_junction_coverage = args.min_junction_coverage;
    Ok(config)
}

/// Block until the load for `viewport` settles
fn wait_for_load(events: &Receiver<LoadEvent>, viewport: ViewportId) -> Result<()> {
    loop {
        let event = events.recv().context("loader stopped without reporting")?;
        if event.viewport() != viewport {
            continue;
        }
        match event {
            LoadEvent::Loaded { range, alignment_count, .. } => {
                info!("{}: {} alignments cached", range, alignment_count);
                return Ok(());
            }
            LoadEvent::Failed { range, message, .. } => bail!("loading {range} failed: {message}"),
            LoadEvent::Cancelled { range, .. } => bail!("loading {range} was cancelled"),
        }
    }
}

fn write_rows<W: Write>(out: &mut W, viewport: &Viewport, rows: &PackedRows) -> io::Result<()> {
    writeln!(
        out,
        "# {}\tloaded {}\tlevels {}\toverflow {}",
        viewport.range,
        rows.range(),
        rows.n_levels(),
        rows.overflow()
    )?;
    for (group, group_rows) in rows.groups() {
        let label = if group.is_empty() { "." } else { group.as_str() };
        for (idx, row) in group_rows.iter().enumerate() {
            let names: Vec<&str> = row
                .placements
                .iter()
                .flat_map(|p| p.alignments())
                .map(|a| a.read_name.as_str())
                .collect();
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}",
                label,
                idx,
                row.start(),
                row.end(),
                names.join(",")
            )?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = viewer_config(&args)?;
    let sort = match &args.sort {
        Some(name) => Some(SortOption::from_name(name).with_context(|| format!("invalid --sort '{name}'"))?),
        None => None,
    };

    let aliases = match &args.aliases {
        Some(path) => ChromosomeAliases::from_path(path)?,
        None => ChromosomeAliases::new().with_default_ucsc(),
    };

    let viewports = args
        .regions
        .iter()
        .enumerate()
        .map(|(idx, region)| {
            let range = GenomicRange::parse(region)?;
            let canonical = aliases.canonical_name(range.chromosome());
            let range = GenomicRange::new(canonical, range.start(), range.end())?;
            Ok(Viewport::new(idx as u32, range))
        })
        .collect::<Result<Vec<_>>>()?;

    let source = Arc::new(BamSource::open(&args.bam).with_context(|| format!("opening {}", args.bam))?);
    let executor = Arc::new(PoolExecutor::new(args.threads.max(1))?);
    let coordinator = LoadCoordinator::new(source, executor, config, &aliases)?;
    let events = coordinator.subscribe();
    coordinator.on_viewports_changed(&viewports);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    for viewport in &viewports {
        match coordinator.request_load(viewport, args.expand)? {
            LoadStatus::Scheduled(range) => {
                info!("Loading {} for {}", range, viewport.range);
                wait_for_load(&events, viewport.id)?;
            }
            LoadStatus::Cached => info!("{} already cached", viewport.range),
            LoadStatus::Busy => bail!("loader busy while requesting {}", viewport.range),
        }

        if let Some(option) = sort {
            let pivot = args
                .pivot
                .map(|p| p.saturating_sub(1))
                .unwrap_or_else(|| viewport.range.center());
            coordinator.sort_rows(option, pivot, args.tag.as_deref(), &viewport.range);
        }

        let rows = coordinator
            .get_packed_rows(viewport)
            .with_context(|| format!("no rows cached for {}", viewport.range))?;
        write_rows(&mut out, viewport, &rows)?;

        if args.junctions {
            let junctions = coordinator
                .with_loaded_interval(&viewport.range, |interval| interval.splice_junctions())
                .unwrap_or_default();
            for junction in junctions {
                writeln!(
                    out,
                    "junction\t{}\t{}\t{}\t{}\t{}",
                    junction.chromosome,
                    junction.start,
                    junction.end,
                    junction.strand.as_char(),
                    junction.depth
                )?;
            }
        }
    }
    out.flush()?;

    coordinator.close()?;
    Ok(())
}
