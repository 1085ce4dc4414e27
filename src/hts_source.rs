/// BAM/CRAM alignment source backed by rust-htslib
///
/// The header is read once at open. Each fetch opens its own IndexedReader,
/// so fetches from different workers never share an htslib handle.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};
use rust_htslib::bam::record::{Aux, Cigar};
use rust_htslib::bam::{self, Read};

use crate::alignment::{Alignment, AlignmentBlock, Gap, GapKind, MateInfo, Strand};
use crate::error::{LoadError, Result};
use crate::source::{
    AlignmentSource, AlignmentTile, CancelToken, FetchRequest, TileBuilder, HAPLOTYPE_TAG, TENX_BARCODE_TAG,
};
use crate::splice::SpliceJunctionCollector;

/// Reads inspected at open to decide whether the file is paired-end,
/// linked-read or phased
const SNIFF_RECORDS: usize = 1000;

/// Records decoded between cancellation checks
const CANCEL_CHECK_INTERVAL: usize = 1000;

#[derive(Debug, Clone, Default, PartialEq)]
struct ReadGroupInfo {
    sample: Option<String>,
    library: Option<String>,
    platform: Option<String>,
}

pub struct BamSource {
    path: PathBuf,
    sequence_names: Vec<String>,
    read_groups: HashMap<String, ReadGroupInfo>,
    paired_end: bool,
    tenx: bool,
    phased: bool,
    moleculo: bool,
    has_index: bool,
    closed: AtomicBool,
}

impl BamSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = bam::Reader::from_path(&path)?;

        let header = reader.header();
        let sequence_names = header
            .target_names()
            .iter()
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect::<Vec<_>>();
        let header_text = String::from_utf8_lossy(header.as_bytes()).into_owned();
        let read_groups = parse_read_groups(&header_text);
        let moleculo = header_text.to_ascii_lowercase().contains("moleculo");

        let (mut paired_end, mut tenx, mut phased) = (false, false, false);
        for result in reader.records().take(SNIFF_RECORDS) {
            let record = result?;
            paired_end |= record.is_paired();
            tenx |= record.aux(TENX_BARCODE_TAG.as_bytes()).is_ok();
            phased |= record.aux(HAPLOTYPE_TAG.as_bytes()).is_ok();
            if paired_end && tenx && phased {
                break;
            }
        }

        let has_index = bam::IndexedReader::from_path(&path).is_ok();
        info!(
            "Opened {} ({} sequences, paired={}, indexed={})",
            path.display(),
            sequence_names.len(),
            paired_end,
            has_index
        );

        Ok(BamSource {
            path,
            sequence_names,
            read_groups,
            paired_end,
            tenx,
            phased,
            moleculo,
            has_index,
            closed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode(&self, record: &bam::Record, chromosome: &str) -> Alignment {
        let read_name = String::from_utf8_lossy(record.qname()).into_owned();
        let start = record.pos().max(0) as u64;
        let seq = record.seq().as_bytes();
        let qual = record.qual();

        let mut blocks = Vec::new();
        let mut gaps = Vec::new();
        let mut insertions = Vec::new();
        let mut ref_pos = start;
        let mut query_pos = 0usize;

        for op in record.cigar().iter() {
            match op {
                Cigar::Match(len) | Cigar::Equal(len) | Cigar::Diff(len) => {
                    let len = *len as usize;
                    let end = (query_pos + len).min(seq.len());
                    let bases = if query_pos < end { seq[query_pos..end].to_vec() } else { Vec::new() };
                    let qualities = if query_pos < end && end <= qual.len() {
                        qual[query_pos..end].to_vec()
                    } else {
                        vec![0; bases.len()]
                    };
                    blocks.push(AlignmentBlock { start: ref_pos, bases, qualities });
                    ref_pos += len as u64;
                    query_pos += len;
                }
                Cigar::Ins(len) => {
                    insertions.push((ref_pos, *len));
                    query_pos += *len as usize;
                }
                Cigar::SoftClip(len) => query_pos += *len as usize,
                Cigar::Del(len) => {
                    gaps.push(Gap { start: ref_pos, len: *len as u64, kind: GapKind::Deletion });
                    ref_pos += *len as u64;
                }
                Cigar::RefSkip(len) => {
                    gaps.push(Gap { start: ref_pos, len: *len as u64, kind: GapKind::Skip });
                    ref_pos += *len as u64;
                }
                Cigar::HardClip(_) | Cigar::Pad(_) => {}
            }
        }

        let strand = if record.is_reverse() { Strand::Reverse } else { Strand::Forward };
        let mate = if record.is_paired() && !record.is_mate_unmapped() && record.mtid() >= 0 {
            self.sequence_names
                .get(record.mtid() as usize)
                .map(|name| MateInfo {
                    chromosome: name.clone(),
                    start: record.mpos().max(0) as u64,
                    strand: if record.is_mate_reverse() { Strand::Reverse } else { Strand::Forward },
                })
        } else {
            None
        };

        let mut tags = Vec::new();
        for (key, value) in record.aux_iter().flatten() {
            if let Some(value) = aux_to_string(&value) {
                tags.push((String::from_utf8_lossy(key).into_owned(), value));
            }
        }
        let read_group = tags.iter().find(|(k, _)| k == "RG").map(|(_, v)| v.clone());
        let group_info = read_group.as_ref().and_then(|rg| self.read_groups.get(rg));

        Alignment {
            read_name,
            chromosome: chromosome.to_string(),
            start,
            end: ref_pos.max(start + 1),
            strand,
            mapping_quality: record.mapq(),
            flags: record.flags(),
            mate,
            insert_size: record.insert_size(),
            blocks,
            gaps,
            insertions,
            sample: group_info.and_then(|g| g.sample.clone()),
            library: group_info.and_then(|g| g.library.clone()),
            read_group,
            tags,
        }
    }
}

impl AlignmentSource for BamSource {
    fn fetch(
        &self,
        request: &FetchRequest,
        splice: &mut dyn SpliceJunctionCollector,
        cancel: &CancelToken,
    ) -> Result<AlignmentTile> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LoadError::source_unavailable(format!(
                "{} has been closed",
                self.path.display()
            )));
        }
        if !self.has_index {
            return Err(LoadError::source_unavailable(format!(
                "{} has no index; random access is not possible",
                self.path.display()
            )));
        }

        let range = &request.range;
        let mut builder = TileBuilder::new(request, splice);
        if !self.sequence_names.iter().any(|n| n == range.chromosome()) {
            debug!("{} not present in {}", range.chromosome(), self.path.display());
            return Ok(builder.finish());
        }

        let mut reader = bam::IndexedReader::from_path(&self.path)?;
        reader.fetch((range.chromosome(), range.start() as i64, range.end() as i64))?;

        let mut record = bam::Record::new();
        let mut decoded = 0usize;
        while let Some(result) = reader.read(&mut record) {
            result?;
            decoded += 1;
            if decoded % CANCEL_CHECK_INTERVAL == 0 {
                cancel.check()?;
            }
            if record.is_unmapped() {
                continue;
            }
            builder.push(self.decode(&record, range.chromosome()));
        }
        cancel.check()?;

        debug!("Decoded {} records for {}", decoded, range);
        Ok(builder.finish())
    }

    fn sequence_names(&self) -> Result<Vec<String>> {
        Ok(self.sequence_names.clone())
    }

    fn is_paired_end(&self) -> bool {
        self.paired_end
    }

    fn has_index(&self) -> bool {
        self.has_index
    }

    fn is_tenx(&self) -> bool {
        self.tenx
    }

    fn is_phased(&self) -> bool {
        self.phased
    }

    fn is_moleculo(&self) -> bool {
        self.moleculo
    }

    fn platforms(&self) -> Vec<String> {
        let mut platforms: Vec<String> = self
            .read_groups
            .values()
            .filter_map(|g| g.platform.clone())
            .collect();
        platforms.sort();
        platforms.dedup();
        platforms
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Closed {}", self.path.display());
        }
        Ok(())
    }
}

fn parse_read_groups(header_text: &str) -> HashMap<String, ReadGroupInfo> {
    let mut groups = HashMap::new();
    for line in header_text.lines().filter(|l| l.starts_with("@RG")) {
        let mut id = None;
        let mut info = ReadGroupInfo::default();
        for field in line.split('\t').skip(1) {
            let Some((key, value)) = field.split_once(':') else {
                continue;
            };
            match key {
                "ID" => id = Some(value.to_string()),
                "SM" => info.sample = Some(value.to_string()),
                "LB" => info.library = Some(value.to_string()),
                "PL" => info.platform = Some(value.to_uppercase()),
                _ => {}
            }
        }
        if let Some(id) = id {
            groups.insert(id, info);
        }
    }
    groups
}

fn aux_to_string(aux: &Aux) -> Option<String> {
    let value = match aux {
        Aux::Char(c) => (*c as char).to_string(),
        Aux::I8(v) => v.to_string(),
        Aux::U8(v) => v.to_string(),
        Aux::I16(v) => v.to_string(),
        Aux::U16(v) => v.to_string(),
        Aux::I32(v) => v.to_string(),
        Aux::U32(v) => v.to_string(),
        Aux::Float(v) => v.to_string(),
        Aux::Double(v) => v.to_string(),
        Aux::String(s) | Aux::HexByteArray(s) => s.to_string(),
        _ => return None,
    };
    Some(value)
}
