/// Row sorting at a pivot position
///
/// Each row gets a score from the alignment covering the pivot, then rows are
/// stably re-sorted within their group, highest score first. Scores are
/// oriented so the natural reading order comes first: earliest start, highest
/// mapping quality, forward strand, rarer bases. Rows with nothing at the
/// pivot go last.
use std::collections::HashMap;

use ordered_float::OrderedFloat;

use crate::alignment::{Alignment, Strand};
use crate::counts::AlignmentCounts;
use crate::pack::{PackedRows, Row};

const NOT_COVERED: f64 = f64::NEG_INFINITY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOption {
    Nucleotide,
    Strand,
    Start,
    MappingQuality,
    Sample,
    ReadGroup,
    InsertSize,
    FirstOfPairStrand,
    MateChromosome,
    Tag,
    ReadName,
    AlignedLength,
}

impl SortOption {
    /// Parse a CLI name such as `mapq` or `insert-size`
    pub fn from_name(name: &str) -> Option<Self> {
        let option = match name.to_ascii_lowercase().replace('_', "-").as_str() {
            "base" | "nucleotide" => SortOption::Nucleotide,
            "strand" => SortOption::Strand,
            "start" | "position" => SortOption::Start,
            "mapq" | "quality" | "mapping-quality" => SortOption::MappingQuality,
            "sample" => SortOption::Sample,
            "read-group" => SortOption::ReadGroup,
            "insert-size" => SortOption::InsertSize,
            "first-of-pair-strand" => SortOption::FirstOfPairStrand,
            "mate-chromosome" => SortOption::MateChromosome,
            "tag" => SortOption::Tag,
            "read-name" => SortOption::ReadName,
            "aligned-length" => SortOption::AlignedLength,
            _ => return None,
        };
        Some(option)
    }

    fn text_key(&self, alignment: &Alignment, tag: Option<&str>) -> Option<String> {
        match self {
            SortOption::Sample => alignment.sample.clone(),
            SortOption::ReadGroup => alignment.read_group.clone(),
            SortOption::MateChromosome => alignment.mate.as_ref().map(|m| m.chromosome.clone()),
            SortOption::ReadName => Some(alignment.read_name.clone()),
            SortOption::Tag => tag.and_then(|t| alignment.tag(t)).map(str::to_string),
            _ => None,
        }
    }

    fn is_textual(&self) -> bool {
        matches!(
            self,
            SortOption::Sample
                | SortOption::ReadGroup
                | SortOption::MateChromosome
                | SortOption::ReadName
                | SortOption::Tag
        )
    }
}

/// Ordering of textual keys, shared by every row of one sort pass
#[derive(Debug, Default)]
pub struct TextRanks {
    ranks: HashMap<String, usize>,
    numeric: bool,
}

impl TextRanks {
    fn collect(packed: &PackedRows, option: SortOption, pivot: u64, tag: Option<&str>) -> Self {
        let mut values: Vec<String> = packed
            .groups()
            .values()
            .flatten()
            .filter_map(|row| row.alignment_at(pivot))
            .filter_map(|a| option.text_key(a, tag))
            .collect();
        let numeric = option == SortOption::Tag
            && !values.is_empty()
            && values.iter().all(|v| v.parse::<f64>().is_ok());
        values.sort();
        values.dedup();
        let ranks = values.into_iter().enumerate().map(|(i, v)| (v, i)).collect();
        TextRanks { ranks, numeric }
    }

    fn score(&self, value: Option<&str>) -> f64 {
        match value {
            Some(v) if self.numeric => v.parse::<f64>().unwrap_or(f64::MIN),
            // ascending text order => descending score
            Some(v) => -(self.ranks.get(v).copied().unwrap_or(self.ranks.len()) as f64),
            None if self.numeric => f64::MIN,
            None => -(self.ranks.len() as f64) - 1.0,
        }
    }
}

impl Row {
    /// Recompute this row's sort score at `pivot`
    pub fn update_score(
        &mut self,
        option: SortOption,
        pivot: u64,
        counts: &AlignmentCounts,
        tag: Option<&str>,
        ranks: &TextRanks,
    ) {
        let score = match self.alignment_at(pivot) {
            None => NOT_COVERED,
            Some(alignment) => score_alignment(alignment, option, pivot, counts, tag, ranks),
        };
        self.score = OrderedFloat(score);
    }
}

fn score_alignment(
    alignment: &Alignment,
    option: SortOption,
    pivot: u64,
    counts: &AlignmentCounts,
    tag: Option<&str>,
    ranks: &TextRanks,
) -> f64 {
    match option {
        SortOption::Nucleotide => match alignment.base_at(pivot) {
            Some(base) => {
                // rarer alleles first, higher base quality breaks ties
                let quality = alignment.quality_at(pivot).unwrap_or(0) as f64 / 256.0;
                -(counts.count(pivot, base) as f64) + quality
            }
            None => -(counts.total_count(pivot) as f64) - 1.0,
        },
        SortOption::Strand => match alignment.strand {
            Strand::Forward => 1.0,
            Strand::Reverse => 0.0,
        },
        SortOption::FirstOfPairStrand => match alignment.first_of_pair_strand() {
            Some(Strand::Forward) => 1.0,
            Some(Strand::Reverse) => 0.0,
            None => -1.0,
        },
        SortOption::Start => -(alignment.start as f64),
        SortOption::MappingQuality => alignment.mapping_quality as f64,
        SortOption::InsertSize => alignment.insert_size.unsigned_abs() as f64,
        SortOption::AlignedLength => alignment.aligned_length() as f64,
        textual => ranks.score(textual.text_key(alignment, tag).as_deref()),
    }
}

/// Score and stably re-sort the rows of every group
pub fn sort_rows(
    packed: &mut PackedRows,
    option: SortOption,
    pivot: u64,
    tag: Option<&str>,
    counts: &AlignmentCounts,
) {
    let ranks = if option.is_textual() {
        TextRanks::collect(packed, option, pivot, tag)
    } else {
        TextRanks::default()
    };

    for rows in packed.groups_mut() {
        for row in rows.iter_mut() {
            row.update_score(option, pivot, counts, tag, &ranks);
        }
        rows.sort_by(|a, b| b.score.cmp(&a.score));
    }
}
