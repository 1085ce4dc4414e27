/// Row packing: grouping alignments and assigning them to display rows
///
/// Within a group, placements are visited by ascending start (ties keep input
/// order) and each goes to the lowest-index row whose last placement ends at
/// or before its start. Rows therefore never hold overlapping placements.
use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use ordered_float::OrderedFloat;

use crate::alignment::Alignment;
use crate::range::GenomicRange;

/// Key used to split alignments into separately packed groups
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GroupOption {
    #[default]
    None,
    Strand,
    Sample,
    ReadGroup,
    Library,
    FirstOfPairStrand,
    MateChromosome,
    Tag(String),
    Supplementary,
    MappingQuality, // buckets of 10
}

impl GroupOption {
    /// Parse a CLI name; `tag` names the aux field for `tag` grouping
    pub fn from_name(name: &str, tag: Option<&str>) -> Option<Self> {
        let option = match name.to_ascii_lowercase().replace('_', "-").as_str() {
            "none" => GroupOption::None,
            "strand" => GroupOption::Strand,
            "sample" => GroupOption::Sample,
            "read-group" => GroupOption::ReadGroup,
            "library" => GroupOption::Library,
            "first-of-pair-strand" => GroupOption::FirstOfPairStrand,
            "mate-chromosome" => GroupOption::MateChromosome,
            "tag" => GroupOption::Tag(tag?.to_string()),
            "supplementary" => GroupOption::Supplementary,
            "mapq" | "mapping-quality" => GroupOption::MappingQuality,
            _ => return None,
        };
        Some(option)
    }

    /// Group key for one alignment; alignments without the attribute share ""
    pub fn group_key(&self, alignment: &Alignment) -> String {
        match self {
            GroupOption::None => String::new(),
            GroupOption::Strand => alignment.strand.as_char().to_string(),
            GroupOption::Sample => alignment.sample.clone().unwrap_or_default(),
            GroupOption::ReadGroup => alignment.read_group.clone().unwrap_or_default(),
            GroupOption::Library => alignment.library.clone().unwrap_or_default(),
            GroupOption::FirstOfPairStrand => alignment
                .first_of_pair_strand()
                .map(|s| s.as_char().to_string())
                .unwrap_or_default(),
            GroupOption::MateChromosome => alignment
                .mate
                .as_ref()
                .map(|m| m.chromosome.clone())
                .unwrap_or_default(),
            GroupOption::Tag(tag) => alignment.tag(tag).unwrap_or_default().to_string(),
            GroupOption::Supplementary => {
                if alignment.is_supplementary() {
                    "SUPPLEMENTARY".to_string()
                } else {
                    String::new()
                }
            }
            GroupOption::MappingQuality => {
                let lo = alignment.mapping_quality / 10 * 10;
                format!("MAPQ {}-{}", lo, lo.saturating_add(9))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackingOptions {
    pub group_by: GroupOption,
    pub view_pairs: bool,
    pub max_levels: usize, // rows per group; extra placements are counted, not placed
}

impl Default for PackingOptions {
    fn default() -> Self {
        PackingOptions {
            group_by: GroupOption::None,
            view_pairs: false,
            max_levels: 10_000,
        }
    }
}

/// One visual unit on a row: a read, or both mates of a pair
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub alignment: Arc<Alignment>,
    pub mate: Option<Arc<Alignment>>,
    pub start: u64,
    pub end: u64,
}

impl Placement {
    fn single(alignment: Arc<Alignment>) -> Self {
        Placement {
            start: alignment.start,
            end: alignment.end,
            alignment,
            mate: None,
        }
    }

    fn add_mate(&mut self, mate: Arc<Alignment>) {
        self.start = self.start.min(mate.start);
        self.end = self.end.max(mate.end);
        self.mate = Some(mate);
    }

    pub fn alignments(&self) -> impl Iterator<Item = &Arc<Alignment>> {
        std::iter::once(&self.alignment).chain(self.mate.iter())
    }

    /// The read (of this unit) covering `pos`, if any
    pub fn alignment_at(&self, pos: u64) -> Option<&Arc<Alignment>> {
        self.alignments().find(|a| a.start <= pos && pos < a.end)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub placements: Vec<Placement>,
    pub score: OrderedFloat<f64>,
    end: u64,
}

impl Row {
    fn new(first: Placement) -> Self {
        Row {
            end: first.end,
            placements: vec![first],
            score: OrderedFloat(0.0),
        }
    }

    pub fn start(&self) -> u64 {
        self.placements.first().map(|p| p.start).unwrap_or(0)
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn placement_at(&self, pos: u64) -> Option<&Placement> {
        self.placements.iter().find(|p| p.start <= pos && pos < p.end)
    }

    /// Alignment covering `pos` in this row (mates included)
    pub fn alignment_at(&self, pos: u64) -> Option<&Arc<Alignment>> {
        self.placements.iter().find_map(|p| p.alignment_at(pos))
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}

/// Group key to ordered rows, in first-seen group order
#[derive(Debug, Clone, PartialEq)]
pub struct PackedRows {
    range: GenomicRange,
    groups: IndexMap<String, Vec<Row>>,
    overflow: usize,
}

impl PackedRows {
    pub fn range(&self) -> &GenomicRange {
        &self.range
    }

    pub fn contains(&self, chromosome: &str, start: u64, end: u64) -> bool {
        self.range.contains_coords(chromosome, start, end)
    }

    pub fn groups(&self) -> &IndexMap<String, Vec<Row>> {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> impl Iterator<Item = &mut Vec<Row>> {
        self.groups.values_mut()
    }

    pub fn get(&self, key: &str) -> Option<&Vec<Row>> {
        self.groups.get(key)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Total rows across all groups
    pub fn n_levels(&self) -> usize {
        self.groups.values().map(|rows| rows.len()).sum()
    }

    /// Placements dropped because their group hit `max_levels`
    pub fn overflow(&self) -> usize {
        self.overflow
    }

    pub fn placement_count(&self) -> usize {
        self.groups.values().flatten().map(|r| r.len()).sum()
    }
}

fn pairable(alignment: &Alignment) -> bool {
    alignment.is_paired()
        && alignment.mate_on_same_chromosome()
        && !alignment.is_secondary()
        && !alignment.is_supplementary()
}

fn build_placements(members: &[&Arc<Alignment>], view_pairs: bool) -> Vec<Placement> {
    let mut placements: Vec<Placement> = Vec::with_capacity(members.len());
    let mut waiting_for_mate: HashMap<&str, usize> = HashMap::new();

    for &alignment in members {
        if view_pairs && pairable(alignment) {
            if let Some(idx) = waiting_for_mate.remove(alignment.read_name.as_str()) {
                placements[idx].add_mate(Arc::clone(alignment));
                continue;
            }
            waiting_for_mate.insert(alignment.read_name.as_str(), placements.len());
        }
        placements.push(Placement::single(Arc::clone(alignment)));
    }
    placements
}

/// Pack alignments of `range` into grouped rows
pub fn pack(range: &GenomicRange, alignments: &[Arc<Alignment>], options: &PackingOptions) -> PackedRows {
    let mut members: IndexMap<String, Vec<&Arc<Alignment>>> = IndexMap::new();
    for alignment in alignments {
        members
            .entry(options.group_by.group_key(alignment))
            .or_default()
            .push(alignment);
    }

    let mut groups = IndexMap::with_capacity(members.len());
    let mut overflow = 0;
    for (key, group_members) in members {
        let mut placements = build_placements(&group_members, options.view_pairs);
        // stable: equal starts keep input order
        placements.sort_by_key(|p| p.start);

        let mut rows: Vec<Row> = Vec::new();
        for placement in placements {
            match rows.iter().position(|row| row.end <= placement.start) {
                Some(i) => {
                    let row = &mut rows[i];
                    row.end = placement.end;
                    row.placements.push(placement);
                }
                None if rows.len() < options.max_levels => rows.push(Row::new(placement)),
                None => overflow += 1,
            }
        }
        groups.insert(key, rows);
    }

    PackedRows {
        range: range.clone(),
        groups,
        overflow,
    }
}
