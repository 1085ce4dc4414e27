/// Decoded alignment records as the cache and packer see them
///
/// Reads are already projected onto the reference: each aligned block carries
/// the read bases that sit on reference positions `start..start + len`.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn as_char(&self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }
}

/// Run of read bases aligned to consecutive reference positions
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentBlock {
    pub start: u64,        // reference start of the block
    pub bases: Vec<u8>,    // read bases, upper case
    pub qualities: Vec<u8>, // phred qualities, same length as bases
}

impl AlignmentBlock {
    pub fn end(&self) -> u64 {
        self.start + self.bases.len() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapKind {
    Deletion, // D
    Skip,     // N, spliced
}

/// Reference span not covered by read bases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub start: u64,
    pub len: u64,
    pub kind: GapKind,
}

/// Mate location for paired reads
#[derive(Debug, Clone, PartialEq)]
pub struct MateInfo {
    pub chromosome: String,
    pub start: u64,
    pub strand: Strand,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub read_name: String,
    pub chromosome: String,
    pub start: u64, // 0-based, inclusive
    pub end: u64,   // 0-based, exclusive
    pub strand: Strand,
    pub mapping_quality: u8,
    pub flags: u16, // SAM flag bits
    pub mate: Option<MateInfo>,
    pub insert_size: i64,
    pub blocks: Vec<AlignmentBlock>,
    pub gaps: Vec<Gap>,
    pub insertions: Vec<(u64, u32)>, // (reference position, inserted length)
    pub read_group: Option<String>,
    pub sample: Option<String>,
    pub library: Option<String>,
    pub tags: Vec<(String, String)>,
}

impl Alignment {
    pub const FLAG_PAIRED: u16 = 0x1;
    pub const FLAG_PROPER_PAIR: u16 = 0x2;
    pub const FLAG_REVERSE: u16 = 0x10;
    pub const FLAG_MATE_REVERSE: u16 = 0x20;
    pub const FLAG_FIRST_IN_PAIR: u16 = 0x40;
    pub const FLAG_SECOND_IN_PAIR: u16 = 0x80;
    pub const FLAG_SECONDARY: u16 = 0x100;
    pub const FLAG_QC_FAIL: u16 = 0x200;
    pub const FLAG_DUPLICATE: u16 = 0x400;
    pub const FLAG_SUPPLEMENTARY: u16 = 0x800;

    /// Alignment without read bases covering `start..end`
    pub fn new(
        read_name: impl Into<String>,
        chromosome: impl Into<String>,
        start: u64,
        end: u64,
    ) -> Self {
        Alignment {
            read_name: read_name.into(),
            chromosome: chromosome.into(),
            start,
            end,
            strand: Strand::Forward,
            mapping_quality: 60,
            flags: 0,
            mate: None,
            insert_size: 0,
            blocks: Vec::new(),
            gaps: Vec::new(),
            insertions: Vec::new(),
            read_group: None,
            sample: None,
            library: None,
            tags: Vec::new(),
        }
    }

    /// Replace the blocks with one gapless block starting at `start`
    pub fn with_sequence(mut self, bases: &[u8], qualities: &[u8]) -> Self {
        self.blocks = vec![AlignmentBlock {
            start: self.start,
            bases: bases.to_ascii_uppercase(),
            qualities: qualities.to_vec(),
        }];
        self.end = self.start + bases.len() as u64;
        self
    }

    pub fn with_strand(mut self, strand: Strand) -> Self {
        self.strand = strand;
        if strand == Strand::Reverse {
            self.flags |= Self::FLAG_REVERSE;
        } else {
            self.flags &= !Self::FLAG_REVERSE;
        }
        self
    }

    pub fn with_mapping_quality(mut self, mapq: u8) -> Self {
        self.mapping_quality = mapq;
        self
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self.strand = if flags & Self::FLAG_REVERSE != 0 {
            Strand::Reverse
        } else {
            Strand::Forward
        };
        self
    }

    pub fn with_mate(mut self, chromosome: impl Into<String>, start: u64, strand: Strand, insert_size: i64) -> Self {
        self.flags |= Self::FLAG_PAIRED;
        if strand == Strand::Reverse {
            self.flags |= Self::FLAG_MATE_REVERSE;
        }
        self.mate = Some(MateInfo {
            chromosome: chromosome.into(),
            start,
            strand,
        });
        self.insert_size = insert_size;
        self
    }

    pub fn with_read_group(mut self, read_group: impl Into<String>) -> Self {
        self.read_group = Some(read_group.into());
        self
    }

    pub fn with_sample(mut self, sample: impl Into<String>) -> Self {
        self.sample = Some(sample.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    pub fn is_paired(&self) -> bool {
        self.flags & Self::FLAG_PAIRED != 0
    }

    pub fn is_proper_pair(&self) -> bool {
        self.flags & Self::FLAG_PROPER_PAIR != 0
    }

    pub fn is_first_of_pair(&self) -> bool {
        self.flags & Self::FLAG_FIRST_IN_PAIR != 0
    }

    pub fn is_second_of_pair(&self) -> bool {
        self.flags & Self::FLAG_SECOND_IN_PAIR != 0
    }

    pub fn is_secondary(&self) -> bool {
        self.flags & Self::FLAG_SECONDARY != 0
    }

    pub fn is_supplementary(&self) -> bool {
        self.flags & Self::FLAG_SUPPLEMENTARY != 0
    }

    pub fn is_duplicate(&self) -> bool {
        self.flags & Self::FLAG_DUPLICATE != 0
    }

    pub fn is_vendor_failed(&self) -> bool {
        self.flags & Self::FLAG_QC_FAIL != 0
    }

    /// Strand of the first read in the pair, which for stranded libraries is
    /// the transcript strand
    pub fn first_of_pair_strand(&self) -> Option<Strand> {
        if !self.is_paired() {
            return Some(self.strand);
        }
        if self.is_first_of_pair() {
            Some(self.strand)
        } else {
            self.mate.as_ref().map(|m| m.strand)
        }
    }

    pub fn mate_on_same_chromosome(&self) -> bool {
        self.mate
            .as_ref()
            .map(|m| m.chromosome == self.chromosome)
            .unwrap_or(false)
    }

    /// Number of reference positions covered by read bases
    pub fn aligned_length(&self) -> u64 {
        self.blocks.iter().map(|b| b.bases.len() as u64).sum()
    }

    fn block_at(&self, pos: u64) -> Option<(&AlignmentBlock, usize)> {
        if pos < self.start || pos >= self.end {
            return None;
        }
        self.blocks
            .iter()
            .find(|b| b.start <= pos && pos < b.end())
            .map(|b| (b, (pos - b.start) as usize))
    }

    /// Read base aligned to reference position `pos`
    pub fn base_at(&self, pos: u64) -> Option<u8> {
        self.block_at(pos).map(|(b, offset)| b.bases[offset])
    }

    pub fn quality_at(&self, pos: u64) -> Option<u8> {
        self.block_at(pos)
            .and_then(|(b, offset)| b.qualities.get(offset).copied())
    }

    pub fn is_deleted_at(&self, pos: u64) -> bool {
        self.gaps
            .iter()
            .any(|g| g.kind == GapKind::Deletion && g.start <= pos && pos < g.start + g.len)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn overlaps(&self, other: &Alignment) -> bool {
        self.chromosome == other.chromosome && self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}:{}-{}\t{}\tMAPQ={}",
            self.read_name,
            self.chromosome,
            self.start,
            self.end,
            self.strand.as_char(),
            self.mapping_quality
        )
    }
}
