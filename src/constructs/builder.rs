use super::{
    cigar::{self, Op},
    record::{Record, BASES, CORE_SIZE},
    tags::TAG_PREFIX_SIZE,
};

/// Bin assigned to records without a mapped position.
const UNMAPPED_BIN: u16 = 4680;

/// Assembles encoded [`Record`]s field by field.
///
/// Unset fields take the values of an unmapped, unnamed record: reference and
/// mate positions are `-1`, mapping quality is 255, the name is `*`, and
/// qualities are absent (`0xff`).
///
/// # Examples
///
/// ```rust
/// use fix_mate_cigar::{flags, RecordBuilder};
///
/// let record = RecordBuilder::new()
///     .name("q1")
///     .flags(flags::PAIRED | flags::MATE_UNMAPPED)
///     .ref_id(0)
///     .pos(10)
///     .cigar("4M")
///     .sequence(b"ACGT")
///     .string_tag(b"MC", "4M")
///     .build();
///
/// assert!(record.is_mate_unmapped());
/// assert_eq!(record.tag(b"MC").and_then(|t| t.as_str()), Some("4M"));
/// ```
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    name: Vec<u8>,
    flags: u16,
    ref_id: i32,
    pos: i32,
    mapq: u8,
    cigar: Vec<Op>,
    sequence: Vec<u8>,
    qualities: Vec<u8>,
    next_ref_id: i32,
    next_pos: i32,
    template_len: i32,
    aux: Vec<u8>,
}
impl Default for RecordBuilder {
    fn default() -> Self {
        Self {
            name: b"*".to_vec(),
            flags: 0,
            ref_id: -1,
            pos: -1,
            mapq: 255,
            cigar: Vec::new(),
            sequence: Vec::new(),
            qualities: Vec::new(),
            next_ref_id: -1,
            next_pos: -1,
            template_len: 0,
            aux: Vec::new(),
        }
    }
}
impl RecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics if the name is empty or longer than 254 bytes.
    pub fn name(mut self, name: &str) -> Self {
        assert!(
            !name.is_empty() && name.len() < 255,
            "read name must be 1 to 254 bytes, got {}",
            name.len()
        );
        self.name = name.as_bytes().to_vec();
        self
    }
    pub fn flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }
    pub fn ref_id(mut self, ref_id: i32) -> Self {
        self.ref_id = ref_id;
        self
    }
    pub fn pos(mut self, pos: i32) -> Self {
        self.pos = pos;
        self
    }
    pub fn mapq(mut self, mapq: u8) -> Self {
        self.mapq = mapq;
        self
    }

    /// # Panics
    ///
    /// Panics if `cigar` is not a valid SAM CIGAR string.
    pub fn cigar(mut self, cigar: &str) -> Self {
        self.cigar =
            cigar::parse(cigar).unwrap_or_else(|| panic!("invalid CIGAR string {cigar:?}"));
        self
    }
    pub fn cigar_ops(mut self, ops: Vec<Op>) -> Self {
        self.cigar = ops;
        self
    }

    /// Bases as ASCII. Characters outside `=ACMGRSVTWYHKDBN` are stored as `N`.
    pub fn sequence(mut self, bases: &[u8]) -> Self {
        self.sequence = bases.to_vec();
        self
    }

    /// Raw Phred scores; must match the sequence length when set.
    pub fn qualities(mut self, qualities: &[u8]) -> Self {
        self.qualities = qualities.to_vec();
        self
    }
    pub fn mate(mut self, next_ref_id: i32, next_pos: i32) -> Self {
        self.next_ref_id = next_ref_id;
        self.next_pos = next_pos;
        self
    }
    pub fn template_len(mut self, template_len: i32) -> Self {
        self.template_len = template_len;
        self
    }

    /// Appends a `Z` tag.
    pub fn string_tag(self, id: &[u8; 2], value: &str) -> Self {
        let mut encoded = Vec::with_capacity(value.len() + 1);
        encoded.extend_from_slice(value.as_bytes());
        encoded.push(0);
        self.raw_tag(id, b'Z', &encoded)
    }

    /// Appends an `i` tag.
    pub fn int_tag(self, id: &[u8; 2], value: i32) -> Self {
        self.raw_tag(id, b'i', &value.to_le_bytes())
    }

    /// Appends a tag with an already encoded value. Duplicate identifiers
    /// are kept in order.
    pub fn raw_tag(mut self, id: &[u8; 2], val_type: u8, value: &[u8]) -> Self {
        self.aux.reserve(TAG_PREFIX_SIZE + value.len());
        self.aux.extend_from_slice(id);
        self.aux.push(val_type);
        self.aux.extend_from_slice(value);
        self
    }

    /// # Panics
    ///
    /// Panics if qualities were set with a length different from the sequence.
    pub fn build(self) -> Record {
        let l_seq = self.sequence.len();
        assert!(
            self.qualities.is_empty() || self.qualities.len() == l_seq,
            "{} qualities for {l_seq} bases",
            self.qualities.len()
        );

        let bin = if self.pos < 0 {
            UNMAPPED_BIN
        } else {
            let end = self.pos + cigar::reference_len(&self.cigar).max(1) as i32;
            reg2bin(self.pos, end)
        };

        let mut data = Vec::with_capacity(
            CORE_SIZE
                + self.name.len()
                + 1
                + self.cigar.len() * 4
                + l_seq.div_ceil(2)
                + l_seq
                + self.aux.len(),
        );
        data.extend_from_slice(&self.ref_id.to_le_bytes());
        data.extend_from_slice(&self.pos.to_le_bytes());
        data.push((self.name.len() + 1) as u8);
        data.push(self.mapq);
        data.extend_from_slice(&bin.to_le_bytes());
        data.extend_from_slice(&(self.cigar.len() as u16).to_le_bytes());
        data.extend_from_slice(&self.flags.to_le_bytes());
        data.extend_from_slice(&(l_seq as u32).to_le_bytes());
        data.extend_from_slice(&self.next_ref_id.to_le_bytes());
        data.extend_from_slice(&self.next_pos.to_le_bytes());
        data.extend_from_slice(&self.template_len.to_le_bytes());

        data.extend_from_slice(&self.name);
        data.push(0);
        for op in &self.cigar {
            data.extend_from_slice(&op.encode().to_le_bytes());
        }
        for pair in self.sequence.chunks(2) {
            let hi = base_code(pair[0]);
            let lo = pair.get(1).map_or(0, |&b| base_code(b));
            data.push((hi << 4) | lo);
        }
        if self.qualities.is_empty() {
            data.resize(data.len() + l_seq, 0xff);
        } else {
            data.extend_from_slice(&self.qualities);
        }
        data.extend_from_slice(&self.aux);

        Record::from_raw(data)
    }
}

fn base_code(base: u8) -> u8 {
    BASES
        .iter()
        .position(|&b| b == base.to_ascii_uppercase())
        .unwrap_or(15) as u8
}

/// Smallest bin fully containing the 0-based half-open interval `[beg, end)`.
fn reg2bin(beg: i32, end: i32) -> u16 {
    let end = end - 1;
    let bin = if beg >> 14 == end >> 14 {
        ((1 << 15) - 1) / 7 + (beg >> 14)
    } else if beg >> 17 == end >> 17 {
        ((1 << 12) - 1) / 7 + (beg >> 17)
    } else if beg >> 20 == end >> 20 {
        ((1 << 9) - 1) / 7 + (beg >> 20)
    } else if beg >> 23 == end >> 23 {
        ((1 << 6) - 1) / 7 + (beg >> 23)
    } else if beg >> 26 == end >> 26 {
        ((1 << 3) - 1) / 7 + (beg >> 26)
    } else {
        0
    };
    bin as u16
}
