//! BAM alignment records.
//!
//! A record is kept as its encoded body (everything after the `block_size`
//! prefix) and fields are located through offsets computed from the fixed
//! core, so editing the auxiliary block never leaves a stale offset behind.
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0-3     4     refID (i32) - reference sequence ID
//! 4-7     4     pos (i32) - 0-based leftmost position
//! 8       1     l_read_name (u8) - length of read name + NUL
//! 9       1     mapq (u8) - mapping quality
//! 10-11   2     bin (u16) - BAM bin
//! 12-13   2     n_cigar_op (u16) - number of CIGAR operations
//! 14-15   2     flag (u16) - bitwise flags
//! 16-19   4     l_seq (u32) - length of sequence
//! 20-23   4     next_refID (i32) - mate reference sequence ID
//! 24-27   4     next_pos (i32) - mate 0-based position
//! 28-31   4     tlen (i32) - template length
//! 32+     var   read_name, cigar, seq, qual, auxiliary tags
//! ```

use std::io::Write;

use bytemuck::{Pod, Zeroable};

use super::{
    cigar::{self, Op},
    tags::{self, Tag, Tags},
};
use crate::{FixError, Result};

/// Size of the fixed-layout core of a record.
pub const CORE_SIZE: usize = std::mem::size_of::<RecordCore>();

/// Size of the `block_size` prefix preceding each record.
pub const BLOCK_SIZE_PREFIX: usize = 4;

/// Base codes of the 4-bit sequence encoding.
pub(crate) const BASES: &[u8; 16] = b"=ACMGRSVTWYHKDBN";

/// BAM flag bits.
pub mod flags {
    /// Read is paired in sequencing.
    pub const PAIRED: u16 = 0x1;
    /// Each segment properly aligned.
    pub const PROPER_PAIR: u16 = 0x2;
    /// Read is unmapped.
    pub const UNMAPPED: u16 = 0x4;
    /// Mate is unmapped.
    pub const MATE_UNMAPPED: u16 = 0x8;
    /// Read is reverse complemented.
    pub const REVERSE: u16 = 0x10;
    /// Mate is reverse complemented.
    pub const MATE_REVERSE: u16 = 0x20;
    /// First segment in template (R1).
    pub const FIRST_SEGMENT: u16 = 0x40;
    /// Last segment in template (R2).
    pub const LAST_SEGMENT: u16 = 0x80;
    /// Secondary alignment.
    pub const SECONDARY: u16 = 0x100;
    /// Not passing quality controls.
    pub const QC_FAIL: u16 = 0x200;
    /// PCR or optical duplicate.
    pub const DUPLICATE: u16 = 0x400;
    /// Supplementary alignment.
    pub const SUPPLEMENTARY: u16 = 0x800;
}

/// 32-byte fixed core, stored little endian.
#[derive(Copy, Clone, Pod, Zeroable, Debug, PartialEq, Eq)]
#[repr(C)]
pub(crate) struct RecordCore {
    pub ref_id: i32,
    pub pos: i32,
    pub l_read_name: u8,
    pub mapq: u8,
    pub bin: u16,
    pub n_cigar_op: u16,
    pub flag: u16,
    pub l_seq: u32,
    pub next_ref_id: i32,
    pub next_pos: i32,
    pub tlen: i32,
}
impl RecordCore {
    /// Byte length of the read name, CIGAR, sequence, and qualities.
    fn variable_len(&self) -> usize {
        let l_seq = u32::from_le(self.l_seq) as usize;
        self.l_read_name as usize
            + u16::from_le(self.n_cigar_op) as usize * 4
            + l_seq.div_ceil(2)
            + l_seq
    }
}

/// Location of one auxiliary tag entry within a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagSpan {
    offset: usize,
    len: usize,
}
impl TagSpan {
    /// Offset of the entry from the start of the record body.
    pub fn offset(&self) -> usize {
        self.offset
    }
    /// Encoded length of the entry (identifier, type, and value).
    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// One BAM alignment record, owning its encoded bytes.
///
/// `Record::default()` is a zeroed core meant only as a reusable buffer for
/// [`crate::Reader::read_record`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    data: Vec<u8>,
}
impl Default for Record {
    fn default() -> Self {
        Self {
            data: vec![0; CORE_SIZE],
        }
    }
}
impl Record {
    /// Wraps an encoded record body (without the `block_size` prefix).
    ///
    /// `pos` is only used to locate the record in error messages.
    pub fn from_body(data: Vec<u8>, pos: usize) -> Result<Self> {
        let record = Self { data };
        record.validate(pos)?;
        Ok(record)
    }

    /// Wraps a body that is known to be well formed.
    pub(crate) fn from_raw(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Decode the record starting at `cursor`, returning it with the
    /// position of the next record.
    ///
    /// # Errors
    ///
    /// - [`FixError::TruncatedRecord`] if fewer bytes remain than the size
    ///   prefix or the declared block size.
    /// - [`FixError::InvalidRecord`] if the sub-field lengths do not exactly
    ///   fill the declared block size.
    pub fn decode_one(bytes: &[u8], cursor: usize) -> Result<(Self, usize)> {
        let remaining = bytes.get(cursor..).unwrap_or_default();
        if remaining.len() < BLOCK_SIZE_PREFIX {
            return Err(FixError::TruncatedRecord {
                pos: cursor,
                expected: BLOCK_SIZE_PREFIX,
                available: remaining.len(),
            });
        }
        let block_size =
            u32::from_le_bytes([remaining[0], remaining[1], remaining[2], remaining[3]]) as usize;
        let total = BLOCK_SIZE_PREFIX + block_size;
        if remaining.len() < total {
            return Err(FixError::TruncatedRecord {
                pos: cursor,
                expected: total,
                available: remaining.len(),
            });
        }
        let record = Self::from_body(remaining[BLOCK_SIZE_PREFIX..total].to_vec(), cursor)?;
        Ok((record, cursor + total))
    }

    /// Encode the record including its `block_size` prefix.
    pub fn encode_one(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_len());
        bytes.extend_from_slice(&self.block_size().to_le_bytes());
        bytes.extend_from_slice(&self.data);
        bytes
    }

    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.block_size().to_le_bytes())?;
        writer.write_all(&self.data)
    }

    /// Declared size of the record body.
    pub fn block_size(&self) -> u32 {
        self.data.len() as u32
    }

    /// Total encoded size including the `block_size` prefix.
    pub fn encoded_len(&self) -> usize {
        BLOCK_SIZE_PREFIX + self.data.len()
    }

    /// The encoded record body.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn body_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    /// Checks that the sub-field lengths exactly fill the record body.
    pub(crate) fn validate(&self, pos: usize) -> Result<()> {
        if self.data.len() < CORE_SIZE {
            return Err(FixError::invalid_record(
                pos,
                format!(
                    "block size {} is smaller than the {CORE_SIZE} byte fixed fields",
                    self.data.len()
                ),
            ));
        }
        let core = self.core();
        if core.l_read_name == 0 {
            return Err(FixError::invalid_record(pos, "read name length is zero"));
        }
        let aux_offset = CORE_SIZE + core.variable_len();
        if aux_offset > self.data.len() {
            return Err(FixError::invalid_record(
                pos,
                format!(
                    "read name, CIGAR, sequence, and qualities need {aux_offset} bytes but block size is {}",
                    self.data.len()
                ),
            ));
        }
        tags::validate(&self.data[aux_offset..]).map_err(|reason| FixError::invalid_record(pos, reason))
    }

    fn core(&self) -> RecordCore {
        bytemuck::pod_read_unaligned(&self.data[..CORE_SIZE])
    }

    pub fn ref_id(&self) -> i32 {
        i32::from_le(self.core().ref_id)
    }
    pub fn pos(&self) -> i32 {
        i32::from_le(self.core().pos)
    }
    pub fn mapq(&self) -> u8 {
        self.core().mapq
    }
    pub fn bin(&self) -> u16 {
        u16::from_le(self.core().bin)
    }
    pub fn flags(&self) -> u16 {
        u16::from_le(self.core().flag)
    }
    pub fn n_cigar_op(&self) -> usize {
        u16::from_le(self.core().n_cigar_op) as usize
    }
    pub fn l_seq(&self) -> usize {
        u32::from_le(self.core().l_seq) as usize
    }
    pub fn next_ref_id(&self) -> i32 {
        i32::from_le(self.core().next_ref_id)
    }
    pub fn next_pos(&self) -> i32 {
        i32::from_le(self.core().next_pos)
    }
    pub fn template_len(&self) -> i32 {
        i32::from_le(self.core().tlen)
    }

    pub fn is_mate_unmapped(&self) -> bool {
        self.flags() & flags::MATE_UNMAPPED != 0
    }

    fn name_offset(&self) -> usize {
        CORE_SIZE
    }
    fn cigar_offset(&self) -> usize {
        self.name_offset() + self.core().l_read_name as usize
    }
    fn seq_offset(&self) -> usize {
        self.cigar_offset() + self.n_cigar_op() * 4
    }
    fn qual_offset(&self) -> usize {
        self.seq_offset() + self.l_seq().div_ceil(2)
    }
    fn aux_offset(&self) -> usize {
        self.qual_offset() + self.l_seq()
    }

    /// Read name without its NUL terminator.
    pub fn read_name(&self) -> &[u8] {
        let name = &self.data[self.name_offset()..self.cigar_offset()];
        name.strip_suffix(&[0]).unwrap_or(name)
    }

    /// CIGAR operations. Unknown operation codes are skipped.
    pub fn cigar(&self) -> impl Iterator<Item = Op> + '_ {
        self.data[self.cigar_offset()..self.seq_offset()]
            .chunks_exact(4)
            .filter_map(|b| Op::decode(u32::from_le_bytes([b[0], b[1], b[2], b[3]])))
    }

    pub fn cigar_string(&self) -> String {
        cigar::to_string(&self.cigar().collect::<Vec<_>>())
    }

    /// Decoded bases as ASCII.
    pub fn sequence(&self) -> Vec<u8> {
        let packed = &self.data[self.seq_offset()..self.qual_offset()];
        (0..self.l_seq())
            .map(|i| {
                let byte = packed[i / 2];
                let code = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
                BASES[code as usize]
            })
            .collect()
    }

    /// Raw Phred quality scores (0xff when absent).
    pub fn quality_scores(&self) -> &[u8] {
        &self.data[self.qual_offset()..self.aux_offset()]
    }

    /// The auxiliary tag block.
    pub fn aux_data(&self) -> &[u8] {
        &self.data[self.aux_offset()..]
    }

    pub fn tags(&self) -> Tags<'_> {
        Tags::new(self.aux_data())
    }

    /// First tag with identifier `id`.
    pub fn tag(&self, id: &[u8; 2]) -> Option<Tag<'_>> {
        self.tags().find(|tag| &tag.id == id)
    }

    /// Location of the first tag with identifier `id`.
    pub fn find_tag(&self, id: &[u8; 2]) -> Option<TagSpan> {
        let aux_offset = self.aux_offset();
        tags::find(&self.data[aux_offset..], id).map(|(offset, len)| TagSpan {
            offset: aux_offset + offset,
            len,
        })
    }

    /// Removes exactly the bytes of `span`, shrinking the declared block size
    /// by `span.len()`. Bytes after the entry only move.
    ///
    /// # Panics
    ///
    /// Panics if `span` lies outside this record's auxiliary block.
    pub fn delete_tag(&mut self, span: TagSpan) {
        assert!(
            span.offset >= self.aux_offset() && span.offset + span.len <= self.data.len(),
            "tag span {span:?} lies outside the auxiliary block"
        );
        self.data.drain(span.offset..span.offset + span.len);
    }

    /// Removes the first tag with identifier `id`, returning whether one was found.
    pub fn remove_tag(&mut self, id: &[u8; 2]) -> bool {
        match self.find_tag(id) {
            Some(span) => {
                self.delete_tag(span);
                true
            }
            None => false,
        }
    }
}
