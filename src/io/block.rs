//! BGZF block compression and decompression.
//!
//! A BGZF stream is a series of independent gzip members, each holding at
//! most 64 KiB of data:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (12 + XLEN bytes)                                     │
//! │  - Magic: 0x1f 0x8b, method 0x08 (deflate), flags 0x04       │
//! │  - MTIME, XFL, OS, XLEN                                      │
//! │  - Extra subfield "BC" + len(2) + BSIZE(2)                   │
//! │    where BSIZE = total_block_size - 1                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Compressed data (raw deflate)                                │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Footer: CRC32 (4 bytes), ISIZE (4 bytes)                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The stream ends with an empty block, [`BGZF_EOF`].

use std::io::{self, Read, Write};

use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};
use log::warn;

use crate::{io::ByteSource, FixError, Result};

/// Size of the standard BGZF block header (gzip header with a single `BC` subfield).
pub const BGZF_HEADER_SIZE: usize = 18;

/// Size of the BGZF block footer (CRC32 + ISIZE).
pub const BGZF_FOOTER_SIZE: usize = 8;

/// Largest uncompressed payload written into a single block.
pub const BGZF_MAX_BLOCK_SIZE: usize = 0xff00;

/// Largest total size of a compressed block (`BSIZE` is a u16 holding size - 1).
const BGZF_MAX_COMPRESSED_SIZE: usize = 0x10000;

/// Fixed part of the gzip header preceding the extra field.
const GZIP_FIXED_HEADER_SIZE: usize = 12;

/// BGZF EOF marker block (empty block signaling end of file).
pub const BGZF_EOF: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02, 0x00,
    0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Deflate compression level applied to each block.
///
/// Levels run from 0 (stored, no compression) to 9 (smallest output). The
/// level only affects the size of the output, never its decoded content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u32", into = "u32"))]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    pub const MIN: u32 = 0;
    pub const MAX: u32 = 9;

    /// Returns `None` when `level` is outside `0..=9`.
    pub fn new(level: u32) -> Option<Self> {
        if level <= Self::MAX {
            Some(Self(level as u8))
        } else {
            None
        }
    }

    pub fn get(self) -> u32 {
        u32::from(self.0)
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(6)
    }
}

impl TryFrom<u32> for CompressionLevel {
    type Error = String;

    fn try_from(level: u32) -> std::result::Result<Self, Self::Error> {
        Self::new(level).ok_or_else(|| {
            format!(
                "compression level {level} is outside {}..={}",
                Self::MIN,
                Self::MAX
            )
        })
    }
}

impl From<CompressionLevel> for u32 {
    fn from(level: CompressionLevel) -> Self {
        level.get()
    }
}

/// Offsets and sizes read from a block header.
struct BlockLayout {
    /// Offset of the deflate payload.
    data_start: usize,
    /// Total size of the block in bytes.
    block_size: usize,
}

/// Validates the gzip/BGZF header fields and locates the `BC` subfield.
///
/// `header` must hold at least the fixed 12 bytes plus `XLEN` bytes of extra field.
fn parse_block_header(header: &[u8], offset: u64) -> Result<BlockLayout> {
    if header.len() < GZIP_FIXED_HEADER_SIZE {
        return Err(FixError::corrupt_block(offset, "block shorter than gzip header"));
    }
    if header[0] != 0x1f || header[1] != 0x8b {
        return Err(FixError::corrupt_block(
            offset,
            format!(
                "invalid gzip magic: expected 0x1f 0x8b, got 0x{:02x} 0x{:02x}",
                header[0], header[1]
            ),
        ));
    }
    if header[2] != 0x08 {
        return Err(FixError::corrupt_block(
            offset,
            format!("invalid compression method: expected 0x08, got 0x{:02x}", header[2]),
        ));
    }
    if header[3] & 0x04 == 0 {
        return Err(FixError::corrupt_block(offset, "missing FEXTRA flag"));
    }

    let xlen = u16::from_le_bytes([header[10], header[11]]) as usize;
    let data_start = GZIP_FIXED_HEADER_SIZE + xlen;
    if header.len() < data_start {
        return Err(FixError::corrupt_block(offset, "truncated extra field"));
    }

    // Walk the extra subfields looking for BC
    let extra = &header[GZIP_FIXED_HEADER_SIZE..data_start];
    let mut p = 0;
    while p + 4 <= extra.len() {
        let slen = u16::from_le_bytes([extra[p + 2], extra[p + 3]]) as usize;
        if extra[p] == b'B' && extra[p + 1] == b'C' && slen == 2 && p + 6 <= extra.len() {
            let bsize = u16::from_le_bytes([extra[p + 4], extra[p + 5]]) as usize;
            let block_size = bsize + 1;
            if block_size < data_start + BGZF_FOOTER_SIZE {
                return Err(FixError::corrupt_block(
                    offset,
                    format!("block size {block_size} too small for its header and footer"),
                ));
            }
            return Ok(BlockLayout {
                data_start,
                block_size,
            });
        }
        p += 4 + slen;
    }
    Err(FixError::corrupt_block(offset, "missing BC subfield"))
}

/// Decompresses a complete BGZF block, returning its payload.
///
/// # Errors
///
/// Returns [`FixError::CorruptBlock`] if the framing, deflate stream, ISIZE,
/// or CRC32 is inconsistent.
///
/// # Examples
///
/// ```rust
/// use fix_mate_cigar::{decode_block, encode_block, CompressionLevel};
///
/// # fn main() -> fix_mate_cigar::Result<()> {
/// let block = encode_block(b"ACGT", CompressionLevel::default())?;
/// assert_eq!(decode_block(&block)?, b"ACGT");
/// # Ok(())
/// # }
/// ```
pub fn decode_block(block: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    decode_block_into(block, &mut output, 0)?;
    Ok(output)
}

/// Decompresses a complete BGZF block into `output`, replacing its contents.
///
/// `offset` is the block's position in the compressed stream, used for error reporting.
pub(crate) fn decode_block_into(block: &[u8], output: &mut Vec<u8>, offset: u64) -> Result<()> {
    output.clear();

    let layout = parse_block_header(block, offset)?;
    if layout.block_size != block.len() {
        return Err(FixError::corrupt_block(
            offset,
            format!(
                "BSIZE announces {} bytes but block holds {}",
                layout.block_size,
                block.len()
            ),
        ));
    }

    let footer = &block[block.len() - BGZF_FOOTER_SIZE..];
    let expected_crc = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let isize = u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]) as usize;
    if isize > BGZF_MAX_COMPRESSED_SIZE {
        return Err(FixError::corrupt_block(
            offset,
            format!("ISIZE {isize} exceeds the 64 KiB block limit"),
        ));
    }

    let compressed = &block[layout.data_start..block.len() - BGZF_FOOTER_SIZE];
    output.reserve(isize);
    // Read one byte past ISIZE so an oversized payload is caught without inflating it all
    DeflateDecoder::new(compressed)
        .take(isize as u64 + 1)
        .read_to_end(output)
        .map_err(|e| FixError::corrupt_block(offset, format!("decompression failed: {e}")))?;

    if output.len() != isize {
        return Err(FixError::corrupt_block(
            offset,
            format!("ISIZE is {isize} but block inflated to {} bytes", output.len()),
        ));
    }

    let actual_crc = crc32fast::hash(output);
    if actual_crc != expected_crc {
        return Err(FixError::corrupt_block(
            offset,
            format!("CRC32 mismatch: expected 0x{expected_crc:08x}, got 0x{actual_crc:08x}"),
        ));
    }

    Ok(())
}

/// Compresses `data` into a single BGZF block.
///
/// Level 0 produces a stored (uncompressed) deflate payload. If a compressed
/// block would overflow the 64 KiB `BSIZE` limit it is re-encoded stored.
///
/// # Errors
///
/// Returns an `InvalidInput` error if `data` is longer than [`BGZF_MAX_BLOCK_SIZE`].
pub fn encode_block(data: &[u8], level: CompressionLevel) -> io::Result<Vec<u8>> {
    if data.len() > BGZF_MAX_BLOCK_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "block payload of {} bytes exceeds {BGZF_MAX_BLOCK_SIZE}",
                data.len()
            ),
        ));
    }

    let block = build_block(data, level.get())?;
    if block.len() > BGZF_MAX_COMPRESSED_SIZE {
        return build_block(data, 0);
    }
    Ok(block)
}

fn build_block(data: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut block = Vec::with_capacity(BGZF_HEADER_SIZE + data.len() + BGZF_FOOTER_SIZE);

    // gzip header with the BC subfield; BSIZE is patched below
    block.extend_from_slice(&[
        0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, b'B', b'C', 0x02,
        0x00, 0x00, 0x00,
    ]);

    let mut encoder = DeflateEncoder::new(block, Compression::new(level));
    encoder.write_all(data)?;
    let mut block = encoder.finish()?;

    block.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
    block.extend_from_slice(&(data.len() as u32).to_le_bytes());

    let bsize = (block.len() - 1) as u16;
    block[16..18].copy_from_slice(&bsize.to_le_bytes());
    Ok(block)
}

/// Fills `buf` from `reader`, returning fewer bytes only at end of stream.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}

/// Reads one raw (still compressed) block into `block`.
///
/// Returns `Ok(false)` on a clean end of stream.
fn read_raw_block<R: Read>(reader: &mut R, block: &mut Vec<u8>, offset: u64) -> Result<bool> {
    block.clear();
    block.resize(GZIP_FIXED_HEADER_SIZE, 0);
    let n = read_full(reader, block)?;
    if n == 0 {
        return Ok(false);
    }
    if n < GZIP_FIXED_HEADER_SIZE {
        return Err(FixError::corrupt_block(offset, "truncated block header"));
    }

    let xlen = u16::from_le_bytes([block[10], block[11]]) as usize;
    block.resize(GZIP_FIXED_HEADER_SIZE + xlen, 0);
    if read_full(reader, &mut block[GZIP_FIXED_HEADER_SIZE..])? < xlen {
        return Err(FixError::corrupt_block(offset, "truncated extra field"));
    }

    let layout = parse_block_header(block, offset)?;
    let header_len = block.len();
    block.resize(layout.block_size, 0);
    if read_full(reader, &mut block[header_len..])? < layout.block_size - header_len {
        return Err(FixError::corrupt_block(
            offset,
            format!("truncated block: expected {} bytes", layout.block_size),
        ));
    }
    Ok(true)
}

/// Presents a BGZF stream as one continuous decompressed byte stream.
///
/// Blocks are read and inflated one at a time. Empty blocks (including the
/// EOF marker) contribute no bytes and may appear anywhere in the stream.
pub struct BlockReader<R: Read> {
    inner: R,

    /// Raw bytes of the most recent compressed block
    raw: Vec<u8>,

    /// Decompressed payload of the current block
    block: Vec<u8>,

    /// Read position within `block`
    pos: usize,

    /// Offset of the next block in the compressed stream
    compressed_offset: u64,

    /// Whether the last block read was empty
    last_block_empty: bool,

    eof: bool,
}

impl<R: Read> BlockReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            raw: Vec::with_capacity(BGZF_MAX_COMPRESSED_SIZE),
            block: Vec::with_capacity(BGZF_MAX_COMPRESSED_SIZE),
            pos: 0,
            compressed_offset: 0,
            last_block_empty: false,
            eof: false,
        }
    }

    /// Number of compressed bytes consumed so far.
    pub fn compressed_offset(&self) -> u64 {
        self.compressed_offset
    }

    /// Loads the next non-empty block. Returns `Ok(false)` at end of stream.
    fn fill(&mut self) -> Result<bool> {
        while !self.eof {
            let offset = self.compressed_offset;
            if !read_raw_block(&mut self.inner, &mut self.raw, offset)? {
                if !self.last_block_empty {
                    warn!("BGZF EOF marker is absent; the input may be truncated");
                }
                self.eof = true;
                break;
            }
            self.compressed_offset += self.raw.len() as u64;
            decode_block_into(&self.raw, &mut self.block, offset)?;
            self.pos = 0;
            self.last_block_empty = self.block.is_empty();
            if !self.block.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<R: Read> ByteSource for BlockReader<R> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut read = 0;
        while read < buf.len() {
            if self.pos >= self.block.len() && !self.fill()? {
                break;
            }
            let available = &self.block[self.pos..];
            let n = available.len().min(buf.len() - read);
            buf[read..read + n].copy_from_slice(&available[..n]);
            self.pos += n;
            read += n;
        }
        Ok(read)
    }
}

impl<R: Read> Read for BlockReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos >= self.block.len() && !self.fill().map_err(into_io_error)? {
            return Ok(0);
        }
        let available = &self.block[self.pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}

fn into_io_error(err: FixError) -> io::Error {
    match err {
        FixError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

/// Compresses a byte stream into BGZF blocks.
///
/// Bytes are buffered until a full block is available. [`BlockWriter::finish`]
/// must be called to flush the final partial block and append the EOF marker.
pub struct BlockWriter<W: Write> {
    inner: W,
    buffer: Vec<u8>,
    level: CompressionLevel,
    blocks_written: u64,
    finished: bool,
}

impl<W: Write> BlockWriter<W> {
    pub fn new(inner: W, level: CompressionLevel) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(BGZF_MAX_BLOCK_SIZE),
            level,
            blocks_written: 0,
            finished: false,
        }
    }

    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    /// Number of blocks written so far, not counting the EOF marker.
    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    /// Compresses and writes any buffered bytes as a block.
    pub fn flush_block(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let block = encode_block(&self.buffer, self.level)?;
        self.inner.write_all(&block)?;
        self.buffer.clear();
        self.blocks_written += 1;
        Ok(())
    }

    /// Number of bytes buffered for the current block.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drops buffered bytes beyond `len`, e.g. the head of a record that failed to write.
    pub fn discard_pending(&mut self, len: usize) {
        self.buffer.truncate(len);
    }

    /// Starts a new block if `len` more bytes would not fit in the current one.
    ///
    /// Keeps a record of at most one block's size from straddling two blocks.
    pub fn reserve(&mut self, len: usize) -> io::Result<()> {
        if self.buffer.len() + len > BGZF_MAX_BLOCK_SIZE {
            self.flush_block()?;
        }
        Ok(())
    }

    /// Flushes the final block and writes the EOF marker.
    ///
    /// Calling this more than once has no further effect.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.flush_block()?;
        self.inner.write_all(&BGZF_EOF)?;
        self.inner.flush()?;
        self.finished = true;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for BlockWriter<W> {
    /// Accepts at most what fits in the current block.
    ///
    /// When sealing a full block fails, the bytes taken from `buf` are
    /// dropped again so that an `Err` never leaves part of `buf` buffered.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let start = self.buffer.len();
        let to_copy = buf.len().min(BGZF_MAX_BLOCK_SIZE - start);
        self.buffer.extend_from_slice(&buf[..to_copy]);

        if self.buffer.len() >= BGZF_MAX_BLOCK_SIZE {
            if let Err(e) = self.flush_block() {
                self.buffer.truncate(start);
                return Err(e);
            }
        }
        Ok(to_copy)
    }

    /// Flushes the underlying writer without closing the current block.
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
