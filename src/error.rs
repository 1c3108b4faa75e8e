//! Error handling for BAM filtering.
//!
//! This module defines all error types that can occur while decoding the BGZF
//! container, parsing the header and records, and writing the output stream.

use std::path::PathBuf;
use thiserror::Error;

/// A specialized `Result` type for BAM filtering operations.
///
/// It's equivalent to `std::result::Result<T, FixError>`.
///
/// # Examples
///
/// ```rust
/// use fix_mate_cigar::{Header, Result};
///
/// fn header_len(bytes: &[u8]) -> Result<usize> {
///     let (_header, cursor) = Header::parse(bytes)?;
///     Ok(cursor)
/// }
///
/// assert!(header_len(b"BAM\x01").is_err());
/// ```
pub type Result<T> = std::result::Result<T, FixError>;

/// Error types for BAM filtering operations.
///
/// Every variant is fatal to a pipeline run: nothing is retried or recovered
/// locally, the error is reported at the process boundary.
///
/// # Examples
///
/// ```rust
/// use fix_mate_cigar::{FixError, Record};
///
/// // A block size prefix announcing more bytes than are available
/// let bytes = [64u8, 0, 0, 0, 1, 2, 3];
///
/// match Record::decode_one(&bytes, 0) {
///     Err(FixError::TruncatedRecord { expected, available, .. }) => {
///         assert_eq!(expected, 68);
///         assert_eq!(available, 7);
///     }
///     other => panic!("unexpected result: {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum FixError {
    /// I/O error from the underlying input stream.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// The input could not be opened for reading, or the output could not be
    /// created.
    #[error("Unable to open {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The output sink rejected a write (e.g. disk full, closed pipe).
    #[error("Unable to write to output")]
    Write(#[source] std::io::Error),

    /// A BGZF block failed framing, decompression, size, or checksum checks.
    ///
    /// `offset` is the position of the block in the compressed stream.
    #[error("Corrupt BGZF block at offset {offset}: {reason}")]
    CorruptBlock { offset: u64, reason: String },

    /// The header is missing its magic number or ends early.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// The stream ended in the middle of a record.
    ///
    /// `pos` is the position of the record in the decompressed stream,
    /// `expected` and `available` count bytes including the size prefix.
    #[error("Truncated record at position {pos}: expected {expected} bytes, found {available}")]
    TruncatedRecord {
        pos: usize,
        expected: usize,
        available: usize,
    },

    /// The record's sub-field lengths disagree with its declared block size.
    #[error("Invalid record at position {pos}: {reason}")]
    InvalidRecord { pos: usize, reason: String },
}

impl FixError {
    pub(crate) fn corrupt_block(offset: u64, reason: impl Into<String>) -> Self {
        Self::CorruptBlock {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_record(pos: usize, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            pos,
            reason: reason.into(),
        }
    }
}
