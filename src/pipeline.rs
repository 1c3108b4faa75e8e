//! The streaming filter: copy records through, dropping stale mate CIGARs.

use std::{
    io::{Read, Write},
    path::Path,
    time::Instant,
};

use log::{debug, info};

use crate::{CompressionLevel, Config, Reader, Record, Writer};

/// Identifier of the mate CIGAR tag.
pub const MATE_CIGAR_TAG: [u8; 2] = *b"MC";

/// Records between progress messages.
const PROGRESS_INTERVAL: u64 = 1_000_000;

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Summary {
    pub records_read: u64,
    pub records_written: u64,
    pub tags_removed: u64,
}

/// Removes the first `MC` tag from a record whose mate is unmapped.
///
/// Returns whether a tag was removed. Records with a mapped mate, or without
/// an `MC` tag, are left untouched.
///
/// # Examples
///
/// ```rust
/// use fix_mate_cigar::{fix_mate_cigar, flags, RecordBuilder};
///
/// let mut record = RecordBuilder::new()
///     .flags(flags::PAIRED | flags::MATE_UNMAPPED)
///     .string_tag(b"MC", "50M")
///     .build();
/// assert!(fix_mate_cigar(&mut record));
/// assert!(record.tag(b"MC").is_none());
/// assert!(!fix_mate_cigar(&mut record));
/// ```
pub fn fix_mate_cigar(record: &mut Record) -> bool {
    record.is_mate_unmapped() && record.remove_tag(&MATE_CIGAR_TAG)
}

/// Streams every record from `reader` to `writer`, fixing each in turn.
///
/// A single record buffer is reused throughout. The first error stops the
/// run; records already handed to `writer` stay written. The writer is not
/// finished here.
pub fn process<R: Read, W: Write>(
    reader: &mut Reader<R>,
    writer: &mut Writer<W>,
) -> crate::Result<Summary> {
    let mut summary = Summary::default();
    let mut record = Record::default();

    while reader.read_record(&mut record)? {
        summary.records_read += 1;
        if fix_mate_cigar(&mut record) {
            summary.tags_removed += 1;
            debug!(
                "Removed MC tag from {}",
                String::from_utf8_lossy(record.read_name())
            );
        }
        writer.write_record(&record)?;
        summary.records_written += 1;

        if summary.records_read % PROGRESS_INTERVAL == 0 {
            info!(
                "Processed {} records, removed {} MC tags",
                summary.records_read, summary.tags_removed
            );
        }
    }

    Ok(summary)
}

/// Filters the BAM stream `input` into `output`.
///
/// The output header is a byte-for-byte copy of the input header. The
/// output is closed (pending block and EOF marker flushed) whether or not
/// processing succeeded.
///
/// # Examples
///
/// ```rust
/// use fix_mate_cigar::{filter, flags, CompressionLevel, Header, Reader, RecordBuilder, Writer};
///
/// # fn main() -> fix_mate_cigar::Result<()> {
/// let record = RecordBuilder::new()
///     .name("r1")
///     .flags(flags::PAIRED | flags::MATE_UNMAPPED)
///     .string_tag(b"MC", "10M")
///     .build();
/// let mut writer = Writer::new(Vec::new(), &Header::default(), CompressionLevel::default())?;
/// writer.write_record(&record)?;
/// let input = writer.into_inner()?;
///
/// let mut output = Vec::new();
/// let summary = filter(input.as_slice(), &mut output, CompressionLevel::default())?;
/// assert_eq!(summary.tags_removed, 1);
///
/// let fixed = Reader::new(output.as_slice())?.next().unwrap()?;
/// assert!(fixed.tag(b"MC").is_none());
/// # Ok(())
/// # }
/// ```
pub fn filter<R: Read, W: Write>(
    input: R,
    output: W,
    level: CompressionLevel,
) -> crate::Result<Summary> {
    let mut reader = Reader::new(input)?;
    let mut writer = Writer::new(output, reader.header(), level)?;
    drive(&mut reader, &mut writer)
}

/// Runs the filter between the endpoints named in `config`.
///
/// # Errors
///
/// Fails on the first open, header, record, or write error. When the input
/// cannot be read the output is never created.
pub fn run(config: &Config) -> crate::Result<Summary> {
    let start = Instant::now();
    info!(
        "Removing MC tags from mate-unmapped records: {} -> {} (compression level {})",
        describe(config.input.as_deref()),
        describe(config.output.as_deref()),
        config.compression_level.get()
    );

    let mut reader = Reader::from_optional_path(config.input.as_ref())?;
    let mut writer = Writer::from_optional_path(
        config.output.as_ref(),
        reader.header(),
        config.compression_level,
    )?;
    let summary = drive(&mut reader, &mut writer)?;

    info!(
        "Read {} records, wrote {} records, removed {} MC tags in {:.2?}",
        summary.records_read,
        summary.records_written,
        summary.tags_removed,
        start.elapsed()
    );
    Ok(summary)
}

/// Processes all records, then closes the output even if processing failed.
fn drive<R: Read, W: Write>(
    reader: &mut Reader<R>,
    writer: &mut Writer<W>,
) -> crate::Result<Summary> {
    let result = process(reader, writer);
    let finished = writer.finish();
    if let Err(e) = &result {
        debug!(
            "Stopped after {} records at decompressed offset {}: {e}",
            writer.records_written(),
            reader.bytes_read()
        );
    }
    let summary = result?;
    finished?;
    Ok(summary)
}

fn describe(path: Option<&Path>) -> String {
    path.map_or_else(|| "<stdio>".to_string(), |p| p.display().to_string())
}
