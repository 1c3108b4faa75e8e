//! Streaming writer for BAM files.
//!
//! Records are serialized into BGZF blocks as they arrive; a record never
//! straddles a block boundary unless it is larger than a whole block.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use super::{BlockWriter, CompressionLevel};
use crate::{FixError, Header, Record};

pub type BoxedWriter = Box<dyn Write + Send>;

/// Streaming writer for BAM files.
///
/// The header is written at construction and sealed in its own block.
/// Output is only complete after [`Writer::finish`] (or
/// [`Writer::into_inner`]), which flushes the last block and appends the
/// BGZF end-of-file marker. Dropping an unfinished writer leaves the output
/// without that marker.
///
/// # Examples
///
/// ```rust
/// use fix_mate_cigar::{CompressionLevel, Header, RecordBuilder, Writer, BGZF_EOF};
///
/// # fn main() -> fix_mate_cigar::Result<()> {
/// let header = Header::new("@HD\tVN:1.6\n", vec![]);
/// let mut writer = Writer::new(Vec::new(), &header, CompressionLevel::new(1).unwrap())?;
/// writer.write_record(&RecordBuilder::new().name("r1").build())?;
/// assert_eq!(writer.records_written(), 1);
///
/// let bytes = writer.into_inner()?;
/// assert!(bytes.ends_with(&BGZF_EOF));
/// # Ok(())
/// # }
/// ```
pub struct Writer<W: Write> {
    inner: BlockWriter<W>,

    records_written: u64,
}

impl<W: Write> Writer<W> {
    /// Creates a writer and writes `header` immediately.
    ///
    /// # Errors
    ///
    /// Returns [`FixError::Write`] if the sink rejects the header.
    pub fn new(inner: W, header: &Header, level: CompressionLevel) -> crate::Result<Self> {
        let mut inner = BlockWriter::new(inner, level);
        header.write_bytes(&mut inner).map_err(FixError::Write)?;
        inner.flush_block().map_err(FixError::Write)?;
        Ok(Self {
            inner,
            records_written: 0,
        })
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn level(&self) -> CompressionLevel {
        self.inner.level()
    }

    /// Appends one record.
    ///
    /// On failure no bytes of the record stay buffered, so a later
    /// [`Writer::finish`] only seals complete records. Blocks of an oversized
    /// record that already reached the sink cannot be recalled.
    pub fn write_record(&mut self, record: &Record) -> crate::Result<()> {
        self.inner
            .reserve(record.encoded_len())
            .map_err(FixError::Write)?;
        let pending = self.inner.pending_len();
        let blocks = self.inner.blocks_written();
        if let Err(e) = record.write_bytes(&mut self.inner) {
            let keep = if self.inner.blocks_written() == blocks {
                pending
            } else {
                0
            };
            self.inner.discard_pending(keep);
            return Err(FixError::Write(e));
        }
        self.records_written += 1;
        Ok(())
    }

    pub fn write_batch(&mut self, records: &[Record]) -> crate::Result<()> {
        for record in records {
            self.write_record(record)?;
        }
        Ok(())
    }

    pub fn write_iter<I>(&mut self, records: I) -> crate::Result<()>
    where
        I: Iterator<Item = Record>,
    {
        for record in records {
            self.write_record(&record)?;
        }
        Ok(())
    }

    /// Flushes pending data and appends the end-of-file marker.
    ///
    /// Calling it again is a no-op.
    pub fn finish(&mut self) -> crate::Result<()> {
        self.inner.finish().map_err(FixError::Write)
    }

    pub fn get_ref(&self) -> &W {
        self.inner.get_ref()
    }

    /// Finishes the stream and returns the underlying sink.
    pub fn into_inner(mut self) -> crate::Result<W> {
        self.finish()?;
        Ok(self.inner.into_inner())
    }
}

impl Writer<BoxedWriter> {
    /// Creates (or truncates) the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`FixError::Open`] if the file cannot be created.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use fix_mate_cigar::{CompressionLevel, Header, Writer};
    ///
    /// # fn main() -> fix_mate_cigar::Result<()> {
    /// let mut writer = Writer::from_path("output.bam", &Header::default(), CompressionLevel::default())?;
    /// writer.finish()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        header: &Header,
        level: CompressionLevel,
    ) -> crate::Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| FixError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(Box::new(BufWriter::new(file)), header, level)
    }

    pub fn from_stdout(header: &Header, level: CompressionLevel) -> crate::Result<Self> {
        Self::new(Box::new(BufWriter::new(std::io::stdout())), header, level)
    }

    /// Writes to the file if a path is given, otherwise to standard output.
    pub fn from_optional_path<P: AsRef<Path>>(
        path: Option<P>,
        header: &Header,
        level: CompressionLevel,
    ) -> crate::Result<Self> {
        match path {
            Some(path) => Self::from_path(path, header, level),
            None => Self::from_stdout(header, level),
        }
    }
}
