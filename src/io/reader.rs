//! Streaming reader for BAM files.
//!
//! The reader decompresses the BGZF container block by block, parses the
//! header once during construction, and then yields records on demand.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use super::{BlockReader, ByteSource};
use crate::{FixError, Header, Record, BLOCK_SIZE_PREFIX};

pub type BoxedReader = Box<dyn Read + Send>;

/// Streaming reader for BAM files.
///
/// Records are read one at a time, either into a caller-provided buffer with
/// [`Reader::read_record`] or as owned values through the `Iterator`
/// interface. Each record is validated as it is read, so the first
/// structural problem in the input surfaces as an error at that record.
///
/// # Examples
///
/// ```rust
/// use fix_mate_cigar::{CompressionLevel, Header, Reader, Record, RecordBuilder, Writer};
///
/// # fn main() -> fix_mate_cigar::Result<()> {
/// let header = Header::new("@HD\tVN:1.6\n", vec![]);
/// let mut writer = Writer::new(Vec::new(), &header, CompressionLevel::default())?;
/// writer.write_record(&RecordBuilder::new().name("r1").build())?;
/// writer.write_record(&RecordBuilder::new().name("r2").build())?;
/// let bytes = writer.into_inner()?;
///
/// let mut reader = Reader::new(bytes.as_slice())?;
/// assert_eq!(reader.header(), &header);
///
/// let mut record = Record::default();
/// let mut names = Vec::new();
/// while reader.read_record(&mut record)? {
///     names.push(record.read_name().to_vec());
/// }
/// assert_eq!(names, vec![b"r1".to_vec(), b"r2".to_vec()]);
/// # Ok(())
/// # }
/// ```
pub struct Reader<R: Read> {
    /// Decompressed byte stream
    inner: BlockReader<R>,

    /// Header parsed at construction
    header: Header,

    /// Position in the decompressed stream
    bytes_read: usize,

    /// Number of records successfully read
    records_read: u64,

    /// Set at end of stream or after the first error
    eof: bool,
}
impl<R: Read> Reader<R> {
    /// Creates a new reader, reading and validating the header immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is corrupt or the header is
    /// malformed or truncated.
    pub fn new(inner: R) -> crate::Result<Self> {
        let mut inner = BlockReader::new(inner);
        let header = Header::read_from(&mut inner)?;
        log::debug!(
            "Read BAM header with {} reference sequences",
            header.references().len()
        );
        Ok(Self {
            inner,
            bytes_read: header.encoded_len(),
            header,
            records_read: 0,
            eof: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Position of the next record in the decompressed stream.
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Number of compressed bytes consumed so far.
    pub fn compressed_offset(&self) -> u64 {
        self.inner.compressed_offset()
    }

    /// Reads the next record into `record`, reusing its allocation.
    ///
    /// Returns `Ok(false)` once the stream ends cleanly between records.
    ///
    /// # Errors
    ///
    /// - [`FixError::TruncatedRecord`] if the stream ends inside a record.
    /// - [`FixError::InvalidRecord`] if the record's sub-field lengths are
    ///   inconsistent with its block size.
    /// - [`FixError::CorruptBlock`] or [`FixError::Io`] from the container.
    ///
    /// After an error the contents of `record` are reset.
    pub fn read_record(&mut self, record: &mut Record) -> crate::Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let result = self.fill_record(record);
        match result {
            Ok(true) => self.records_read += 1,
            Ok(false) => self.eof = true,
            Err(_) => {
                self.eof = true;
                *record = Record::default();
            }
        }
        result
    }

    fn fill_record(&mut self, record: &mut Record) -> crate::Result<bool> {
        let pos = self.bytes_read;

        let mut prefix = [0u8; BLOCK_SIZE_PREFIX];
        let n = self.inner.read_bytes(&mut prefix)?;
        if n == 0 {
            return Ok(false);
        }
        if n < BLOCK_SIZE_PREFIX {
            return Err(FixError::TruncatedRecord {
                pos,
                expected: BLOCK_SIZE_PREFIX,
                available: n,
            });
        }
        let block_size = u32::from_le_bytes(prefix) as usize;

        let body = record.body_mut();
        body.clear();
        let read = self.inner.read_vec(block_size, body)?;
        self.bytes_read += BLOCK_SIZE_PREFIX + read;
        if read < block_size {
            return Err(FixError::TruncatedRecord {
                pos,
                expected: BLOCK_SIZE_PREFIX + block_size,
                available: BLOCK_SIZE_PREFIX + read,
            });
        }

        record.validate(pos)?;
        Ok(true)
    }
}

impl<R: Read> Iterator for Reader<R> {
    type Item = Result<Record, FixError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = Record::default();
        match self.read_record(&mut record) {
            Ok(true) => Some(Ok(record)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl<R: Read> std::iter::FusedIterator for Reader<R> {}

impl Reader<BoxedReader> {
    /// Creates a reader from a file path, using buffered I/O.
    ///
    /// # Errors
    ///
    /// Returns [`FixError::Open`] if the file cannot be opened, or any error
    /// from reading the header.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use fix_mate_cigar::Reader;
    ///
    /// # fn main() -> fix_mate_cigar::Result<()> {
    /// let reader = Reader::from_path("input.bam")?;
    /// for result in reader {
    ///     let record = result?;
    ///     println!("{}", String::from_utf8_lossy(record.read_name()));
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_path<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let rdr = File::open(path)
            .map(BufReader::new)
            .map_err(|source| FixError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Self::new(Box::new(rdr))
    }

    /// Creates a reader from standard input.
    pub fn from_stdin() -> crate::Result<Self> {
        Self::new(Box::new(std::io::stdin()))
    }

    /// Reads from the file if a path is given, otherwise from standard input.
    pub fn from_optional_path<P: AsRef<Path>>(path: Option<P>) -> crate::Result<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::from_stdin(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        encode_block, flags, CompressionLevel, Reference, RecordBuilder, Writer, BGZF_EOF,
    };

    fn sample_header() -> Header {
        Header::new(
            "@HD\tVN:1.6\n@SQ\tSN:chr1\tLN:1000\n",
            vec![Reference::new("chr1", 1000)],
        )
    }

    fn sample_records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                RecordBuilder::new()
                    .name(&format!("read{i}"))
                    .flags(flags::PAIRED | if i % 2 == 0 { flags::MATE_UNMAPPED } else { 0 })
                    .ref_id(0)
                    .pos(i as i32)
                    .cigar("4M")
                    .sequence(b"ACGT")
                    .string_tag(b"MC", "4M")
                    .build()
            })
            .collect()
    }

    fn create_test_data(records: &[Record]) -> Vec<u8> {
        let mut writer = Writer::new(Vec::new(), &sample_header(), CompressionLevel::default())
            .unwrap();
        writer.write_batch(records).unwrap();
        writer.into_inner().unwrap()
    }

    /// BGZF stream holding `payload` in a single block.
    fn bgzf(payload: &[u8]) -> Vec<u8> {
        let mut bytes = encode_block(payload, CompressionLevel::default()).unwrap();
        bytes.extend_from_slice(&BGZF_EOF);
        bytes
    }

    #[test]
    fn test_reader_creation() {
        let buffer = create_test_data(&[]);
        let reader = Reader::new(buffer.as_slice()).unwrap();
        assert_eq!(reader.header(), &sample_header());
        assert_eq!(reader.records_read(), 0);
        assert_eq!(reader.bytes_read(), sample_header().encoded_len());
    }

    #[test]
    fn test_reader_invalid_header() {
        let data = bgzf(b"BAI\x01\0\0\0\0\0\0\0\0");
        let result = Reader::new(data.as_slice());
        assert!(matches!(result, Err(FixError::MalformedHeader(_))));

        // A plain, uncompressed BAM payload is not a BGZF stream
        let data = sample_header().to_bytes();
        let result = Reader::new(data.as_slice());
        assert!(matches!(result, Err(FixError::CorruptBlock { .. })));
    }

    #[test]
    fn test_reader_iterator() {
        let records = sample_records(3);
        let buffer = create_test_data(&records);

        let reader = Reader::new(buffer.as_slice()).unwrap();
        let read_records = reader.collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(records, read_records);
    }

    #[test]
    fn test_reader_reuses_buffer() {
        let records = sample_records(4);
        let buffer = create_test_data(&records);

        let mut reader = Reader::new(buffer.as_slice()).unwrap();
        let mut record = Record::default();
        let mut count = 0;
        while reader.read_record(&mut record).unwrap() {
            assert_eq!(record, records[count]);
            count += 1;
        }
        assert_eq!(count, 4);
        assert_eq!(reader.records_read(), 4);
        assert!(!reader.read_record(&mut record).unwrap());
    }

    #[test]
    fn test_reader_empty_file() {
        let buffer = create_test_data(&[]);
        let reader = Reader::new(buffer.as_slice()).unwrap();
        assert_eq!(reader.count(), 0);
    }

    #[test]
    fn test_reader_large_batch() {
        // Enough records to span many BGZF blocks
        let records = sample_records(20_000);
        let buffer = create_test_data(&records);

        let reader = Reader::new(buffer.as_slice()).unwrap();
        let read_records = reader.collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(records, read_records);
    }

    #[test]
    fn test_reader_truncated_record() {
        let records = sample_records(2);
        let mut payload = sample_header().to_bytes();
        let first_pos = payload.len();
        payload.extend(records[0].encode_one());
        let second_pos = payload.len();
        let second = records[1].encode_one();
        payload.extend_from_slice(&second[..second.len() - 5]);

        let data = bgzf(&payload);
        let mut reader = Reader::new(data.as_slice()).unwrap();
        let first = reader.next().unwrap().unwrap();
        assert_eq!(first, records[0]);
        assert_eq!(reader.bytes_read(), second_pos);
        assert!(first_pos < second_pos);

        match reader.next() {
            Some(Err(FixError::TruncatedRecord {
                pos,
                expected,
                available,
            })) => {
                assert_eq!(pos, second_pos);
                assert_eq!(expected, second.len());
                assert_eq!(available, second.len() - 5);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_reader_truncated_prefix() {
        let mut payload = sample_header().to_bytes();
        payload.extend_from_slice(&[10, 0]);

        let data = bgzf(&payload);
        let mut reader = Reader::new(data.as_slice()).unwrap();
        assert!(matches!(
            reader.next(),
            Some(Err(FixError::TruncatedRecord {
                expected: 4,
                available: 2,
                ..
            }))
        ));
    }

    #[test]
    fn test_reader_invalid_record() {
        let mut body = sample_records(1)[0].as_bytes().to_vec();
        body.push(0xAA);
        let mut payload = sample_header().to_bytes();
        payload.extend_from_slice(&(body.len() as u32).to_le_bytes());
        payload.extend_from_slice(&body);

        let data = bgzf(&payload);
        let mut reader = Reader::new(data.as_slice()).unwrap();
        let mut record = Record::default();
        assert!(matches!(
            reader.read_record(&mut record),
            Err(FixError::InvalidRecord { .. })
        ));
        assert_eq!(record, Record::default());
        assert!(!reader.read_record(&mut record).unwrap());
    }

    #[test]
    fn test_reader_record_spanning_blocks() {
        let records = sample_records(1);
        let mut payload = sample_header().to_bytes();
        payload.extend(records[0].encode_one());

        // Split the payload mid-record across two blocks
        let split = payload.len() - 10;
        let mut bytes = encode_block(&payload[..split], CompressionLevel::default()).unwrap();
        bytes.extend(encode_block(&payload[split..], CompressionLevel::default()).unwrap());
        bytes.extend_from_slice(&BGZF_EOF);

        let reader = Reader::new(bytes.as_slice()).unwrap();
        let read_records = reader.collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(records, read_records);
    }

    #[test]
    fn test_reader_header_spanning_blocks() {
        let mut text = String::from("@HD\tVN:1.6\n");
        let references: Vec<Reference> = (0..5_000)
            .map(|i| {
                text.push_str(&format!("@SQ\tSN:contig_{i}\tLN:{}\n", 1000 + i));
                Reference::new(&format!("contig_{i}"), 1000 + i)
            })
            .collect();
        let header = Header::new(text, references);
        assert!(header.encoded_len() > crate::BGZF_MAX_BLOCK_SIZE);

        let records = sample_records(3);
        let mut writer = Writer::new(Vec::new(), &header, CompressionLevel::default()).unwrap();
        writer.write_batch(&records).unwrap();
        let buffer = writer.into_inner().unwrap();

        let reader = Reader::new(buffer.as_slice()).unwrap();
        assert_eq!(reader.header(), &header);
        let read_records = reader.collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(records, read_records);
    }

    #[test]
    fn test_from_path_missing_file() {
        let result = Reader::from_path("/nonexistent/dir/input.bam");
        match result {
            Err(FixError::Open { path, .. }) => {
                assert_eq!(path, Path::new("/nonexistent/dir/input.bam"));
            }
            Err(e) => panic!("unexpected error {e}"),
            Ok(_) => panic!("opening a missing file succeeded"),
        }
    }

    #[test]
    fn test_from_path() {
        let records = sample_records(5);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.bam");
        std::fs::write(&path, create_test_data(&records)).unwrap();

        let reader = Reader::from_optional_path(Some(&path)).unwrap();
        assert_eq!(reader.header(), &sample_header());
        let read_records = reader.collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(records, read_records);
    }
}
