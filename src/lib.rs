//! # fix-mate-cigar - Remove stale mate CIGAR tags from BAM files
//!
//! `fix_mate_cigar` streams a BAM file and deletes the `MC` (mate CIGAR)
//! auxiliary tag from every record whose mate is flagged as unmapped
//! (flag `0x8`). A mate CIGAR describing an unmapped mate is meaningless and
//! trips strict validators; everything else about the file is left alone.
//!
//! The crate carries its own small BAM stack:
//!
//! - a BGZF block codec ([`decode_block`], [`encode_block`], [`Reader`] and
//!   [`Writer`] stream through it),
//! - a header codec that preserves the header byte for byte ([`Header`]),
//! - a record codec with auxiliary tag lookup and deletion ([`Record`]).
//!
//! ## Format
//!
//! ### Header
//! - Magic number: `BAM\1`
//! - `l_text` (u32) and the SAM header text
//! - `n_ref` (u32) and, per reference, `l_name` (u32), the NUL-terminated
//!   name, and `l_ref` (u32)
//!
//! ### Record
//! - `block_size` (u32), the size of the rest of the record
//! - 32-byte fixed core (positions, flags, and sub-field lengths)
//! - read name, CIGAR, packed sequence, qualities, and auxiliary tags
//!
//! ## Basic Usage
//!
//! ```rust
//! use fix_mate_cigar::{filter, flags, CompressionLevel, Header, Reader, RecordBuilder, Writer};
//!
//! # fn main() -> fix_mate_cigar::Result<()> {
//! let header = Header::new("@HD\tVN:1.6\n", vec![]);
//! let records = vec![
//!     RecordBuilder::new()
//!         .name("orphan")
//!         .flags(flags::PAIRED | flags::MATE_UNMAPPED)
//!         .string_tag(b"MC", "50M")
//!         .string_tag(b"RG", "grp1")
//!         .build(),
//!     RecordBuilder::new()
//!         .name("paired")
//!         .flags(flags::PAIRED)
//!         .string_tag(b"MC", "50M")
//!         .build(),
//! ];
//!
//! let mut writer = Writer::new(Vec::new(), &header, CompressionLevel::default())?;
//! writer.write_batch(&records)?;
//! let input = writer.into_inner()?;
//!
//! let mut output = Vec::new();
//! let summary = filter(input.as_slice(), &mut output, CompressionLevel::default())?;
//! assert_eq!(summary.records_written, 2);
//! assert_eq!(summary.tags_removed, 1);
//!
//! let fixed: Vec<_> = Reader::new(output.as_slice())?.collect::<Result<_, _>>()?;
//! assert!(fixed[0].tag(b"MC").is_none());
//! assert!(fixed[0].tag(b"RG").is_some());
//! assert_eq!(fixed[1], records[1]);
//! # Ok(())
//! # }
//! ```
//!
//! ### File I/O
//!
//! ```rust,no_run
//! use fix_mate_cigar::{run, Config};
//!
//! # fn main() -> fix_mate_cigar::Result<()> {
//! // "-" selects standard input or output
//! let config = Config::new("input.bam", "-");
//! let summary = run(&config)?;
//! eprintln!("removed {} MC tags", summary.tags_removed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, FixError>`. Errors are never recovered
//! locally: the first corrupt block, truncated record, or failed write ends
//! the run.
//!
//! ```rust
//! use fix_mate_cigar::{FixError, Reader};
//!
//! // Not a BGZF stream
//! let data = vec![0u8; 32];
//! match Reader::new(data.as_slice()) {
//!     Err(FixError::CorruptBlock { offset, reason }) => {
//!         println!("corrupt block at {offset}: {reason}");
//!     }
//!     Err(e) => println!("Other error: {e}"),
//!     Ok(_) => unreachable!(),
//! }
//! ```

mod config;
mod constructs;
mod error;
mod io;
mod pipeline;

pub use config::{Config, STDIO_PATH};
pub use constructs::{
    cigar, flags, tags, Header, Record, RecordBuilder, Reference, Tag, TagSpan, Tags,
    BLOCK_SIZE_PREFIX, CORE_SIZE, MAGIC,
};
pub use error::{FixError, Result};
pub use io::{
    decode_block, encode_block, BlockReader, BlockWriter, BoxedReader, BoxedWriter,
    CompressionLevel, Reader, Writer, BGZF_EOF, BGZF_FOOTER_SIZE, BGZF_HEADER_SIZE,
    BGZF_MAX_BLOCK_SIZE,
};
pub use pipeline::{filter, fix_mate_cigar, process, run, Summary, MATE_CIGAR_TAG};
