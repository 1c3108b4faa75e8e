mod builder;
pub mod cigar;
mod header;
mod record;
pub mod tags;

pub use builder::RecordBuilder;
pub use header::{Header, Reference, MAGIC};
pub use record::{flags, Record, TagSpan, BLOCK_SIZE_PREFIX, CORE_SIZE};
pub use tags::{Tag, Tags};
