mod block;
mod reader;
mod writer;

pub use block::{
    decode_block, encode_block, BlockReader, BlockWriter, CompressionLevel, BGZF_EOF,
    BGZF_FOOTER_SIZE, BGZF_HEADER_SIZE, BGZF_MAX_BLOCK_SIZE,
};
pub use reader::{BoxedReader, Reader};
pub use writer::{BoxedWriter, Writer};

use crate::Result;

/// Largest single allocation step when reading a length-prefixed field.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// A source of decompressed bytes: either an in-memory slice or a BGZF stream.
pub(crate) trait ByteSource {
    /// Fills `buf` as far as possible, returning fewer bytes only at end of stream.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Appends up to `len` bytes to `out`, returning how many were appended.
    ///
    /// The buffer grows as data arrives, so a corrupt length field cannot
    /// trigger a huge allocation on its own.
    fn read_vec(&mut self, len: usize, out: &mut Vec<u8>) -> Result<usize> {
        let mut total = 0;
        while total < len {
            let want = (len - total).min(READ_CHUNK_SIZE);
            let start = out.len();
            out.resize(start + want, 0);
            let n = self.read_bytes(&mut out[start..])?;
            out.truncate(start + n);
            total += n;
            if n < want {
                break;
            }
        }
        Ok(total)
    }
}

impl ByteSource for &[u8] {
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.len());
        buf[..n].copy_from_slice(&self[..n]);
        *self = &self[n..];
        Ok(n)
    }
}
