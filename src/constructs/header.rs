use std::io::Write;

use crate::{io::ByteSource, FixError};

pub const MAGIC: &[u8; 4] = b"BAM\x01";

/// One entry of the reference sequence dictionary.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reference {
    /// Raw name bytes as stored, normally including the NUL terminator
    name: Vec<u8>,
    length: u32,
}
impl Reference {
    pub fn new(name: &str, length: u32) -> Self {
        let mut raw = Vec::with_capacity(name.len() + 1);
        raw.extend_from_slice(name.as_bytes());
        raw.push(0);
        Self { name: raw, length }
    }
    /// Name without its NUL terminator.
    pub fn name(&self) -> &[u8] {
        self.name.strip_suffix(&[0]).unwrap_or(&self.name)
    }
    pub fn length(&self) -> u32 {
        self.length
    }
}

/// BAM header: magic, SAM text, and the reference dictionary.
///
/// Every field keeps its stored bytes so that writing a parsed header
/// reproduces the input exactly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Header {
    text: Vec<u8>,
    references: Vec<Reference>,
}
impl Header {
    pub fn new(text: impl Into<Vec<u8>>, references: Vec<Reference>) -> Self {
        Self {
            text: text.into(),
            references,
        }
    }
    pub fn text(&self) -> &[u8] {
        &self.text
    }
    /// Non-empty lines of the header text (`@HD`, `@SQ`, `@PG`, ...).
    pub fn text_lines(&self) -> impl Iterator<Item = &[u8]> {
        self.text
            .split(|&b| b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .filter(|line| !line.is_empty() && !line.iter().all(|&b| b == 0))
    }
    pub fn references(&self) -> &[Reference] {
        &self.references
    }
    /// Size of the serialized header in bytes.
    pub fn encoded_len(&self) -> usize {
        12 + self.text.len()
            + self
                .references
                .iter()
                .map(|r| 8 + r.name.len())
                .sum::<usize>()
    }
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&(self.text.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&self.text);
        bytes.extend_from_slice(&(self.references.len() as u32).to_le_bytes());
        for reference in &self.references {
            bytes.extend_from_slice(&(reference.name.len() as u32).to_le_bytes());
            bytes.extend_from_slice(&reference.name);
            bytes.extend_from_slice(&reference.length.to_le_bytes());
        }
        bytes
    }
    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<(), std::io::Error> {
        writer.write_all(&self.to_bytes())
    }

    /// Parse a header from the start of `bytes`, returning it with the
    /// position just past it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fix_mate_cigar::{Header, Reference};
    ///
    /// # fn main() -> fix_mate_cigar::Result<()> {
    /// let header = Header::new("@HD\tVN:1.6\n", vec![Reference::new("chr1", 1000)]);
    /// let mut bytes = header.to_bytes();
    /// bytes.extend_from_slice(b"records follow");
    ///
    /// let (parsed, cursor) = Header::parse(&bytes)?;
    /// assert_eq!(parsed, header);
    /// assert_eq!(&bytes[cursor..], b"records follow");
    /// # Ok(())
    /// # }
    /// ```
    pub fn parse(bytes: &[u8]) -> crate::Result<(Self, usize)> {
        let mut source = bytes;
        let header = Self::read_from(&mut source)?;
        Ok((header, bytes.len() - source.len()))
    }

    pub(crate) fn read_from<S: ByteSource>(source: &mut S) -> crate::Result<Self> {
        let mut magic = [0u8; 4];
        read_exact(source, &mut magic, "magic number")?;
        if &magic != MAGIC {
            return Err(FixError::MalformedHeader(format!(
                "invalid magic number, expected {MAGIC:?}, found {magic:?}"
            )));
        }

        let l_text = read_u32(source, "text length")? as usize;
        let mut text = Vec::new();
        read_vec(source, l_text, &mut text, "header text")?;

        let n_ref = read_u32(source, "reference count")?;
        let mut references = Vec::new();
        for _ in 0..n_ref {
            let l_name = read_u32(source, "reference name length")? as usize;
            let mut name = Vec::new();
            read_vec(source, l_name, &mut name, "reference name")?;
            let length = read_u32(source, "reference length")?;
            references.push(Reference { name, length });
        }

        Ok(Self { text, references })
    }
}

fn truncated(what: &str, expected: usize, found: usize) -> FixError {
    FixError::MalformedHeader(format!(
        "truncated {what}: expected {expected} bytes, found {found}"
    ))
}

fn read_exact<S: ByteSource>(source: &mut S, buf: &mut [u8], what: &str) -> crate::Result<()> {
    let n = source.read_bytes(buf)?;
    if n < buf.len() {
        return Err(truncated(what, buf.len(), n));
    }
    Ok(())
}

fn read_u32<S: ByteSource>(source: &mut S, what: &str) -> crate::Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(source, &mut buf, what)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_vec<S: ByteSource>(
    source: &mut S,
    len: usize,
    out: &mut Vec<u8>,
    what: &str,
) -> crate::Result<()> {
    let n = source.read_vec(len, out)?;
    if n < len {
        return Err(truncated(what, len, n));
    }
    Ok(())
}
