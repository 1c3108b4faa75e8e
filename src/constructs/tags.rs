//! Auxiliary (optional) tag block parsing.
//!
//! Each tag is encoded as a two byte identifier, a one byte type code, and a
//! type-dependent value:
//!
//! ```text
//! A c C      1 byte
//! s S        2 bytes
//! i I f      4 bytes
//! Z H        NUL-terminated text
//! B          subtype (1) + count (u32) + count * sizeof(subtype)
//! ```

/// Fixed-size tag value sizes indexed by type byte. 0 = variable or unknown.
const TAG_FIXED_SIZES: [u8; 256] = {
    let mut table = [0u8; 256];
    table[b'A' as usize] = 1;
    table[b'c' as usize] = 1;
    table[b'C' as usize] = 1;
    table[b's' as usize] = 2;
    table[b'S' as usize] = 2;
    table[b'i' as usize] = 4;
    table[b'I' as usize] = 4;
    table[b'f' as usize] = 4;
    table
};

/// Size of the identifier and type code preceding every value.
pub const TAG_PREFIX_SIZE: usize = 3;

/// Calculate the size of a tag value, `data` starting right after the type code.
///
/// Returns `None` for unknown type codes or values that run past `data`.
#[inline]
pub fn value_size(val_type: u8, data: &[u8]) -> Option<usize> {
    let fixed = TAG_FIXED_SIZES[val_type as usize] as usize;
    let size = if fixed > 0 {
        fixed
    } else {
        match val_type {
            b'Z' | b'H' => data.iter().position(|&b| b == 0)? + 1,
            b'B' => {
                if data.len() < 5 {
                    return None;
                }
                let elem_size = TAG_FIXED_SIZES[data[0] as usize] as usize;
                if elem_size == 0 || data[0] == b'A' {
                    return None;
                }
                let count = u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as usize;
                count.checked_mul(elem_size)?.checked_add(5)?
            }
            _ => return None,
        }
    };
    (size <= data.len()).then_some(size)
}

/// One auxiliary tag borrowed from a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag<'a> {
    pub id: [u8; 2],
    pub val_type: u8,
    /// Encoded value, including the NUL terminator of text values
    pub value: &'a [u8],
}

impl<'a> Tag<'a> {
    /// Total encoded size of the tag entry.
    pub fn encoded_len(&self) -> usize {
        TAG_PREFIX_SIZE + self.value.len()
    }

    /// Text of a `Z` or `H` value without its terminator.
    pub fn as_str(&self) -> Option<&'a str> {
        match self.val_type {
            b'Z' | b'H' => {
                let text = self.value.strip_suffix(&[0]).unwrap_or(self.value);
                std::str::from_utf8(text).ok()
            }
            _ => None,
        }
    }

    /// Integer value of a `c C s S i I` tag.
    pub fn as_int(&self) -> Option<i64> {
        let v = self.value;
        match self.val_type {
            b'c' => Some(i64::from(v[0] as i8)),
            b'C' => Some(i64::from(v[0])),
            b's' => Some(i64::from(i16::from_le_bytes([v[0], v[1]]))),
            b'S' => Some(i64::from(u16::from_le_bytes([v[0], v[1]]))),
            b'i' => Some(i64::from(i32::from_le_bytes([v[0], v[1], v[2], v[3]]))),
            b'I' => Some(i64::from(u32::from_le_bytes([v[0], v[1], v[2], v[3]]))),
            _ => None,
        }
    }
}

/// Iterator over the tags of an auxiliary block.
///
/// Stops at the end of the block or at the first malformed entry.
#[derive(Debug, Clone)]
pub struct Tags<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Tags<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for Tags<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (start, len) = entry_at(self.data, self.pos)?;
        let entry = &self.data[start..start + len];
        self.pos = start + len;
        Some(Tag {
            id: [entry[0], entry[1]],
            val_type: entry[2],
            value: &entry[TAG_PREFIX_SIZE..],
        })
    }
}

/// Bounds `(offset, len)` of the complete entry starting at `p`.
#[inline]
fn entry_at(aux: &[u8], p: usize) -> Option<(usize, usize)> {
    if p + TAG_PREFIX_SIZE > aux.len() {
        return None;
    }
    let size = value_size(aux[p + 2], &aux[p + TAG_PREFIX_SIZE..])?;
    Some((p, TAG_PREFIX_SIZE + size))
}

/// Find the first entry with identifier `tag`, returning its `(offset, len)`
/// relative to the start of `aux`.
pub fn find(aux: &[u8], tag: &[u8; 2]) -> Option<(usize, usize)> {
    let mut p = 0;
    while let Some((start, len)) = entry_at(aux, p) {
        if &aux[start..start + 2] == tag {
            return Some((start, len));
        }
        p = start + len;
    }
    None
}

/// Check that `aux` is a sequence of complete entries ending exactly at its end.
pub(crate) fn validate(aux: &[u8]) -> std::result::Result<(), String> {
    let mut p = 0;
    while p < aux.len() {
        match entry_at(aux, p) {
            Some((_, len)) => p += len,
            None if aux.len() - p < TAG_PREFIX_SIZE => {
                return Err(format!(
                    "{} trailing bytes after the last auxiliary tag",
                    aux.len() - p
                ));
            }
            None => {
                return Err(format!(
                    "auxiliary tag {}{}:{} at offset {p} is malformed or overruns the record",
                    aux[p] as char,
                    aux[p + 1] as char,
                    aux[p + 2] as char
                ));
            }
        }
    }
    Ok(())
}
