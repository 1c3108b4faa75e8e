use std::fmt;

/// CIGAR operation codes in BAM order (`MIDNSHP=X`).
const OP_CHARS: &[u8; 9] = b"MIDNSHP=X";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Match,
    Insertion,
    Deletion,
    Skip,
    SoftClip,
    HardClip,
    Pad,
    SequenceMatch,
    SequenceMismatch,
}

impl Kind {
    const ALL: [Kind; 9] = [
        Kind::Match,
        Kind::Insertion,
        Kind::Deletion,
        Kind::Skip,
        Kind::SoftClip,
        Kind::HardClip,
        Kind::Pad,
        Kind::SequenceMatch,
        Kind::SequenceMismatch,
    ];

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn from_char(c: u8) -> Option<Self> {
        let code = OP_CHARS.iter().position(|&b| b == c)?;
        Some(Self::ALL[code])
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn as_char(self) -> char {
        OP_CHARS[self as usize] as char
    }

    /// Whether the operation advances along the reference.
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            Kind::Match
                | Kind::Deletion
                | Kind::Skip
                | Kind::SequenceMatch
                | Kind::SequenceMismatch
        )
    }
}

/// A single CIGAR operation, packed in BAM as `len << 4 | code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Op {
    pub kind: Kind,
    pub len: u32,
}

impl Op {
    pub fn new(kind: Kind, len: u32) -> Self {
        Self { kind, len }
    }

    /// Returns `None` for operation codes outside `MIDNSHP=X`.
    pub fn decode(packed: u32) -> Option<Self> {
        Kind::from_code(packed & 0xf).map(|kind| Self::new(kind, packed >> 4))
    }

    pub fn encode(self) -> u32 {
        (self.len << 4) | self.kind.code()
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.len, self.kind.as_char())
    }
}

/// Parse a SAM CIGAR string such as `10S40M`. `*` parses to no operations.
pub fn parse(cigar: &str) -> Option<Vec<Op>> {
    if cigar == "*" {
        return Some(Vec::new());
    }
    let mut ops = Vec::new();
    let mut len: u32 = 0;
    let mut has_digits = false;
    for c in cigar.bytes() {
        if c.is_ascii_digit() {
            len = len.checked_mul(10)?.checked_add(u32::from(c - b'0'))?;
            has_digits = true;
        } else {
            if !has_digits || len >= 1 << 28 {
                return None;
            }
            ops.push(Op::new(Kind::from_char(c)?, len));
            len = 0;
            has_digits = false;
        }
    }
    if has_digits {
        return None;
    }
    Some(ops)
}

/// Render operations as a SAM CIGAR string.
pub fn to_string(ops: &[Op]) -> String {
    if ops.is_empty() {
        return "*".to_string();
    }
    ops.iter().map(Op::to_string).collect()
}

/// Number of reference bases covered by `ops`.
pub fn reference_len(ops: &[Op]) -> u32 {
    ops.iter()
        .filter(|op| op.kind.consumes_reference())
        .map(|op| op.len)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_render() {
        let ops = parse("10S40M2I3D").unwrap();
        assert_eq!(
            ops,
            vec![
                Op::new(Kind::SoftClip, 10),
                Op::new(Kind::Match, 40),
                Op::new(Kind::Insertion, 2),
                Op::new(Kind::Deletion, 3),
            ]
        );
        assert_eq!(to_string(&ops), "10S40M2I3D");
        assert_eq!(reference_len(&ops), 43);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse("M").is_none());
        assert!(parse("50").is_none());
        assert!(parse("5Q").is_none());
        assert!(parse("99999999999M").is_none());
        assert_eq!(parse("*"), Some(Vec::new()));
        assert_eq!(to_string(&[]), "*");
    }

    #[test]
    fn test_packing() {
        let op = Op::new(Kind::SequenceMismatch, 25);
        assert_eq!(op.encode(), (25 << 4) | 8);
        assert_eq!(Op::decode(op.encode()), Some(op));
        assert_eq!(Op::decode(0x9), None);
        assert_eq!(op.to_string(), "25X");
    }
}
