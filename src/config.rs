//! Run configuration for the mate-CIGAR filter.

use std::path::{Path, PathBuf};

use crate::CompressionLevel;

/// Path value selecting a standard stream instead of a file.
pub const STDIO_PATH: &str = "-";

/// Where to read, where to write, and how hard to compress.
///
/// `None` endpoints select standard input and standard output.
///
/// # Examples
///
/// ```rust
/// use fix_mate_cigar::Config;
///
/// let mut config = Config::new("in.bam", "-");
/// assert!(config.input.is_some());
/// assert!(config.output.is_none());
///
/// // Invalid levels leave the previous value in place
/// assert!(config.set_compression_level("9"));
/// assert!(!config.set_compression_level("fast"));
/// assert_eq!(config.compression_level.get(), 9);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub compression_level: CompressionLevel,
}
impl Config {
    pub fn new<I: AsRef<Path>, O: AsRef<Path>>(input: I, output: O) -> Self {
        Self {
            input: endpoint(input.as_ref()),
            output: endpoint(output.as_ref()),
            compression_level: CompressionLevel::default(),
        }
    }

    /// Applies a textual compression level, returning whether it was accepted.
    ///
    /// Values that are not integers in `0..=9` are ignored and the current
    /// level is kept.
    pub fn set_compression_level(&mut self, value: &str) -> bool {
        let level = value
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .and_then(CompressionLevel::new);
        match level {
            Some(level) => {
                self.compression_level = level;
                true
            }
            None => {
                log::debug!(
                    "Ignoring compression level {value:?}, keeping {}",
                    self.compression_level.get()
                );
                false
            }
        }
    }
}

fn endpoint(path: &Path) -> Option<PathBuf> {
    (path != Path::new(STDIO_PATH)).then(|| path.to_path_buf())
}
