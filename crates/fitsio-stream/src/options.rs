//! Explicit configuration carried by a [`FitsFile`](crate::file::FitsFile).

use std::path::{Path, PathBuf};

use crate::endian::ByteOrder;

/// Size at which a buffered HDU write moves from memory to a temp file.
pub const DEFAULT_SPILL_THRESHOLD: usize = 1024 * 1024;

/// Where and when buffered HDU data leaves memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpillOptions {
    /// Cumulative byte count that triggers the switch to a temp file.
    pub threshold: usize,
    /// Directory for temp files; `None` uses the system temp directory.
    pub directory: Option<PathBuf>,
}

impl Default for SpillOptions {
    fn default() -> Self {
        SpillOptions {
            threshold: DEFAULT_SPILL_THRESHOLD,
            directory: None,
        }
    }
}

/// Options for reading or writing a FITS stream.
///
/// ```
/// use fitsio_stream::{ByteOrder, FitsOptions};
///
/// let options = FitsOptions::new()
///     .byte_order(ByteOrder::LittleEndian)
///     .buffering_allowed(true)
///     .spill_threshold(64 * 1024);
/// assert!(options.is_buffering_allowed());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FitsOptions {
    byte_order: ByteOrder,
    buffering_allowed: bool,
    spill: SpillOptions,
}

impl FitsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Byte order of binary data. FITS mandates big-endian.
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    /// Allow HDUs with an unknown row count to be staged until `mark_end`.
    pub fn buffering_allowed(mut self, allowed: bool) -> Self {
        self.buffering_allowed = allowed;
        self
    }

    pub fn spill_threshold(mut self, threshold: usize) -> Self {
        self.spill.threshold = threshold;
        self
    }

    pub fn spill_directory(mut self, directory: impl AsRef<Path>) -> Self {
        self.spill.directory = Some(directory.as_ref().to_path_buf());
        self
    }

    pub fn get_byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn is_buffering_allowed(&self) -> bool {
        self.buffering_allowed
    }

    pub fn spill(&self) -> &SpillOptions {
        &self.spill
    }
}
