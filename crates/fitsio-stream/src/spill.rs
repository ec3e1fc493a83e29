//! Memory-then-disk staging buffer for HDUs whose size is not known up front.

use std::io::{self, BufWriter, Seek, SeekFrom, Write};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::options::SpillOptions;

/// Append-only byte sink that keeps data in memory up to a threshold and
/// moves everything after that to a named temp file behind a `BufWriter`.
///
/// The temp file is deleted when the buffer is dropped.
#[derive(Debug)]
pub struct SpillBuffer {
    memory: Vec<u8>,
    file: Option<BufWriter<NamedTempFile>>,
    file_len: u64,
    options: SpillOptions,
}

impl SpillBuffer {
    pub fn new(options: SpillOptions) -> Self {
        SpillBuffer {
            memory: Vec::new(),
            file: None,
            file_len: 0,
            options,
        }
    }

    /// Total bytes written so far.
    pub fn len(&self) -> u64 {
        self.memory.len() as u64 + self.file_len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether data has overflowed to disk.
    pub fn is_spilled(&self) -> bool {
        self.file.is_some()
    }

    fn spill_file(&mut self) -> io::Result<&mut BufWriter<NamedTempFile>> {
        if self.file.is_none() {
            let mut builder = tempfile::Builder::new();
            builder.prefix("fits-spill-");
            let file = match &self.options.directory {
                Some(dir) => builder.tempfile_in(dir)?,
                None => builder.tempfile()?,
            };
            debug!(
                path = %file.path().display(),
                in_memory = self.memory.len(),
                threshold = self.options.threshold,
                "spilling buffered HDU data to disk"
            );
            self.file = Some(BufWriter::new(file));
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("spill file unavailable"))
    }

    /// Replay everything written, in order, into `target`.
    pub fn write_to<W: Write>(mut self, target: &mut W) -> io::Result<u64> {
        target.write_all(&self.memory)?;
        let mut total = self.memory.len() as u64;
        if let Some(writer) = self.file.take() {
            let mut file = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
            let handle = file.as_file_mut();
            handle.seek(SeekFrom::Start(0))?;
            total += io::copy(handle, target)?;
        }
        Ok(total)
    }
}

impl Write for SpillBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.file.is_none() && self.memory.len() + buf.len() < self.options.threshold {
            self.memory.extend_from_slice(buf);
            return Ok(buf.len());
        }
        let n = self.spill_file()?.write(buf)?;
        self.file_len += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}
