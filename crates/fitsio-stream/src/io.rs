//! Position-tracking transport for FITS streams.
//!
//! [`FitsStream`] wraps any `std::io` stream, counts the bytes moved through
//! it, and knows how to reach the next 2880-byte block boundary: by forward
//! seeking on read ([`SkipForward`]) and by fill bytes on write.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom, Write};

use crate::block::{padding_len, BLOCK_SIZE, CARD_SIZE};
use crate::endian::BitConverter;
use crate::error::{Error, ProtocolError, Result};
use crate::options::FitsOptions;

/// Direction a [`FitsFile`](crate::file::FitsFile) was opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
}

// ── Forward seeking ──

/// A readable stream that can advance without returning the skipped bytes.
///
/// Seekable streams seek; forward-only streams read and discard.
pub trait SkipForward: Read {
    fn skip_forward(&mut self, n: u64) -> io::Result<()>;
}

fn discard<R: Read>(reader: &mut R, n: u64) -> io::Result<()> {
    let skipped = io::copy(&mut reader.take(n), &mut io::sink())?;
    if skipped < n {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    Ok(())
}

fn seek_offset(n: u64) -> io::Result<i64> {
    i64::try_from(n).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "skip too large"))
}

impl SkipForward for File {
    fn skip_forward(&mut self, n: u64) -> io::Result<()> {
        self.seek(SeekFrom::Current(seek_offset(n)?)).map(|_| ())
    }
}

impl<T: AsRef<[u8]>> SkipForward for Cursor<T> {
    fn skip_forward(&mut self, n: u64) -> io::Result<()> {
        self.seek(SeekFrom::Current(seek_offset(n)?)).map(|_| ())
    }
}

impl<R: Read + Seek> SkipForward for BufReader<R> {
    fn skip_forward(&mut self, n: u64) -> io::Result<()> {
        self.seek_relative(seek_offset(n)?)
    }
}

impl SkipForward for &[u8] {
    fn skip_forward(&mut self, n: u64) -> io::Result<()> {
        discard(self, n)
    }
}

/// Adapter for streams that cannot seek, such as decompressors or pipes.
#[derive(Debug)]
pub struct ForwardOnly<R>(pub R);

impl<R> ForwardOnly<R> {
    pub fn into_inner(self) -> R {
        self.0
    }
}

impl<R: Read> Read for ForwardOnly<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read> SkipForward for ForwardOnly<R> {
    fn skip_forward(&mut self, n: u64) -> io::Result<()> {
        discard(&mut self.0, n)
    }
}

// ── FitsStream ──

/// A stream plus the byte position, mode, codec and options of the file.
#[derive(Debug)]
pub struct FitsStream<S> {
    inner: S,
    position: u64,
    mode: FileMode,
    converter: BitConverter,
    options: FitsOptions,
}

impl<S> FitsStream<S> {
    pub fn new(inner: S, mode: FileMode, options: FitsOptions) -> Self {
        FitsStream {
            inner,
            position: 0,
            mode,
            converter: BitConverter::new(options.get_byte_order()),
            options,
        }
    }

    /// Bytes consumed or produced since the stream was wrapped.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    pub fn converter(&self) -> &BitConverter {
        &self.converter
    }

    pub fn options(&self) -> &FitsOptions {
        &self.options
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub(crate) fn require_mode(&self, mode: FileMode) -> Result<()> {
        if self.mode != mode {
            return Err(ProtocolError::WrongMode(mode).into());
        }
        Ok(())
    }
}

impl<S: Read> FitsStream<S> {
    /// Read one card image.
    ///
    /// Returns `Ok(false)` when the stream ends before the first byte of the
    /// card; running out of data part-way through is an error.
    pub fn read_card(&mut self, buf: &mut [u8; CARD_SIZE]) -> Result<bool> {
        let mut filled = 0;
        while filled < CARD_SIZE {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => return Err(Error::UnexpectedEof),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.position += CARD_SIZE as u64;
        Ok(true)
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }
}

impl<S: SkipForward> FitsStream<S> {
    /// Advance `n` bytes without reading them.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        if n > 0 {
            self.inner.skip_forward(n)?;
            self.position += n;
        }
        Ok(())
    }

    /// Advance to the next multiple of 2880 bytes.
    pub fn skip_block(&mut self) -> Result<()> {
        self.skip(padding_len(self.position) as u64)
    }
}

impl<S: Write> FitsStream<S> {
    /// Write `fill` bytes up to the next multiple of 2880 bytes.
    pub fn pad_block(&mut self, fill: u8) -> Result<()> {
        let n = padding_len(self.position);
        if n > 0 {
            let pad = [fill; BLOCK_SIZE];
            self.write_all(&pad[..n])?;
        }
        Ok(())
    }
}

impl<S: Write> Write for FitsStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
