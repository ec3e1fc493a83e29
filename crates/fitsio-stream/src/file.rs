//! Sequential access to the HDUs of one FITS stream.
//!
//! A [`FitsFile`] owns the stream and every HDU it has read or appended so
//! far. Only the most recent HDU can transfer data; moving on requires the
//! previous one to be finished (read path: skipped automatically; write path:
//! it must be [`HduState::Done`]).

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::ops::{Deref, DerefMut};
use std::path::Path;

use bytemuck::Pod;
use tracing::debug;

use crate::bintable::ColumnValue;
use crate::endian::Primitive;
use crate::error::{Error, ProtocolError, Result};
use crate::hdu::{Hdu, HduCore, HduState};
use crate::image::ImageStride;
use crate::io::{FileMode, FitsStream, SkipForward};
use crate::options::FitsOptions;

/// A FITS stream opened for reading or writing.
#[derive(Debug)]
pub struct FitsFile<S> {
    io: FitsStream<S>,
    hdus: Vec<Hdu>,
    cursor: Option<usize>,
}

impl<S> FitsFile<S> {
    fn with_stream(inner: S, mode: FileMode, options: FitsOptions) -> Self {
        FitsFile {
            io: FitsStream::new(inner, mode, options),
            hdus: Vec::new(),
            cursor: None,
        }
    }

    /// The `i`-th HDU read or appended so far.
    pub fn hdu(&self, i: usize) -> Option<&Hdu> {
        self.hdus.get(i)
    }

    /// Number of HDUs read or appended so far.
    pub fn len(&self) -> usize {
        self.hdus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hdus.is_empty()
    }

    pub fn mode(&self) -> FileMode {
        self.io.mode()
    }

    pub fn options(&self) -> &FitsOptions {
        self.io.options()
    }

    /// Byte offset in the underlying stream.
    pub fn position(&self) -> u64 {
        self.io.position()
    }

    /// Handle on the current HDU, if any.
    pub fn current(&mut self) -> Option<HduHandle<'_, S>> {
        let index = self.cursor?;
        Some(HduHandle {
            hdu: &mut self.hdus[index],
            io: &mut self.io,
        })
    }

    /// Give back the stream without any final checks.
    pub fn into_inner(self) -> S {
        self.io.into_inner()
    }
}

// ── Read path ──

impl<S: SkipForward> FitsFile<S> {
    pub fn open(reader: S, options: FitsOptions) -> Self {
        FitsFile::with_stream(reader, FileMode::Read, options)
    }

    /// Parse the next HDU header.
    ///
    /// The previous HDU's unread strides and padding are skipped first.
    /// Returns `Ok(None)` when the stream ends exactly where the next header
    /// would begin.
    pub fn read_next_hdu(&mut self) -> Result<Option<HduHandle<'_, S>>> {
        self.io.require_mode(FileMode::Read)?;
        if let Some(previous) = self.cursor {
            self.hdus[previous].core_mut().read_to_finish(&mut self.io)?;
        }

        let mut core = HduCore::new();
        if !core.read_header_or_eof(&mut self.io)? {
            debug!(hdus = self.hdus.len(), position = self.io.position(), "end of FITS stream");
            return Ok(None);
        }
        self.hdus.push(Hdu::from_core(core)?);
        let index = self.hdus.len() - 1;
        self.cursor = Some(index);
        Ok(Some(HduHandle {
            hdu: &mut self.hdus[index],
            io: &mut self.io,
        }))
    }

    /// Advance to the next 2880-byte boundary.
    pub fn skip_block(&mut self) -> Result<()> {
        self.io.skip_block()
    }
}

impl FitsFile<BufReader<File>> {
    pub fn open_path(path: impl AsRef<Path>, options: FitsOptions) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening FITS file");
        Ok(FitsFile::open(BufReader::new(File::open(path)?), options))
    }
}

// ── Write path ──

impl<S: Write> FitsFile<S> {
    pub fn create(writer: S, options: FitsOptions) -> Self {
        FitsFile::with_stream(writer, FileMode::Write, options)
    }

    /// Add an HDU after the last one and return a handle to write it.
    ///
    /// The previous HDU must be [`HduState::Done`] and the new one must not
    /// have been written yet.
    pub fn append(&mut self, hdu: impl Into<Hdu>) -> Result<HduHandle<'_, S>> {
        self.io.require_mode(FileMode::Write)?;
        if self.hdus.last().is_some_and(|h| h.state() != HduState::Done) {
            return Err(ProtocolError::PreviousHduUnfinished.into());
        }
        let hdu = hdu.into();
        if hdu.state() != HduState::Start {
            return Err(ProtocolError::HeaderAlreadyProcessed.into());
        }
        self.hdus.push(hdu);
        let index = self.hdus.len() - 1;
        self.cursor = Some(index);
        debug!(index, position = self.io.position(), "appending HDU");
        Ok(HduHandle {
            hdu: &mut self.hdus[index],
            io: &mut self.io,
        })
    }

    /// Write `fill` up to the next 2880-byte boundary.
    pub fn pad_block(&mut self, fill: u8) -> Result<()> {
        self.io.pad_block(fill)
    }

    /// Flush and return the stream. The last HDU must be finished.
    pub fn close(mut self) -> Result<S> {
        if self.io.mode() == FileMode::Write
            && self.hdus.last().is_some_and(|h| h.state() != HduState::Done)
        {
            return Err(ProtocolError::PreviousHduUnfinished.into());
        }
        self.io.flush()?;
        debug!(hdus = self.hdus.len(), bytes = self.io.position(), "closed FITS stream");
        Ok(self.io.into_inner())
    }
}

impl FitsFile<BufWriter<File>> {
    pub fn create_path(path: impl AsRef<Path>, options: FitsOptions) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "creating FITS file");
        Ok(FitsFile::create(BufWriter::new(File::create(path)?), options))
    }
}

// ── HduHandle ──

/// An HDU borrowed together with the stream it lives in.
///
/// Dereferences to [`Hdu`] for header access and forwards the stride
/// operations to the HDU's core.
#[derive(Debug)]
pub struct HduHandle<'a, S> {
    hdu: &'a mut Hdu,
    io: &'a mut FitsStream<S>,
}

impl<S> Deref for HduHandle<'_, S> {
    type Target = Hdu;

    fn deref(&self) -> &Hdu {
        self.hdu
    }
}

impl<S> DerefMut for HduHandle<'_, S> {
    fn deref_mut(&mut self) -> &mut Hdu {
        self.hdu
    }
}

impl<S> HduHandle<'_, S> {
    pub fn stride_buffer_mut(&mut self) -> Result<&mut [u8]> {
        self.hdu.core_mut().stride_buffer_mut()
    }
}

impl<S: SkipForward> HduHandle<'_, S> {
    pub fn read_stride(&mut self) -> Result<&[u8]> {
        self.hdu.core_mut().read_stride(self.io)
    }

    pub fn read_stride_values<T: Primitive + Pod>(&mut self) -> Result<Vec<T>> {
        self.hdu.core_mut().read_stride_values(self.io)
    }

    pub fn read_to_finish(&mut self) -> Result<()> {
        self.hdu.core_mut().read_to_finish(self.io)
    }

    /// Next table row; `None` after the last one.
    pub fn read_next_row(&mut self) -> Result<Option<Vec<ColumnValue>>> {
        match &mut *self.hdu {
            Hdu::BinaryTable(table) => table.read_next_row(self.io),
            _ => Err(Error::Unsupported("row access on a non-table HDU")),
        }
    }

    pub fn read_pixels(&mut self) -> Result<ImageStride> {
        match &mut *self.hdu {
            Hdu::Image(image) => image.read_pixels(self.io),
            _ => Err(Error::Unsupported("pixel access on a non-image HDU")),
        }
    }
}

impl<S: Write> HduHandle<'_, S> {
    pub fn write_header(&mut self) -> Result<()> {
        self.hdu.core_mut().write_header(self.io)
    }

    pub fn write_stride(&mut self) -> Result<()> {
        self.hdu.core_mut().write_stride(self.io)
    }

    pub fn write_stride_bytes(&mut self, stride: &[u8]) -> Result<()> {
        self.hdu.core_mut().write_stride_bytes(self.io, stride)
    }

    pub fn write_stride_values<T: Primitive + Pod>(&mut self, values: &[T]) -> Result<()> {
        self.hdu.core_mut().write_stride_values(self.io, values)
    }

    pub fn mark_end(&mut self) -> Result<()> {
        self.hdu.core_mut().mark_end(self.io)
    }

    pub fn write_next_row(&mut self, row: &[ColumnValue]) -> Result<()> {
        match &mut *self.hdu {
            Hdu::BinaryTable(table) => table.write_next_row(self.io, row),
            _ => Err(Error::Unsupported("row access on a non-table HDU")),
        }
    }

    pub fn write_pixels(&mut self, pixels: &ImageStride) -> Result<()> {
        match &mut *self.hdu {
            Hdu::Image(image) => image.write_pixels(self.io, pixels),
            _ => Err(Error::Unsupported("pixel access on a non-image HDU")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::bintable::{BinaryTableHdu, TableColumn};
    use crate::block::BLOCK_SIZE;
    use crate::datatype::{ElementKind, FitsDataType};
    use crate::hdu::SimpleHdu;
    use crate::image::ImageHdu;

    fn table(rows: usize) -> BinaryTableHdu {
        let mut table = BinaryTableHdu::new().unwrap();
        table
            .create_columns(vec![TableColumn::named("N", FitsDataType::scalar(ElementKind::Short))])
            .unwrap();
        table.set_row_count(rows).unwrap();
        table
    }

    fn two_hdu_file() -> Vec<u8> {
        let mut file = FitsFile::create(Vec::new(), FitsOptions::default());
        file.append(ImageHdu::primary(16, &[2, 2]).unwrap())
            .and_then(|mut h| {
                h.write_header()?;
                h.write_pixels(&ImageStride::I16(vec![1, 2]))?;
                h.write_pixels(&ImageStride::I16(vec![3, 4]))
            })
            .unwrap();
        let mut h = file.append(table(3)).unwrap();
        h.write_header().unwrap();
        for n in 0..3 {
            h.write_next_row(&[ColumnValue::Short(n)]).unwrap();
        }
        file.close().unwrap()
    }

    #[test]
    fn write_then_read_two_hdus() {
        let bytes = two_hdu_file();
        assert_eq!(bytes.len(), 4 * BLOCK_SIZE);

        let mut file = FitsFile::open(Cursor::new(bytes), FitsOptions::default());
        {
            let mut h = file.read_next_hdu().unwrap().unwrap();
            assert!(h.as_image().is_some());
            assert_eq!(h.read_pixels().unwrap(), ImageStride::I16(vec![1, 2]));
        }
        {
            let mut h = file.read_next_hdu().unwrap().unwrap();
            assert_eq!(h.as_table().unwrap().row_count().unwrap(), 3);
            let mut rows = Vec::new();
            while let Some(row) = h.read_next_row().unwrap() {
                rows.push(row);
            }
            assert_eq!(rows.len(), 3);
            assert_eq!(rows[2], [ColumnValue::Short(2)]);
        }
        assert!(file.read_next_hdu().unwrap().is_none());
        assert_eq!(file.len(), 2);
        assert_eq!(file.hdu(0).unwrap().state(), HduState::Done);
        assert_eq!(file.position(), 4 * BLOCK_SIZE as u64);
    }

    #[test]
    fn empty_stream_has_no_hdus() {
        let mut file = FitsFile::open(Cursor::new(Vec::new()), FitsOptions::default());
        assert!(file.read_next_hdu().unwrap().is_none());
        assert!(file.is_empty());
    }

    #[test]
    fn append_requires_finished_previous() {
        let mut file = FitsFile::create(Vec::new(), FitsOptions::default());
        file.append(table(2)).unwrap().write_header().unwrap();
        assert!(matches!(
            file.append(SimpleHdu::extension().unwrap()),
            Err(Error::Protocol(ProtocolError::PreviousHduUnfinished))
        ));
        assert!(matches!(
            file.close(),
            Err(Error::Protocol(ProtocolError::PreviousHduUnfinished))
        ));
    }

    #[test]
    fn append_rejects_written_hdu() {
        let mut stray = FitsStream::new(Vec::new(), FileMode::Write, FitsOptions::default());
        let mut hdu = SimpleHdu::primary().unwrap();
        hdu.core_mut().write_header(&mut stray).unwrap();

        let mut file = FitsFile::create(Vec::new(), FitsOptions::default());
        assert!(matches!(
            file.append(hdu),
            Err(Error::Protocol(ProtocolError::HeaderAlreadyProcessed))
        ));
    }

    #[test]
    fn mode_is_enforced() {
        let mut reader = FitsFile::open(Cursor::new(Vec::new()), FitsOptions::default());
        assert!(matches!(
            reader.append(SimpleHdu::primary().unwrap()),
            Err(Error::Protocol(ProtocolError::WrongMode(FileMode::Write)))
        ));

        let mut writer = FitsFile::create(Cursor::new(Vec::new()), FitsOptions::default());
        assert!(matches!(
            writer.read_next_hdu(),
            Err(Error::Protocol(ProtocolError::WrongMode(FileMode::Read)))
        ));
    }

    #[test]
    fn row_access_needs_a_table() {
        let mut file = FitsFile::create(Vec::new(), FitsOptions::default());
        let mut h = file.append(SimpleHdu::primary().unwrap()).unwrap();
        h.write_header().unwrap();
        assert!(matches!(
            h.write_next_row(&[ColumnValue::Short(1)]),
            Err(Error::Unsupported(_))
        ));
        assert_eq!(h.state(), HduState::Done);
    }

    #[test]
    fn current_tracks_last_hdu() {
        let mut file = FitsFile::open(Cursor::new(two_hdu_file()), FitsOptions::default());
        assert!(file.current().is_none());
        file.read_next_hdu().unwrap();
        file.read_next_hdu().unwrap();
        let h = file.current().unwrap();
        assert!(h.as_table().is_some());
    }

    #[test]
    fn path_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two.fits");
        std::fs::write(&path, two_hdu_file()).unwrap();

        let mut file = FitsFile::open_path(&path, FitsOptions::default()).unwrap();
        while file.read_next_hdu().unwrap().is_some() {}
        assert_eq!(file.len(), 2);

        let out = dir.path().join("copy.fits");
        let mut file = FitsFile::create_path(&out, FitsOptions::default()).unwrap();
        file.append(SimpleHdu::primary().unwrap())
            .unwrap()
            .write_header()
            .unwrap();
        file.close().unwrap();
        assert_eq!(std::fs::metadata(&out).unwrap().len(), BLOCK_SIZE as u64);
    }
}
