//! The per-HDU read/write state machine.
//!
//! Every HDU kind wraps one [`HduCore`], which owns the header cards, the
//! stride counters, the reusable stride buffer and, while buffering, the
//! spill buffer. The core moves through [`HduState`] strictly forward:
//!
//! ```text
//! Start -> Header -> Strides -> Done
//!   \                  ^
//!    `-> Buffering ----'   (write path, unknown row count)
//! ```
//!
//! A stride is one row of a table or one innermost-axis line of an image:
//! `|BITPIX| / 8 * NAXIS1` bytes. An HDU holds `NAXIS2 * ... * NAXISn`
//! strides.

use std::io::Write;

use bytemuck::Pod;
use tracing::{debug, trace};

use crate::bintable::BinaryTableHdu;
use crate::block::{DATA_PAD_BYTE, HEADER_PAD_BYTE};
use crate::cards::CardCollection;
use crate::endian::Primitive;
use crate::error::{Error, ProtocolError, Result};
use crate::header::Card;
use crate::image::ImageHdu;
use crate::io::{FileMode, FitsStream, SkipForward};
use crate::spill::SpillBuffer;

/// Position of an HDU in its read/write protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HduState {
    /// Created or opened; the header may still be edited.
    Start,
    /// The header is being read or written.
    Header,
    /// Header done; strides are being transferred.
    Strides,
    /// Write path only: strides are staged until `mark_end`.
    Buffering,
    /// All data transferred and padded.
    Done,
}

/// Check that `bitpix` is one of the values FITS allows.
pub fn validate_bitpix(bitpix: i64) -> Result<i64> {
    match bitpix {
        8 | 16 | 32 | 64 | -32 | -64 => Ok(bitpix),
        other => Err(Error::InvalidBitpix(other)),
    }
}

fn to_usize(card: &Card) -> Result<usize> {
    let n = card.get_i64()?;
    usize::try_from(n).map_err(|_| Error::invalid_value(card.keyword(), &n.to_string()))
}

// ── HduCore ──

/// State shared by every HDU kind.
#[derive(Debug)]
pub struct HduCore {
    cards: CardCollection,
    state: HduState,
    header_position: Option<u64>,
    data_position: Option<u64>,
    stride_buffer: Option<Vec<u8>>,
    total_strides: usize,
    stride_counter: usize,
    long_strings: bool,
    spill: Option<SpillBuffer>,
}

impl Default for HduCore {
    fn default() -> Self {
        HduCore::new()
    }
}

impl HduCore {
    pub fn new() -> Self {
        HduCore {
            cards: CardCollection::new(),
            state: HduState::Start,
            header_position: None,
            data_position: None,
            stride_buffer: None,
            total_strides: 0,
            stride_counter: 0,
            long_strings: false,
            spill: None,
        }
    }

    pub fn cards(&self) -> &CardCollection {
        &self.cards
    }

    /// Mutable access to the header. Changes are rejected once the HDU has
    /// left [`HduState::Start`].
    pub fn cards_mut(&mut self) -> &mut CardCollection {
        &mut self.cards
    }

    pub fn state(&self) -> HduState {
        self.state
    }

    /// Stream offset of the first header card, once known.
    pub fn header_position(&self) -> Option<u64> {
        self.header_position
    }

    /// Stream offset of the first data byte, once known.
    pub fn data_position(&self) -> Option<u64> {
        self.data_position
    }

    pub fn total_strides(&self) -> usize {
        self.total_strides
    }

    /// Strides transferred so far.
    pub fn stride_counter(&self) -> usize {
        self.stride_counter
    }

    pub fn has_more_strides(&self) -> bool {
        self.state == HduState::Strides && self.stride_counter < self.total_strides
    }

    /// Whether the OGIP long-string convention is in use.
    pub fn long_strings_enabled(&self) -> bool {
        self.long_strings
    }

    // ── Structural keywords ──

    pub fn is_simple(&self) -> bool {
        self.cards
            .try_get("SIMPLE")
            .is_some_and(|c| c.get_bool().unwrap_or(false))
    }

    /// `XTENSION` value, if present.
    pub fn extension(&self) -> Option<String> {
        self.cards
            .try_get("XTENSION")
            .and_then(|c| c.get_string().ok())
            .map(|s| s.trim().to_string())
    }

    /// `EXTNAME` value, if present.
    pub fn extension_name(&self) -> Option<String> {
        self.cards
            .try_get("EXTNAME")
            .and_then(|c| c.get_string().ok())
    }

    pub fn axis_count(&self) -> Result<usize> {
        to_usize(self.cards.get("NAXIS")?)
    }

    /// Length of axis `axis` (1-based).
    pub fn axis_length(&self, axis: usize) -> Result<usize> {
        to_usize(self.cards.get_indexed("NAXIS", axis)?)
    }

    /// All axis lengths, `NAXIS1` first.
    pub fn axes(&self) -> Result<Vec<usize>> {
        (1..=self.axis_count()?).map(|i| self.axis_length(i)).collect()
    }

    pub fn bits_per_pixel(&self) -> Result<i64> {
        validate_bitpix(self.cards.get("BITPIX")?.get_i64()?)
    }

    /// `EXTEND = T`
    pub fn has_extension(&self) -> bool {
        self.cards
            .try_get("EXTEND")
            .is_some_and(|c| c.get_bool().unwrap_or(false))
    }

    pub fn set_simple(&mut self, simple: bool) -> Result<()> {
        self.cards.set(Card::logical("SIMPLE", simple)?)
    }

    pub fn set_extension(&mut self, xtension: &str) -> Result<()> {
        self.cards.set(Card::string("XTENSION", xtension)?)
    }

    pub fn set_extension_name(&mut self, name: &str) -> Result<()> {
        self.cards.set(Card::string("EXTNAME", name)?)
    }

    pub fn set_axis_count(&mut self, count: usize) -> Result<()> {
        self.cards.set(Card::integer("NAXIS", count as i64)?)
    }

    pub fn set_axis_length(&mut self, axis: usize, length: usize) -> Result<()> {
        self.cards
            .set(Card::integer(&format!("NAXIS{axis}"), length as i64)?)
    }

    pub fn set_bits_per_pixel(&mut self, bitpix: i64) -> Result<()> {
        self.cards
            .set(Card::integer("BITPIX", validate_bitpix(bitpix)?)?)
    }

    pub fn set_has_extension(&mut self, extend: bool) -> Result<()> {
        self.cards.set(Card::logical("EXTEND", extend)?)
    }

    /// Write a string value using `CONTINUE` cards when it does not fit one
    /// card.
    pub fn set_long_string(&mut self, keyword: &str, value: &str) -> Result<()> {
        self.cards.set_long_string(keyword, value)?;
        self.long_strings = true;
        Ok(())
    }

    /// Read a string value, following `CONTINUE` cards.
    pub fn long_string(&self, keyword: &str) -> Result<String> {
        self.cards.long_string(keyword)
    }

    /// Bytes per stride: `|BITPIX| / 8 * NAXIS1`, zero without axes.
    pub fn stride_length(&self) -> Result<usize> {
        if self.axis_count()? == 0 {
            return Ok(0);
        }
        let bytes = self.bits_per_pixel()?.unsigned_abs() as usize / 8;
        let naxis1 = self.axis_length(1)?;
        bytes
            .checked_mul(naxis1)
            .ok_or_else(|| Error::invalid_value("NAXIS1", &naxis1.to_string()))
    }

    /// `NAXIS2 * ... * NAXISn`, zero without axes.
    pub fn compute_total_strides(&self) -> Result<usize> {
        let naxis = self.axis_count()?;
        if naxis == 0 {
            return Ok(0);
        }
        (2..=naxis).try_fold(1usize, |acc, i| {
            let length = self.axis_length(i)?;
            acc.checked_mul(length)
                .ok_or_else(|| Error::invalid_value(&format!("NAXIS{i}"), &length.to_string()))
        })
    }

    /// The reusable stride buffer, allocated on first use.
    pub fn stride_buffer_mut(&mut self) -> Result<&mut [u8]> {
        self.ensure_stride_buffer()?;
        Ok(self.stride_buffer.as_deref_mut().unwrap_or_default())
    }

    fn ensure_stride_buffer(&mut self) -> Result<()> {
        if self.stride_buffer.is_none() {
            self.stride_buffer = Some(vec![0u8; self.stride_length()?]);
        }
        Ok(())
    }

    fn value_width<T: Primitive>(&self) -> Result<()> {
        let bytes = self.bits_per_pixel()?.unsigned_abs() as usize / 8;
        if bytes != T::WIDTH {
            return Err(Error::StrideLength {
                expected: bytes,
                actual: T::WIDTH,
            });
        }
        Ok(())
    }

    // ── Read path ──

    /// Read the header from the current stream position.
    pub fn read_header<S: SkipForward>(&mut self, io: &mut FitsStream<S>) -> Result<()> {
        if self.read_header_or_eof(io)? {
            Ok(())
        } else {
            Err(Error::UnexpectedEof)
        }
    }

    /// Like [`HduCore::read_header`], but returns `Ok(false)` when the stream
    /// ends exactly where the header would start.
    pub(crate) fn read_header_or_eof<S: SkipForward>(
        &mut self,
        io: &mut FitsStream<S>,
    ) -> Result<bool> {
        io.require_mode(FileMode::Read)?;
        if self.state != HduState::Start {
            return Err(ProtocolError::HeaderAlreadyProcessed.into());
        }

        let header_position = io.position();
        let mut raw = [0u8; crate::block::CARD_SIZE];
        if !io.read_card(&mut raw)? {
            return Ok(false);
        }
        self.state = HduState::Header;
        loop {
            let card = Card::parse(&raw)?;
            if card.is_end() {
                break;
            }
            if card.keyword() == "LONGSTRN" {
                self.long_strings = true;
            }
            if let Err(Error::DuplicateKeyword(_)) = self.cards.add_unchecked(card.clone()) {
                debug!(keyword = card.keyword(), "duplicate keyword, keeping the last value");
                self.cards.set_unchecked(card)?;
            }
            if !io.read_card(&mut raw)? {
                return Err(Error::UnexpectedEof);
            }
        }
        io.skip_block()?;

        self.header_position = Some(header_position);
        self.data_position = Some(io.position());
        self.total_strides = self.compute_total_strides()?;
        self.stride_counter = 0;
        self.cards.lock();
        self.state = HduState::Strides;
        debug!(
            cards = self.cards.len(),
            header_position,
            data_position = io.position(),
            total_strides = self.total_strides,
            "read HDU header"
        );
        Ok(true)
    }

    /// Read the next stride into the stride buffer and return it.
    pub fn read_stride<S: SkipForward>(&mut self, io: &mut FitsStream<S>) -> Result<&[u8]> {
        io.require_mode(FileMode::Read)?;
        match self.state {
            HduState::Strides => {}
            HduState::Start | HduState::Header => {
                return Err(ProtocolError::HeaderNotProcessed.into())
            }
            HduState::Buffering | HduState::Done => return Err(ProtocolError::NoMoreStrides.into()),
        }
        if self.stride_counter >= self.total_strides {
            return Err(ProtocolError::NoMoreStrides.into());
        }
        self.ensure_stride_buffer()?;
        let buffer = self.stride_buffer.as_deref_mut().unwrap_or_default();
        io.read_exact(buffer)?;
        self.stride_counter += 1;
        if self.stride_counter == self.total_strides {
            io.skip_block()?;
            self.state = HduState::Done;
        }
        Ok(self.stride_buffer.as_deref().unwrap_or_default())
    }

    /// Read the next stride as values of the pixel type.
    pub fn read_stride_values<T, S>(&mut self, io: &mut FitsStream<S>) -> Result<Vec<T>>
    where
        T: Primitive + Pod,
        S: SkipForward,
    {
        self.value_width::<T>()?;
        let converter = *io.converter();
        let stride = self.read_stride(io)?;
        let (values, _) = converter.decode_pod_array::<T>(stride, 0, stride.len() / T::WIDTH);
        Ok(values)
    }

    /// Skip all unread strides and the trailing padding.
    pub fn read_to_finish<S: SkipForward>(&mut self, io: &mut FitsStream<S>) -> Result<()> {
        io.require_mode(FileMode::Read)?;
        match self.state {
            HduState::Done => return Ok(()),
            HduState::Strides => {}
            _ => return Err(ProtocolError::HeaderNotProcessed.into()),
        }
        let remaining = (self.total_strides - self.stride_counter) as u64;
        let stride_length = self.stride_length()?;
        let skip = remaining
            .checked_mul(stride_length as u64)
            .ok_or_else(|| Error::invalid_value("NAXIS1", &stride_length.to_string()))?;
        io.skip(skip)?;
        io.skip_block()?;
        self.stride_counter = self.total_strides;
        self.state = HduState::Done;
        Ok(())
    }

    // ── Write path ──

    /// Write the header, or start buffering when the stride count is still
    /// unknown and the file allows it.
    pub fn write_header<S: Write>(&mut self, io: &mut FitsStream<S>) -> Result<()> {
        io.require_mode(FileMode::Write)?;
        if self.state != HduState::Start {
            return Err(ProtocolError::HeaderAlreadyProcessed.into());
        }
        self.bits_per_pixel()?;
        let total = self.compute_total_strides()?;
        if self.axis_count()? > 0 && total == 0 && io.options().is_buffering_allowed() {
            debug!(
                threshold = io.options().spill().threshold,
                "row count unknown, buffering HDU data"
            );
            self.spill = Some(SpillBuffer::new(io.options().spill().clone()));
            self.cards.lock();
            self.stride_counter = 0;
            self.state = HduState::Buffering;
            return Ok(());
        }
        self.emit_header(io)
    }

    fn emit_header<S: Write>(&mut self, io: &mut FitsStream<S>) -> Result<()> {
        self.state = HduState::Header;
        if !self.cards.contains("END") {
            self.cards.add_unchecked(Card::end())?;
        }
        self.cards.sort_unchecked();
        self.cards.lock();

        let header_position = io.position();
        for card in self.cards.iter() {
            io.write_all(&card.to_bytes()?)?;
        }
        io.pad_block(HEADER_PAD_BYTE)?;

        self.header_position = Some(header_position);
        self.data_position = Some(io.position());
        self.total_strides = self.compute_total_strides()?;
        self.stride_counter = 0;
        self.state = if self.total_strides == 0 {
            HduState::Done
        } else {
            HduState::Strides
        };
        debug!(
            cards = self.cards.len(),
            header_position,
            data_position = io.position(),
            total_strides = self.total_strides,
            "wrote HDU header"
        );
        Ok(())
    }

    /// Write the stride buffer as the next stride.
    pub fn write_stride<S: Write>(&mut self, io: &mut FitsStream<S>) -> Result<()> {
        io.require_mode(FileMode::Write)?;
        match self.state {
            HduState::Strides if self.stride_counter >= self.total_strides => {
                return Err(ProtocolError::NoMoreStrides.into())
            }
            HduState::Strides | HduState::Buffering => {}
            HduState::Start | HduState::Header => {
                return Err(ProtocolError::HeaderNotProcessed.into())
            }
            HduState::Done => return Err(ProtocolError::NoMoreStrides.into()),
        }
        self.ensure_stride_buffer()?;
        let buffer = self.stride_buffer.as_deref().unwrap_or_default();
        match self.spill.as_mut() {
            Some(spill) => spill.write_all(buffer)?,
            None => io.write_all(buffer)?,
        }
        self.stride_counter += 1;
        if self.state == HduState::Strides && self.stride_counter == self.total_strides {
            io.pad_block(DATA_PAD_BYTE)?;
            self.state = HduState::Done;
        }
        Ok(())
    }

    /// Copy `stride` into the stride buffer and write it.
    pub fn write_stride_bytes<S: Write>(
        &mut self,
        io: &mut FitsStream<S>,
        stride: &[u8],
    ) -> Result<()> {
        let buffer = self.stride_buffer_mut()?;
        if buffer.len() != stride.len() {
            return Err(Error::StrideLength {
                expected: buffer.len(),
                actual: stride.len(),
            });
        }
        buffer.copy_from_slice(stride);
        self.write_stride(io)
    }

    /// Encode `values` into the stride buffer and write it.
    pub fn write_stride_values<T, S>(&mut self, io: &mut FitsStream<S>, values: &[T]) -> Result<()>
    where
        T: Primitive + Pod,
        S: Write,
    {
        self.value_width::<T>()?;
        let converter = *io.converter();
        let buffer = self.stride_buffer_mut()?;
        let needed = values.len() * T::WIDTH;
        if buffer.len() != needed {
            return Err(Error::StrideLength {
                expected: buffer.len(),
                actual: needed,
            });
        }
        converter.encode_pod_array(values, buffer, 0);
        self.write_stride(io)
    }

    /// Finish a written HDU.
    ///
    /// While buffering, the unknown axis length is filled in from the number
    /// of strides written, the header is emitted and the staged data is
    /// replayed. After a direct write, every declared stride must have been
    /// written.
    pub fn mark_end<S: Write>(&mut self, io: &mut FitsStream<S>) -> Result<()> {
        io.require_mode(FileMode::Write)?;
        match self.state {
            HduState::Buffering => {}
            HduState::Strides => {
                return Err(ProtocolError::IncompleteData {
                    written: self.stride_counter,
                    declared: self.total_strides,
                }
                .into())
            }
            _ => return Err(ProtocolError::CannotMarkEnd.into()),
        }
        let written = self.stride_counter;
        if written == 0 {
            return Err(ProtocolError::AxisLengthNotSet.into());
        }
        self.backfill_axis(written)?;

        let spill = self.spill.take();
        self.emit_header(io)?;
        if let Some(spill) = spill {
            let replayed = spill.write_to(io)?;
            debug!(strides = written, bytes = replayed, "flushed buffered HDU data");
        }
        io.pad_block(DATA_PAD_BYTE)?;
        self.stride_counter = written;
        self.state = HduState::Done;
        Ok(())
    }

    fn backfill_axis(&mut self, written: usize) -> Result<()> {
        let naxis = self.axis_count()?;
        let mut unknown = None;
        let mut known = 1usize;
        for axis in 2..=naxis {
            match self.axis_length(axis)? {
                0 if unknown.is_none() => unknown = Some(axis),
                0 => return Err(ProtocolError::AxisLengthNotSet.into()),
                n => {
                    known = known.checked_mul(n).ok_or_else(|| {
                        Error::invalid_value(&format!("NAXIS{axis}"), &n.to_string())
                    })?
                }
            }
        }
        let axis = unknown.ok_or(ProtocolError::AxisLengthNotSet)?;
        if written % known != 0 {
            return Err(ProtocolError::IncompleteData {
                written,
                declared: written.next_multiple_of(known),
            }
            .into());
        }
        trace!(axis, length = written / known, "back-filling axis length");
        self.cards
            .set_unchecked(Card::integer(&format!("NAXIS{axis}"), (written / known) as i64)?)
    }
}

// ── HDU kinds ──

/// A generic HDU without data: an empty primary array or a placeholder
/// extension.
#[derive(Debug)]
pub struct SimpleHdu {
    core: HduCore,
}

impl SimpleHdu {
    /// `SIMPLE = T`, `BITPIX = 8`, `NAXIS = 0`, `EXTEND = T`.
    pub fn primary() -> Result<Self> {
        let mut core = HduCore::new();
        core.set_simple(true)?;
        core.set_bits_per_pixel(8)?;
        core.set_axis_count(0)?;
        core.set_has_extension(true)?;
        Ok(SimpleHdu { core })
    }

    /// `XTENSION = ''`, `BITPIX = 8`, `NAXIS = 0`.
    pub fn extension() -> Result<Self> {
        let mut core = HduCore::new();
        core.set_extension("")?;
        core.set_bits_per_pixel(8)?;
        core.set_axis_count(0)?;
        Ok(SimpleHdu { core })
    }

    pub fn from_core(core: HduCore) -> Self {
        SimpleHdu { core }
    }

    pub fn core(&self) -> &HduCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut HduCore {
        &mut self.core
    }
}

/// One header-data unit of any supported kind.
#[derive(Debug)]
pub enum Hdu {
    Raw(SimpleHdu),
    Image(ImageHdu),
    BinaryTable(BinaryTableHdu),
}

impl Hdu {
    /// Pick the HDU kind from a freshly read header.
    pub(crate) fn from_core(core: HduCore) -> Result<Self> {
        if core.cards().contains("SIMPLE") {
            trace!("primary HDU");
            return Ok(Hdu::Image(ImageHdu::from_core(core)?));
        }
        let Some(xtension) = core.extension() else {
            return Err(Error::MissingKeyword("XTENSION".into()));
        };
        trace!(xtension = xtension.as_str(), "extension HDU");
        match xtension.as_str() {
            "IMAGE" => Ok(Hdu::Image(ImageHdu::from_core(core)?)),
            "BINTABLE" => Ok(Hdu::BinaryTable(BinaryTableHdu::from_core(core)?)),
            _ => Err(Error::UnsupportedExtension(xtension)),
        }
    }

    pub fn core(&self) -> &HduCore {
        match self {
            Hdu::Raw(h) => h.core(),
            Hdu::Image(h) => h.core(),
            Hdu::BinaryTable(h) => h.core(),
        }
    }

    pub fn core_mut(&mut self) -> &mut HduCore {
        match self {
            Hdu::Raw(h) => h.core_mut(),
            Hdu::Image(h) => h.core_mut(),
            Hdu::BinaryTable(h) => h.core_mut(),
        }
    }

    pub fn state(&self) -> HduState {
        self.core().state()
    }

    pub fn cards(&self) -> &CardCollection {
        self.core().cards()
    }

    pub fn as_image(&self) -> Option<&ImageHdu> {
        match self {
            Hdu::Image(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_image_mut(&mut self) -> Option<&mut ImageHdu> {
        match self {
            Hdu::Image(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&BinaryTableHdu> {
        match self {
            Hdu::BinaryTable(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_table_mut(&mut self) -> Option<&mut BinaryTableHdu> {
        match self {
            Hdu::BinaryTable(h) => Some(h),
            _ => None,
        }
    }
}

impl From<SimpleHdu> for Hdu {
    fn from(hdu: SimpleHdu) -> Self {
        Hdu::Raw(hdu)
    }
}

impl From<ImageHdu> for Hdu {
    fn from(hdu: ImageHdu) -> Self {
        Hdu::Image(hdu)
    }
}

impl From<BinaryTableHdu> for Hdu {
    fn from(hdu: BinaryTableHdu) -> Self {
        Hdu::BinaryTable(hdu)
    }
}
