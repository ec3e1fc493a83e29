//! Image HDUs: primary arrays and `IMAGE` extensions, read and written one
//! line of pixels at a time.

use std::io::Write;

use crate::error::{Error, Result};
use crate::hdu::HduCore;
use crate::header::Card;
use crate::io::{FitsStream, SkipForward};

/// One stride of image pixels, typed by BITPIX.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageStride {
    U8(Vec<u8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl ImageStride {
    /// The BITPIX value matching this pixel type.
    pub fn bitpix(&self) -> i64 {
        match self {
            ImageStride::U8(_) => 8,
            ImageStride::I16(_) => 16,
            ImageStride::I32(_) => 32,
            ImageStride::I64(_) => 64,
            ImageStride::F32(_) => -32,
            ImageStride::F64(_) => -64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ImageStride::U8(v) => v.len(),
            ImageStride::I16(v) => v.len(),
            ImageStride::I32(v) => v.len(),
            ImageStride::I64(v) => v.len(),
            ImageStride::F32(v) => v.len(),
            ImageStride::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `BSCALE`/`BZERO`: `physical = bzero + bscale * raw`.
    pub fn to_physical(&self, bscale: f64, bzero: f64) -> Vec<f64> {
        let scale = |raw: f64| bzero + bscale * raw;
        match self {
            ImageStride::U8(v) => v.iter().map(|&x| scale(x as f64)).collect(),
            ImageStride::I16(v) => v.iter().map(|&x| scale(x as f64)).collect(),
            ImageStride::I32(v) => v.iter().map(|&x| scale(x as f64)).collect(),
            ImageStride::I64(v) => v.iter().map(|&x| scale(x as f64)).collect(),
            ImageStride::F32(v) => v.iter().map(|&x| scale(x as f64)).collect(),
            ImageStride::F64(v) => v.iter().map(|&x| scale(x)).collect(),
        }
    }
}

/// A primary array or `IMAGE` extension.
#[derive(Debug)]
pub struct ImageHdu {
    core: HduCore,
}

impl ImageHdu {
    /// Primary HDU: `SIMPLE = T`, `BITPIX`, `NAXIS`, `NAXISn`, `EXTEND = T`.
    pub fn primary(bitpix: i64, axes: &[usize]) -> Result<Self> {
        let mut core = HduCore::new();
        core.set_simple(true)?;
        Self::set_shape(&mut core, bitpix, axes)?;
        core.set_has_extension(true)?;
        Ok(ImageHdu { core })
    }

    /// `XTENSION = 'IMAGE'` with `PCOUNT = 0` and `GCOUNT = 1`.
    pub fn extension(bitpix: i64, axes: &[usize]) -> Result<Self> {
        let mut core = HduCore::new();
        core.set_extension("IMAGE")?;
        Self::set_shape(&mut core, bitpix, axes)?;
        core.cards_mut().set(Card::integer("PCOUNT", 0)?)?;
        core.cards_mut().set(Card::integer("GCOUNT", 1)?)?;
        Ok(ImageHdu { core })
    }

    fn set_shape(core: &mut HduCore, bitpix: i64, axes: &[usize]) -> Result<()> {
        core.set_bits_per_pixel(bitpix)?;
        core.set_axis_count(axes.len())?;
        for (i, &len) in axes.iter().enumerate() {
            core.set_axis_length(i + 1, len)?;
        }
        Ok(())
    }

    /// Wrap a core whose header has been read.
    pub fn from_core(core: HduCore) -> Result<Self> {
        core.bits_per_pixel()?;
        core.axis_count()?;
        Ok(ImageHdu { core })
    }

    pub fn core(&self) -> &HduCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut HduCore {
        &mut self.core
    }

    pub fn bitpix(&self) -> Result<i64> {
        self.core.bits_per_pixel()
    }

    /// Axis lengths, `NAXIS1` first.
    pub fn shape(&self) -> Result<Vec<usize>> {
        self.core.axes()
    }

    /// `(BSCALE, BZERO)`, defaulting to `(1.0, 0.0)`.
    pub fn scaling(&self) -> (f64, f64) {
        let cards = self.core.cards();
        let bscale = cards
            .try_get("BSCALE")
            .and_then(|c| c.get_f64().ok())
            .unwrap_or(1.0);
        let bzero = cards
            .try_get("BZERO")
            .and_then(|c| c.get_f64().ok())
            .unwrap_or(0.0);
        (bscale, bzero)
    }

    /// `BLANK`: the raw integer marking undefined pixels.
    pub fn blank(&self) -> Option<i64> {
        self.core
            .cards()
            .try_get("BLANK")
            .and_then(|c| c.get_i64().ok())
    }

    /// Set `BSCALE`/`BZERO` before the header is written.
    pub fn set_scaling(&mut self, bscale: f64, bzero: f64) -> Result<()> {
        let cards = self.core.cards_mut();
        cards.set(Card::float("BSCALE", bscale)?)?;
        cards.set(Card::float("BZERO", bzero)?)
    }

    /// Read the next line of pixels.
    pub fn read_pixels<S: SkipForward>(&mut self, io: &mut FitsStream<S>) -> Result<ImageStride> {
        Ok(match self.bitpix()? {
            8 => ImageStride::U8(self.core.read_stride_values(io)?),
            16 => ImageStride::I16(self.core.read_stride_values(io)?),
            32 => ImageStride::I32(self.core.read_stride_values(io)?),
            64 => ImageStride::I64(self.core.read_stride_values(io)?),
            -32 => ImageStride::F32(self.core.read_stride_values(io)?),
            -64 => ImageStride::F64(self.core.read_stride_values(io)?),
            other => return Err(Error::InvalidBitpix(other)),
        })
    }

    /// Write the next line of pixels. The pixel type must match BITPIX.
    pub fn write_pixels<S: Write>(
        &mut self,
        io: &mut FitsStream<S>,
        pixels: &ImageStride,
    ) -> Result<()> {
        let bitpix = self.bitpix()?;
        if pixels.bitpix() != bitpix {
            return Err(Error::InvalidBitpix(pixels.bitpix()));
        }
        match pixels {
            ImageStride::U8(v) => self.core.write_stride_values(io, v),
            ImageStride::I16(v) => self.core.write_stride_values(io, v),
            ImageStride::I32(v) => self.core.write_stride_values(io, v),
            ImageStride::I64(v) => self.core.write_stride_values(io, v),
            ImageStride::F32(v) => self.core.write_stride_values(io, v),
            ImageStride::F64(v) => self.core.write_stride_values(io, v),
        }
    }
}
