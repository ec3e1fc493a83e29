//! Binary table extensions (`XTENSION = 'BINTABLE'`), read and written one
//! row at a time.
//!
//! Each row is one stride of `NAXIS1` bytes; columns sit back to back in
//! `TFIELDS` order with no padding between them. Values are exchanged as
//! [`ColumnValue`]s holding the stored (unscaled) numbers; apply
//! [`FitsDataType::physical`] for `TSCALn`/`TZEROn`.

use std::io::Write;

use crate::cards::CardCollection;
use crate::datatype::{ElementKind, FitsDataType};
use crate::endian::{BitConverter, Primitive};
use crate::error::{Error, ProtocolError, Result};
use crate::hdu::{HduCore, HduState};
use crate::header::Card;
use crate::io::{FitsStream, SkipForward};

/// Per-column keyword families, cleared when columns are redefined.
const COLUMN_KEYWORDS: [&str; 7] = ["TTYPE", "TFORM", "TUNIT", "TNULL", "TSCAL", "TZERO", "TDISP"];

fn is_column_keyword(keyword: &str) -> bool {
    COLUMN_KEYWORDS.iter().any(|family| {
        keyword
            .strip_prefix(family)
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
    })
}

// ── Columns ──

/// One column of a binary table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableColumn {
    /// 1-based position, assigned by [`BinaryTableHdu::create_columns`].
    pub index: usize,
    /// `TTYPEn`
    pub name: Option<String>,
    /// `TFORMn` plus `TNULLn`, `TSCALn` and `TZEROn`.
    pub data_type: FitsDataType,
    /// `TUNITn`
    pub unit: Option<String>,
    /// `TDISPn`
    pub format: Option<String>,
}

impl TableColumn {
    pub fn new(data_type: FitsDataType) -> Self {
        TableColumn {
            index: 0,
            name: None,
            data_type,
            unit: None,
            format: None,
        }
    }

    pub fn named(name: &str, data_type: FitsDataType) -> Self {
        TableColumn {
            name: Some(name.to_string()),
            ..TableColumn::new(data_type)
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn with_format(mut self, tdisp: &str) -> Self {
        self.format = Some(tdisp.to_string());
        self
    }

    pub fn byte_width(&self) -> usize {
        self.data_type.byte_width()
    }

    /// The keyword family describing this column.
    pub fn to_cards(&self) -> Result<Vec<Card>> {
        let n = self.index;
        let dt = &self.data_type;
        let mut cards = Vec::new();
        if let Some(name) = &self.name {
            cards.push(Card::string(&format!("TTYPE{n}"), name)?);
        }
        cards.push(Card::string(&format!("TFORM{n}"), &dt.tform())?);
        if let Some(unit) = &self.unit {
            cards.push(Card::string(&format!("TUNIT{n}"), unit)?);
        }
        if let Some(null) = dt.null_value.filter(|_| dt.kind.is_integer()) {
            cards.push(Card::integer(&format!("TNULL{n}"), null)?);
        }
        if dt.is_scaled() {
            cards.push(Card::float(&format!("TSCAL{n}"), dt.scale)?);
            cards.push(Card::float(&format!("TZERO{n}"), dt.zero)?);
        }
        if let Some(format) = &self.format {
            cards.push(Card::string(&format!("TDISP{n}"), format)?);
        }
        Ok(cards)
    }

    /// Rebuild column `index` from its keyword family.
    pub fn from_cards(cards: &CardCollection, index: usize) -> Result<Self> {
        let string = |family: &str| -> Result<Option<String>> {
            cards
                .try_get_indexed(family, index)
                .map(Card::get_string)
                .transpose()
        };
        let float = |family: &str| -> Result<Option<f64>> {
            cards
                .try_get_indexed(family, index)
                .map(Card::get_f64)
                .transpose()
        };

        let mut data_type = FitsDataType::parse_tform(&cards.get_indexed("TFORM", index)?.get_string()?)?;
        data_type.null_value = cards
            .try_get_indexed("TNULL", index)
            .map(Card::get_i64)
            .transpose()?;
        data_type.scale = float("TSCAL")?.unwrap_or(1.0);
        data_type.zero = float("TZERO")?.unwrap_or(0.0);

        Ok(TableColumn {
            index,
            name: string("TTYPE")?,
            data_type,
            unit: string("TUNIT")?,
            format: string("TDISP")?,
        })
    }
}

// ── Values ──

/// One cell of a table row.
///
/// Columns with repeat count 1 use the scalar variants, all others the array
/// variants. `A` columns are always [`ColumnValue::Ascii`] and `X` columns
/// always [`ColumnValue::Bit`] holding the packed bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Logical(bool),
    Byte(u8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ComplexFloat(f32, f32),
    ComplexDouble(f64, f64),
    Ascii(String),
    Bit(Vec<u8>),
    LogicalArray(Vec<bool>),
    ByteArray(Vec<u8>),
    ShortArray(Vec<i16>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
    ComplexFloatArray(Vec<(f32, f32)>),
    ComplexDoubleArray(Vec<(f64, f64)>),
}

fn decode_value(conv: &BitConverter, dt: &FitsDataType, bytes: &[u8]) -> ColumnValue {
    let n = dt.repeat;
    let scalar = n == 1;
    match dt.kind {
        ElementKind::Ascii => ColumnValue::Ascii(conv.decode_str(bytes, 0, n).0),
        ElementKind::Bit => ColumnValue::Bit(bytes.to_vec()),
        ElementKind::Logical if scalar => ColumnValue::Logical(conv.decode(bytes, 0).0),
        ElementKind::Logical => ColumnValue::LogicalArray(conv.decode_array(bytes, 0, n).0),
        ElementKind::Byte if scalar => ColumnValue::Byte(bytes[0]),
        ElementKind::Byte => ColumnValue::ByteArray(bytes.to_vec()),
        ElementKind::Short if scalar => ColumnValue::Short(conv.decode(bytes, 0).0),
        ElementKind::Short => ColumnValue::ShortArray(conv.decode_array(bytes, 0, n).0),
        ElementKind::Int if scalar => ColumnValue::Int(conv.decode(bytes, 0).0),
        ElementKind::Int => ColumnValue::IntArray(conv.decode_array(bytes, 0, n).0),
        ElementKind::Long if scalar => ColumnValue::Long(conv.decode(bytes, 0).0),
        ElementKind::Long => ColumnValue::LongArray(conv.decode_array(bytes, 0, n).0),
        ElementKind::Float if scalar => ColumnValue::Float(conv.decode(bytes, 0).0),
        ElementKind::Float => ColumnValue::FloatArray(conv.decode_array(bytes, 0, n).0),
        ElementKind::Double if scalar => ColumnValue::Double(conv.decode(bytes, 0).0),
        ElementKind::Double => ColumnValue::DoubleArray(conv.decode_array(bytes, 0, n).0),
        ElementKind::ComplexFloat if scalar => {
            let ((re, im), _) = conv.decode(bytes, 0);
            ColumnValue::ComplexFloat(re, im)
        }
        ElementKind::ComplexFloat => {
            ColumnValue::ComplexFloatArray(conv.decode_array(bytes, 0, n).0)
        }
        ElementKind::ComplexDouble if scalar => {
            let ((re, im), _) = conv.decode(bytes, 0);
            ColumnValue::ComplexDouble(re, im)
        }
        ElementKind::ComplexDouble => {
            ColumnValue::ComplexDoubleArray(conv.decode_array(bytes, 0, n).0)
        }
    }
}

fn put_scalar<T: Primitive>(conv: &BitConverter, dt: &FitsDataType, value: T, out: &mut [u8]) -> bool {
    if dt.repeat != 1 {
        return false;
    }
    conv.encode(value, out, 0);
    true
}

fn put_array<T: Primitive>(conv: &BitConverter, dt: &FitsDataType, values: &[T], out: &mut [u8]) -> bool {
    if dt.repeat == 1 || values.len() != dt.repeat {
        return false;
    }
    conv.encode_array(values, out, 0);
    true
}

/// Encode `value` into the column bytes `out`. Returns `false` when the value
/// does not fit the column's type and repeat count.
fn encode_value(conv: &BitConverter, dt: &FitsDataType, value: &ColumnValue, out: &mut [u8]) -> bool {
    use ColumnValue as V;
    use ElementKind as K;
    match (dt.kind, value) {
        (K::Ascii, V::Ascii(s)) if s.len() <= dt.repeat => {
            conv.encode_str(s, out, 0, dt.repeat);
            true
        }
        (K::Bit, V::Bit(bytes)) if bytes.len() == out.len() => {
            out.copy_from_slice(bytes);
            true
        }
        (K::Logical, V::Logical(v)) => put_scalar(conv, dt, *v, out),
        (K::Logical, V::LogicalArray(v)) => put_array(conv, dt, v, out),
        (K::Byte, V::Byte(v)) => put_scalar(conv, dt, *v, out),
        (K::Byte, V::ByteArray(v)) => put_array(conv, dt, v, out),
        (K::Short, V::Short(v)) => put_scalar(conv, dt, *v, out),
        (K::Short, V::ShortArray(v)) => put_array(conv, dt, v, out),
        (K::Int, V::Int(v)) => put_scalar(conv, dt, *v, out),
        (K::Int, V::IntArray(v)) => put_array(conv, dt, v, out),
        (K::Long, V::Long(v)) => put_scalar(conv, dt, *v, out),
        (K::Long, V::LongArray(v)) => put_array(conv, dt, v, out),
        (K::Float, V::Float(v)) => put_scalar(conv, dt, *v, out),
        (K::Float, V::FloatArray(v)) => put_array(conv, dt, v, out),
        (K::Double, V::Double(v)) => put_scalar(conv, dt, *v, out),
        (K::Double, V::DoubleArray(v)) => put_array(conv, dt, v, out),
        (K::ComplexFloat, V::ComplexFloat(re, im)) => put_scalar(conv, dt, (*re, *im), out),
        (K::ComplexFloat, V::ComplexFloatArray(v)) => put_array(conv, dt, v, out),
        (K::ComplexDouble, V::ComplexDouble(re, im)) => put_scalar(conv, dt, (*re, *im), out),
        (K::ComplexDouble, V::ComplexDoubleArray(v)) => put_array(conv, dt, v, out),
        _ => false,
    }
}

// ── BinaryTableHdu ──

/// A binary table extension.
#[derive(Debug)]
pub struct BinaryTableHdu {
    core: HduCore,
    columns: Vec<TableColumn>,
}

impl BinaryTableHdu {
    /// An empty table: no columns, no rows.
    pub fn new() -> Result<Self> {
        let mut core = HduCore::new();
        core.set_extension("BINTABLE")?;
        core.set_bits_per_pixel(8)?;
        core.set_axis_count(2)?;
        core.set_axis_length(1, 0)?;
        core.set_axis_length(2, 0)?;
        core.cards_mut().set(Card::integer("PCOUNT", 0)?)?;
        core.cards_mut().set(Card::integer("GCOUNT", 1)?)?;
        core.cards_mut().set(Card::integer("TFIELDS", 0)?)?;
        Ok(BinaryTableHdu {
            core,
            columns: Vec::new(),
        })
    }

    /// Wrap a core whose header has been read, detecting its columns.
    pub fn from_core(core: HduCore) -> Result<Self> {
        let cards = core.cards();
        let pcount = cards
            .try_get("PCOUNT")
            .map(Card::get_i64)
            .transpose()?
            .unwrap_or(0);
        if pcount > 0 {
            return Err(Error::Unsupported("binary table heap (PCOUNT > 0)"));
        }
        let bitpix = core.bits_per_pixel()?;
        if bitpix != 8 {
            return Err(Error::InvalidBitpix(bitpix));
        }
        let tfields = cards
            .try_get("TFIELDS")
            .map(Card::get_i64)
            .transpose()?
            .unwrap_or(0);
        let columns = (1..=tfields.max(0) as usize)
            .map(|i| TableColumn::from_cards(cards, i))
            .collect::<Result<Vec<_>>>()?;

        let computed: usize = columns.iter().map(TableColumn::byte_width).sum();
        let declared = core.axis_length(1)?;
        if declared != computed {
            return Err(Error::RowWidthMismatch { declared, computed });
        }
        Ok(BinaryTableHdu { core, columns })
    }

    pub fn core(&self) -> &HduCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut HduCore {
        &mut self.core
    }

    pub fn columns(&self) -> &[TableColumn] {
        &self.columns
    }

    /// Find a column by `TTYPEn`, ignoring case.
    pub fn column(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| {
            c.name
                .as_deref()
                .is_some_and(|n| n.trim().eq_ignore_ascii_case(name.trim()))
        })
    }

    /// Bytes per row.
    pub fn row_width(&self) -> usize {
        self.columns.iter().map(TableColumn::byte_width).sum()
    }

    /// Define the table's columns, replacing any previous definition.
    ///
    /// Writes `TFIELDS`, the per-column keyword families and `NAXIS1`.
    pub fn create_columns(&mut self, columns: Vec<TableColumn>) -> Result<()> {
        if !self.core.cards().is_modifiable() {
            return Err(ProtocolError::HeaderNotModifiable.into());
        }
        let cards = self.core.cards_mut();
        cards.remove_where(is_column_keyword)?;

        let mut columns = columns;
        for (i, column) in columns.iter_mut().enumerate() {
            column.index = i + 1;
            for card in column.to_cards()? {
                cards.set(card)?;
            }
        }
        cards.set(Card::integer("TFIELDS", columns.len() as i64)?)?;
        self.columns = columns;
        let width = self.row_width();
        self.core.set_axis_length(1, width)
    }

    /// Declare the number of rows (`NAXIS2`). Zero leaves it open for a
    /// buffered write.
    pub fn set_row_count(&mut self, rows: usize) -> Result<()> {
        self.core.set_axis_length(2, rows)
    }

    pub fn row_count(&self) -> Result<usize> {
        self.core.axis_length(2)
    }

    /// Read and decode the next row. `None` once every row has been read.
    pub fn read_next_row<S: SkipForward>(
        &mut self,
        io: &mut FitsStream<S>,
    ) -> Result<Option<Vec<ColumnValue>>> {
        let exhausted = match self.core.state() {
            HduState::Done => true,
            HduState::Strides => self.core.stride_counter() >= self.core.total_strides(),
            _ => false,
        };
        if exhausted {
            return Ok(None);
        }
        let conv = *io.converter();
        let computed = self.row_width();
        let row = self.core.read_stride(io)?;
        if row.len() != computed {
            return Err(Error::RowWidthMismatch { declared: row.len(), computed });
        }
        let mut offset = 0;
        let values = self
            .columns
            .iter()
            .map(|column| {
                let width = column.byte_width();
                let value = decode_value(&conv, &column.data_type, &row[offset..offset + width]);
                offset += width;
                value
            })
            .collect();
        Ok(Some(values))
    }

    /// Encode `row` and write it as the next stride.
    pub fn write_next_row<S: Write>(
        &mut self,
        io: &mut FitsStream<S>,
        row: &[ColumnValue],
    ) -> Result<()> {
        let conv = *io.converter();
        let computed = self.row_width();
        let columns = &self.columns;
        let buffer = self.core.stride_buffer_mut()?;
        if buffer.len() != computed {
            return Err(Error::RowWidthMismatch { declared: buffer.len(), computed });
        }
        let mut offset = 0;
        for (i, column) in columns.iter().enumerate() {
            let width = column.byte_width();
            let fits = row.get(i).is_some_and(|value| {
                encode_value(&conv, &column.data_type, value, &mut buffer[offset..offset + width])
            });
            if !fits {
                return Err(Error::ColumnMismatch {
                    column: column.index,
                    tform: column.data_type.tform(),
                });
            }
            offset += width;
        }
        if row.len() != columns.len() {
            return Err(Error::ColumnMismatch {
                column: columns.len() + 1,
                tform: String::new(),
            });
        }
        self.core.write_stride(io)
    }
}
