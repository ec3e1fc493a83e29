//! Binary table column types and `TFORMn` descriptors.

use crate::error::{Error, Result};

/// Element type of a binary table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// L -- logical, one byte `T`/`F`.
    Logical,
    /// X -- bit array, packed eight per byte.
    Bit,
    /// B -- unsigned byte.
    Byte,
    /// I -- 16-bit signed integer.
    Short,
    /// J -- 32-bit signed integer.
    Int,
    /// K -- 64-bit signed integer.
    Long,
    /// A -- ASCII character.
    Ascii,
    /// E -- 32-bit IEEE float.
    Float,
    /// D -- 64-bit IEEE float.
    Double,
    /// C -- complex: pair of 32-bit floats.
    ComplexFloat,
    /// M -- complex: pair of 64-bit floats.
    ComplexDouble,
}

impl ElementKind {
    /// The `TFORMn` type code.
    pub fn code(self) -> char {
        match self {
            ElementKind::Logical => 'L',
            ElementKind::Bit => 'X',
            ElementKind::Byte => 'B',
            ElementKind::Short => 'I',
            ElementKind::Int => 'J',
            ElementKind::Long => 'K',
            ElementKind::Ascii => 'A',
            ElementKind::Float => 'E',
            ElementKind::Double => 'D',
            ElementKind::ComplexFloat => 'C',
            ElementKind::ComplexDouble => 'M',
        }
    }

    /// Inverse of [`ElementKind::code`].
    ///
    /// Variable-length descriptors (`P`, `Q`) are recognized and rejected as
    /// unsupported.
    pub fn from_code(code: char) -> Result<Self> {
        Ok(match code.to_ascii_uppercase() {
            'L' => ElementKind::Logical,
            'X' => ElementKind::Bit,
            'B' => ElementKind::Byte,
            'I' => ElementKind::Short,
            'J' => ElementKind::Int,
            'K' => ElementKind::Long,
            'A' => ElementKind::Ascii,
            'E' => ElementKind::Float,
            'D' => ElementKind::Double,
            'C' => ElementKind::ComplexFloat,
            'M' => ElementKind::ComplexDouble,
            'P' | 'Q' => return Err(Error::Unsupported("variable-length array columns")),
            other => return Err(Error::InvalidTform(other.to_string())),
        })
    }

    /// Bytes per element. A bit element reports one byte, the unit its
    /// packed storage is measured in.
    pub fn width(self) -> usize {
        match self {
            ElementKind::Logical
            | ElementKind::Bit
            | ElementKind::Byte
            | ElementKind::Ascii => 1,
            ElementKind::Short => 2,
            ElementKind::Int | ElementKind::Float => 4,
            ElementKind::Long | ElementKind::Double | ElementKind::ComplexFloat => 8,
            ElementKind::ComplexDouble => 16,
        }
    }

    /// Whether `TNULLn` applies to this kind.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ElementKind::Byte | ElementKind::Short | ElementKind::Int | ElementKind::Long
        )
    }
}

/// Full description of one column's storage.
#[derive(Debug, Clone, PartialEq)]
pub struct FitsDataType {
    pub kind: ElementKind,
    /// Repeat count from `TFORMn`.
    pub repeat: usize,
    /// `TNULLn`: raw integer value that marks an undefined element.
    pub null_value: Option<i64>,
    /// `TSCALn`
    pub scale: f64,
    /// `TZEROn`
    pub zero: f64,
}

impl FitsDataType {
    pub fn new(kind: ElementKind, repeat: usize) -> Self {
        FitsDataType {
            kind,
            repeat,
            null_value: None,
            scale: 1.0,
            zero: 0.0,
        }
    }

    pub fn scalar(kind: ElementKind) -> Self {
        Self::new(kind, 1)
    }

    pub fn with_null(mut self, null_value: i64) -> Self {
        self.null_value = Some(null_value);
        self
    }

    pub fn with_scaling(mut self, scale: f64, zero: f64) -> Self {
        self.scale = scale;
        self.zero = zero;
        self
    }

    pub fn element_width(&self) -> usize {
        self.kind.width()
    }

    /// Bytes this column occupies in one row.
    ///
    /// Bit columns pack eight elements per byte; everything else is
    /// `element_width * repeat`.
    pub fn byte_width(&self) -> usize {
        match self.kind {
            ElementKind::Bit => self.repeat.div_ceil(8),
            kind => kind.width() * self.repeat,
        }
    }

    pub fn is_scaled(&self) -> bool {
        self.scale != 1.0 || self.zero != 0.0
    }

    /// Format as a `TFORMn` value, e.g. `1J` or `20A`.
    pub fn tform(&self) -> String {
        format!("{}{}", self.repeat, self.kind.code())
    }

    /// Parse a `TFORMn` value: an optional repeat count, a type code, and
    /// optional trailing qualifiers that are ignored.
    pub fn parse_tform(tform: &str) -> Result<Self> {
        let text = tform.trim();
        let digits = text.bytes().take_while(u8::is_ascii_digit).count();
        let repeat = if digits == 0 {
            1
        } else {
            text[..digits]
                .parse()
                .map_err(|_| Error::InvalidTform(tform.to_string()))?
        };
        let code = text[digits..]
            .chars()
            .next()
            .ok_or_else(|| Error::InvalidTform(tform.to_string()))?;
        let kind = ElementKind::from_code(code).map_err(|e| match e {
            Error::InvalidTform(_) => Error::InvalidTform(tform.to_string()),
            other => other,
        })?;
        Ok(FitsDataType::new(kind, repeat))
    }

    /// Apply `TSCALn`/`TZEROn` to a stored value.
    pub fn physical(&self, raw: f64) -> f64 {
        self.zero + self.scale * raw
    }

    /// Invert [`FitsDataType::physical`]. Integer kinds round to the
    /// nearest stored value.
    pub fn raw_from_physical(&self, physical: f64) -> f64 {
        let raw = (physical - self.zero) / self.scale;
        if self.kind.is_integer() {
            libm::round(raw)
        } else {
            raw
        }
    }

    /// Whether `raw` equals the column's null sentinel.
    pub fn is_null(&self, raw: i64) -> bool {
        self.null_value == Some(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_forms() {
        let t = FitsDataType::parse_tform("1J").unwrap();
        assert_eq!((t.kind, t.repeat), (ElementKind::Int, 1));
        let t = FitsDataType::parse_tform("E").unwrap();
        assert_eq!((t.kind, t.repeat), (ElementKind::Float, 1));
        let t = FitsDataType::parse_tform(" 20A ").unwrap();
        assert_eq!((t.kind, t.repeat), (ElementKind::Ascii, 20));
        let t = FitsDataType::parse_tform("20A10").unwrap();
        assert_eq!((t.kind, t.repeat), (ElementKind::Ascii, 20));
    }

    #[test]
    fn parse_all_codes() {
        for code in "LXBIJKAEDCM".chars() {
            let t = FitsDataType::parse_tform(&format!("3{code}")).unwrap();
            assert_eq!(t.kind.code(), code);
            assert_eq!(t.tform(), format!("3{code}"));
        }
    }

    #[test]
    fn parse_rejects_heap_columns() {
        assert!(matches!(
            FitsDataType::parse_tform("1PJ(100)"),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            FitsDataType::parse_tform("1QD"),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            FitsDataType::parse_tform("3Z"),
            Err(Error::InvalidTform(s)) if s == "3Z"
        ));
        assert!(matches!(
            FitsDataType::parse_tform("12"),
            Err(Error::InvalidTform(_))
        ));
        assert!(FitsDataType::parse_tform("").is_err());
    }

    #[test]
    fn widths() {
        assert_eq!(FitsDataType::new(ElementKind::Int, 1).byte_width(), 4);
        assert_eq!(FitsDataType::new(ElementKind::Ascii, 3).byte_width(), 3);
        assert_eq!(FitsDataType::new(ElementKind::Float, 2).byte_width(), 8);
        assert_eq!(FitsDataType::new(ElementKind::ComplexDouble, 2).byte_width(), 32);
        assert_eq!(FitsDataType::new(ElementKind::Bit, 1).byte_width(), 1);
        assert_eq!(FitsDataType::new(ElementKind::Bit, 8).byte_width(), 1);
        assert_eq!(FitsDataType::new(ElementKind::Bit, 9).byte_width(), 2);
        assert_eq!(FitsDataType::new(ElementKind::Long, 0).byte_width(), 0);
    }

    #[test]
    fn scaling() {
        let t = FitsDataType::scalar(ElementKind::Short).with_scaling(1.0, 32768.0);
        assert!(t.is_scaled());
        assert_eq!(t.physical(-32768.0), 0.0);
        assert_eq!(t.raw_from_physical(65535.0), 32767.0);
        let t = FitsDataType::scalar(ElementKind::Int).with_scaling(0.5, 0.0);
        assert_eq!(t.raw_from_physical(1.3), 3.0);
        let t = FitsDataType::scalar(ElementKind::Float).with_scaling(2.0, 1.0);
        assert_eq!(t.raw_from_physical(2.0), 0.5);
        assert!(!FitsDataType::scalar(ElementKind::Float).is_scaled());
    }

    #[test]
    fn null_sentinel() {
        let t = FitsDataType::scalar(ElementKind::Int).with_null(-999);
        assert!(t.is_null(-999));
        assert!(!t.is_null(0));
        assert!(!FitsDataType::scalar(ElementKind::Int).is_null(0));
    }
}
