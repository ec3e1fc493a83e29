use thiserror::Error;

use crate::io::FileMode;

/// All errors that can occur during FITS I/O operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A card image could not be parsed.
    #[error("invalid card image: {0}")]
    InvalidCard(String),
    /// Malformed or misused keyword name.
    #[error("invalid keyword name: {0:?}")]
    InvalidKeyword(String),
    /// A unique keyword was added twice.
    #[error("duplicate keyword: {0}")]
    DuplicateKeyword(String),
    /// A header value could not be interpreted as the requested type.
    #[error("invalid value for keyword {keyword}: {raw:?}")]
    InvalidValue { keyword: String, raw: String },
    /// A required keyword was not found in the header.
    #[error("missing required keyword: {0}")]
    MissingKeyword(String),
    /// Unrecognized BITPIX value.
    #[error("invalid BITPIX value: {0}")]
    InvalidBitpix(i64),
    /// Unrecognized column type descriptor.
    #[error("invalid TFORM value: {0:?}")]
    InvalidTform(String),
    /// NAXIS1 disagrees with the summed column widths.
    #[error("row width mismatch: NAXIS1 is {declared} but columns need {computed} bytes")]
    RowWidthMismatch { declared: usize, computed: usize },
    /// A row value does not match its column descriptor.
    #[error("value for column {column} does not match its format {tform}")]
    ColumnMismatch { column: usize, tform: String },
    /// A stride of the wrong length was supplied.
    #[error("stride length mismatch: expected {expected} bytes, got {actual}")]
    StrideLength { expected: usize, actual: usize },
    /// Keyword and value do not fit into one 80-byte card.
    #[error("card {0} does not fit in 80 bytes")]
    CardOverflow(String),
    /// Unknown XTENSION type.
    #[error("unsupported XTENSION type: {0:?}")]
    UnsupportedExtension(String),
    /// A recognized but unimplemented FITS feature.
    #[error("unsupported feature: {0}")]
    Unsupported(&'static str),
    /// An operation was invoked outside its legal state.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Fewer bytes were available than a fixed-size read required.
    #[error("unexpected end of stream")]
    UnexpectedEof,
    /// An I/O error from the standard library.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

/// State-machine violations of the HDU and file protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("header cannot be modified after the HDU has started")]
    HeaderNotModifiable,
    #[error("header has already been read or written")]
    HeaderAlreadyProcessed,
    #[error("header must be read or written first")]
    HeaderNotProcessed,
    #[error("no more strides in this HDU")]
    NoMoreStrides,
    #[error("mark_end is only valid while writing strides or buffering")]
    CannotMarkEnd,
    #[error("axis lengths must be set before the header can be written")]
    AxisLengthNotSet,
    #[error("only {written} of {declared} strides were written")]
    IncompleteData { written: usize, declared: usize },
    #[error("previous HDU has not been finished")]
    PreviousHduUnfinished,
    #[error("operation requires a file opened in {0:?} mode")]
    WrongMode(FileMode),
}

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed on-disk structure or inconsistent header.
    Format,
    /// Operation invoked outside its legal state.
    ProtocolState,
    /// A fixed-size read ran out of data.
    UnexpectedEndOfStream,
    /// Recognized but unimplemented feature.
    UnsupportedFeature,
    /// Any other transport failure.
    Io,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Protocol(_) => ErrorKind::ProtocolState,
            Error::UnexpectedEof => ErrorKind::UnexpectedEndOfStream,
            Error::Unsupported(_) => ErrorKind::UnsupportedFeature,
            Error::Io(_) => ErrorKind::Io,
            _ => ErrorKind::Format,
        }
    }

    pub(crate) fn invalid_value(keyword: &str, raw: &str) -> Self {
        Error::InvalidValue {
            keyword: keyword.into(),
            raw: raw.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof
        } else {
            Error::Io(e)
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_invalid_bitpix() {
        let e = Error::InvalidBitpix(-99);
        assert_eq!(e.to_string(), "invalid BITPIX value: -99");
    }

    #[test]
    fn display_missing_keyword() {
        let e = Error::MissingKeyword("NAXIS".into());
        assert_eq!(e.to_string(), "missing required keyword: NAXIS");
    }

    #[test]
    fn display_protocol_is_transparent() {
        let e: Error = ProtocolError::NoMoreStrides.into();
        assert_eq!(e.to_string(), "no more strides in this HDU");
    }

    #[test]
    fn display_incomplete_data() {
        let e = ProtocolError::IncompleteData {
            written: 1,
            declared: 3,
        };
        assert_eq!(e.to_string(), "only 1 of 3 strides were written");
    }

    #[test]
    fn io_eof_becomes_unexpected_eof() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::UnexpectedEof));
        assert_eq!(e.kind(), ErrorKind::UnexpectedEndOfStream);
    }

    #[test]
    fn io_other_stays_io() {
        let e: Error = std::io::Error::other("oops").into();
        assert!(matches!(e, Error::Io(_)));
        assert_eq!(e.kind(), ErrorKind::Io);
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(Error::InvalidTform("Z".into()).kind(), ErrorKind::Format);
        assert_eq!(
            Error::Protocol(ProtocolError::CannotMarkEnd).kind(),
            ErrorKind::ProtocolState
        );
        assert_eq!(
            Error::Unsupported("heap").kind(),
            ErrorKind::UnsupportedFeature
        );
    }

    #[test]
    fn std_error_source() {
        use std::error::Error as StdError;

        assert!(Error::InvalidBitpix(3).source().is_none());
        let e = Error::Io(std::io::Error::other("inner"));
        assert!(e.source().is_some());
    }
}
