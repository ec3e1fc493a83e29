//! Streaming reader and writer for FITS files.
//!
//! Data moves one stride at a time (a table row or an image line) through a
//! per-HDU state machine, so neither side ever holds a whole HDU in memory.
//! Writers that do not know their row count up front can stage rows in a
//! [`spill::SpillBuffer`] and have `NAXISn` filled in when the HDU is closed.
//!
//! ```
//! use std::io::Cursor;
//! use fitsio_stream::{
//!     BinaryTableHdu, ColumnValue, ElementKind, FitsDataType, FitsFile, FitsOptions,
//!     TableColumn,
//! };
//!
//! let mut table = BinaryTableHdu::new()?;
//! table.create_columns(vec![TableColumn::named("ID", FitsDataType::scalar(ElementKind::Int))])?;
//! table.set_row_count(1)?;
//!
//! let mut file = FitsFile::create(Vec::new(), FitsOptions::default());
//! let mut hdu = file.append(table)?;
//! hdu.write_header()?;
//! hdu.write_next_row(&[ColumnValue::Int(7)])?;
//! let bytes = file.close()?;
//!
//! let mut file = FitsFile::open(Cursor::new(bytes), FitsOptions::default());
//! let mut hdu = file.read_next_hdu()?.expect("one HDU");
//! assert_eq!(hdu.read_next_row()?, Some(vec![ColumnValue::Int(7)]));
//! # Ok::<(), fitsio_stream::Error>(())
//! ```

pub mod bintable;
pub mod block;
pub mod cards;
pub mod datatype;
pub mod endian;
pub mod error;
pub mod file;
pub mod hdu;
pub mod header;
pub mod image;
pub mod io;
pub mod options;
pub mod spill;
pub mod value;

pub use bintable::{BinaryTableHdu, ColumnValue, TableColumn};
pub use block::{BLOCK_SIZE, CARDS_PER_BLOCK, CARD_SIZE};
pub use cards::CardCollection;
pub use datatype::{ElementKind, FitsDataType};
pub use endian::{BitConverter, ByteOrder, Primitive};
pub use error::{Error, ErrorKind, ProtocolError, Result};
pub use file::{FitsFile, HduHandle};
pub use hdu::{Hdu, HduCore, HduState, SimpleHdu};
pub use header::Card;
pub use image::{ImageHdu, ImageStride};
pub use io::{FileMode, FitsStream, ForwardOnly, SkipForward};
pub use options::{FitsOptions, SpillOptions};
pub use value::Value;
