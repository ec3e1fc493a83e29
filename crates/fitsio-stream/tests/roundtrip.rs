//! Round-trip integration tests for fitsio-stream.
//!
//! Most tests stream through in-memory `Cursor<Vec<u8>>` buffers; the path
//! helpers use a temp directory.

use std::io::Cursor;

use fitsio_stream::{
    BinaryTableHdu, ByteOrder, Card, ColumnValue, ElementKind, Error, ErrorKind, FitsDataType,
    FitsFile, FitsOptions, ForwardOnly, HduState, ImageHdu, ImageStride, ProtocolError,
    SimpleHdu, TableColumn, BLOCK_SIZE, CARD_SIZE,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn sample_columns() -> Vec<TableColumn> {
    vec![
        TableColumn::named("ID", FitsDataType::scalar(ElementKind::Int)),
        TableColumn::named("NAME", FitsDataType::new(ElementKind::Ascii, 3)),
        TableColumn::named("POS", FitsDataType::new(ElementKind::Float, 2)),
    ]
}

fn sample_row(i: i32) -> Vec<ColumnValue> {
    vec![
        ColumnValue::Int(i),
        ColumnValue::Ascii(format!("r{i}")),
        ColumnValue::FloatArray(vec![i as f32 * 0.5, -(i as f32)]),
    ]
}

/// Primary HDU without data followed by one binary table.
fn write_table_file(rows: usize, declare_rows: bool, options: FitsOptions) -> Vec<u8> {
    let mut file = FitsFile::create(Vec::new(), options);
    file.append(SimpleHdu::primary().unwrap())
        .unwrap()
        .write_header()
        .unwrap();

    let mut table = BinaryTableHdu::new().unwrap();
    table.create_columns(sample_columns()).unwrap();
    table.core_mut().set_extension_name("EVENTS").unwrap();
    if declare_rows {
        table.set_row_count(rows).unwrap();
    }
    let mut hdu = file.append(table).unwrap();
    hdu.write_header().unwrap();
    for i in 0..rows {
        hdu.write_next_row(&sample_row(i as i32)).unwrap();
    }
    if hdu.state() == HduState::Buffering {
        hdu.mark_end().unwrap();
    }
    assert_eq!(hdu.state(), HduState::Done);
    file.close().unwrap()
}

fn read_all_rows(bytes: Vec<u8>) -> Vec<Vec<ColumnValue>> {
    let mut file = FitsFile::open(Cursor::new(bytes), FitsOptions::default());
    file.read_next_hdu().unwrap().unwrap();
    let mut hdu = file.read_next_hdu().unwrap().unwrap();
    let mut rows = Vec::new();
    while let Some(row) = hdu.read_next_row().unwrap() {
        rows.push(row);
    }
    rows
}

fn header_block(cards: &[Card]) -> Vec<u8> {
    let mut out = Vec::new();
    for card in cards.iter().chain(std::iter::once(&Card::end())) {
        out.extend_from_slice(&card.to_bytes().unwrap());
    }
    out.resize(out.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE, b' ');
    out
}

// ---------------------------------------------------------------------------
// Binary tables
// ---------------------------------------------------------------------------

#[test]
fn three_column_table_end_to_end() {
    let bytes = write_table_file(2, true, FitsOptions::default());
    assert_eq!(bytes.len() % BLOCK_SIZE, 0);

    let mut file = FitsFile::open(Cursor::new(bytes), FitsOptions::default());
    file.read_next_hdu().unwrap().unwrap();
    let mut hdu = file.read_next_hdu().unwrap().unwrap();
    let cards = hdu.cards();
    assert_eq!(cards.get("TFIELDS").unwrap().get_i64().unwrap(), 3);
    assert_eq!(cards.get("NAXIS1").unwrap().get_i64().unwrap(), 15);
    assert_eq!(cards.get("NAXIS2").unwrap().get_i64().unwrap(), 2);
    assert_eq!(hdu.core().extension_name().as_deref(), Some("EVENTS"));

    assert_eq!(hdu.read_next_row().unwrap(), Some(sample_row(0)));
    assert_eq!(hdu.read_next_row().unwrap(), Some(sample_row(1)));
    assert_eq!(hdu.read_next_row().unwrap(), None);
    assert!(file.read_next_hdu().unwrap().is_none());
}

#[test]
fn buffered_write_matches_direct_write() {
    let direct = write_table_file(5, true, FitsOptions::default());
    let buffered = write_table_file(5, false, FitsOptions::new().buffering_allowed(true));
    assert_eq!(buffered, direct);
}

#[test]
fn buffered_write_spills_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let options = FitsOptions::new()
        .buffering_allowed(true)
        .spill_threshold(64)
        .spill_directory(dir.path());
    let spilled = write_table_file(40, false, options);
    assert_eq!(spilled, write_table_file(40, true, FitsOptions::default()));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    let rows = read_all_rows(spilled);
    assert_eq!(rows.len(), 40);
    assert_eq!(rows[39], sample_row(39));
}

#[test]
fn unknown_row_count_without_buffering_writes_empty_table() {
    let mut file = FitsFile::create(Vec::new(), FitsOptions::default());
    let mut table = BinaryTableHdu::new().unwrap();
    table.create_columns(sample_columns()).unwrap();
    let mut hdu = file.append(table).unwrap();
    hdu.write_header().unwrap();
    assert_eq!(hdu.state(), HduState::Done);
    assert!(matches!(
        hdu.write_next_row(&sample_row(0)),
        Err(Error::Protocol(ProtocolError::NoMoreStrides))
    ));
}

#[test]
fn skipping_unread_rows() {
    let bytes = write_table_file(100, true, FitsOptions::default());
    let total = bytes.len() as u64;
    let mut file = FitsFile::open(Cursor::new(bytes), FitsOptions::default());
    file.read_next_hdu().unwrap().unwrap();
    let mut hdu = file.read_next_hdu().unwrap().unwrap();
    hdu.read_next_row().unwrap();
    assert!(file.read_next_hdu().unwrap().is_none());
    assert_eq!(file.position(), total);
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

#[test]
fn image_extension_after_primary() {
    let mut file = FitsFile::create(Vec::new(), FitsOptions::default());
    let mut hdu = file.append(ImageHdu::primary(32, &[3, 2]).unwrap()).unwrap();
    hdu.write_header().unwrap();
    hdu.write_pixels(&ImageStride::I32(vec![1, 2, 3])).unwrap();
    hdu.write_pixels(&ImageStride::I32(vec![4, 5, 6])).unwrap();
    let mut hdu = file.append(ImageHdu::extension(-64, &[2]).unwrap()).unwrap();
    hdu.write_header().unwrap();
    assert_eq!(hdu.core().total_strides(), 1);
    hdu.write_pixels(&ImageStride::F64(vec![0.5, -0.25])).unwrap();
    let bytes = file.close().unwrap();
    assert_eq!(bytes.len(), 4 * BLOCK_SIZE);

    let mut file = FitsFile::open(Cursor::new(bytes), FitsOptions::default());
    let mut hdu = file.read_next_hdu().unwrap().unwrap();
    assert_eq!(hdu.as_image().unwrap().shape().unwrap(), [3, 2]);
    assert_eq!(hdu.read_pixels().unwrap(), ImageStride::I32(vec![1, 2, 3]));
    assert_eq!(hdu.read_pixels().unwrap(), ImageStride::I32(vec![4, 5, 6]));
    assert!(!hdu.core().has_more_strides());

    let mut hdu = file.read_next_hdu().unwrap().unwrap();
    assert_eq!(hdu.core().extension().as_deref(), Some("IMAGE"));
    assert_eq!(hdu.read_pixels().unwrap(), ImageStride::F64(vec![0.5, -0.25]));
}

#[test]
fn raw_stride_access() {
    let mut file = FitsFile::create(Vec::new(), FitsOptions::default());
    let mut hdu = file.append(ImageHdu::primary(16, &[2, 2]).unwrap()).unwrap();
    hdu.write_header().unwrap();
    hdu.stride_buffer_mut().unwrap().copy_from_slice(&[0, 1, 0, 2]);
    hdu.write_stride().unwrap();
    assert!(matches!(
        hdu.write_stride_bytes(&[0, 3]),
        Err(Error::StrideLength { expected: 4, actual: 2 })
    ));
    hdu.write_stride_values(&[3i16, 4]).unwrap();
    let bytes = file.close().unwrap();

    let mut file = FitsFile::open(Cursor::new(bytes), FitsOptions::default());
    let mut hdu = file.read_next_hdu().unwrap().unwrap();
    assert_eq!(hdu.read_stride_values::<i16>().unwrap(), [1, 2]);
    assert_eq!(hdu.read_stride().unwrap(), &[0, 3, 0, 4]);
}

// ---------------------------------------------------------------------------
// Byte order
// ---------------------------------------------------------------------------

fn single_int_file(order: ByteOrder) -> Vec<u8> {
    let mut file = FitsFile::create(Vec::new(), FitsOptions::new().byte_order(order));
    let mut hdu = file.append(ImageHdu::primary(32, &[1]).unwrap()).unwrap();
    hdu.write_header().unwrap();
    hdu.write_pixels(&ImageStride::I32(vec![1])).unwrap();
    file.close().unwrap()
}

#[test]
fn int32_byte_order() {
    let big = single_int_file(ByteOrder::BigEndian);
    assert_eq!(&big[BLOCK_SIZE..BLOCK_SIZE + 4], &[0, 0, 0, 1]);
    let little = single_int_file(ByteOrder::LittleEndian);
    assert_eq!(&little[BLOCK_SIZE..BLOCK_SIZE + 4], &[1, 0, 0, 0]);
    assert!(big[BLOCK_SIZE + 4..].iter().all(|&b| b == 0));
}

// ---------------------------------------------------------------------------
// Stream handling
// ---------------------------------------------------------------------------

#[test]
fn headers_are_block_aligned_and_space_padded() {
    let bytes = write_table_file(1, true, FitsOptions::default());
    let first = &bytes[..BLOCK_SIZE];
    let end = first
        .chunks(CARD_SIZE)
        .position(|c| c.starts_with(b"END     "))
        .unwrap();
    assert!(first[(end + 1) * CARD_SIZE..].iter().all(|&b| b == b' '));
}

#[test]
fn unsupported_extension_is_reported() {
    let mut bytes = header_block(&[
        Card::logical("SIMPLE", true).unwrap(),
        Card::integer("BITPIX", 8).unwrap(),
        Card::integer("NAXIS", 0).unwrap(),
    ]);
    bytes.extend(header_block(&[
        Card::string("XTENSION", "TABLE").unwrap(),
        Card::integer("BITPIX", 8).unwrap(),
        Card::integer("NAXIS", 0).unwrap(),
    ]));

    let mut file = FitsFile::open(Cursor::new(bytes), FitsOptions::default());
    assert!(file.read_next_hdu().unwrap().is_some());
    let err = file.read_next_hdu().unwrap_err();
    assert!(matches!(&err, Error::UnsupportedExtension(x) if x == "TABLE"));
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn oversized_axis_product_is_a_format_error() {
    let bytes = header_block(&[
        Card::logical("SIMPLE", true).unwrap(),
        Card::integer("BITPIX", 8).unwrap(),
        Card::integer("NAXIS", 3).unwrap(),
        Card::integer("NAXIS1", 1).unwrap(),
        Card::integer("NAXIS2", 1 << 32).unwrap(),
        Card::integer("NAXIS3", 1 << 32).unwrap(),
    ]);

    let mut file = FitsFile::open(Cursor::new(bytes), FitsOptions::default());
    let err = file.read_next_hdu().unwrap_err();
    assert!(matches!(&err, Error::InvalidValue { keyword, .. } if keyword == "NAXIS3"));
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn truncated_data_is_unexpected_eof() {
    let mut bytes = write_table_file(3, true, FitsOptions::default());
    bytes.truncate(bytes.len() - BLOCK_SIZE + 20);
    let mut file = FitsFile::open(Cursor::new(bytes), FitsOptions::default());
    file.read_next_hdu().unwrap().unwrap();
    let mut hdu = file.read_next_hdu().unwrap().unwrap();
    hdu.read_next_row().unwrap();
    let err = hdu.read_next_row().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedEndOfStream);
}

#[test]
fn forward_only_reader() {
    let bytes = write_table_file(7, true, FitsOptions::default());
    let mut file = FitsFile::open(ForwardOnly(bytes.as_slice()), FitsOptions::default());
    file.read_next_hdu().unwrap().unwrap();
    let mut hdu = file.read_next_hdu().unwrap().unwrap();
    assert_eq!(hdu.read_next_row().unwrap(), Some(sample_row(0)));
    assert!(file.read_next_hdu().unwrap().is_none());
    assert_eq!(file.len(), 2);
}

#[test]
fn path_helpers_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.fits");

    let mut file = FitsFile::create_path(&path, FitsOptions::default()).unwrap();
    file.append(SimpleHdu::primary().unwrap())
        .unwrap()
        .write_header()
        .unwrap();
    let mut table = BinaryTableHdu::new().unwrap();
    table.create_columns(sample_columns()).unwrap();
    table.set_row_count(2).unwrap();
    let mut hdu = file.append(table).unwrap();
    hdu.write_header().unwrap();
    hdu.write_next_row(&sample_row(0)).unwrap();
    hdu.write_next_row(&sample_row(1)).unwrap();
    file.close().unwrap();

    let rows = read_all_rows(std::fs::read(&path).unwrap());
    assert_eq!(rows, [sample_row(0), sample_row(1)]);

    let mut file = FitsFile::open_path(&path, FitsOptions::default()).unwrap();
    file.read_next_hdu().unwrap().unwrap();
    assert!(file.read_next_hdu().unwrap().unwrap().as_table().is_some());
}
