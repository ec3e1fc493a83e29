//! Byte-order aware conversion between raw stride bytes and Rust values.
//!
//! FITS stores binary data big-endian, but the converter is parameterized so
//! that little-endian variants of the format can be read and written too.
//! Conversion uses one of two strategies chosen once from the configured
//! byte order and the host byte order: a straight copy, or a full byte
//! reversal of every fixed-size field.
//!
//! Every operation touches exactly `[offset, offset + width)` of the buffer.
//! Callers are expected to size buffers correctly; out-of-range offsets panic.

use bytemuck::Pod;

/// Byte order of multi-byte fields on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Most significant byte first (the FITS standard).
    #[default]
    BigEndian,
    /// Least significant byte first.
    LittleEndian,
}

impl ByteOrder {
    /// The byte order of the machine running this code.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        }
    }
}

/// How field bytes are moved between the wire and native values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Wire order equals host order: bytes are copied unchanged.
    Straight,
    /// Wire order is the opposite of host order: each field is reversed.
    Swap,
}

/// A fixed-width value that can be decoded from and encoded into wire bytes.
pub trait Primitive: Copy + Sized {
    /// Width of one field in bytes.
    const WIDTH: usize;

    /// Decode from the first `WIDTH` bytes of `bytes`.
    fn decode_with(strategy: Strategy, bytes: &[u8]) -> Self;

    /// Encode into the first `WIDTH` bytes of `out`.
    fn encode_with(self, strategy: Strategy, out: &mut [u8]);
}

macro_rules! impl_numeric_primitive {
    ($($t:ty),*) => {
        $(
            impl Primitive for $t {
                const WIDTH: usize = core::mem::size_of::<$t>();

                #[inline]
                fn decode_with(strategy: Strategy, bytes: &[u8]) -> Self {
                    let mut raw = [0u8; core::mem::size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..Self::WIDTH]);
                    if strategy == Strategy::Swap {
                        raw.reverse();
                    }
                    <$t>::from_ne_bytes(raw)
                }

                #[inline]
                fn encode_with(self, strategy: Strategy, out: &mut [u8]) {
                    let mut raw = self.to_ne_bytes();
                    if strategy == Strategy::Swap {
                        raw.reverse();
                    }
                    out[..Self::WIDTH].copy_from_slice(&raw);
                }
            }
        )*
    };
}

impl_numeric_primitive!(u8, i8, i16, u16, i32, u32, i64, u64, f32, f64);

impl Primitive for bool {
    const WIDTH: usize = 1;

    /// Any byte other than zero, `'F'` or `'f'` reads as true.
    #[inline]
    fn decode_with(_strategy: Strategy, bytes: &[u8]) -> Self {
        !matches!(bytes[0], 0 | b'F' | b'f')
    }

    #[inline]
    fn encode_with(self, _strategy: Strategy, out: &mut [u8]) {
        out[0] = if self { b'T' } else { b'F' };
    }
}

// Complex pairs swap each half independently; the real part always comes first.
macro_rules! impl_complex_primitive {
    ($($t:ty),*) => {
        $(
            impl Primitive for ($t, $t) {
                const WIDTH: usize = 2 * <$t as Primitive>::WIDTH;

                #[inline]
                fn decode_with(strategy: Strategy, bytes: &[u8]) -> Self {
                    let half = <$t as Primitive>::WIDTH;
                    (
                        <$t>::decode_with(strategy, &bytes[..half]),
                        <$t>::decode_with(strategy, &bytes[half..2 * half]),
                    )
                }

                #[inline]
                fn encode_with(self, strategy: Strategy, out: &mut [u8]) {
                    let half = <$t as Primitive>::WIDTH;
                    self.0.encode_with(strategy, &mut out[..half]);
                    self.1.encode_with(strategy, &mut out[half..2 * half]);
                }
            }
        )*
    };
}

impl_complex_primitive!(f32, f64);

/// Converts values to and from wire bytes under one byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitConverter {
    order: ByteOrder,
    strategy: Strategy,
}

impl Default for BitConverter {
    fn default() -> Self {
        BitConverter::new(ByteOrder::BigEndian)
    }
}

impl BitConverter {
    /// Create a converter for the given wire byte order.
    pub const fn new(order: ByteOrder) -> Self {
        let strategy = match (order, ByteOrder::native()) {
            (ByteOrder::BigEndian, ByteOrder::BigEndian)
            | (ByteOrder::LittleEndian, ByteOrder::LittleEndian) => Strategy::Straight,
            _ => Strategy::Swap,
        };
        BitConverter { order, strategy }
    }

    /// The wire byte order.
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// The strategy selected for this host.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Decode one value at `offset`, returning it and the bytes consumed.
    ///
    /// # Panics
    /// Panics if `buffer` is shorter than `offset + T::WIDTH`.
    #[inline]
    pub fn decode<T: Primitive>(&self, buffer: &[u8], offset: usize) -> (T, usize) {
        let value = T::decode_with(self.strategy, &buffer[offset..offset + T::WIDTH]);
        (value, T::WIDTH)
    }

    /// Encode one value at `offset`, returning the bytes written.
    ///
    /// # Panics
    /// Panics if `buffer` is shorter than `offset + T::WIDTH`.
    #[inline]
    pub fn encode<T: Primitive>(&self, value: T, buffer: &mut [u8], offset: usize) -> usize {
        value.encode_with(self.strategy, &mut buffer[offset..offset + T::WIDTH]);
        T::WIDTH
    }

    /// Decode `count` contiguous values starting at `offset`.
    pub fn decode_array<T: Primitive>(
        &self,
        buffer: &[u8],
        offset: usize,
        count: usize,
    ) -> (Vec<T>, usize) {
        let len = count * T::WIDTH;
        let values = buffer[offset..offset + len]
            .chunks_exact(T::WIDTH)
            .map(|chunk| T::decode_with(self.strategy, chunk))
            .collect();
        (values, len)
    }

    /// Encode `values` contiguously starting at `offset`.
    pub fn encode_array<T: Primitive>(&self, values: &[T], buffer: &mut [u8], offset: usize) -> usize {
        let len = values.len() * T::WIDTH;
        for (value, chunk) in values
            .iter()
            .zip(buffer[offset..offset + len].chunks_exact_mut(T::WIDTH))
        {
            value.encode_with(self.strategy, chunk);
        }
        len
    }

    /// Bulk decode of plain numeric values.
    ///
    /// Copies the window with `bytemuck` and swaps fields in place, which
    /// avoids per-element dispatch for whole image strides.
    pub fn decode_pod_array<T: Primitive + Pod>(
        &self,
        buffer: &[u8],
        offset: usize,
        count: usize,
    ) -> (Vec<T>, usize) {
        let len = count * T::WIDTH;
        let mut raw = buffer[offset..offset + len].to_vec();
        if self.strategy == Strategy::Swap {
            swap_fields(&mut raw, T::WIDTH);
        }
        (bytemuck::pod_collect_to_vec(&raw), len)
    }

    /// Bulk encode of plain numeric values.
    pub fn encode_pod_array<T: Primitive + Pod>(
        &self,
        values: &[T],
        buffer: &mut [u8],
        offset: usize,
    ) -> usize {
        let src: &[u8] = bytemuck::cast_slice(values);
        let dest = &mut buffer[offset..offset + src.len()];
        dest.copy_from_slice(src);
        if self.strategy == Strategy::Swap {
            swap_fields(dest, T::WIDTH);
        }
        src.len()
    }

    /// Decode an ASCII field of `width` bytes.
    ///
    /// Text stops at the first NUL; trailing spaces are dropped.
    pub fn decode_str(&self, buffer: &[u8], offset: usize, width: usize) -> (String, usize) {
        let field = &buffer[offset..offset + width];
        let end = field.iter().position(|&b| b == 0).unwrap_or(width);
        let text: String = field[..end].iter().map(|&b| b as char).collect();
        (text.trim_end_matches(' ').to_string(), width)
    }

    /// Encode `value` into an ASCII field of `width` bytes, space padded.
    ///
    /// Characters beyond `width` are cut off; non-ASCII characters become `?`.
    pub fn encode_str(&self, value: &str, buffer: &mut [u8], offset: usize, width: usize) -> usize {
        let field = &mut buffer[offset..offset + width];
        field.fill(b' ');
        for (dest, ch) in field.iter_mut().zip(value.chars()) {
            *dest = if ch.is_ascii() { ch as u8 } else { b'?' };
        }
        width
    }
}

/// Reverse every `width`-byte field of `buf` in place.
///
/// # Panics
/// Panics if `buf.len()` is not a multiple of `width`.
pub fn swap_fields(buf: &mut [u8], width: usize) {
    assert!(
        width > 0 && buf.len() % width == 0,
        "buffer length must be a multiple of {width}"
    );
    if width < 2 {
        return;
    }
    for chunk in buf.chunks_exact_mut(width) {
        chunk.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn be() -> BitConverter {
        BitConverter::new(ByteOrder::BigEndian)
    }

    fn le() -> BitConverter {
        BitConverter::new(ByteOrder::LittleEndian)
    }

    // --- strategy selection ---

    #[test]
    fn strategies_differ_between_orders() {
        assert_ne!(be().strategy(), le().strategy());
        assert_eq!(
            BitConverter::new(ByteOrder::native()).strategy(),
            Strategy::Straight
        );
    }

    #[test]
    fn default_is_big_endian() {
        assert_eq!(BitConverter::default().byte_order(), ByteOrder::BigEndian);
    }

    // --- known byte sequences ---

    #[test]
    fn known_bytes_i32_one() {
        let mut buf = [0u8; 4];
        assert_eq!(be().encode(1i32, &mut buf, 0), 4);
        assert_eq!(buf, [0x00, 0x00, 0x00, 0x01]);
        assert_eq!(le().encode(1i32, &mut buf, 0), 4);
        assert_eq!(buf, [0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn known_bytes_i16() {
        assert_eq!(be().decode::<i16>(&[0xFF, 0xFF], 0), (-1, 2));
        assert_eq!(be().decode::<i16>(&[0x80, 0x00], 0), (i16::MIN, 2));
        assert_eq!(le().decode::<i16>(&[0x00, 0x01], 0), (256, 2));
    }

    #[test]
    fn known_bytes_f64_one() {
        let mut buf = [0u8; 8];
        be().encode(1.0f64, &mut buf, 0);
        assert_eq!(buf, [0x3F, 0xF0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn offset_touches_only_its_window() {
        let mut buf = [0xAAu8; 8];
        be().encode(0x0102u16, &mut buf, 3);
        assert_eq!(buf, [0xAA, 0xAA, 0xAA, 0x01, 0x02, 0xAA, 0xAA, 0xAA]);
        assert_eq!(be().decode::<u16>(&buf, 3), (0x0102, 2));
    }

    // --- booleans ---

    #[test]
    fn bool_writes_ascii_letters() {
        let mut buf = [0u8; 2];
        be().encode(true, &mut buf, 0);
        be().encode(false, &mut buf, 1);
        assert_eq!(&buf, b"TF");
    }

    #[test]
    fn bool_read_is_lenient() {
        for (byte, expected) in [
            (b'T', true),
            (b't', true),
            (0x01, true),
            (b'F', false),
            (b'f', false),
            (0x00, false),
        ] {
            assert_eq!(be().decode::<bool>(&[byte], 0).0, expected, "byte {byte:#x}");
        }
    }

    // --- complex ---

    #[test]
    fn complex_keeps_real_part_first() {
        let mut buf = [0u8; 8];
        le().encode((1.0f32, 2.0f32), &mut buf, 0);
        assert_eq!(&buf[..4], &1.0f32.to_le_bytes());
        assert_eq!(&buf[4..], &2.0f32.to_le_bytes());
        be().encode((1.0f32, 2.0f32), &mut buf, 0);
        assert_eq!(&buf[..4], &1.0f32.to_be_bytes());
        assert_eq!(be().decode::<(f32, f32)>(&buf, 0), ((1.0, 2.0), 8));
    }

    #[test]
    fn complex_double_roundtrip() {
        let mut buf = [0u8; 16];
        for conv in [be(), le()] {
            conv.encode((-3.5f64, 1e300f64), &mut buf, 0);
            assert_eq!(conv.decode::<(f64, f64)>(&buf, 0).0, (-3.5, 1e300));
        }
    }

    // --- arrays ---

    #[test]
    fn array_roundtrip_both_orders() {
        let values = [i32::MIN, -1, 0, 1, i32::MAX];
        let mut buf = [0u8; 24];
        for conv in [be(), le()] {
            assert_eq!(conv.encode_array(&values, &mut buf, 4), 20);
            let (back, used) = conv.decode_array::<i32>(&buf, 4, values.len());
            assert_eq!(used, 20);
            assert_eq!(back, values);
        }
    }

    #[test]
    fn pod_array_matches_generic_path() {
        let values = [1.5f32, -2.25, f32::MAX, f32::MIN_POSITIVE];
        let mut generic = [0u8; 16];
        let mut pod = [0u8; 16];
        for conv in [be(), le()] {
            conv.encode_array(&values, &mut generic, 0);
            conv.encode_pod_array(&values, &mut pod, 0);
            assert_eq!(generic, pod);
            let (back, _) = conv.decode_pod_array::<f32>(&pod, 0, values.len());
            assert_eq!(back, values);
        }
    }

    #[test]
    fn nan_bits_survive() {
        let mut buf = [0u8; 8];
        let nan = f64::from_bits(0x7FF8_0000_0000_1234);
        le().encode(nan, &mut buf, 0);
        assert_eq!(le().decode::<f64>(&buf, 0).0.to_bits(), nan.to_bits());
    }

    // --- strings ---

    #[test]
    fn str_pads_with_spaces() {
        let mut buf = [0u8; 6];
        assert_eq!(be().encode_str("ab", &mut buf, 1, 4), 4);
        assert_eq!(&buf, b"\0ab  \0");
        assert_eq!(be().decode_str(&buf, 1, 4), ("ab".to_string(), 4));
    }

    #[test]
    fn str_truncates_to_width() {
        let mut buf = [0u8; 3];
        be().encode_str("abcdef", &mut buf, 0, 3);
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn str_stops_at_nul() {
        let buf = *b"ab\0cd";
        assert_eq!(be().decode_str(&buf, 0, 5).0, "ab");
    }

    // --- swap_fields ---

    #[test]
    fn swap_fields_reverses_each_field() {
        let mut buf = [1u8, 2, 3, 4, 5, 6, 7, 8];
        swap_fields(&mut buf, 4);
        assert_eq!(buf, [4, 3, 2, 1, 8, 7, 6, 5]);
    }

    #[test]
    #[should_panic(expected = "multiple of 4")]
    fn swap_fields_rejects_ragged_buffer() {
        let mut buf = [0u8; 6];
        swap_fields(&mut buf, 4);
    }

    #[test]
    #[should_panic]
    fn decode_out_of_range_panics() {
        be().decode::<i64>(&[0u8; 4], 0);
    }
}
