/// FITS block size in bytes (each logical record is one block).
pub const BLOCK_SIZE: usize = 2880;

/// FITS card (keyword record) size in bytes.
pub const CARD_SIZE: usize = 80;

/// Number of cards that fit in a single block.
pub const CARDS_PER_BLOCK: usize = BLOCK_SIZE / CARD_SIZE;

/// Padding byte used for header blocks (ASCII space).
pub const HEADER_PAD_BYTE: u8 = 0x20;

/// Padding byte used for data blocks (zero).
pub const DATA_PAD_BYTE: u8 = 0x00;

/// Returns the number of FITS blocks required to hold `num_bytes` bytes.
///
/// A FITS file is organized in units of 2880 bytes. This computes the ceiling
/// division: 0 bytes requires 0 blocks, 1 byte requires 1 block, 2880 bytes
/// requires 1 block, 2881 bytes requires 2 blocks, etc.
pub const fn blocks_needed(num_bytes: u64) -> u64 {
    num_bytes.div_ceil(BLOCK_SIZE as u64)
}

/// Returns the total byte length (in whole blocks) required to hold `num_bytes`.
pub const fn padded_byte_len(num_bytes: u64) -> u64 {
    blocks_needed(num_bytes) * BLOCK_SIZE as u64
}

/// Number of bytes between `position` and the next block boundary.
///
/// Zero when `position` is already aligned.
pub const fn padding_len(position: u64) -> usize {
    (padded_byte_len(position) - position) as usize
}

/// Returns `true` if `position` sits on a block boundary.
pub const fn is_aligned(position: u64) -> bool {
    position % BLOCK_SIZE as u64 == 0
}
