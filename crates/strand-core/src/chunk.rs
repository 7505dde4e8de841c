//! Chunk geometry

/// Maximum plaintext bytes in one chunk
pub const MAX_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Maximum ciphertext bytes in one stored fragment
pub const FRAGMENT_SIZE: usize = 128 * 1024;

/// Chunk plaintext is padded up to a multiple of this before encryption
pub const PADDING_BLOCK_SIZE: usize = 4096;

/// Index of the chunk holding stream offset `offset`
///
/// The end of a non-empty stream belongs to its last chunk.
pub fn chunk_index(offset: u64, total_length: u64) -> u64 {
    if offset == total_length && offset > 0 {
        (offset - 1) / MAX_CHUNK_SIZE as u64
    } else {
        offset / MAX_CHUNK_SIZE as u64
    }
}

/// Stream offset at which chunk `index` starts
pub fn chunk_start(index: u64) -> u64 {
    index * MAX_CHUNK_SIZE as u64
}

/// Plaintext length of the chunk starting at `start`
pub fn chunk_length(start: u64, total_length: u64) -> usize {
    total_length.saturating_sub(start).min(MAX_CHUNK_SIZE as u64) as usize
}

/// Number of chunks a stream of `total_length` bytes is stored in
pub fn chunk_count(total_length: u64) -> u64 {
    total_length.div_ceil(MAX_CHUNK_SIZE as u64).max(1)
}

/// Length a chunk's plaintext is padded to
pub fn padded_length(length: usize) -> usize {
    length
        .div_ceil(PADDING_BLOCK_SIZE)
        .saturating_mul(PADDING_BLOCK_SIZE)
        .min(MAX_CHUNK_SIZE)
}
