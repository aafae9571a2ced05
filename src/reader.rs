//! Bounds-checked word access into raw byte buffers
//!
//! Raw buffers arrive as byte vectors with no alignment guarantee, so every
//! read copies the word bytes out of the slice before conversion. Reads past
//! the end return a sentinel instead of panicking; callers translate that
//! into an `InsufficientData` outcome.

use crate::validate::DecodeOutcome;

/// Word-aligned reader over a byte slice
///
/// `WORD_BYTES` is the firmware word size: 4 for dig1 (32-bit words),
/// 8 for dig2 (64-bit words). Trailing bytes that do not fill a whole word
/// are not addressable.
#[derive(Debug, Clone, Copy)]
pub struct WordReader<'a, const WORD_BYTES: usize> {
    data: &'a [u8],
    total_words: usize,
}

/// Reader over 32-bit little-endian words (dig1)
pub type Reader32<'a> = WordReader<'a, 4>;

/// Reader over 64-bit words already byte-reversed to native order (dig2)
pub type Reader64<'a> = WordReader<'a, 8>;

impl<'a, const WORD_BYTES: usize> WordReader<'a, WORD_BYTES> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            total_words: data.len() / WORD_BYTES,
        }
    }

    /// Total number of addressable words
    pub fn total_words(&self) -> usize {
        self.total_words
    }

    pub fn is_valid_index(&self, word_index: usize) -> bool {
        word_index < self.total_words
    }

    /// Words remaining from `from` (0 when past the end)
    pub fn remaining_words(&self, from: usize) -> usize {
        self.total_words.saturating_sub(from)
    }

    /// Advance `word_index` by `count`, refusing to move past the end
    ///
    /// Returns `false` and leaves the index untouched on overflow.
    pub fn advance(&self, word_index: &mut usize, count: usize) -> bool {
        if *word_index + count > self.total_words {
            return false;
        }
        *word_index += count;
        true
    }

    fn word_bytes(&self, word_index: usize) -> Option<&'a [u8]> {
        if word_index >= self.total_words {
            return None;
        }
        let offset = word_index * WORD_BYTES;
        Some(&self.data[offset..offset + WORD_BYTES])
    }
}

impl<'a> WordReader<'a, 4> {
    /// Read the 32-bit word at `word_index`
    pub fn read(&self, word_index: usize) -> Result<u32, DecodeOutcome> {
        self.try_read(word_index).ok_or(DecodeOutcome::OutOfBounds)
    }

    pub fn try_read(&self, word_index: usize) -> Option<u32> {
        self.word_bytes(word_index)
            .map(|bytes| u32::from_le_bytes(bytes.try_into().unwrap()))
    }
}

impl<'a> WordReader<'a, 8> {
    /// Read the 64-bit word at `word_index`
    pub fn read(&self, word_index: usize) -> Result<u64, DecodeOutcome> {
        self.try_read(word_index).ok_or(DecodeOutcome::OutOfBounds)
    }

    pub fn try_read(&self, word_index: usize) -> Option<u64> {
        self.word_bytes(word_index)
            .map(|bytes| u64::from_le_bytes(bytes.try_into().unwrap()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_u32_little_endian() {
        let data = [0x78, 0x56, 0x34, 0x12];
        let reader = Reader32::new(&data);
        assert_eq!(reader.read(0), Ok(0x1234_5678));
    }

    #[test]
    fn read_u32_at_offset() {
        let data = [0x00, 0x00, 0x00, 0x00, 0xEF, 0xBE, 0xAD, 0xDE];
        let reader = Reader32::new(&data);
        assert_eq!(reader.read(1), Ok(0xDEAD_BEEF));
    }

    #[test]
    fn read_u64_native_order() {
        let data = [0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01];
        let reader = Reader64::new(&data);
        assert_eq!(reader.read(0), Ok(0x0102_0304_0506_0708));
    }

    #[test]
    fn out_of_bounds_is_sentinel_not_panic() {
        let data = [0u8; 8];
        let reader = Reader32::new(&data);
        assert_eq!(reader.read(2), Err(DecodeOutcome::OutOfBounds));
        assert_eq!(reader.try_read(2), None);
    }

    #[test]
    fn trailing_partial_word_not_addressable() {
        let data = [0u8; 11];
        let reader = Reader32::new(&data);
        assert_eq!(reader.total_words(), 2);
        assert!(reader.try_read(2).is_none());
    }

    #[test]
    fn remaining_words_saturates() {
        let data = [0u8; 16];
        let reader = Reader32::new(&data);
        assert_eq!(reader.remaining_words(0), 4);
        assert_eq!(reader.remaining_words(3), 1);
        assert_eq!(reader.remaining_words(10), 0);
    }

    #[test]
    fn advance_refuses_overflow() {
        let data = [0u8; 16];
        let reader = Reader32::new(&data);
        let mut index = 1;
        assert!(reader.advance(&mut index, 3));
        assert_eq!(index, 4);
        assert!(!reader.advance(&mut index, 1));
        assert_eq!(index, 4);
    }

    #[test]
    fn is_valid_index_bounds() {
        let data = [0u8; 24];
        let reader = Reader64::new(&data);
        assert!(reader.is_valid_index(2));
        assert!(!reader.is_valid_index(3));
    }
}
