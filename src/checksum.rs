//! CRC-32 checksum

use crc32fast::Hasher;

/// CRC-32 engine, IEEE polynomial `0x04C11DB7` (reflected `0xEDB88320`)
///
/// # Examples
///
/// ```
/// use msdk_examples::checksum::Checksum;
///
/// let mut checksum = Checksum::new();
/// checksum.write(b"123456789");
/// assert_eq!(checksum.result(), 0xCBF4_3926);
/// ```
#[derive(Clone, Default)]
pub struct Checksum {
    hasher: Hasher,
}

impl Checksum {
    pub fn new() -> Self {
        Checksum {
            hasher: Hasher::new(),
        }
    }

    /// Clears the engine state.
    #[inline(always)]
    pub fn reset(&mut self) {
        self.hasher.reset();
    }

    #[inline(always)]
    pub fn write(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Feeds 32-bit words in little endian byte order, the order they are stored in flash.
    pub fn write_words(&mut self, words: &[u32]) {
        for word in words {
            self.hasher.update(&word.to_le_bytes());
        }
    }

    /// CRC of everything written since the last reset
    #[inline(always)]
    pub fn result(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_are_little_endian() {
        let mut words = Checksum::new();
        words.write_words(&[0x0403_0201]);
        let mut bytes = Checksum::new();
        bytes.write(&[1, 2, 3, 4]);
        assert_eq!(words.result(), bytes.result());
    }

    #[test]
    fn reset_starts_over() {
        let mut checksum = Checksum::new();
        checksum.write(b"garbage");
        checksum.reset();
        checksum.write(b"123456789");
        assert_eq!(checksum.result(), 0xCBF4_3926);
    }
}
