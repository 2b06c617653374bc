//! Bit band of a binary OKVS row.
//!
//! Bit `i` of a band refers to column `start + i` of the linear system. Bits are stored MSB-first in 64-bit words, i.e.,
//! bit `i` is bit `63 - i % 64` of word `i / 64`. This is the order in which the row hasher reads its output, so a band
//! can be filled directly from hash bytes.

use crate::Block;

const WORD_BITS: usize = u64::BITS as usize;

/// A fixed-capacity band of `64 * words` bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Band {
    words: Box<[u64]>,
}

impl Band {
    /// Number of words needed for a band of width `w`. Bands are materialized in whole blocks.
    pub(crate) fn num_words(width: usize) -> usize {
        width.div_ceil(Block::BYTES * 8) * 2
    }

    /// Builds a band from hash output read MSB-first. Missing trailing bytes are zero.
    pub(crate) fn from_be_bytes(bytes: &[u8], num_words: usize) -> Self {
        debug_assert!(bytes.len() <= num_words * 8);
        let mut words = vec![0u64; num_words].into_boxed_slice();
        for (word, chunk) in words.iter_mut().zip(bytes.chunks(8)) {
            let mut buf = [0u8; 8];
            buf[..chunk.len()].copy_from_slice(chunk);
            *word = u64::from_be_bytes(buf);
        }
        Self { words }
    }

    /// Index of the first set bit, or `None` if the band is all-zero.
    pub(crate) fn first_one(&self) -> Option<usize> {
        self.words
            .iter()
            .position(|w| *w != 0)
            .map(|idx| idx * WORD_BITS + self.words[idx].leading_zeros() as usize)
    }

    /// Moves bit `i + n` to bit `i`, filling the tail with zeros.
    pub(crate) fn shift_left(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let len = self.words.len();
        let word_shift = n / WORD_BITS;
        let bit_shift = n % WORD_BITS;
        for i in 0..len {
            let hi = self.words.get(i + word_shift).copied().unwrap_or(0);
            self.words[i] = if bit_shift == 0 {
                hi
            } else {
                let lo = self.words.get(i + word_shift + 1).copied().unwrap_or(0);
                (hi << bit_shift) | (lo >> (WORD_BITS - bit_shift))
            };
        }
    }

    /// Shifts the band such that bit 0 is set and returns the shift amount, or `None` if the band is all-zero.
    pub(crate) fn normalize(&mut self) -> Option<usize> {
        let shift = self.first_one()?;
        self.shift_left(shift);
        Some(shift)
    }

    pub(crate) fn xor_assign(&mut self, other: &Band) {
        debug_assert_eq!(self.words.len(), other.words.len());
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a ^= *b;
        }
    }

    /// Iterates the indices of all set bits in increasing order.
    pub(crate) fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(idx, word)| {
            let mut word = *word;
            std::iter::from_fn(move || {
                if word == 0 {
                    return None;
                }
                let lz = word.leading_zeros() as usize;
                word &= !(1u64 << (WORD_BITS - 1 - lz));
                Some(idx * WORD_BITS + lz)
            })
        })
    }
}
