//! The two keyed hash functions that place a key's row in the linear system.
//!
//! Both are BLAKE3 over `sub-seed || key`:
//! * `position` reads the first 8 output bytes as big-endian integer and reduces it modulo `m - w`.
//! * `band` reads `ceil(w / 8)` output bytes as a bit string (MSB-first) and masks the trailing byte to exactly `w`
//!   significant bits.

use ark_ff::Field;

use crate::{Block, OkvsParams, band::Band};

/// Computes start position and band of a key's row.
#[derive(Debug, Clone)]
pub struct RowHasher {
    position_seed: Block,
    band_seed: Block,
    num_columns: usize,
    band_width: usize,
}

impl RowHasher {
    /// Creates the hasher for the given parameters.
    pub fn new(params: &OkvsParams) -> Self {
        Self {
            position_seed: params.position_seed(),
            band_seed: params.band_seed(),
            num_columns: params.num_columns(),
            band_width: params.band_width(),
        }
    }

    /// The band width `w`.
    pub fn band_width(&self) -> usize {
        self.band_width
    }

    /// Start column of the key's band, in `[0, m - w)`.
    ///
    /// If `m == w` every band spans the whole codeword array and the start is always 0.
    pub fn position(&self, key: &Block) -> usize {
        let range = (self.num_columns - self.band_width) as u64;
        if range == 0 {
            return 0;
        }
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.position_seed.to_le_bytes());
        hasher.update(&key.to_le_bytes());
        let hash = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.as_bytes()[..8]);
        // the remainder is smaller than m, so it fits
        (u64::from_be_bytes(prefix) % range) as usize
    }

    /// The `w` band bits of the key as `ceil(w / 8)` bytes, MSB-first. Unused low bits of the last byte are zero.
    pub fn band_bytes(&self, key: &Block) -> Vec<u8> {
        let mut out = vec![0u8; self.band_width.div_ceil(8)];
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.band_seed.to_le_bytes());
        hasher.update(&key.to_le_bytes());
        hasher.finalize_xof().fill(&mut out);
        let tail = self.band_width % 8;
        if tail != 0 {
            if let Some(last) = out.last_mut() {
                *last &= !(0xFFu8 >> tail);
            }
        }
        out
    }

    /// The key's band as bit band for the binary engine.
    pub(crate) fn band(&self, key: &Block) -> Band {
        Band::from_be_bytes(&self.band_bytes(key), Band::num_words(self.band_width))
    }

    /// The key's band as `w` field elements. The coefficient alphabet is `{0, 1}` regardless of the field.
    pub fn band_scalars<F: Field>(&self, key: &Block) -> Vec<F> {
        let bytes = self.band_bytes(key);
        (0..self.band_width)
            .map(|i| {
                if (bytes[i / 8] >> (7 - i % 8)) & 1 == 1 {
                    F::ONE
                } else {
                    F::ZERO
                }
            })
            .collect()
    }
}
