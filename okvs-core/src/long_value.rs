//! Long values for the binary OKVS.
//!
//! A long value is a fixed number of [`Block`]s, XORed element-wise. Protocols use it to encode ciphertext-sized
//! payloads, e.g. Paillier ciphertexts packed with [`pack_biguint`].

use std::num::NonZeroUsize;

use num_bigint::BigUint;
use rand::{CryptoRng, Rng};

use crate::{BinaryOkvs, Block, EncodeFailure, XorValue};

/// Error returned by [`pack_biguint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PackError {
    /// The integer needs more bits than the blocks provide.
    #[error("value has {bits} bits, but only {capacity} fit")]
    ValueTooLarge {
        /// Bit length of the value
        bits: u64,
        /// Number of bits in the requested blocks
        capacity: u64,
    },
}

impl XorValue for Vec<Block> {
    fn zero_like(&self) -> Self {
        vec![Block::ZERO; self.len()]
    }

    fn random_like<R: Rng + CryptoRng>(&self, rng: &mut R) -> Self {
        (0..self.len()).map(|_| Block::rand(rng)).collect()
    }

    fn xor_assign(&mut self, other: &Self) {
        assert_eq!(self.len(), other.len(), "cannot XOR long values of different length");
        for (a, b) in self.iter_mut().zip(other) {
            *a ^= *b;
        }
    }

    fn is_zero(&self) -> bool {
        self.iter().all(Block::is_zero)
    }

    fn same_shape(&self, other: &Self) -> bool {
        self.len() == other.len()
    }
}

/// Splits `value` into `len` little-endian blocks, zero-padded.
///
/// # Errors
/// Returns [`PackError::ValueTooLarge`] if `value` does not fit into `len` blocks.
pub fn pack_biguint(value: &BigUint, len: usize) -> Result<Vec<Block>, PackError> {
    let capacity = (len * Block::BYTES * 8) as u64;
    if value.bits() > capacity {
        return Err(PackError::ValueTooLarge {
            bits: value.bits(),
            capacity,
        });
    }
    let mut bytes = value.to_bytes_le();
    bytes.resize(len * Block::BYTES, 0);
    Ok(bytes
        .chunks_exact(Block::BYTES)
        .map(|chunk| {
            let mut buf = [0u8; Block::BYTES];
            buf.copy_from_slice(chunk);
            Block::from_le_bytes(buf)
        })
        .collect())
}

/// Inverse of [`pack_biguint`].
pub fn unpack_biguint(blocks: &[Block]) -> BigUint {
    let bytes = blocks
        .iter()
        .flat_map(|b| b.to_le_bytes())
        .collect::<Vec<_>>();
    BigUint::from_bytes_le(&bytes)
}

impl BinaryOkvs {
    /// Encodes long values of exactly `value_len` blocks each.
    ///
    /// Same as [`BinaryOkvs::encode`], with every codeword being a vector of `value_len` blocks, also if there are no
    /// keys.
    ///
    /// # Panics
    /// If any value does not have `value_len` blocks, or for the reasons listed at [`BinaryOkvs::encode_into`].
    pub fn encode_long(
        &self,
        keys: &[Block],
        values: &[Vec<Block>],
        value_len: usize,
    ) -> Result<Vec<Vec<Block>>, EncodeFailure> {
        assert!(value_len > 0, "long values need at least one block");
        assert!(
            values.iter().all(|v| v.len() == value_len),
            "all values must have {value_len} blocks"
        );
        let mut codewords = vec![vec![Block::ZERO; value_len]; self.params().num_columns()];
        self.encode_into(keys, values, &mut codewords)?;
        Ok(codewords)
    }

    /// Decodes a long value. The value length is taken from the codewords.
    pub fn decode_long(&self, codewords: &[Vec<Block>], key: &Block) -> Vec<Block> {
        self.decode(codewords, key)
    }

    /// Batched [`BinaryOkvs::decode_long`] on `num_threads` workers.
    pub fn decode_long_batch(
        &self,
        codewords: &[Vec<Block>],
        keys: &[Block],
        num_threads: NonZeroUsize,
    ) -> Vec<Vec<Block>> {
        self.decode_batch(codewords, keys, num_threads)
    }
}
