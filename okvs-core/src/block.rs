//! The 128-bit block used as key type for every OKVS variant and as value type of the binary engine.

use std::ops::{BitXor, BitXorAssign};

use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};

/// A 128-bit block.
///
/// Keys of all OKVS variants are blocks. The binary engine additionally uses blocks (or vectors of blocks) as values,
/// where addition is XOR.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Block(u128);

impl Block {
    /// The all-zero block.
    pub const ZERO: Block = Block(0);

    /// Size of a block in bytes.
    pub const BYTES: usize = 16;

    /// Construct a block from its 128-bit integer representation.
    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    /// Sample a uniformly random block.
    pub fn rand<R: Rng + CryptoRng>(rng: &mut R) -> Self {
        Self(rng.r#gen())
    }

    /// Returns `true` if all bits are zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Little-endian byte representation. This is the representation fed into the row hash functions.
    pub fn to_le_bytes(self) -> [u8; Self::BYTES] {
        self.0.to_le_bytes()
    }

    /// Inverse of [`Block::to_le_bytes`].
    pub fn from_le_bytes(bytes: [u8; Self::BYTES]) -> Self {
        Self(u128::from_le_bytes(bytes))
    }

    /// Returns the block as integer.
    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl From<u128> for Block {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl From<u64> for Block {
    fn from(value: u64) -> Self {
        Self(u128::from(value))
    }
}

impl From<Block> for u128 {
    fn from(value: Block) -> Self {
        value.0
    }
}

impl BitXor for Block {
    type Output = Block;

    fn bitxor(self, rhs: Self) -> Self::Output {
        Block(self.0 ^ rhs.0)
    }
}

impl BitXorAssign for Block {
    fn bitxor_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}
