#![deny(missing_docs, clippy::unwrap_used)]
//! A band-based oblivious key-value store (OKVS).
//!
//! An OKVS encodes a set of key-value pairs into a codeword array that is only slightly larger than the set, such that
//! the value of every encoded key can be recovered from the array, while the array hides which keys were encoded. This
//! crate implements the "random band" construction: each key is hashed to a row with a short random band of
//! coefficients at a random position, and encoding solves the resulting sparse linear system.
//!
//! The crate provides
//! - [`OkvsParams`] to derive the system shape (`m` columns, band width `w`) from the number of items, the overhead
//!   `epsilon`, the statistical security parameter and a seed,
//! - [`RowHasher`], the deterministic key-to-row mapping,
//! - [`BinaryOkvs`], the engine over GF(2) for [`Block`]s and long values (`Vec<Block>`),
//! - [`FieldOkvs`], the engine over the scalar field of an elliptic curve group, with optional lift into the group.
//!
//! Encoding is randomized but deterministic given the parameters, so two encoders with equal [`OkvsParams`] produce
//! equal codeword arrays. Encoding may fail with small probability; retry with [`OkvsParams::reseed`].
//!
//! ```
//! use okvs_core::{BinaryOkvs, Block, OkvsParams};
//!
//! let params = OkvsParams::derive(1024, 0.1, 40, Block::new(1)).unwrap();
//! let okvs = BinaryOkvs::new(params);
//! let keys = (0..1024u64).map(Block::from).collect::<Vec<_>>();
//! let values = (0..1024u64).map(|i| Block::from(i * i)).collect::<Vec<_>>();
//! let codewords = okvs.encode(&keys, &values).unwrap();
//! assert_eq!(okvs.decode(&codewords, &keys[17]), Block::new(289));
//! ```

mod band;
mod batch;
pub mod binary;
pub mod block;
pub mod config;
pub mod error;
pub mod field;
pub mod hasher;
pub mod long_value;
pub mod params;

pub use binary::BinaryOkvs;
pub use binary::XorValue;
pub use block::Block;
pub use config::OkvsConfig;
pub use error::EncodeFailure;
pub use field::FieldOkvs;
pub use hasher::RowHasher;
pub use long_value::PackError;
pub use long_value::pack_biguint;
pub use long_value::unpack_biguint;
pub use params::ConfigError;
pub use params::OkvsParams;
