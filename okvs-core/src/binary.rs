//! The binary band OKVS.
//!
//! Every key defines one row of a sparse linear system over GF(2): the row has ones only inside a band of `w`
//! consecutive columns starting at `position(key)`, and its right-hand side is the key's value. Encoding solves the
//! system for the `m` codewords, decoding evaluates one row against them.
//!
//! Instead of full Gaussian elimination, rows are inserted one at a time. An inserted row is kept normalized ("ribbon"
//! form): its band is shifted such that bit 0 is set, so the row owns the column at its start position. If that column
//! is already owned by another row, the other row is XORed into the new one, which clears the leading bit, and the new
//! row is normalized again. Every step strictly advances the start position, so insertion costs `O(w)` row operations.
//! Once all rows are placed, a single pass from column `m - 1` down to 0 resolves the codewords. Columns no row owns are
//! filled with random values, which hides the encoded rows among the free columns.

use std::num::NonZeroUsize;
use std::time::Instant;

use itertools::izip;
use rand::{CryptoRng, Rng};
use tracing::instrument;

use crate::{Block, EncodeFailure, OkvsParams, RowHasher, band::Band, batch};

/// A value type the binary engine can encode: an element of a GF(2) vector space.
pub trait XorValue: Clone + Send + Sync {
    /// The zero value of the same shape as `self`.
    fn zero_like(&self) -> Self;

    /// A uniformly random value of the same shape as `self`.
    fn random_like<R: Rng + CryptoRng>(&self, rng: &mut R) -> Self;

    /// `self ^= other`.
    fn xor_assign(&mut self, other: &Self);

    /// Returns `true` if `self` is the zero value.
    fn is_zero(&self) -> bool;

    /// Returns `true` if `self` and `other` can be XORed, e.g. vectors of equal length.
    fn same_shape(&self, _other: &Self) -> bool {
        true
    }
}

impl XorValue for Block {
    fn zero_like(&self) -> Self {
        Block::ZERO
    }

    fn random_like<R: Rng + CryptoRng>(&self, rng: &mut R) -> Self {
        Block::rand(rng)
    }

    fn xor_assign(&mut self, other: &Self) {
        *self ^= *other;
    }

    fn is_zero(&self) -> bool {
        Block::is_zero(self)
    }
}

/// Outcome of normalizing or inserting a single row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowStatus {
    /// The row owns the column at its start position.
    Success,
    /// The band is all-zero but the value is not. The system has no solution with this seed.
    Fail,
    /// Band and value are zero. The row is implied by the other rows and can be skipped.
    AllZero,
}

/// One row of the linear system. Lives only during a single `encode` call.
#[derive(Debug, Clone)]
struct Row<V> {
    /// Start column of the band. Once the row is inserted, this is its pivot column.
    start: usize,
    band: Band,
    value: V,
}

impl<V: XorValue> Row<V> {
    /// Shifts the band so that its first set bit becomes bit 0.
    fn reformalize(&mut self) -> RowStatus {
        match self.band.normalize() {
            Some(shift) => {
                self.start += shift;
                RowStatus::Success
            }
            None if self.value.is_zero() => RowStatus::AllZero,
            None => RowStatus::Fail,
        }
    }

    fn eliminate(&mut self, other: &Row<V>) {
        self.band.xor_assign(&other.band);
        self.value.xor_assign(&other.value);
    }
}

/// Inserts `rows[idx]`, resolving collisions with rows `0..idx` that were inserted before.
///
/// `pivots[c]` holds the index of the row that owns column `c`.
fn insert<V: XorValue>(pivots: &mut [Option<usize>], rows: &mut [Row<V>], idx: usize) -> RowStatus {
    let (inserted, rest) = rows.split_at_mut(idx);
    let row = &mut rest[0];
    loop {
        let status = row.reformalize();
        if status != RowStatus::Success {
            return status;
        }
        match pivots[row.start] {
            Some(owner) => row.eliminate(&inserted[owner]),
            None => {
                pivots[row.start] = Some(idx);
                return RowStatus::Success;
            }
        }
    }
}

/// The binary band OKVS over [`Block`]s or vectors of blocks.
///
/// The engine itself is immutable, so one instance can serve any number of concurrent `decode` calls.
#[derive(Debug, Clone)]
pub struct BinaryOkvs {
    params: OkvsParams,
    hasher: RowHasher,
}

impl BinaryOkvs {
    /// Creates the engine for the given parameters.
    pub fn new(params: OkvsParams) -> Self {
        let hasher = RowHasher::new(&params);
        Self { params, hasher }
    }

    /// The parameters of this instance.
    pub fn params(&self) -> &OkvsParams {
        &self.params
    }

    /// The row hasher of this instance.
    pub fn hasher(&self) -> &RowHasher {
        &self.hasher
    }

    /// Encodes `values[i]` under `keys[i]` and returns the `m` codewords.
    ///
    /// See [`BinaryOkvs::encode_into`].
    ///
    /// The codewords have the shape of the first value. Without any keys they have the shape of `V::default()`; use
    /// [`BinaryOkvs::encode_long`] or [`BinaryOkvs::encode_into`] to fix the shape of vector values instead.
    ///
    /// # Panics
    /// If `keys` and `values` differ in length, there are more keys than the parameters were derived for, or the values
    /// differ in shape.
    pub fn encode<V: XorValue + Default>(&self, keys: &[Block], values: &[V]) -> Result<Vec<V>, EncodeFailure> {
        let template = values.first().cloned().unwrap_or_default();
        let mut codewords = vec![template.zero_like(); self.params.num_columns()];
        self.encode_into(keys, values, &mut codewords)?;
        Ok(codewords)
    }

    /// Encodes `values[i]` under `keys[i]` into the codeword array `out`.
    ///
    /// Encoding is deterministic: equal parameters, keys and values produce equal codewords. On failure `out` is left
    /// untouched and the caller may retry with re-seeded parameters.
    ///
    /// # Errors
    /// [`EncodeFailure::AllZeroConflict`] if a row is eliminated to an all-zero band with a non-zero value. This also
    /// happens for duplicate keys with different values.
    ///
    /// Columns no row owns receive random values of the shape of `out[0]`. Without keys, all codewords are random.
    ///
    /// # Panics
    /// If `keys` and `values` differ in length, there are more keys than the parameters were derived for, `out` does
    /// not have length `m`, or a value differs in shape from `out[0]`.
    #[instrument(level = "debug", skip_all, fields(n = keys.len(), m = self.params.num_columns(), w = self.params.band_width()))]
    pub fn encode_into<V: XorValue>(
        &self,
        keys: &[Block],
        values: &[V],
        out: &mut [V],
    ) -> Result<(), EncodeFailure> {
        assert_eq!(keys.len(), values.len(), "need exactly one value per key");
        assert!(
            keys.len() <= self.params.num_items(),
            "got {} keys, parameters allow at most {}",
            keys.len(),
            self.params.num_items()
        );
        let num_columns = self.params.num_columns();
        assert_eq!(out.len(), num_columns, "codeword array must have m entries");
        // m >= 2 for every derived parameter set
        let template = out[0].zero_like();
        assert!(
            values.iter().all(|v| v.same_shape(&template)),
            "all values must have the shape of the codewords"
        );

        let start = Instant::now();
        let mut rows = izip!(keys, values)
            .map(|(key, value)| Row {
                start: self.hasher.position(key),
                band: self.hasher.band(key),
                value: value.clone(),
            })
            .collect::<Vec<_>>();
        tracing::trace!("hashed rows in {:?}", start.elapsed());

        let start = Instant::now();
        let mut pivots = vec![None; num_columns];
        for idx in 0..rows.len() {
            if insert(&mut pivots, &mut rows, idx) == RowStatus::Fail {
                tracing::debug!("row {idx} has no solution with this seed");
                return Err(EncodeFailure::AllZeroConflict { row: idx });
            }
        }
        tracing::trace!("eliminated rows in {:?}", start.elapsed());

        let start = Instant::now();
        let mut rng = self.params.encode_rng();
        for col in (0..num_columns).rev() {
            out[col] = match pivots[col] {
                Some(owner) => {
                    let row = &rows[owner];
                    let mut value = row.value.clone();
                    // bit 0 is the pivot itself, all other bits reference already resolved columns
                    for offset in row.band.ones().skip(1) {
                        value.xor_assign(&out[col + offset]);
                    }
                    value
                }
                None => template.random_like(&mut rng),
            };
        }
        tracing::trace!("back substitution in {:?}", start.elapsed());
        Ok(())
    }

    /// Recovers the value encoded under `key`.
    ///
    /// Decoding never fails. For a key that was not encoded the result is an unrelated value.
    ///
    /// # Panics
    /// If `codewords` does not have length `m`.
    pub fn decode<V: XorValue>(&self, codewords: &[V], key: &Block) -> V {
        assert_eq!(
            codewords.len(),
            self.params.num_columns(),
            "codeword array must have m entries"
        );
        self.decode_unchecked(codewords, key)
    }

    fn decode_unchecked<V: XorValue>(&self, codewords: &[V], key: &Block) -> V {
        let start = self.hasher.position(key);
        let band = &codewords[start..];
        let mut result = codewords[0].zero_like();
        for offset in self.hasher.band(key).ones() {
            result.xor_assign(&band[offset]);
        }
        result
    }

    /// Decodes all `keys` on `num_threads` worker threads. The result is in the order of `keys`.
    ///
    /// # Panics
    /// If `codewords` does not have length `m`.
    pub fn decode_batch<V: XorValue>(
        &self,
        codewords: &[V],
        keys: &[Block],
        num_threads: NonZeroUsize,
    ) -> Vec<V> {
        assert_eq!(
            codewords.len(),
            self.params.num_columns(),
            "codeword array must have m entries"
        );
        batch::map_parallel(keys, num_threads, |key| {
            self.decode_unchecked(codewords, key)
        })
    }
}
