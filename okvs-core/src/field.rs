//! The band OKVS over the scalar field of a prime-order group.
//!
//! Rows have the same shape as in the binary engine (a band of `w` coefficients starting at `position(key)`), but the
//! values are vectors of scalars and the system is solved over the scalar field. The coefficients are still drawn from
//! `{0, 1}`.
//!
//! Rows are sorted by start position and reduced by banded Gaussian elimination: the first non-zero coefficient of each
//! row becomes its pivot, the row is scaled so the pivot is one, and the pivot column is cleared from all following rows
//! whose band reaches it. Back substitution runs from the last row to the first. Columns without pivot keep the random
//! scalar they were initialized with.
//!
//! Optionally, the solved codewords are lifted into the group by multiplying a base point with each scalar. Decoding a
//! lifted codeword array only needs the group operation, so a decoder only ever learns `value * base`.

use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::time::Instant;

use ark_ec::{CurveGroup, PrimeGroup};
use ark_ff::{Field, UniformRand, Zero as _};
use itertools::izip;
use tracing::instrument;

use crate::{Block, EncodeFailure, OkvsParams, RowHasher, batch};

type Scalar<G> = <G as PrimeGroup>::ScalarField;
type Affine<G> = <G as CurveGroup>::Affine;

/// One row of the linear system over the scalar field.
#[derive(Debug, Clone)]
struct FieldRow<F> {
    start: usize,
    /// Absolute pivot column, set during elimination.
    pivot: Option<usize>,
    band: Vec<F>,
    value: Vec<F>,
}

/// The band OKVS over the scalar field of `G`, with optional lift into `G`.
#[derive(Debug, Clone)]
pub struct FieldOkvs<G: CurveGroup> {
    params: OkvsParams,
    hasher: RowHasher,
    _group: PhantomData<fn() -> G>,
}

impl<G: CurveGroup> FieldOkvs<G> {
    /// Creates the engine for the given parameters.
    ///
    /// The band width of `params` is used as is. It was calibrated for the binary engine; with `{0, 1}` coefficients
    /// over a large prime field the elimination fails at most as often as over GF(2).
    pub fn new(params: OkvsParams) -> Self {
        let hasher = RowHasher::new(&params);
        Self {
            params,
            hasher,
            _group: PhantomData,
        }
    }

    /// The parameters of this instance.
    pub fn params(&self) -> &OkvsParams {
        &self.params
    }

    /// Encodes the scalar vectors `values[i]` (each of length `value_len`) under `keys[i]`.
    ///
    /// Encoding is deterministic: equal parameters, keys and values produce equal codewords.
    ///
    /// # Errors
    /// [`EncodeFailure::InsufficientPivots`] if the rows are linearly dependent with this seed. Duplicate keys always
    /// fail.
    ///
    /// # Panics
    /// If `keys` and `values` differ in length, there are more keys than the parameters were derived for, or a value
    /// does not have `value_len` elements.
    #[instrument(level = "debug", skip_all, fields(n = keys.len(), m = self.params.num_columns(), w = self.params.band_width()))]
    pub fn encode(
        &self,
        keys: &[Block],
        values: &[Vec<Scalar<G>>],
        value_len: usize,
    ) -> Result<Vec<Vec<Scalar<G>>>, EncodeFailure> {
        assert_eq!(keys.len(), values.len(), "need exactly one value per key");
        assert!(
            keys.len() <= self.params.num_items(),
            "got {} keys, parameters allow at most {}",
            keys.len(),
            self.params.num_items()
        );
        assert!(
            values.iter().all(|v| v.len() == value_len),
            "all values must have {value_len} elements"
        );
        let num_columns = self.params.num_columns();

        let start = Instant::now();
        let mut rng = self.params.encode_rng();
        let mut codewords = (0..num_columns)
            .map(|_| {
                (0..value_len)
                    .map(|_| Scalar::<G>::rand(&mut rng))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let mut rows = izip!(keys, values)
            .map(|(key, value)| FieldRow {
                start: self.hasher.position(key),
                pivot: None,
                band: self.hasher.band_scalars(key),
                value: value.clone(),
            })
            .collect::<Vec<_>>();
        rows.sort_by_key(|row| row.start);
        tracing::trace!("hashed and sorted rows in {:?}", start.elapsed());

        let start = Instant::now();
        let pivots = eliminate(&mut rows);
        if pivots != rows.len() {
            tracing::debug!("only {pivots} of {} rows have a pivot", rows.len());
            return Err(EncodeFailure::InsufficientPivots {
                pivots,
                expected: rows.len(),
            });
        }
        tracing::trace!("eliminated rows in {:?}", start.elapsed());

        let start = Instant::now();
        for row in rows.iter().rev() {
            let Some(pivot) = row.pivot else {
                continue;
            };
            let mut value = row.value.clone();
            for (offset, coeff) in row.band.iter().enumerate() {
                let col = row.start + offset;
                if coeff.is_zero() || col == pivot {
                    continue;
                }
                for (v, c) in value.iter_mut().zip(&codewords[col]) {
                    *v -= *c * coeff;
                }
            }
            codewords[pivot] = value;
        }
        tracing::trace!("back substitution in {:?}", start.elapsed());
        Ok(codewords)
    }

    /// Like [`FieldOkvs::encode`], but publishes `codeword * G::generator()` instead of the scalar codewords.
    pub fn encode_lifted(
        &self,
        keys: &[Block],
        values: &[Vec<Scalar<G>>],
        value_len: usize,
    ) -> Result<Vec<Vec<Affine<G>>>, EncodeFailure> {
        self.encode_lifted_with_base(G::generator(), keys, values, value_len)
    }

    /// Like [`FieldOkvs::encode`], but publishes `codeword * base` instead of the scalar codewords.
    pub fn encode_lifted_with_base(
        &self,
        base: G,
        keys: &[Block],
        values: &[Vec<Scalar<G>>],
        value_len: usize,
    ) -> Result<Vec<Vec<Affine<G>>>, EncodeFailure> {
        let scalars = self.encode(keys, values, value_len)?;
        let start = Instant::now();
        let points = scalars
            .iter()
            .flatten()
            .map(|s| base * s)
            .collect::<Vec<_>>();
        let points = G::normalize_batch(&points);
        tracing::trace!("lifted codewords in {:?}", start.elapsed());
        if value_len == 0 {
            return Ok(vec![Vec::new(); scalars.len()]);
        }
        Ok(points.chunks(value_len).map(<[_]>::to_vec).collect())
    }

    /// Recovers the scalar vector encoded under `key` from scalar codewords.
    ///
    /// # Panics
    /// If `codewords` does not have length `m`.
    pub fn decode(&self, codewords: &[Vec<Scalar<G>>], key: &Block) -> Vec<Scalar<G>> {
        self.assert_num_columns(codewords.len());
        self.decode_unchecked(codewords, key)
    }

    fn decode_unchecked(&self, codewords: &[Vec<Scalar<G>>], key: &Block) -> Vec<Scalar<G>> {
        let start = self.hasher.position(key);
        let mut result = vec![Scalar::<G>::zero(); codewords[0].len()];
        for (offset, coeff) in self.hasher.band_scalars::<Scalar<G>>(key).iter().enumerate() {
            if coeff.is_zero() {
                continue;
            }
            for (r, c) in result.iter_mut().zip(&codewords[start + offset]) {
                *r += *c * coeff;
            }
        }
        result
    }

    /// Recovers `value * base` for the value encoded under `key` from lifted codewords.
    ///
    /// # Panics
    /// If `codewords` does not have length `m`.
    pub fn decode_lifted(&self, codewords: &[Vec<Affine<G>>], key: &Block) -> Vec<Affine<G>> {
        self.assert_num_columns(codewords.len());
        self.decode_lifted_unchecked(codewords, key)
    }

    fn decode_lifted_unchecked(&self, codewords: &[Vec<Affine<G>>], key: &Block) -> Vec<Affine<G>> {
        let start = self.hasher.position(key);
        let mut result = vec![G::zero(); codewords[0].len()];
        // coefficients are 0/1, so the band bits select the codewords to add
        for offset in self.hasher.band(key).ones() {
            for (r, c) in result.iter_mut().zip(&codewords[start + offset]) {
                *r += *c;
            }
        }
        G::normalize_batch(&result)
    }

    /// Batched [`FieldOkvs::decode`] on `num_threads` workers.
    pub fn decode_batch(
        &self,
        codewords: &[Vec<Scalar<G>>],
        keys: &[Block],
        num_threads: NonZeroUsize,
    ) -> Vec<Vec<Scalar<G>>> {
        self.assert_num_columns(codewords.len());
        batch::map_parallel(keys, num_threads, |key| {
            self.decode_unchecked(codewords, key)
        })
    }

    /// Batched [`FieldOkvs::decode_lifted`] on `num_threads` workers.
    pub fn decode_lifted_batch(
        &self,
        codewords: &[Vec<Affine<G>>],
        keys: &[Block],
        num_threads: NonZeroUsize,
    ) -> Vec<Vec<Affine<G>>> {
        self.assert_num_columns(codewords.len());
        batch::map_parallel(keys, num_threads, |key| {
            self.decode_lifted_unchecked(codewords, key)
        })
    }

    fn assert_num_columns(&self, len: usize) {
        assert_eq!(
            len,
            self.params.num_columns(),
            "codeword array must have m entries"
        );
    }
}

/// Forward elimination over rows sorted by start position. Returns the number of rows that received a pivot.
fn eliminate<F: Field>(rows: &mut [FieldRow<F>]) -> usize {
    let mut pivots = 0;
    for idx in 0..rows.len() {
        let (head, tail) = rows.split_at_mut(idx + 1);
        let row = &mut head[idx];
        let Some(lead) = row.band.iter().position(|c| !c.is_zero()) else {
            continue;
        };
        let pivot = row.start + lead;
        row.pivot = Some(pivot);
        pivots += 1;

        let coeff = row.band[lead];
        if !coeff.is_one() {
            let inv = coeff.inverse().expect("leading coefficient is non-zero");
            row.band[lead..].iter_mut().for_each(|c| *c *= inv);
            row.value.iter_mut().for_each(|v| *v *= inv);
        }

        // rows are sorted, so only a prefix of the tail reaches the pivot column
        for other in tail.iter_mut() {
            if other.start > pivot {
                break;
            }
            let offset = pivot - other.start;
            let multiplier = other.band[offset];
            if multiplier.is_zero() {
                continue;
            }
            for (o, c) in other.band[offset..].iter_mut().zip(&row.band[lead..]) {
                *o -= *c * multiplier;
            }
            for (o, v) in other.value.iter_mut().zip(&row.value) {
                *o -= *v * multiplier;
            }
        }
    }
    pivots
}
