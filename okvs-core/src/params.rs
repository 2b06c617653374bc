//! Parameter derivation for the band OKVS.
//!
//! The failure probability of the band construction has no closed form that is cheap to evaluate at run time. Instead,
//! the band width is read off a piecewise-linear model that was fitted against measured failure rates: for each
//! supported `epsilon` and each range of `log2(n)`, the statistical security behaves like `lambda = a * w - b`, so we
//! pick `w = ceil((lambda + b) / a)`.
//!
//! Derivation also expands a single 128-bit seed into the independent seed material of the two row hash functions and
//! the seed for the randomness used during encoding. See [`OkvsParams::derive`].

use rand::{Rng as _, SeedableRng as _};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use crate::Block;

const SEED_EXPANSION_CONTEXT: &str = "TACEO:OKVS 2025-06-01 band okvs seed expansion";
const ENCODE_RNG_CONTEXT: &str = "TACEO:OKVS 2025-06-01 band okvs encode randomness";

/// Two `epsilon` values are considered equal if they differ by less than this.
const EPSILON_TOLERANCE: f64 = 1e-5;

/// Errors returned when deriving [`OkvsParams`].
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// There is no calibration for the requested `epsilon`.
    #[error("no calibrated band width for epsilon {epsilon}, supported: 0.03, 0.05, 0.07, 0.1")]
    UnsupportedScaler {
        /// The rejected epsilon
        epsilon: f64,
    },
    /// An OKVS must encode at least one item.
    #[error("cannot build an OKVS for zero items")]
    EmptyInput,
    /// The number of columns does not fit the index type.
    #[error("{n} items exceed the supported OKVS size")]
    TooManyItems {
        /// The requested number of items
        n: u64,
    },
}

/// One fitted line `lambda = slope * w - offset`, valid up to `2^max_log_n` items.
#[derive(Debug, Clone, Copy)]
struct Regression {
    max_log_n: u32,
    slope: f64,
    offset: f64,
    min_band_width: usize,
}

impl Regression {
    const fn new(max_log_n: u32, slope: f64, offset: f64) -> Self {
        Self {
            max_log_n,
            slope,
            offset,
            min_band_width: 0,
        }
    }

    const fn with_min_band_width(mut self, min_band_width: usize) -> Self {
        self.min_band_width = min_band_width;
        self
    }

    fn band_width(&self, stat_sec_param: u64) -> usize {
        let w = ((stat_sec_param as f64 + self.offset) / self.slope).ceil() as usize;
        w.max(self.min_band_width)
    }
}

/// The calibration for one `epsilon`. Ranges are sorted by `max_log_n`.
struct Calibration {
    epsilon: f64,
    /// `epsilon` in thousandths, used to compute the number of columns without rounding errors
    epsilon_per_mille: u64,
    ranges: &'static [Regression],
}

impl Calibration {
    /// `ceil((1 + epsilon) * n)`, or `None` on overflow.
    fn num_columns(&self, n: u64) -> Option<usize> {
        let n = u128::from(n);
        let extra = (n * u128::from(self.epsilon_per_mille)).div_ceil(1000);
        usize::try_from(n + extra).ok()
    }

    fn regression(&self, log_n: u32) -> &Regression {
        let last = self.ranges.last().expect("calibration tables are non-empty");
        match self.ranges.iter().find(|r| log_n <= r.max_log_n) {
            Some(regression) => regression,
            None => {
                tracing::warn!(
                    "no calibrated band width for 2^{log_n} items with epsilon {}, using the one for 2^{}",
                    self.epsilon,
                    last.max_log_n
                );
                last
            }
        }
    }
}

const CALIBRATIONS: &[Calibration] = &[
    Calibration {
        epsilon: 0.03,
        epsilon_per_mille: 30,
        ranges: &[
            Regression::new(10, 0.08047, 3.464),
            Regression::new(14, 0.08253, 5.751),
            Regression::new(16, 0.08241, 7.023),
            Regression::new(18, 0.08192, 8.569),
            Regression::new(20, 0.08313, 10.880),
            Regression::new(24, 0.08253, 14.671),
        ],
    },
    Calibration {
        epsilon: 0.05,
        epsilon_per_mille: 50,
        ranges: &[
            Regression::new(10, 0.1388, 4.424),
            Regression::new(14, 0.1389, 6.976),
            Regression::new(16, 0.1399, 8.942),
            Regression::new(18, 0.1388, 10.710),
            Regression::new(20, 0.1407, 12.920),
            Regression::new(24, 0.1376, 16.741),
        ],
    },
    Calibration {
        epsilon: 0.07,
        epsilon_per_mille: 70,
        ranges: &[
            Regression::new(10, 0.1947, 5.383),
            Regression::new(14, 0.1926, 8.150),
            Regression::new(16, 0.1961, 10.430),
            Regression::new(18, 0.1955, 12.300),
            Regression::new(20, 0.1939, 14.100),
        ],
    },
    Calibration {
        epsilon: 0.1,
        epsilon_per_mille: 100,
        ranges: &[
            Regression::new(10, 0.2747, 6.296).with_min_band_width(64),
            Regression::new(14, 0.2685, 9.339),
            Regression::new(16, 0.2740, 11.610),
            Regression::new(18, 0.2715, 13.390),
            Regression::new(20, 0.2691, 15.210),
            Regression::new(24, 0.2751, 19.830),
            Regression::new(26, 0.2730, 21.450),
            Regression::new(28, 0.2725, 23.100),
            Regression::new(30, 0.2720, 25.750),
        ],
    },
];

/// Looks up the calibration for `epsilon`.
fn calibration(epsilon: f64) -> Result<&'static Calibration, ConfigError> {
    CALIBRATIONS
        .iter()
        .find(|c| (c.epsilon - epsilon).abs() < EPSILON_TOLERANCE)
        .ok_or(ConfigError::UnsupportedScaler { epsilon })
}

/// `ceil(log2(n))` for `n >= 1`.
fn log2_ceil(n: u64) -> u32 {
    n.next_power_of_two().trailing_zeros()
}

/// The immutable parameters of one OKVS instance.
///
/// Holds the shape of the linear system (`n` rows, `m` columns, band width `w`) and the seed material of the row hash
/// functions and the encoder. Two parties that hold equal [`OkvsParams`] compute identical rows for every key, which is
/// why the struct is serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OkvsParams {
    num_items: usize,
    scaler: f64,
    stat_sec_param: u64,
    band_width: usize,
    num_columns: usize,
    position_seed: Block,
    band_seed: Block,
    encode_seed: Block,
}

impl OkvsParams {
    /// Derives the parameters for encoding `n` items with a codeword array of size `ceil((1 + epsilon) * n)`.
    ///
    /// The band width is chosen such that encoding fails with probability at most `2^-stat_sec_param`. It is never larger
    /// than the number of columns. If `n` is larger than the largest calibrated range, the band width of the largest
    /// range is used.
    ///
    /// # Errors
    /// * [`ConfigError::UnsupportedScaler`] if `epsilon` is not one of 0.03, 0.05, 0.07 or 0.1.
    /// * [`ConfigError::EmptyInput`] if `n` is zero.
    /// * [`ConfigError::TooManyItems`] if the number of columns does not fit into `usize`.
    pub fn derive(n: u64, epsilon: f64, stat_sec_param: u64, seed: Block) -> Result<Self, ConfigError> {
        let calibration = calibration(epsilon)?;
        if n == 0 {
            return Err(ConfigError::EmptyInput);
        }
        let num_columns = calibration
            .num_columns(n)
            .ok_or(ConfigError::TooManyItems { n })?;
        let band_width = calibration
            .regression(log2_ceil(n))
            .band_width(stat_sec_param)
            .min(num_columns);

        let (position_seed, band_seed, encode_seed) = expand_seed(seed);
        Ok(Self {
            num_items: usize::try_from(n).map_err(|_| ConfigError::TooManyItems { n })?,
            scaler: 1.0 + calibration.epsilon,
            stat_sec_param,
            band_width,
            num_columns,
            position_seed,
            band_seed,
            encode_seed,
        })
    }

    /// Returns a copy of these parameters with fresh seed material derived from `seed`.
    ///
    /// The shape (`n`, `m`, `w`) is unchanged. Callers use this to retry after an [`crate::EncodeFailure`].
    pub fn reseed(&self, seed: Block) -> Self {
        let (position_seed, band_seed, encode_seed) = expand_seed(seed);
        Self {
            position_seed,
            band_seed,
            encode_seed,
            ..self.clone()
        }
    }

    /// The number of items `n` (rows of the linear system).
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// The ratio `1 + epsilon` between codeword array size and number of items.
    pub fn scaler(&self) -> f64 {
        self.scaler
    }

    /// The statistical security parameter the band width was derived for.
    pub fn stat_sec_param(&self) -> u64 {
        self.stat_sec_param
    }

    /// The band width `w`.
    pub fn band_width(&self) -> usize {
        self.band_width
    }

    /// The number of columns `m`, i.e., the length of the codeword array.
    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    pub(crate) fn position_seed(&self) -> Block {
        self.position_seed
    }

    pub(crate) fn band_seed(&self) -> Block {
        self.band_seed
    }

    /// A fresh generator for the randomness consumed by one `encode` call.
    pub(crate) fn encode_rng(&self) -> ChaCha20Rng {
        rng_from_block(ENCODE_RNG_CONTEXT, self.encode_seed)
    }
}

fn rng_from_block(context: &str, seed: Block) -> ChaCha20Rng {
    ChaCha20Rng::from_seed(blake3::derive_key(context, &seed.to_le_bytes()))
}

/// Expands `seed` into (position seed, band seed, encode seed).
fn expand_seed(seed: Block) -> (Block, Block, Block) {
    let mut rng = rng_from_block(SEED_EXPANSION_CONTEXT, seed);
    let position = Block::new(rng.r#gen());
    let band = Block::new(rng.r#gen());
    let encode = Block::new(rng.r#gen());
    (position, band, encode)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: Block = Block::new(6800382592637124185);

    #[test]
    fn test_log2_ceil() {
        assert_eq!(log2_ceil(1), 0);
        assert_eq!(log2_ceil(2), 1);
        assert_eq!(log2_ceil(3), 2);
        assert_eq!(log2_ceil(1024), 10);
        assert_eq!(log2_ceil(1025), 11);
    }

    #[test]
    fn test_derive_1024() {
        let params = OkvsParams::derive(1024, 0.1, 40, SEED).unwrap();
        assert_eq!(params.num_items(), 1024);
        assert_eq!(params.num_columns(), 1127);
        // ceil((40 + 6.296) / 0.2747) = 169
        assert_eq!(params.band_width(), 169);
    }

    #[test]
    fn test_small_lambda_is_clamped_to_64() {
        let params = OkvsParams::derive(1024, 0.1, 1, SEED).unwrap();
        assert_eq!(params.band_width(), 64);
        // the floor only applies to the smallest range
        let params = OkvsParams::derive(1 << 12, 0.1, 1, SEED).unwrap();
        assert!(params.band_width() < 64);
    }

    #[test]
    fn test_band_width_never_exceeds_columns() {
        let params = OkvsParams::derive(50, 0.1, 40, SEED).unwrap();
        assert_eq!(params.num_columns(), 55);
        assert_eq!(params.band_width(), 55);
    }

    #[test]
    fn test_num_columns_is_exact() {
        let params = OkvsParams::derive(1000, 0.03, 40, SEED).unwrap();
        assert_eq!(params.num_columns(), 1030);
        let params = OkvsParams::derive(1001, 0.05, 40, SEED).unwrap();
        assert_eq!(params.num_columns(), 1052);
        let params = OkvsParams::derive(1, 0.07, 40, SEED).unwrap();
        assert_eq!(params.num_columns(), 2);
        assert_eq!(params.band_width(), 2);
    }

    #[test]
    fn test_unsupported_scaler() {
        assert_eq!(
            OkvsParams::derive(1024, 0.5, 40, SEED),
            Err(ConfigError::UnsupportedScaler { epsilon: 0.5 })
        );
        // close, but not close enough
        assert!(OkvsParams::derive(1024, 0.101, 40, SEED).is_err());
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(
            OkvsParams::derive(0, 0.1, 40, SEED),
            Err(ConfigError::EmptyInput)
        );
    }

    #[test]
    fn test_beyond_calibrated_range() {
        // 2^22 items with epsilon 0.07 uses the 2^20 line
        let params = OkvsParams::derive(1 << 22, 0.07, 40, SEED).unwrap();
        assert_eq!(
            params.band_width(),
            ((40.0 + 14.100) / 0.1939_f64).ceil() as usize
        );
    }

    #[test]
    fn test_band_width_monotone_in_lambda() {
        for epsilon in [0.03, 0.05, 0.07, 0.1] {
            for log_n in [4, 10, 13, 16, 18, 20, 24] {
                let mut last = 0;
                for lambda in 0..128 {
                    let w = OkvsParams::derive(1 << log_n, epsilon, lambda, SEED)
                        .unwrap()
                        .band_width();
                    assert!(w >= last, "epsilon {epsilon}, 2^{log_n}, lambda {lambda}");
                    last = w;
                }
            }
        }
    }

    #[test]
    fn test_seed_expansion() {
        let a = OkvsParams::derive(1024, 0.1, 40, SEED).unwrap();
        let b = OkvsParams::derive(1024, 0.1, 40, SEED).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.position_seed(), a.band_seed());

        let c = a.reseed(Block::new(42));
        assert_eq!(c.num_columns(), a.num_columns());
        assert_eq!(c.band_width(), a.band_width());
        assert_ne!(c.position_seed(), a.position_seed());
        assert_ne!(c.band_seed(), a.band_seed());
    }
}
