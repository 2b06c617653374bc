//! Serializable configuration for OKVS instances.
//!
//! Protocols usually fix `epsilon`, the statistical security parameter and the seed once and derive parameters per
//! set size. [`OkvsConfig`] bundles these knobs so they can be loaded from a config file, with every field optional.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::{Block, ConfigError, OkvsParams};

/// Configuration of an OKVS deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OkvsConfig {
    /// Relative overhead of the codeword array, one of 0.03, 0.05, 0.07 or 0.1.
    ///
    /// Default value: `0.1`
    pub epsilon: f64,

    /// Statistical security parameter; encoding fails with probability at most `2^-stat_sec_param`.
    ///
    /// Default value: `40`
    pub stat_sec_param: u64,

    /// Seed shared by all parties that encode or decode the same instance.
    pub seed: Block,

    /// Number of worker threads for batched decoding.
    ///
    /// The engines do not read the config; callers pass this value as `num_threads` to
    /// [`crate::BinaryOkvs::decode_batch`], [`crate::FieldOkvs::decode_batch`] and the other batch decoders.
    ///
    /// Default value: `1`
    pub decode_threads: NonZeroUsize,
}

impl Default for OkvsConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.1,
            stat_sec_param: 40,
            seed: Block::new(6800382592637124185),
            decode_threads: NonZeroUsize::MIN,
        }
    }
}

impl OkvsConfig {
    /// Derives the [`OkvsParams`] for `n` items.
    ///
    /// See [`OkvsParams::derive`] for the errors.
    pub fn params(&self, n: u64) -> Result<OkvsParams, ConfigError> {
        OkvsParams::derive(n, self.epsilon, self.stat_sec_param, self.seed)
    }
}
