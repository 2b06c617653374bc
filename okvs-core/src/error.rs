//! Construction failures of the OKVS engines.

/// Why an `encode` call could not produce a codeword array.
///
/// Both failures are a property of the seed material, not of the input: the caller may retry with parameters obtained
/// from [`crate::OkvsParams::reseed`]. The engines never re-seed on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EncodeFailure {
    /// The band of a row was eliminated to zero while its value was not.
    #[error("row {row} eliminated to an all-zero band with a non-zero value")]
    AllZeroConflict {
        /// Index of the offending key in the input
        row: usize,
    },
    /// Gaussian elimination found fewer pivots than rows.
    #[error("found {pivots} pivots, expected {expected}")]
    InsufficientPivots {
        /// Number of rows that received a pivot
        pivots: usize,
        /// Number of rows
        expected: usize,
    },
}
