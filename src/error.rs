//! Error types shared across the crate.

/// Errors raised while configuring a model or a sampler run.
///
/// Numerical dead ends inside the model (non-positive exponents, empty
/// integrals) are not errors: they evaluate to negative infinity and the
/// sampler rejects them.
#[derive(Debug, thiserror::Error)]
pub enum McmcError {
    /// The proposal standard deviation must be finite and strictly positive.
    #[error("step size must be positive and finite, got {0}")]
    InvalidStepSize(f64),

    /// A chain needs room for at least its initial state.
    #[error("chain length must be at least 1")]
    EmptyChain,

    /// The prior support `[0, dist_max]` must be non-degenerate.
    #[error("maximum distance must be positive and finite, got {0}")]
    InvalidDistMax(f64),

    /// Parallaxes and uncertainties were supplied with different lengths.
    #[error("{parallax} parallaxes but {uncertainty} uncertainties")]
    LengthMismatch { parallax: usize, uncertainty: usize },

    /// An uncertainty was zero, negative or not finite.
    #[error("observation {index}: uncertainty must be positive and finite, got {value}")]
    InvalidUncertainty { index: usize, value: f64 },

    /// An observed parallax was NaN or infinite.
    #[error("observation {index}: parallax must be finite, got {value}")]
    NonFiniteParallax { index: usize, value: f64 },

    /// Quadrature tolerances must be non-negative and not both zero.
    #[error("invalid integration tolerances (relative {rel}, absolute {abs})")]
    InvalidTolerance { rel: f64, abs: f64 },

    /// The quadrature needs at least one subinterval to work with.
    #[error("subinterval limit must be at least 1")]
    InvalidSubintervalLimit,

    /// Quadrature was asked to integrate over a non-finite interval.
    #[error("integration bounds must be finite, got [{lower}, {upper}]")]
    InvalidBounds { lower: f64, upper: f64 },

    /// The requested burn-in leaves nothing to summarize.
    #[error("burn-in of {burn_in} discards the entire chain of {len} samples")]
    BurnInTooLong { burn_in: usize, len: usize },

    /// Simulation parameters were out of range.
    #[error("invalid simulation parameter: {0}")]
    InvalidSimulation(String),

    /// Quantile computation failed.
    #[error("quantile computation failed: {0}")]
    Quantile(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "csv")]
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, McmcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_display() {
        let err = McmcError::LengthMismatch {
            parallax: 3,
            uncertainty: 2,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("3 parallaxes"));
        assert!(msg.contains("2 uncertainties"));
    }

    #[test]
    fn test_invalid_uncertainty_display() {
        let err = McmcError::InvalidUncertainty {
            index: 7,
            value: -1.0,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("observation 7"));
        assert!(msg.contains("-1"));
    }

    #[test]
    fn test_burn_in_display() {
        let err = McmcError::BurnInTooLong { burn_in: 10, len: 5 };
        assert_eq!(
            err.to_string(),
            "burn-in of 10 discards the entire chain of 5 samples"
        );
    }
}
