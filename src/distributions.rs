/*!
Target and proposal abstractions for one-dimensional Metropolis–Hastings, plus
the truncated power-law distance prior used by the parallax model.

The sampler only ever sees a [`Target`], so any one-dimensional log-density can
be plugged in, including a plain closure:

```rust
use bayes_mcmc::distributions::Target;

let standard_normal = |x: f64| -0.5 * x * x;
assert_eq!(standard_normal.unnorm_log_prob(0.0), 0.0);
```

### Power-law prior

```rust
use bayes_mcmc::distributions::PowerLawPrior;

let prior = PowerLawPrior::new(2.0, 100.0);
assert!(prior.density(50.0) > 0.0);
assert_eq!(prior.density(150.0), 0.0);
```
*/

use ndarray::{Array1, ArrayView1};
use num_traits::Float;
use rand::Rng;
use rand_distr::{Distribution, Normal, StandardNormal};

use crate::error::{McmcError, Result};

/// A one-dimensional target density we want to sample from.
pub trait Target<T: Float> {
    /// Returns the log of the unnormalized density at `theta`.
    ///
    /// Zero-probability regions should return negative infinity.
    fn unnorm_log_prob(&self, theta: T) -> T;
}

impl<T: Float, F> Target<T> for F
where
    F: Fn(T) -> T,
{
    fn unnorm_log_prob(&self, theta: T) -> T {
        self(theta)
    }
}

/// A proposal kernel `q(x' | x)` for Metropolis–Hastings.
///
/// The sampler applies the plain Metropolis acceptance rule, so implementors
/// must be symmetric: `q(x' | x) == q(x | x')`.
pub trait Proposal<T: Float> {
    /// Draws a candidate state given the current one.
    fn sample<R: Rng + ?Sized>(&self, current: T, rng: &mut R) -> T;
}

/**
A Gaussian random walk: `x' = x + N(0, std)`.

# Examples

```rust
use bayes_mcmc::distributions::{GaussianRandomWalk, Proposal};
use rand::rngs::SmallRng;
use rand::SeedableRng;

let proposal = GaussianRandomWalk::new(0.3).unwrap();
let mut rng = SmallRng::seed_from_u64(42);
let candidate = proposal.sample(3.0_f64, &mut rng);
assert!(candidate.is_finite());
```
*/
#[derive(Debug, Clone, Copy)]
pub struct GaussianRandomWalk<T: Float>
where
    StandardNormal: Distribution<T>,
{
    pub std: T,
    normal: Normal<T>,
}

impl<T: Float> GaussianRandomWalk<T>
where
    StandardNormal: Distribution<T>,
{
    /// Creates a random walk with the given step standard deviation.
    ///
    /// Fails unless `std` is finite and strictly positive.
    pub fn new(std: T) -> Result<Self> {
        let invalid = || McmcError::InvalidStepSize(std.to_f64().unwrap_or(f64::NAN));
        if !(std.is_finite() && std > T::zero()) {
            return Err(invalid());
        }
        let normal = Normal::new(T::zero(), std).map_err(|_| invalid())?;
        Ok(Self { std, normal })
    }
}

impl<T: Float> Proposal<T> for GaussianRandomWalk<T>
where
    StandardNormal: Distribution<T>,
{
    fn sample<R: Rng + ?Sized>(&self, current: T, rng: &mut R) -> T {
        current + self.normal.sample(rng)
    }
}

/**
Power-law distance prior truncated to `[0, dist_max]`:

`p(d) = (alpha + 1) d^alpha / dist_max^(alpha + 1)` inside the support and
exactly zero outside. For `alpha > -1` this is a normalized density.

No inputs are rejected. Degenerate combinations such as `alpha <= -1` at
`d = 0` produce whatever the floating-point arithmetic produces.
*/
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerLawPrior {
    pub alpha: f64,
    pub dist_max: f64,
}

impl PowerLawPrior {
    pub fn new(alpha: f64, dist_max: f64) -> Self {
        Self { alpha, dist_max }
    }

    /// Density at a single distance.
    pub fn density(&self, dist: f64) -> f64 {
        if dist < 0.0 || dist > self.dist_max {
            return 0.0;
        }
        (self.alpha + 1.0) * dist.powf(self.alpha) / self.dist_max.powf(self.alpha + 1.0)
    }

    /// Element-wise density over an array of distances.
    pub fn density_array(&self, dist: ArrayView1<f64>) -> Array1<f64> {
        dist.mapv(|d| self.density(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DEFAULT_MAX_SUBINTERVALS, DEFAULT_TOLERANCE};
    use crate::quadrature::integrate;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;
    use proptest::prelude::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn density_matches_closed_form() {
        let prior = PowerLawPrior::new(2.0, 100.0);
        let expected = 3.0 * 50.0_f64.powi(2) / 100.0_f64.powi(3);
        assert_abs_diff_eq!(prior.density(50.0), expected, epsilon = 1e-15);
    }

    #[test]
    fn density_includes_support_endpoints() {
        let prior = PowerLawPrior::new(2.0, 100.0);
        assert_eq!(prior.density(0.0), 0.0);
        assert_abs_diff_eq!(prior.density(100.0), 0.03, epsilon = 1e-15);
    }

    #[test]
    fn density_array_zeroes_outside_support() {
        let prior = PowerLawPrior::new(1.5, 10.0);
        let dist = arr1(&[-1.0, 0.5, 5.0, 10.0, 10.5, 1e9]);
        let p = prior.density_array(dist.view());
        assert_eq!(p.len(), 6);
        assert_eq!(p[0], 0.0);
        assert!(p[1] > 0.0 && p[2] > 0.0 && p[3] > 0.0);
        assert_eq!(p[4], 0.0);
        assert_eq!(p[5], 0.0);
        for (d, v) in dist.iter().zip(p.iter()) {
            assert_eq!(*v, prior.density(*d));
        }
    }

    fn integrate_density(alpha: f64, dist_max: f64) -> f64 {
        let prior = PowerLawPrior::new(alpha, dist_max);
        integrate(
            |d| prior.density(d),
            0.0,
            dist_max,
            DEFAULT_TOLERANCE,
            DEFAULT_TOLERANCE,
            DEFAULT_MAX_SUBINTERVALS,
        )
        .unwrap()
        .value
    }

    #[test]
    fn density_integrates_to_one() {
        for &alpha in &[-0.99, -0.9, -0.5, 0.0, 0.7, 2.0, 5.0] {
            assert_abs_diff_eq!(integrate_density(alpha, 100.0), 1.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn closure_is_a_target() {
        let target = |x: f64| -(x - 1.0).powi(2);
        assert_eq!(target.unnorm_log_prob(1.0), 0.0);
        assert_eq!(target.unnorm_log_prob(3.0), -4.0);
    }

    #[test]
    fn random_walk_rejects_bad_step() {
        assert!(GaussianRandomWalk::new(0.0).is_err());
        assert!(GaussianRandomWalk::new(-0.3).is_err());
        assert!(GaussianRandomWalk::new(f64::NAN).is_err());
        assert!(GaussianRandomWalk::new(f64::INFINITY).is_err());
    }

    #[test]
    fn random_walk_step_statistics() {
        let proposal = GaussianRandomWalk::new(0.5_f64).unwrap();
        let mut rng = SmallRng::seed_from_u64(7);
        let steps: Vec<f64> = (0..20_000)
            .map(|_| proposal.sample(10.0, &mut rng) - 10.0)
            .collect();
        let n = steps.len() as f64;
        let mean = steps.iter().sum::<f64>() / n;
        let var = steps.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
        assert_abs_diff_eq!(mean, 0.0, epsilon = 0.02);
        assert_abs_diff_eq!(var.sqrt(), 0.5, epsilon = 0.02);
    }

    proptest! {
        #[test]
        fn density_normalized_over_support(alpha in -0.95_f64..10.0) {
            let total = integrate_density(alpha, 100.0);
            prop_assert!((total - 1.0).abs() <= 1e-3, "alpha = {}: {}", alpha, total);
        }

        #[test]
        fn density_is_zero_outside_support(
            alpha in -0.9_f64..10.0,
            dist_max in 0.1_f64..1e4,
            below in 1e-9_f64..1e6,
            above in 1e-9_f64..1e6,
        ) {
            let prior = PowerLawPrior::new(alpha, dist_max);
            prop_assert_eq!(prior.density(-below), 0.0);
            prop_assert_eq!(prior.density(dist_max + above), 0.0);
            let arr = prior.density_array(arr1(&[-below, dist_max + above]).view());
            prop_assert_eq!(arr[0], 0.0);
            prop_assert_eq!(arr[1], 0.0);
        }
    }
}
