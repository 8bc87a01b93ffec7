/*!
# Parallax marginal-likelihood model

The posterior over the power-law exponent `alpha` given noisy parallaxes. Each
star's unknown true distance is integrated out numerically:

\[
\log p(\alpha \mid \varpi) = \log p(\alpha)
    + \sum_i \log \int_{a_i}^{b_i} \mathcal{N}(\varpi_i \mid 1/d, \sigma_i)\, p(d \mid \alpha)\, \mathrm{d}d
\]

where `[a_i, b_i]` is a 5-sigma parallax window mapped to distance and clipped
to the prior support `[0, dist_max]`.

## Example Usage

```rust
use bayes_mcmc::model::{Observations, ParallaxModel};

let obs = Observations::new(vec![0.02, 0.05, 0.012], vec![0.002; 3]).unwrap();
let model = ParallaxModel::new(100.0, obs).unwrap();
assert!(model.ln_posterior(2.0).is_finite());
assert_eq!(model.ln_posterior(-1.0), f64::NEG_INFINITY);
```
*/

use std::f64::consts::PI;

use ndarray::Array1;
use rayon::prelude::*;
use tracing::{trace, warn};

use crate::distributions::{PowerLawPrior, Target};
use crate::error::{McmcError, Result};
use crate::quadrature::integrate;

/// Width of the integration window, in parallax standard deviations.
pub const WINDOW_SIGMAS: f64 = 5.0;

/// Smallest parallax used for the far edge of the window, so that it maps to
/// a finite distance.
pub const MIN_PARALLAX: f64 = 1.0e-5;

/// Default relative and absolute quadrature tolerance.
pub const DEFAULT_TOLERANCE: f64 = 1.0e-4;

/// Default cap on the number of quadrature subintervals.
pub const DEFAULT_MAX_SUBINTERVALS: usize = 50;

/// A fixed set of parallax measurements and their standard deviations.
///
/// Validated once at construction and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Observations {
    parallax: Array1<f64>,
    uncertainty: Array1<f64>,
}

impl Observations {
    /// Builds an observation set from parallel arrays.
    ///
    /// # Errors
    ///
    /// Fails when the lengths differ, a parallax is not finite, or an
    /// uncertainty is not finite and strictly positive.
    pub fn new(
        parallax: impl Into<Array1<f64>>,
        uncertainty: impl Into<Array1<f64>>,
    ) -> Result<Self> {
        let parallax = parallax.into();
        let uncertainty = uncertainty.into();
        if parallax.len() != uncertainty.len() {
            return Err(McmcError::LengthMismatch {
                parallax: parallax.len(),
                uncertainty: uncertainty.len(),
            });
        }
        if let Some((index, &value)) = parallax.iter().enumerate().find(|(_, p)| !p.is_finite()) {
            return Err(McmcError::NonFiniteParallax { index, value });
        }
        if let Some((index, &value)) = uncertainty
            .iter()
            .enumerate()
            .find(|(_, s)| !(s.is_finite() && **s > 0.0))
        {
            return Err(McmcError::InvalidUncertainty { index, value });
        }
        Ok(Self {
            parallax,
            uncertainty,
        })
    }

    /// Builds an observation set from `(parallax, uncertainty)` pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self> {
        let (parallax, uncertainty): (Vec<f64>, Vec<f64>) = pairs.iter().copied().unzip();
        Self::new(parallax, uncertainty)
    }

    pub fn len(&self) -> usize {
        self.parallax.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parallax.is_empty()
    }

    pub fn parallax(&self) -> &Array1<f64> {
        &self.parallax
    }

    pub fn uncertainty(&self) -> &Array1<f64> {
        &self.uncertainty
    }

    /// Iterates over `(parallax, uncertainty)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.parallax
            .iter()
            .copied()
            .zip(self.uncertainty.iter().copied())
    }
}

/// Power-law prior density at `dist`; see [`PowerLawPrior::density`].
pub fn prior_density(alpha: f64, dist_max: f64, dist: f64) -> f64 {
    PowerLawPrior::new(alpha, dist_max).density(dist)
}

/// Element-wise power-law prior density; see [`PowerLawPrior::density_array`].
pub fn prior_density_array(alpha: f64, dist_max: f64, dist: &Array1<f64>) -> Array1<f64> {
    PowerLawPrior::new(alpha, dist_max).density_array(dist.view())
}

/// Gaussian density of observing `plx_obs` when the true parallax is `1 / dist`,
/// times the prior density of `dist`.
pub fn marginal_integrand(dist: f64, alpha: f64, dist_max: f64, plx_obs: f64, plx_err: f64) -> f64 {
    normal_pdf(dist.recip(), plx_obs, plx_err) * prior_density(alpha, dist_max, dist)
}

/// Log-prior on the exponent: flat on `alpha > 0`, impossible elsewhere.
pub fn ln_prior(alpha: f64) -> f64 {
    if alpha > 0.0 {
        0.0
    } else {
        f64::NEG_INFINITY
    }
}

/// Distance window `[a, b]` covering `plx_obs ± 5 plx_err`, clipped to
/// `[0, dist_max]`.
///
/// The window may come out empty or inverted (`a >= b`, possibly with
/// `a == inf`) when it lies entirely beyond `dist_max`.
pub fn integration_bounds(plx_obs: f64, plx_err: f64, dist_max: f64) -> (f64, f64) {
    let lower = (plx_obs + WINDOW_SIGMAS * plx_err).recip().max(0.0);
    let upper = dist_max.min(MIN_PARALLAX.max(plx_obs - WINDOW_SIGMAS * plx_err).recip());
    (lower, upper)
}

fn normal_pdf(x: f64, mean: f64, std: f64) -> f64 {
    let z = (x - mean) / std;
    (-0.5 * z * z).exp() / (std * (2.0 * PI).sqrt())
}

/**
The parallax model: prior support, observations and quadrature settings.

Configuration follows the builder style used by the sampler:

```rust
use bayes_mcmc::model::{Observations, ParallaxModel};

let obs = Observations::from_pairs(&[(0.02, 0.002), (0.03, 0.002)]).unwrap();
let model = ParallaxModel::new(100.0, obs)
    .unwrap()
    .with_tolerance(1e-6, 1e-8)
    .unwrap()
    .parallel(true);
assert!(model.ln_likelihood(2.0).is_finite());
```
*/
#[derive(Debug, Clone)]
pub struct ParallaxModel {
    dist_max: f64,
    observations: Observations,
    epsrel: f64,
    epsabs: f64,
    max_subintervals: usize,
    parallel: bool,
}

impl ParallaxModel {
    /// Creates a model with the default tolerances and sequential evaluation.
    pub fn new(dist_max: f64, observations: Observations) -> Result<Self> {
        if !(dist_max.is_finite() && dist_max > 0.0) {
            return Err(McmcError::InvalidDistMax(dist_max));
        }
        Ok(Self {
            dist_max,
            observations,
            epsrel: DEFAULT_TOLERANCE,
            epsabs: DEFAULT_TOLERANCE,
            max_subintervals: DEFAULT_MAX_SUBINTERVALS,
            parallel: false,
        })
    }

    /// Sets the quadrature's relative and absolute tolerances.
    pub fn with_tolerance(mut self, epsrel: f64, epsabs: f64) -> Result<Self> {
        let ok = |t: f64| t.is_finite() && t >= 0.0;
        if !(ok(epsrel) && ok(epsabs)) || (epsrel == 0.0 && epsabs == 0.0) {
            return Err(McmcError::InvalidTolerance {
                rel: epsrel,
                abs: epsabs,
            });
        }
        self.epsrel = epsrel;
        self.epsabs = epsabs;
        Ok(self)
    }

    /// Sets the maximum number of quadrature subintervals per observation.
    pub fn with_max_subintervals(mut self, limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(McmcError::InvalidSubintervalLimit);
        }
        self.max_subintervals = limit;
        Ok(self)
    }

    /// Evaluates the per-star integrals on the rayon pool.
    ///
    /// Integrals are still summed in observation order, so the result is
    /// identical to the sequential path.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn dist_max(&self) -> f64 {
        self.dist_max
    }

    pub fn observations(&self) -> &Observations {
        &self.observations
    }

    /// Marginal probability of one observation given `alpha`.
    ///
    /// Returns exactly zero when the integration window lies outside the
    /// prior support.
    pub fn marginal(&self, alpha: f64, plx_obs: f64, plx_err: f64) -> f64 {
        let (lower, upper) = integration_bounds(plx_obs, plx_err, self.dist_max);
        if !(lower < upper) {
            return 0.0;
        }
        let integrand = |d: f64| marginal_integrand(d, alpha, self.dist_max, plx_obs, plx_err);
        match integrate(
            integrand,
            lower,
            upper,
            self.epsrel,
            self.epsabs,
            self.max_subintervals,
        ) {
            Ok(quad) => {
                if !quad.converged {
                    warn!(
                        alpha,
                        plx_obs,
                        plx_err,
                        abs_error = quad.abs_error,
                        "quadrature hit the subinterval limit"
                    );
                }
                quad.value
            }
            Err(err) => {
                warn!(alpha, plx_obs, plx_err, %err, "quadrature failed");
                f64::NAN
            }
        }
    }

    /// Sum over observations of the log marginal probability.
    ///
    /// A zero marginal contributes negative infinity.
    #[tracing::instrument(level = "trace", skip(self), fields(n_obs = self.observations.len()))]
    pub fn ln_likelihood(&self, alpha: f64) -> f64 {
        let marginals: Vec<f64> = if self.parallel {
            let parallax = self.observations.parallax();
            let uncertainty = self.observations.uncertainty();
            (0..self.observations.len())
                .into_par_iter()
                .map(|i| self.marginal(alpha, parallax[i], uncertainty[i]))
                .collect()
        } else {
            self.observations
                .iter()
                .map(|(p, s)| self.marginal(alpha, p, s))
                .collect()
        };

        let mut total = 0.0;
        for (index, value) in marginals.into_iter().enumerate() {
            if value == 0.0 {
                trace!(index, alpha, "zero marginal probability");
            }
            total += value.ln();
        }
        total
    }

    /// Log-prior plus log-likelihood. Never NaN.
    pub fn ln_posterior(&self, alpha: f64) -> f64 {
        let lp = ln_prior(alpha);
        if lp == f64::NEG_INFINITY {
            return lp;
        }
        let value = lp + self.ln_likelihood(alpha);
        if value.is_nan() {
            warn!(alpha, "log-posterior evaluated to NaN, treating as impossible");
            return f64::NEG_INFINITY;
        }
        value
    }
}

impl Target<f64> for ParallaxModel {
    fn unnorm_log_prob(&self, theta: f64) -> f64 {
        self.ln_posterior(theta)
    }
}
