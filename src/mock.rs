//! Synthetic star catalogs drawn from the power-law distance prior.

use ndarray::Array1;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{McmcError, Result};
use crate::model::Observations;

/// A simulated catalog: true distances and the noisy parallaxes observed for
/// them.
#[derive(Debug, Clone)]
pub struct MockCatalog {
    pub distances: Array1<f64>,
    pub observations: Observations,
}

/**
Draws `n_stars` distances from the power-law prior with exponent `alpha` on
`[0, dist_max]` (inverse CDF, `d = dist_max * u^(1 / (alpha + 1))`), converts
them to parallaxes and adds Gaussian noise of standard deviation `plx_err`.

# Errors

[`McmcError::InvalidSimulation`] unless `alpha > -1`, and
`dist_max`/`plx_err` are finite and positive.

# Examples

```rust
use bayes_mcmc::mock::simulate_catalog;
use rand::rngs::SmallRng;
use rand::SeedableRng;

let mut rng = SmallRng::seed_from_u64(1);
let catalog = simulate_catalog(&mut rng, 500, 100.0, 2.0, 2.0e-3).unwrap();
assert_eq!(catalog.observations.len(), 500);
```
*/
pub fn simulate_catalog<R: Rng + ?Sized>(
    rng: &mut R,
    n_stars: usize,
    dist_max: f64,
    alpha: f64,
    plx_err: f64,
) -> Result<MockCatalog> {
    if !(alpha > -1.0 && alpha.is_finite()) {
        return Err(McmcError::InvalidSimulation(format!(
            "exponent must exceed -1, got {alpha}"
        )));
    }
    if !(dist_max.is_finite() && dist_max > 0.0) {
        return Err(McmcError::InvalidDistMax(dist_max));
    }
    let bad_error =
        || McmcError::InvalidSimulation(format!("parallax error must be positive, got {plx_err}"));
    if !(plx_err.is_finite() && plx_err > 0.0) {
        return Err(bad_error());
    }
    let noise = Normal::new(0.0, plx_err).map_err(|_| bad_error())?;

    let exponent = (alpha + 1.0).recip();
    // u in (0, 1] keeps every distance strictly positive.
    let distances: Array1<f64> = (0..n_stars)
        .map(|_| dist_max * (1.0 - rng.gen::<f64>()).powf(exponent))
        .collect();
    let parallax = distances.mapv(|d| d.recip() + noise.sample(rng));
    let observations = Observations::new(parallax, Array1::from_elem(n_stars, plx_err))?;

    Ok(MockCatalog {
        distances,
        observations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn distances_follow_power_law() {
        let mut rng = SmallRng::seed_from_u64(3);
        let catalog = simulate_catalog(&mut rng, 50_000, 100.0, 2.0, 1e-3).unwrap();
        let d = &catalog.distances;
        assert!(d.iter().all(|&x| (0.0..=100.0).contains(&x)));
        // E[d] = (alpha + 1) / (alpha + 2) * dist_max
        assert_abs_diff_eq!(d.mean().unwrap(), 75.0, epsilon = 0.5);
    }

    #[test]
    fn parallax_noise_has_requested_scale() {
        let mut rng = SmallRng::seed_from_u64(4);
        let catalog = simulate_catalog(&mut rng, 20_000, 100.0, 2.0, 2e-3).unwrap();
        let residual = catalog.observations.parallax() - &catalog.distances.mapv(f64::recip);
        assert_abs_diff_eq!(residual.mean().unwrap(), 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(residual.std(1.0), 2e-3, epsilon = 1e-4);
        assert!(catalog
            .observations
            .uncertainty()
            .iter()
            .all(|&s| s == 2e-3));
    }

    #[test]
    fn same_seed_same_catalog() {
        let a = simulate_catalog(&mut SmallRng::seed_from_u64(9), 10, 100.0, 2.0, 2e-3).unwrap();
        let b = simulate_catalog(&mut SmallRng::seed_from_u64(9), 10, 100.0, 2.0, 2e-3).unwrap();
        assert_eq!(a.observations, b.observations);
    }

    #[test]
    fn rejects_bad_parameters() {
        let mut rng = SmallRng::seed_from_u64(0);
        assert!(simulate_catalog(&mut rng, 10, 100.0, -1.0, 2e-3).is_err());
        assert!(simulate_catalog(&mut rng, 10, -5.0, 2.0, 2e-3).is_err());
        assert!(simulate_catalog(&mut rng, 10, 100.0, 2.0, 0.0).is_err());
    }
}
