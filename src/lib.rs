//! Bayesian estimation of the exponent of a power-law distance prior from
//! noisy stellar parallaxes, by random-walk Metropolis–Hastings over a
//! numerically marginalized posterior.
//!
//! ```rust
//! use bayes_mcmc::metropolis_hastings::MetropolisHastings;
//! use bayes_mcmc::mock::simulate_catalog;
//! use bayes_mcmc::model::ParallaxModel;
//! use bayes_mcmc::stats::summarize;
//! use rand::rngs::SmallRng;
//! use rand::SeedableRng;
//!
//! let mut rng = SmallRng::seed_from_u64(0);
//! let catalog = simulate_catalog(&mut rng, 50, 100.0, 2.0, 2.0e-3).unwrap();
//! let model = ParallaxModel::new(100.0, catalog.observations).unwrap();
//!
//! let mut mh = MetropolisHastings::new(model, 3.0, 0.3).unwrap().set_seed(1);
//! let chain = mh.run(30).unwrap();
//! let summary = summarize(chain.view(), 10).unwrap();
//! assert!(summary.median > 0.0);
//! ```

pub mod core;
pub mod distributions;
pub mod error;
pub mod io;
pub mod metropolis_hastings;
pub mod mock;
pub mod model;
pub mod quadrature;
pub mod stats;
