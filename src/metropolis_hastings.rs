/*!
# Metropolis–Hastings Sampler

A single-chain random-walk Metropolis–Hastings sampler over one real
parameter. The target is anything implementing [`Target`], so the sampler is
independent of the parallax model. The chain owns its random number generator;
[`MetropolisHastings::set_seed`] makes runs reproducible.

## Example Usage

```rust
use bayes_mcmc::metropolis_hastings::MetropolisHastings;

// Standard normal target as a closure.
let target = |x: f64| -0.5 * x * x;
let mut mh = MetropolisHastings::new(target, 3.0, 0.5).unwrap().set_seed(42);

let chain = mh.run(1_000).unwrap();
assert_eq!(chain.len(), 1_000);
assert_eq!(chain[0], 3.0);
```
*/

use num_traits::Float;
use rand::prelude::*;
use rand_distr::{Distribution, Standard, StandardNormal};
use tracing::warn;

use ndarray::Array1;

use crate::core::{run_chain, run_chain_progress, MarkovChain, NoopObserver, Observer, Transition};
use crate::distributions::{GaussianRandomWalk, Proposal, Target};
use crate::error::Result;

/**
Random-walk Metropolis–Hastings over a scalar parameter.

# Type Parameters
- `T`: the floating-point type (e.g. `f32` or `f64`).
- `D`: the target distribution. Must implement [`Target`].
- `Q`: the proposal. Must implement [`Proposal`] and be symmetric.

The log-density of the current state is cached, so each step evaluates the
target exactly once.
*/
#[derive(Clone)]
pub struct MetropolisHastings<T: Float, D, Q> {
    /// The target distribution we want to sample from.
    pub target: D,
    /// The proposal distribution used to generate candidate states.
    pub proposal: Q,
    current_state: T,
    current_log_prob: T,
    /// The random seed.
    pub seed: u64,
    /// The random number generator for this chain.
    pub rng: SmallRng,
}

impl<T, D> MetropolisHastings<T, D, GaussianRandomWalk<T>>
where
    T: Float,
    D: Target<T>,
    StandardNormal: Distribution<T>,
    Standard: Distribution<T>,
{
    /**
    Creates a sampler with a Gaussian random-walk proposal of standard
    deviation `step_size`, starting at `initial_state`.

    # Errors

    [`McmcError::InvalidStepSize`](crate::error::McmcError::InvalidStepSize)
    unless `step_size` is finite and strictly positive.
    */
    pub fn new(target: D, initial_state: T, step_size: T) -> Result<Self> {
        let proposal = GaussianRandomWalk::new(step_size)?;
        Ok(Self::with_proposal(target, proposal, initial_state))
    }

    /// Standard deviation of the random-walk steps.
    pub fn step_size(&self) -> T {
        self.proposal.std
    }
}

impl<T, D, Q> MetropolisHastings<T, D, Q>
where
    T: Float,
    D: Target<T>,
    Q: Proposal<T>,
    Standard: Distribution<T>,
{
    /// Creates a sampler with a custom symmetric proposal.
    pub fn with_proposal(target: D, proposal: Q, initial_state: T) -> Self {
        let current_log_prob = not_nan(target.unnorm_log_prob(initial_state));
        if current_log_prob == T::neg_infinity() {
            warn!(
                initial_state = initial_state.to_f64(),
                "initial state has zero posterior probability"
            );
        }
        let seed = thread_rng().gen::<u64>();
        Self {
            target,
            proposal,
            current_state: initial_state,
            current_log_prob,
            seed,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /**
    Reseeds the chain's random number generator.

    ```rust
    use bayes_mcmc::metropolis_hastings::MetropolisHastings;

    let a = MetropolisHastings::new(|x: f64| -x * x, 0.0, 1.0).unwrap().set_seed(7).run(50).unwrap();
    let b = MetropolisHastings::new(|x: f64| -x * x, 0.0, 1.0).unwrap().set_seed(7).run(50).unwrap();
    assert_eq!(a, b);
    ```
    */
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /**
    Evaluates `proposed` and applies the acceptance rule with the uniform draw
    `u` in `[0, 1)`.

    An improvement (`log p(proposed) > log p(current)`) is accepted whatever
    `u` is. Otherwise the move is accepted iff `u < exp(log p(proposed) - log p(current))`.
    On rejection the state and its cached log-density stay bit-for-bit
    unchanged.
    */
    pub fn transition(&mut self, proposed: T, u: T) -> Transition<T> {
        self.accept_or_reject(proposed, |_| u)
    }

    /// Runs the chain, returning `n_steps` entries with the current state
    /// first.
    pub fn run(&mut self, n_steps: usize) -> Result<Array1<T>> {
        run_chain(self, n_steps, &mut NoopObserver)
    }

    /// Like [`run`](Self::run), calling `observer` once per entry.
    pub fn run_with_observer<O: Observer<T>>(
        &mut self,
        n_steps: usize,
        observer: &mut O,
    ) -> Result<Array1<T>> {
        run_chain(self, n_steps, observer)
    }

    /// Like [`run`](Self::run), with a terminal progress bar.
    pub fn run_progress(&mut self, n_steps: usize) -> Result<Array1<T>> {
        run_chain_progress(self, n_steps)
    }

    /// Metropolis rule. `draw` supplies the uniform from the chain's RNG and is
    /// only called when the proposal does not improve the log-density.
    fn accept_or_reject<U>(&mut self, proposed: T, draw: U) -> Transition<T>
    where
        U: FnOnce(&mut SmallRng) -> T,
    {
        let proposed_lp = not_nan(self.target.unnorm_log_prob(proposed));
        let accepted = proposed_lp > self.current_log_prob
            || draw(&mut self.rng) < (proposed_lp - self.current_log_prob).exp();
        if accepted {
            self.current_state = proposed;
            self.current_log_prob = proposed_lp;
        }
        Transition {
            state: self.current_state,
            log_prob: self.current_log_prob,
            accepted,
        }
    }
}

impl<T, D, Q> MarkovChain<T> for MetropolisHastings<T, D, Q>
where
    T: Float,
    D: Target<T>,
    Q: Proposal<T>,
    Standard: Distribution<T>,
{
    /// One random-walk step. The uniform is only drawn when the proposal is
    /// not an improvement.
    fn step(&mut self) -> Transition<T> {
        let proposed = self.proposal.sample(self.current_state, &mut self.rng);
        self.accept_or_reject(proposed, |rng| rng.gen())
    }

    fn current_state(&self) -> T {
        self.current_state
    }

    fn current_log_prob(&self) -> T {
        self.current_log_prob
    }
}

/// Maps NaN log-densities to negative infinity.
fn not_nan<T: Float>(lp: T) -> T {
    if lp.is_nan() {
        T::neg_infinity()
    } else {
        lp
    }
}
