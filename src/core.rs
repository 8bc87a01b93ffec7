//! Chain-running machinery shared by samplers: the [`MarkovChain`] trait, the
//! per-step [`Observer`] hook and the run loops that fill a chain array.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array1;
use num_traits::ToPrimitive;
use tracing::{debug, trace};

use crate::error::{McmcError, Result};
use crate::stats::ChainTracker;

/// Outcome of a single Markov transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition<T> {
    /// State after the transition (the old state on rejection).
    pub state: T,
    /// Cached log-density of `state`.
    pub log_prob: T,
    /// Whether the proposal was accepted.
    pub accepted: bool,
}

pub trait MarkovChain<T> {
    /// Does one iteration of the chain, returning the outcome.
    fn step(&mut self) -> Transition<T>;

    /// Current state without stepping.
    fn current_state(&self) -> T;

    /// Log-density of the current state.
    fn current_log_prob(&self) -> T;
}

/// What an [`Observer`] sees for every chain entry.
///
/// Index 0 is the initial state; it is not a transition and carries
/// `accepted == false`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInfo<T> {
    pub index: usize,
    pub total: usize,
    pub value: T,
    pub log_prob: T,
    pub accepted: bool,
}

/// Hook invoked once per chain entry while a chain runs.
pub trait Observer<T> {
    fn observe(&mut self, info: &StepInfo<T>);

    /// Called once after the last entry.
    fn finish(&mut self) {}
}

impl<T, F> Observer<T> for F
where
    F: FnMut(&StepInfo<T>),
{
    fn observe(&mut self, info: &StepInfo<T>) {
        self(info)
    }
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl<T> Observer<T> for NoopObserver {
    fn observe(&mut self, _info: &StepInfo<T>) {}
}

/// Emits one `trace` event per entry: the value on acceptance, a dot on
/// rejection.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceObserver;

impl<T: ToPrimitive> Observer<T> for TraceObserver {
    fn observe(&mut self, info: &StepInfo<T>) {
        if info.index == 0 || info.accepted {
            let value = info.value.to_f64().unwrap_or(f64::NAN);
            trace!(index = info.index, "{value:.3}");
        } else {
            trace!(index = info.index, ".");
        }
    }
}

/// Drives an [`indicatif`] progress bar, refreshing the acceptance-rate
/// message roughly every 500 milliseconds.
pub struct ProgressObserver {
    pb: ProgressBar,
    tracker: ChainTracker,
    last_update: Instant,
}

impl ProgressObserver {
    const UPDATE_INTERVAL: Duration = Duration::from_millis(500);

    pub fn new(pb: ProgressBar) -> Self {
        Self {
            pb,
            tracker: ChainTracker::new(),
            last_update: Instant::now(),
        }
    }

    /// Progress bar with the default chain style.
    pub fn with_length(n_steps: usize) -> Self {
        let pb = ProgressBar::new(n_steps as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("##-"));
        }
        pb.set_prefix("Chain");
        Self::new(pb)
    }

    pub fn progress_bar(&self) -> &ProgressBar {
        &self.pb
    }
}

impl<T: ToPrimitive> Observer<T> for ProgressObserver {
    fn observe(&mut self, info: &StepInfo<T>) {
        self.tracker.step(info);
        if self.last_update.elapsed() >= Self::UPDATE_INTERVAL || info.index + 1 == info.total {
            self.pb.set_position(info.index as u64 + 1);
            self.pb.set_message(format!(
                "AcceptRate={:.3}",
                self.tracker.acceptance_rate()
            ));
            self.last_update = Instant::now();
        }
    }

    fn finish(&mut self) {
        self.pb.finish_with_message(format!(
            "Done! AcceptRate={:.3}",
            self.tracker.acceptance_rate()
        ));
    }
}

/// Runs `chain` until the output holds `n_steps` entries, the first being the
/// chain's current state.
///
/// # Errors
///
/// [`McmcError::EmptyChain`] when `n_steps == 0`.
pub fn run_chain<T, M, O>(chain: &mut M, n_steps: usize, observer: &mut O) -> Result<Array1<T>>
where
    M: MarkovChain<T>,
    O: Observer<T>,
    T: Copy + ToPrimitive,
{
    if n_steps == 0 {
        return Err(McmcError::EmptyChain);
    }

    let initial = chain.current_state();
    let mut out = Array1::from_elem(n_steps, initial);
    let mut tracker = ChainTracker::new();

    let first = StepInfo {
        index: 0,
        total: n_steps,
        value: initial,
        log_prob: chain.current_log_prob(),
        accepted: false,
    };
    tracker.step(&first);
    observer.observe(&first);

    for i in 1..n_steps {
        let transition = chain.step();
        out[i] = transition.state;
        let info = StepInfo {
            index: i,
            total: n_steps,
            value: transition.state,
            log_prob: transition.log_prob,
            accepted: transition.accepted,
        };
        tracker.step(&info);
        observer.observe(&info);
    }
    observer.finish();

    debug!(
        n_steps,
        acceptance_rate = tracker.acceptance_rate(),
        mean = tracker.mean(),
        "chain finished"
    );
    Ok(out)
}

/// [`run_chain`] with a terminal progress bar.
pub fn run_chain_progress<T, M>(chain: &mut M, n_steps: usize) -> Result<Array1<T>>
where
    M: MarkovChain<T>,
    T: Copy + ToPrimitive,
{
    let mut observer = ProgressObserver::with_length(n_steps);
    run_chain(chain, n_steps, &mut observer)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic chain that alternates between accepting `+1` and
    /// rejecting.
    struct Counter {
        state: f64,
        steps: usize,
    }

    impl MarkovChain<f64> for Counter {
        fn step(&mut self) -> Transition<f64> {
            self.steps += 1;
            let accepted = self.steps % 2 == 1;
            if accepted {
                self.state += 1.0;
            }
            Transition {
                state: self.state,
                log_prob: -self.state,
                accepted,
            }
        }

        fn current_state(&self) -> f64 {
            self.state
        }

        fn current_log_prob(&self) -> f64 {
            -self.state
        }
    }

    #[test]
    fn run_chain_starts_with_current_state() {
        let mut chain = Counter {
            state: 10.0,
            steps: 0,
        };
        let out = run_chain(&mut chain, 5, &mut NoopObserver).unwrap();
        assert_eq!(out.to_vec(), vec![10.0, 11.0, 11.0, 12.0, 12.0]);
        assert_eq!(chain.steps, 4);
    }

    #[test]
    fn single_entry_chain_does_not_step() {
        let mut chain = Counter {
            state: 3.0,
            steps: 0,
        };
        let out = run_chain(&mut chain, 1, &mut NoopObserver).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0], 3.0);
        assert_eq!(chain.steps, 0);
    }

    #[test]
    fn zero_length_is_an_error() {
        let mut chain = Counter {
            state: 0.0,
            steps: 0,
        };
        assert!(matches!(
            run_chain(&mut chain, 0, &mut NoopObserver),
            Err(McmcError::EmptyChain)
        ));
    }

    #[test]
    fn closure_observer_sees_every_entry() {
        let mut chain = Counter {
            state: 0.0,
            steps: 0,
        };
        let mut seen = Vec::new();
        let mut observer = |info: &StepInfo<f64>| seen.push((info.index, info.value, info.accepted));
        run_chain(&mut chain, 4, &mut observer).unwrap();
        assert_eq!(
            seen,
            vec![(0, 0.0, false), (1, 1.0, true), (2, 1.0, false), (3, 2.0, true)]
        );
    }

    #[test]
    fn progress_observer_runs_to_completion() {
        let mut chain = Counter {
            state: 0.0,
            steps: 0,
        };
        let out = run_chain_progress(&mut chain, 100).unwrap();
        assert_eq!(out.len(), 100);
    }
}
