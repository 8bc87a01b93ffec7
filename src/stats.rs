//! Chain bookkeeping and posterior summaries.

use std::collections::VecDeque;
use std::fmt;

use ndarray::prelude::*;
use ndarray_stats::interpolate::Linear;
use ndarray_stats::QuantileExt;
use noisy_float::types::n64;
use num_traits::ToPrimitive;

use crate::core::StepInfo;
use crate::error::{McmcError, Result};

/// Running acceptance rate and mean of a chain, updated one entry at a time.
///
/// Besides the overall acceptance rate it keeps a window over the last
/// [`ChainTracker::WINDOW`] transitions.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainTracker {
    n: u64,
    n_transitions: u64,
    n_accepted: u64,
    mean: f64,
    accept_queue: VecDeque<bool>,
    n_window_accepted: usize,
}

impl Default for ChainTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainTracker {
    pub const WINDOW: usize = 100;

    pub fn new() -> Self {
        Self {
            n: 0,
            n_transitions: 0,
            n_accepted: 0,
            mean: 0.0,
            accept_queue: VecDeque::with_capacity(Self::WINDOW + 1),
            n_window_accepted: 0,
        }
    }

    pub fn step<T: ToPrimitive>(&mut self, info: &StepInfo<T>) {
        self.n += 1;
        let x = info.value.to_f64().unwrap_or(f64::NAN);
        self.mean += (x - self.mean) / self.n as f64;

        if info.index == 0 {
            return;
        }
        self.n_transitions += 1;
        if info.accepted {
            self.n_accepted += 1;
            self.n_window_accepted += 1;
        }
        self.accept_queue.push_back(info.accepted);
        if self.accept_queue.len() > Self::WINDOW && self.accept_queue.pop_front() == Some(true) {
            self.n_window_accepted -= 1;
        }
    }

    /// Number of entries seen, initial state included.
    pub fn len(&self) -> u64 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Fraction of transitions accepted so far; zero before the first one.
    pub fn acceptance_rate(&self) -> f64 {
        if self.n_transitions == 0 {
            0.0
        } else {
            self.n_accepted as f64 / self.n_transitions as f64
        }
    }

    /// Acceptance rate over the most recent transitions.
    pub fn window_acceptance_rate(&self) -> f64 {
        if self.accept_queue.is_empty() {
            0.0
        } else {
            self.n_window_accepted as f64 / self.accept_queue.len() as f64
        }
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }
}

/// Drops the first `burn_in` entries of a chain.
///
/// # Errors
///
/// [`McmcError::BurnInTooLong`] when nothing would be left.
pub fn discard_burn_in<T>(chain: ArrayView1<'_, T>, burn_in: usize) -> Result<ArrayView1<'_, T>> {
    if burn_in >= chain.len() {
        return Err(McmcError::BurnInTooLong {
            burn_in,
            len: chain.len(),
        });
    }
    Ok(chain.slice_move(s![burn_in..]))
}

/// Percentiles (`0..=100`) of `samples` with linear interpolation between
/// order statistics. NaN entries are skipped.
pub fn percentiles(samples: ArrayView1<'_, f64>, qs: &[f64]) -> Result<Vec<f64>> {
    let mut data = samples.to_owned();
    qs.iter()
        .map(|&q| {
            if !(0.0..=100.0).contains(&q) {
                return Err(McmcError::Quantile(format!(
                    "percentile {q} outside [0, 100]"
                )));
            }
            data.quantile_axis_skipnan_mut(Axis(0), n64(q / 100.0), &Linear)
                .map(|v| v.into_scalar())
                .map_err(|e| McmcError::Quantile(e.to_string()))
        })
        .collect()
}

/// Fraction of consecutive entries that differ, i.e. the empirical acceptance
/// rate of a finished chain.
pub fn acceptance_rate(chain: ArrayView1<'_, f64>) -> f64 {
    if chain.len() < 2 {
        return 0.0;
    }
    let moves = chain
        .windows(2)
        .into_iter()
        .filter(|w| w[0].to_bits() != w[1].to_bits())
        .count();
    moves as f64 / (chain.len() - 1) as f64
}

/// Posterior summary of a single-parameter chain after burn-in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub n_samples: usize,
    pub mean: f64,
    /// 16th percentile.
    pub lo68: f64,
    pub median: f64,
    /// 84th percentile.
    pub hi68: f64,
    pub acceptance_rate: f64,
}

impl Summary {
    pub fn plus(&self) -> f64 {
        self.hi68 - self.median
    }

    pub fn minus(&self) -> f64 {
        self.median - self.lo68
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} +{:.2} -{:.2}",
            self.median,
            self.plus(),
            self.minus()
        )
    }
}

/// Discards `burn_in` entries and summarizes the rest.
pub fn summarize(chain: ArrayView1<'_, f64>, burn_in: usize) -> Result<Summary> {
    let tail = discard_burn_in(chain, burn_in)?;
    let q = percentiles(tail, &[16.0, 50.0, 84.0])?;
    let mean = tail.mean().unwrap_or(f64::NAN);
    Ok(Summary {
        n_samples: tail.len(),
        mean,
        lo68: q[0],
        median: q[1],
        hi68: q[2],
        acceptance_rate: acceptance_rate(tail),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn info(index: usize, value: f64, accepted: bool) -> StepInfo<f64> {
        StepInfo {
            index,
            total: 0,
            value,
            log_prob: 0.0,
            accepted,
        }
    }

    #[test]
    fn tracker_counts_transitions_only() {
        let mut tracker = ChainTracker::new();
        tracker.step(&info(0, 1.0, false));
        assert_eq!(tracker.acceptance_rate(), 0.0);
        tracker.step(&info(1, 2.0, true));
        tracker.step(&info(2, 2.0, false));
        tracker.step(&info(3, 3.0, true));
        tracker.step(&info(4, 3.0, true));
        assert_eq!(tracker.len(), 5);
        assert_abs_diff_eq!(tracker.acceptance_rate(), 0.75);
        assert_abs_diff_eq!(tracker.mean(), 11.0 / 5.0, epsilon = 1e-12);
    }

    #[test]
    fn tracker_window_forgets_old_transitions() {
        let mut tracker = ChainTracker::new();
        tracker.step(&info(0, 0.0, false));
        for i in 1..=ChainTracker::WINDOW {
            tracker.step(&info(i, 0.0, true));
        }
        assert_abs_diff_eq!(tracker.window_acceptance_rate(), 1.0);
        for i in 0..ChainTracker::WINDOW / 2 {
            tracker.step(&info(ChainTracker::WINDOW + 1 + i, 0.0, false));
        }
        assert_abs_diff_eq!(tracker.window_acceptance_rate(), 0.5);
        assert_abs_diff_eq!(
            tracker.acceptance_rate(),
            100.0 / 150.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn percentiles_match_linear_interpolation() {
        let x = arr1(&[5.0, 1.0, 4.0, 2.0, 3.0]);
        let q = percentiles(x.view(), &[0.0, 16.0, 50.0, 84.0, 100.0]).unwrap();
        assert_abs_diff_eq!(q[0], 1.0);
        assert_abs_diff_eq!(q[1], 1.64, epsilon = 1e-12);
        assert_abs_diff_eq!(q[2], 3.0);
        assert_abs_diff_eq!(q[3], 4.36, epsilon = 1e-12);
        assert_abs_diff_eq!(q[4], 5.0);
    }

    #[test]
    fn percentiles_reject_out_of_range() {
        let x = arr1(&[1.0, 2.0]);
        assert!(percentiles(x.view(), &[101.0]).is_err());
    }

    #[test]
    fn burn_in_is_dropped() {
        let chain = arr1(&[9.0, 9.0, 1.0, 2.0, 3.0]);
        let tail = discard_burn_in(chain.view(), 2).unwrap();
        assert_eq!(tail.to_vec(), vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            discard_burn_in(chain.view(), 5),
            Err(McmcError::BurnInTooLong { burn_in: 5, len: 5 })
        ));
    }

    #[test]
    fn acceptance_rate_counts_moves() {
        let chain = arr1(&[1.0, 1.0, 2.0, 2.0, 3.0]);
        assert_abs_diff_eq!(acceptance_rate(chain.view()), 0.5);
        assert_eq!(acceptance_rate(arr1(&[1.0]).view()), 0.0);
    }

    #[test]
    fn summary_formats_asymmetric_interval() {
        let chain = arr1(&[100.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let summary = summarize(chain.view(), 1).unwrap();
        assert_eq!(summary.n_samples, 5);
        assert_abs_diff_eq!(summary.median, 3.0);
        assert_abs_diff_eq!(summary.mean, 3.0);
        assert_abs_diff_eq!(summary.acceptance_rate, 1.0);
        assert_eq!(summary.to_string(), "3.00 +1.36 -1.36");
    }
}
