//! Dead-time accounting for observed (non-simulated) runs.
//!
//! Time differences between consecutive events follow an exponential
//! distribution except at small differences, where the readout is busy.
//! The rate is estimated from the tail above `fit_threshold` and the dead
//! fraction is `1 - observed / expected`, with `expected` the exponential
//! extrapolated to zero.
#![allow(clippy::cast_precision_loss)]

use crate::histogram::{Axis, Histogram1D};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Accumulates inter-event time differences.
#[derive(Debug, Clone)]
pub struct DeadTimeCalculator {
    fit_threshold: f64,
    last_time: Option<f64>,
    first_time: Option<f64>,
    n_events: u64,
    n_differences: u64,
    n_tail: u64,
    tail_sum: f64,
    time_differences: Histogram1D,
}

/// Dead-time estimate of a run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeadTimeSummary {
    pub n_events: u64,
    /// Time span between first and last event (seconds).
    pub elapsed: f64,
    /// Fitted event rate (Hz).
    pub rate: Option<f64>,
    /// Estimated dead fraction in `[0, 1)`.
    pub dead_fraction: Option<f64>,
    pub time_differences: Histogram1D,
}

impl Default for DeadTimeCalculator {
    fn default() -> Self {
        Self::new(1.0e-3)
    }
}

impl DeadTimeCalculator {
    /// Creates a calculator fitting differences above `fit_threshold` seconds.
    #[must_use]
    pub fn new(fit_threshold: f64) -> Self {
        Self {
            fit_threshold,
            last_time: None,
            first_time: None,
            n_events: 0,
            n_differences: 0,
            n_tail: 0,
            tail_sum: 0.0,
            time_differences: Histogram1D::new(Axis::new(200, 0.0, 0.02)),
        }
    }

    /// Adds an event time (seconds).
    pub fn add(&mut self, time: f64) {
        if !time.is_finite() {
            return;
        }
        self.n_events += 1;
        self.first_time.get_or_insert(time);
        if let Some(last) = self.last_time {
            let dt = time - last;
            if dt >= 0.0 {
                self.n_differences += 1;
                self.time_differences.fill(dt, 1.0);
                if dt > self.fit_threshold {
                    self.n_tail += 1;
                    self.tail_sum += dt - self.fit_threshold;
                }
            }
        }
        self.last_time = Some(time);
    }

    /// Number of accepted event times.
    #[must_use]
    pub fn n_events(&self) -> u64 {
        self.n_events
    }

    /// Computes the estimate.
    #[must_use]
    pub fn summary(&self) -> DeadTimeSummary {
        let elapsed = match (self.first_time, self.last_time) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        };
        let rate = (self.n_tail > 0 && self.tail_sum > 0.0)
            .then(|| self.n_tail as f64 / self.tail_sum);
        let dead_fraction = rate.map(|rate| {
            let expected = self.n_tail as f64 * (rate * self.fit_threshold).exp();
            (1.0 - self.n_differences as f64 / expected).max(0.0)
        });
        DeadTimeSummary {
            n_events: self.n_events,
            elapsed,
            rate,
            dead_fraction,
            time_differences: self.time_differences.clone(),
        }
    }
}
