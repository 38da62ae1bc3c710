//! Fixed-binning weighted histograms for run-level summaries.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use crate::event::McTruth;
use ndarray::{Array1, Array2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Uniform binning of one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Axis {
    pub bins: usize,
    pub min: f64,
    pub max: f64,
}

impl Axis {
    /// Creates an axis with `bins` bins over `[min, max)`.
    #[must_use]
    pub fn new(bins: usize, min: f64, max: f64) -> Self {
        Self { bins, min, max }
    }

    /// Bin width.
    #[must_use]
    pub fn width(&self) -> f64 {
        (self.max - self.min) / self.bins as f64
    }

    /// Bin index of `value`, `None` outside the axis or for NaN.
    #[must_use]
    pub fn index(&self, value: f64) -> Option<usize> {
        if !(value >= self.min && value < self.max) || self.bins == 0 {
            return None;
        }
        let i = ((value - self.min) / self.width()) as usize;
        Some(i.min(self.bins - 1))
    }

    /// Center of bin `i`.
    #[must_use]
    pub fn center(&self, i: usize) -> f64 {
        self.min + (i as f64 + 0.5) * self.width()
    }

    /// True for a usable axis.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.bins > 0 && self.min.is_finite() && self.max.is_finite() && self.max > self.min
    }
}

/// Weighted 1-D histogram.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Histogram1D {
    pub axis: Axis,
    pub counts: Array1<f64>,
    pub underflow: f64,
    pub overflow: f64,
}

impl Histogram1D {
    /// Creates an empty histogram.
    #[must_use]
    pub fn new(axis: Axis) -> Self {
        Self {
            axis,
            counts: Array1::zeros(axis.bins),
            underflow: 0.0,
            overflow: 0.0,
        }
    }

    /// Adds `weight` at `value`.
    pub fn fill(&mut self, value: f64, weight: f64) {
        match self.axis.index(value) {
            Some(i) => self.counts[i] += weight,
            None if value < self.axis.min => self.underflow += weight,
            None if value >= self.axis.max => self.overflow += weight,
            None => {}
        }
    }

    /// Sum of in-range bins.
    #[must_use]
    pub fn integral(&self) -> f64 {
        self.counts.sum()
    }

    /// Adds another histogram with the same binning.
    ///
    /// # Panics
    /// Panics if the axes differ.
    pub fn merge(&mut self, other: &Histogram1D) {
        assert_eq!(self.axis, other.axis, "histogram binning mismatch");
        self.counts += &other.counts;
        self.underflow += other.underflow;
        self.overflow += other.overflow;
    }
}

/// Weighted 2-D histogram, indexed `[x, y]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Histogram2D {
    pub x_axis: Axis,
    pub y_axis: Axis,
    pub counts: Array2<f64>,
    pub outside: f64,
}

impl Histogram2D {
    /// Creates an empty histogram.
    #[must_use]
    pub fn new(x_axis: Axis, y_axis: Axis) -> Self {
        Self {
            x_axis,
            y_axis,
            counts: Array2::zeros((x_axis.bins, y_axis.bins)),
            outside: 0.0,
        }
    }

    /// Adds `weight` at `(x, y)`.
    pub fn fill(&mut self, x: f64, y: f64, weight: f64) {
        match (self.x_axis.index(x), self.y_axis.index(y)) {
            (Some(i), Some(j)) => self.counts[[i, j]] += weight,
            _ => self.outside += weight,
        }
    }

    /// Sum of in-range bins.
    #[must_use]
    pub fn integral(&self) -> f64 {
        self.counts.sum()
    }

    /// Adds another histogram with the same binning.
    ///
    /// # Panics
    /// Panics if the axes differ.
    pub fn merge(&mut self, other: &Histogram2D) {
        assert_eq!(self.x_axis, other.x_axis, "histogram binning mismatch");
        assert_eq!(self.y_axis, other.y_axis, "histogram binning mismatch");
        self.counts += &other.counts;
        self.outside += other.outside;
    }
}

/// Monte Carlo input spectra, for all simulated and for triggered showers.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct McHistograms {
    /// log10 of the true energy (TeV).
    pub energy_all: Histogram1D,
    pub energy_triggered: Histogram1D,
    /// True core position (meters).
    pub core_all: Histogram2D,
    pub core_triggered: Histogram2D,
    /// True angular offset (degrees).
    pub offset_all: Histogram1D,
    pub offset_triggered: Histogram1D,
}

impl Default for McHistograms {
    fn default() -> Self {
        let energy = Axis::new(60, -2.0, 4.0);
        let core = Axis::new(100, -1500.0, 1500.0);
        let offset = Axis::new(50, 0.0, 5.0);
        Self {
            energy_all: Histogram1D::new(energy),
            energy_triggered: Histogram1D::new(energy),
            core_all: Histogram2D::new(core, core),
            core_triggered: Histogram2D::new(core, core),
            offset_all: Histogram1D::new(offset),
            offset_triggered: Histogram1D::new(offset),
        }
    }
}

impl McHistograms {
    /// Fills the spectra for one simulated shower.
    pub fn fill(&mut self, mc: &McTruth, triggered: bool, weight: f64) {
        let log_e = if mc.energy > 0.0 {
            mc.energy.log10()
        } else {
            f64::NAN
        };
        self.energy_all.fill(log_e, weight);
        self.core_all.fill(mc.xcore, mc.ycore, weight);
        self.offset_all.fill(mc.offset(), weight);
        if triggered {
            self.energy_triggered.fill(log_e, weight);
            self.core_triggered.fill(mc.xcore, mc.ycore, weight);
            self.offset_triggered.fill(mc.offset(), weight);
        }
    }

    /// Adds another set of spectra.
    pub fn merge(&mut self, other: &McHistograms) {
        self.energy_all.merge(&other.energy_all);
        self.energy_triggered.merge(&other.energy_triggered);
        self.core_all.merge(&other.core_all);
        self.core_triggered.merge(&other.core_triggered);
        self.offset_all.merge(&other.offset_all);
        self.offset_triggered.merge(&other.offset_triggered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_axis_index() {
        let axis = Axis::new(10, 0.0, 10.0);
        assert_eq!(axis.index(0.0), Some(0));
        assert_eq!(axis.index(9.99), Some(9));
        assert_eq!(axis.index(10.0), None);
        assert_eq!(axis.index(-0.1), None);
        assert_eq!(axis.index(f64::NAN), None);
        assert_abs_diff_eq!(axis.center(0), 0.5);
    }

    #[test]
    fn test_fill_under_overflow() {
        let mut h = Histogram1D::new(Axis::new(4, 0.0, 4.0));
        h.fill(1.5, 2.0);
        h.fill(-1.0, 1.0);
        h.fill(7.0, 3.0);
        assert_abs_diff_eq!(h.integral(), 2.0);
        assert_abs_diff_eq!(h.underflow, 1.0);
        assert_abs_diff_eq!(h.overflow, 3.0);
    }

    #[test]
    fn test_mc_histograms_triggered_subset() {
        let mut hists = McHistograms::default();
        let mc = McTruth {
            energy: 1.0,
            xcore: 10.0,
            ycore: -20.0,
            xoff: 0.5,
            yoff: 0.0,
            xmax_height: None,
        };
        hists.fill(&mc, true, 1.0);
        hists.fill(&mc, false, 1.0);
        assert_abs_diff_eq!(hists.energy_all.integral(), 2.0);
        assert_abs_diff_eq!(hists.energy_triggered.integral(), 1.0);
        assert_abs_diff_eq!(hists.core_all.integral(), 2.0);
        assert_abs_diff_eq!(hists.offset_triggered.integral(), 1.0);

        let mut other = McHistograms::default();
        other.merge(&hists);
        assert_abs_diff_eq!(other.energy_all.integral(), 2.0);
    }
}
