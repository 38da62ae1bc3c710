//! Spectral re-weighting of simulated events.
//!
//! Events simulated with `dN/dE ~ E^-generated_index` are re-weighted to
//! `E^-target_index`. The weight is normalized to 1 at `energy_min` and held
//! constant outside `[energy_min, energy_max]`, so it is continuous at both
//! boundaries.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Power-law re-weighting between two spectral indices.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpectralWeighting {
    /// Index of the simulated spectrum (positive, `E^-index`).
    pub generated_index: f64,
    /// Index to model.
    pub target_index: f64,
    /// Lower energy bound of the simulation (TeV).
    pub energy_min: f64,
    /// Upper energy bound of the simulation (TeV).
    pub energy_max: f64,
}

impl SpectralWeighting {
    /// Creates and validates a weighting.
    ///
    /// # Errors
    /// Returns an error for a non-positive or inverted energy range.
    pub fn new(
        generated_index: f64,
        target_index: f64,
        energy_min: f64,
        energy_max: f64,
    ) -> Result<Self> {
        let weighting = Self {
            generated_index,
            target_index,
            energy_min,
            energy_max,
        };
        weighting.validate()?;
        Ok(weighting)
    }

    /// Checks the energy range and indices.
    ///
    /// # Errors
    /// Returns an error for a non-positive or inverted energy range.
    pub fn validate(&self) -> Result<()> {
        if !(self.energy_min > 0.0 && self.energy_max > self.energy_min) {
            return Err(Error::ConfigError(format!(
                "invalid re-weighting energy range [{}, {}] TeV",
                self.energy_min, self.energy_max
            )));
        }
        if !self.generated_index.is_finite() || !self.target_index.is_finite() {
            return Err(Error::ConfigError(
                "re-weighting spectral indices must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Ratio of target to generated density inside the simulated range.
    #[must_use]
    pub fn power_law_ratio(&self, energy: f64) -> f64 {
        (energy / self.energy_min).powf(self.generated_index - self.target_index)
    }

    /// Weight for an event with true energy `energy` (TeV).
    #[must_use]
    pub fn weight(&self, energy: f64) -> f64 {
        if !(energy > 0.0) {
            return 1.0;
        }
        if (self.generated_index - self.target_index).abs() < f64::EPSILON {
            return 1.0;
        }
        let clamped = energy.clamp(self.energy_min, self.energy_max);
        self.power_law_ratio(clamped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn weighting() -> SpectralWeighting {
        SpectralWeighting::new(2.0, 2.5, 0.03, 200.0).unwrap()
    }

    #[test]
    fn test_continuous_at_lower_boundary() {
        let w = weighting();
        let below = w.weight(w.energy_min * (1.0 - 1e-12));
        let at = w.weight(w.energy_min);
        let analytic = w.power_law_ratio(w.energy_min);
        assert_relative_eq!(below, at, max_relative = 1e-9);
        assert_relative_eq!(at, analytic, max_relative = 1e-12);
        assert_relative_eq!(at, 1.0, max_relative = 1e-12);
    }

    #[test]
    fn test_continuous_at_upper_boundary() {
        let w = weighting();
        let above = w.weight(w.energy_max * (1.0 + 1e-12));
        let at = w.weight(w.energy_max);
        let analytic = w.power_law_ratio(w.energy_max);
        assert_relative_eq!(above, at, max_relative = 1e-9);
        assert_relative_eq!(at, analytic, max_relative = 1e-12);
    }

    #[test]
    fn test_softer_target_downweights_high_energies() {
        let w = weighting();
        assert!(w.weight(10.0) < w.weight(1.0));
        // (10 / 0.03)^-0.5
        assert_relative_eq!(w.weight(10.0), (10.0_f64 / 0.03).powf(-0.5), max_relative = 1e-12);
    }

    #[test]
    fn test_equal_indices_give_unit_weight() {
        let w = SpectralWeighting::new(2.2, 2.2, 0.1, 100.0).unwrap();
        assert_relative_eq!(w.weight(5.0), 1.0);
    }

    #[test]
    fn test_invalid_range() {
        assert!(SpectralWeighting::new(2.0, 2.5, 10.0, 1.0).is_err());
        assert!(SpectralWeighting::new(2.0, 2.5, 0.0, 1.0).is_err());
    }
}
