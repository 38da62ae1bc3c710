//! Run configuration.
//!
//! Built once at run start and passed by reference to every component.

use crate::error::{Error, Result};
use crate::weighting::SpectralWeighting;

/// Lookup-table operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Production: read tables, compute scaled parameters and energy.
    #[default]
    Read,
    /// Calibration: fill tables from simulated events.
    Fill,
}

/// Source of the event direction and core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconstructionMethod {
    /// Use the upstream reconstruction as-is.
    #[default]
    Upstream,
    /// Redo the geometry with the axis-intersection method.
    Intersection,
    /// Redo the direction with the disp regression.
    Disp,
}

/// Axis-intersection reconstruction settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionConfig {
    /// Pairs with axes closer than this angle (degrees) are skipped.
    pub min_pair_angle: f64,
    /// Minimum number of images.
    pub min_images: usize,
}

impl Default for IntersectionConfig {
    fn default() -> Self {
        Self {
            min_pair_angle: 5.0,
            min_images: 2,
        }
    }
}

/// Emission-height settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionHeightConfig {
    /// Centroid separations below this (degrees) are degenerate.
    pub min_angular_separation: f64,
}

impl Default for EmissionHeightConfig {
    fn default() -> Self {
        Self {
            min_angular_separation: 1.0e-5,
        }
    }
}

/// Lookup-table read settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookupConfig {
    /// Minimum entries for a bin to be used.
    pub min_entries: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self { min_entries: 5 }
    }
}

/// Disp regression settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispConfig {
    /// Weight of a telescope when no error model is loaded.
    pub fixed_weight: f64,
    /// Lower bound on the predicted error before inversion (degrees).
    pub min_error: f64,
    /// Use the energy model when loaded.
    pub use_energy: bool,
}

impl Default for DispConfig {
    fn default() -> Self {
        Self {
            fixed_weight: 1.0,
            min_error: 1.0e-3,
            use_energy: true,
        }
    }
}

/// Extra selection applied only while filling tables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillCuts {
    /// Maximum centroid distance as a fraction of the camera radius.
    pub max_dist_fraction: f64,
    /// Maximum edge-loss fraction.
    pub max_loss: f64,
    /// Accepted true offset range (degrees).
    pub min_true_offset: f64,
    pub max_true_offset: f64,
}

impl Default for FillCuts {
    fn default() -> Self {
        Self {
            max_dist_fraction: 0.8,
            max_loss: 0.2,
            min_true_offset: 0.0,
            max_true_offset: 1.0e10,
        }
    }
}

/// Uniform random thinning of the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Subsampling {
    pub seed: u64,
    /// Probability to keep an event, in `(0, 1]`.
    pub keep_probability: f64,
}

/// Policy for labelling the event energy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyQualityPolicy {
    /// Fraction of selected images that must contribute for a full label.
    pub min_fraction: f64,
    /// Minimum contributing images for a full label.
    pub min_images: usize,
}

impl Default for EnergyQualityPolicy {
    fn default() -> Self {
        Self {
            min_fraction: 1.0,
            min_images: 1,
        }
    }
}

/// Immutable configuration of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub mode: ProcessingMode,
    pub method: ReconstructionMethod,
    /// Index of the upstream reconstruction used for the quick check.
    pub method_index: usize,
    /// Minimum image multiplicity.
    pub min_images: usize,
    /// Maximum reconstructed offset (degrees), read mode only.
    pub max_wobble: Option<f64>,
    pub intersection: IntersectionConfig,
    pub emission_height: EmissionHeightConfig,
    pub lookup: LookupConfig,
    pub disp: DispConfig,
    pub fill_cuts: FillCuts,
    pub spectral_weighting: Option<SpectralWeighting>,
    pub subsampling: Option<Subsampling>,
    /// Stop after this span of event time (seconds).
    pub max_elapsed_time: Option<f64>,
    pub energy_quality: EnergyQualityPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: ProcessingMode::Read,
            method: ReconstructionMethod::Upstream,
            method_index: 0,
            min_images: 2,
            max_wobble: None,
            intersection: IntersectionConfig::default(),
            emission_height: EmissionHeightConfig::default(),
            lookup: LookupConfig::default(),
            disp: DispConfig::default(),
            fill_cuts: FillCuts::default(),
            spectral_weighting: None,
            subsampling: None,
            max_elapsed_time: None,
            energy_quality: EnergyQualityPolicy::default(),
        }
    }
}

impl RunConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the processing mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the reconstruction method.
    #[must_use]
    pub fn with_method(mut self, method: ReconstructionMethod) -> Self {
        self.method = method;
        self
    }

    /// Sets the upstream method index.
    #[must_use]
    pub fn with_method_index(mut self, index: usize) -> Self {
        self.method_index = index;
        self
    }

    /// Sets the minimum image multiplicity.
    #[must_use]
    pub fn with_min_images(mut self, min_images: usize) -> Self {
        self.min_images = min_images;
        self
    }

    /// Sets the wobble cut (degrees).
    #[must_use]
    pub fn with_max_wobble(mut self, max_wobble: f64) -> Self {
        self.max_wobble = Some(max_wobble);
        self
    }

    /// Sets the intersection settings.
    #[must_use]
    pub fn with_intersection(mut self, intersection: IntersectionConfig) -> Self {
        self.intersection = intersection;
        self
    }

    /// Sets the lookup settings.
    #[must_use]
    pub fn with_lookup(mut self, lookup: LookupConfig) -> Self {
        self.lookup = lookup;
        self
    }

    /// Sets the disp settings.
    #[must_use]
    pub fn with_disp(mut self, disp: DispConfig) -> Self {
        self.disp = disp;
        self
    }

    /// Sets the table-filling cuts.
    #[must_use]
    pub fn with_fill_cuts(mut self, fill_cuts: FillCuts) -> Self {
        self.fill_cuts = fill_cuts;
        self
    }

    /// Enables spectral re-weighting.
    #[must_use]
    pub fn with_spectral_weighting(mut self, weighting: SpectralWeighting) -> Self {
        self.spectral_weighting = Some(weighting);
        self
    }

    /// Enables random sub-sampling.
    #[must_use]
    pub fn with_subsampling(mut self, seed: u64, keep_probability: f64) -> Self {
        self.subsampling = Some(Subsampling {
            seed,
            keep_probability,
        });
        self
    }

    /// Sets the event-time budget (seconds).
    #[must_use]
    pub fn with_max_elapsed_time(mut self, seconds: f64) -> Self {
        self.max_elapsed_time = Some(seconds);
        self
    }

    /// Sets the energy quality policy.
    #[must_use]
    pub fn with_energy_quality(mut self, policy: EnergyQualityPolicy) -> Self {
        self.energy_quality = policy;
        self
    }

    /// Checks the configuration for inconsistent values.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.min_images == 0 {
            return Err(Error::ConfigError(
                "minimum image multiplicity must be at least 1".to_string(),
            ));
        }
        if let Some(max_wobble) = self.max_wobble {
            if !(max_wobble > 0.0) {
                return Err(Error::ConfigError(format!(
                    "wobble cut must be positive, got {max_wobble}"
                )));
            }
        }
        if self.intersection.min_images < 2 {
            return Err(Error::ConfigError(
                "intersection reconstruction needs at least 2 images".to_string(),
            ));
        }
        if !(0.0..90.0).contains(&self.intersection.min_pair_angle) {
            return Err(Error::ConfigError(format!(
                "minimum pair angle must be in [0, 90) degrees, got {}",
                self.intersection.min_pair_angle
            )));
        }
        if !(self.disp.fixed_weight > 0.0) || !(self.disp.min_error > 0.0) {
            return Err(Error::ConfigError(
                "disp weights must be positive".to_string(),
            ));
        }
        if self.fill_cuts.min_true_offset > self.fill_cuts.max_true_offset {
            return Err(Error::ConfigError(format!(
                "true offset range [{}, {}] is inverted",
                self.fill_cuts.min_true_offset, self.fill_cuts.max_true_offset
            )));
        }
        if let Some(sub) = self.subsampling {
            if !(sub.keep_probability > 0.0 && sub.keep_probability <= 1.0) {
                return Err(Error::ConfigError(format!(
                    "keep probability must be in (0, 1], got {}",
                    sub.keep_probability
                )));
            }
        }
        if let Some(weighting) = &self.spectral_weighting {
            weighting.validate()?;
        }
        if let Some(budget) = self.max_elapsed_time {
            if !(budget > 0.0) {
                return Err(Error::ConfigError(format!(
                    "elapsed-time budget must be positive, got {budget}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.energy_quality.min_fraction) {
            return Err(Error::ConfigError(
                "energy quality fraction must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}
