//! Event input and reconstructed event record.

use crate::array::TelescopeId;
use crate::geometry::Pointing;
use crate::image::ImageParameters;
use crate::telescope_data::{PerTelescope, SelectedImages};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Reconstruction result carried in the input stream (one per upstream method).
///
/// Non-finite values are stored as `None`.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UpstreamReconstruction {
    /// Number of images used upstream.
    pub n_images: usize,
    /// Convergence metric; negative or missing means the fit failed.
    pub chi2: Option<f64>,
    pub xoff: Option<f64>,
    pub yoff: Option<f64>,
    pub xcore: Option<f64>,
    pub ycore: Option<f64>,
    /// Telescopes whose images were selected upstream.
    pub selected: Vec<TelescopeId>,
}

/// Simulated truth of an air shower.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct McTruth {
    /// Primary energy (TeV).
    pub energy: f64,
    /// True core (meters).
    pub xcore: f64,
    pub ycore: f64,
    /// True direction in camera coordinates (degrees).
    pub xoff: f64,
    pub yoff: f64,
    /// Height of shower maximum (km), if known.
    #[cfg_attr(feature = "serde", serde(default))]
    pub xmax_height: Option<f64>,
}

impl McTruth {
    /// True angular offset from the camera center (degrees).
    #[must_use]
    pub fn offset(&self) -> f64 {
        self.xoff.hypot(self.yoff)
    }
}

/// One event's worth of input.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventInput {
    pub run_number: u32,
    pub event_number: u64,
    /// Event time (seconds).
    pub time: f64,
    pub pointing: Pointing,
    /// Camera field rotation used for sky de-rotation (degrees).
    #[cfg_attr(feature = "serde", serde(default))]
    pub field_rotation: f64,
    /// Triggered telescopes.
    pub trigger: Vec<TelescopeId>,
    /// Image parameters, one slot per array telescope.
    pub images: PerTelescope<ImageParameters>,
    /// Upstream reconstructions, indexed by method.
    pub reconstructions: Vec<UpstreamReconstruction>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub mc: Option<McTruth>,
}

impl EventInput {
    /// True if at least one telescope triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        !self.trigger.is_empty()
    }
}

/// How the event direction was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DirectionMethod {
    /// Taken from the input stream.
    Upstream,
    /// Weighted intersection of image axes.
    Intersection,
    /// Regression (disp) combination.
    Disp,
}

/// Reconstructed shower direction in camera coordinates (degrees).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Direction {
    pub xoff: f64,
    pub yoff: f64,
    /// Offset rotated into the sky frame.
    pub xoff_derot: f64,
    pub yoff_derot: f64,
    /// Convergence metric of the geometric fit.
    pub stds: Option<f64>,
    /// Dispersion between per-pair or per-telescope estimates.
    pub disp_diff: Option<f64>,
    pub method: DirectionMethod,
}

impl Direction {
    /// Angular distance from the camera center (degrees).
    #[must_use]
    pub fn offset(&self) -> f64 {
        self.xoff.hypot(self.yoff)
    }
}

/// Emission height of one telescope pair.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PairHeight {
    pub first: TelescopeId,
    pub second: TelescopeId,
    /// Height (km).
    pub height: f64,
    pub weight: f64,
}

/// Result of the pairwise emission-height triangulation.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EmissionHeight {
    /// Weighted mean height (km); `None` with fewer than two valid images.
    pub mean: Option<f64>,
    /// Weighted dispersion of pair heights (km).
    pub chi2: Option<f64>,
    pub n_pairs: usize,
    pub pairs: Vec<PairHeight>,
}

/// Lookup-table prediction for one image.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScaledValue {
    /// Measured value.
    pub measured: f64,
    /// Expected value from the table.
    pub expected: f64,
    /// Expected spread from the table.
    pub sigma: f64,
}

impl ScaledValue {
    /// `(measured - expected) / sigma`, `None` for zero spread.
    #[must_use]
    pub fn scaled(&self) -> Option<f64> {
        (self.sigma > 0.0).then(|| (self.measured - self.expected) / self.sigma)
    }

    /// `measured / expected`, `None` for zero expectation.
    #[must_use]
    pub fn ratio(&self) -> Option<f64> {
        (self.expected > 0.0).then(|| self.measured / self.expected)
    }
}

/// Per-image results of the reconstruction.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageResult {
    pub size: f64,
    /// Impact distance to the reconstructed core (meters).
    pub core_distance: f64,
    pub width: Option<ScaledValue>,
    pub length: Option<ScaledValue>,
    /// Lookup-table energy (TeV).
    pub energy: Option<f64>,
    pub energy_sigma: Option<f64>,
    /// Regression disp (degrees).
    pub disp: Option<f64>,
    /// Regression energy (TeV).
    pub disp_energy: Option<f64>,
    /// Regression core distance (meters).
    pub disp_core_distance: Option<f64>,
}

/// Classification of the event energy combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EnergyQuality {
    /// Enough of the selected images contributed.
    Full,
    /// Some images contributed, fewer than the policy requires.
    Partial,
    /// No image contributed.
    Failed,
}

impl EnergyQuality {
    /// Integer code used in flat output formats.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            EnergyQuality::Full => 0,
            EnergyQuality::Partial => 1,
            EnergyQuality::Failed => -1,
        }
    }
}

/// Event-level energy estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EnergyEstimate {
    /// Energy (TeV); `None` when no telescope contributed.
    pub energy: Option<f64>,
    pub chi2: Option<f64>,
    /// Relative spread of per-telescope energies.
    pub dispersion: Option<f64>,
    pub n_contributing: usize,
    pub quality: EnergyQuality,
}

/// Event-level mean scaled parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScaledParameters {
    pub mscw: Option<f64>,
    pub mscl: Option<f64>,
    pub mwr: Option<f64>,
    pub mlr: Option<f64>,
}

/// Summary of the regression reconstruction.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DispSummary {
    pub n_contributing: usize,
    pub xoff: Option<f64>,
    pub yoff: Option<f64>,
    pub disp_diff: Option<f64>,
    /// Combined regression energy (TeV).
    pub energy: Option<f64>,
    pub energy_dispersion: Option<f64>,
}

/// One reconstructed air-shower event.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventRecord {
    pub run_number: u32,
    pub event_number: u64,
    pub time: f64,
    pub pointing: Pointing,
    pub trigger: Vec<TelescopeId>,
    pub direction: Direction,
    pub xcore: f64,
    pub ycore: f64,
    /// Impact distance of every telescope to the reconstructed core.
    pub core_distance: PerTelescope<f64>,
    /// Results for the images used in the reconstruction.
    pub images: SelectedImages<ImageResult>,
    pub scaled: ScaledParameters,
    pub energy: Option<EnergyEstimate>,
    pub emission_height: EmissionHeight,
    pub disp: Option<DispSummary>,
    pub mc: Option<McTruth>,
    /// Impact distance of every telescope to the true core.
    pub mc_core_distance: Option<PerTelescope<f64>>,
    /// Spectral re-weighting factor.
    pub weight: f64,
}

impl EventRecord {
    /// Image multiplicity of the reconstruction.
    #[must_use]
    pub fn n_images(&self) -> usize {
        self.images.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_scaled_value() {
        let v = ScaledValue {
            measured: 0.12,
            expected: 0.10,
            sigma: 0.01,
        };
        assert_abs_diff_eq!(v.scaled().unwrap(), 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(v.ratio().unwrap(), 1.2, epsilon = 1e-9);

        let degenerate = ScaledValue {
            measured: 0.1,
            expected: 0.0,
            sigma: 0.0,
        };
        assert!(degenerate.scaled().is_none());
        assert!(degenerate.ratio().is_none());
    }

    #[test]
    fn test_offsets() {
        let mc = McTruth {
            energy: 1.0,
            xoff: 0.3,
            yoff: 0.4,
            ..McTruth::default()
        };
        assert_abs_diff_eq!(mc.offset(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_energy_quality_codes() {
        assert_eq!(EnergyQuality::Full.code(), 0);
        assert_eq!(EnergyQuality::Partial.code(), 1);
        assert_eq!(EnergyQuality::Failed.code(), -1);
    }
}
