//! Emission height from pairwise triangulation.
//!
//! Two telescopes separated by a baseline `b` (perpendicular to the
//! pointing) see the light maximum under an angular separation `d` of their
//! image centroids; the height is `b / tan(d)`.
#![allow(clippy::cast_precision_loss)]

use stereorec_core::config::EmissionHeightConfig;
use stereorec_core::event::{EmissionHeight, PairHeight};
use stereorec_core::TelescopeId;

/// One telescope's input to the triangulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightPoint {
    pub id: TelescopeId,
    /// Telescope position in the shower plane (meters).
    pub shower_x: f64,
    pub shower_y: f64,
    /// Image centroid (degrees).
    pub cen_x: f64,
    pub cen_y: f64,
    pub size: f64,
}

impl HeightPoint {
    fn is_valid(&self) -> bool {
        self.size > 0.0 && self.cen_x.is_finite() && self.cen_y.is_finite()
    }
}

/// Pairwise emission-height estimator.
#[derive(Debug, Clone, Default)]
pub struct EmissionHeightEstimator {
    config: EmissionHeightConfig,
}

impl EmissionHeightEstimator {
    /// Creates an estimator.
    #[must_use]
    pub fn new(config: EmissionHeightConfig) -> Self {
        Self { config }
    }

    /// Height (km) and weight of one pair, `None` for degenerate pairs.
    ///
    /// Symmetric in its arguments.
    #[must_use]
    pub fn pair_height(&self, a: &HeightPoint, b: &HeightPoint) -> Option<(f64, f64)> {
        if !a.is_valid() || !b.is_valid() {
            return None;
        }
        let separation = (a.cen_x - b.cen_x).hypot(a.cen_y - b.cen_y);
        if separation < self.config.min_angular_separation {
            return None;
        }
        let baseline = (a.shower_x - b.shower_x).hypot(a.shower_y - b.shower_y);
        let height = baseline / separation.to_radians().tan() / 1000.0;

        let (la, lb) = (a.size.log10(), b.size.log10());
        if !(la > 0.0 && lb > 0.0) {
            return None;
        }
        let weight = 1.0 / (1.0 / la + 1.0 / lb);
        (height.is_finite() && weight.is_finite()).then_some((height, weight))
    }

    /// Triangulates all pairs of valid images.
    #[must_use]
    pub fn estimate(&self, points: &[HeightPoint]) -> EmissionHeight {
        let valid: Vec<&HeightPoint> = points.iter().filter(|p| p.is_valid()).collect();
        if valid.len() < 2 {
            return EmissionHeight::default();
        }

        let mut pairs = Vec::with_capacity(valid.len() * (valid.len() - 1) / 2);
        let mut sum_w = 0.0;
        let mut sum_wh = 0.0;
        let mut sum_wh2 = 0.0;
        for (i, a) in valid.iter().enumerate() {
            for b in &valid[i + 1..] {
                let Some((height, weight)) = self.pair_height(a, b) else {
                    continue;
                };
                sum_w += weight;
                sum_wh += weight * height;
                sum_wh2 += weight * height * height;
                pairs.push(PairHeight {
                    first: a.id,
                    second: b.id,
                    height,
                    weight,
                });
            }
        }

        let n = pairs.len();
        if n == 0 || sum_w <= 0.0 {
            return EmissionHeight {
                pairs,
                ..EmissionHeight::default()
            };
        }
        let mean = sum_wh / sum_w;
        let chi2 = if n > 1 {
            let variance = (sum_wh2 / sum_w - mean * mean).max(0.0);
            (variance * n as f64 / (n - 1) as f64).sqrt()
        } else {
            0.0
        };
        EmissionHeight {
            mean: Some(mean),
            chi2: Some(chi2),
            n_pairs: n,
            pairs,
        }
    }
}
