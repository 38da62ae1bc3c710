//! Per-telescope image parameters.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Uncertainties of the image fit, when the upstream fit provides them.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageUncertainties {
    pub dcen_x: f64,
    pub dcen_y: f64,
    pub dwidth: f64,
    pub dlength: f64,
    pub dphi: f64,
}

/// Second-moment (Hillas-type) image parameters of one telescope.
///
/// Angles and lengths are camera-plane degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ImageParameters {
    pub cen_x: f64,
    pub cen_y: f64,
    pub width: f64,
    pub length: f64,
    pub cosphi: f64,
    pub sinphi: f64,
    /// Integrated intensity (photoelectrons).
    pub size: f64,
    /// Number of pixels in the image.
    pub ntubes: u32,
    /// Fraction of the signal in pixels at the camera edge.
    pub loss: f64,
    pub asymmetry: f64,
    /// Arrival-time gradient along the major axis.
    pub time_gradient: f64,
    /// Distance of the centroid from the camera center.
    pub dist: f64,
    /// Upstream fit status; non-negative is a good fit.
    pub fit_status: i32,
    /// Pedestal variance of the camera (noise level).
    pub noise: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub uncertainties: Option<ImageUncertainties>,
}

impl Default for ImageParameters {
    fn default() -> Self {
        Self {
            cen_x: 0.0,
            cen_y: 0.0,
            width: 0.0,
            length: 0.0,
            cosphi: 1.0,
            sinphi: 0.0,
            size: 0.0,
            ntubes: 0,
            loss: 0.0,
            asymmetry: 0.0,
            time_gradient: 0.0,
            dist: 0.0,
            fit_status: 0,
            noise: 0.0,
            uncertainties: None,
        }
    }
}

impl ImageParameters {
    /// Builds an image from centroid, shape, orientation (degrees) and size.
    /// `dist` is derived from the centroid.
    #[must_use]
    pub fn new(cen_x: f64, cen_y: f64, width: f64, length: f64, phi_deg: f64, size: f64) -> Self {
        let (sinphi, cosphi) = phi_deg.to_radians().sin_cos();
        Self {
            cen_x,
            cen_y,
            width,
            length,
            cosphi,
            sinphi,
            size,
            dist: cen_x.hypot(cen_y),
            ..Self::default()
        }
    }

    /// Sets the noise level.
    #[must_use]
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    /// Sets the edge-loss fraction.
    #[must_use]
    pub fn with_loss(mut self, loss: f64) -> Self {
        self.loss = loss;
        self
    }

    /// Sets the number of image pixels.
    #[must_use]
    pub fn with_ntubes(mut self, ntubes: u32) -> Self {
        self.ntubes = ntubes;
        self
    }

    /// Sets the asymmetry.
    #[must_use]
    pub fn with_asymmetry(mut self, asymmetry: f64) -> Self {
        self.asymmetry = asymmetry;
        self
    }

    /// Position angle of the major axis (radians).
    #[inline]
    #[must_use]
    pub fn phi(&self) -> f64 {
        self.sinphi.atan2(self.cosphi)
    }

    /// True for an image with signal and a good upstream fit.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.size > 0.0 && self.fit_status >= 0 && self.cen_x.is_finite() && self.cen_y.is_finite()
    }

    /// `1 - width/length`, the elongation weight (0 for round images).
    #[inline]
    #[must_use]
    pub fn elongation(&self) -> f64 {
        if self.length > 0.0 {
            (1.0 - self.width / self.length).max(0.0)
        } else {
            0.0
        }
    }
}
