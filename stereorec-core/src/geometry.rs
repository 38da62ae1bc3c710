//! Pointing and shower-plane geometry.
//!
//! The shower plane is perpendicular to the array pointing direction.
//! Its basis is `h = (cos az, -sin az, 0)`, `v = p x h`, `p` the pointing
//! unit vector, so that for a zenith pointing at azimuth 0 the shower
//! frame coincides with the ground frame.
#![allow(clippy::similar_names)]

use crate::array::Position;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Array pointing direction (degrees).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pointing {
    /// Azimuth, from north towards east.
    pub azimuth: f64,
    /// Elevation above the horizon.
    pub elevation: f64,
}

impl Pointing {
    /// Creates a pointing.
    #[must_use]
    pub fn new(azimuth: f64, elevation: f64) -> Self {
        Self { azimuth, elevation }
    }

    /// Zenith pointing at azimuth 0.
    #[must_use]
    pub fn zenith() -> Self {
        Self::new(0.0, 90.0)
    }

    /// Zenith angle (degrees).
    #[inline]
    #[must_use]
    pub fn zenith_angle(&self) -> f64 {
        90.0 - self.elevation
    }

    /// Shower-frame basis vectors `(h, v, p)`.
    #[must_use]
    pub fn basis(&self) -> ([f64; 3], [f64; 3], [f64; 3]) {
        let (saz, caz) = self.azimuth.to_radians().sin_cos();
        let (sze, cze) = self.zenith_angle().to_radians().sin_cos();
        let h = [caz, -saz, 0.0];
        let v = [cze * saz, cze * caz, -sze];
        let p = [sze * saz, sze * caz, cze];
        (h, v, p)
    }

    /// Transforms a ground position into shower coordinates `(xs, ys, zs)`.
    #[must_use]
    pub fn ground_to_shower(&self, pos: Position) -> [f64; 3] {
        let (h, v, p) = self.basis();
        let r = [pos.x, pos.y, pos.z];
        [dot(&r, &h), dot(&r, &v), dot(&r, &p)]
    }

    /// Projects a shower-plane point back to the ground (`z = 0`).
    ///
    /// Returns `None` for pointings at or below the horizon.
    #[must_use]
    pub fn shower_to_ground(&self, xs: f64, ys: f64) -> Option<(f64, f64)> {
        let (h, v, p) = self.basis();
        if p[2] <= 1.0e-9 {
            return None;
        }
        // z component: ys * v_z + zs * p_z = 0
        let zs = -ys * v[2] / p[2];
        let x = xs * h[0] + ys * v[0] + zs * p[0];
        let y = xs * h[1] + ys * v[1] + zs * p[1];
        Some((x, y))
    }

    /// Perpendicular distance of a telescope to the shower axis through a
    /// ground core (meters).
    #[must_use]
    pub fn impact_distance(&self, telescope: Position, core_x: f64, core_y: f64) -> f64 {
        let tel = self.ground_to_shower(telescope);
        let core = self.ground_to_shower(Position::new(core_x, core_y, 0.0));
        (tel[0] - core[0]).hypot(tel[1] - core[1])
    }
}

impl Default for Pointing {
    fn default() -> Self {
        Self::zenith()
    }
}

#[inline]
fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Rotates a camera-plane offset by `-angle` degrees (sky de-rotation).
#[must_use]
pub fn derotate(x: f64, y: f64, angle_deg: f64) -> (f64, f64) {
    let (s, c) = angle_deg.to_radians().sin_cos();
    (x * c + y * s, -x * s + y * c)
}

/// Rotates a camera-plane offset by `angle` degrees.
#[must_use]
pub fn rotate(x: f64, y: f64, angle_deg: f64) -> (f64, f64) {
    derotate(x, y, -angle_deg)
}
