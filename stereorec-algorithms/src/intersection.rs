//! Geometric stereo reconstruction by intersecting image axes.
//!
//! Each image's major axis is a line in the camera plane through the
//! source position. The same axis drawn through the telescope position in
//! the shower plane passes through the core. Both estimates are weighted
//! means over all pairwise intersections.

use stereorec_core::config::IntersectionConfig;
use stereorec_core::geometry::Pointing;
use stereorec_core::image::ImageParameters;
use stereorec_core::TelescopeId;

/// Per-telescope input to the intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisImage {
    pub id: TelescopeId,
    pub cen_x: f64,
    pub cen_y: f64,
    pub cosphi: f64,
    pub sinphi: f64,
    pub width: f64,
    pub length: f64,
    pub size: f64,
    /// Telescope position in the shower plane (meters).
    pub shower_x: f64,
    pub shower_y: f64,
    /// Additional per-telescope weight.
    pub weight: f64,
}

impl AxisImage {
    /// Builds the input from an image and its telescope's shower-plane position.
    #[must_use]
    pub fn new(id: TelescopeId, image: &ImageParameters, shower: [f64; 3]) -> Self {
        Self {
            id,
            cen_x: image.cen_x,
            cen_y: image.cen_y,
            cosphi: image.cosphi,
            sinphi: image.sinphi,
            width: image.width,
            length: image.length,
            size: image.size,
            shower_x: shower[0],
            shower_y: shower[1],
            weight: 1.0,
        }
    }

    /// Sets the per-telescope weight.
    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    fn elongation_factor(&self) -> f64 {
        if self.length > 0.0 {
            (1.0 - self.width / self.length).max(0.0)
        } else {
            0.0
        }
    }
}

/// Result of a successful intersection reconstruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntersectionResult {
    /// Source position in the camera plane (degrees).
    pub xoff: f64,
    pub yoff: f64,
    /// Ground core (meters); `None` if the shower-plane core cannot be
    /// projected to the ground.
    pub core: Option<(f64, f64)>,
    /// Weighted rms spread of the camera-plane intersections (degrees).
    pub stds: f64,
    /// Mean squared distance between camera-plane intersections (deg^2).
    pub disp_diff: f64,
    /// Number of pairs that entered the average.
    pub n_pairs: usize,
}

/// Axis-intersection reconstructor.
#[derive(Debug, Clone, Default)]
pub struct IntersectionReconstructor {
    config: IntersectionConfig,
}

struct PairPoint {
    camera: (f64, f64),
    shower: (f64, f64),
    weight: f64,
}

/// Intersection of the lines `p1 + t*d1` and `p2 + s*d2`, given
/// `cross = d1 x d2`.
fn line_intersection(p1: (f64, f64), d1: (f64, f64), p2: (f64, f64), d2: (f64, f64), cross: f64) -> (f64, f64) {
    let t = ((p2.0 - p1.0) * d2.1 - (p2.1 - p1.1) * d2.0) / cross;
    (p1.0 + t * d1.0, p1.1 + t * d1.1)
}

impl IntersectionReconstructor {
    /// Creates a reconstructor.
    #[must_use]
    pub fn new(config: IntersectionConfig) -> Self {
        Self { config }
    }

    /// Weight of a pair, or `None` if the pair is excluded.
    fn pair_weight(&self, a: &AxisImage, b: &AxisImage, sin_angle: f64) -> Option<f64> {
        if sin_angle.abs() < self.config.min_pair_angle.to_radians().sin() {
            return None;
        }
        if !(a.size > 0.0 && b.size > 0.0) {
            return None;
        }
        let size_weight = 1.0 / (1.0 / a.size + 1.0 / b.size);
        let weight = sin_angle * sin_angle
            * size_weight
            * a.elongation_factor()
            * b.elongation_factor()
            * a.weight
            * b.weight;
        (weight > 0.0 && weight.is_finite()).then_some(weight)
    }

    /// Reconstructs direction and core from the selected images.
    ///
    /// Returns `None` with fewer than the configured minimum of images or
    /// when every pair is excluded.
    #[must_use]
    pub fn reconstruct(&self, images: &[AxisImage], pointing: &Pointing) -> Option<IntersectionResult> {
        if images.len() < self.config.min_images.max(2) {
            return None;
        }

        let mut points = Vec::with_capacity(images.len() * (images.len() - 1) / 2);
        for (i, a) in images.iter().enumerate() {
            for b in &images[i + 1..] {
                let da = (a.cosphi, a.sinphi);
                let db = (b.cosphi, b.sinphi);
                let cross = da.0 * db.1 - da.1 * db.0;
                let Some(weight) = self.pair_weight(a, b, cross) else {
                    continue;
                };
                let camera = line_intersection((a.cen_x, a.cen_y), da, (b.cen_x, b.cen_y), db, cross);
                let shower = line_intersection((a.shower_x, a.shower_y), da, (b.shower_x, b.shower_y), db, cross);
                if camera.0.is_finite() && camera.1.is_finite() && shower.0.is_finite() && shower.1.is_finite() {
                    points.push(PairPoint { camera, shower, weight });
                }
            }
        }
        if points.is_empty() {
            return None;
        }

        let sum_w: f64 = points.iter().map(|p| p.weight).sum();
        let mean = |f: fn(&PairPoint) -> f64| points.iter().map(|p| p.weight * f(p)).sum::<f64>() / sum_w;
        let xoff = mean(|p| p.camera.0);
        let yoff = mean(|p| p.camera.1);
        let xs = mean(|p| p.shower.0);
        let ys = mean(|p| p.shower.1);

        let stds = (points
            .iter()
            .map(|p| p.weight * ((p.camera.0 - xoff).powi(2) + (p.camera.1 - yoff).powi(2)))
            .sum::<f64>()
            / sum_w)
            .sqrt();

        let mut sum_d2 = 0.0;
        let mut n_d = 0_u32;
        for (i, a) in points.iter().enumerate() {
            for b in &points[i + 1..] {
                sum_d2 += (a.camera.0 - b.camera.0).powi(2) + (a.camera.1 - b.camera.1).powi(2);
                n_d += 1;
            }
        }
        let disp_diff = if n_d > 0 { sum_d2 / f64::from(n_d) } else { 0.0 };

        Some(IntersectionResult {
            xoff,
            yoff,
            core: pointing.shower_to_ground(xs, ys),
            stds,
            disp_diff,
            n_pairs: points.len(),
        })
    }
}
