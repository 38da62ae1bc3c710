//! Event-level combination of per-image table results.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use stereorec_core::config::EnergyQualityPolicy;
use stereorec_core::event::{EnergyEstimate, EnergyQuality, ImageResult, ScaledParameters, ScaledValue};
use stereorec_core::SelectedImages;

/// Relative floor on per-image energy spreads before inverse-variance
/// weighting.
const MIN_RELATIVE_SIGMA: f64 = 1.0e-3;

fn size_weighted_mean(values: impl Iterator<Item = (f64, f64)>) -> Option<f64> {
    let (sum_w, sum_wx) = values
        .filter(|(x, w)| x.is_finite() && *w > 0.0)
        .fold((0.0, 0.0), |(sw, swx), (x, w)| (sw + w, swx + w * x));
    (sum_w > 0.0).then(|| sum_wx / sum_w)
}

fn mean_of(
    images: &SelectedImages<ImageResult>,
    field: impl Fn(&ImageResult) -> Option<ScaledValue>,
    reduce: impl Fn(&ScaledValue) -> Option<f64>,
) -> Option<f64> {
    size_weighted_mean(
        images
            .iter()
            .filter_map(|(_, r)| field(r).as_ref().and_then(&reduce).map(|v| (v, r.size))),
    )
}

/// Size-weighted MSCW, MSCL, MWR and MLR over the images with table
/// values.
#[must_use]
pub fn combine_scaled(images: &SelectedImages<ImageResult>) -> ScaledParameters {
    ScaledParameters {
        mscw: mean_of(images, |r| r.width, ScaledValue::scaled),
        mscl: mean_of(images, |r| r.length, ScaledValue::scaled),
        mwr: mean_of(images, |r| r.width, ScaledValue::ratio),
        mlr: mean_of(images, |r| r.length, ScaledValue::ratio),
    }
}

/// Combines per-image table energies with inverse-variance weights.
///
/// The label is [`EnergyQuality::Full`] when at least
/// `max(policy.min_images, ceil(policy.min_fraction * images.len()))`
/// images contributed.
#[must_use]
pub fn combine_energy(
    images: &SelectedImages<ImageResult>,
    policy: &EnergyQualityPolicy,
) -> EnergyEstimate {
    let values: Vec<(f64, f64)> = images
        .iter()
        .filter_map(|(_, r)| {
            let energy = r.energy.filter(|e| *e > 0.0 && e.is_finite())?;
            let sigma = r
                .energy_sigma
                .filter(|s| s.is_finite())
                .unwrap_or(0.0)
                .max(MIN_RELATIVE_SIGMA * energy);
            Some((energy, 1.0 / (sigma * sigma)))
        })
        .collect();

    let n = values.len();
    let required = policy
        .min_images
        .max((policy.min_fraction * images.len() as f64).ceil() as usize);
    let quality = match n {
        0 => EnergyQuality::Failed,
        n if n >= required => EnergyQuality::Full,
        _ => EnergyQuality::Partial,
    };
    if n == 0 {
        return EnergyEstimate {
            energy: None,
            chi2: None,
            dispersion: None,
            n_contributing: 0,
            quality,
        };
    }

    let sum_w: f64 = values.iter().map(|(_, w)| w).sum();
    let energy = values.iter().map(|(e, w)| w * e).sum::<f64>() / sum_w;
    let sum_sq: f64 = values.iter().map(|(e, w)| w * (e - energy).powi(2)).sum();
    let chi2 = if n > 1 { sum_sq / (n - 1) as f64 } else { 0.0 };
    let dispersion = if n > 1 {
        (sum_sq / sum_w).sqrt() / energy
    } else {
        0.0
    };
    EnergyEstimate {
        energy: Some(energy),
        chi2: Some(chi2),
        dispersion: Some(dispersion),
        n_contributing: n,
        quality,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use stereorec_core::TelescopeId;

    fn result(size: f64, width: f64, energy: Option<(f64, f64)>) -> ImageResult {
        ImageResult {
            size,
            width: Some(ScaledValue {
                measured: width,
                expected: 0.1,
                sigma: 0.02,
            }),
            energy: energy.map(|e| e.0),
            energy_sigma: energy.map(|e| e.1),
            ..ImageResult::default()
        }
    }

    fn images(results: Vec<ImageResult>) -> SelectedImages<ImageResult> {
        results
            .into_iter()
            .enumerate()
            .map(|(i, r)| (TelescopeId(i), r))
            .collect()
    }

    #[test]
    fn test_size_weighted_mscw() {
        let selected = images(vec![result(100.0, 0.12, None), result(300.0, 0.08, None)]);
        let scaled = combine_scaled(&selected);
        // (100 * 1 + 300 * -1) / 400
        assert_abs_diff_eq!(scaled.mscw.unwrap(), -0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(scaled.mwr.unwrap(), (100.0 * 1.2 + 300.0 * 0.8) / 400.0, epsilon = 1e-12);
        assert!(scaled.mscl.is_none());
        assert!(scaled.mlr.is_none());
    }

    #[test]
    fn test_energy_inverse_variance() {
        let selected = images(vec![
            result(100.0, 0.1, Some((1.0, 0.1))),
            result(100.0, 0.1, Some((2.0, 0.2))),
        ]);
        let estimate = combine_energy(&selected, &EnergyQualityPolicy::default());
        // weights 100 and 25
        assert_abs_diff_eq!(estimate.energy.unwrap(), (100.0 + 50.0) / 125.0, epsilon = 1e-12);
        assert_eq!(estimate.n_contributing, 2);
        assert_eq!(estimate.quality, EnergyQuality::Full);
        assert!(estimate.chi2.unwrap() > 0.0);
    }

    #[test]
    fn test_energy_quality_labels() {
        let policy = EnergyQualityPolicy::default();
        let partial = images(vec![
            result(100.0, 0.1, Some((1.0, 0.1))),
            result(100.0, 0.1, None),
        ]);
        assert_eq!(combine_energy(&partial, &policy).quality, EnergyQuality::Partial);

        let relaxed = EnergyQualityPolicy {
            min_fraction: 0.5,
            min_images: 1,
        };
        assert_eq!(combine_energy(&partial, &relaxed).quality, EnergyQuality::Full);

        let none = images(vec![result(100.0, 0.1, None)]);
        let estimate = combine_energy(&none, &policy);
        assert_eq!(estimate.quality, EnergyQuality::Failed);
        assert!(estimate.energy.is_none());
    }

    #[test]
    fn test_single_energy_has_zero_dispersion() {
        let selected = images(vec![result(100.0, 0.1, Some((3.0, 0.0)))]);
        let estimate = combine_energy(&selected, &EnergyQualityPolicy::default());
        assert_abs_diff_eq!(estimate.energy.unwrap(), 3.0);
        assert_eq!(estimate.chi2, Some(0.0));
        assert_eq!(estimate.dispersion, Some(0.0));
    }
}
