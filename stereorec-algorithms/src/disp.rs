//! Disp regression reconstruction.
//!
//! A trained regressor predicts, per image, the distance along the major
//! axis from the centroid to the source ("disp"). The two candidate
//! positions on either side of the centroid are disambiguated against a
//! geometric reference, then combined across telescopes with inverse-error
//! weights. Optional models predict the error, the energy (log10 TeV) and
//! the core distance per image.
#![allow(clippy::cast_precision_loss)]

use std::collections::BTreeMap;
use std::fmt;

use stereorec_core::config::DispConfig;
use stereorec_core::error::{Error, Result};
use stereorec_core::image::ImageParameters;
use stereorec_core::{TelescopeId, TelescopeType};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Feature order fed to every regression model.
pub const FEATURE_NAMES: [&str; 10] = [
    "log10_size",
    "width",
    "length",
    "width_over_length",
    "asym",
    "loss",
    "dist",
    "time_gradient",
    "ntubes",
    "core_distance",
];

/// Builds the feature vector of one image, in [`FEATURE_NAMES`] order.
#[must_use]
pub fn image_features(image: &ImageParameters, core_distance: f64) -> [f64; FEATURE_NAMES.len()] {
    let width_over_length = if image.length > 0.0 {
        image.width / image.length
    } else {
        0.0
    };
    [
        image.size.max(1.0).log10(),
        image.width,
        image.length,
        width_over_length,
        image.asymmetry,
        image.loss,
        image.dist,
        image.time_gradient,
        f64::from(image.ntubes),
        core_distance,
    ]
}

/// Quantity predicted by a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DispTarget {
    /// Disp magnitude (degrees).
    Direction,
    /// Absolute error of the disp position (degrees).
    Error,
    /// log10 of the energy (TeV).
    Energy,
    /// Impact distance (meters).
    Core,
}

impl DispTarget {
    /// All targets.
    pub const ALL: [DispTarget; 4] = [Self::Direction, Self::Error, Self::Energy, Self::Core];

    /// Short name used in file names and messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Direction => "direction",
            Self::Error => "error",
            Self::Energy => "energy",
            Self::Core => "core",
        }
    }
}

impl fmt::Display for DispTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A trained model evaluated on a feature vector.
pub trait Regressor: Send + Sync + fmt::Debug {
    /// Names of the features the model was trained on, in input order.
    fn feature_names(&self) -> &[String];

    /// Evaluates the model.
    fn predict(&self, features: &[f64]) -> f64;

    /// Checks the model's internal structure before first use.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] describing the defect.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Node of a regression tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum TreeNode {
    /// Goes `left` when `features[feature] < threshold`, else `right`.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// One regression tree, root at index 0.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    fn evaluate(&self, features: &[f64]) -> f64 {
        let mut index = 0;
        // a root-to-leaf path visits each node at most once
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(index) {
                Some(TreeNode::Leaf { value }) => return *value,
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let x = features.get(*feature).copied().unwrap_or(f64::NAN);
                    // NaN goes right
                    index = if x < *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
        f64::NAN
    }
}

/// Gradient-boosted tree ensemble: `base_score + sum(tree leaves)`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TreeEnsemble {
    pub feature_names: Vec<String>,
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    /// Checks that every tree is a well-formed forward-linked tree.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for out-of-range feature or child
    /// indices and for empty trees.
    pub fn validate(&self) -> Result<()> {
        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(Error::ConfigError(format!("tree {t} has no nodes")));
            }
            for (i, node) in tree.nodes.iter().enumerate() {
                if let TreeNode::Split {
                    feature,
                    left,
                    right,
                    ..
                } = node
                {
                    if *feature >= self.feature_names.len() {
                        return Err(Error::ConfigError(format!(
                            "tree {t} node {i} uses feature {feature}, model has {}",
                            self.feature_names.len()
                        )));
                    }
                    // children after parents, so evaluation terminates
                    for child in [*left, *right] {
                        if child <= i || child >= tree.nodes.len() {
                            return Err(Error::ConfigError(format!(
                                "tree {t} node {i} has invalid child {child}"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl Regressor for TreeEnsemble {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, features: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|tree| tree.evaluate(features)).sum::<f64>()
    }

    fn validate(&self) -> Result<()> {
        TreeEnsemble::validate(self)
    }
}

/// Models keyed by target and telescope type.
#[derive(Debug, Default)]
pub struct DispModels {
    models: BTreeMap<(DispTarget, TelescopeType), Box<dyn Regressor>>,
}

impl DispModels {
    /// Creates an empty model set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a model after checking its feature contract and structure.
    ///
    /// # Errors
    /// Returns [`Error::FeatureMismatch`] if the model's feature names
    /// differ from [`FEATURE_NAMES`], and [`Error::ConfigError`] for a
    /// malformed model or a second model for the same target and type.
    pub fn insert(
        &mut self,
        target: DispTarget,
        telescope_type: TelescopeType,
        model: Box<dyn Regressor>,
    ) -> Result<()> {
        let found = model.feature_names();
        if found.len() != FEATURE_NAMES.len()
            || found.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b)
        {
            return Err(Error::FeatureMismatch {
                model: format!("{target}/type {telescope_type}"),
                expected: FEATURE_NAMES.iter().map(ToString::to_string).collect(),
                found: found.to_vec(),
            });
        }
        model.validate()?;
        if self.has(target, telescope_type) {
            return Err(Error::ConfigError(format!(
                "duplicate {target} model for telescope type {telescope_type}"
            )));
        }
        self.models.insert((target, telescope_type), model);
        Ok(())
    }

    /// Model for a target and type.
    #[must_use]
    pub fn get(&self, target: DispTarget, telescope_type: TelescopeType) -> Option<&dyn Regressor> {
        self.models
            .get(&(target, telescope_type))
            .map(AsRef::as_ref)
    }

    /// True if a model exists for the target and type.
    #[must_use]
    pub fn has(&self, target: DispTarget, telescope_type: TelescopeType) -> bool {
        self.models.contains_key(&(target, telescope_type))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Types among `types` without a direction model.
    pub fn missing_direction_types(
        &self,
        types: impl IntoIterator<Item = TelescopeType>,
    ) -> Vec<TelescopeType> {
        types
            .into_iter()
            .filter(|t| !self.has(DispTarget::Direction, *t))
            .collect()
    }
}

/// One selected image as seen by the disp reconstructor.
#[derive(Debug, Clone, Copy)]
pub struct DispInput<'a> {
    pub id: TelescopeId,
    pub telescope_type: TelescopeType,
    pub image: &'a ImageParameters,
    /// Impact distance to the geometric core (meters).
    pub core_distance: f64,
}

/// Per-image regression output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispImageResult {
    pub id: TelescopeId,
    pub disp: Option<f64>,
    /// Chosen source position (degrees).
    pub position: Option<(f64, f64)>,
    pub error: Option<f64>,
    pub weight: f64,
    /// Predicted energy (TeV).
    pub energy: Option<f64>,
    pub core_distance: Option<f64>,
}

/// Event-level regression output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DispResult {
    pub images: Vec<DispImageResult>,
    /// Combined source position; `None` if no image contributed.
    pub direction: Option<(f64, f64)>,
    /// Weighted mean squared deviation of the per-image positions (deg^2).
    pub disp_diff: Option<f64>,
    /// Images contributing to the direction.
    pub n_contributing: usize,
    /// Size-weighted energy (TeV).
    pub energy: Option<f64>,
    /// Relative rms of the per-image energies.
    pub energy_dispersion: Option<f64>,
}

/// Evaluates the disp models for one event.
#[derive(Debug)]
pub struct DispReconstructor<'a> {
    models: &'a DispModels,
    config: DispConfig,
}

impl<'a> DispReconstructor<'a> {
    /// Creates a reconstructor over a loaded model set.
    #[must_use]
    pub fn new(models: &'a DispModels, config: DispConfig) -> Self {
        Self { models, config }
    }

    /// Picks the source candidate for an image.
    ///
    /// With a reference position the candidate closer to it wins; without
    /// one, positive asymmetry puts the source behind the centroid.
    fn resolve(image: &ImageParameters, disp: f64, reference: Option<(f64, f64)>) -> (f64, f64) {
        let ahead = (image.cen_x + disp * image.cosphi, image.cen_y + disp * image.sinphi);
        let behind = (image.cen_x - disp * image.cosphi, image.cen_y - disp * image.sinphi);
        match reference {
            Some((rx, ry)) => {
                let d_ahead = (ahead.0 - rx).hypot(ahead.1 - ry);
                let d_behind = (behind.0 - rx).hypot(behind.1 - ry);
                if d_behind <= d_ahead {
                    behind
                } else {
                    ahead
                }
            }
            None if image.asymmetry >= 0.0 => behind,
            None => ahead,
        }
    }

    /// Runs all available models on the selected images.
    ///
    /// Images whose type has no direction model are left out of the
    /// direction combination.
    #[must_use]
    pub fn reconstruct(&self, inputs: &[DispInput<'_>], reference: Option<(f64, f64)>) -> DispResult {
        let mut images = Vec::with_capacity(inputs.len());
        for input in inputs {
            let features = image_features(input.image, input.core_distance);
            let mut result = DispImageResult {
                id: input.id,
                disp: None,
                position: None,
                error: None,
                weight: 0.0,
                energy: None,
                core_distance: None,
            };

            if let Some(model) = self.models.get(DispTarget::Direction, input.telescope_type) {
                let disp = model.predict(&features).abs();
                if disp.is_finite() {
                    result.disp = Some(disp);
                    result.position = Some(Self::resolve(input.image, disp, reference));
                    result.weight = match self.models.get(DispTarget::Error, input.telescope_type) {
                        Some(error_model) => {
                            let error = error_model.predict(&features).abs();
                            result.error = Some(error);
                            1.0 / error.max(self.config.min_error)
                        }
                        None => self.config.fixed_weight,
                    };
                }
            }
            if self.config.use_energy {
                if let Some(model) = self.models.get(DispTarget::Energy, input.telescope_type) {
                    let energy = 10_f64.powf(model.predict(&features));
                    result.energy = energy.is_finite().then_some(energy);
                }
            }
            if let Some(model) = self.models.get(DispTarget::Core, input.telescope_type) {
                let distance = model.predict(&features);
                result.core_distance = distance.is_finite().then_some(distance);
            }
            images.push(result);
        }

        let (direction, disp_diff, n_contributing) = combine_positions(&images);
        let (energy, energy_dispersion) = combine_energies(&images, inputs);
        DispResult {
            images,
            direction,
            disp_diff,
            n_contributing,
            energy,
            energy_dispersion,
        }
    }
}

fn combine_positions(images: &[DispImageResult]) -> (Option<(f64, f64)>, Option<f64>, usize) {
    let contributing: Vec<((f64, f64), f64)> = images
        .iter()
        .filter_map(|r| r.position.map(|p| (p, r.weight)))
        .filter(|(_, w)| *w > 0.0)
        .collect();
    let sum_w: f64 = contributing.iter().map(|(_, w)| w).sum();
    if contributing.is_empty() || sum_w <= 0.0 {
        return (None, None, 0);
    }
    let x = contributing.iter().map(|((x, _), w)| w * x).sum::<f64>() / sum_w;
    let y = contributing.iter().map(|((_, y), w)| w * y).sum::<f64>() / sum_w;
    let diff = contributing
        .iter()
        .map(|((px, py), w)| w * ((px - x).powi(2) + (py - y).powi(2)))
        .sum::<f64>()
        / sum_w;
    (Some((x, y)), Some(diff), contributing.len())
}

fn combine_energies(images: &[DispImageResult], inputs: &[DispInput<'_>]) -> (Option<f64>, Option<f64>) {
    let values: Vec<(f64, f64)> = images
        .iter()
        .zip(inputs)
        .filter_map(|(r, input)| r.energy.map(|e| (e, input.image.size.max(0.0))))
        .filter(|(_, w)| *w > 0.0)
        .collect();
    let sum_w: f64 = values.iter().map(|(_, w)| w).sum();
    if values.is_empty() || sum_w <= 0.0 {
        return (None, None);
    }
    let mean = values.iter().map(|(e, w)| w * e).sum::<f64>() / sum_w;
    let dispersion = if values.len() > 1 && mean > 0.0 {
        let variance = values.iter().map(|(e, w)| w * (e - mean).powi(2)).sum::<f64>() / sum_w;
        variance.sqrt() / mean
    } else {
        0.0
    };
    (Some(mean), Some(dispersion))
}
