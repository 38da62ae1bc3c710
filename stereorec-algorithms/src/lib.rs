//! stereorec-algorithms: Reconstruction algorithms for stereo air-shower events.
//!
//! This crate provides:
//! - **Intersection** - direction and core from pairwise image-axis intersections
//! - **Emission height** - pairwise triangulation of the light maximum
//! - **Disp** - regression-based direction, energy and core distance
//! - **Lookup tables** - filled and read (size, distance) profiles for
//!   scaled width/length and energy
//! - **Processing** - the per-event state machine tying them together
//!

pub mod disp;
mod emission_height;
mod intersection;
pub mod lookup;
mod processing;
mod scaled;

pub use disp::{
    image_features, DispInput, DispModels, DispReconstructor, DispResult, DispTarget, Regressor,
    Tree, TreeEnsemble, TreeNode, FEATURE_NAMES,
};
pub use emission_height::{EmissionHeightEstimator, HeightPoint};
pub use intersection::{AxisImage, IntersectionReconstructor, IntersectionResult};
pub use lookup::{
    LookupTable, ProfileBin, SliceCoverage, TableLayout, TableSet, TableSlice, TableTarget,
    TableValue,
};
pub use processing::{EventOutcome, EventProcessor, RunSummary};
pub use scaled::{combine_energy, combine_scaled};
