//! stereorec-core: Core types for stereo air-shower reconstruction.
//!
//! This crate provides the telescope array model, per-telescope image
//! parameters, event input and output records, cut bookkeeping and the
//! immutable run configuration shared by the reconstruction algorithms.
//!

pub mod array;
pub mod config;
pub mod cuts;
pub mod deadtime;
pub mod error;
pub mod event;
pub mod geometry;
pub mod histogram;
pub mod image;
pub mod telescope_data;
pub mod weighting;

pub use array::{Position, Telescope, TelescopeArray, TelescopeId, TelescopeType};
pub use config::{
    DispConfig, EmissionHeightConfig, EnergyQualityPolicy, FillCuts, IntersectionConfig,
    LookupConfig, ProcessingMode, ReconstructionMethod, RunConfig, Subsampling,
};
pub use cuts::{CutReason, CutStatistics};
pub use deadtime::{DeadTimeCalculator, DeadTimeSummary};
pub use error::{Error, Result};
pub use event::{
    Direction, DirectionMethod, DispSummary, EmissionHeight, EnergyEstimate, EnergyQuality,
    EventInput, EventRecord, ImageResult, McTruth, PairHeight, ScaledParameters, ScaledValue,
    UpstreamReconstruction,
};
pub use geometry::Pointing;
pub use histogram::{Axis, Histogram1D, Histogram2D, McHistograms};
pub use image::{ImageParameters, ImageUncertainties};
pub use telescope_data::{PerTelescope, SelectedImages};
pub use weighting::SpectralWeighting;
