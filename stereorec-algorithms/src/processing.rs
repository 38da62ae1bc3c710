//! Per-event orchestration: quality checks, image selection, geometry,
//! lookup-table reading or filling, final cuts and run bookkeeping.
//!
//! One [`EventProcessor`] handles events strictly in input order. Rejections
//! are outcomes, not errors; only configuration problems are returned as
//! `Err` and end the run.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use stereorec_core::config::{ProcessingMode, ReconstructionMethod, RunConfig};
use stereorec_core::cuts::{CutReason, CutStatistics};
use stereorec_core::deadtime::{DeadTimeCalculator, DeadTimeSummary};
use stereorec_core::error::{Error, Result};
use stereorec_core::event::{
    Direction, DirectionMethod, DispSummary, EmissionHeight, EventInput, EventRecord, ImageResult,
    McTruth, ScaledParameters, ScaledValue, UpstreamReconstruction,
};
use stereorec_core::geometry::derotate;
use stereorec_core::histogram::McHistograms;
use stereorec_core::image::ImageParameters;
use stereorec_core::{PerTelescope, SelectedImages, TelescopeArray};

use crate::disp::{DispInput, DispModels, DispReconstructor, DispResult};
use crate::emission_height::{EmissionHeightEstimator, HeightPoint};
use crate::intersection::{AxisImage, IntersectionReconstructor, IntersectionResult};
use crate::lookup::{LookupTable, TableSet};
use crate::scaled::{combine_energy, combine_scaled};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Result of processing one event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// The event survived all cuts.
    Accepted(Box<EventRecord>),
    /// The event was dropped by one cut.
    Rejected(CutReason),
    /// The time budget is exhausted; the event was not counted.
    Stop,
}

/// Run-level results besides the event records.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunSummary {
    pub cuts: CutStatistics,
    pub mc_histograms: McHistograms,
    /// Present when the run contained events without simulated truth.
    pub dead_time: Option<DeadTimeSummary>,
    /// True if the run ended on the time budget.
    pub stopped_early: bool,
}

impl RunSummary {
    /// Adds another worker's counters and histograms.
    ///
    /// Dead time is per run and is kept only if this summary has none.
    pub fn merge(&mut self, other: &RunSummary) {
        self.cuts.merge(&other.cuts);
        self.mc_histograms.merge(&other.mc_histograms);
        if self.dead_time.is_none() {
            self.dead_time.clone_from(&other.dead_time);
        }
        self.stopped_early |= other.stopped_early;
    }
}

/// Geometry of an event before the core is validated.
struct Geometry {
    xoff: f64,
    yoff: f64,
    xcore: f64,
    ycore: f64,
    stds: Option<f64>,
    disp_diff: Option<f64>,
    method: DirectionMethod,
    disp: Option<DispResult>,
    /// Images behind the direction estimate.
    n_images: usize,
}

impl Geometry {
    fn from_intersection(result: &IntersectionResult, n_images: usize) -> Self {
        let (xcore, ycore) = result.core.unwrap_or((f64::NAN, f64::NAN));
        Self {
            xoff: result.xoff,
            yoff: result.yoff,
            xcore,
            ycore,
            stds: Some(result.stds),
            disp_diff: Some(result.disp_diff),
            method: DirectionMethod::Intersection,
            disp: None,
            n_images,
        }
    }

    fn from_upstream(upstream: &UpstreamReconstruction) -> Option<Self> {
        Some(Self {
            xoff: upstream.xoff?,
            yoff: upstream.yoff?,
            xcore: upstream.xcore.unwrap_or(f64::NAN),
            ycore: upstream.ycore.unwrap_or(f64::NAN),
            stds: None,
            disp_diff: None,
            method: DirectionMethod::Upstream,
            disp: None,
            n_images: upstream.n_images,
        })
    }
}

/// Event loop state for one run.
#[derive(Debug)]
pub struct EventProcessor<'a> {
    array: &'a TelescopeArray,
    config: &'a RunConfig,
    tables: TableSet,
    disp_models: Option<&'a DispModels>,
    intersection: IntersectionReconstructor,
    emission_height: EmissionHeightEstimator,
    cuts: CutStatistics,
    mc_histograms: McHistograms,
    dead_time: DeadTimeCalculator,
    rng: Option<StdRng>,
    first_time: Option<f64>,
    stopped: bool,
}

impl<'a> EventProcessor<'a> {
    /// Creates a processor. In read mode `tables` are consulted, in fill
    /// mode they are accumulated into.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if the configuration is invalid.
    pub fn new(array: &'a TelescopeArray, config: &'a RunConfig, tables: TableSet) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            array,
            config,
            tables,
            disp_models: None,
            intersection: IntersectionReconstructor::new(config.intersection),
            emission_height: EmissionHeightEstimator::new(config.emission_height),
            cuts: CutStatistics::new(),
            mc_histograms: McHistograms::default(),
            dead_time: DeadTimeCalculator::default(),
            rng: config.subsampling.map(|s| StdRng::seed_from_u64(s.seed)),
            first_time: None,
            stopped: false,
        })
    }

    /// Uses a regression model set for the disp method.
    #[must_use]
    pub fn with_disp_models(mut self, models: &'a DispModels) -> Self {
        self.disp_models = Some(models);
        self
    }

    /// Reseeds the sub-sampling generator (one stream per worker).
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        if self.rng.is_some() {
            self.rng = Some(StdRng::seed_from_u64(seed));
        }
        self
    }

    #[must_use]
    pub fn cut_statistics(&self) -> &CutStatistics {
        &self.cuts
    }

    #[must_use]
    pub fn mc_histograms(&self) -> &McHistograms {
        &self.mc_histograms
    }

    #[must_use]
    pub fn tables(&self) -> &TableSet {
        &self.tables
    }

    /// True once the time budget has ended the run.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Ends the run, returning the summary and the (possibly filled) tables.
    #[must_use]
    pub fn finish(self) -> (RunSummary, TableSet) {
        let dead_time = (self.dead_time.n_events() > 0).then(|| self.dead_time.summary());
        let summary = RunSummary {
            cuts: self.cuts,
            mc_histograms: self.mc_histograms,
            dead_time,
            stopped_early: self.stopped,
        };
        (summary, self.tables)
    }

    fn reject(&mut self, event: &EventInput, reason: CutReason) -> EventOutcome {
        debug!(
            "run {} event {} rejected: {}",
            event.run_number,
            event.event_number,
            reason.label()
        );
        self.cuts.record_rejection(reason);
        EventOutcome::Rejected(reason)
    }

    fn event_weight(&self, mc: Option<&McTruth>) -> f64 {
        match (self.config.spectral_weighting, mc) {
            (Some(weighting), Some(mc)) => weighting.weight(mc.energy),
            _ => 1.0,
        }
    }

    /// Processes one event.
    ///
    /// # Errors
    /// Returns an error for configuration mismatches: per-telescope data not
    /// matching the array, unknown telescope indices, a method index beyond
    /// the upstream reconstructions, or (fill mode) missing simulated truth.
    pub fn process(&mut self, event: &EventInput) -> Result<EventOutcome> {
        if self.stopped {
            return Ok(EventOutcome::Stop);
        }
        if let Some(budget) = self.config.max_elapsed_time {
            let first = *self.first_time.get_or_insert(event.time);
            if event.time - first > budget {
                info!(
                    "time budget of {budget} s exhausted at event {}; stopping",
                    event.event_number
                );
                self.stopped = true;
                return Ok(EventOutcome::Stop);
            }
        }

        if let (Some(rng), Some(sub)) = (self.rng.as_mut(), self.config.subsampling) {
            if rng.random::<f64>() >= sub.keep_probability {
                self.cuts.record_seen();
                return Ok(self.reject(event, CutReason::RandomThinning));
            }
        }
        self.cuts.record_seen();

        event.images.check_len(self.array.len())?;
        for &id in &event.trigger {
            self.array.check(id)?;
        }
        let weight = self.event_weight(event.mc.as_ref());
        match &event.mc {
            Some(mc) => self.mc_histograms.fill(mc, event.is_triggered(), weight),
            None if self.config.mode == ProcessingMode::Fill => {
                return Err(Error::MissingTruth {
                    event: event.event_number,
                });
            }
            None => self.dead_time.add(event.time),
        }

        // quick check on the upstream summary fields
        let upstream = event
            .reconstructions
            .get(self.config.method_index)
            .ok_or(Error::MethodIndexOutOfRange {
                index: self.config.method_index,
                available: event.reconstructions.len(),
            })?;
        if upstream.n_images < self.config.min_images {
            return Ok(self.reject(event, CutReason::Multiplicity));
        }
        if !upstream.chi2.is_some_and(|chi2| chi2 >= 0.0) {
            return Ok(self.reject(event, CutReason::Convergence));
        }

        let selected = self.select_images(event, upstream)?;
        if selected.len() < self.config.min_images {
            return Ok(self.reject(event, CutReason::ImageSelection));
        }

        let Some(geometry) = self.reconstruct_geometry(event, upstream, &selected)? else {
            return Ok(self.reject(event, CutReason::Geometry));
        };
        if !(geometry.xcore.is_finite() && geometry.ycore.is_finite()) {
            return Ok(self.reject(event, CutReason::CoreInvalid));
        }

        let geometry_images = geometry.n_images;
        let record = self.build_record(event, &selected, geometry, weight)?;

        match self.config.mode {
            ProcessingMode::Read => {
                if let Some(max_wobble) = self.config.max_wobble {
                    // single-image directions are exempt
                    if geometry_images != 1 && record.direction.offset() > max_wobble {
                        return Ok(self.reject(event, CutReason::WobbleOffset));
                    }
                }
            }
            ProcessingMode::Fill => {
                // MissingTruth was raised above for fill mode
                let Some(mc) = record.mc.as_ref() else {
                    return Err(Error::MissingTruth {
                        event: event.event_number,
                    });
                };
                let offset = mc.offset();
                let cuts = &self.config.fill_cuts;
                if offset < cuts.min_true_offset || offset > cuts.max_true_offset {
                    return Ok(self.reject(event, CutReason::TrueOffsetRange));
                }
                self.fill_tables(event, &selected, &record)?;
            }
        }

        self.cuts.record_survivor();
        Ok(EventOutcome::Accepted(Box::new(record)))
    }

    /// Upstream selection filtered by image validity and, in fill mode, by
    /// the distance and loss cuts.
    fn select_images<'e>(
        &self,
        event: &'e EventInput,
        upstream: &UpstreamReconstruction,
    ) -> Result<SelectedImages<&'e ImageParameters>> {
        let mut ids = upstream.selected.clone();
        ids.sort_unstable();
        ids.dedup();
        let mut selected = SelectedImages::new();
        for id in ids {
            self.array.check(id)?;
            let Some(image) = event.images.get(id).filter(|image| image.is_valid()) else {
                continue;
            };
            if self.config.mode == ProcessingMode::Fill {
                let camera_radius = 0.5 * self.array.field_of_view(id)?;
                let cuts = &self.config.fill_cuts;
                if image.dist >= cuts.max_dist_fraction * camera_radius || image.loss >= cuts.max_loss {
                    continue;
                }
            }
            selected.push(id, image);
        }
        Ok(selected)
    }

    fn axis_images(
        &self,
        event: &EventInput,
        selected: &SelectedImages<&ImageParameters>,
    ) -> Result<Vec<AxisImage>> {
        selected
            .iter()
            .map(|(id, image)| {
                let shower = event.pointing.ground_to_shower(self.array.position(id)?);
                Ok(AxisImage::new(id, image, shower))
            })
            .collect()
    }

    fn reconstruct_geometry(
        &self,
        event: &EventInput,
        upstream: &UpstreamReconstruction,
        selected: &SelectedImages<&ImageParameters>,
    ) -> Result<Option<Geometry>> {
        match self.config.method {
            ReconstructionMethod::Upstream => Ok(Geometry::from_upstream(upstream)),
            ReconstructionMethod::Intersection => {
                let axes = self.axis_images(event, selected)?;
                Ok(self
                    .intersection
                    .reconstruct(&axes, &event.pointing)
                    .map(|r| Geometry::from_intersection(&r, selected.len())))
            }
            ReconstructionMethod::Disp => {
                let axes = self.axis_images(event, selected)?;
                let reference = self
                    .intersection
                    .reconstruct(&axes, &event.pointing)
                    .map(|r| Geometry::from_intersection(&r, selected.len()))
                    .or_else(|| Geometry::from_upstream(upstream));
                let Some(mut geometry) = reference else {
                    return Ok(None);
                };
                let Some(models) = self.disp_models else {
                    return Ok(Some(geometry));
                };

                let inputs = selected
                    .iter()
                    .map(|(id, image)| {
                        let core_distance = event.pointing.impact_distance(
                            self.array.position(id)?,
                            geometry.xcore,
                            geometry.ycore,
                        );
                        Ok(DispInput {
                            id,
                            telescope_type: self.array.telescope_type(id)?,
                            image,
                            core_distance: if core_distance.is_finite() { core_distance } else { 0.0 },
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let result = DispReconstructor::new(models, self.config.disp)
                    .reconstruct(&inputs, Some((geometry.xoff, geometry.yoff)));
                if let (Some((xoff, yoff)), Some(disp_diff)) = (result.direction, result.disp_diff) {
                    geometry.xoff = xoff;
                    geometry.yoff = yoff;
                    geometry.disp_diff = Some(disp_diff);
                    geometry.method = DirectionMethod::Disp;
                    geometry.n_images = result.n_contributing;
                } else {
                    debug!(
                        "event {}: no disp model contributed, keeping {:?} direction",
                        event.event_number, geometry.method
                    );
                }
                geometry.disp = Some(result);
                Ok(Some(geometry))
            }
        }
    }

    fn core_distances(&self, event: &EventInput, xcore: f64, ycore: f64) -> PerTelescope<f64> {
        let values = self
            .array
            .iter()
            .map(|(_, telescope)| Some(event.pointing.impact_distance(telescope.position, xcore, ycore)))
            .collect();
        PerTelescope::from_vec(values)
    }

    fn build_record(
        &self,
        event: &EventInput,
        selected: &SelectedImages<&ImageParameters>,
        geometry: Geometry,
        weight: f64,
    ) -> Result<EventRecord> {
        let core_distance = self.core_distances(event, geometry.xcore, geometry.ycore);
        let mc_core_distance = event
            .mc
            .as_ref()
            .map(|mc| self.core_distances(event, mc.xcore, mc.ycore));

        let height_points = selected
            .iter()
            .map(|(id, image)| {
                let shower = event.pointing.ground_to_shower(self.array.position(id)?);
                Ok(HeightPoint {
                    id,
                    shower_x: shower[0],
                    shower_y: shower[1],
                    cen_x: image.cen_x,
                    cen_y: image.cen_y,
                    size: image.size,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let emission_height: EmissionHeight = self.emission_height.estimate(&height_points);

        let zenith = event.pointing.zenith_angle();
        let min_entries = self.config.lookup.min_entries;
        let mut images = SelectedImages::new();
        for (id, image) in selected.iter() {
            let distance = core_distance.get(id).copied().unwrap_or(f64::NAN);
            let mut result = ImageResult {
                size: image.size,
                core_distance: distance,
                ..ImageResult::default()
            };
            if self.config.mode == ProcessingMode::Read {
                let telescope_type = self.array.telescope_type(id)?;
                let lookup = |table: &LookupTable| {
                    table.lookup(telescope_type, zenith, image.noise, image.size, distance, min_entries)
                };
                result.width = lookup(&self.tables.width).map(|v| ScaledValue {
                    measured: image.width,
                    expected: v.value,
                    sigma: v.sigma,
                });
                result.length = lookup(&self.tables.length).map(|v| ScaledValue {
                    measured: image.length,
                    expected: v.value,
                    sigma: v.sigma,
                });
                if let Some(v) = lookup(&self.tables.energy) {
                    result.energy = Some(v.value);
                    result.energy_sigma = Some(v.sigma);
                }
            }
            if let Some(disp) = &geometry.disp {
                if let Some(r) = disp.images.iter().find(|r| r.id == id) {
                    result.disp = r.disp;
                    result.disp_energy = r.energy;
                    result.disp_core_distance = r.core_distance;
                }
            }
            images.push(id, result);
        }

        let (scaled, energy) = match self.config.mode {
            ProcessingMode::Read => (
                combine_scaled(&images),
                Some(combine_energy(&images, &self.config.energy_quality)),
            ),
            ProcessingMode::Fill => (ScaledParameters::default(), None),
        };

        let (xoff_derot, yoff_derot) = derotate(geometry.xoff, geometry.yoff, event.field_rotation);
        let disp = geometry.disp.as_ref().map(|d| DispSummary {
            n_contributing: d.n_contributing,
            xoff: d.direction.map(|p| p.0),
            yoff: d.direction.map(|p| p.1),
            disp_diff: d.disp_diff,
            energy: d.energy,
            energy_dispersion: d.energy_dispersion,
        });

        Ok(EventRecord {
            run_number: event.run_number,
            event_number: event.event_number,
            time: event.time,
            pointing: event.pointing,
            trigger: event.trigger.clone(),
            direction: Direction {
                xoff: geometry.xoff,
                yoff: geometry.yoff,
                xoff_derot,
                yoff_derot,
                stds: geometry.stds,
                disp_diff: geometry.disp_diff,
                method: geometry.method,
            },
            xcore: geometry.xcore,
            ycore: geometry.ycore,
            core_distance,
            images,
            scaled,
            energy,
            emission_height,
            disp,
            mc: event.mc,
            mc_core_distance,
            weight,
        })
    }

    /// Fills the tables with the selected images at their true impact
    /// distances.
    fn fill_tables(
        &mut self,
        event: &EventInput,
        selected: &SelectedImages<&ImageParameters>,
        record: &EventRecord,
    ) -> Result<()> {
        let (Some(mc), Some(true_distance)) = (record.mc.as_ref(), record.mc_core_distance.as_ref())
        else {
            return Err(Error::MissingTruth {
                event: event.event_number,
            });
        };
        let zenith = event.pointing.zenith_angle();
        for (id, image) in selected.iter() {
            let telescope_type = self.array.telescope_type(id)?;
            let Some(&distance) = true_distance.get(id) else {
                continue;
            };
            let (size, noise, w) = (image.size, image.noise, record.weight);
            self.tables
                .width
                .fill(telescope_type, zenith, noise, size, distance, image.width, w);
            self.tables
                .length
                .fill(telescope_type, zenith, noise, size, distance, image.length, w);
            self.tables
                .energy
                .fill(telescope_type, zenith, noise, size, distance, mc.energy, w);
        }
        Ok(())
    }
}
