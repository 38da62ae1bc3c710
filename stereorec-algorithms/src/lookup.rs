//! Lookup tables for scaled parameters and energy.
//!
//! A table holds, per (telescope type, zenith bin, noise bin) slice, a 2-D
//! profile over (log10 size, log10 core distance) of a target quantity.
//! Filling accumulates weighted sums per bin; reading interpolates the mean
//! and spread bilinearly between bin centers and falls back to the nearest
//! populated slice of the same type when the requested one has no usable
//! bins around the point.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ndarray::Array2;
use stereorec_core::error::{Error, Result};
use stereorec_core::histogram::Axis;
use stereorec_core::{TelescopeArray, TelescopeType};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Quantity stored in a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TableTarget {
    /// Image width (degrees).
    Width,
    /// Image length (degrees).
    Length,
    /// True energy, stored as log10(E / TeV).
    Energy,
}

impl TableTarget {
    /// All targets, in file order.
    pub const ALL: [TableTarget; 3] = [Self::Width, Self::Length, Self::Energy];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Width => "width",
            Self::Length => "length",
            Self::Energy => "energy",
        }
    }

    /// Maps a physical value to the stored representation.
    fn encode(self, value: f64) -> Option<f64> {
        match self {
            Self::Width | Self::Length => value.is_finite().then_some(value),
            Self::Energy => (value > 0.0 && value.is_finite()).then(|| value.log10()),
        }
    }

    /// Maps a stored mean and spread back to physical units.
    fn decode(self, mean: f64, sigma: f64) -> TableValue {
        match self {
            Self::Width | Self::Length => TableValue { value: mean, sigma },
            Self::Energy => {
                let value = 10_f64.powf(mean);
                TableValue {
                    value,
                    sigma: value * std::f64::consts::LN_10 * sigma,
                }
            }
        }
    }
}

impl fmt::Display for TableTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Weighted accumulator of one profile bin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProfileBin {
    pub entries: u64,
    pub sum_w: f64,
    pub sum_wx: f64,
    pub sum_wx2: f64,
}

impl ProfileBin {
    #[inline]
    fn add(&mut self, x: f64, w: f64) {
        self.entries += 1;
        self.sum_w += w;
        self.sum_wx += w * x;
        self.sum_wx2 += w * x * x;
    }

    fn merge(&mut self, other: &ProfileBin) {
        self.entries += other.entries;
        self.sum_w += other.sum_w;
        self.sum_wx += other.sum_wx;
        self.sum_wx2 += other.sum_wx2;
    }

    /// Weighted mean, `None` for an empty bin.
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        (self.entries > 0 && self.sum_w > 0.0).then(|| self.sum_wx / self.sum_w)
    }

    /// Weighted standard deviation, `None` for an empty bin.
    #[must_use]
    pub fn sigma(&self) -> Option<f64> {
        let mean = self.mean()?;
        let variance = self.sum_wx2 / self.sum_w - mean * mean;
        // below this the difference is rounding noise from the sums
        if variance <= 64.0 * f64::EPSILON * mean * mean {
            return Some(0.0);
        }
        Some(variance.sqrt())
    }

    fn is_consistent(&self) -> bool {
        self.sum_w.is_finite()
            && self.sum_wx.is_finite()
            && self.sum_wx2.is_finite()
            && self.sum_w >= 0.0
            && (self.entries > 0 || self.sum_w == 0.0)
    }
}

/// Binning shared by all slices of a table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TableLayout {
    /// log10 of the image size.
    pub size_axis: Axis,
    /// log10 of the core distance (meters).
    pub distance_axis: Axis,
    /// Zenith angles of the slices (degrees), ascending.
    pub zenith_grid: Vec<f64>,
    /// Noise levels of the slices, ascending.
    pub noise_grid: Vec<f64>,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            size_axis: Axis::new(28, 0.0, 7.0),
            distance_axis: Axis::new(33, 0.0, 3.3),
            zenith_grid: vec![0.0, 20.0, 30.0, 35.0, 40.0, 45.0, 50.0, 55.0, 60.0, 65.0],
            noise_grid: vec![2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0, 12.0, 15.0],
        }
    }
}

fn nearest_index(grid: &[f64], value: f64) -> Option<usize> {
    if !value.is_finite() {
        return None;
    }
    let mut best: Option<(usize, f64)> = None;
    for (i, g) in grid.iter().enumerate() {
        let d = (g - value).abs();
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

fn is_ascending(grid: &[f64]) -> bool {
    grid.iter().all(|g| g.is_finite()) && grid.windows(2).all(|w| w[0] < w[1])
}

fn grid_range(grid: &[f64]) -> f64 {
    match (grid.first(), grid.last()) {
        (Some(first), Some(last)) if last > first => last - first,
        _ => 1.0,
    }
}

/// Fractional position of `x` between bin centers, as `(i0, i1, fraction)`.
fn bracket(axis: &Axis, x: f64) -> (usize, usize, f64) {
    let last = axis.bins - 1;
    let u = ((x - axis.min) / axis.width() - 0.5).clamp(0.0, last as f64);
    let i0 = (u.floor() as usize).min(last);
    let i1 = (i0 + 1).min(last);
    (i0, i1, u - i0 as f64)
}

impl TableLayout {
    /// Checks axes and grids.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTable`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if !self.size_axis.is_valid() || !self.distance_axis.is_valid() {
            return Err(Error::InvalidTable("invalid size or distance axis".to_string()));
        }
        if self.zenith_grid.is_empty() || !is_ascending(&self.zenith_grid) {
            return Err(Error::InvalidTable(
                "zenith grid must be non-empty and strictly ascending".to_string(),
            ));
        }
        if self.noise_grid.is_empty() || !is_ascending(&self.noise_grid) {
            return Err(Error::InvalidTable(
                "noise grid must be non-empty and strictly ascending".to_string(),
            ));
        }
        Ok(())
    }

    /// Index of the zenith slice nearest to `zenith`.
    #[must_use]
    pub fn zenith_index(&self, zenith: f64) -> Option<usize> {
        nearest_index(&self.zenith_grid, zenith)
    }

    /// Index of the noise slice nearest to `noise`.
    #[must_use]
    pub fn noise_index(&self, noise: f64) -> Option<usize> {
        nearest_index(&self.noise_grid, noise)
    }

    fn shape(&self) -> (usize, usize) {
        (self.size_axis.bins, self.distance_axis.bins)
    }
}

/// Interpolated table output in physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableValue {
    pub value: f64,
    pub sigma: f64,
}

/// Key of a slice: type, zenith index, noise index.
pub type SliceKey = (TelescopeType, usize, usize);

/// One populated slice, as stored in table files.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TableSlice {
    pub telescope_type: TelescopeType,
    pub zenith_index: usize,
    pub noise_index: usize,
    /// Bins indexed `[size, distance]`.
    pub bins: Array2<ProfileBin>,
}

/// Occupancy of one slice, for coverage reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceCoverage {
    pub telescope_type: TelescopeType,
    pub zenith: f64,
    pub noise: f64,
    pub filled_bins: usize,
    pub entries: u64,
}

/// Lookup table of one target.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "LookupTableRepr", into = "LookupTableRepr")
)]
pub struct LookupTable {
    target: TableTarget,
    layout: TableLayout,
    slices: BTreeMap<SliceKey, Array2<ProfileBin>>,
}

impl LookupTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new(target: TableTarget, layout: TableLayout) -> Self {
        Self {
            target,
            layout,
            slices: BTreeMap::new(),
        }
    }

    /// Rebuilds a table from stored slices, validating every part.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTable`] for an invalid layout, slice indices
    /// outside the grids, mis-shaped or inconsistent bins, or duplicate
    /// slices.
    pub fn from_slices(
        target: TableTarget,
        layout: TableLayout,
        slices: Vec<TableSlice>,
    ) -> Result<Self> {
        layout.validate()?;
        let shape = layout.shape();
        let mut table = Self::new(target, layout);
        for slice in slices {
            let key = (slice.telescope_type, slice.zenith_index, slice.noise_index);
            if slice.zenith_index >= table.layout.zenith_grid.len()
                || slice.noise_index >= table.layout.noise_grid.len()
            {
                return Err(Error::InvalidTable(format!(
                    "{target} slice (type {}, zenith {}, noise {}) outside the grid",
                    key.0, key.1, key.2
                )));
            }
            if slice.bins.dim() != shape {
                return Err(Error::InvalidTable(format!(
                    "{target} slice for type {} has shape {:?}, expected {shape:?}",
                    key.0,
                    slice.bins.dim()
                )));
            }
            if !slice.bins.iter().all(ProfileBin::is_consistent) {
                return Err(Error::InvalidTable(format!(
                    "{target} slice for type {} has corrupt bins",
                    key.0
                )));
            }
            if table.slices.insert(key, slice.bins).is_some() {
                return Err(Error::InvalidTable(format!(
                    "{target} slice (type {}, zenith {}, noise {}) appears twice",
                    key.0, key.1, key.2
                )));
            }
        }
        Ok(table)
    }

    /// Stored slices, ordered by key.
    #[must_use]
    pub fn to_slices(&self) -> Vec<TableSlice> {
        self.slices
            .iter()
            .map(|(&(telescope_type, zenith_index, noise_index), bins)| TableSlice {
                telescope_type,
                zenith_index,
                noise_index,
                bins: bins.clone(),
            })
            .collect()
    }

    #[must_use]
    pub fn target(&self) -> TableTarget {
        self.target
    }

    #[must_use]
    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    /// Number of populated slices.
    #[must_use]
    pub fn slice_count(&self) -> usize {
        self.slices.len()
    }

    /// Telescope types with at least one slice.
    #[must_use]
    pub fn types(&self) -> BTreeSet<TelescopeType> {
        self.slices.keys().map(|k| k.0).collect()
    }

    /// Adds one entry. Returns `false` if the point lies outside the
    /// size/distance axes or the value cannot be stored.
    #[allow(clippy::too_many_arguments)]
    pub fn fill(
        &mut self,
        telescope_type: TelescopeType,
        zenith: f64,
        noise: f64,
        size: f64,
        distance: f64,
        value: f64,
        weight: f64,
    ) -> bool {
        if !(size > 0.0 && distance > 0.0 && weight > 0.0) {
            return false;
        }
        let Some(x) = self.target.encode(value) else {
            return false;
        };
        let (Some(zi), Some(ni)) = (self.layout.zenith_index(zenith), self.layout.noise_index(noise))
        else {
            return false;
        };
        let (Some(si), Some(di)) = (
            self.layout.size_axis.index(size.log10()),
            self.layout.distance_axis.index(distance.log10()),
        ) else {
            return false;
        };
        let shape = self.layout.shape();
        self.slices
            .entry((telescope_type, zi, ni))
            .or_insert_with(|| Array2::default(shape))[[si, di]]
            .add(x, weight);
        true
    }

    /// Interpolates inside one slice.
    fn interpolate(&self, bins: &Array2<ProfileBin>, ls: f64, ld: f64, min_entries: u64) -> Option<(f64, f64)> {
        let (s0, s1, fs) = bracket(&self.layout.size_axis, ls);
        let (d0, d1, fd) = bracket(&self.layout.distance_axis, ld);
        let corners = [
            (s0, d0, (1.0 - fs) * (1.0 - fd)),
            (s1, d0, fs * (1.0 - fd)),
            (s0, d1, (1.0 - fs) * fd),
            (s1, d1, fs * fd),
        ];

        let mut usable = Vec::with_capacity(4);
        for (si, di, c) in corners {
            let bin = &bins[[si, di]];
            if bin.entries == 0 || bin.entries < min_entries {
                continue;
            }
            if let (Some(mean), Some(sigma)) = (bin.mean(), bin.sigma()) {
                usable.push((mean, sigma, c));
            }
        }
        if usable.is_empty() {
            return None;
        }
        let sum_c: f64 = usable.iter().map(|u| u.2).sum();
        if sum_c > 1.0e-12 {
            let mean = usable.iter().map(|u| u.0 * u.2).sum::<f64>() / sum_c;
            let sigma = usable.iter().map(|u| u.1 * u.2).sum::<f64>() / sum_c;
            Some((mean, sigma))
        } else {
            let n = usable.len() as f64;
            Some((
                usable.iter().map(|u| u.0).sum::<f64>() / n,
                usable.iter().map(|u| u.1).sum::<f64>() / n,
            ))
        }
    }

    /// Slices of a type ordered by distance from `(zenith, noise)`.
    ///
    /// Distance is Euclidean in zenith and noise, each normalized by its
    /// grid range; ties go to the lower zenith, then the lower noise index.
    fn slices_by_distance(
        &self,
        telescope_type: TelescopeType,
        zenith: f64,
        noise: f64,
    ) -> Vec<(&SliceKey, &Array2<ProfileBin>)> {
        let z_range = grid_range(&self.layout.zenith_grid);
        let n_range = grid_range(&self.layout.noise_grid);
        let mut candidates: Vec<(f64, &SliceKey, &Array2<ProfileBin>)> = self
            .slices
            .range((telescope_type, 0, 0)..=(telescope_type, usize::MAX, usize::MAX))
            .map(|(key, bins)| {
                let dz = (self.layout.zenith_grid[key.1] - zenith) / z_range;
                let dn = (self.layout.noise_grid[key.2] - noise) / n_range;
                (dz.hypot(dn), key, bins)
            })
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
        candidates.into_iter().map(|(_, key, bins)| (key, bins)).collect()
    }

    /// Expected value and spread at a point.
    ///
    /// Returns `None` if the type has no slice at all, or no slice has
    /// usable bins around the point.
    #[must_use]
    pub fn lookup(
        &self,
        telescope_type: TelescopeType,
        zenith: f64,
        noise: f64,
        size: f64,
        distance: f64,
        min_entries: u64,
    ) -> Option<TableValue> {
        if !(size > 0.0 && distance > 0.0 && zenith.is_finite() && noise.is_finite()) {
            return None;
        }
        let (ls, ld) = (size.log10(), distance.log10());
        self.slices_by_distance(telescope_type, zenith, noise)
            .into_iter()
            .find_map(|(_, bins)| self.interpolate(bins, ls, ld, min_entries))
            .map(|(mean, sigma)| self.target.decode(mean, sigma))
    }

    /// Adds the content of another table with the same target and layout.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTable`] if target or layout differ.
    pub fn merge(&mut self, other: &LookupTable) -> Result<()> {
        if self.target != other.target || self.layout != other.layout {
            return Err(Error::InvalidTable(format!(
                "cannot merge {} table into {} table with a different layout",
                other.target, self.target
            )));
        }
        let shape = self.layout.shape();
        for (key, bins) in &other.slices {
            let target = self.slices.entry(*key).or_insert_with(|| Array2::default(shape));
            ndarray::Zip::from(target).and(bins).for_each(|a, b| a.merge(b));
        }
        Ok(())
    }

    /// Occupancy of every slice.
    #[must_use]
    pub fn coverage(&self) -> Vec<SliceCoverage> {
        self.slices
            .iter()
            .map(|(key, bins)| SliceCoverage {
                telescope_type: key.0,
                zenith: self.layout.zenith_grid[key.1],
                noise: self.layout.noise_grid[key.2],
                filled_bins: bins.iter().filter(|b| b.entries > 0).count(),
                entries: bins.iter().map(|b| b.entries).sum(),
            })
            .collect()
    }
}

/// On-disk shape of a [`LookupTable`].
#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct LookupTableRepr {
    target: TableTarget,
    layout: TableLayout,
    slices: Vec<TableSlice>,
}

#[cfg(feature = "serde")]
impl TryFrom<LookupTableRepr> for LookupTable {
    type Error = Error;

    fn try_from(repr: LookupTableRepr) -> Result<Self> {
        LookupTable::from_slices(repr.target, repr.layout, repr.slices)
    }
}

#[cfg(feature = "serde")]
impl From<LookupTable> for LookupTableRepr {
    fn from(table: LookupTable) -> Self {
        LookupTableRepr {
            slices: table.to_slices(),
            target: table.target,
            layout: table.layout,
        }
    }
}

/// Width, length and energy tables used together.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSet {
    pub width: LookupTable,
    pub length: LookupTable,
    pub energy: LookupTable,
}

impl TableSet {
    /// Empty tables sharing one layout.
    #[must_use]
    pub fn new(layout: &TableLayout) -> Self {
        Self {
            width: LookupTable::new(TableTarget::Width, layout.clone()),
            length: LookupTable::new(TableTarget::Length, layout.clone()),
            energy: LookupTable::new(TableTarget::Energy, layout.clone()),
        }
    }

    /// Assembles a set from one table per target.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTable`] if a target is missing or repeated.
    pub fn from_tables(tables: Vec<LookupTable>) -> Result<Self> {
        let mut by_target: BTreeMap<TableTarget, LookupTable> = BTreeMap::new();
        for table in tables {
            let target = table.target;
            if by_target.insert(target, table).is_some() {
                return Err(Error::InvalidTable(format!("{target} table appears twice")));
            }
        }
        let mut take = |target: TableTarget| {
            by_target
                .remove(&target)
                .ok_or_else(|| Error::InvalidTable(format!("{target} table is missing")))
        };
        Ok(Self {
            width: take(TableTarget::Width)?,
            length: take(TableTarget::Length)?,
            energy: take(TableTarget::Energy)?,
        })
    }

    /// Tables in file order.
    #[must_use]
    pub fn into_tables(self) -> Vec<LookupTable> {
        vec![self.width, self.length, self.energy]
    }

    #[must_use]
    pub fn get(&self, target: TableTarget) -> &LookupTable {
        match target {
            TableTarget::Width => &self.width,
            TableTarget::Length => &self.length,
            TableTarget::Energy => &self.energy,
        }
    }

    /// Merges another set target by target.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTable`] on layout mismatch.
    pub fn merge(&mut self, other: &TableSet) -> Result<()> {
        self.width.merge(&other.width)?;
        self.length.merge(&other.length)?;
        self.energy.merge(&other.energy)
    }

    /// Types present in every table.
    #[must_use]
    pub fn types(&self) -> BTreeSet<TelescopeType> {
        let length = self.length.types();
        let energy = self.energy.types();
        self.width
            .types()
            .into_iter()
            .filter(|t| length.contains(t) && energy.contains(t))
            .collect()
    }

    /// Types of the array without data in at least one table.
    #[must_use]
    pub fn missing_types(&self, array: &TelescopeArray) -> Vec<TelescopeType> {
        let present = self.types();
        array.types().filter(|t| !present.contains(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const T: TelescopeType = TelescopeType(7);

    #[test]
    fn test_nearest_index_prefers_lower_on_tie() {
        let grid = [10.0, 20.0, 30.0];
        assert_eq!(nearest_index(&grid, 15.0), Some(0));
        assert_eq!(nearest_index(&grid, 26.0), Some(2));
        assert_eq!(nearest_index(&grid, 85.0), Some(2));
        assert_eq!(nearest_index(&grid, f64::NAN), None);
    }

    #[test]
    fn test_bracket_clamps_at_edges() {
        let axis = Axis::new(4, 0.0, 4.0);
        assert_eq!(bracket(&axis, -1.0), (0, 1, 0.0));
        let (i0, i1, f) = bracket(&axis, 2.0);
        assert_eq!((i0, i1), (1, 2));
        assert_abs_diff_eq!(f, 0.5);
        assert_eq!(bracket(&axis, 10.0), (3, 3, 0.0));
    }

    #[test]
    fn test_profile_bin_statistics() {
        let mut bin = ProfileBin::default();
        assert!(bin.mean().is_none());
        bin.add(1.0, 1.0);
        bin.add(3.0, 1.0);
        assert_abs_diff_eq!(bin.mean().unwrap(), 2.0);
        assert_abs_diff_eq!(bin.sigma().unwrap(), 1.0);
    }

    #[test]
    fn test_identical_values_have_zero_spread() {
        let mut bin = ProfileBin::default();
        for _ in 0..10 {
            bin.add(0.2, 1.0);
        }
        assert_eq!(bin.sigma(), Some(0.0));
    }

    #[test]
    fn test_fill_outside_axes_is_ignored() {
        let mut table = LookupTable::new(TableTarget::Width, TableLayout::default());
        assert!(!table.fill(T, 20.0, 5.0, 1.0e9, 100.0, 0.1, 1.0));
        assert!(!table.fill(T, 20.0, 5.0, 1000.0, 0.0, 0.1, 1.0));
        assert!(!table.fill(T, 20.0, 5.0, 1000.0, 100.0, f64::NAN, 1.0));
        assert_eq!(table.slice_count(), 0);
        assert!(table.fill(T, 20.0, 5.0, 1000.0, 100.0, 0.1, 1.0));
        assert_eq!(table.slice_count(), 1);
    }

    #[test]
    fn test_interpolation_between_bins() {
        // Two neighbouring distance bins with means 1 and 2.
        let layout = TableLayout::default();
        let mut table = LookupTable::new(TableTarget::Length, layout.clone());
        let axis = layout.distance_axis;
        let d_lo = 10_f64.powf(axis.center(20));
        let d_hi = 10_f64.powf(axis.center(21));
        for _ in 0..10 {
            table.fill(T, 20.0, 5.0, 1.0e4, d_lo, 1.0, 1.0);
            table.fill(T, 20.0, 5.0, 1.0e4, d_hi, 2.0, 1.0);
        }
        let mid = 10_f64.powf(0.5 * (axis.center(20) + axis.center(21)));
        let value = table.lookup(T, 20.0, 5.0, 1.0e4, mid, 5).unwrap();
        assert_abs_diff_eq!(value.value, 1.5, epsilon = 1e-9);
        assert_abs_diff_eq!(value.sigma, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_min_entries_drops_sparse_bins() {
        let mut table = LookupTable::new(TableTarget::Width, TableLayout::default());
        for _ in 0..3 {
            table.fill(T, 20.0, 5.0, 1.0e4, 100.0, 1.0, 1.0);
        }
        assert!(table.lookup(T, 20.0, 5.0, 1.0e4, 100.0, 5).is_none());
        assert!(table.lookup(T, 20.0, 5.0, 1.0e4, 100.0, 1).is_some());
    }

    #[test]
    fn test_fallback_prefers_nearest_slice() {
        let layout = TableLayout::default();
        let mut table = LookupTable::new(TableTarget::Width, layout);
        for _ in 0..10 {
            table.fill(T, 20.0, 5.0, 1.0e4, 100.0, 1.0, 1.0);
            table.fill(T, 60.0, 5.0, 1.0e4, 100.0, 3.0, 1.0);
        }
        let near_low = table.lookup(T, 30.0, 5.0, 1.0e4, 100.0, 5).unwrap();
        assert_abs_diff_eq!(near_low.value, 1.0, epsilon = 1e-12);
        let near_high = table.lookup(T, 55.0, 5.0, 1.0e4, 100.0, 5).unwrap();
        assert_abs_diff_eq!(near_high.value, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_energy_is_stored_in_log() {
        let mut table = LookupTable::new(TableTarget::Energy, TableLayout::default());
        for _ in 0..10 {
            table.fill(T, 20.0, 5.0, 1.0e4, 100.0, 10.0, 1.0);
        }
        let value = table.lookup(T, 20.0, 5.0, 1.0e4, 100.0, 5).unwrap();
        assert_abs_diff_eq!(value.value, 10.0, epsilon = 1e-9);
        assert!(!table.fill(T, 20.0, 5.0, 1.0e4, 100.0, -1.0, 1.0));
    }

    #[test]
    fn test_merge_adds_entries() {
        let layout = TableLayout::default();
        let mut a = LookupTable::new(TableTarget::Width, layout.clone());
        let mut b = LookupTable::new(TableTarget::Width, layout);
        for _ in 0..3 {
            a.fill(T, 20.0, 5.0, 1.0e4, 100.0, 1.0, 1.0);
            b.fill(T, 20.0, 5.0, 1.0e4, 100.0, 1.0, 1.0);
        }
        b.fill(TelescopeType(2), 40.0, 5.0, 1.0e4, 100.0, 1.0, 1.0);
        a.merge(&b).unwrap();
        assert_eq!(a.slice_count(), 2);
        assert!(a.lookup(T, 20.0, 5.0, 1.0e4, 100.0, 6).is_some());

        let other = LookupTable::new(TableTarget::Length, TableLayout::default());
        assert!(a.merge(&other).is_err());
    }

    #[test]
    fn test_from_slices_validation() {
        let layout = TableLayout::default();
        let good = TableSlice {
            telescope_type: T,
            zenith_index: 0,
            noise_index: 0,
            bins: Array2::default((28, 33)),
        };
        assert!(LookupTable::from_slices(TableTarget::Width, layout.clone(), vec![good.clone()]).is_ok());

        let wrong_shape = TableSlice {
            bins: Array2::default((3, 3)),
            ..good.clone()
        };
        assert!(matches!(
            LookupTable::from_slices(TableTarget::Width, layout.clone(), vec![wrong_shape]),
            Err(Error::InvalidTable(_))
        ));

        let outside = TableSlice {
            zenith_index: 99,
            ..good.clone()
        };
        assert!(LookupTable::from_slices(TableTarget::Width, layout.clone(), vec![outside]).is_err());

        assert!(LookupTable::from_slices(TableTarget::Width, layout, vec![good.clone(), good]).is_err());
    }

    #[test]
    fn test_table_set_requires_all_targets() {
        let layout = TableLayout::default();
        let tables = vec![
            LookupTable::new(TableTarget::Width, layout.clone()),
            LookupTable::new(TableTarget::Length, layout),
        ];
        assert!(TableSet::from_tables(tables).is_err());

        let set = TableSet::new(&TableLayout::default());
        let rebuilt = TableSet::from_tables(set.clone().into_tables()).unwrap();
        assert_eq!(rebuilt, set);
    }
}
