//! Telescope array model.
//!
//! Static per-run geometry: telescope positions, optics and type tags,
//! plus an index grouping telescopes by type. The array never changes
//! once constructed.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Upper bound on the number of telescopes accepted in one array.
pub const MAX_TELESCOPES: usize = 1024;

/// Index of a telescope in the array model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TelescopeId(pub usize);

impl TelescopeId {
    /// Returns the raw array index.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TelescopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0 + 1)
    }
}

/// Telescope type tag (camera/optics family).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TelescopeType(pub u64);

impl fmt::Display for TelescopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ground position in array-centered coordinates (meters).
///
/// `x` points east, `y` north, `z` up.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    /// Creates a new position.
    #[inline]
    #[must_use]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Static description of one telescope.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Telescope {
    /// Ground position (meters).
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub position: Position,
    /// Focal length (meters).
    pub focal_length: f64,
    /// Camera field of view (degrees, full diameter).
    pub field_of_view: f64,
    /// Type tag.
    pub telescope_type: TelescopeType,
}

impl Telescope {
    /// Creates a telescope description.
    #[must_use]
    pub fn new(
        position: Position,
        focal_length: f64,
        field_of_view: f64,
        telescope_type: TelescopeType,
    ) -> Self {
        Self {
            position,
            focal_length,
            field_of_view,
            telescope_type,
        }
    }
}

/// Immutable array geometry with a type index.
#[derive(Debug, Clone, PartialEq)]
pub struct TelescopeArray {
    telescopes: Vec<Telescope>,
    type_groups: BTreeMap<TelescopeType, Vec<TelescopeId>>,
}

impl TelescopeArray {
    /// Builds the array model and its type index.
    ///
    /// # Errors
    /// Returns an error if the array is empty, exceeds [`MAX_TELESCOPES`],
    /// or a telescope has a non-positive field of view.
    pub fn new(telescopes: Vec<Telescope>) -> Result<Self> {
        if telescopes.is_empty() {
            return Err(Error::ConfigError(
                "telescope array contains no telescopes".to_string(),
            ));
        }
        if telescopes.len() > MAX_TELESCOPES {
            return Err(Error::TooManyTelescopes {
                count: telescopes.len(),
                max: MAX_TELESCOPES,
            });
        }
        if let Some((i, _)) = telescopes
            .iter()
            .enumerate()
            .find(|(_, t)| !(t.field_of_view > 0.0))
        {
            return Err(Error::ConfigError(format!(
                "telescope {} has non-positive field of view",
                TelescopeId(i)
            )));
        }

        let mut type_groups: BTreeMap<TelescopeType, Vec<TelescopeId>> = BTreeMap::new();
        for (i, tel) in telescopes.iter().enumerate() {
            type_groups
                .entry(tel.telescope_type)
                .or_default()
                .push(TelescopeId(i));
        }

        Ok(Self {
            telescopes,
            type_groups,
        })
    }

    /// Number of telescopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.telescopes.len()
    }

    /// Always false for a constructed array.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.telescopes.is_empty()
    }

    /// Returns the telescope description.
    ///
    /// # Errors
    /// Returns [`Error::TelescopeIndexOutOfRange`] for unknown indices.
    pub fn telescope(&self, id: TelescopeId) -> Result<&Telescope> {
        self.telescopes
            .get(id.index())
            .ok_or(Error::TelescopeIndexOutOfRange {
                index: id.index(),
                count: self.telescopes.len(),
            })
    }

    /// Returns the ground position of a telescope.
    ///
    /// # Errors
    /// Returns [`Error::TelescopeIndexOutOfRange`] for unknown indices.
    pub fn position(&self, id: TelescopeId) -> Result<Position> {
        self.telescope(id).map(|t| t.position)
    }

    /// Returns the type tag of a telescope.
    ///
    /// # Errors
    /// Returns [`Error::TelescopeIndexOutOfRange`] for unknown indices.
    pub fn telescope_type(&self, id: TelescopeId) -> Result<TelescopeType> {
        self.telescope(id).map(|t| t.telescope_type)
    }

    /// Returns the field of view (degrees).
    ///
    /// # Errors
    /// Returns [`Error::TelescopeIndexOutOfRange`] for unknown indices.
    pub fn field_of_view(&self, id: TelescopeId) -> Result<f64> {
        self.telescope(id).map(|t| t.field_of_view)
    }

    /// Type tag to ordered telescope list.
    #[must_use]
    pub fn type_groups(&self) -> &BTreeMap<TelescopeType, Vec<TelescopeId>> {
        &self.type_groups
    }

    /// Number of telescopes of a given type (0 if absent).
    #[must_use]
    pub fn type_count(&self, telescope_type: TelescopeType) -> usize {
        self.type_groups.get(&telescope_type).map_or(0, Vec::len)
    }

    /// Distinct telescope types in ascending tag order.
    pub fn types(&self) -> impl Iterator<Item = TelescopeType> + '_ {
        self.type_groups.keys().copied()
    }

    /// Iterates over `(id, telescope)` pairs in array order.
    pub fn iter(&self) -> impl Iterator<Item = (TelescopeId, &Telescope)> {
        self.telescopes
            .iter()
            .enumerate()
            .map(|(i, t)| (TelescopeId(i), t))
    }

    /// Checks that an index is valid.
    ///
    /// # Errors
    /// Returns [`Error::TelescopeIndexOutOfRange`] for unknown indices.
    pub fn check(&self, id: TelescopeId) -> Result<()> {
        self.telescope(id).map(|_| ())
    }
}
