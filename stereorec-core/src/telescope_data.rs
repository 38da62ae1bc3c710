//! Containers indexed by telescope.
//!
//! [`PerTelescope`] is sized to the full array and holds an optional value
//! for each telescope. [`SelectedImages`] is compact: one entry per image
//! used in the reconstruction, carrying its telescope id explicitly.

use crate::array::TelescopeId;
use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Values for every telescope in the array, `None` where not available.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PerTelescope<T> {
    values: Vec<Option<T>>,
}

impl<T> PerTelescope<T> {
    /// Creates an empty container for `count` telescopes.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            values: std::iter::repeat_with(|| None).take(count).collect(),
        }
    }

    /// Wraps existing per-telescope values.
    #[must_use]
    pub fn from_vec(values: Vec<Option<T>>) -> Self {
        Self { values }
    }

    /// Number of telescopes (array size, not number of present values).
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the container is sized for zero telescopes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of telescopes holding a value.
    #[must_use]
    pub fn count_present(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Value for a telescope.
    #[must_use]
    pub fn get(&self, id: TelescopeId) -> Option<&T> {
        self.values.get(id.index()).and_then(Option::as_ref)
    }

    /// Stores a value for a telescope.
    ///
    /// # Errors
    /// Returns [`Error::TelescopeIndexOutOfRange`] if `id` is outside the array.
    pub fn set(&mut self, id: TelescopeId, value: T) -> Result<()> {
        let count = self.values.len();
        let slot = self
            .values
            .get_mut(id.index())
            .ok_or(Error::TelescopeIndexOutOfRange {
                index: id.index(),
                count,
            })?;
        *slot = Some(value);
        Ok(())
    }

    /// Iterates over telescopes holding a value.
    pub fn iter(&self) -> impl Iterator<Item = (TelescopeId, &T)> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (TelescopeId(i), v)))
    }

    /// Raw slot access in array order.
    #[must_use]
    pub fn as_slice(&self) -> &[Option<T>] {
        &self.values
    }

    /// Checks that the container matches an array of `expected` telescopes.
    ///
    /// # Errors
    /// Returns [`Error::TelescopeCountMismatch`] on a size mismatch.
    pub fn check_len(&self, expected: usize) -> Result<()> {
        if self.values.len() == expected {
            Ok(())
        } else {
            Err(Error::TelescopeCountMismatch {
                expected,
                found: self.values.len(),
            })
        }
    }
}

impl<T> Default for PerTelescope<T> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

/// Compact list of `(telescope, value)` for the images used in an event.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SelectedImages<T> {
    entries: Vec<(TelescopeId, T)>,
}

impl<T> SelectedImages<T> {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends an entry; telescope ids are expected in ascending order.
    pub fn push(&mut self, id: TelescopeId, value: T) {
        debug_assert!(self.entries.last().is_none_or(|(last, _)| *last < id));
        self.entries.push((id, value));
    }

    /// Image multiplicity.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no image is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries.
    pub fn iter(&self) -> impl Iterator<Item = (TelescopeId, &T)> {
        self.entries.iter().map(|(id, v)| (*id, v))
    }

    /// Telescope ids in selection order (the index map back to the array).
    pub fn ids(&self) -> impl Iterator<Item = TelescopeId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    /// Value for a telescope, if it is selected.
    #[must_use]
    pub fn get(&self, id: TelescopeId) -> Option<&T> {
        self.entries
            .binary_search_by_key(&id, |(i, _)| *i)
            .ok()
            .map(|pos| &self.entries[pos].1)
    }

    /// Maps values while keeping the id map.
    pub fn map<U>(&self, mut f: impl FnMut(TelescopeId, &T) -> U) -> SelectedImages<U> {
        SelectedImages {
            entries: self.entries.iter().map(|(id, v)| (*id, f(*id, v))).collect(),
        }
    }
}

impl<T> Default for SelectedImages<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<(TelescopeId, T)> for SelectedImages<T> {
    fn from_iter<I: IntoIterator<Item = (TelescopeId, T)>>(iter: I) -> Self {
        let mut entries: Vec<(TelescopeId, T)> = iter.into_iter().collect();
        entries.sort_by_key(|(id, _)| *id);
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_telescope_sized_to_array() {
        let mut values: PerTelescope<f64> = PerTelescope::new(4);
        assert_eq!(values.len(), 4);
        assert_eq!(values.count_present(), 0);
        values.set(TelescopeId(2), 1.5).unwrap();
        assert_eq!(values.get(TelescopeId(2)), Some(&1.5));
        assert_eq!(values.get(TelescopeId(1)), None);
        assert_eq!(values.count_present(), 1);
        assert!(values.set(TelescopeId(4), 0.0).is_err());
        assert!(values.check_len(4).is_ok());
        assert!(values.check_len(3).is_err());
    }

    #[test]
    fn test_selected_images_keep_id_map() {
        let selected: SelectedImages<&str> =
            vec![(TelescopeId(3), "c"), (TelescopeId(0), "a")].into_iter().collect();
        assert_eq!(selected.len(), 2);
        let ids: Vec<_> = selected.ids().collect();
        assert_eq!(ids, vec![TelescopeId(0), TelescopeId(3)]);
        assert_eq!(selected.get(TelescopeId(3)), Some(&"c"));
        assert_eq!(selected.get(TelescopeId(1)), None);

        let lengths = selected.map(|_, s| s.len());
        assert_eq!(lengths.get(TelescopeId(0)), Some(&1));
    }
}
