//! Regression-model artifacts.
//!
//! Each artifact is a JSON file holding one tree ensemble for one
//! (target, telescope type) pair. Models are checked against the
//! pipeline feature contract when loaded.

use crate::{Error, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use stereorec_algorithms::{DispModels, DispTarget, TreeEnsemble};
use stereorec_core::{TelescopeArray, TelescopeType};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::reader::MappedFileReader;

/// One model artifact as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub target: DispTarget,
    pub telescope_type: TelescopeType,
    pub model: TreeEnsemble,
}

/// Reads a single artifact.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed, or if the tree
/// structure is invalid.
pub fn read_model<P: AsRef<Path>>(path: P) -> Result<ModelArtifact> {
    let path = path.as_ref();
    let reader = MappedFileReader::open(path)?;
    let artifact: ModelArtifact =
        serde_json::from_slice(reader.as_bytes()).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            line: None,
            source,
        })?;
    artifact.model.validate().map_err(|e| {
        Error::InvalidFormat(format!("{}: {e}", path.display()))
    })?;
    Ok(artifact)
}

/// Loads every `*.json` artifact in `dir` into a model set.
///
/// Files are read in name order.
///
/// # Errors
/// Returns an error for an unreadable directory, entry or artifact,
/// [`stereorec_core::Error::ConfigError`] (wrapped) naming both files when
/// two artifacts hold the same target and type, and
/// [`stereorec_core::Error::FeatureMismatch`] (wrapped) if a model's
/// feature names differ from the pipeline's.
pub fn load_models<P: AsRef<Path>>(dir: P) -> Result<DispModels> {
    let dir = dir.as_ref();
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(Error::file(dir))? {
        let path = entry.map_err(Error::file(dir))?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut models = DispModels::new();
    let mut sources: BTreeMap<(DispTarget, TelescopeType), PathBuf> = BTreeMap::new();
    for path in paths {
        let artifact = read_model(&path)?;
        let key = (artifact.target, artifact.telescope_type);
        if let Some(first) = sources.get(&key) {
            return Err(stereorec_core::Error::ConfigError(format!(
                "{} and {} both hold the {} model for telescope type {}",
                first.display(),
                path.display(),
                key.0,
                key.1
            ))
            .into());
        }
        models.insert(key.0, key.1, Box::new(artifact.model))?;
        sources.insert(key, path);
    }
    info!("loaded {} regression models from {}", models.len(), dir.display());
    Ok(models)
}

/// Logs the array types without a direction model.
///
/// Images of those types are skipped by the disp reconstruction.
pub fn report_missing_models(models: &DispModels, array: &TelescopeArray) -> Vec<TelescopeType> {
    let missing = models.missing_direction_types(array.types());
    for telescope_type in &missing {
        warn!("no disp direction model for telescope type {telescope_type}");
    }
    missing
}
