//! Lookup-table files.
//!
//! A table file holds the width, length and energy tables of one
//! calibration as JSON. Loading validates every table; a truncated or
//! inconsistent file is a fatal [`stereorec_core::Error::InvalidTable`].

use crate::{Error, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use stereorec_algorithms::{LookupTable, TableSet};
use stereorec_core::{TelescopeArray, TelescopeType};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::reader::MappedFileReader;

/// Current table file format version.
pub const TABLE_FORMAT_VERSION: u32 = 1;

/// On-disk container of a [`TableSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFile {
    pub format_version: u32,
    pub tables: Vec<LookupTable>,
}

/// Reads and validates a table file.
///
/// # Errors
/// Returns [`stereorec_core::Error::InvalidTable`] (wrapped) naming the
/// file if it is unreadable, malformed, of another format version, or
/// does not hold exactly one table per target.
pub fn read_tables<P: AsRef<Path>>(path: P) -> Result<TableSet> {
    let path = path.as_ref();
    let reader = MappedFileReader::open(path)?;
    let invalid = |msg: String| {
        Error::CoreError(stereorec_core::Error::InvalidTable(format!(
            "{}: {msg}",
            path.display()
        )))
    };

    let file: TableFile =
        serde_json::from_slice(reader.as_bytes()).map_err(|e| invalid(e.to_string()))?;
    if file.format_version != TABLE_FORMAT_VERSION {
        return Err(invalid(format!(
            "format version {} (expected {TABLE_FORMAT_VERSION})",
            file.format_version
        )));
    }
    let tables = TableSet::from_tables(file.tables).map_err(|e| invalid(e.to_string()))?;
    info!(
        "loaded lookup tables from {} ({} telescope types)",
        path.display(),
        tables.types().len()
    );
    Ok(tables)
}

/// Writes a table set as a table file.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_tables<P: AsRef<Path>>(path: P, tables: TableSet) -> Result<()> {
    let path = path.as_ref();
    let file = TableFile {
        format_version: TABLE_FORMAT_VERSION,
        tables: tables.into_tables(),
    };
    let mut writer = BufWriter::new(File::create(path).map_err(Error::file(path))?);
    serde_json::to_writer(&mut writer, &file).map_err(|e| Error::InvalidFormat(e.to_string()))?;
    writer.flush()?;
    info!("wrote lookup tables to {}", path.display());
    Ok(())
}

/// Logs and returns the array telescope types without table entries.
///
/// Images of those types get no table values during reading.
pub fn report_missing_types(tables: &TableSet, array: &TelescopeArray) -> Vec<TelescopeType> {
    let missing = tables.missing_types(array);
    for telescope_type in &missing {
        warn!("lookup tables have no entries for telescope type {telescope_type}");
    }
    missing
}
