//! stereorec-io: File I/O for stereorec.
//!
//! This crate provides memory-mapped reading of JSON-lines event streams
//! and configuration files, lookup-table and regression-model artifacts,
//! and writers for reconstructed events and run summaries.
//!

mod error;
pub mod model_file;
mod reader;
pub mod table_file;
mod writer;

pub use error::{Error, Result};
pub use model_file::{load_models, read_model, report_missing_models, ModelArtifact};
pub use reader::{load_array_config, EventFileReader, EventIter, MappedFileReader};
pub use table_file::{read_tables, report_missing_types, write_tables, TableFile, TABLE_FORMAT_VERSION};
pub use writer::{
    summary_path, write_summary, EventWriter, OutputFormat, MISSING_CODE, MISSING_VALUE,
};
