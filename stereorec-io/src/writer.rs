//! Writers for reconstructed event records and run summaries.

use crate::{Error, Result};
use log::info;
use serde::Serialize;
use stereorec_algorithms::RunSummary;
use stereorec_core::EventRecord;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Written for quantities that were not computed.
pub const MISSING_VALUE: f64 = -9999.0;

/// Written for counts and codes that were not computed.
pub const MISSING_CODE: i32 = -99;

/// Output encoding of an [`EventWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Header plus one flat row per event, sentinels for missing values.
    Csv,
    /// One JSON [`EventRecord`] per line.
    JsonLines,
}

impl OutputFormat {
    /// Chooses the format from the file extension; anything but `.csv`
    /// is JSON lines.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Csv,
            _ => Self::JsonLines,
        }
    }
}

const CSV_HEADER: &str = "run_number,event_number,time,azimuth,elevation,n_images,method,\
xoff,yoff,xoff_derot,yoff_derot,stds,xcore,ycore,mscw,mscl,mwr,mlr,\
energy,energy_chi2,energy_dispersion,energy_n,energy_quality,\
emission_height,emission_height_chi2,emission_height_n_pairs,\
disp_n,disp_energy,mc_energy,mc_xcore,mc_ycore,mc_xoff,mc_yoff,weight";

/// Streaming writer for event records.
pub struct EventWriter {
    writer: BufWriter<File>,
    format: OutputFormat,
    path: PathBuf,
    written: u64,
}

impl EventWriter {
    /// Creates a writer, picking the format from the extension.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        Self::with_format(path, OutputFormat::from_path(path))
    }

    /// Creates a writer with an explicit format.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or the header cannot
    /// be written.
    pub fn with_format<P: AsRef<Path>>(path: P, format: OutputFormat) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(Error::file(path))?;
        let mut writer = BufWriter::new(file);
        if format == OutputFormat::Csv {
            writeln!(writer, "{CSV_HEADER}")?;
        }
        Ok(Self {
            writer,
            format,
            path: path.to_path_buf(),
            written: 0,
        })
    }

    /// Appends one record.
    ///
    /// # Errors
    /// Returns an error if the record cannot be written.
    pub fn write(&mut self, record: &EventRecord) -> Result<()> {
        match self.format {
            OutputFormat::Csv => writeln!(self.writer, "{}", csv_row(record))?,
            OutputFormat::JsonLines => {
                serde_json::to_writer(&mut self.writer, record)
                    .map_err(|e| Error::InvalidFormat(e.to_string()))?;
                self.writer.write_all(b"\n")?;
            }
        }
        self.written += 1;
        Ok(())
    }

    /// Number of records written so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flushes the output.
    ///
    /// # Errors
    /// Returns an error if buffered data cannot be written.
    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush()?;
        info!("wrote {} events to {}", self.written, self.path.display());
        Ok(self.written)
    }
}

fn value(v: Option<f64>) -> f64 {
    v.filter(|x| x.is_finite()).unwrap_or(MISSING_VALUE)
}

fn csv_row(r: &EventRecord) -> String {
    let d = &r.direction;
    let method = match d.method {
        stereorec_core::DirectionMethod::Upstream => 0,
        stereorec_core::DirectionMethod::Intersection => 1,
        stereorec_core::DirectionMethod::Disp => 2,
    };
    let energy = r.energy.as_ref();
    let mc = r.mc.as_ref();
    let disp = r.disp.as_ref();
    let height = &r.emission_height;

    let mut row = format!(
        "{},{},{},{},{},{},{}",
        r.run_number,
        r.event_number,
        r.time,
        r.pointing.azimuth,
        r.pointing.elevation,
        r.n_images(),
        method
    );
    let values = [
        Some(d.xoff),
        Some(d.yoff),
        Some(d.xoff_derot),
        Some(d.yoff_derot),
        d.stds,
        Some(r.xcore),
        Some(r.ycore),
        r.scaled.mscw,
        r.scaled.mscl,
        r.scaled.mwr,
        r.scaled.mlr,
        energy.and_then(|e| e.energy),
        energy.and_then(|e| e.chi2),
        energy.and_then(|e| e.dispersion),
    ];
    for v in values {
        let _ = write!(row, ",{}", value(v));
    }
    let _ = write!(
        row,
        ",{},{}",
        energy.map_or(MISSING_CODE, |e| i32::try_from(e.n_contributing).unwrap_or(i32::MAX)),
        energy.map_or(MISSING_CODE, |e| e.quality.code())
    );
    let _ = write!(
        row,
        ",{},{},{}",
        value(height.mean),
        value(height.chi2),
        height.n_pairs
    );
    let _ = write!(
        row,
        ",{},{}",
        disp.map_or(MISSING_CODE, |s| i32::try_from(s.n_contributing).unwrap_or(i32::MAX)),
        value(disp.and_then(|s| s.energy))
    );
    for v in [
        mc.map(|m| m.energy),
        mc.map(|m| m.xcore),
        mc.map(|m| m.ycore),
        mc.map(|m| m.xoff),
        mc.map(|m| m.yoff),
        Some(r.weight),
    ] {
        let _ = write!(row, ",{}", value(v));
    }
    row
}

/// Writes a run summary as pretty-printed JSON.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_summary<P: AsRef<Path>>(path: P, summary: &RunSummary) -> Result<()> {
    write_json(path.as_ref(), summary)
}

/// Summary path next to an output file: `events.csv` -> `events.summary.json`.
#[must_use]
pub fn summary_path(output: &Path) -> PathBuf {
    output.with_extension("summary.json")
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).map_err(Error::file(path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| Error::InvalidFormat(e.to_string()))?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(OutputFormat::from_path(Path::new("out.csv")), OutputFormat::Csv);
        assert_eq!(OutputFormat::from_path(Path::new("out.CSV")), OutputFormat::Csv);
        assert_eq!(
            OutputFormat::from_path(Path::new("out.jsonl")),
            OutputFormat::JsonLines
        );
    }

    #[test]
    fn test_summary_path() {
        assert_eq!(
            summary_path(Path::new("/tmp/run1.csv")),
            PathBuf::from("/tmp/run1.summary.json")
        );
    }

    #[test]
    fn test_header_column_count() {
        assert_eq!(CSV_HEADER.split(',').count(), 34);
    }
}
