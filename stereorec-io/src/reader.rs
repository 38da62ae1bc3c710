//! Memory-mapped readers for event streams and the array configuration.
//!

use crate::{Error, Result};
use log::info;
use memmap2::Mmap;
use serde::Deserialize;
use stereorec_core::{EventInput, Telescope, TelescopeArray};
use std::fs::File;
use std::path::{Path, PathBuf};

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without loading the entire file
/// into memory.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(Error::file(path))?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MmapError(format!("{}: {e}", path.display())))?;
        Ok(Self {
            mmap,
            path: path.to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Path the file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reader for JSON-lines event streams, one [`EventInput`] per line.
pub struct EventFileReader {
    reader: MappedFileReader,
}

impl EventFileReader {
    /// Opens an event stream.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = MappedFileReader::open(path)?;
        info!(
            "opened event stream {} ({} bytes)",
            reader.path().display(),
            reader.len()
        );
        Ok(Self { reader })
    }

    /// Path of the stream.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.reader.path()
    }

    /// Iterates over the events in file order, parsing lazily.
    ///
    /// Blank lines are skipped. A malformed line yields an
    /// [`Error::Parse`] carrying its line number.
    pub fn events(&self) -> EventIter<'_> {
        EventIter {
            data: self.reader.as_bytes(),
            path: self.reader.path(),
            line: 0,
        }
    }
}

/// Iterator over the events of an [`EventFileReader`].
pub struct EventIter<'a> {
    data: &'a [u8],
    path: &'a Path,
    line: usize,
}

impl Iterator for EventIter<'_> {
    type Item = Result<EventInput>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.data.is_empty() {
                return None;
            }
            let end = self
                .data
                .iter()
                .position(|&b| b == b'\n')
                .unwrap_or(self.data.len());
            let line = &self.data[..end];
            self.data = self.data.get(end + 1..).unwrap_or_default();
            self.line += 1;

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Some(serde_json::from_slice(line).map_err(|source| Error::Parse {
                path: self.path.to_path_buf(),
                line: Some(self.line),
                source,
            }));
        }
    }
}

#[derive(Deserialize)]
struct ArrayFile {
    telescopes: Vec<Telescope>,
}

/// Loads the telescope array from a JSON configuration file.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed, or if the array
/// is rejected by [`TelescopeArray::new`].
pub fn load_array_config<P: AsRef<Path>>(path: P) -> Result<TelescopeArray> {
    let path = path.as_ref();
    let reader = MappedFileReader::open(path)?;
    let file: ArrayFile = serde_json::from_slice(reader.as_bytes()).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        line: None,
        source,
    })?;
    let array = TelescopeArray::new(file.telescopes)?;
    info!(
        "loaded {} telescopes of {} types from {}",
        array.len(),
        array.types().count(),
        path.display()
    );
    Ok(array)
}
