//! Input file discovery

use csvdb_common::{CsvdbError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A file selected for loading and the table it maps to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetFile {
    pub path: PathBuf,
    /// File name as found in the directory
    pub file_name: String,
    /// File name with the recognized extension stripped, used verbatim as the table name
    pub table_name: String,
}

impl DatasetFile {
    /// Build from a path whose file name ends with `.{extension}`.
    ///
    /// Returns `None` when the name does not carry the extension or is not valid UTF-8.
    pub fn from_path(path: impl Into<PathBuf>, extension: &str) -> Option<Self> {
        let path = path.into();
        let file_name = path.file_name()?.to_str()?.to_string();
        let table_name = file_name
            .strip_suffix(extension)?
            .strip_suffix('.')?
            .to_string();

        Some(Self {
            path,
            file_name,
            table_name,
        })
    }
}

/// List the files in `input_dir` whose name ends with `.{extension}`.
///
/// Only regular files (symlinks are followed) directly inside the directory
/// are returned, sorted by file name. A missing directory is a configuration
/// error; an empty result is not an error.
pub fn discover(input_dir: &Path, extension: &str) -> Result<Vec<DatasetFile>> {
    if !input_dir.is_dir() {
        return Err(CsvdbError::InputDirNotFound(input_dir.to_path_buf()));
    }

    let mut files = Vec::new();

    for entry in std::fs::read_dir(input_dir)? {
        let entry = entry?;
        let path = entry.path();

        let Some(dataset) = DatasetFile::from_path(&path, extension) else {
            if entry.file_name().to_str().is_none() {
                warn!(path = %path.display(), "Skipping file with a non UTF-8 name");
            }
            continue;
        };

        // `Path::is_file` follows symlinks
        if !path.is_file() {
            debug!(path = %path.display(), "Skipping non-file entry");
            continue;
        }

        files.push(dataset);
    }

    files.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    debug!(
        dir = %input_dir.display(),
        count = files.len(),
        "Discovered input files"
    );

    Ok(files)
}
