//! Path checks done before any output is written.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use failure::Fail;

#[derive(Debug, Fail)]
pub enum PathError {
    #[fail(display = "input file {:?} does not appear to exist", path)]
    MissingInput { path: PathBuf },
    #[fail(display = "{:?} is not a valid directory", path)]
    NotADirectory { path: PathBuf },
    #[fail(display = "output path {:?} is not a valid path", path)]
    Uncreatable {
        path: PathBuf,
        #[cause]
        source: io::Error,
    },
}

pub fn check_input_path(path: &Path) -> Result<&Path, PathError> {
    if !path.is_file() {
        return Err(PathError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    Ok(path)
}

pub fn check_input_dir(path: &Path) -> Result<&Path, PathError> {
    if !path.is_dir() {
        return Err(PathError::NotADirectory {
            path: path.to_path_buf(),
        });
    }
    Ok(path)
}

/// Creates `path` and its parents if missing.
pub fn ensure_output_dir(path: &Path) -> Result<&Path, PathError> {
    fs::create_dir_all(path).map_err(|source| PathError::Uncreatable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(path)
}

/// Creates the parent directory of an output file.
pub fn ensure_output_parent(path: &Path) -> Result<&Path, PathError> {
    if path.file_name().is_none() {
        return Err(PathError::Uncreatable {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "no file name"),
        });
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            ensure_output_dir(parent).map_err(|e| match e {
                PathError::Uncreatable { source, .. } => PathError::Uncreatable {
                    path: path.to_path_buf(),
                    source,
                },
                other => other,
            })?;
        }
        _ => {}
    }
    Ok(path)
}
