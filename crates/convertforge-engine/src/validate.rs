//! Checks on the artifact a tool claims to have produced.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{ConversionError, Result};

/// A produced, non-empty output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConvertedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Validate the file at `path` after a zero exit code.
///
/// # Errors
///
/// - [`ConversionError::MissingOutput`] if nothing (or no regular file) exists.
/// - [`ConversionError::EmptyOutput`] if the file has zero length.
pub async fn validate_output(path: &Path) -> Result<ConvertedFile> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => {
            return Err(ConversionError::MissingOutput {
                path: path.to_path_buf(),
            })
        }
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "cannot stat output");
            }
            return Err(ConversionError::MissingOutput {
                path: path.to_path_buf(),
            });
        }
    };

    if metadata.len() == 0 {
        return Err(ConversionError::EmptyOutput {
            path: path.to_path_buf(),
        });
    }

    Ok(ConvertedFile {
        path: path.to_path_buf(),
        size: metadata.len(),
    })
}
