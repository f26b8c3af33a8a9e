//! What goes into an orchestration call and what comes out.

use std::path::PathBuf;
use std::time::Duration;

use convertforge_common::paths::extension_of;
use convertforge_common::RequestId;

use crate::error::ConversionError;
use crate::validate::ConvertedFile;

/// A persisted upload waiting to be converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub request_id: RequestId,
    /// Where the upload was persisted.
    pub input_path: PathBuf,
    /// The client's filename, used for the extension and the output name.
    pub original_name: String,
    /// Lowercase with a leading dot, or empty.
    pub input_extension: String,
    /// Lowercase, trimmed.
    pub target_format: String,
}

impl ConversionRequest {
    pub fn new(
        request_id: RequestId,
        input_path: impl Into<PathBuf>,
        original_name: impl Into<String>,
        target_format: &str,
    ) -> Self {
        let original_name = original_name.into();
        Self {
            request_id,
            input_path: input_path.into(),
            input_extension: extension_of(&original_name),
            original_name,
            target_format: target_format.trim().to_lowercase(),
        }
    }
}

/// The terminal result of one orchestration call.
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub request_id: RequestId,
    pub elapsed: Duration,
    pub result: Result<ConvertedFile, ConversionError>,
}

impl ConversionReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn processing_time_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}
