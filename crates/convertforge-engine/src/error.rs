//! Error types for convertforge-engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, ConversionError>;

/// The six ways a conversion can fail.
///
/// This is what crosses the engine boundary; the transport layer maps it to a
/// response without inspecting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnsupportedConversion,
    ProcessSpawnError,
    ProcessTimeout,
    ProcessNonZeroExit,
    EmptyOutput,
    MissingOutput,
}

impl FailureKind {
    /// Stable snake_case name, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::UnsupportedConversion => "unsupported_conversion",
            FailureKind::ProcessSpawnError => "process_spawn_error",
            FailureKind::ProcessTimeout => "process_timeout",
            FailureKind::ProcessNonZeroExit => "process_non_zero_exit",
            FailureKind::EmptyOutput => "empty_output",
            FailureKind::MissingOutput => "missing_output",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can end a conversion.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConversionError {
    /// The target format is not in the conversion table at all.
    #[error("Unsupported target format: {target}")]
    UnsupportedTarget { target: String },

    /// The target is known but does not accept this source extension.
    #[error("Cannot convert {} to {}", display_extension(.extension), display_target(.target))]
    UnsupportedSource { extension: String, target: String },

    /// The external tool could not be started.
    #[error("Failed to start {tool}: {cause}")]
    Spawn { tool: String, cause: String },

    /// The external tool outlived its budget and was terminated.
    #[error("Conversion timeout after {}ms{}", .budget.as_millis(), with_detail(.detail))]
    Timeout {
        tool: String,
        budget: Duration,
        /// Tail of stderr at the moment the deadline passed.
        detail: String,
    },

    /// The external tool exited unsuccessfully.
    #[error("Conversion failed with code {}: {detail}", describe_exit(.code))]
    NonZeroExit {
        tool: String,
        code: Option<i32>,
        detail: String,
    },

    /// The tool reported success but left a zero-length file.
    #[error("Conversion failed: Output file is empty")]
    EmptyOutput { path: PathBuf },

    /// The tool reported success but no file exists at the expected path.
    #[error("Conversion failed: Output file not created")]
    MissingOutput { path: PathBuf },
}

impl ConversionError {
    /// The failure kind this error belongs to.
    pub fn kind(&self) -> FailureKind {
        match self {
            ConversionError::UnsupportedTarget { .. } | ConversionError::UnsupportedSource { .. } => {
                FailureKind::UnsupportedConversion
            }
            ConversionError::Spawn { .. } => FailureKind::ProcessSpawnError,
            ConversionError::Timeout { .. } => FailureKind::ProcessTimeout,
            ConversionError::NonZeroExit { .. } => FailureKind::ProcessNonZeroExit,
            ConversionError::EmptyOutput { .. } => FailureKind::EmptyOutput,
            ConversionError::MissingOutput { .. } => FailureKind::MissingOutput,
        }
    }

    /// Create an unsupported target error.
    pub fn unsupported_target(target: impl Into<String>) -> Self {
        Self::UnsupportedTarget {
            target: target.into(),
        }
    }

    /// Create an unsupported source error.
    pub fn unsupported_source(extension: impl Into<String>, target: impl Into<String>) -> Self {
        Self::UnsupportedSource {
            extension: extension.into(),
            target: target.into(),
        }
    }
}

fn display_extension(ext: &str) -> &str {
    if ext.is_empty() {
        "files without an extension"
    } else {
        ext
    }
}

/// Document targets are named in capitals, media targets as given.
fn display_target(target: &str) -> String {
    match target {
        "pdf" | "docx" | "txt" => target.to_uppercase(),
        _ => target.to_string(),
    }
}

fn with_detail(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {detail}")
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}
