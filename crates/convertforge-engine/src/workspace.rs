//! Uploads and output directories, and the request-scoped names inside them.

use std::path::{Path, PathBuf};

use chrono::Utc;
use convertforge_common::paths::{sanitize_filename, stem_of};
use convertforge_common::RequestId;
use rand::Rng;

use crate::formats::TargetFormat;

/// The two directories a conversion touches.
///
/// Every generated name starts with the request id and a millisecond
/// timestamp, so concurrent requests never share a path.
#[derive(Debug, Clone)]
pub struct Workspace {
    uploads_dir: PathBuf,
    output_dir: PathBuf,
}

impl Workspace {
    pub fn new(uploads_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Create both directories if they do not exist.
    pub async fn ensure(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.uploads_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;
        Ok(())
    }

    /// `<uploads>/<id>-<millis>-<rand>-<sanitized name>`
    pub fn upload_path(&self, request_id: RequestId, original_name: &str) -> PathBuf {
        self.uploads_dir.join(format!(
            "{}-{}-{}-{}",
            request_id,
            Utc::now().timestamp_millis(),
            random_suffix(),
            sanitize_filename(original_name)
        ))
    }

    /// `<output>/<id>-<millis>-<rand>-<stem>.<target>`
    ///
    /// Request ids can come from the client, so the random part is what keeps
    /// two requests reusing one id apart.
    pub fn output_path(
        &self,
        request_id: RequestId,
        original_name: &str,
        target: TargetFormat,
    ) -> PathBuf {
        let stem = sanitize_filename(&stem_of(original_name));
        self.output_dir.join(format!(
            "{}-{}-{}-{}.{}",
            request_id,
            Utc::now().timestamp_millis(),
            random_suffix(),
            stem,
            target.as_str()
        ))
    }
}

fn random_suffix() -> u32 {
    rand::thread_rng().gen_range(0..1_000_000_000)
}

/// The filename offered to the client for a converted file.
///
/// # Examples
///
/// ```
/// use convertforge_engine::workspace::download_name;
/// use convertforge_engine::TargetFormat;
///
/// assert_eq!(download_name("Quarterly Report.docx", TargetFormat::Pdf), "Quarterly Report.pdf");
/// ```
pub fn download_name(original_name: &str, target: TargetFormat) -> String {
    format!("{}.{}", stem_of(original_name), target.as_str())
}
