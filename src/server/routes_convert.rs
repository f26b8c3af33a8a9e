//! `POST /api/convert`: upload, convert, stream the result back.

use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Extension, Router,
};
use convertforge_common::paths::screen_upload_name;
use convertforge_common::RequestId;
use convertforge_engine::workspace::download_name;
use convertforge_engine::{CleanupScheduler, ConversionRequest, TargetFormat};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{info, Instrument};

use crate::server::error::{AppError, Failure};
use crate::server::AppContext;

/// Header carrying the conversion's wall-clock time.
pub const X_PROCESSING_TIME_MS: &str = "x-processing-time-ms";

pub fn convert_routes() -> Router<AppContext> {
    Router::new().route("/convert", post(convert_handler))
}

pub async fn convert_handler(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let fail = |e: AppError| e.with_request_id(request_id);

    let form = read_form(&ctx, request_id, multipart).await.map_err(fail)?;

    let Some(upload) = form.upload else {
        return Err(fail(AppError::bad_request("No file uploaded")));
    };
    let Some(target) = form.target.filter(|t| !t.trim().is_empty()) else {
        return Err(fail(AppError::bad_request("Target format not specified")));
    };

    info!(
        file = %upload.original_name,
        size = upload.size,
        target = %target,
        "conversion request"
    );

    let original_name = upload.original_name.clone();
    let request = ConversionRequest::new(
        request_id,
        upload.disarm(),
        original_name.clone(),
        &target,
    );

    // Run detached so a disconnecting client cannot abort the conversion
    // half-way; the orchestrator schedules cleanup either way.
    let orchestrator = ctx.orchestrator.clone();
    let report = tokio::spawn(async move { orchestrator.convert(request).await }.in_current_span())
        .await
        .map_err(|e| fail(AppError::internal(format!("conversion task failed: {e}"))))?;

    let processing_time_ms = report.processing_time_ms();
    let file = report
        .result
        .map_err(|e| fail(AppError::conversion(e, processing_time_ms)))?;

    let target: TargetFormat = target
        .parse()
        .map_err(|e| fail(AppError::conversion(e, processing_time_ms)))?;

    let handle = tokio::fs::File::open(&file.path).await.map_err(|e| {
        fail(AppError::internal(format!(
            "Failed to send converted file: {e}"
        )))
    })?;

    let filename = attachment_filename(&download_name(&original_name, target));
    let mut response = Body::from_stream(ReaderStream::new(handle)).into_response();

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type(target)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(file.size));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(X_PROCESSING_TIME_MS, HeaderValue::from(processing_time_ms));

    Ok(response)
}

/// The multipart fields the endpoint understands.
struct ConvertForm {
    upload: Option<PendingUpload>,
    target: Option<String>,
}

async fn read_form(
    ctx: &AppContext,
    request_id: RequestId,
    mut multipart: Multipart,
) -> Result<ConvertForm, AppError> {
    let mut form = ConvertForm {
        upload: None,
        target: None,
    };

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") if form.upload.is_none() => {
                let Some(original_name) = field.file_name().map(str::to_string) else {
                    continue;
                };
                if original_name.trim().is_empty() {
                    continue;
                }
                screen_upload_name(&original_name)
                    .map_err(|e| AppError::bad_request(e.to_string()))?;

                let workspace = ctx.orchestrator.workspace();
                let path = workspace.upload_path(request_id, &original_name);
                let mut upload = PendingUpload {
                    path: Some(path.clone()),
                    original_name,
                    size: 0,
                    cleanup: ctx.orchestrator.cleanup().clone(),
                };

                let mut out = tokio::fs::File::create(&path)
                    .await
                    .map_err(|e| AppError::internal(format!("cannot store upload: {e}")))?;
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    out.write_all(&chunk)
                        .await
                        .map_err(|e| AppError::internal(format!("cannot store upload: {e}")))?;
                    upload.size += chunk.len() as u64;
                }
                out.flush()
                    .await
                    .map_err(|e| AppError::internal(format!("cannot store upload: {e}")))?;

                form.upload = Some(upload);
            }
            Some("targetFormat") => {
                let text = field.text().await.map_err(multipart_error)?;
                form.target = Some(text);
            }
            _ => {}
        }
    }

    Ok(form)
}

fn multipart_error(e: MultipartError) -> AppError {
    let message = e.to_string();
    if e.into_response().status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::new(Failure::PayloadTooLarge(message))
    } else {
        AppError::bad_request(message)
    }
}

/// An upload on disk not yet handed to the orchestrator. Removed right away
/// if the request fails before that.
struct PendingUpload {
    path: Option<PathBuf>,
    original_name: String,
    size: u64,
    cleanup: CleanupScheduler,
}

impl PendingUpload {
    /// Give up ownership of the file.
    fn disarm(mut self) -> PathBuf {
        self.path.take().unwrap_or_default()
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            self.cleanup.schedule(path, std::time::Duration::ZERO);
        }
    }
}

/// A `Content-Disposition` filename safe to quote: ASCII printable, no
/// quotes or backslashes.
fn attachment_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn content_type(target: TargetFormat) -> &'static str {
    match target {
        TargetFormat::Pdf => "application/pdf",
        TargetFormat::Docx => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        TargetFormat::Txt => "text/plain; charset=utf-8",
        TargetFormat::Png => "image/png",
        TargetFormat::Jpg | TargetFormat::Jpeg => "image/jpeg",
        TargetFormat::Gif => "image/gif",
        TargetFormat::Bmp => "image/bmp",
        TargetFormat::Tiff => "image/tiff",
        TargetFormat::Webp => "image/webp",
        TargetFormat::Mp4 => "video/mp4",
        TargetFormat::Avi => "video/x-msvideo",
        TargetFormat::Mov => "video/quicktime",
        TargetFormat::Mp3 => "audio/mpeg",
        TargetFormat::Wav => "audio/wav",
        TargetFormat::Flac => "audio/flac",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_filename_is_quotable() {
        assert_eq!(attachment_filename("my report.pdf"), "my report.pdf");
        assert_eq!(attachment_filename("a\"b\\c.txt"), "a_b_c.txt");
        assert_eq!(attachment_filename("résumé.pdf"), "r_sum_.pdf");
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type(TargetFormat::Pdf), "application/pdf");
        assert_eq!(content_type(TargetFormat::Jpeg), "image/jpeg");
    }
}
