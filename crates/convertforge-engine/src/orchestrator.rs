//! Composition of resolution, supervision, validation and cleanup.
//!
//! [`ConversionOrchestrator::convert`] is the single entry point. Cleanup is
//! tied to a guard value rather than to each return path, so the input is
//! scheduled for removal however the call ends, including when the future
//! is dropped part-way through.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, info_span, warn, Instrument};

use crate::cleanup::CleanupScheduler;
use crate::command::ProcessSupervisor;
use crate::error::{ConversionError, Result};
use crate::events::{EventBus, EventPayload};
use crate::formats::{self, TargetFormat};
use crate::request::{ConversionReport, ConversionRequest};
use crate::settings::{CleanupDelays, EngineSettings};
use crate::tools::ToolPaths;
use crate::validate::{validate_output, ConvertedFile};
use crate::workspace::Workspace;

/// Runs conversions end to end.
///
/// Holds no per-request state; one instance serves any number of concurrent
/// calls.
#[derive(Debug, Clone)]
pub struct ConversionOrchestrator {
    workspace: Workspace,
    supervisor: ProcessSupervisor,
    cleanup: CleanupScheduler,
    delays: CleanupDelays,
    tools: ToolPaths,
    events: Option<Arc<EventBus>>,
}

impl ConversionOrchestrator {
    pub fn new(workspace: Workspace, settings: EngineSettings) -> Self {
        Self {
            workspace,
            supervisor: ProcessSupervisor::new(settings.supervisor),
            cleanup: CleanupScheduler::new(),
            delays: settings.cleanup,
            tools: ToolPaths::default(),
            events: None,
        }
    }

    /// Use explicit executables instead of `PATH` lookup.
    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }

    /// Publish lifecycle and cleanup events on `events`.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.cleanup = self.cleanup.with_events(Arc::clone(&events));
        self.events = Some(events);
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn cleanup(&self) -> &CleanupScheduler {
        &self.cleanup
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    /// Convert one persisted upload.
    ///
    /// Always returns a report. The input file is scheduled for deletion on
    /// every path; a failed conversion's output is scheduled with the short
    /// failure delay and a successful one with the longer success delay.
    pub async fn convert(&self, request: ConversionRequest) -> ConversionReport {
        let span = info_span!(
            "conversion",
            request_id = %request.request_id,
            target = %request.target_format,
        );
        self.convert_inner(request).instrument(span).await
    }

    async fn convert_inner(&self, request: ConversionRequest) -> ConversionReport {
        let started = Instant::now();
        let mut guard = CleanupGuard::new(
            self.cleanup.clone(),
            self.delays,
            request.input_path.clone(),
        );

        let result = self.run(&request, &mut guard).await;
        let elapsed = started.elapsed();
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(file) => {
                guard.succeeded(&file.path);
                info!(size = file.size, elapsed_ms, "conversion succeeded");
                self.publish(EventPayload::Completed {
                    request_id: request.request_id,
                    size: file.size,
                    elapsed_ms,
                });
            }
            Err(e) => {
                warn!(kind = %e.kind(), error = %e, elapsed_ms, "conversion failed");
                self.publish(EventPayload::Failed {
                    request_id: request.request_id,
                    kind: e.kind(),
                    message: e.to_string(),
                    elapsed_ms,
                });
            }
        }
        drop(guard);

        ConversionReport {
            request_id: request.request_id,
            elapsed,
            result,
        }
    }

    async fn run(
        &self,
        request: &ConversionRequest,
        guard: &mut CleanupGuard,
    ) -> Result<ConvertedFile> {
        let target: TargetFormat = request.target_format.parse()?;
        let output =
            self.workspace
                .output_path(request.request_id, &request.original_name, target);

        let mut job = formats::resolve(
            &request.input_extension,
            target.as_str(),
            &request.input_path,
            &output,
        )?;
        job.command = self.tools.command_for(job.tool);

        guard.track(job.output.clone());
        if job.artifact != job.output {
            guard.track(job.artifact.clone());
        }

        info!(tool = %job.tool, timeout = ?job.timeout, "running conversion tool");
        self.publish(EventPayload::Started {
            request_id: request.request_id,
            tool: job.tool.name().to_string(),
            target: target.as_str().to_string(),
        });

        self.supervisor
            .run(&job)
            .await
            .into_result(job.tool.name())?;

        if job.artifact != job.output {
            relocate(&job.artifact, &job.output).await?;
        }

        validate_output(&job.output).await
    }

    fn publish(&self, payload: EventPayload) {
        if let Some(events) = &self.events {
            events.publish(payload);
        }
    }
}

/// Move an artifact the tool named itself to the expected output path.
async fn relocate(artifact: &Path, output: &Path) -> Result<()> {
    match tokio::fs::rename(artifact, output).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                warn!(
                    artifact = %artifact.display(),
                    output = %output.display(),
                    error = %e,
                    "cannot move artifact into place"
                );
            }
            Err(ConversionError::MissingOutput {
                path: output.to_path_buf(),
            })
        }
    }
}

/// Schedules cleanup for one conversion when dropped.
struct CleanupGuard {
    scheduler: CleanupScheduler,
    delays: CleanupDelays,
    input: PathBuf,
    outputs: Vec<PathBuf>,
}

impl CleanupGuard {
    fn new(scheduler: CleanupScheduler, delays: CleanupDelays, input: PathBuf) -> Self {
        Self {
            scheduler,
            delays,
            input,
            outputs: Vec::new(),
        }
    }

    /// A path the tool may write to.
    fn track(&mut self, path: PathBuf) {
        self.outputs.push(path);
    }

    /// Hand `output` over for delivery; it is removed after the success delay.
    fn succeeded(&mut self, output: &Path) {
        self.scheduler.schedule(output, self.delays.success);
        self.outputs.retain(|path| path != output);
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.scheduler.schedule(&self.input, self.delays.input);
        // Anything not handed over for delivery is a partial or stray file.
        for path in self.outputs.drain(..) {
            self.scheduler.schedule(path, self.delays.failure);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serial_test::serial;
    use crate::error::FailureKind;
    use crate::formats::Tool;
    use crate::settings::SupervisorSettings;
    use convertforge_common::RequestId;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    struct Fixture {
        _root: tempfile::TempDir,
        workspace: Workspace,
        bin: PathBuf,
    }

    impl Fixture {
        async fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let workspace = Workspace::new(root.path().join("uploads"), root.path().join("output"));
            workspace.ensure().await.unwrap();
            let bin = root.path().join("bin");
            std::fs::create_dir(&bin).unwrap();
            Self {
                _root: root,
                workspace,
                bin,
            }
        }

        fn fake_tool(&self, name: &str, body: &str) -> PathBuf {
            let path = self.bin.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn upload(&self, name: &str) -> ConversionRequestBuilder {
            let id = RequestId::new();
            let path = self.workspace.upload_path(id, name);
            std::fs::write(&path, b"input bytes").unwrap();
            ConversionRequestBuilder {
                id,
                path,
                name: name.to_string(),
            }
        }

        fn orchestrator(&self, tools: ToolPaths, delays: CleanupDelays) -> ConversionOrchestrator {
            let settings = EngineSettings {
                supervisor: SupervisorSettings {
                    kill_grace: Duration::from_millis(100),
                    max_timeout: Some(Duration::from_millis(500)),
                    ..Default::default()
                },
                cleanup: delays,
            };
            ConversionOrchestrator::new(self.workspace.clone(), settings).with_tools(tools)
        }

        fn output_files(&self) -> Vec<PathBuf> {
            std::fs::read_dir(self.workspace.output_dir())
                .unwrap()
                .map(|e| e.unwrap().path())
                .collect()
        }
    }

    struct ConversionRequestBuilder {
        id: RequestId,
        path: PathBuf,
        name: String,
    }

    impl ConversionRequestBuilder {
        fn to(self, target: &str) -> ConversionRequest {
            ConversionRequest::new(self.id, self.path, self.name, target)
        }
    }

    fn fast_delays() -> CleanupDelays {
        CleanupDelays {
            input: Duration::from_millis(50),
            failure: Duration::from_millis(50),
            success: Duration::from_secs(60),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    #[tokio::test]
    #[serial(exec)]
    async fn successful_conversion_keeps_output_until_delivery() {
        let fx = Fixture::new().await;
        // wkhtmltopdf-style: last argument is the output path.
        let tool = fx.fake_tool(
            "wkhtmltopdf",
            r#"for last; do :; done; printf '%%PDF-1.4 fake' > "$last""#,
        );
        let orch = fx.orchestrator(ToolPaths::new().with(Tool::Wkhtmltopdf, tool), fast_delays());

        let request = fx.upload("report.txt").to("pdf");
        let input = request.input_path.clone();
        let report = orch.convert(request).await;

        let file = report.result.expect("conversion should succeed");
        assert_eq!(file.size, 13);
        assert!(file.path.to_string_lossy().ends_with("-report.pdf"));

        settle().await;
        assert!(!input.exists(), "input should be cleaned up");
        assert!(file.path.exists(), "output must survive until delivered");
    }

    #[tokio::test]
    #[serial(exec)]
    async fn unsupported_target_spawns_nothing_and_cleans_input() {
        let fx = Fixture::new().await;
        let orch = fx.orchestrator(ToolPaths::new(), fast_delays());

        let request = fx.upload("report.txt").to("xyz");
        let input = request.input_path.clone();
        let report = orch.convert(request).await;

        let err = report.result.unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnsupportedConversion);
        assert_eq!(err.to_string(), "Unsupported target format: xyz");

        settle().await;
        assert!(!input.exists());
        assert!(fx.output_files().is_empty());
    }

    #[tokio::test]
    #[serial(exec)]
    async fn unsupported_source_for_known_target() {
        let fx = Fixture::new().await;
        let orch = fx.orchestrator(ToolPaths::new(), fast_delays());

        let report = orch.convert(fx.upload("song.mp3").to("pdf")).await;
        let err = report.result.unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnsupportedConversion);
        assert_eq!(err.to_string(), "Cannot convert .mp3 to PDF");
    }

    #[tokio::test]
    #[serial(exec)]
    async fn missing_tool_is_spawn_error() {
        let fx = Fixture::new().await;
        let tools = ToolPaths::new().with(Tool::Pandoc, fx.bin.join("not-installed"));
        let orch = fx.orchestrator(tools, fast_delays());

        let report = orch.convert(fx.upload("notes.odt").to("docx")).await;
        assert_eq!(
            report.result.unwrap_err().kind(),
            FailureKind::ProcessSpawnError
        );
    }

    #[tokio::test]
    #[serial(exec)]
    async fn timeout_removes_partial_output() {
        let fx = Fixture::new().await;
        let tool = fx.fake_tool(
            "ffmpeg",
            r#"for last; do :; done; echo partial > "$last"; sleep 10"#,
        );
        let orch = fx.orchestrator(ToolPaths::new().with(Tool::Ffmpeg, tool), fast_delays());

        let start = Instant::now();
        let report = orch.convert(fx.upload("clip.mov").to("mp4")).await;
        assert!(start.elapsed() < Duration::from_secs(5));

        let err = report.result.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ProcessTimeout);
        assert_eq!(err.to_string(), "Conversion timeout after 500ms");

        settle().await;
        assert!(fx.output_files().is_empty());
    }

    #[tokio::test]
    #[serial(exec)]
    async fn non_zero_exit_carries_stderr() {
        let fx = Fixture::new().await;
        let tool = fx.fake_tool("pandoc", "echo 'unknown reader: odt' >&2; exit 64");
        let orch = fx.orchestrator(ToolPaths::new().with(Tool::Pandoc, tool), fast_delays());

        let report = orch.convert(fx.upload("notes.odt").to("docx")).await;
        let err = report.result.unwrap_err();
        assert_eq!(err.kind(), FailureKind::ProcessNonZeroExit);
        assert_eq!(
            err.to_string(),
            "Conversion failed with code 64: unknown reader: odt"
        );
    }

    #[tokio::test]
    #[serial(exec)]
    async fn zero_exit_without_file_is_missing_output() {
        let fx = Fixture::new().await;
        let tool = fx.fake_tool("pdftotext", "exit 0");
        let orch = fx.orchestrator(ToolPaths::new().with(Tool::Pdftotext, tool), fast_delays());

        let report = orch.convert(fx.upload("scan.pdf").to("txt")).await;
        assert_eq!(report.result.unwrap_err().kind(), FailureKind::MissingOutput);
    }

    #[tokio::test]
    #[serial(exec)]
    async fn zero_length_file_is_empty_output() {
        let fx = Fixture::new().await;
        let tool = fx.fake_tool("magick", r#"for last; do :; done; : > "$last""#);
        let orch = fx.orchestrator(ToolPaths::new().with(Tool::Magick, tool), fast_delays());

        let report = orch.convert(fx.upload("photo.png").to("jpg")).await;
        assert_eq!(report.result.unwrap_err().kind(), FailureKind::EmptyOutput);

        settle().await;
        assert!(fx.output_files().is_empty());
    }

    #[tokio::test]
    #[serial(exec)]
    async fn office_artifact_is_moved_into_place() {
        let fx = Fixture::new().await;
        // libreoffice-style: writes <outdir>/<input stem>.pdf itself.
        let tool = fx.fake_tool(
            "libreoffice",
            r#"outdir=""; input=""
while [ $# -gt 0 ]; do
  case "$1" in
    --outdir) outdir="$2"; shift 2 ;;
    --*) shift ;;
    pdf) shift ;;
    *) input="$1"; shift ;;
  esac
done
name=$(basename "$input"); stem="${name%.*}"
printf 'pdf body' > "$outdir/$stem.pdf""#,
        );
        let orch = fx.orchestrator(ToolPaths::new().with(Tool::Libreoffice, tool), fast_delays());

        let report = orch.convert(fx.upload("letter.docx").to("pdf")).await;
        let file = report.result.expect("artifact should be relocated");
        assert!(file.path.to_string_lossy().ends_with("-letter.pdf"));
        assert_eq!(file.size, 8);
        assert_eq!(fx.output_files(), vec![file.path]);
    }

    #[tokio::test]
    #[serial(exec)]
    async fn events_follow_the_conversion() {
        let fx = Fixture::new().await;
        let tool = fx.fake_tool("pandoc", "exit 1");
        let events = Arc::new(EventBus::new(16));
        let mut rx = events.subscribe();
        let orch = fx
            .orchestrator(ToolPaths::new().with(Tool::Pandoc, tool), fast_delays())
            .with_events(events);

        let request = fx.upload("notes.rtf").to("docx");
        let id = request.request_id;
        orch.convert(request).await;

        match rx.try_recv().unwrap().payload {
            EventPayload::Started { request_id, tool, .. } => {
                assert_eq!(request_id, id);
                assert_eq!(tool, "pandoc");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
        match rx.try_recv().unwrap().payload {
            EventPayload::Failed { kind, .. } => {
                assert_eq!(kind, FailureKind::ProcessNonZeroExit)
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    #[serial(exec)]
    async fn dropped_conversion_still_cleans_up() {
        let fx = Fixture::new().await;
        let tool = fx.fake_tool("ffmpeg", "sleep 10");
        let orch = fx.orchestrator(ToolPaths::new().with(Tool::Ffmpeg, tool), fast_delays());

        let request = fx.upload("clip.avi").to("mp4");
        let input = request.input_path.clone();
        let _ = tokio::time::timeout(Duration::from_millis(100), orch.convert(request)).await;

        settle().await;
        assert!(!input.exists());
    }
}
