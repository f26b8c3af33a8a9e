//! The conversion table and format resolution.
//!
//! Every supported conversion is a [`ConversionRule`] reachable from exactly
//! one [`TargetFormat`] through the exhaustive match in
//! [`TargetFormat::rules`]. Adding a conversion means adding a row here and
//! nothing else.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use convertforge_common::paths::normalize_extension;
use serde::{Deserialize, Serialize};

use crate::error::{ConversionError, Result};
use crate::template::TemplateContext;

/// Formats a conversion can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Pdf,
    Docx,
    Txt,
    Png,
    Jpg,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Webp,
    Mp4,
    Avi,
    Mov,
    Mp3,
    Wav,
    Flac,
}

impl TargetFormat {
    /// Every target format, in table order.
    pub const ALL: [TargetFormat; 16] = [
        TargetFormat::Pdf,
        TargetFormat::Docx,
        TargetFormat::Txt,
        TargetFormat::Png,
        TargetFormat::Jpg,
        TargetFormat::Jpeg,
        TargetFormat::Gif,
        TargetFormat::Bmp,
        TargetFormat::Tiff,
        TargetFormat::Webp,
        TargetFormat::Mp4,
        TargetFormat::Avi,
        TargetFormat::Mov,
        TargetFormat::Mp3,
        TargetFormat::Wav,
        TargetFormat::Flac,
    ];

    /// Lowercase name, also used as the output file extension.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetFormat::Pdf => "pdf",
            TargetFormat::Docx => "docx",
            TargetFormat::Txt => "txt",
            TargetFormat::Png => "png",
            TargetFormat::Jpg => "jpg",
            TargetFormat::Jpeg => "jpeg",
            TargetFormat::Gif => "gif",
            TargetFormat::Bmp => "bmp",
            TargetFormat::Tiff => "tiff",
            TargetFormat::Webp => "webp",
            TargetFormat::Mp4 => "mp4",
            TargetFormat::Avi => "avi",
            TargetFormat::Mov => "mov",
            TargetFormat::Mp3 => "mp3",
            TargetFormat::Wav => "wav",
            TargetFormat::Flac => "flac",
        }
    }

    /// The conversion rules that produce this format.
    pub fn rules(self) -> &'static [ConversionRule] {
        match self {
            TargetFormat::Pdf => PDF_RULES,
            TargetFormat::Docx => DOCX_RULES,
            TargetFormat::Txt => TXT_RULES,
            TargetFormat::Png
            | TargetFormat::Jpg
            | TargetFormat::Jpeg
            | TargetFormat::Gif
            | TargetFormat::Bmp
            | TargetFormat::Tiff
            | TargetFormat::Webp => IMAGE_RULES,
            TargetFormat::Mp4 | TargetFormat::Avi | TargetFormat::Mov => VIDEO_RULES,
            TargetFormat::Mp3 | TargetFormat::Wav | TargetFormat::Flac => AUDIO_RULES,
        }
    }
}

impl std::fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetFormat {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().trim_start_matches('.').to_lowercase();
        TargetFormat::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| ConversionError::unsupported_target(s.trim()))
    }
}

/// External programs the table delegates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Wkhtmltopdf,
    Libreoffice,
    Pandoc,
    Pdftotext,
    Magick,
    Ffmpeg,
}

impl Tool {
    /// Every tool referenced by the table.
    pub const ALL: [Tool; 6] = [
        Tool::Wkhtmltopdf,
        Tool::Libreoffice,
        Tool::Pandoc,
        Tool::Pdftotext,
        Tool::Magick,
        Tool::Ffmpeg,
    ];

    /// Executable name looked up on `PATH`.
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Wkhtmltopdf => "wkhtmltopdf",
            Tool::Libreoffice => "libreoffice",
            Tool::Pandoc => "pandoc",
            Tool::Pdftotext => "pdftotext",
            Tool::Magick => "magick",
            Tool::Ffmpeg => "ffmpeg",
        }
    }

    /// Argument that makes the tool print its version.
    pub fn version_arg(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "-version",
            Tool::Pdftotext => "-v",
            _ => "--version",
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a tool leaves its artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactLocation {
    /// The tool writes exactly `{output}`.
    OutputPath,
    /// The tool picks `<outdir>/<input stem>.<target>` itself.
    OutputDir,
}

/// One row of the conversion table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConversionRule {
    /// Accepted source extensions (lowercase, leading dot).
    pub sources: &'static [&'static str],
    pub tool: Tool,
    /// Argument template; see [`TemplateContext::with_paths`].
    pub args: &'static [&'static str],
    pub timeout_secs: u64,
    pub artifact: ArtifactLocation,
}

impl ConversionRule {
    /// Whether this rule accepts the given normalized extension.
    pub fn accepts(&self, extension: &str) -> bool {
        self.sources.contains(&extension)
    }

    /// Timeout budget for one run.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

const DOCUMENT_SOURCES: &[&str] = &[".docx", ".doc", ".odt", ".rtf"];
const IMAGE_SOURCES: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".tiff", ".webp", ".pdf",
];

static PDF_RULES: &[ConversionRule] = &[
    ConversionRule {
        sources: &[".txt", ".html", ".htm"],
        tool: Tool::Wkhtmltopdf,
        args: &[
            "--page-size",
            "A4",
            "--margin-top",
            "0.75in",
            "--margin-right",
            "0.75in",
            "--margin-bottom",
            "0.75in",
            "--margin-left",
            "0.75in",
            "--encoding",
            "UTF-8",
            "--quiet",
            "{input}",
            "{output}",
        ],
        timeout_secs: 180,
        artifact: ArtifactLocation::OutputPath,
    },
    ConversionRule {
        sources: DOCUMENT_SOURCES,
        tool: Tool::Libreoffice,
        args: &[
            "--headless",
            "--convert-to",
            "pdf",
            "--outdir",
            "{outdir}",
            "{input}",
        ],
        timeout_secs: 240,
        artifact: ArtifactLocation::OutputDir,
    },
];

static DOCX_RULES: &[ConversionRule] = &[ConversionRule {
    sources: &[".pdf", ".txt", ".html", ".htm", ".odt", ".rtf"],
    tool: Tool::Pandoc,
    args: &["{input}", "-o", "{output}"],
    timeout_secs: 180,
    artifact: ArtifactLocation::OutputPath,
}];

static TXT_RULES: &[ConversionRule] = &[
    ConversionRule {
        sources: &[".pdf"],
        tool: Tool::Pdftotext,
        args: &["-layout", "{input}", "{output}"],
        timeout_secs: 120,
        artifact: ArtifactLocation::OutputPath,
    },
    ConversionRule {
        sources: DOCUMENT_SOURCES,
        tool: Tool::Pandoc,
        args: &["{input}", "-t", "plain", "-o", "{output}"],
        timeout_secs: 120,
        artifact: ArtifactLocation::OutputPath,
    },
];

static IMAGE_RULES: &[ConversionRule] = &[ConversionRule {
    sources: IMAGE_SOURCES,
    tool: Tool::Magick,
    args: &["{input}", "-quality", "95", "{output}"],
    timeout_secs: 60,
    artifact: ArtifactLocation::OutputPath,
}];

static VIDEO_RULES: &[ConversionRule] = &[ConversionRule {
    sources: &[".mp4", ".avi", ".mov", ".wmv"],
    tool: Tool::Ffmpeg,
    args: &[
        "-i", "{input}", "-c:v", "libx264", "-c:a", "aac", "-y", "{output}",
    ],
    timeout_secs: 300,
    artifact: ArtifactLocation::OutputPath,
}];

static AUDIO_RULES: &[ConversionRule] = &[ConversionRule {
    sources: &[".mp3", ".wav", ".flac", ".aac", ".mp4", ".avi", ".mov"],
    tool: Tool::Ffmpeg,
    args: &["-i", "{input}", "-y", "{output}"],
    timeout_secs: 180,
    artifact: ArtifactLocation::OutputPath,
}];

/// A fully resolved, ready-to-execute tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub tool: Tool,
    /// Program to execute. The bare tool name until overridden.
    pub command: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
    /// Where the tool will leave its artifact.
    pub artifact: PathBuf,
    /// Where the orchestrator expects the final file.
    pub output: PathBuf,
}

/// Look up the table row for a (source extension, target format) pair.
///
/// The extension is normalized first, so `"TXT"`, `"txt"` and `".txt"` are
/// equivalent.
///
/// # Errors
///
/// - [`ConversionError::UnsupportedTarget`] when the target is not in the table.
/// - [`ConversionError::UnsupportedSource`] when the target does not accept the
///   extension.
pub fn lookup(
    input_extension: &str,
    target_format: &str,
) -> Result<(TargetFormat, &'static ConversionRule)> {
    let target: TargetFormat = target_format.parse()?;
    let extension = normalize_extension(input_extension);

    target
        .rules()
        .iter()
        .find(|rule| rule.accepts(&extension))
        .map(|rule| (target, rule))
        .ok_or_else(|| ConversionError::unsupported_source(extension, target.as_str()))
}

/// Resolve a conversion into a [`ConversionJob`] for concrete paths.
///
/// Pure: no filesystem access, no process spawned.
///
/// # Example
///
/// ```
/// use convertforge_engine::formats::{resolve, Tool};
/// use std::path::Path;
/// use std::time::Duration;
///
/// let job = resolve(".mov", "mp4", Path::new("/up/clip.mov"), Path::new("/out/clip.mp4")).unwrap();
/// assert_eq!(job.tool, Tool::Ffmpeg);
/// assert_eq!(job.timeout, Duration::from_secs(300));
/// ```
pub fn resolve(
    input_extension: &str,
    target_format: &str,
    input: &Path,
    output: &Path,
) -> Result<ConversionJob> {
    let (target, rule) = lookup(input_extension, target_format)?;

    let ctx = TemplateContext::new()
        .with_paths(input, output)
        .with_var("target", target.as_str());

    let artifact = match rule.artifact {
        ArtifactLocation::OutputPath => output.to_path_buf(),
        ArtifactLocation::OutputDir => {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "output".to_string());
            let dir = output.parent().unwrap_or_else(|| Path::new("."));
            dir.join(format!("{stem}.{}", target.as_str()))
        }
    };

    Ok(ConversionJob {
        tool: rule.tool,
        command: PathBuf::from(rule.tool.name()),
        args: ctx.substitute_all(rule.args),
        timeout: rule.timeout(),
        artifact,
        output: output.to_path_buf(),
    })
}

/// Every (target, sources) pair in the table, for listings.
pub fn supported_conversions() -> Vec<(TargetFormat, Vec<&'static str>)> {
    TargetFormat::ALL
        .into_iter()
        .map(|target| {
            let sources = target
                .rules()
                .iter()
                .flat_map(|rule| rule.sources.iter().copied())
                .collect();
            (target, sources)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    fn job(ext: &str, target: &str) -> Result<ConversionJob> {
        resolve(
            ext,
            target,
            Path::new("/uploads/req-1-report.in"),
            Path::new("/output/req-1-report.out"),
        )
    }

    #[test]
    fn text_to_pdf_uses_wkhtmltopdf_with_180s_budget() {
        let job = job(".txt", "pdf").unwrap();
        assert_eq!(job.tool, Tool::Wkhtmltopdf);
        assert_eq!(job.command, PathBuf::from("wkhtmltopdf"));
        assert_eq!(job.timeout, Duration::from_secs(180));
        assert_eq!(job.args.last().unwrap(), "/output/req-1-report.out");
        assert!(job.args.contains(&"/uploads/req-1-report.in".to_string()));
        assert_eq!(job.artifact, job.output);
    }

    #[test]
    fn mov_to_mp4_transcodes_with_300s_budget() {
        let job = job(".mov", "mp4").unwrap();
        assert_eq!(job.tool, Tool::Ffmpeg);
        assert_eq!(job.timeout, Duration::from_secs(300));
        assert_eq!(
            job.args,
            vec![
                "-i",
                "/uploads/req-1-report.in",
                "-c:v",
                "libx264",
                "-c:a",
                "aac",
                "-y",
                "/output/req-1-report.out"
            ]
        );
    }

    #[test]
    fn office_to_pdf_writes_into_output_dir() {
        let job = resolve(
            ".docx",
            "pdf",
            Path::new("/uploads/abc-123-letter.docx"),
            Path::new("/output/abc-999-letter.pdf"),
        )
        .unwrap();
        assert_eq!(job.tool, Tool::Libreoffice);
        assert_eq!(job.timeout, Duration::from_secs(240));
        assert_eq!(job.artifact, PathBuf::from("/output/abc-123-letter.pdf"));
        assert_eq!(job.output, PathBuf::from("/output/abc-999-letter.pdf"));
        assert!(job.args.windows(2).any(|w| w == ["--outdir", "/output"]));
    }

    #[test]
    fn extension_and_target_are_case_insensitive() {
        assert!(job("TXT", "PDF").is_ok());
        assert!(job(".Mp3", " wav ").is_ok());
    }

    #[test]
    fn image_targets_share_magick_rule() {
        for target in ["png", "jpg", "jpeg", "gif", "bmp", "tiff", "webp"] {
            let job = job(".pdf", target).unwrap();
            assert_eq!(job.tool, Tool::Magick);
            assert_eq!(job.timeout, Duration::from_secs(60));
        }
    }

    #[test]
    fn txt_target_routes_by_source() {
        assert_eq!(job(".pdf", "txt").unwrap().tool, Tool::Pdftotext);
        assert_eq!(job(".odt", "txt").unwrap().tool, Tool::Pandoc);
    }

    #[test]
    fn unknown_target_is_unsupported() {
        let err = job(".txt", "xyz").unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnsupportedConversion);
        assert_eq!(err.to_string(), "Unsupported target format: xyz");
    }

    #[test]
    fn unknown_source_for_known_target_is_unsupported() {
        let err = job(".mp3", "pdf").unwrap_err();
        assert_eq!(err.kind(), FailureKind::UnsupportedConversion);
        assert_eq!(err.to_string(), "Cannot convert .mp3 to PDF");

        let err = job("", "docx").unwrap_err();
        assert!(matches!(err, ConversionError::UnsupportedSource { .. }));
    }

    #[test]
    fn every_pair_matches_at_most_one_rule() {
        for target in TargetFormat::ALL {
            let rules = target.rules();
            for (i, a) in rules.iter().enumerate() {
                for b in &rules[i + 1..] {
                    for src in a.sources {
                        assert!(
                            !b.accepts(src),
                            "{src} -> {target} matches more than one rule"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn budgets_stay_within_bounds() {
        for target in TargetFormat::ALL {
            for rule in target.rules() {
                assert!((60..=300).contains(&rule.timeout_secs));
                assert!(rule.args.contains(&"{input}"));
            }
        }
    }

    #[test]
    fn target_format_parses_and_displays() {
        assert_eq!("JPEG".parse::<TargetFormat>().unwrap(), TargetFormat::Jpeg);
        assert_eq!(".flac".parse::<TargetFormat>().unwrap(), TargetFormat::Flac);
        assert_eq!(TargetFormat::Webp.to_string(), "webp");
        assert!("".parse::<TargetFormat>().is_err());
    }

    #[test]
    fn supported_conversions_lists_every_target() {
        let table = supported_conversions();
        assert_eq!(table.len(), TargetFormat::ALL.len());
        let (_, pdf_sources) = table
            .iter()
            .find(|(t, _)| *t == TargetFormat::Pdf)
            .unwrap();
        assert!(pdf_sources.contains(&".txt"));
        assert!(pdf_sources.contains(&".docx"));
    }

    #[test]
    fn tool_version_args() {
        assert_eq!(Tool::Ffmpeg.version_arg(), "-version");
        assert_eq!(Tool::Pdftotext.version_arg(), "-v");
        assert_eq!(Tool::Pandoc.version_arg(), "--version");
    }
}
