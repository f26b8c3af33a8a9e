//! External tool detection and path overrides.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::formats::Tool;

/// Information about an external tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// First line of the version output, if available.
    pub version: Option<String>,
    /// Path to the tool executable.
    pub path: Option<PathBuf>,
}

/// Per-tool executable overrides. Tools without one run by bare name
/// through `PATH`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolPaths(HashMap<Tool, PathBuf>);

impl ToolPaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the executable used for `tool`.
    pub fn with(mut self, tool: Tool, path: impl Into<PathBuf>) -> Self {
        self.0.insert(tool, path.into());
        self
    }

    pub fn get(&self, tool: Tool) -> Option<&Path> {
        self.0.get(&tool).map(PathBuf::as_path)
    }

    /// The program to execute for `tool`.
    pub fn command_for(&self, tool: Tool) -> PathBuf {
        self.get(tool)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(tool.name()))
    }
}

/// Check if a program is available using the given version argument.
///
/// # Example
///
/// ```no_run
/// use convertforge_engine::tools::check_tool;
/// use std::path::Path;
///
/// let info = check_tool(Path::new("pandoc"), "--version");
/// if info.available {
///     println!("pandoc version: {:?}", info.version);
/// }
/// ```
pub fn check_tool(program: &Path, version_arg: &str) -> ToolInfo {
    let name = program
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.display().to_string());

    let result = Command::new(program)
        .arg(version_arg)
        .stdin(Stdio::null())
        .output();

    match result {
        Ok(output) if output.status.success() => {
            // pdftotext prints its version on stderr.
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let version = stdout
                .lines()
                .chain(stderr.lines())
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string);

            ToolInfo {
                name,
                available: true,
                version,
                path: which::which(program).ok(),
            }
        }
        _ => ToolInfo {
            name,
            available: false,
            version: None,
            path: None,
        },
    }
}

/// Check every tool the conversion table uses.
pub fn check_tools(paths: &ToolPaths) -> Vec<ToolInfo> {
    Tool::ALL
        .iter()
        .map(|tool| {
            let mut info = check_tool(&paths.command_for(*tool), tool.version_arg());
            info.name = tool.name().to_string();
            info
        })
        .collect()
}
