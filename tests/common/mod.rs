//! Shared test utilities for integration tests.
//!
//! Provides a `TestHarness` that runs the HTTP server on an ephemeral port
//! against a throwaway workspace, with external tools replaced by small shell
//! scripts.

#![allow(dead_code)]

use convertforge::config::Config;
use convertforge::server::{create_router, AppContext};
use convertforge_engine::{Tool, ToolPaths};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Tool script that writes `converted` to its last argument.
pub const WRITES_LAST_ARG: &str = r#"for last; do :; done
printf 'converted' > "$last""#;

pub struct TestHarness {
    pub ctx: AppContext,
    pub addr: SocketAddr,
    pub root: TempDir,
}

impl TestHarness {
    /// Start a server whose tools are the given `(tool, script body)` pairs.
    pub async fn with_tools(tools: &[(Tool, &str)]) -> Self {
        let root = tempfile::tempdir().expect("Failed to create temp dir");
        let bin = root.path().join("bin");
        std::fs::create_dir_all(&bin).expect("Failed to create bin dir");

        let mut paths = ToolPaths::new();
        for (tool, body) in tools {
            paths = paths.with(*tool, write_script(&bin, tool.name(), body));
        }

        let config = test_config(root.path(), paths);
        let ctx = AppContext::from_config(config);
        ctx.prepare().await.expect("Failed to prepare workspace");

        let app = create_router(ctx.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Server error");
        });

        Self { ctx, addr, root }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::new()
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.ctx.config.storage.uploads_dir.clone()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.ctx.config.storage.output_dir.clone()
    }
}

/// Config rooted in `root` with a one-second timeout cap and no kill grace.
pub fn test_config(root: &Path, tools: ToolPaths) -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.storage.uploads_dir = root.join("uploads");
    config.storage.output_dir = root.join("output");
    config.conversion.max_timeout_secs = Some(1);
    config.conversion.kill_grace_secs = 0;
    config.cleanup.input_delay_secs = 0;
    config.cleanup.failure_delay_secs = 0;
    config.tools = tools;
    config
}

/// Write an executable `/bin/sh` script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod script");
    }
    path
}

/// A multipart form with a file part and an optional target.
pub fn convert_form(file_name: &str, content: &[u8], target: Option<&str>) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(content.to_vec()).file_name(file_name.to_string());
    let form = reqwest::multipart::Form::new().part("file", part);
    match target {
        Some(target) => form.text("targetFormat", target.to_string()),
        None => form,
    }
}

/// Poll until `dir` holds no files, or give up after two seconds.
pub async fn wait_until_empty(dir: &Path) -> bool {
    for _ in 0..40 {
        let empty = std::fs::read_dir(dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true);
        if empty {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    false
}
