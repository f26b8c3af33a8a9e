use convertforge_engine::{CleanupDelays, EngineSettings, SupervisorSettings, ToolPaths};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub conversion: ConversionConfig,

    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Executable overrides keyed by tool name (`pandoc = "/opt/bin/pandoc"`).
    #[serde(default)]
    pub tools: ToolPaths,
}

impl Config {
    /// Engine settings derived from the `[conversion]` and `[cleanup]` sections.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            supervisor: SupervisorSettings {
                capture_limit: self.conversion.max_capture_bytes,
                kill_grace: Duration::from_secs(self.conversion.kill_grace_secs),
                max_timeout: self.conversion.max_timeout_secs.map(Duration::from_secs),
                env: self
                    .conversion
                    .env
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            },
            cleanup: CleanupDelays {
                input: Duration::from_secs(self.cleanup.input_delay_secs),
                failure: Duration::from_secs(self.cleanup.failure_delay_secs),
                success: Duration::from_secs(self.cleanup.success_delay_secs),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body, in bytes (default: 100 MiB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// CORS origins; empty allows any origin
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: default_uploads_dir(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversionConfig {
    /// Trailing bytes of tool stdout/stderr kept per stream (default: 64 KiB)
    #[serde(default = "default_max_capture_bytes")]
    pub max_capture_bytes: usize,

    /// Seconds between SIGTERM and SIGKILL when a tool times out (default: 5)
    #[serde(default = "default_kill_grace")]
    pub kill_grace_secs: u64,

    /// Upper bound on every per-format timeout
    #[serde(default)]
    pub max_timeout_secs: Option<u64>,

    /// Extra environment for tool processes
    #[serde(default = "default_env")]
    pub env: BTreeMap<String, String>,
}

fn default_max_capture_bytes() -> usize {
    64 * 1024
}
fn default_kill_grace() -> u64 {
    5
}
fn default_env() -> BTreeMap<String, String> {
    BTreeMap::from([("DISPLAY".to_string(), ":99".to_string())])
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_capture_bytes: default_max_capture_bytes(),
            kill_grace_secs: default_kill_grace(),
            max_timeout_secs: None,
            env: default_env(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CleanupConfig {
    /// Delay before an uploaded input is removed (default: 5)
    #[serde(default = "default_input_delay")]
    pub input_delay_secs: u64,

    /// Delay before a failed conversion's output is removed (default: 1)
    #[serde(default = "default_failure_delay")]
    pub failure_delay_secs: u64,

    /// Delay before a delivered output is removed (default: 120)
    #[serde(default = "default_success_delay")]
    pub success_delay_secs: u64,

    /// Files older than this are swept from both directories at startup
    /// (default: 3600)
    #[serde(default = "default_sweep_max_age")]
    pub sweep_max_age_secs: u64,
}

fn default_input_delay() -> u64 {
    5
}
fn default_failure_delay() -> u64 {
    1
}
fn default_success_delay() -> u64 {
    120
}
fn default_sweep_max_age() -> u64 {
    3600
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            input_delay_secs: default_input_delay(),
            failure_delay_secs: default_failure_delay(),
            success_delay_secs: default_success_delay(),
            sweep_max_age_secs: default_sweep_max_age(),
        }
    }
}
