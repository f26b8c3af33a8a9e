mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./config.toml",
        "./convertforge.toml",
        "~/.config/convertforge/config.toml",
        "/etc/convertforge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.server.max_upload_bytes == 0 {
        anyhow::bail!("server.max_upload_bytes cannot be 0");
    }

    if config.storage.uploads_dir.as_os_str().is_empty() {
        anyhow::bail!("storage.uploads_dir cannot be empty");
    }
    if config.storage.output_dir.as_os_str().is_empty() {
        anyhow::bail!("storage.output_dir cannot be empty");
    }

    if config.conversion.max_timeout_secs == Some(0) {
        anyhow::bail!("conversion.max_timeout_secs cannot be 0");
    }

    if config.conversion.max_capture_bytes == 0 {
        tracing::warn!("conversion.max_capture_bytes is 0; tool output will not be reported");
    }

    if config.storage.uploads_dir == config.storage.output_dir {
        tracing::warn!(
            "Uploads and output share {:?}; the startup sweep covers both",
            config.storage.uploads_dir
        );
    }

    for origin in &config.server.allowed_origins {
        if origin.parse::<axum::http::HeaderValue>().is_err() {
            anyhow::bail!("Invalid CORS origin: {:?}", origin);
        }
    }

    Ok(())
}
