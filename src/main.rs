mod cli;

use convertforge::{config, server};
use convertforge_common::RequestId;
use convertforge_engine::{ConversionOrchestrator, ConversionRequest, Workspace};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting Convertforge server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );
    tracing::info!(
        "Uploads: {:?}, output: {:?}",
        config.storage.uploads_dir,
        config.storage.output_dir
    );

    server::start_server(config).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "convertforge=trace,convertforge_engine=trace,convertforge_common=debug,tower_http=debug"
                .to_string()
        } else {
            "convertforge=info,convertforge_engine=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Convert { input, to, output } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert_file(&input, &to, output, cli.config.as_deref()))
        }
        Commands::Formats { json } => list_formats(json),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate { file } => {
            let path = file.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("convertforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn convert_file(
    input: &Path,
    target: &str,
    output: Option<PathBuf>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    if !input.is_file() {
        anyhow::bail!("Input file does not exist: {:?}", input);
    }

    let original_name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let destination =
        output.unwrap_or_else(|| input.with_extension(target.trim().to_lowercase()));
    if destination == input {
        anyhow::bail!("Output would overwrite the input: {:?}", destination);
    }

    // Stage into a private workspace so the cleanup timers never touch the
    // caller's files.
    let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
    let workspace = Workspace::new(scratch.path().join("uploads"), scratch.path().join("output"));
    workspace.ensure().await?;

    let orchestrator = ConversionOrchestrator::new(workspace.clone(), config.engine_settings())
        .with_tools(config.tools.clone());

    let request_id = RequestId::new();
    let staged = workspace.upload_path(request_id, &original_name);
    tokio::fs::copy(input, &staged)
        .await
        .with_context(|| format!("Failed to stage {:?}", input))?;

    tracing::info!("Converting {:?} to {}", input, target);
    let report = orchestrator
        .convert(ConversionRequest::new(
            request_id,
            staged,
            original_name,
            target,
        ))
        .await;

    let elapsed_ms = report.processing_time_ms();
    match report.result {
        Ok(file) => {
            tokio::fs::copy(&file.path, &destination)
                .await
                .with_context(|| format!("Failed to write {:?}", destination))?;
            println!(
                "✓ {} ({} bytes, {} ms)",
                destination.display(),
                file.size,
                elapsed_ms
            );
            Ok(())
        }
        Err(e) => {
            anyhow::bail!(
                "Conversion failed after {} ms [{}]: {}",
                elapsed_ms,
                e.kind(),
                e
            )
        }
    }
}

fn list_formats(json: bool) -> Result<()> {
    let entries = server::routes_system::format_entries();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{:<5} <- {:<40} {} ({}s)",
            entry.target.as_str(),
            entry.sources.join(" "),
            entry.tool,
            entry.timeout_secs
        );
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    println!("Checking external tools...\n");

    let tools = convertforge_engine::check_tools(&config.tools);
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Conversions that need them will fail.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Max upload: {} bytes", config.server.max_upload_bytes);
            println!("  Uploads dir: {:?}", config.storage.uploads_dir);
            println!("  Output dir: {:?}", config.storage.output_dir);
            match config.conversion.max_timeout_secs {
                Some(cap) => println!("  Timeout cap: {}s", cap),
                None => println!("  Timeout cap: none"),
            }
            println!(
                "  Cleanup delays: input {}s, failure {}s, success {}s",
                config.cleanup.input_delay_secs,
                config.cleanup.failure_delay_secs,
                config.cleanup.success_delay_secs
            );
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}
