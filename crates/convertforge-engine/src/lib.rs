//! Convertforge-Engine: conversion orchestration.
//!
//! Turns a persisted upload and a target format into a converted file, or a
//! structured failure, by delegating to an external tool:
//!
//! - **Formats**: the static conversion table ([`formats::resolve`])
//! - **Command**: a deadline-supervised process runner ([`ProcessSupervisor`])
//! - **Validate**: checks on the produced artifact ([`validate_output`])
//! - **Cleanup**: deferred, best-effort removal of temporary files
//!   ([`CleanupScheduler`])
//! - **Orchestrator**: the composition of the above ([`ConversionOrchestrator`])
//!
//! # Example
//!
//! ```no_run
//! use convertforge_common::RequestId;
//! use convertforge_engine::{
//!     ConversionOrchestrator, ConversionRequest, EngineSettings, Workspace,
//! };
//!
//! # async fn example() -> std::io::Result<()> {
//! let workspace = Workspace::new("uploads", "output");
//! workspace.ensure().await?;
//! let orchestrator = ConversionOrchestrator::new(workspace.clone(), EngineSettings::default());
//!
//! let id = RequestId::new();
//! let input = workspace.upload_path(id, "report.txt");
//! tokio::fs::write(&input, "hello").await?;
//!
//! let report = orchestrator
//!     .convert(ConversionRequest::new(id, input, "report.txt", "pdf"))
//!     .await;
//! match report.result {
//!     Ok(file) => println!("{} bytes at {}", file.size, file.path.display()),
//!     Err(e) => eprintln!("{} ({})", e, e.kind()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
pub mod command;
pub mod error;
pub mod events;
pub mod formats;
pub mod orchestrator;
pub mod request;
pub mod settings;
pub mod template;
pub mod tools;
pub mod validate;
pub mod workspace;

pub use cleanup::CleanupScheduler;
pub use command::{CapturedOutput, ProcessOutcome, ProcessSupervisor, ToolCommand};
pub use error::{ConversionError, FailureKind, Result};
pub use events::{ConversionEvent, EventBus, EventPayload};
pub use formats::{resolve, ConversionJob, ConversionRule, TargetFormat, Tool};
pub use orchestrator::ConversionOrchestrator;
pub use request::{ConversionReport, ConversionRequest};
pub use settings::{CleanupDelays, EngineSettings, SupervisorSettings};
pub use template::TemplateContext;
pub use tools::{check_tools, ToolInfo, ToolPaths};
pub use validate::{validate_output, ConvertedFile};
pub use workspace::Workspace;
