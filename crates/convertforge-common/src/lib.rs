//! Convertforge-Common: Shared types and utilities.
//!
//! This crate provides common functionality used across convertforge:
//!
//! - **Typed IDs**: [`RequestId`], the correlation key that namespaces every
//!   file a conversion touches
//! - **Path Utilities**: extension normalization, filename sanitizing, and
//!   upload name screening
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use convertforge_common::{RequestId, Result};
//! use convertforge_common::paths::{normalize_extension, screen_upload_name};
//!
//! let id = RequestId::new();
//! assert!(!id.to_string().is_empty());
//!
//! assert_eq!(normalize_extension("PDF"), ".pdf");
//!
//! fn check(name: &str) -> Result<String> {
//!     screen_upload_name(name)
//! }
//! assert!(check("notes.exe").is_err());
//! ```

pub mod error;
pub mod ids;
pub mod paths;

pub use error::{Error, Result};
pub use ids::*;
