//! Convertforge - file conversion service
//!
//! This library crate exposes the configuration and HTTP layer for
//! integration testing. The conversion core lives in `convertforge-engine`.

pub mod config;
pub mod server;
