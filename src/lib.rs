//! Crowd Desk - multi-section ticket tracker
//!
//! This crate provides the core functionality for the `crowd` CLI tool.
//! Tickets live in three places at once: a relational store, a shared
//! spreadsheet, and a local client cache. Sync cycles reconcile them.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Section, Ticket, HistoryEntry)
//! - [`storage`] - SQLite ticket store with audit history
//! - [`sheets`] - Spreadsheet adapter and backends
//! - [`sync`] - Row codec, merge, seeding and the sync cycle
//! - [`config`] - Configuration, paths and permissions
//! - [`validate`] - Status normalization and key suggestions
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod sheets;
pub mod storage;
pub mod sync;
pub mod validate;

pub use error::{Error, Result};

/// Global silent mode flag for `--silent` output.
///
/// When set, mutate commands print only the business key
/// instead of full output.
pub static SILENT: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Check if silent mode is active.
#[inline]
pub fn is_silent() -> bool {
    SILENT.load(std::sync::atomic::Ordering::Relaxed)
}
