//! Raw spreadsheet backend trait.
//!
//! Backends only move cells. Key scanning, encoding and idempotency live in
//! [`super::SheetAdapter`].

use crate::error::Result;
use std::future::Future;

/// A single cell write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellWrite {
    /// Zero-based column index.
    pub column: usize,
    /// One-based row number.
    pub row: usize,
    pub value: String,
}

/// Trait for tabular backends.
///
/// Implemented by [`super::GoogleSheetsBackend`] (HTTP) and
/// [`super::MemorySheet`] (tests, offline runs). Every method may fail with
/// `Unavailable` when the backend cannot be reached or credentials are
/// missing.
pub trait SheetBackend: Send + Sync {
    /// Read a range (`Tab!A2:M`) as rows of cell strings.
    ///
    /// Trailing empty cells and trailing empty rows may be omitted.
    fn read_range(&self, range: &str) -> impl Future<Output = Result<Vec<Vec<String>>>> + Send;

    /// Append one row after the last non-empty row of a tab.
    fn append_row(&self, tab: &str, row: &[String]) -> impl Future<Output = Result<()>> + Send;

    /// Write individual cells of a tab. Returns the number of cells written.
    fn write_cells(
        &self,
        tab: &str,
        writes: &[CellWrite],
    ) -> impl Future<Output = Result<usize>> + Send;

    /// Physically delete one row (one-based) of a tab.
    fn delete_row(&self, tab: &str, row: usize) -> impl Future<Output = Result<()>> + Send;
}
