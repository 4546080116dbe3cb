//! Spreadsheet side of the ticket data.
//!
//! [`SheetAdapter`] implements the section-aware operations (pull, append,
//! update-by-key, delete-by-key) on top of any [`SheetBackend`].
//!
//! # Submodules
//!
//! - [`a1`] - A1-notation helpers
//! - [`backend`] - Raw backend trait
//! - [`google`] - Google Sheets v4 REST backend
//! - [`memory`] - In-memory backend

pub mod a1;
pub mod backend;
pub mod google;
pub mod memory;

pub use backend::{CellWrite, SheetBackend};
pub use google::GoogleSheetsBackend;
pub use memory::MemorySheet;

use crate::error::{Error, Result};
use crate::model::{Section, Ticket};
use crate::sync::codec;
use std::collections::HashMap;
use tracing::{debug, info};

/// Section-aware spreadsheet adapter.
#[derive(Debug)]
pub struct SheetAdapter<B> {
    backend: B,
    tabs: HashMap<Section, String>,
}

impl<B: SheetBackend> SheetAdapter<B> {
    /// Wrap a backend using each section's default tab.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            tabs: HashMap::new(),
        }
    }

    /// Override tab names (from configuration).
    #[must_use]
    pub fn with_tabs(mut self, tabs: HashMap<Section, String>) -> Self {
        self.tabs = tabs;
        self
    }

    /// The underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Tab holding a section's rows.
    #[must_use]
    pub fn tab(&self, section: Section) -> &str {
        self.tabs
            .get(&section)
            .map_or(section.config().tab, String::as_str)
    }

    /// Raw rows of a range.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the backend cannot be reached.
    pub async fn read(&self, range: &str) -> Result<Vec<Vec<String>>> {
        self.backend.read_range(range).await
    }

    /// Raw data rows (below the header) of a section's tab.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the backend cannot be reached.
    pub async fn read_section(&self, section: Section) -> Result<Vec<Vec<String>>> {
        let range = a1::range(self.tab(section), section.config().pull_range);
        self.read(&range).await
    }

    /// Pull and decode a section's rows into sheet-origin tickets.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the backend cannot be reached.
    pub async fn pull(&self, section: Section) -> Result<Vec<Ticket>> {
        let rows = self.read_section(section).await?;
        let tickets = codec::decode_rows(section, &rows);
        debug!(section = %section, rows = rows.len(), tickets = tickets.len(), "Pulled sheet rows");
        Ok(tickets)
    }

    /// Append a ticket as a new row. Performs no duplicate check.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the backend cannot be reached.
    pub async fn append(&self, ticket: &Ticket) -> Result<()> {
        let tab = self.tab(ticket.section).to_string();
        self.backend.append_row(&tab, &codec::encode(ticket)).await?;
        info!(section = %ticket.section, tab = %tab, "Appended sheet row");
        Ok(())
    }

    /// Find the first data row whose key cell equals `key` (trimmed).
    ///
    /// Row 1 is the header and is never matched.
    async fn find_row(&self, section: Section, key: &str) -> Result<Option<usize>> {
        let layout = codec::layout(section);
        let range = a1::column_range(self.tab(section), layout.key);
        let column = self.backend.read_range(&range).await?;

        Ok(column
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, cells)| cells.first().is_some_and(|c| c.trim() == key))
            .map(|(i, _)| i + 1))
    }

    /// Update the status and/or action cells of the row holding `key`.
    ///
    /// Only the requested cells are written. When several rows share a key,
    /// only the first one is updated.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the key is blank or nothing was requested,
    /// `KeyNotFound` if no row holds the key, or `Unavailable`.
    pub async fn update_by_key(
        &self,
        section: Section,
        key: &str,
        status: Option<&str>,
        action_taken: Option<&str>,
    ) -> Result<usize> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::Validation("missing business key".to_string()));
        }
        if status.is_none() && action_taken.is_none() {
            return Err(Error::Validation("nothing to update".to_string()));
        }

        let tab = self.tab(section).to_string();
        let row = self
            .find_row(section, key)
            .await?
            .ok_or_else(|| Error::KeyNotFound {
                tab: tab.clone(),
                key: key.to_string(),
            })?;

        let layout = codec::layout(section);
        let mut writes = Vec::with_capacity(2);
        if let Some(status) = status {
            writes.push(CellWrite {
                column: layout.status,
                row,
                value: status.to_string(),
            });
        }
        if let Some(action) = action_taken {
            writes.push(CellWrite {
                column: layout.action,
                row,
                value: action.to_string(),
            });
        }

        let written = self.backend.write_cells(&tab, &writes).await?;
        info!(section = %section, key, row, cells = written, "Updated sheet row");
        Ok(row)
    }

    /// Delete the row holding `key`.
    ///
    /// A missing key is a successful no-op and returns `None`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank key or `Unavailable`.
    pub async fn delete_by_key(&self, section: Section, key: &str) -> Result<Option<usize>> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::Validation("missing business key".to_string()));
        }

        let tab = self.tab(section).to_string();
        let Some(row) = self.find_row(section, key).await? else {
            debug!(section = %section, key, "Sheet delete: key already absent");
            return Ok(None);
        };

        self.backend.delete_row(&tab, row).await?;
        info!(section = %section, key, row, "Deleted sheet row");
        Ok(Some(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| (*s).to_string()).collect()
    }

    fn time_table_row(status: &str, key: &str) -> Vec<String> {
        let mut r = vec![String::new(); 11];
        r[0] = status.to_string();
        r[2] = "Customer".to_string();
        r[10] = key.to_string();
        r
    }

    fn adapter() -> SheetAdapter<MemorySheet> {
        let sheet = MemorySheet::new();
        let mut rows = vec![row(&["Status", "Note"])];
        rows.push(time_table_row("Pending Call", "TT-00041"));
        rows.push(time_table_row("No Answer", "TT-00042"));
        rows.push(time_table_row("Issue", "TT-00042"));
        sheet.set_tab("ThymeTablePlates_Sep2025", rows);
        SheetAdapter::new(sheet)
    }

    #[tokio::test]
    async fn test_pull_decodes_data_rows() {
        let adapter = adapter();
        let tickets = adapter.pull(Section::TimeTable).await.unwrap();
        assert_eq!(tickets.len(), 3);
        assert_eq!(tickets[0].text("caseNumber"), "TT-00041");
        assert!(tickets.iter().all(|t| t.record_id.is_none()));
    }

    #[tokio::test]
    async fn test_update_by_key_writes_only_requested_cells_of_first_match() {
        let adapter = adapter();
        let row_no = adapter
            .update_by_key(Section::TimeTable, " TT-00042 ", Some("Returned"), None)
            .await
            .unwrap();
        assert_eq!(row_no, 3);

        let grid = adapter.backend().tab("ThymeTablePlates_Sep2025");
        assert_eq!(grid[2][0], "Returned");
        assert_eq!(grid[2][1], "");
        assert_eq!(grid[3][0], "Issue");
    }

    #[tokio::test]
    async fn test_update_action_goes_to_note_column() {
        let adapter = adapter();
        adapter
            .update_by_key(Section::TimeTable, "TT-00041", None, Some("called twice"))
            .await
            .unwrap();
        let grid = adapter.backend().tab("ThymeTablePlates_Sep2025");
        assert_eq!(grid[1][1], "called twice");
        assert_eq!(grid[1][0], "Pending Call");
    }

    #[tokio::test]
    async fn test_update_missing_key_is_not_found() {
        let adapter = adapter();
        let err = adapter
            .update_by_key(Section::TimeTable, "TT-99999", Some("Returned"), None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = adapter
            .update_by_key(Section::TimeTable, "TT-00041", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn test_header_is_never_matched() {
        let adapter = adapter();
        let err = adapter
            .update_by_key(Section::TimeTable, "Status", Some("Issue"), None)
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_delete_by_key_is_idempotent() {
        let adapter = adapter();
        let first = adapter.delete_by_key(Section::TimeTable, "TT-00041").await.unwrap();
        let second = adapter.delete_by_key(Section::TimeTable, "TT-00041").await.unwrap();
        assert_eq!(first, Some(2));
        assert_eq!(second, None);
        assert_eq!(adapter.pull(Section::TimeTable).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_append_encodes_with_tab_override() {
        let sheet = MemorySheet::new();
        let adapter = SheetAdapter::new(sheet)
            .with_tabs(HashMap::from([(Section::Cctv, "CCTV_Oct2025".to_string())]));
        let t = Ticket::new(Section::Cctv).with("caseNumber", "CCTV-9");
        adapter.append(&t).await.unwrap();

        let grid = adapter.backend().tab("CCTV_Oct2025");
        assert_eq!(grid.len(), 1);
        assert_eq!(grid[0][0], "Under Review");
        assert_eq!(grid[0][10], "CCTV-9");
    }
}
