//! In-memory spreadsheet backend.
//!
//! Behaves like the hosted API for the operations the adapter uses: ranges
//! are clipped, trailing blanks are dropped on read, and deleting a row
//! shifts the rows below it up. An offline switch turns every call into an
//! `Unavailable` error for outage simulation.

use super::a1;
use super::backend::{CellWrite, SheetBackend};
use crate::error::{Backend, Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Spreadsheet held in memory, keyed by tab name.
#[derive(Debug, Default)]
pub struct MemorySheet {
    tabs: Mutex<HashMap<String, Vec<Vec<String>>>>,
    offline: AtomicBool,
    writes: AtomicUsize,
}

impl MemorySheet {
    /// Create an empty sheet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a tab's content, header row included.
    pub fn set_tab(&self, tab: &str, rows: Vec<Vec<String>>) {
        if let Ok(mut tabs) = self.tabs.lock() {
            tabs.insert(tab.to_string(), rows);
        }
    }

    /// Snapshot a tab's content.
    #[must_use]
    pub fn tab(&self, tab: &str) -> Vec<Vec<String>> {
        self.tabs
            .lock()
            .ok()
            .and_then(|tabs| tabs.get(tab).cloned())
            .unwrap_or_default()
    }

    /// Simulate an outage: every call fails with `Unavailable` while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful write calls (append, write, delete).
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn guard(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<Vec<String>>>>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::unavailable(Backend::Sheet, "sheet offline"));
        }
        self.tabs
            .lock()
            .map_err(|_| Error::Other("sheet lock poisoned".to_string()))
    }

    fn read_sync(&self, range: &str) -> Result<Vec<Vec<String>>> {
        let tabs = self.guard()?;
        let (tab, cells) = a1::split_range(range);
        let Some(grid) = tabs.get(&tab) else {
            return Err(Error::InvalidArgument(format!(
                "Unable to parse range: {range}"
            )));
        };

        let (start, end) = match cells {
            Some(cells) => a1::parse_cells(cells).ok_or_else(|| {
                Error::InvalidArgument(format!("Unable to parse range: {range}"))
            })?,
            None => (
                a1::CellRef { column: None, row: None },
                a1::CellRef { column: None, row: None },
            ),
        };

        let first_row = start.row.unwrap_or(1).max(1);
        let last_row = end.row.unwrap_or(grid.len()).min(grid.len());
        let first_col = start.column.unwrap_or(0);
        let last_col = end.column;

        let mut out: Vec<Vec<String>> = Vec::new();
        for row in grid.iter().take(last_row).skip(first_row - 1) {
            let mut cells: Vec<String> = row
                .iter()
                .enumerate()
                .filter(|(i, _)| *i >= first_col && last_col.is_none_or(|last| *i <= last))
                .map(|(_, cell)| cell.clone())
                .collect();
            while cells.last().is_some_and(String::is_empty) {
                cells.pop();
            }
            out.push(cells);
        }
        while out.last().is_some_and(Vec::is_empty) {
            out.pop();
        }
        Ok(out)
    }

    fn append_sync(&self, tab: &str, row: &[String]) -> Result<()> {
        let mut tabs = self.guard()?;
        let grid = tabs.entry(tab.to_string()).or_default();
        while grid
            .last()
            .is_some_and(|r| r.iter().all(|c| c.trim().is_empty()))
        {
            grid.pop();
        }
        grid.push(row.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write_sync(&self, tab: &str, writes: &[CellWrite]) -> Result<usize> {
        let mut tabs = self.guard()?;
        let grid = tabs.entry(tab.to_string()).or_default();
        for w in writes {
            if w.row == 0 {
                return Err(Error::InvalidArgument("row numbers start at 1".to_string()));
            }
            if grid.len() < w.row {
                grid.resize(w.row, Vec::new());
            }
            let row = &mut grid[w.row - 1];
            if row.len() <= w.column {
                row.resize(w.column + 1, String::new());
            }
            row[w.column].clone_from(&w.value);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(writes.len())
    }

    fn delete_sync(&self, tab: &str, row: usize) -> Result<()> {
        let mut tabs = self.guard()?;
        let grid = tabs.entry(tab.to_string()).or_default();
        if row == 0 || row > grid.len() {
            return Err(Error::InvalidArgument(format!(
                "row {row} out of range for tab {tab}"
            )));
        }
        grid.remove(row - 1);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl SheetBackend for MemorySheet {
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<String>>> {
        self.read_sync(range)
    }

    async fn append_row(&self, tab: &str, row: &[String]) -> Result<()> {
        self.append_sync(tab, row)
    }

    async fn write_cells(&self, tab: &str, writes: &[CellWrite]) -> Result<usize> {
        self.write_sync(tab, writes)
    }

    async fn delete_row(&self, tab: &str, row: usize) -> Result<()> {
        self.delete_sync(tab, row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn test_read_clips_range_and_trims_blanks() {
        let sheet = MemorySheet::new();
        sheet.set_tab(
            "T",
            vec![row(&["h1", "h2", "h3"]), row(&["a", "b", ""]), row(&["", "", ""])],
        );

        let all = sheet.read_range("T!A2:C").await.unwrap();
        assert_eq!(all, vec![row(&["a", "b"])]);

        let col = sheet.read_range("T!B:B").await.unwrap();
        assert_eq!(col, vec![row(&["h2"]), row(&["b"])]);
    }

    #[tokio::test]
    async fn test_delete_shifts_rows_up() {
        let sheet = MemorySheet::new();
        sheet.set_tab("T", vec![row(&["h"]), row(&["1"]), row(&["2"])]);
        sheet.delete_row("T", 2).await.unwrap();
        assert_eq!(sheet.tab("T"), vec![row(&["h"]), row(&["2"])]);
        assert!(sheet.delete_row("T", 9).await.is_err());
    }

    #[tokio::test]
    async fn test_offline_fails_every_call() {
        let sheet = MemorySheet::new();
        sheet.set_tab("T", vec![row(&["h"])]);
        sheet.set_offline(true);
        let err = sheet.read_range("T!A1:A").await.unwrap_err();
        assert_eq!(err.exit_code(), 6);
        assert!(sheet.append_row("T", &row(&["x"])).await.is_err());
        sheet.set_offline(false);
        assert!(sheet.append_row("T", &row(&["x"])).await.is_ok());
        assert_eq!(sheet.write_count(), 1);
    }
}
