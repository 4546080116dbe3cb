//! Ticket history (audit) entries.

use crate::model::section::Section;
use serde::{Deserialize, Serialize};

/// Status recorded on the final history entry of a deleted ticket.
pub const DELETED_STATUS: &str = "DELETED";

/// One immutable audit entry produced by a store update or delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    pub ticket_id: i64,
    pub section: Section,
    pub changed_by: String,
    pub prev_status: Option<String>,
    pub new_status: Option<String>,
    pub prev_action: Option<String>,
    pub new_action: Option<String>,
    /// Unix milliseconds.
    pub changed_at: i64,
}

impl HistoryEntry {
    /// True for the tombstone entry written just before a row is removed.
    #[must_use]
    pub fn is_deletion(&self) -> bool {
        self.new_status.as_deref() == Some(DELETED_STATUS)
    }
}
