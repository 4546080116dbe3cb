//! Ticket history storage and retrieval.
//!
//! History entries are appended inside the same transaction as the change
//! they describe and are never updated or deleted.

use crate::model::{HistoryEntry, Section};
use rusqlite::{Connection, Result};

/// A history entry waiting to be written (id assigned by the database).
#[derive(Debug, Clone)]
pub struct NewHistory {
    pub ticket_id: i64,
    pub section: Section,
    pub changed_by: String,
    pub prev_status: Option<String>,
    pub new_status: Option<String>,
    pub prev_action: Option<String>,
    pub new_action: Option<String>,
    pub changed_at: i64,
}

impl NewHistory {
    /// Start an entry for a ticket change by `changed_by`.
    #[must_use]
    pub fn new(ticket_id: i64, section: Section, changed_by: &str) -> Self {
        Self {
            ticket_id,
            section,
            changed_by: changed_by.to_string(),
            prev_status: None,
            new_status: None,
            prev_action: None,
            new_action: None,
            changed_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Record the status transition.
    #[must_use]
    pub fn with_status(mut self, prev: Option<String>, new: Option<String>) -> Self {
        self.prev_status = prev;
        self.new_status = new;
        self
    }

    /// Record the action-taken transition.
    #[must_use]
    pub fn with_action(mut self, prev: Option<String>, new: Option<String>) -> Self {
        self.prev_action = prev;
        self.new_action = new;
        self
    }
}

/// Insert a history entry.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_history(conn: &Connection, entry: &NewHistory) -> Result<i64> {
    conn.execute(
        "INSERT INTO ticket_history
            (ticket_id, section, changed_by, prev_status, new_status, prev_action, new_action, changed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            entry.ticket_id,
            entry.section.as_str(),
            entry.changed_by,
            entry.prev_status,
            entry.new_status,
            entry.prev_action,
            entry.new_action,
            entry.changed_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get the history of a ticket, newest first.
///
/// Entries with an unreadable section are skipped.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_history(conn: &Connection, ticket_id: i64) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, ticket_id, section, changed_by, prev_status, new_status, prev_action, new_action, changed_at
         FROM ticket_history
         WHERE ticket_id = ?1
         ORDER BY changed_at DESC, id DESC",
    )?;

    let rows = stmt.query_map([ticket_id], |row| {
        let section: String = row.get(2)?;
        let Ok(section) = section.parse::<Section>() else {
            return Ok(None);
        };
        Ok(Some(HistoryEntry {
            id: row.get(0)?,
            ticket_id: row.get(1)?,
            section,
            changed_by: row.get(3)?,
            prev_status: row.get(4)?,
            new_status: row.get(5)?,
            prev_action: row.get(6)?,
            new_action: row.get(7)?,
            changed_at: row.get(8)?,
        }))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        if let Some(entry) = row? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::apply_schema;

    #[test]
    fn test_history_insert_and_get_newest_first() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let mut first = NewHistory::new(7, Section::Ce, "Anati")
            .with_status(Some("Under Review".into()), Some("Escalated".into()));
        first.changed_at = 1_000;
        let mut second = NewHistory::new(7, Section::Ce, "Mai")
            .with_action(None, Some("called customer".into()));
        second.changed_at = 2_000;

        insert_history(&conn, &first).unwrap();
        insert_history(&conn, &second).unwrap();
        insert_history(&conn, &NewHistory::new(8, Section::Ce, "x")).unwrap();

        let entries = get_history(&conn, 7).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].changed_by, "Mai");
        assert_eq!(entries[1].new_status.as_deref(), Some("Escalated"));
        assert_eq!(entries[1].section, Section::Ce);
    }
}
