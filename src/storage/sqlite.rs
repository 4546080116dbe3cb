//! SQLite storage implementation.
//!
//! This module provides the ticket store backed by SQLite. It follows the
//! MutationContext pattern for transaction discipline and audit logging:
//! every write runs in an IMMEDIATE transaction and its history entries are
//! committed together with it.

use crate::error::{Error, Result};
use crate::model::{FieldValue, HistoryEntry, Section, Ticket, DELETED_STATUS};
use crate::storage::history::{get_history, insert_history, NewHistory};
use crate::storage::schema::apply_schema;
use crate::storage::TicketStore;
use crate::sync::codec;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Identity allowed to delete tickets when none is configured.
pub const DEFAULT_DELETER: &str = "Anati";

/// SQLite-based ticket store.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
    deleter: String,
}

/// Context for a mutation operation, tracking side effects.
///
/// Passed to mutation closures to collect history entries that are written
/// just before the transaction commits.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation.
    pub actor: String,
    /// History entries to write at the end of the transaction.
    pub history: Vec<NewHistory>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            history: Vec::new(),
        }
    }

    /// Queue a history entry for this operation.
    pub fn record(&mut self, entry: NewHistory) {
        self.history.push(entry);
    }
}

/// A ticket row as stored.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTicket {
    pub id: i64,
    pub section: Section,
    pub status: String,
    /// Opaque JSON document; always an object.
    pub payload: serde_json::Value,
    pub created_by: Option<String>,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Unix milliseconds.
    pub updated_at: i64,
}

/// Payload keys that describe the record itself rather than a field.
const RESERVED_PAYLOAD_KEYS: &[&str] = &[
    "_id",
    "recordId",
    "section",
    "status",
    "createdAt",
    "lastModified",
    "originTag",
];

fn millis_to_rfc3339(ms: i64) -> Option<String> {
    chrono::DateTime::from_timestamp_millis(ms).map(|dt| dt.to_rfc3339())
}

impl StoredTicket {
    /// Map a store row to a store-origin ticket.
    ///
    /// Payload fields are spread into the record. Status comes from the row,
    /// then the payload, then the section default. The case number falls
    /// back to the order number, and for cctv to `CCTV-{id}`.
    #[must_use]
    pub fn into_ticket(self) -> Ticket {
        let mut ticket = Ticket::new(self.section);
        let mut payload_status = None;

        if let serde_json::Value::Object(map) = self.payload {
            for (key, value) in map {
                if key == "status" {
                    payload_status = value.as_str().map(str::to_string);
                } else if !RESERVED_PAYLOAD_KEYS.contains(&key.as_str()) {
                    ticket.fields.insert(key, FieldValue::from_json(value));
                }
            }
        }

        ticket.status = [Some(self.status), payload_status]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.section.default_status().to_string());

        let case_number = ticket
            .non_blank("caseNumber")
            .or_else(|| ticket.non_blank("orderNumber"))
            .unwrap_or_else(|| match self.section {
                Section::Cctv => format!("CCTV-{}", self.id),
                _ => String::new(),
            });
        ticket.set("caseNumber", case_number);

        ticket.record_id = Some(self.id);
        ticket.created_at = millis_to_rfc3339(self.created_at);
        ticket.last_modified = millis_to_rfc3339(self.updated_at);
        ticket
    }
}

impl FromSql for Section {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: Error| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for Section {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

const TICKET_COLUMNS: &str = "id, section, status, payload, created_by, created_at, updated_at";

fn map_ticket_row(row: &Row<'_>) -> rusqlite::Result<StoredTicket> {
    let payload: String = row.get(3)?;
    let payload = serde_json::from_str(&payload)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(StoredTicket {
        id: row.get(0)?,
        section: row.get(1)?,
        status: row.get(2)?,
        payload,
        created_by: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Status, action and section of a ticket before a change.
struct Snapshot {
    section: Section,
    status: String,
    action: Option<String>,
}

fn snapshot(tx: &Transaction<'_>, id: i64) -> Result<Snapshot> {
    tx.query_row(
        "SELECT section, status, CAST(json_extract(payload, '$.actionTaken') AS TEXT)
         FROM tickets WHERE id = ?1",
        [id],
        |row| {
            Ok(Snapshot {
                section: row.get(0)?,
                status: row.get(1)?,
                action: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| Error::TicketNotFound { id: id.to_string() })
}

/// Parse a user-supplied ticket id.
///
/// # Errors
///
/// Returns `InvalidArgument` unless the input is a positive integer.
pub fn parse_ticket_id(input: &str) -> Result<i64> {
    match input.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(Error::InvalidArgument(format!(
            "ticket id must be a positive integer, got '{input}'"
        ))),
    }
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            // Default 5 second timeout
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self {
            conn,
            deleter: DEFAULT_DELETER.to_string(),
        })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn,
            deleter: DEFAULT_DELETER.to_string(),
        })
    }

    /// Set the only identity allowed to delete tickets.
    #[must_use]
    pub fn with_deleter(mut self, deleter: &str) -> Self {
        self.deleter = deleter.to_string();
        self
    }

    /// Identity allowed to delete tickets.
    #[must_use]
    pub fn deleter(&self) -> &str {
        &self.deleter
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Writes queued history entries
    /// 4. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, actor);

        let result = f(&tx, &mut ctx)?;

        for entry in &ctx.history {
            insert_history(&tx, entry)?;
        }

        tx.commit()?;
        debug!(op, actor, history = ctx.history.len(), "Mutation committed");

        Ok(result)
    }

    /// Get a ticket row by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_ticket(&self, id: i64) -> Result<Option<StoredTicket>> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [id], map_ticket_row)
            .optional()?)
    }

    /// Count tickets per section.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_by_section(&self) -> Result<Vec<(Section, usize)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT section, COUNT(*) FROM tickets GROUP BY section ORDER BY section")?;
        let rows = stmt.query_map([], |row| {
            let count: i64 = row.get(1)?;
            Ok((row.get(0)?, usize::try_from(count).unwrap_or(0)))
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

impl TicketStore for SqliteStorage {
    fn list_tickets(&self, section: Section) -> Result<Vec<StoredTicket>> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE section = ?1 ORDER BY id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([section], map_ticket_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    fn create_ticket(
        &mut self,
        section: Section,
        status: Option<&str>,
        payload: &serde_json::Value,
        changed_by: &str,
    ) -> Result<StoredTicket> {
        if !payload.is_object() {
            return Err(Error::Validation("ticket payload must be a JSON object".to_string()));
        }
        let status = status
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| section.default_status());
        let body = serde_json::to_string(payload)?;
        let now = chrono::Utc::now().timestamp_millis();

        let id = self.mutate("create_ticket", changed_by, |tx, _ctx| {
            tx.execute(
                "INSERT INTO tickets (section, status, payload, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![section, status, body, changed_by, now],
            )?;
            Ok(tx.last_insert_rowid())
        })?;

        info!(section = %section, record_id = id, actor = changed_by, "Created ticket");
        self.get_ticket(id)?
            .ok_or_else(|| Error::TicketNotFound { id: id.to_string() })
    }

    fn update_ticket(
        &mut self,
        id: i64,
        status: Option<&str>,
        action_taken: Option<&str>,
        changed_by: &str,
    ) -> Result<StoredTicket> {
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("update_ticket", changed_by, |tx, ctx| {
            let before = snapshot(tx, id)?;
            // The action also lands in the field behind the section's action column.
            let action_path = format!("$.{}", codec::layout(before.section).action_field());

            tx.execute(
                "UPDATE tickets SET
                    status = COALESCE(?1, status),
                    payload = CASE WHEN ?2 IS NULL THEN payload
                                   ELSE json_set(payload, '$.actionTaken', ?2, ?5, ?2) END,
                    updated_at = ?3
                 WHERE id = ?4",
                rusqlite::params![status, action_taken, now, id, action_path],
            )?;

            let status_changed = status.is_some_and(|s| s != before.status);
            let action_changed = action_taken.is_some_and(|a| Some(a) != before.action.as_deref());

            if status_changed || action_changed {
                let new_status = status.map_or_else(|| before.status.clone(), str::to_string);
                let new_action = action_taken.map(str::to_string).or_else(|| before.action.clone());
                ctx.record(
                    NewHistory::new(id, before.section, changed_by)
                        .with_status(Some(before.status), Some(new_status))
                        .with_action(before.action, new_action),
                );
            }
            Ok(())
        })?;

        debug!(record_id = id, actor = changed_by, "Updated ticket");
        self.get_ticket(id)?
            .ok_or_else(|| Error::TicketNotFound { id: id.to_string() })
    }

    fn delete_ticket(&mut self, id: i64, actor: &str) -> Result<()> {
        if actor != self.deleter {
            return Err(Error::Forbidden {
                actor: actor.to_string(),
                action: "delete tickets".to_string(),
            });
        }

        self.mutate("delete_ticket", actor, |tx, ctx| {
            let before = snapshot(tx, id)?;

            // Tombstone goes in before the row disappears.
            insert_history(
                tx,
                &NewHistory::new(id, before.section, &ctx.actor)
                    .with_status(Some(before.status), Some(DELETED_STATUS.to_string()))
                    .with_action(before.action, None),
            )?;

            tx.execute("DELETE FROM tickets WHERE id = ?1", [id])?;
            Ok(())
        })?;

        info!(record_id = id, actor, "Deleted ticket");
        Ok(())
    }

    fn ticket_history(&self, id: i64) -> Result<Vec<HistoryEntry>> {
        Ok(get_history(&self.conn, id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create(storage: &mut SqliteStorage, section: Section, payload: serde_json::Value) -> StoredTicket {
        storage
            .create_ticket(section, None, &payload, "tester")
            .unwrap()
    }

    #[test]
    fn test_open_memory() {
        let storage = SqliteStorage::open_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_create_assigns_id_and_default_status_without_history() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let row = create(&mut storage, Section::TimeTable, json!({"caseNumber": "TT-1"}));
        assert!(row.id > 0);
        assert_eq!(row.status, "Pending Call");
        assert_eq!(row.created_by.as_deref(), Some("tester"));
        assert!(storage.ticket_history(row.id).unwrap().is_empty());
    }

    #[test]
    fn test_create_rejects_non_object_payload() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let err = storage
            .create_ticket(Section::Ce, None, &json!([1, 2]), "tester")
            .unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_list_is_filtered_and_ordered_by_id() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let a = create(&mut storage, Section::Ce, json!({"caseNumber": "A"}));
        create(&mut storage, Section::Cctv, json!({"caseNumber": "B"}));
        let c = create(&mut storage, Section::Ce, json!({"caseNumber": "C"}));

        let rows = storage.list_tickets(Section::Ce).unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a.id, c.id]);
    }

    #[test]
    fn test_update_is_partial_and_merges_action_into_payload() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let row = create(
            &mut storage,
            Section::Ce,
            json!({"caseNumber": "CE-01001", "customerName": "Lina"}),
        );

        let updated = storage
            .update_ticket(row.id, None, Some("refund issued"), "Mai")
            .unwrap();
        assert_eq!(updated.status, "Under Review");
        assert_eq!(updated.payload["actionTaken"], "refund issued");
        assert_eq!(updated.payload["customerName"], "Lina");

        let updated = storage.update_ticket(row.id, Some("Closed"), None, "Mai").unwrap();
        assert_eq!(updated.status, "Closed");
        assert_eq!(updated.payload["actionTaken"], "refund issued");

        let history = storage.ticket_history(row.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].new_status.as_deref(), Some("Closed"));
        assert_eq!(history[0].prev_status.as_deref(), Some("Under Review"));
        assert_eq!(history[0].changed_by, "Mai");
    }

    #[test]
    fn test_update_action_fills_time_table_note() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let row = create(
            &mut storage,
            Section::TimeTable,
            json!({"caseNumber": "TT-1", "note": "old"}),
        );

        let updated = storage
            .update_ticket(row.id, None, Some("new"), "Mai")
            .unwrap();
        assert_eq!(updated.payload["actionTaken"], "new");
        assert_eq!(updated.payload["note"], "new");
        assert_eq!(updated.into_ticket().text("note"), "new");

        let history = storage.ticket_history(row.id).unwrap();
        assert_eq!(history[0].new_action.as_deref(), Some("new"));
    }

    #[test]
    fn test_update_without_change_writes_no_history() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let row = create(&mut storage, Section::Ce, json!({"caseNumber": "X"}));
        storage
            .update_ticket(row.id, Some("Under Review"), None, "Mai")
            .unwrap();
        assert!(storage.ticket_history(row.id).unwrap().is_empty());
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let err = storage.update_ticket(404, Some("Closed"), None, "Mai").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete_requires_configured_deleter() {
        let mut storage = SqliteStorage::open_memory().unwrap().with_deleter("Anati");
        let row = create(&mut storage, Section::Cctv, json!({"caseNumber": "CCTV-1"}));

        let err = storage.delete_ticket(row.id, "Mai").unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));
        assert!(storage.get_ticket(row.id).unwrap().is_some());

        storage.delete_ticket(row.id, "Anati").unwrap();
        assert!(storage.get_ticket(row.id).unwrap().is_none());

        let history = storage.ticket_history(row.id).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].is_deletion());
        assert_eq!(history[0].prev_status.as_deref(), Some("Under Review"));

        let err = storage.delete_ticket(row.id, "Anati").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_row_to_ticket_mapping() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let row = create(
            &mut storage,
            Section::Cctv,
            json!({"status": "Escalated", "staff": ["Ali", "Sara"], "branch": "Mall"}),
        );
        let id = row.id;
        let ticket = row.into_ticket();

        assert_eq!(ticket.record_id, Some(id));
        assert_eq!(ticket.status, "Under Review");
        assert_eq!(ticket.text("caseNumber"), format!("CCTV-{id}"));
        assert_eq!(ticket.text("staff"), "Ali, Sara");
        assert!(ticket.created_at.is_some());
        assert!(ticket.get("status").is_none());
    }

    #[test]
    fn test_row_to_ticket_prefers_order_number_outside_cctv() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let row = create(&mut storage, Section::FreeOrders, json!({"orderNumber": "7781"}));
        assert_eq!(row.into_ticket().text("caseNumber"), "7781");
    }

    #[test]
    fn test_parse_ticket_id() {
        assert_eq!(parse_ticket_id(" 42 ").unwrap(), 42);
        assert!(parse_ticket_id("abc").is_err());
        assert!(parse_ticket_id("0").is_err());
        assert_eq!(parse_ticket_id("-1").unwrap_err().exit_code(), 4);
    }

    #[test]
    fn test_count_by_section() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        create(&mut storage, Section::Ce, json!({}));
        create(&mut storage, Section::Ce, json!({}));
        create(&mut storage, Section::Cctv, json!({}));
        let counts = storage.count_by_section().unwrap();
        assert!(counts.contains(&(Section::Ce, 2)));
        assert!(counts.contains(&(Section::Cctv, 1)));
    }
}
