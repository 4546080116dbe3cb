//! Ticket store (relational side of the ticket data).
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic writes
//! - Append-only history for every status/action change and deletion
//!
//! # Submodules
//!
//! - [`history`] - History entry storage
//! - [`migrations`] - Embedded SQL migrations
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation

pub mod history;
pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use sqlite::{parse_ticket_id, MutationContext, SqliteStorage, StoredTicket, DEFAULT_DELETER};

use crate::error::Result;
use crate::model::{HistoryEntry, Section};

/// Operations the reconciler needs from the relational store.
///
/// Failures are surfaced to the caller and never retried internally.
pub trait TicketStore {
    /// Tickets of one section, ordered by id ascending.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable`-class errors when the store cannot be read.
    fn list_tickets(&self, section: Section) -> Result<Vec<StoredTicket>>;

    /// Create a ticket. A blank status becomes the section default.
    /// Creation writes no history.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a non-object payload, or a store error.
    fn create_ticket(
        &mut self,
        section: Section,
        status: Option<&str>,
        payload: &serde_json::Value,
        changed_by: &str,
    ) -> Result<StoredTicket>;

    /// Partial update. `None` leaves a value untouched; `action_taken` is
    /// merged into the payload. A history entry is written only when the
    /// status or action actually changed.
    ///
    /// # Errors
    ///
    /// Returns `TicketNotFound` if no row has this id.
    fn update_ticket(
        &mut self,
        id: i64,
        status: Option<&str>,
        action_taken: Option<&str>,
        changed_by: &str,
    ) -> Result<StoredTicket>;

    /// Delete a ticket, writing a final `DELETED` history entry first.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless `actor` is the configured deleter, or
    /// `TicketNotFound`.
    fn delete_ticket(&mut self, id: i64, actor: &str) -> Result<()>;

    /// History of a ticket, newest first.
    ///
    /// # Errors
    ///
    /// Returns a store error if the query fails.
    fn ticket_history(&self, id: i64) -> Result<Vec<HistoryEntry>>;
}
