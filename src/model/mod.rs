//! Data models for Crowd Desk.
//!
//! - Section (closed enum + static per-section config)
//! - Ticket (dynamic field record)
//! - HistoryEntry (audit trail)

pub mod history;
pub mod section;
pub mod ticket;

pub use history::{HistoryEntry, DELETED_STATUS};
pub use section::{status_tone, Section, SectionConfig, StatusTone};
pub use ticket::{Attachment, FieldValue, Ticket, ORIGIN_SHEET};
