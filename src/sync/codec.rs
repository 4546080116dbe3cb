//! Row codec: ticket record ⇄ fixed-width spreadsheet row.
//!
//! Each section has a fixed column order. Lists are written joined with
//! `", "` and read back split on commas with surrounding whitespace removed.
//! Decoding never fails: short rows are padded with empty cells and a blank
//! status falls back to the section default.

use crate::model::{FieldValue, Section, Ticket};
use crate::sheets::a1;

/// How a column maps to ticket fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Plain string field.
    Text,
    /// List-of-strings field.
    List,
    /// The ticket status; blank falls back to the section default.
    Status,
    /// cctv column C: `"{date} {time}"` when both exist, else `dateTime`.
    ///
    /// Lossy: a record carrying `date`, `time` and a different `dateTime`
    /// decodes with `dateTime` set to the joined date and time.
    DateTime,
    /// Business key column.
    Key,
}

/// One spreadsheet column.
#[derive(Debug)]
pub struct Column {
    /// Field written on decode (and read first on encode).
    pub field: &'static str,
    pub kind: ColumnKind,
    /// Fields consulted, in order, when `field` is blank on encode.
    pub fallbacks: &'static [&'static str],
    /// Extra field that receives the same value on decode.
    pub mirror: Option<&'static str>,
}

const fn col(field: &'static str, kind: ColumnKind) -> Column {
    Column {
        field,
        kind,
        fallbacks: &[],
        mirror: None,
    }
}

const fn text(field: &'static str) -> Column {
    col(field, ColumnKind::Text)
}

const fn list(field: &'static str) -> Column {
    col(field, ColumnKind::List)
}

/// Fixed column layout of one section's tab.
#[derive(Debug)]
pub struct ColumnLayout {
    pub columns: &'static [Column],
    /// Zero-based position of the business key column.
    pub key: usize,
    /// Zero-based position of the status column.
    pub status: usize,
    /// Zero-based position of the column that receives `actionTaken` updates.
    pub action: usize,
}

impl ColumnLayout {
    /// Number of columns in a row.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.columns.len()
    }

    /// Letter of the key column, e.g. `K`.
    #[must_use]
    pub fn key_letter(&self) -> String {
        a1::column_letters(self.key)
    }

    #[must_use]
    pub fn status_letter(&self) -> String {
        a1::column_letters(self.status)
    }

    #[must_use]
    pub fn action_letter(&self) -> String {
        a1::column_letters(self.action)
    }

    /// Ticket field stored in the action column (`note` for time-table).
    #[must_use]
    pub const fn action_field(&self) -> &'static str {
        self.columns[self.action].field
    }
}

static CCTV: ColumnLayout = ColumnLayout {
    columns: &[
        col("status", ColumnKind::Status),
        text("branch"),
        col("dateTime", ColumnKind::DateTime),
        list("cameras"),
        list("sections"),
        list("staff"),
        text("reviewType"),
        list("violations"),
        // Lossy: a blank `notes` encodes the first non-blank fallback, which
        // then decodes back as `notes`.
        Column {
            field: "notes",
            kind: ColumnKind::Text,
            fallbacks: &["caseDescription", "customerNotes"],
            mirror: None,
        },
        text("actionTaken"),
        col("caseNumber", ColumnKind::Key),
        text("createdBy"),
        text("createdAt"),
    ],
    key: 10,
    status: 0,
    action: 9,
};

static CE: ColumnLayout = ColumnLayout {
    columns: &[
        col("status", ColumnKind::Status),
        text("department"),
        text("customerName"),
        text("phone"),
        text("creationDate"),
        text("shift"),
        text("orderType"),
        text("branch"),
        text("restaurant"),
        text("channel"),
        text("feedbackDate"),
        text("issueCategory"),
        text("customerNotes"),
        text("actionTaken"),
        text("satisfaction"),
        Column {
            field: "caseNumber",
            kind: ColumnKind::Key,
            fallbacks: &["orderNumber"],
            mirror: None,
        },
    ],
    key: 15,
    status: 0,
    action: 13,
};

static COMPLAINTS: ColumnLayout = ColumnLayout {
    columns: &[
        col("status", ColumnKind::Status),
        text("department"),
        text("customerName"),
        text("phone"),
        text("creationDate"),
        text("shift"),
        text("orderType"),
        text("branch"),
        text("restaurant"),
        text("channel"),
        text("issueCategory"),
        text("complaintDetails"),
        text("actionTaken"),
        Column {
            field: "caseNumber",
            kind: ColumnKind::Key,
            fallbacks: &["orderNumber"],
            mirror: None,
        },
    ],
    key: 13,
    status: 0,
    action: 12,
};

static FREE_ORDERS: ColumnLayout = ColumnLayout {
    columns: &[
        col("status", ColumnKind::Status),
        text("customerName"),
        text("phone"),
        text("orderDate"),
        text("discountAmount"),
        text("reasonForDiscount"),
        text("decisionMaker"),
        text("discountDate"),
        text("newOrderNumber"),
        text("deductionFrom"),
        text("caseDescription"),
        text("actionTaken"),
        Column {
            field: "orderNumber",
            kind: ColumnKind::Key,
            fallbacks: &["caseNumber"],
            mirror: Some("caseNumber"),
        },
    ],
    key: 12,
    status: 0,
    action: 11,
};

static TIME_TABLE: ColumnLayout = ColumnLayout {
    columns: &[
        col("status", ColumnKind::Status),
        text("note"),
        text("customerName"),
        text("phone"),
        text("orderNumber"),
        text("returnDate"),
        text("amountToBeRefunded"),
        text("deliveryFees"),
        text("platesQuantity"),
        text("platesNumbers"),
        Column {
            field: "caseNumber",
            kind: ColumnKind::Key,
            fallbacks: &["orderNumber"],
            mirror: None,
        },
    ],
    key: 10,
    status: 0,
    action: 1,
};

/// Column layout for a section.
#[must_use]
pub const fn layout(section: Section) -> &'static ColumnLayout {
    match section {
        Section::Cctv => &CCTV,
        Section::Ce => &CE,
        Section::Complaints => &COMPLAINTS,
        Section::FreeOrders => &FREE_ORDERS,
        Section::TimeTable => &TIME_TABLE,
    }
}

fn first_non_blank(ticket: &Ticket, column: &Column) -> String {
    std::iter::once(column.field)
        .chain(column.fallbacks.iter().copied())
        .find_map(|field| ticket.non_blank(field))
        .unwrap_or_default()
}

/// Encode a ticket into its section's fixed-width row.
#[must_use]
pub fn encode(ticket: &Ticket) -> Vec<String> {
    layout(ticket.section)
        .columns
        .iter()
        .map(|column| match column.kind {
            ColumnKind::Status => {
                if ticket.status.trim().is_empty() {
                    ticket.section.default_status().to_string()
                } else {
                    ticket.status.clone()
                }
            }
            ColumnKind::DateTime => match (ticket.non_blank("date"), ticket.non_blank("time")) {
                (Some(date), Some(time)) => format!("{date} {time}"),
                _ => ticket.text(column.field),
            },
            ColumnKind::Text | ColumnKind::List | ColumnKind::Key => {
                first_non_blank(ticket, column)
            }
        })
        .collect()
}

/// Split a list cell on commas, trimming whitespace around each item.
#[must_use]
pub fn split_list(cell: &str) -> Vec<String> {
    if cell.trim().is_empty() {
        return Vec::new();
    }
    cell.split(',').map(|s| s.trim().to_string()).collect()
}

/// Decode a row into a sheet-origin ticket. Never fails.
#[must_use]
pub fn decode(section: Section, row: &[String]) -> Ticket {
    let mut ticket = Ticket::new(section);

    for (i, column) in layout(section).columns.iter().enumerate() {
        let cell = row.get(i).map(String::as_str).unwrap_or_default();
        match column.kind {
            ColumnKind::Status => {
                if !cell.trim().is_empty() {
                    ticket.status = cell.to_string();
                }
            }
            ColumnKind::List => {
                ticket.set(column.field, FieldValue::List(split_list(cell)));
            }
            ColumnKind::Text | ColumnKind::DateTime | ColumnKind::Key => {
                ticket.set(column.field, cell);
            }
        }
        if let Some(mirror) = column.mirror {
            ticket.set(mirror, cell);
        }
    }

    ticket
}

/// Decode every non-blank row of a pull.
#[must_use]
pub fn decode_rows(section: Section, rows: &[Vec<String>]) -> Vec<Ticket> {
    rows.iter()
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .map(|row| decode(section, row))
        .collect()
}
