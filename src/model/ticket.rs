//! Ticket record model.
//!
//! A ticket is a dynamic bag of fields plus a handful of fields every record
//! carries. Provenance is encoded solely by `record_id`: a ticket without
//! one came from the spreadsheet and has not been seeded into the store yet.

use crate::model::section::Section;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Origin tag written onto records that were last overwritten by a sheet pull.
pub const ORIGIN_SHEET: &str = "sheet";

/// Small inline attachment (photo, PDF) stored only in the store payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub inline_data: String,
}

/// A single field value.
///
/// Variant order matters for untagged deserialization: plain strings and
/// string lists are tried before attachments and arbitrary JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
    Attachment(Attachment),
    Other(serde_json::Value),
}

impl FieldValue {
    /// Classify an arbitrary JSON value from a store payload.
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) if items.iter().all(serde_json::Value::is_string) => {
                Self::List(
                    items
                        .into_iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                )
            }
            serde_json::Value::Object(ref map)
                if map.contains_key("name")
                    && map.contains_key("mimeType")
                    && map.contains_key("inlineData") =>
            {
                match serde_json::from_value::<Attachment>(value.clone()) {
                    Ok(attachment) => Self::Attachment(attachment),
                    Err(_) => Self::Other(value),
                }
            }
            other => Self::Other(other),
        }
    }

    /// Render the value as a single cell string.
    ///
    /// Lists are joined with `", "`; JSON null renders empty.
    #[must_use]
    pub fn as_cell(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::List(items) => items.join(", "),
            Self::Attachment(a) => a.name.clone(),
            Self::Other(serde_json::Value::Null) => String::new(),
            Self::Other(serde_json::Value::String(s)) => s.clone(),
            Self::Other(v) => v.to_string(),
        }
    }

    /// Whether the value renders as an empty cell.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::List(items) => items.iter().all(|s| s.trim().is_empty()),
            _ => self.as_cell().trim().is_empty(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

/// A ticket record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// Section this record belongs to; never changes.
    pub section: Section,

    /// Store-assigned identifier. Absent means sheet-origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<i64>,

    /// Current status; one of the section's statuses in practice.
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,

    /// Set to `"sheet"` when a pull overwrote this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_tag: Option<String>,

    /// Section-specific fields (caseNumber, branch, customerName, ...).
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Ticket {
    /// Create an empty ticket in the section's default status.
    #[must_use]
    pub fn new(section: Section) -> Self {
        Self {
            section,
            record_id: None,
            status: section.default_status().to_string(),
            created_at: None,
            last_modified: None,
            origin_tag: None,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    /// True when the record originated in, or was seeded into, the store.
    #[must_use]
    pub const fn is_store_origin(&self) -> bool {
        self.record_id.is_some()
    }

    /// Set a field. `status` and `createdAt` go to their dedicated slots.
    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        match field {
            "status" => self.status = value.as_cell(),
            "createdAt" => self.created_at = Some(value.as_cell()).filter(|s| !s.is_empty()),
            _ => {
                self.fields.insert(field.to_string(), value);
            }
        }
    }

    /// Raw field value, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Field rendered as a cell string; missing fields render empty.
    #[must_use]
    pub fn text(&self, field: &str) -> String {
        match field {
            "status" => self.status.clone(),
            "createdAt" => self.created_at.clone().unwrap_or_default(),
            "lastModified" => self.last_modified.clone().unwrap_or_default(),
            _ => self.fields.get(field).map(FieldValue::as_cell).unwrap_or_default(),
        }
    }

    /// Field value if present and non-blank.
    #[must_use]
    pub fn non_blank(&self, field: &str) -> Option<String> {
        let value = self.text(field);
        if value.trim().is_empty() { None } else { Some(value) }
    }

    /// Store payload: every dynamic field plus the status, as a JSON object.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (k, v) in &self.fields {
            if let Ok(json) = serde_json::to_value(v) {
                map.insert(k.clone(), json);
            }
        }
        map.insert(
            "status".to_string(),
            serde_json::Value::String(self.status.clone()),
        );
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ticket_uses_default_status() {
        let t = Ticket::new(Section::TimeTable);
        assert_eq!(t.status, "Pending Call");
        assert!(!t.is_store_origin());
    }

    #[test]
    fn test_flattened_fields_roundtrip_through_json() {
        let t = Ticket::new(Section::Cctv)
            .with("caseNumber", "CCTV-1")
            .with("staff", vec!["Ali".to_string(), "Sara".to_string()]);

        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["caseNumber"], "CCTV-1");
        assert_eq!(json["section"], "cctv");
        assert!(json.get("recordId").is_none());

        let back: Ticket = serde_json::from_value(json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_attachment_and_numbers_deserialize() {
        let json = serde_json::json!({
            "section": "cctv",
            "recordId": 12,
            "status": "Closed",
            "photo": {"name": "a.png", "mimeType": "image/png", "inlineData": "AAAA"},
            "amount": 25
        });
        let t: Ticket = serde_json::from_value(json).unwrap();
        assert_eq!(t.record_id, Some(12));
        assert!(matches!(t.get("photo"), Some(FieldValue::Attachment(_))));
        assert_eq!(t.text("amount"), "25");
    }

    #[test]
    fn test_set_routes_reserved_fields() {
        let mut t = Ticket::new(Section::Ce);
        t.set("status", "Closed");
        t.set("createdAt", "2025-09-01T10:00:00Z");
        assert_eq!(t.status, "Closed");
        assert_eq!(t.created_at.as_deref(), Some("2025-09-01T10:00:00Z"));
        assert!(t.fields.is_empty());
    }

    #[test]
    fn test_payload_carries_status() {
        let t = Ticket::new(Section::Ce).with("customerName", "Lina");
        let payload = t.payload();
        assert_eq!(payload["status"], "Under Review");
        assert_eq!(payload["customerName"], "Lina");
    }
}
