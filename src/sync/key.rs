//! Business key resolution.
//!
//! The business key identifies the same logical ticket across the client
//! cache, the store and the spreadsheet.

use crate::model::Ticket;

/// Canonical business key: trimmed `caseNumber`, else trimmed `orderNumber`,
/// else empty.
///
/// An empty key marks the record as unmergeable. Two empty keys are never
/// equal for merge purposes; callers skip keyless records instead of
/// comparing them.
#[must_use]
pub fn business_key(ticket: &Ticket) -> String {
    ["caseNumber", "orderNumber"]
        .iter()
        .map(|field| ticket.text(field).trim().to_string())
        .find(|key| !key.is_empty())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Section;

    #[test]
    fn test_prefers_case_number() {
        let t = Ticket::new(Section::Ce)
            .with("caseNumber", "  CE-01001 ")
            .with("orderNumber", "9981");
        assert_eq!(business_key(&t), "CE-01001");
    }

    #[test]
    fn test_falls_back_to_order_number() {
        let t = Ticket::new(Section::FreeOrders)
            .with("caseNumber", "   ")
            .with("orderNumber", "9981");
        assert_eq!(business_key(&t), "9981");
    }

    #[test]
    fn test_numeric_order_number() {
        let mut t = Ticket::new(Section::TimeTable);
        t.fields.insert(
            "orderNumber".into(),
            crate::model::FieldValue::Other(serde_json::json!(42)),
        );
        assert_eq!(business_key(&t), "42");
    }

    #[test]
    fn test_keyless() {
        assert_eq!(business_key(&Ticket::new(Section::Cctv)), "");
    }
}
