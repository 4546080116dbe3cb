//! Merging pulled rows into a section collection.
//!
//! Three pure functions drive every reconciliation:
//!
//! - [`merge`] folds a sheet pull into the cached collection, keyed by
//!   business key, so no two entries share a non-empty key.
//! - [`reconcile_after_pull`] drops sheet-origin records whose key vanished
//!   from the sheet. Store-origin records are never dropped.
//! - [`apply_store_pull`] replaces store-origin entries with a fresh store
//!   listing while keeping sheet-origin entries the store does not know yet.

use std::collections::{HashMap, HashSet};

use crate::model::{Ticket, ORIGIN_SHEET};
use crate::sync::codec;
use crate::sync::key::business_key;
use crate::sync::types::MergePolicy;

/// Fields whose value the store owns on store-origin records.
fn store_managed(ticket: &Ticket) -> Vec<&'static str> {
    let action = codec::layout(ticket.section).action_field();
    if action == "actionTaken" {
        vec!["actionTaken"]
    } else {
        vec!["actionTaken", action]
    }
}

/// Overlay a pulled record onto an existing one.
///
/// Every field present in `pulled` wins; fields only on `existing` survive.
/// Under [`MergePolicy::StoreAuthoritative`] a store-origin record keeps its
/// status and action fields.
fn overlay(existing: &Ticket, pulled: &Ticket, policy: MergePolicy) -> Ticket {
    let mut merged = existing.clone();
    for (field, value) in &pulled.fields {
        merged.fields.insert(field.clone(), value.clone());
    }
    merged.status.clone_from(&pulled.status);
    merged.record_id = pulled.record_id.or(existing.record_id);
    if pulled.created_at.is_some() {
        merged.created_at.clone_from(&pulled.created_at);
    }
    if pulled.last_modified.is_some() {
        merged.last_modified.clone_from(&pulled.last_modified);
    }
    merged.origin_tag = Some(ORIGIN_SHEET.to_string());

    if policy == MergePolicy::StoreAuthoritative && existing.is_store_origin() {
        merged.status.clone_from(&existing.status);
        for field in store_managed(existing) {
            match existing.fields.get(field) {
                Some(value) => {
                    merged.fields.insert(field.to_string(), value.clone());
                }
                None => {
                    merged.fields.remove(field);
                }
            }
        }
    }

    merged
}

/// Merge a sheet pull into the current section collection.
///
/// Keyless records on either side are dropped. Existing entries keep their
/// position; new keys are appended in pull order.
#[must_use]
pub fn merge(local: &[Ticket], pulled: &[Ticket], policy: MergePolicy) -> Vec<Ticket> {
    let mut result: Vec<Ticket> = Vec::with_capacity(local.len() + pulled.len());
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for ticket in local {
        let key = business_key(ticket);
        if key.is_empty() {
            continue;
        }
        if let Some(&i) = by_key.get(&key) {
            result[i] = ticket.clone();
        } else {
            by_key.insert(key, result.len());
            result.push(ticket.clone());
        }
    }

    for ticket in pulled {
        let key = business_key(ticket);
        if key.is_empty() {
            continue;
        }
        if let Some(&i) = by_key.get(&key) {
            result[i] = overlay(&result[i], ticket, policy);
        } else {
            by_key.insert(key, result.len());
            result.push(ticket.clone());
        }
    }

    result
}

/// Drop records a sheet pull shows to be gone.
///
/// Store-origin records are always kept. Sheet-origin records are kept
/// only while their non-empty key is in `pulled`.
#[must_use]
pub fn reconcile_after_pull(current: &[Ticket], pulled: &[Ticket]) -> Vec<Ticket> {
    let sheet_keys: HashSet<String> = pulled
        .iter()
        .map(business_key)
        .filter(|k| !k.is_empty())
        .collect();

    current
        .iter()
        .filter(|t| {
            if t.is_store_origin() {
                return true;
            }
            let key = business_key(t);
            !key.is_empty() && sheet_keys.contains(&key)
        })
        .cloned()
        .collect()
}

/// Rebuild a section collection from a fresh store listing.
///
/// Store rows come first, in store order. Sheet-origin cached records whose
/// key the store does not hold are appended after them so they stay visible
/// until seeded.
#[must_use]
pub fn apply_store_pull(current: &[Ticket], store_tickets: Vec<Ticket>) -> Vec<Ticket> {
    let store_keys: HashSet<String> = store_tickets
        .iter()
        .map(business_key)
        .filter(|k| !k.is_empty())
        .collect();

    let mut result = store_tickets;
    result.extend(
        current
            .iter()
            .filter(|t| !t.is_store_origin())
            .filter(|t| {
                let key = business_key(t);
                !key.is_empty() && !store_keys.contains(&key)
            })
            .cloned(),
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Section;

    fn sheet(section: Section, key: &str, status: &str) -> Ticket {
        let mut t = Ticket::new(section).with("caseNumber", key);
        t.status = status.to_string();
        t
    }

    fn stored(section: Section, id: i64, key: &str, status: &str) -> Ticket {
        let mut t = sheet(section, key, status);
        t.record_id = Some(id);
        t
    }

    #[test]
    fn test_merge_keeps_keys_unique() {
        let local = vec![
            sheet(Section::Ce, "A", "Under Review"),
            sheet(Section::Ce, "A", "Escalated"),
            sheet(Section::Ce, "B", "Under Review"),
        ];
        let pulled = vec![
            sheet(Section::Ce, "B", "Closed"),
            sheet(Section::Ce, "C", "Under Review"),
            sheet(Section::Ce, "C", "Closed"),
        ];

        let merged = merge(&local, &pulled, MergePolicy::SheetWins);
        let keys: Vec<String> = merged.iter().map(business_key).collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
        assert_eq!(merged[0].status, "Escalated");
        assert_eq!(merged[1].status, "Closed");
        assert_eq!(merged[2].status, "Closed");
    }

    #[test]
    fn test_merge_skips_keyless_records() {
        let local = vec![Ticket::new(Section::Ce), Ticket::new(Section::Ce)];
        let pulled = vec![Ticket::new(Section::Ce)];
        assert!(merge(&local, &pulled, MergePolicy::default()).is_empty());
    }

    #[test]
    fn test_merge_overlay_preserves_local_only_fields() {
        let local = vec![
            stored(Section::Ce, 4, "CE-1", "Under Review")
                .with("photo", "receipt.png")
                .with("branch", "Abdoun"),
        ];
        let pulled = vec![sheet(Section::Ce, "CE-1", "Under Review").with("branch", "Swefieh")];

        let merged = merge(&local, &pulled, MergePolicy::default());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].record_id, Some(4));
        assert_eq!(merged[0].text("photo"), "receipt.png");
        assert_eq!(merged[0].text("branch"), "Swefieh");
        assert_eq!(merged[0].origin_tag.as_deref(), Some(ORIGIN_SHEET));
    }

    #[test]
    fn test_store_authoritative_keeps_status_and_action() {
        let local = vec![stored(Section::Ce, 1, "CE-1", "Closed").with("actionTaken", "refund")];
        let pulled = vec![sheet(Section::Ce, "CE-1", "Under Review").with("actionTaken", "")];

        let merged = merge(&local, &pulled, MergePolicy::StoreAuthoritative);
        assert_eq!(merged[0].status, "Closed");
        assert_eq!(merged[0].text("actionTaken"), "refund");

        let literal = merge(&local, &pulled, MergePolicy::SheetWins);
        assert_eq!(literal[0].status, "Under Review");
        assert_eq!(literal[0].text("actionTaken"), "");
    }

    #[test]
    fn test_store_authoritative_ignored_for_sheet_origin() {
        let local = vec![sheet(Section::Ce, "CE-1", "Closed")];
        let pulled = vec![sheet(Section::Ce, "CE-1", "Escalated")];
        let merged = merge(&local, &pulled, MergePolicy::StoreAuthoritative);
        assert_eq!(merged[0].status, "Escalated");
    }

    #[test]
    fn test_time_table_note_is_store_managed() {
        let local = vec![
            stored(Section::TimeTable, 9, "TT-1", "Called").with("note", "call after 5"),
        ];
        let pulled = vec![sheet(Section::TimeTable, "TT-1", "Pending Call").with("note", "")];
        let merged = merge(&local, &pulled, MergePolicy::StoreAuthoritative);
        assert_eq!(merged[0].text("note"), "call after 5");
        assert_eq!(merged[0].status, "Called");
    }

    #[test]
    fn test_reconcile_never_drops_store_origin() {
        let current = vec![
            stored(Section::Ce, 1, "CE-1", "Closed"),
            stored(Section::Ce, 2, "CE-2", "Closed"),
        ];
        let kept = reconcile_after_pull(&current, &[]);
        assert_eq!(kept, current);
    }

    #[test]
    fn test_reconcile_prunes_vanished_sheet_origin() {
        let current = vec![
            sheet(Section::TimeTable, "TT-00042", "Pending Call"),
            sheet(Section::TimeTable, "TT-00043", "Pending Call"),
            Ticket::new(Section::TimeTable),
        ];
        let pulled = vec![sheet(Section::TimeTable, " TT-00043 ", "Pending Call")];

        let kept = reconcile_after_pull(&current, &pulled);
        assert_eq!(kept.len(), 1);
        assert_eq!(business_key(&kept[0]), "TT-00043");
    }

    #[test]
    fn test_apply_store_pull_keeps_unseeded_sheet_rows() {
        let current = vec![
            stored(Section::Ce, 1, "CE-1", "Under Review"),
            sheet(Section::Ce, "CE-2", "Under Review"),
            sheet(Section::Ce, "CE-3", "Under Review"),
            stored(Section::Ce, 7, "CE-GONE", "Closed"),
        ];
        let store = vec![
            stored(Section::Ce, 1, "CE-1", "Closed"),
            stored(Section::Ce, 2, "CE-2", "Under Review"),
        ];

        let result = apply_store_pull(&current, store);
        let keys: Vec<String> = result.iter().map(business_key).collect();
        assert_eq!(keys, vec!["CE-1", "CE-2", "CE-3"]);
        assert_eq!(result[0].status, "Closed");
        assert_eq!(result[1].record_id, Some(2));
        assert!(!result[2].is_store_origin());
    }
}
