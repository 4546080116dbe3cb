//! Seeding: promoting sheet-origin records into the store.

use tracing::{debug, info, warn};

use crate::model::Section;
use crate::storage::TicketStore;
use crate::sync::cache::ClientCache;
use crate::sync::key::business_key;
use crate::sync::types::SeedStats;

/// Actor recorded on store rows created by seeding.
pub const SEED_ACTOR: &str = "system-seed";

/// Create a store row for every sheet-origin record of `section` that has
/// a key and was not seeded before.
///
/// Each attempt is independent: a failure is logged and counted, and the
/// record is retried on a later cycle. Successful keys are marked seeded
/// in `cache` immediately, before any store re-pull confirms the new id.
pub fn seed_section<S: TicketStore>(
    store: &mut S,
    cache: &mut ClientCache,
    section: Section,
) -> SeedStats {
    let mut stats = SeedStats::default();

    let candidates: Vec<_> = cache
        .section(section)
        .iter()
        .filter(|t| !t.is_store_origin())
        .filter_map(|t| {
            let key = business_key(t);
            (!key.is_empty()).then(|| (key, t.clone()))
        })
        .collect();

    for (key, ticket) in candidates {
        if cache.was_seeded(section, &key) {
            stats.skipped += 1;
            continue;
        }

        let status = Some(ticket.status.as_str()).filter(|s| !s.trim().is_empty());
        match store.create_ticket(section, status, &ticket.payload(), SEED_ACTOR) {
            Ok(created) => {
                cache.mark_seeded(section, &key);
                stats.seeded += 1;
                debug!(section = %section, key = %key, record_id = created.id, "Seeded ticket");
            }
            Err(e) => {
                stats.failed += 1;
                warn!(section = %section, key = %key, error = %e, "Seeding failed");
            }
        }
    }

    if stats.seeded > 0 || stats.failed > 0 {
        info!(
            section = %section,
            seeded = stats.seeded,
            failed = stats.failed,
            "Seeded sheet-origin tickets"
        );
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Backend, Error, Result};
    use crate::model::{HistoryEntry, Ticket};
    use crate::storage::{SqliteStorage, StoredTicket};

    fn sheet_rows(section: Section, keys: &[&str]) -> Vec<Ticket> {
        keys.iter()
            .map(|k| Ticket::new(section).with("caseNumber", *k))
            .collect()
    }

    #[test]
    fn test_seeding_is_idempotent_without_repull() {
        let mut store = SqliteStorage::open_memory().unwrap();
        let mut cache = ClientCache::in_memory();
        cache.replace(Section::Ce, sheet_rows(Section::Ce, &["CE-1", "CE-2"]));

        let first = seed_section(&mut store, &mut cache, Section::Ce);
        assert_eq!(first.seeded, 2);

        let second = seed_section(&mut store, &mut cache, Section::Ce);
        assert_eq!(second.seeded, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(store.list_tickets(Section::Ce).unwrap().len(), 2);
    }

    #[test]
    fn test_seeding_skips_store_origin_and_keyless() {
        let mut store = SqliteStorage::open_memory().unwrap();
        let mut cache = ClientCache::in_memory();
        let mut stored = Ticket::new(Section::Ce).with("caseNumber", "CE-1");
        stored.record_id = Some(1);
        cache.replace(Section::Ce, vec![stored, Ticket::new(Section::Ce)]);

        let stats = seed_section(&mut store, &mut cache, Section::Ce);
        assert_eq!(stats.total(), 0);
    }

    #[test]
    fn test_seeded_row_carries_status_and_actor() {
        let mut store = SqliteStorage::open_memory().unwrap();
        let mut cache = ClientCache::in_memory();
        let mut t = Ticket::new(Section::TimeTable).with("caseNumber", "TT-00042");
        t.status = "Called".into();
        cache.replace(Section::TimeTable, vec![t]);

        seed_section(&mut store, &mut cache, Section::TimeTable);
        let rows = store.list_tickets(Section::TimeTable).unwrap();
        assert_eq!(rows[0].status, "Called");
        assert_eq!(rows[0].created_by.as_deref(), Some(SEED_ACTOR));
        assert_eq!(rows[0].payload["caseNumber"], "TT-00042");
    }

    /// Store that rejects one key.
    struct Flaky {
        inner: SqliteStorage,
        reject: &'static str,
    }

    impl TicketStore for Flaky {
        fn list_tickets(&self, section: Section) -> Result<Vec<StoredTicket>> {
            self.inner.list_tickets(section)
        }

        fn create_ticket(
            &mut self,
            section: Section,
            status: Option<&str>,
            payload: &serde_json::Value,
            changed_by: &str,
        ) -> Result<StoredTicket> {
            if payload["caseNumber"] == self.reject {
                return Err(Error::unavailable(Backend::Store, "write timeout"));
            }
            self.inner.create_ticket(section, status, payload, changed_by)
        }

        fn update_ticket(
            &mut self,
            id: i64,
            status: Option<&str>,
            action_taken: Option<&str>,
            changed_by: &str,
        ) -> Result<StoredTicket> {
            self.inner.update_ticket(id, status, action_taken, changed_by)
        }

        fn delete_ticket(&mut self, id: i64, actor: &str) -> Result<()> {
            self.inner.delete_ticket(id, actor)
        }

        fn ticket_history(&self, id: i64) -> Result<Vec<HistoryEntry>> {
            self.inner.ticket_history(id)
        }
    }

    #[test]
    fn test_one_failure_does_not_block_others() {
        let mut store = Flaky {
            inner: SqliteStorage::open_memory().unwrap(),
            reject: "CE-2",
        };
        let mut cache = ClientCache::in_memory();
        cache.replace(Section::Ce, sheet_rows(Section::Ce, &["CE-1", "CE-2", "CE-3"]));

        let stats = seed_section(&mut store, &mut cache, Section::Ce);
        assert_eq!(stats.seeded, 2);
        assert_eq!(stats.failed, 1);
        assert!(!cache.was_seeded(Section::Ce, "CE-2"));

        store.reject = "none";
        let retry = seed_section(&mut store, &mut cache, Section::Ce);
        assert_eq!(retry.seeded, 1);
        assert_eq!(retry.skipped, 2);
    }
}
