//! The sync session: reconciliation cycles, the watch loop and user
//! mutations.
//!
//! A [`SyncSession`] owns every piece of mutable state (the client cache,
//! the backends, the change notifier), so nothing is ambient. Steps of a
//! cycle run strictly in order:
//!
//! 1. Store pull, applied with [`apply_store_pull`], then persist.
//! 2. Sheet pull, folded in with [`merge`], then persist.
//! 3. [`reconcile_after_pull`], persisted if anything was dropped.
//! 4. Seeding; if anything was seeded, a store re-pull, then persist.
//!
//! A failing step is logged and recorded in the [`CycleReport`]; it never
//! aborts the cycle. Steps 2 and 3 are skipped when the sheet pull fails.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::Permissions;
use crate::error::{Error, Result};
use crate::model::{HistoryEntry, Section, Ticket};
use crate::sheets::{SheetAdapter, SheetBackend};
use crate::storage::{StoredTicket, TicketStore};
use crate::sync::cache::ClientCache;
use crate::sync::codec;
use crate::sync::events::{ChangeNotifier, SectionChanged};
use crate::sync::key::business_key;
use crate::sync::merge::{apply_store_pull, merge, reconcile_after_pull};
use crate::sync::seed::seed_section;
use crate::sync::types::{CycleReport, LegOutcome, MergePolicy, MutationOutcome, StepOutcome};

fn short_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Reconciliation context for one operator.
pub struct SyncSession<S, B> {
    store: S,
    sheets: SheetAdapter<B>,
    cache: ClientCache,
    notifier: ChangeNotifier,
    policy: MergePolicy,
    permissions: Permissions,
    actor: String,
}

impl<S: TicketStore, B: SheetBackend> SyncSession<S, B> {
    /// Create a session. Cached cctv records missing a case number get one.
    pub fn new(store: S, sheets: SheetAdapter<B>, cache: ClientCache, actor: &str) -> Self {
        let mut session = Self {
            store,
            sheets,
            cache,
            notifier: ChangeNotifier::new(),
            policy: MergePolicy::default(),
            permissions: Permissions::default(),
            actor: actor.to_string(),
        };
        if session.cache.ensure_case_numbers() > 0 {
            session.persist();
        }
        session
    }

    #[must_use]
    pub fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn sheets(&self) -> &SheetAdapter<B> {
        &self.sheets
    }

    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Receive a [`SectionChanged`] event whenever a collection changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SectionChanged> {
        self.notifier.subscribe()
    }

    /// Current collection of a section.
    pub fn tickets(&self, section: Section) -> &[Ticket] {
        self.cache.section(section)
    }

    /// Cached record holding `key`.
    pub fn find(&self, section: Section, key: &str) -> Option<&Ticket> {
        let key = key.trim();
        self.cache
            .section(section)
            .iter()
            .find(|t| !key.is_empty() && business_key(t) == key)
    }

    fn persist(&self) {
        if let Err(e) = self.cache.save() {
            warn!(error = %e, "Failed to persist client cache");
        }
    }

    /// Persist and announce the current state of a section.
    fn touch(&mut self, section: Section) {
        self.persist();
        let tickets = self.cache.section(section).to_vec();
        if self.notifier.publish(section, &tickets) {
            debug!(section = %section, count = tickets.len(), "Section changed");
        }
    }

    /// Replace a section wholesale, then persist and announce it.
    fn commit(&mut self, section: Section, tickets: Vec<Ticket>) {
        self.cache.replace(section, tickets);
        self.touch(section);
    }

    fn pull_store(&mut self, section: Section) -> Result<usize> {
        let tickets: Vec<Ticket> = self
            .store
            .list_tickets(section)?
            .into_iter()
            .map(StoredTicket::into_ticket)
            .collect();
        let count = tickets.len();
        let next = apply_store_pull(self.cache.section(section), tickets);
        self.commit(section, next);
        Ok(count)
    }

    /// Run one reconciliation cycle for a section.
    pub async fn run_cycle(&mut self, section: Section) -> CycleReport {
        let cycle_id = short_id();
        let span = info_span!("cycle", section = %section, cycle_id = %cycle_id);
        self.cycle_steps(section, cycle_id).instrument(span).await
    }

    async fn cycle_steps(&mut self, section: Section, cycle_id: String) -> CycleReport {
        let mut report = CycleReport::new(section, cycle_id);

        report.store_pull = match self.pull_store(section) {
            Ok(count) => StepOutcome::Done { count },
            Err(e) => {
                warn!(error = %e, "Store pull failed");
                StepOutcome::failed(&e)
            }
        };

        match self.sheets.pull(section).await {
            Ok(pulled) => {
                report.sheet_pull = StepOutcome::Done {
                    count: pulled.len(),
                };

                let current = self.cache.section(section);
                let mut merged = merge(current, &pulled, self.policy);
                // Keyless store rows take no part in the merge but stay listed.
                merged.extend(
                    current
                        .iter()
                        .filter(|t| t.is_store_origin() && business_key(t).is_empty())
                        .cloned(),
                );
                self.commit(section, merged);

                let before = self.cache.section(section).len();
                let kept = reconcile_after_pull(self.cache.section(section), &pulled);
                if kept.len() != before {
                    report.pruned = before - kept.len();
                    info!(pruned = report.pruned, "Dropped tickets removed from the sheet");
                    self.commit(section, kept);
                }
            }
            Err(e) => {
                warn!(error = %e, "Sheet pull failed, keeping cached rows");
                report.sheet_pull = StepOutcome::failed(&e);
            }
        }

        report.seed = seed_section(&mut self.store, &mut self.cache, section);
        if report.seed.seeded > 0 {
            self.persist();
            report.repull = match self.pull_store(section) {
                Ok(count) => StepOutcome::Done { count },
                Err(e) => {
                    warn!(error = %e, "Store re-pull after seeding failed");
                    StepOutcome::failed(&e)
                }
            };
        } else {
            report.repull = StepOutcome::skipped("nothing seeded");
        }

        report.total = self.cache.section(section).len();
        info!(total = report.total, clean = report.is_clean(), "Cycle finished");
        report
    }

    /// Run a cycle for every section in `sections`, on load and then every
    /// `interval`, until `shutdown` resolves.
    ///
    /// Missed ticks are delayed rather than bunched. Returns the number of
    /// completed passes.
    pub async fn watch<F>(
        &mut self,
        sections: &[Section],
        interval: Duration,
        shutdown: F,
        mut on_report: impl FnMut(&CycleReport),
    ) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut passes = 0;
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!(passes, "Watch stopped");
                    break;
                }
                _ = ticker.tick() => {
                    for &section in sections {
                        let report = self.run_cycle(section).await;
                        on_report(&report);
                    }
                    passes += 1;
                }
            }
        }
        passes
    }

    /// Prepare a submission and insert it into the cache optimistically.
    ///
    /// cctv records without a case number get the next cctv number. Other
    /// sections use the order number, or the shared counter if that is
    /// blank too.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` if the actor may not create in this section.
    /// Nothing is changed in that case.
    pub fn stage(&mut self, mut ticket: Ticket) -> Result<Ticket> {
        let section = ticket.section;
        self.permissions.check_create(section, &self.actor)?;

        if ticket.non_blank("caseNumber").is_none() {
            let number = match (section, ticket.non_blank("orderNumber")) {
                (Section::Cctv, _) | (_, None) => self.cache.next_case_number(section),
                (_, Some(order)) => order,
            };
            ticket.set("caseNumber", number);
        }
        if ticket.status.trim().is_empty() {
            ticket.status = section.default_status().to_string();
        }
        ticket.record_id = None;
        ticket.origin_tag = None;
        ticket.created_at = Some(now_rfc3339());
        ticket.set("createdBy", self.actor.clone());

        self.cache.section_mut(section).push(ticket.clone());
        self.touch(section);
        Ok(ticket)
    }

    /// Submit a new ticket: stage it locally, create it in the store,
    /// append it to the sheet, then run a cycle.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` before any change if the actor may not create.
    /// Backend failures are reported in the outcome instead.
    pub async fn submit(&mut self, ticket: Ticket) -> Result<MutationOutcome> {
        let staged = self.stage(ticket)?;
        let section = staged.section;
        let key = business_key(&staged);

        let mut record_id = None;
        let store = match self.store.create_ticket(
            section,
            Some(&staged.status),
            &staged.payload(),
            &self.actor,
        ) {
            Ok(row) => {
                record_id = Some(row.id);
                // The store already has it; seeding must not create it again.
                self.cache.mark_seeded(section, &key);
                self.persist();
                LegOutcome::Applied
            }
            Err(e) => {
                warn!(section = %section, key = %key, error = %e, "Store create failed");
                LegOutcome::failed(&e)
            }
        };

        let sheet = match self.sheets.append(&staged).await {
            Ok(()) => LegOutcome::Applied,
            Err(e) => {
                warn!(section = %section, key = %key, error = %e, "Sheet append failed");
                LegOutcome::failed(&e)
            }
        };

        let cycle = self.run_cycle(section).await;
        Ok(MutationOutcome {
            section,
            key,
            record_id,
            store,
            sheet,
            cycle: Some(cycle),
        })
    }

    /// Save status and/or action edits to a ticket.
    ///
    /// The cached record is updated first and kept whatever the backends
    /// answer. A store `NotFound` is a silent skip since sheet-origin
    /// records are legitimately absent from the store.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if nothing was requested or the key is blank,
    /// or `TicketNotFound` if no cached record holds the key.
    pub async fn save_edits(
        &mut self,
        section: Section,
        key: &str,
        status: Option<&str>,
        action_taken: Option<&str>,
    ) -> Result<MutationOutcome> {
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(Error::Validation("missing business key".to_string()));
        }
        if status.is_none() && action_taken.is_none() {
            return Err(Error::Validation("nothing to update".to_string()));
        }

        let record = self
            .cache
            .section_mut(section)
            .iter_mut()
            .find(|t| business_key(t) == key)
            .ok_or_else(|| Error::TicketNotFound { id: key.clone() })?;
        if let Some(status) = status {
            record.status = status.to_string();
        }
        if let Some(action) = action_taken {
            record.set("actionTaken", action);
            // time-table keeps its action in the note column
            let field = codec::layout(section).action_field();
            if field != "actionTaken" {
                record.set(field, action);
            }
        }
        record.last_modified = Some(now_rfc3339());
        let record_id = record.record_id;
        self.touch(section);

        let store = match record_id {
            Some(id) => match self.store.update_ticket(id, status, action_taken, &self.actor) {
                Ok(_) => LegOutcome::Applied,
                Err(e) if e.is_not_found() => {
                    warn!(section = %section, key = %key, record_id = id, "Ticket not in store, skipping store update");
                    LegOutcome::skipped("not in store")
                }
                Err(e) => {
                    warn!(section = %section, key = %key, error = %e, "Store update failed");
                    LegOutcome::failed(&e)
                }
            },
            None => {
                warn!(section = %section, key = %key, "Sheet-origin ticket, skipping store update");
                LegOutcome::skipped("sheet-origin ticket")
            }
        };

        let sheet = match self
            .sheets
            .update_by_key(section, &key, status, action_taken)
            .await
        {
            Ok(_) => LegOutcome::Applied,
            Err(e) => {
                warn!(section = %section, key = %key, error = %e, "Sheet update failed");
                LegOutcome::failed(&e)
            }
        };

        let cycle = self.run_cycle(section).await;
        Ok(MutationOutcome {
            section,
            key,
            record_id,
            store,
            sheet,
            cycle: Some(cycle),
        })
    }

    /// Delete a ticket from the cache, the store and the sheet.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` before any change unless the actor is the
    /// configured deleter, or `Validation` for a blank key.
    pub async fn delete(&mut self, section: Section, key: &str) -> Result<MutationOutcome> {
        self.permissions.check_delete(&self.actor)?;

        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(Error::Validation("missing business key".to_string()));
        }

        let record_id = self.find(section, &key).and_then(|t| t.record_id);
        self.cache
            .section_mut(section)
            .retain(|t| business_key(t) != key);
        self.touch(section);

        let store = match record_id {
            Some(id) => match self.store.delete_ticket(id, &self.actor) {
                Ok(()) => LegOutcome::Applied,
                Err(e) if e.is_not_found() => LegOutcome::skipped("already gone"),
                Err(e) => {
                    warn!(section = %section, key = %key, error = %e, "Store delete failed");
                    LegOutcome::failed(&e)
                }
            },
            None => LegOutcome::skipped("sheet-origin ticket"),
        };

        let sheet = match self.sheets.delete_by_key(section, &key).await {
            Ok(Some(_)) => LegOutcome::Applied,
            Ok(None) => LegOutcome::skipped("key not in sheet"),
            Err(e) => {
                warn!(section = %section, key = %key, error = %e, "Sheet delete failed");
                LegOutcome::failed(&e)
            }
        };

        let cycle = self.run_cycle(section).await;
        Ok(MutationOutcome {
            section,
            key,
            record_id,
            store,
            sheet,
            cycle: Some(cycle),
        })
    }

    /// Audit history of a store record, newest first.
    ///
    /// # Errors
    ///
    /// Returns a store error if the history cannot be read.
    pub fn history(&self, record_id: i64) -> Result<Vec<HistoryEntry>> {
        self.store.ticket_history(record_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::MemorySheet;
    use crate::storage::SqliteStorage;
    use crate::sync::codec;

    fn header(section: Section) -> Vec<String> {
        vec!["h".to_string(); codec::layout(section).width()]
    }

    fn session_with(sheet: MemorySheet, actor: &str) -> SyncSession<SqliteStorage, MemorySheet> {
        SyncSession::new(
            SqliteStorage::open_memory().unwrap(),
            SheetAdapter::new(sheet),
            ClientCache::in_memory(),
            actor,
        )
    }

    fn sheet_with(section: Section, tickets: &[Ticket]) -> MemorySheet {
        let sheet = MemorySheet::new();
        let mut rows = vec![header(section)];
        rows.extend(tickets.iter().map(codec::encode));
        sheet.set_tab(section.config().tab, rows);
        sheet
    }

    #[tokio::test]
    async fn test_cycle_seeds_sheet_rows_and_repulls() {
        let rows = [
            Ticket::new(Section::Ce).with("caseNumber", "CE-1").with("customerName", "Lina"),
            Ticket::new(Section::Ce).with("caseNumber", "CE-2"),
        ];
        let mut session = session_with(sheet_with(Section::Ce, &rows), "Anati");

        let report = session.run_cycle(Section::Ce).await;
        assert!(report.is_clean());
        assert_eq!(report.seed.seeded, 2);
        assert_eq!(report.repull, StepOutcome::Done { count: 2 });

        let tickets = session.tickets(Section::Ce);
        assert_eq!(tickets.len(), 2);
        assert!(tickets.iter().all(Ticket::is_store_origin));

        let again = session.run_cycle(Section::Ce).await;
        assert_eq!(again.seed.seeded, 0);
        assert_eq!(session.store().list_tickets(Section::Ce).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sheet_outage_keeps_cache() {
        let sheet = sheet_with(Section::Ce, &[Ticket::new(Section::Ce).with("caseNumber", "CE-1")]);
        let mut session = session_with(sheet, "Anati");
        session.run_cycle(Section::Ce).await;

        session.sheets().backend().set_offline(true);
        let report = session.run_cycle(Section::Ce).await;
        assert!(report.sheet_pull.is_failed());
        assert_eq!(report.store_pull, StepOutcome::Done { count: 1 });
        assert_eq!(session.tickets(Section::Ce).len(), 1);
    }

    #[tokio::test]
    async fn test_submit_requires_creator() {
        let mut session = session_with(sheet_with(Section::Ce, &[]), "guest");
        let err = session
            .submit(Ticket::new(Section::Ce).with("orderNumber", "55"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));
        assert!(session.tickets(Section::Ce).is_empty());
    }

    #[tokio::test]
    async fn test_submit_assigns_case_numbers() {
        let mut session = session_with(sheet_with(Section::Cctv, &[]), "Anati");

        let outcome = session.submit(Ticket::new(Section::Cctv)).await.unwrap();
        assert_eq!(outcome.key, "CCTV-1");
        assert_eq!(outcome.store, LegOutcome::Applied);
        assert_eq!(outcome.sheet, LegOutcome::Applied);

        let staged = session
            .stage(Ticket::new(Section::Ce).with("orderNumber", "7781"))
            .unwrap();
        assert_eq!(staged.text("caseNumber"), "7781");
        assert_eq!(staged.text("createdBy"), "Anati");

        let generated = session.stage(Ticket::new(Section::Complaints)).unwrap();
        assert_eq!(generated.text("caseNumber"), "COMPLAINTS-01001");
    }

    #[tokio::test]
    async fn test_submitted_ticket_is_not_seeded_twice() {
        let mut session = session_with(sheet_with(Section::Ce, &[]), "Anati");
        session.sheets().backend().set_offline(true);
        session
            .submit(Ticket::new(Section::Ce).with("caseNumber", "CE-9"))
            .await
            .unwrap();
        assert_eq!(session.store().list_tickets(Section::Ce).unwrap().len(), 1);
        assert!(session.find(Section::Ce, "CE-9").unwrap().is_store_origin());
    }

    #[tokio::test]
    async fn test_save_edits_on_sheet_origin_skips_store() {
        let sheet = sheet_with(Section::Ce, &[Ticket::new(Section::Ce).with("caseNumber", "CE-1")]);
        let mut session = session_with(sheet, "Anati");
        session.cache.replace(
            Section::Ce,
            vec![Ticket::new(Section::Ce).with("caseNumber", "CE-1")],
        );

        let outcome = session
            .save_edits(Section::Ce, "CE-1", Some("Escalated"), None)
            .await
            .unwrap();
        assert_eq!(outcome.store, LegOutcome::skipped("sheet-origin ticket"));
        assert_eq!(outcome.sheet, LegOutcome::Applied);
        assert_eq!(session.find(Section::Ce, "CE-1").unwrap().status, "Escalated");
    }

    #[tokio::test]
    async fn test_save_edits_validation() {
        let mut session = session_with(sheet_with(Section::Ce, &[]), "Anati");
        assert!(matches!(
            session.save_edits(Section::Ce, "CE-1", None, None).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            session.save_edits(Section::Ce, "CE-1", Some("Closed"), None).await,
            Err(Error::TicketNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_is_forbidden_for_others() {
        let sheet = sheet_with(Section::Ce, &[Ticket::new(Section::Ce).with("caseNumber", "CE-1")]);
        let mut session = session_with(sheet, "Mai");
        session.run_cycle(Section::Ce).await;

        let err = session.delete(Section::Ce, "CE-1").await.unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));
        assert_eq!(session.tickets(Section::Ce).len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_everywhere() {
        let sheet = sheet_with(Section::Ce, &[Ticket::new(Section::Ce).with("caseNumber", "CE-1")]);
        let mut session = session_with(sheet, "Anati");
        session.run_cycle(Section::Ce).await;
        let id = session.find(Section::Ce, "CE-1").unwrap().record_id.unwrap();

        let outcome = session.delete(Section::Ce, "CE-1").await.unwrap();
        assert_eq!(outcome.store, LegOutcome::Applied);
        assert_eq!(outcome.sheet, LegOutcome::Applied);
        assert!(session.tickets(Section::Ce).is_empty());
        assert!(session.store().list_tickets(Section::Ce).unwrap().is_empty());

        let history = session.history(id).unwrap();
        assert!(history[0].is_deletion());

        let again = session.delete(Section::Ce, "CE-1").await.unwrap();
        assert_eq!(again.sheet, LegOutcome::skipped("key not in sheet"));
        assert!(!again.has_failures());
    }

    #[tokio::test]
    async fn test_watch_runs_until_shutdown() {
        let mut session = session_with(sheet_with(Section::Ce, &[]), "Anati");
        let mut reports = 0;
        let passes = session
            .watch(
                &[Section::Ce, Section::Cctv],
                Duration::from_millis(10),
                tokio::time::sleep(Duration::from_millis(60)),
                |_| reports += 1,
            )
            .await;
        assert!(passes >= 1);
        assert_eq!(reports, passes * 2);
    }

    #[tokio::test]
    async fn test_changes_are_announced() {
        let sheet = sheet_with(Section::Ce, &[Ticket::new(Section::Ce).with("caseNumber", "CE-1")]);
        let mut session = session_with(sheet, "Anati");
        let mut rx = session.subscribe();
        session.run_cycle(Section::Ce).await;

        let event = rx.try_recv().unwrap();
        assert_eq!(event.section, Section::Ce);
    }

    #[tokio::test]
    async fn test_keyless_store_ticket_survives_sheet_merge() {
        let mut session = session_with(sheet_with(Section::Ce, &[]), "Anati");
        session
            .store_mut()
            .create_ticket(Section::Ce, None, &serde_json::json!({"branch": "Mall"}), "Anati")
            .unwrap();

        for _ in 0..2 {
            let report = session.run_cycle(Section::Ce).await;
            assert!(report.is_clean());
            assert_eq!(report.pruned, 0);
            let tickets = session.tickets(Section::Ce);
            assert_eq!(tickets.len(), 1);
            assert!(tickets[0].is_store_origin());
            assert_eq!(business_key(&tickets[0]), "");
        }
    }
}
