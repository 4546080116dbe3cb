//! Client cache: the locally persisted view of every section.
//!
//! The cache is one versioned JSON snapshot holding:
//! - the current collection of each section (fully replaced on every pass)
//! - the seeded-keys side table that makes seeding idempotent across runs
//! - the case-number counters
//!
//! Writes go through [`atomic_write`] so a crash never leaves a torn file.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{Section, Ticket};
use crate::sync::key::business_key;

/// Snapshot format version. A mismatch discards the file.
pub const CACHE_VERSION: u32 = 1;

const CCTV_COUNTER_START: u64 = 0;
const SHARED_COUNTER_START: u64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Counters {
    cctv: u64,
    shared: u64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            cctv: CCTV_COUNTER_START,
            shared: SHARED_COUNTER_START,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    version: u32,
    #[serde(default)]
    sections: BTreeMap<Section, Vec<Ticket>>,
    #[serde(default)]
    seeded: BTreeMap<Section, BTreeSet<String>>,
    #[serde(default)]
    counters: Counters,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            sections: BTreeMap::new(),
            seeded: BTreeMap::new(),
            counters: Counters::default(),
        }
    }
}

/// Locally persisted ticket collections.
#[derive(Debug, Clone, Default)]
pub struct ClientCache {
    path: Option<PathBuf>,
    snapshot: Snapshot,
}

impl ClientCache {
    /// Load the cache from `path`, starting empty if the file is missing,
    /// unreadable as JSON, or from another format version.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let snapshot = if path.exists() {
            let raw = fs::read_to_string(path)?;
            match serde_json::from_str::<Snapshot>(&raw) {
                Ok(s) if s.version == CACHE_VERSION => s,
                Ok(s) => {
                    warn!(path = %path.display(), found = s.version, expected = CACHE_VERSION,
                        "Client cache version mismatch, starting fresh");
                    Snapshot::default()
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Client cache unreadable, starting fresh");
                    Snapshot::default()
                }
            }
        } else {
            Snapshot::default()
        };

        debug!(path = %path.display(), "Loaded client cache");
        Ok(Self {
            path: Some(path.to_path_buf()),
            snapshot,
        })
    }

    /// A cache that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current collection of a section.
    #[must_use]
    pub fn section(&self, section: Section) -> &[Ticket] {
        self.snapshot
            .sections
            .get(&section)
            .map_or(&[], Vec::as_slice)
    }

    /// Replace a section's collection wholesale.
    pub fn replace(&mut self, section: Section, tickets: Vec<Ticket>) {
        self.snapshot.sections.insert(section, tickets);
    }

    /// Mutable access for optimistic local edits.
    pub fn section_mut(&mut self, section: Section) -> &mut Vec<Ticket> {
        self.snapshot.sections.entry(section).or_default()
    }

    #[must_use]
    pub fn was_seeded(&self, section: Section, key: &str) -> bool {
        self.snapshot
            .seeded
            .get(&section)
            .is_some_and(|keys| keys.contains(key))
    }

    /// Remember that `key` was created in the store. Idempotent.
    pub fn mark_seeded(&mut self, section: Section, key: &str) {
        self.snapshot
            .seeded
            .entry(section)
            .or_default()
            .insert(key.to_string());
    }

    /// Allocate the next case number for a section.
    ///
    /// cctv numbers are `CCTV-{n}` from their own counter. Every other
    /// section shares one counter and pads the serial to five digits.
    /// Numbers already held by a cached ticket of the section are skipped.
    pub fn next_case_number(&mut self, section: Section) -> String {
        loop {
            let counters = &mut self.snapshot.counters;
            let number = if section == Section::Cctv {
                counters.cctv += 1;
                format!("CCTV-{}", counters.cctv)
            } else {
                counters.shared += 1;
                format!("{}-{:05}", section.case_prefix(), counters.shared)
            };
            if !self.section(section).iter().any(|t| business_key(t) == number) {
                return number;
            }
        }
    }

    /// Give every cached cctv record without a case number a fresh one.
    ///
    /// Returns the number of records updated.
    pub fn ensure_case_numbers(&mut self) -> usize {
        let missing: Vec<usize> = self
            .section(Section::Cctv)
            .iter()
            .enumerate()
            .filter(|(_, t)| t.non_blank("caseNumber").is_none())
            .map(|(i, _)| i)
            .collect();

        for &i in &missing {
            let number = self.next_case_number(Section::Cctv);
            self.section_mut(Section::Cctv)[i].set("caseNumber", number);
        }
        missing.len()
    }

    /// Persist the snapshot. A cache without a path is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the file write fails.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string(&self.snapshot)?;
        atomic_write(path, &json)?;
        Ok(())
    }
}

/// Write content to a file atomically.
///
/// Content goes to a sibling `.tmp` file which is synced to disk and then
/// renamed over the target, so the original survives any failure.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &str) -> std::io::Result<()> {
    let temp_path = path.with_extension("json.tmp");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_case_number_counters() {
        let mut cache = ClientCache::in_memory();
        assert_eq!(cache.next_case_number(Section::Cctv), "CCTV-1");
        assert_eq!(cache.next_case_number(Section::Cctv), "CCTV-2");
        assert_eq!(cache.next_case_number(Section::TimeTable), "TIME-TABLE-01001");
        assert_eq!(cache.next_case_number(Section::FreeOrders), "FREE-ORDERS-01002");
        assert_eq!(cache.next_case_number(Section::Ce), "CE-01003");
    }

    #[test]
    fn test_case_number_skips_numbers_already_cached() {
        let mut cache = ClientCache::in_memory();
        cache.replace(
            Section::Cctv,
            vec![
                Ticket::new(Section::Cctv).with("caseNumber", "CCTV-1"),
                Ticket::new(Section::Cctv).with("caseNumber", "CCTV-2"),
            ],
        );
        assert_eq!(cache.next_case_number(Section::Cctv), "CCTV-3");
    }

    #[test]
    fn test_ensure_case_numbers_only_fills_cctv() {
        let mut cache = ClientCache::in_memory();
        cache.replace(
            Section::Cctv,
            vec![
                Ticket::new(Section::Cctv),
                Ticket::new(Section::Cctv).with("caseNumber", "CCTV-9"),
            ],
        );
        cache.replace(Section::Ce, vec![Ticket::new(Section::Ce)]);

        assert_eq!(cache.ensure_case_numbers(), 1);
        assert_eq!(cache.section(Section::Cctv)[0].text("caseNumber"), "CCTV-1");
        assert_eq!(cache.section(Section::Ce)[0].text("caseNumber"), "");
        assert_eq!(cache.ensure_case_numbers(), 0);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache").join("tickets.json");

        let mut cache = ClientCache::load(&path).unwrap();
        cache.replace(
            Section::Ce,
            vec![Ticket::new(Section::Ce).with("caseNumber", "CE-01001")],
        );
        cache.mark_seeded(Section::Ce, "CE-01001");
        cache.next_case_number(Section::Ce);
        cache.save().unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let mut reloaded = ClientCache::load(&path).unwrap();
        assert_eq!(reloaded.section(Section::Ce).len(), 1);
        assert!(reloaded.was_seeded(Section::Ce, "CE-01001"));
        assert!(!reloaded.was_seeded(Section::Cctv, "CE-01001"));
        assert_eq!(reloaded.next_case_number(Section::Ce), "CE-01002");
    }

    #[test]
    fn test_version_mismatch_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tickets.json");
        fs::write(&path, r#"{"version":99,"sections":{"ce":[]}}"#).unwrap();

        let cache = ClientCache::load(&path).unwrap();
        assert!(cache.section(Section::Ce).is_empty());
        assert_eq!(cache.path(), Some(path.as_path()));
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let cache = ClientCache::in_memory();
        assert!(cache.save().is_ok());
        assert!(cache.path().is_none());
    }
}
