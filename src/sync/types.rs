//! Types shared by the reconciliation cycle and user mutations.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::Section;

/// Precedence between pulled sheet values and store-managed values when a
/// sheet row is merged onto a store-origin record.
///
/// Only `status` and the action fields are affected; every other field
/// always takes the pulled sheet value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergePolicy {
    /// Store-origin records keep their store status and action.
    #[default]
    StoreAuthoritative,
    /// Sheet values overwrite everything, including status.
    SheetWins,
}

impl std::str::FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "storeauthoritative" | "store" => Ok(Self::StoreAuthoritative),
            "sheetwins" | "sheet" => Ok(Self::SheetWins),
            other => Err(format!("unknown merge policy: {other}")),
        }
    }
}

/// Statistics for one seeding pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SeedStats {
    /// Records created in the store.
    pub seeded: usize,
    /// Sheet-origin records already marked seeded.
    pub skipped: usize,
    /// Records whose create call failed (retried next cycle).
    pub failed: usize,
}

impl SeedStats {
    /// Total records considered.
    #[must_use]
    pub fn total(&self) -> usize {
        self.seeded + self.skipped + self.failed
    }
}

/// Outcome of one step of a reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step ran; `count` is the number of records it produced.
    Done { count: usize },
    Skipped { reason: String },
    Failed { code: String, message: String },
}

impl StepOutcome {
    /// Record a failure.
    #[must_use]
    pub fn failed(err: &Error) -> Self {
        Self::Failed {
            code: err.error_code().as_str().to_string(),
            message: err.to_string(),
        }
    }

    #[must_use]
    pub fn skipped(reason: &str) -> Self {
        Self::Skipped {
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Per-step results of one reconciliation cycle for one section.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub section: Section,
    /// Short identifier used in log spans.
    pub cycle_id: String,
    pub store_pull: StepOutcome,
    pub sheet_pull: StepOutcome,
    /// Sheet-origin records dropped because they vanished from the sheet.
    pub pruned: usize,
    pub seed: SeedStats,
    /// Store re-pull after seeding; skipped when nothing was seeded.
    pub repull: StepOutcome,
    /// Records in the section collection when the cycle ended.
    pub total: usize,
}

impl CycleReport {
    pub(crate) fn new(section: Section, cycle_id: String) -> Self {
        let pending = || StepOutcome::skipped("not run");
        Self {
            section,
            cycle_id,
            store_pull: pending(),
            sheet_pull: pending(),
            pruned: 0,
            seed: SeedStats::default(),
            repull: pending(),
            total: 0,
        }
    }

    /// True when no step failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.store_pull.is_failed()
            && !self.sheet_pull.is_failed()
            && !self.repull.is_failed()
            && self.seed.failed == 0
    }
}

/// Result of one backend leg of a user mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LegOutcome {
    Applied,
    Skipped { reason: String },
    Failed { code: String, message: String },
}

impl LegOutcome {
    #[must_use]
    pub fn failed(err: &Error) -> Self {
        Self::Failed {
            code: err.error_code().as_str().to_string(),
            message: err.to_string(),
        }
    }

    #[must_use]
    pub fn skipped(reason: &str) -> Self {
        Self::Skipped {
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl std::fmt::Display for LegOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Applied => write!(f, "ok"),
            Self::Skipped { reason } => write!(f, "skipped ({reason})"),
            Self::Failed { message, .. } => write!(f, "failed: {message}"),
        }
    }
}

/// Result of a submit, save or delete.
///
/// The optimistic local change is kept whatever the legs report.
#[derive(Debug, Clone, Serialize)]
pub struct MutationOutcome {
    pub section: Section,
    /// Business key of the affected record.
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<i64>,
    pub store: LegOutcome,
    pub sheet: LegOutcome,
    /// The cycle run after the mutation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle: Option<CycleReport>,
}

impl MutationOutcome {
    /// True if either backend rejected the change.
    #[must_use]
    pub const fn has_failures(&self) -> bool {
        self.store.is_failed() || self.sheet.is_failed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Backend;

    #[test]
    fn test_merge_policy_default() {
        assert_eq!(MergePolicy::default(), MergePolicy::StoreAuthoritative);
    }

    #[test]
    fn test_merge_policy_parse_and_serde() {
        assert_eq!("sheet-wins".parse::<MergePolicy>(), Ok(MergePolicy::SheetWins));
        assert_eq!(
            "storeAuthoritative".parse::<MergePolicy>(),
            Ok(MergePolicy::StoreAuthoritative)
        );
        assert!("newest".parse::<MergePolicy>().is_err());

        let json = serde_json::to_string(&MergePolicy::SheetWins).unwrap();
        assert_eq!(json, "\"sheetWins\"");
    }

    #[test]
    fn test_cycle_report_clean_until_a_step_fails() {
        let mut report = CycleReport::new(Section::Ce, "abc".into());
        assert!(report.is_clean());

        report.sheet_pull =
            StepOutcome::failed(&Error::unavailable(Backend::Sheet, "connection refused"));
        assert!(!report.is_clean());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["sheet_pull"]["outcome"], "failed");
        assert_eq!(json["sheet_pull"]["code"], "SHEET_UNAVAILABLE");
    }

    #[test]
    fn test_mutation_outcome_failures() {
        let outcome = MutationOutcome {
            section: Section::Cctv,
            key: "CCTV-1".into(),
            record_id: None,
            store: LegOutcome::Applied,
            sheet: LegOutcome::skipped("no business key"),
            cycle: None,
        };
        assert!(!outcome.has_failures());
        assert_eq!(outcome.sheet.to_string(), "skipped (no business key)");
    }
}
