//! Business sections and their static configuration.
//!
//! Every ticket belongs to exactly one [`Section`]. Per-section behaviour
//! (statuses, spreadsheet tab, card fields, case-number prefix) lives in a
//! single [`SectionConfig`] table that core logic reaches through
//! [`Section::config`]; nothing branches on a section name string.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of business sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Section {
    /// CCTV footage reviews.
    Cctv,
    /// Customer-experience follow-ups.
    Ce,
    /// Daily complaints.
    Complaints,
    /// Complimentary / discounted orders.
    FreeOrders,
    /// Plate returns and refunds.
    TimeTable,
}

impl Section {
    /// All sections in display order.
    pub const ALL: [Self; 5] = [
        Self::Cctv,
        Self::Ce,
        Self::FreeOrders,
        Self::Complaints,
        Self::TimeTable,
    ];

    /// Get the string representation used in storage, caches and the CLI.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cctv => "cctv",
            Self::Ce => "ce",
            Self::Complaints => "complaints",
            Self::FreeOrders => "free-orders",
            Self::TimeTable => "time-table",
        }
    }

    /// Static configuration for this section.
    #[must_use]
    pub const fn config(&self) -> &'static SectionConfig {
        match self {
            Self::Cctv => &CCTV,
            Self::Ce => &CE,
            Self::Complaints => &COMPLAINTS,
            Self::FreeOrders => &FREE_ORDERS,
            Self::TimeTable => &TIME_TABLE,
        }
    }

    /// Status used when a record carries none.
    #[must_use]
    pub const fn default_status(&self) -> &'static str {
        self.config().default_status
    }

    /// Whether `status` is one of this section's enumerated statuses.
    #[must_use]
    pub fn is_valid_status(&self, status: &str) -> bool {
        self.config().statuses.contains(&status)
    }

    /// Prefix used for generated case numbers, e.g. `TIME-TABLE`.
    ///
    /// Upper-cased section name with every run of non-alphanumerics
    /// collapsed to a single `-`.
    #[must_use]
    pub fn case_prefix(&self) -> String {
        let mut prefix = String::new();
        let mut in_gap = false;
        for c in self.as_str().chars() {
            if c.is_ascii_alphanumeric() {
                prefix.push(c.to_ascii_uppercase());
                in_gap = false;
            } else if !in_gap {
                prefix.push('-');
                in_gap = true;
            }
        }
        prefix
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cctv" => Ok(Self::Cctv),
            "ce" | "customer-experience" => Ok(Self::Ce),
            "complaints" => Ok(Self::Complaints),
            "free-orders" | "free_orders" | "complimentary" => Ok(Self::FreeOrders),
            "time-table" | "time_table" | "timetable" => Ok(Self::TimeTable),
            _ => Err(Error::UnknownSection(s.to_string())),
        }
    }
}

/// Colour family of a status band on a ticket card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Green,
    Red,
    Blue,
    Orange,
    Yellow,
    Navy,
    Grey,
}

/// Static per-section configuration.
#[derive(Debug)]
pub struct SectionConfig {
    /// Human label for headings.
    pub label: &'static str,
    /// Status assigned when a record has none.
    pub default_status: &'static str,
    /// Valid statuses in board column order.
    pub statuses: &'static [&'static str],
    /// Default spreadsheet tab.
    pub tab: &'static str,
    /// Cell range (without tab) pulled on every cycle; starts below the header.
    pub pull_range: &'static str,
    /// Fields shown on a collapsed card.
    pub card_fields: &'static [&'static str],
}

impl SectionConfig {
    /// Label shown for a stored status on cards and board columns.
    #[must_use]
    pub fn display_status<'a>(&self, status: &'a str) -> &'a str {
        match status {
            "Pending (Customer Call Required)" => "Pending (Call Back)",
            other => other,
        }
    }
}

/// Colour band for a status, shared by all sections.
#[must_use]
pub fn status_tone(status: &str) -> StatusTone {
    match status {
        "Closed" | "Taken" | "Returned" => StatusTone::Green,
        "Under Review" | "Not Active" => StatusTone::Red,
        "Pending (Customer Call Required)" | "Pending (Call Back)" | "Issue" => StatusTone::Orange,
        "No Answer" => StatusTone::Yellow,
        "Scheduled" => StatusTone::Navy,
        "No Call Needed" => StatusTone::Grey,
        _ => StatusTone::Blue,
    }
}

const CE_STATUSES: &[&str] = &[
    "Escalated",
    "Under Review",
    "Pending (Customer Call Required)",
    "Closed",
];

static CCTV: SectionConfig = SectionConfig {
    label: "CCTV",
    default_status: "Under Review",
    statuses: &["Escalated", "Under Review", "Closed"],
    tab: "CCTV_Sep2025",
    pull_range: "A2:M",
    card_fields: &["branch", "staff", "sections"],
};

static CE: SectionConfig = SectionConfig {
    label: "Customer Experience",
    default_status: "Under Review",
    statuses: CE_STATUSES,
    tab: "CircaCustomerExperience_Sep2025",
    pull_range: "A2:P",
    card_fields: &["customerName", "branch", "restaurant"],
};

static COMPLAINTS: SectionConfig = SectionConfig {
    label: "Complaints",
    default_status: "Under Review",
    statuses: CE_STATUSES,
    tab: "DailyComplaints_Sep2025",
    pull_range: "A2:N",
    card_fields: &["customerName", "branch", "issueCategory"],
};

static FREE_ORDERS: SectionConfig = SectionConfig {
    label: "Free Orders",
    default_status: "Active",
    statuses: &["Active", "Taken", "Not Active"],
    tab: "Complimentary",
    pull_range: "A2:M",
    card_fields: &["customerName", "orderNumber", "discountAmount"],
};

static TIME_TABLE: SectionConfig = SectionConfig {
    label: "Time Table",
    default_status: "Pending Call",
    statuses: &[
        "No Call Needed",
        "Pending Call",
        "No Answer",
        "Scheduled",
        "Issue",
        "Returned",
    ],
    tab: "ThymeTablePlates_Sep2025",
    pull_range: "A2:K",
    card_fields: &["customerName", "orderNumber", "phone"],
};
