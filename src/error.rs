//! Error types for Crowd Desk.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=store, 3=not_found, 4=validation, 5=forbidden, 6=sheet, ...)
//! - Retryability flags (backend outages are retried by the next sync cycle)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use thiserror::Error;

/// Result type alias for Crowd Desk operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Which backing system an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// The relational ticket store.
    Store,
    /// The external spreadsheet.
    Sheet,
    /// The local client cache file.
    Cache,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store => write!(f, "store"),
            Self::Sheet => write!(f, "sheet"),
            Self::Cache => write!(f, "cache"),
        }
    }
}

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Store (exit 2)
    NotInitialized,
    StoreUnavailable,

    // Not Found (exit 3)
    TicketNotFound,
    KeyNotFound,

    // Validation (exit 4)
    ValidationError,
    InvalidArgument,
    UnknownSection,
    InvalidStatus,

    // Permission (exit 5)
    Forbidden,

    // Sheet (exit 6)
    SheetUnavailable,

    // Config (exit 7)
    ConfigError,

    // I/O and decoding (exit 8)
    IoError,
    JsonError,
    DecodeError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::TicketNotFound => "TICKET_NOT_FOUND",
            Self::KeyNotFound => "KEY_NOT_FOUND",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::UnknownSection => "UNKNOWN_SECTION",
            Self::InvalidStatus => "INVALID_STATUS",
            Self::Forbidden => "FORBIDDEN",
            Self::SheetUnavailable => "SHEET_UNAVAILABLE",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::DecodeError => "DECODE_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::StoreUnavailable => 2,
            Self::TicketNotFound | Self::KeyNotFound => 3,
            Self::ValidationError
            | Self::InvalidArgument
            | Self::UnknownSection
            | Self::InvalidStatus => 4,
            Self::Forbidden => 5,
            Self::SheetUnavailable => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError | Self::DecodeError => 8,
        }
    }

    /// Whether the same call may succeed later without changing the input.
    ///
    /// Backend outages are retryable; the periodic sync cycle is the retry
    /// mechanism, so callers never loop on these themselves.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable | Self::SheetUnavailable)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in Crowd Desk operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `crowd init` first")]
    NotInitialized,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown section: {0}")]
    UnknownSection(String),

    #[error("Invalid status '{status}' for section {section}")]
    InvalidStatus {
        section: String,
        status: String,
        suggestion: Option<String>,
    },

    #[error("Ticket not found: {id}")]
    TicketNotFound { id: String },

    #[error("Ticket not found: {id}")]
    TicketNotFoundSimilar { id: String, similar: Vec<String> },

    #[error("Key {key} not found in tab {tab}")]
    KeyNotFound { tab: String, key: String },

    #[error("{actor} is not permitted to {action}")]
    Forbidden { actor: String, action: String },

    #[error("{backend} unavailable: {reason}")]
    Unavailable { backend: Backend, reason: String },

    #[error("Malformed row: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for an outage of one backend.
    pub fn unavailable(backend: Backend, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            backend,
            reason: reason.into(),
        }
    }

    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::UnknownSection(_) => ErrorCode::UnknownSection,
            Self::InvalidStatus { .. } => ErrorCode::InvalidStatus,
            Self::TicketNotFound { .. } | Self::TicketNotFoundSimilar { .. } => {
                ErrorCode::TicketNotFound
            }
            Self::KeyNotFound { .. } => ErrorCode::KeyNotFound,
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::Unavailable {
                backend: Backend::Sheet,
                ..
            }
            | Self::Http(_) => ErrorCode::SheetUnavailable,
            Self::Unavailable { .. } | Self::Database(_) => ErrorCode::StoreUnavailable,
            Self::Decode(_) => ErrorCode::DecodeError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// True for "the thing you asked about does not exist" errors.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TicketNotFound { .. } | Self::TicketNotFoundSimilar { .. } | Self::KeyNotFound { .. }
        )
    }

    /// Context-aware recovery hint for humans and scripts.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `crowd init` to create the ticket database".to_string())
            }
            Self::UnknownSection(_) => Some(
                "Valid sections: cctv, ce, complaints, free-orders, time-table".to_string(),
            ),
            Self::InvalidStatus { suggestion, .. } => suggestion
                .as_ref()
                .map(|s| format!("Did you mean: {s}?")),
            Self::TicketNotFound { id } => Some(format!(
                "No ticket '{id}'. Use `crowd ticket list` to see the cached tickets."
            )),
            Self::TicketNotFoundSimilar { similar, .. } => {
                Some(format!("Did you mean: {}?", similar.join(", ")))
            }
            Self::KeyNotFound { tab, .. } => Some(format!(
                "The row may have been removed from '{tab}'. Run `crowd sync` to refresh."
            )),
            Self::Forbidden { .. } => Some(
                "Ask the configured owner to perform this action, or check `deleter` / `creators` in config.json"
                    .to_string(),
            ),
            Self::Unavailable {
                backend: Backend::Sheet,
                ..
            }
            | Self::Http(_) => Some(
                "Check sheets.spreadsheetId and sheets.accessToken (or CROWD_SHEET_ID / CROWD_SHEET_TOKEN). Local tickets stay visible meanwhile."
                    .to_string(),
            ),
            Self::Validation(_)
            | Self::InvalidArgument(_)
            | Self::Unavailable { .. }
            | Self::Decode(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
