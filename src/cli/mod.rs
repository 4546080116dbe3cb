//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::model::Section;

/// Output format for list/query commands.
#[derive(ValueEnum, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable cards (default)
    #[default]
    Table,
    /// JSON (same as --json)
    Json,
}

pub mod commands;

/// Crowd Desk - customer ticket desk reconciled across a store and a spreadsheet
#[derive(Parser, Debug)]
#[command(name = "crowd", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.crowd-desk/data/tickets.db)
    #[arg(long, global = true, env = "CROWD_DB")]
    pub db: Option<PathBuf>,

    /// Client cache path (default: ~/.crowd-desk/cache/tickets.json)
    #[arg(long, global = true, env = "CROWD_CACHE")]
    pub cache: Option<PathBuf>,

    /// Acting operator, recorded in ticket history
    #[arg(long, global = true, env = "CROWD_ACTOR")]
    pub actor: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Output format (table, json)
    #[arg(long, value_enum, global = true, default_value_t)]
    pub format: OutputFormat,

    /// Output only the business key
    #[arg(long, global = true)]
    pub silent: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Parse a section name or alias for clap.
fn parse_section(s: &str) -> std::result::Result<Section, String> {
    s.parse::<Section>().map_err(|e| e.to_string())
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the ticket database and default config
    Init {
        /// Recreate the database file even if it exists
        #[arg(long)]
        force: bool,
    },

    /// Print version information
    Version,

    /// Run one reconciliation cycle
    Sync {
        /// Only this section (default: all)
        #[arg(value_parser = parse_section)]
        section: Option<Section>,
    },

    /// Reconcile on load and then on a fixed interval until Ctrl-C
    Watch {
        /// Sections to watch (default: all)
        #[arg(value_parser = parse_section)]
        sections: Vec<Section>,

        /// Seconds between cycles (default: pollIntervalSecs from config)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Ticket management
    Ticket {
        #[command(subcommand)]
        command: TicketCommands,
    },

    /// Spreadsheet diagnostics
    Sheet {
        #[command(subcommand)]
        command: SheetCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Ticket Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum TicketCommands {
    /// Submit a new ticket
    Create(TicketCreateArgs),

    /// List cached tickets of a section
    List {
        #[arg(value_parser = parse_section)]
        section: Section,

        /// Only tickets in this status
        #[arg(long, short)]
        status: Option<String>,

        /// Refresh with a sync cycle first
        #[arg(long)]
        sync: bool,
    },

    /// Show one ticket
    Show {
        #[arg(value_parser = parse_section)]
        section: Section,

        /// Business key (case or order number)
        key: String,
    },

    /// Change the status and/or action taken
    Update(TicketUpdateArgs),

    /// Delete a ticket from the store and the sheet
    Delete {
        #[arg(value_parser = parse_section)]
        section: Section,

        /// Business key (case or order number)
        key: String,
    },

    /// Show the store history of a ticket
    History {
        #[arg(value_parser = parse_section)]
        section: Section,

        /// Business key, or the store record id
        target: String,
    },
}

#[derive(Args, Debug)]
pub struct TicketCreateArgs {
    #[arg(value_parser = parse_section)]
    pub section: Section,

    /// Field value as name=value (repeatable); lists use commas
    #[arg(long = "field", short = 'f', value_name = "NAME=VALUE")]
    pub fields: Vec<String>,

    /// Case number (generated when omitted)
    #[arg(long)]
    pub case_number: Option<String>,

    #[arg(long)]
    pub order_number: Option<String>,

    /// Initial status (default: the section default)
    #[arg(long, short)]
    pub status: Option<String>,
}

#[derive(Args, Debug)]
pub struct TicketUpdateArgs {
    #[arg(value_parser = parse_section)]
    pub section: Section,

    /// Business key (case or order number)
    pub key: String,

    /// New status
    #[arg(long, short)]
    pub status: Option<String>,

    /// Action taken
    #[arg(long, short)]
    pub action: Option<String>,
}

// ============================================================================
// Sheet Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SheetCommands {
    /// Decode and print a section's rows without touching the cache
    Pull {
        #[arg(value_parser = parse_section)]
        section: Section,
    },
}
