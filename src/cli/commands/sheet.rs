//! Sheet command implementations.
//!
//! Reads the spreadsheet directly without merging into the local cache.

use crate::cli::commands::{open_session, render, runtime, Globals};
use crate::cli::SheetCommands;
use crate::error::Result;
use crate::model::{Section, Ticket};
use serde::Serialize;

#[derive(Serialize)]
struct PullOutput<'a> {
    section: Section,
    tab: &'a str,
    tickets: &'a [Ticket],
    count: usize,
}

/// Execute sheet commands.
///
/// # Errors
///
/// Returns an error if the sheet is unreachable.
pub fn execute(command: &SheetCommands, globals: Globals<'_>) -> Result<()> {
    match command {
        SheetCommands::Pull { section } => pull(*section, globals),
    }
}

fn pull(section: Section, globals: Globals<'_>) -> Result<()> {
    let (session, _config) = open_session(globals)?;
    let tickets = runtime()?.block_on(session.sheets().pull(section))?;

    if globals.json {
        let output = PullOutput {
            section,
            tab: session.sheets().tab(section),
            tickets: &tickets,
            count: tickets.len(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if tickets.is_empty() {
        println!("Tab '{}' has no rows.", session.sheets().tab(section));
    } else {
        let refs: Vec<&Ticket> = tickets.iter().collect();
        render::print_ticket_list(section, &refs);
    }
    Ok(())
}
