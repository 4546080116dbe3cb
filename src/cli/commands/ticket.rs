//! Ticket command implementations.

use crate::cli::commands::{open_session, render, runtime, DeskSession, Globals};
use crate::cli::{TicketCommands, TicketCreateArgs, TicketUpdateArgs};
use crate::error::{Error, Result};
use crate::model::{FieldValue, Section, Ticket};
use crate::storage::parse_ticket_id;
use crate::sync::codec::{self, ColumnKind};
use crate::sync::{business_key, MutationOutcome};
use crate::validate::{find_similar_keys, normalize_status};
use serde::Serialize;

#[derive(Serialize)]
struct ListOutput<'a> {
    section: Section,
    tickets: Vec<&'a Ticket>,
    count: usize,
}

#[derive(Serialize)]
struct HistoryOutput<'a> {
    record_id: i64,
    entries: &'a [crate::model::HistoryEntry],
    count: usize,
}

/// Execute ticket commands.
///
/// # Errors
///
/// Returns an error on invalid input, missing tickets, forbidden
/// operations, or if the session cannot be opened.
pub fn execute(command: &TicketCommands, globals: Globals<'_>) -> Result<()> {
    match command {
        TicketCommands::Create(args) => create(args, globals),
        TicketCommands::List {
            section,
            status,
            sync,
        } => list(*section, status.as_deref(), *sync, globals),
        TicketCommands::Show { section, key } => show(*section, key, globals),
        TicketCommands::Update(args) => update(args, globals),
        TicketCommands::Delete { section, key } => delete(*section, key, globals),
        TicketCommands::History { section, target } => history(*section, target, globals),
    }
}

/// Parse `name=value`. Comma-separated values become a list only for
/// columns the sheet stores as lists.
fn parse_field(section: Section, raw: &str) -> Result<(String, FieldValue)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| Error::InvalidArgument(format!("expected NAME=VALUE, got '{raw}'")))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidArgument(format!("missing field name in '{raw}'")));
    }

    let is_list = codec::layout(section)
        .columns
        .iter()
        .any(|c| c.field == name && c.kind == ColumnKind::List);
    let value = if is_list {
        FieldValue::List(codec::split_list(value))
    } else {
        FieldValue::Text(value.trim().to_string())
    };
    Ok((name.to_string(), value))
}

fn build_ticket(args: &TicketCreateArgs) -> Result<Ticket> {
    let section = args.section;
    let mut ticket = Ticket::new(section);
    for raw in &args.fields {
        let (name, value) = parse_field(section, raw)?;
        ticket.set(&name, value);
    }
    if let Some(case) = &args.case_number {
        ticket.set("caseNumber", case.trim());
    }
    if let Some(order) = &args.order_number {
        ticket.set("orderNumber", order.trim());
    }
    if let Some(status) = &args.status {
        ticket.status = normalize_status(section, status)?;
    }
    Ok(ticket)
}

fn report_outcome(verb: &str, outcome: &MutationOutcome, json: bool) -> Result<()> {
    if crate::is_silent() {
        println!("{}", outcome.key);
        return Ok(());
    }
    if json {
        println!("{}", serde_json::to_string(outcome)?);
    } else {
        render::print_outcome(verb, outcome);
    }
    Ok(())
}

fn create(args: &TicketCreateArgs, globals: Globals<'_>) -> Result<()> {
    let ticket = build_ticket(args)?;
    let (mut session, _config) = open_session(globals)?;
    let outcome = runtime()?.block_on(session.submit(ticket))?;
    report_outcome("Created", &outcome, globals.json)
}

fn list(section: Section, status: Option<&str>, sync: bool, globals: Globals<'_>) -> Result<()> {
    let status = status.map(|s| normalize_status(section, s)).transpose()?;
    let (mut session, _config) = open_session(globals)?;
    if sync {
        let report = runtime()?.block_on(session.run_cycle(section));
        tracing::debug!(clean = report.is_clean(), "Refreshed before listing");
    }

    let tickets: Vec<&Ticket> = session
        .tickets(section)
        .iter()
        .filter(|t| status.as_ref().is_none_or(|s| &t.status == s))
        .collect();

    if crate::is_silent() {
        for ticket in &tickets {
            println!("{}", business_key(ticket));
        }
        return Ok(());
    }

    if globals.json {
        let output = ListOutput {
            section,
            count: tickets.len(),
            tickets,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if tickets.is_empty() {
        println!("No tickets in {section}.");
    } else {
        render::print_ticket_list(section, &tickets);
    }
    Ok(())
}

/// Look a ticket up by key, suggesting close keys when it is missing.
fn lookup<'a>(session: &'a DeskSession, section: Section, key: &str) -> Result<&'a Ticket> {
    session
        .find(section, key)
        .ok_or_else(|| not_found(session, section, key))
}

fn not_found(session: &DeskSession, section: Section, key: &str) -> Error {
    let existing: Vec<String> = session.tickets(section).iter().map(business_key).collect();
    let similar = find_similar_keys(key.trim(), &existing, 3);
    if similar.is_empty() {
        Error::TicketNotFound {
            id: key.to_string(),
        }
    } else {
        Error::TicketNotFoundSimilar {
            id: key.to_string(),
            similar,
        }
    }
}

fn show(section: Section, key: &str, globals: Globals<'_>) -> Result<()> {
    let (session, _config) = open_session(globals)?;
    let ticket = lookup(&session, section, key)?;

    if globals.json {
        println!("{}", serde_json::to_string(ticket)?);
    } else {
        render::print_ticket(ticket);
    }
    Ok(())
}

fn update(args: &TicketUpdateArgs, globals: Globals<'_>) -> Result<()> {
    if args.status.is_none() && args.action.is_none() {
        return Err(Error::InvalidArgument(
            "nothing to update: pass --status and/or --action".to_string(),
        ));
    }
    let status = args
        .status
        .as_deref()
        .map(|s| normalize_status(args.section, s))
        .transpose()?;

    let (mut session, _config) = open_session(globals)?;
    lookup(&session, args.section, &args.key)?;
    let outcome = runtime()?.block_on(session.save_edits(
        args.section,
        &args.key,
        status.as_deref(),
        args.action.as_deref(),
    ))?;
    report_outcome("Updated", &outcome, globals.json)
}

fn delete(section: Section, key: &str, globals: Globals<'_>) -> Result<()> {
    let (mut session, _config) = open_session(globals)?;
    let outcome = runtime()?.block_on(session.delete(section, key))?;
    report_outcome("Deleted", &outcome, globals.json)
}

fn history(section: Section, target: &str, globals: Globals<'_>) -> Result<()> {
    let (session, _config) = open_session(globals)?;
    // Business keys win over record ids: free-orders keys are numeric.
    let record_id = match session.find(section, target) {
        Some(ticket) => ticket.record_id.ok_or_else(|| {
            Error::Validation(format!("{target} has not reached the store yet; no history"))
        })?,
        None => match parse_ticket_id(target) {
            Ok(id) => id,
            Err(_) => return Err(not_found(&session, section, target)),
        },
    };

    let entries = session.history(record_id)?;
    if globals.json {
        let output = HistoryOutput {
            record_id,
            entries: &entries,
            count: entries.len(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        render::print_history(&entries);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_splits_only_list_columns() {
        let (name, value) = parse_field(Section::Ce, "customerName=Lina, Sami").unwrap();
        assert_eq!(name, "customerName");
        assert_eq!(value, FieldValue::Text("Lina, Sami".to_string()));

        let (name, value) = parse_field(Section::Cctv, "cameras=Cam 1 , Cam 2").unwrap();
        assert_eq!(name, "cameras");
        assert_eq!(
            value,
            FieldValue::List(vec!["Cam 1".to_string(), "Cam 2".to_string()])
        );
    }

    #[test]
    fn test_parse_field_rejects_malformed_input() {
        assert!(matches!(
            parse_field(Section::Ce, "customerName"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            parse_field(Section::Ce, "=value"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_build_ticket_normalizes_status() {
        let args = TicketCreateArgs {
            section: Section::TimeTable,
            fields: vec!["branch=Abdoun".to_string()],
            case_number: None,
            order_number: Some(" 778 ".to_string()),
            status: None,
        };
        let ticket = build_ticket(&args).unwrap();
        assert_eq!(ticket.status, Section::TimeTable.default_status());
        assert_eq!(ticket.text("orderNumber"), "778");
        assert_eq!(ticket.text("branch"), "Abdoun");

        let bad = TicketCreateArgs {
            status: Some("definitely not a status".to_string()),
            ..args
        };
        assert!(matches!(
            build_ticket(&bad),
            Err(Error::InvalidStatus { .. })
        ));
    }
}
