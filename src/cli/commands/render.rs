//! Terminal rendering of tickets, cycle reports and mutation outcomes.

use colored::{Color, Colorize};

use crate::model::{status_tone, HistoryEntry, Section, StatusTone, Ticket};
use crate::sync::codec;
use crate::sync::{business_key, CycleReport, LegOutcome, MutationOutcome, StepOutcome};

const fn tone_color(tone: StatusTone) -> Color {
    match tone {
        StatusTone::Green => Color::Green,
        StatusTone::Red => Color::Red,
        StatusTone::Blue => Color::BrightBlue,
        StatusTone::Orange => Color::TrueColor {
            r: 255,
            g: 153,
            b: 0,
        },
        StatusTone::Yellow => Color::Yellow,
        StatusTone::Navy => Color::Blue,
        StatusTone::Grey => Color::BrightBlack,
    }
}

fn status_label(section: Section, status: &str) -> String {
    let label = section.config().display_status(status);
    format!("[{label}]")
        .color(tone_color(status_tone(status)))
        .to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}...")
    } else {
        s.to_string()
    }
}

/// Collapsed cards, grouped by status in board column order.
pub fn print_ticket_list(section: Section, tickets: &[&Ticket]) {
    let config = section.config();
    println!(
        "{} ({} tickets)",
        config.label.cyan().bold(),
        tickets.len()
    );

    let known = |t: &&&Ticket| config.statuses.contains(&t.status.as_str());
    let mut columns: Vec<(&str, Vec<&Ticket>)> = config
        .statuses
        .iter()
        .map(|status| {
            let cards = tickets
                .iter()
                .filter(|t| t.status == *status)
                .copied()
                .collect();
            (*status, cards)
        })
        .collect();
    let other: Vec<&Ticket> = tickets.iter().filter(|t| !known(t)).copied().collect();
    if !other.is_empty() {
        columns.push(("Other", other));
    }

    for (status, cards) in columns {
        if cards.is_empty() {
            continue;
        }
        println!();
        println!("{} {}", status_label(section, status), cards.len().to_string().dimmed());
        for ticket in cards {
            print_card(ticket);
        }
    }
}

fn print_card(ticket: &Ticket) {
    let origin = if ticket.is_store_origin() { "●" } else { "○" };
    let id = ticket
        .record_id
        .map(|id| format!("#{id}"))
        .unwrap_or_default();
    println!("  {origin} {} {}", business_key(ticket).bold(), id.dimmed());

    let main: Vec<String> = ticket
        .section
        .config()
        .card_fields
        .iter()
        .filter_map(|field| ticket.non_blank(field).map(|v| truncate(&v, 40)))
        .collect();
    if !main.is_empty() {
        println!("      {}", main.join(" · "));
    }
    if let Some(action) = ticket.non_blank(codec::layout(ticket.section).action_field()) {
        println!("      {} {}", "action:".dimmed(), truncate(&action, 60));
    }
}

/// Every field of one ticket.
pub fn print_ticket(ticket: &Ticket) {
    println!(
        "{} {}",
        business_key(ticket).bold(),
        status_label(ticket.section, &ticket.status)
    );
    println!();
    println!("Section:  {}", ticket.section.config().label);
    match ticket.record_id {
        Some(id) => println!("Record:   #{id}"),
        None => println!("Record:   {}", "not in store yet".dimmed()),
    }
    if let Some(created) = &ticket.created_at {
        println!("Created:  {created}");
    }
    if let Some(modified) = &ticket.last_modified {
        println!("Modified: {modified}");
    }
    println!();
    for (field, value) in &ticket.fields {
        if !value.is_blank() {
            println!("  {:<22} {}", format!("{field}:").dimmed(), value.as_cell());
        }
    }
}

fn step(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Done { count } => format!("{count}").green().to_string(),
        StepOutcome::Skipped { reason } => format!("skipped ({reason})").dimmed().to_string(),
        StepOutcome::Failed { message, .. } => format!("failed: {message}").red().to_string(),
    }
}

pub fn print_report(report: &CycleReport) {
    let marker = if report.is_clean() {
        "✓".green()
    } else {
        "!".yellow()
    };
    println!(
        "{marker} {} {} tickets {}",
        report.section.to_string().bold(),
        report.total,
        format!("(cycle {})", report.cycle_id).dimmed()
    );
    println!("    store: {}  sheet: {}", step(&report.store_pull), step(&report.sheet_pull));
    if report.pruned > 0 {
        println!("    removed from sheet: {}", report.pruned);
    }
    if report.seed.total() > 0 {
        println!(
            "    seeded: {}  already seeded: {}  failed: {}",
            report.seed.seeded, report.seed.skipped, report.seed.failed
        );
    }
}

fn leg(outcome: &LegOutcome) -> String {
    match outcome {
        LegOutcome::Applied => outcome.to_string().green().to_string(),
        LegOutcome::Skipped { .. } => outcome.to_string().dimmed().to_string(),
        LegOutcome::Failed { .. } => outcome.to_string().red().to_string(),
    }
}

pub fn print_outcome(verb: &str, outcome: &MutationOutcome) {
    println!("{verb} {} in {}", outcome.key.bold(), outcome.section);
    println!("  store: {}", leg(&outcome.store));
    println!("  sheet: {}", leg(&outcome.sheet));
    if outcome.has_failures() {
        println!(
            "  {}",
            "Kept locally; the next sync cycle will reconcile.".yellow()
        );
    }
}

pub fn print_history(entries: &[HistoryEntry]) {
    if entries.is_empty() {
        println!("No history.");
        return;
    }
    for entry in entries {
        let when = chrono::DateTime::from_timestamp_millis(entry.changed_at)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let status = match (&entry.prev_status, &entry.new_status) {
            (Some(prev), Some(new)) if prev != new => format!("{prev} → {new}"),
            (_, Some(new)) => new.clone(),
            _ => String::new(),
        };
        let line = format!("{when}  {:<10} {status}", entry.changed_by);
        if entry.is_deletion() {
            println!("{}", line.red());
        } else {
            println!("{line}");
        }
        if let Some(action) = &entry.new_action {
            if entry.prev_action.as_ref() != Some(action) {
                println!("    {} {action}", "action:".dimmed());
            }
        }
    }
}
