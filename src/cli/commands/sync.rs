//! Sync and watch command implementations.

use crate::cli::commands::{open_session, render, runtime, Globals};
use crate::error::Result;
use crate::model::Section;
use crate::sync::CycleReport;
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
struct SyncOutput<'a> {
    reports: &'a [CycleReport],
    clean: bool,
}

fn targets(section: Option<Section>) -> Vec<Section> {
    section.map_or_else(|| Section::ALL.to_vec(), |s| vec![s])
}

/// Run one sync cycle for a section, or for every section.
///
/// A cycle never fails as a whole; per-step failures are reported.
///
/// # Errors
///
/// Returns an error if the session cannot be opened.
pub fn execute(section: Option<Section>, globals: Globals<'_>) -> Result<()> {
    let (mut session, _config) = open_session(globals)?;
    let rt = runtime()?;

    let mut reports = Vec::new();
    for section in targets(section) {
        reports.push(rt.block_on(session.run_cycle(section)));
    }

    if crate::is_silent() {
        return Ok(());
    }

    if globals.json {
        let output = SyncOutput {
            clean: reports.iter().all(CycleReport::is_clean),
            reports: &reports,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        for report in &reports {
            render::print_report(report);
        }
    }
    Ok(())
}

/// Run cycles periodically until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the session cannot be opened.
pub fn watch(sections: &[Section], interval: Option<u64>, globals: Globals<'_>) -> Result<()> {
    let (mut session, config) = open_session(globals)?;
    let rt = runtime()?;

    let sections = if sections.is_empty() {
        Section::ALL.to_vec()
    } else {
        sections.to_vec()
    };
    let interval = interval.map_or_else(|| config.poll_interval(), |s| Duration::from_secs(s.max(1)));

    if !globals.json && !crate::is_silent() {
        println!(
            "Watching {} every {}s (Ctrl-C to stop)",
            sections
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            interval.as_secs()
        );
    }

    let json = globals.json;
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let passes = rt.block_on(session.watch(&sections, interval, shutdown, |report| {
        if crate::is_silent() {
            return;
        }
        if json {
            if let Ok(line) = serde_json::to_string(report) {
                println!("{line}");
            }
        } else {
            render::print_report(report);
        }
    }));

    tracing::info!(passes, "Watch finished");
    Ok(())
}
