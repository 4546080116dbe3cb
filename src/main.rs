//! Crowd Desk CLI entry point.

use clap::Parser;
use crowd::cli::commands::{self, Globals};
use crowd::cli::{Cli, Commands, OutputFormat};
use crowd::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.silent {
        crowd::SILENT.store(true, std::sync::atomic::Ordering::Relaxed);
    }
    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR --format json OR non-TTY stdout
    let json = cli.json
        || cli.format == OutputFormat::Json
        || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info,reqwest=info,hyper=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let globals = Globals {
        db: cli.db.as_ref(),
        cache: cli.cache.as_ref(),
        actor: cli.actor.as_deref(),
        json,
    };

    match &cli.command {
        Commands::Init { force } => commands::init::execute(*force, globals),
        Commands::Version => commands::version::execute(json),

        Commands::Sync { section } => commands::sync::execute(*section, globals),
        Commands::Watch { sections, interval } => {
            commands::sync::watch(sections, *interval, globals)
        }

        Commands::Ticket { command } => commands::ticket::execute(command, globals),
        Commands::Sheet { command } => commands::sheet::execute(command, globals),

        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}
