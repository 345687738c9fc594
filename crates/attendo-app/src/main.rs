// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Attendo — event check-in desk with badge printing
//
// Entry point. Initialises logging, loads the client config and runs one
// command against the local label-printer daemon.

mod checkin;
mod data_dir;
mod store;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use attendo_core::config::ClientConfig;
use attendo_core::error::Result;
use attendo_core::human_errors::humanize_error;
use attendo_core::types::{BadgeContent, Participant};
use attendo_print::PrinterSession;

use checkin::{CheckinService, PrintStatus, StaticGate};
use store::InMemoryParticipantStore;

#[derive(Parser, Debug)]
#[command(name = "attendo", author, version, about, long_about = None)]
/// Check people in and print their badges on a local label printer
struct Cli {
    /// Client config file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Printer to use instead of the first one found
    #[arg(long, global = true)]
    printer: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List printers attached to the daemon
    Devices,
    /// Print a single badge
    Print {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        /// Identifier printed under the name
        #[arg(long)]
        id: String,
        #[arg(long)]
        department: Option<String>,
        /// Payload for the badge QR code
        #[arg(long)]
        qr: Option<String>,
    },
    /// Check a participant in from a roster file and print their badge
    Checkin {
        /// Roster file (JSON array of participants); updated in place
        #[arg(long)]
        roster: PathBuf,
        /// Scanned participant UUID
        uuid: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            let human = humanize_error(&e);
            eprintln!("{}\n{}", human.message, human.suggestion);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::load_or_default(data_dir::config_path()),
    };
    if cli.printer.is_some() {
        config.printer = cli.printer.clone();
    }
    info!(endpoint = %config.endpoint, "Attendo starting");

    let session = Arc::new(PrinterSession::new(config));
    let result = match cli.command {
        Command::Devices => list_devices(&session).await,
        Command::Print {
            first_name,
            last_name,
            id,
            department,
            qr,
        } => {
            let mut participant = Participant::new(&first_name, &last_name, &id);
            participant.department = department;
            let badge = BadgeContent {
                qr_payload: qr,
                ..participant.badge()
            };
            print_badge(&session, &badge).await
        }
        Command::Checkin { roster, uuid } => check_in(Arc::clone(&session), &roster, &uuid).await,
    };
    session.disconnect();
    result
}

async fn list_devices(session: &PrinterSession) -> Result<()> {
    session.connect().await?;
    session.initialize_device().await?;
    let devices = session.list_devices().await;
    if devices.is_empty() {
        println!("no printers found");
    }
    for device in devices {
        println!("{}\t{}", device.name, device.port);
    }
    Ok(())
}

async fn print_badge(session: &PrinterSession, badge: &BadgeContent) -> Result<()> {
    let preferred = session.config().printer.clone();
    let device = session.connect_and_select_first(preferred.as_deref()).await?;
    let outcome = session.print_badge(badge).await?;
    println!(
        "printed {} copy(ies) on {} in {:.1}s",
        outcome.copies,
        device.name,
        outcome.elapsed.as_secs_f64()
    );
    Ok(())
}

async fn check_in(session: Arc<PrinterSession>, roster: &Path, uuid: &str) -> Result<()> {
    let store = InMemoryParticipantStore::from_roster(roster)?;
    if store.is_empty() {
        warn!(roster = %roster.display(), "roster has no participants");
    }

    // A missing printer must not stop the check-in.
    let preferred = session.config().printer.clone();
    let printer = match session.connect_and_select_first(preferred.as_deref()).await {
        Ok(device) => {
            info!(printer = %device.name, "printer ready");
            Some(session)
        }
        Err(e) => {
            let human = humanize_error(&e);
            warn!(error = %e, "continuing check-in without a printer");
            eprintln!("warning: {} {}", human.message, human.suggestion);
            None
        }
    };

    let service = CheckinService::new(store, StaticGate(true), printer);
    let report = service.check_in(uuid).await?;
    service.store().save_roster(roster)?;

    let who = report.participant.display_name();
    if report.already_attended {
        println!("{who} was already checked in");
    } else {
        println!("{who} checked in");
    }
    match report.print {
        PrintStatus::Printed(outcome) => println!("badge printed ({} copy(ies))", outcome.copies),
        PrintStatus::Warning(warning) => {
            eprintln!("warning: badge not printed. {} {}", warning.message, warning.suggestion)
        }
        PrintStatus::Skipped => println!("badge not printed: no printer available"),
    }
    Ok(())
}
