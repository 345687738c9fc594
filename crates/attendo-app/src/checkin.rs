// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Check-in desk flow: authorize, resolve the scanned participant, record
// attendance, then print a badge.
//
// Attendance is committed before printing starts and is never undone by a
// print failure; the failure comes back as a warning next to the check-in.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use attendo_core::error::{AttendoError, Result};
use attendo_core::human_errors::{HumanError, humanize_error};
use attendo_core::types::{Participant, PrintOutcome};
use attendo_print::PrinterSession;

/// Source of registered participants.
pub trait ParticipantStore: Send + Sync {
    /// Look up a participant by the scanned identifier. `Ok(None)` when
    /// nobody matches.
    fn get_by_identifier(&self, identifier: &str) -> Result<Option<Participant>>;

    /// Record attendance and return the updated participant.
    fn mark_attended(&self, identifier: &str) -> Result<Participant>;
}

/// Whether the current operator may check people in.
pub trait AuthorizationGate: Send + Sync {
    fn is_authorized(&self) -> bool;
}

/// Gate with a fixed answer, for the command line and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticGate(pub bool);

impl AuthorizationGate for StaticGate {
    fn is_authorized(&self) -> bool {
        self.0
    }
}

/// What happened to the badge.
#[derive(Debug, Clone, PartialEq)]
pub enum PrintStatus {
    Printed(PrintOutcome),
    /// Check-in succeeded but the badge did not print.
    Warning(HumanError),
    /// No printer configured for this desk.
    Skipped,
}

/// Result of one check-in.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckinReport {
    pub participant: Participant,
    /// The participant had already been checked in before this scan.
    pub already_attended: bool,
    pub print: PrintStatus,
}

pub struct CheckinService<S, A> {
    store: S,
    gate: A,
    printer: Option<Arc<PrinterSession>>,
}

impl<S: ParticipantStore, A: AuthorizationGate> CheckinService<S, A> {
    pub fn new(store: S, gate: A, printer: Option<Arc<PrinterSession>>) -> Self {
        Self {
            store,
            gate,
            printer,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Check in the participant behind `identifier` and print their badge.
    ///
    /// A repeat scan keeps the original attendance time and reprints.
    #[instrument(skip(self))]
    pub async fn check_in(&self, identifier: &str) -> Result<CheckinReport> {
        if !self.gate.is_authorized() {
            warn!("check-in attempted without authorization");
            return Err(AttendoError::Unauthorized);
        }

        let identifier = identifier.trim();
        let found = self
            .store
            .get_by_identifier(identifier)?
            .ok_or_else(|| AttendoError::ParticipantNotFound(identifier.to_string()))?;

        let already_attended = found.has_attended();
        let participant = if already_attended {
            info!(participant = %found.uuid, "participant already checked in");
            found
        } else {
            let updated = self.store.mark_attended(identifier)?;
            info!(participant = %updated.uuid, "attendance recorded");
            updated
        };

        let print = self.print_badge(&participant).await;
        Ok(CheckinReport {
            participant,
            already_attended,
            print,
        })
    }

    async fn print_badge(&self, participant: &Participant) -> PrintStatus {
        let Some(printer) = &self.printer else {
            return PrintStatus::Skipped;
        };
        match printer.print_badge(&participant.badge()).await {
            Ok(outcome) => PrintStatus::Printed(outcome),
            Err(e) => {
                warn!(participant = %participant.uuid, error = %e, "badge print failed");
                PrintStatus::Warning(humanize_error(&e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryParticipantStore;
    use attendo_core::config::ClientConfig;
    use attendo_core::human_errors::Severity;

    fn desk(
        participants: Vec<Participant>,
        printer: Option<Arc<PrinterSession>>,
    ) -> CheckinService<InMemoryParticipantStore, StaticGate> {
        CheckinService::new(
            InMemoryParticipantStore::new(participants),
            StaticGate(true),
            printer,
        )
    }

    #[tokio::test]
    async fn print_failure_does_not_roll_back_attendance() {
        let jane = Participant::new("Jane", "Doe", "EMP001");
        let id = jane.uuid.to_string();
        let printer = Arc::new(PrinterSession::new(ClientConfig::default()));
        let service = desk(vec![jane], Some(printer));

        let report = service.check_in(&id).await.unwrap();

        assert!(!report.already_attended);
        assert!(report.participant.has_attended());
        match report.print {
            PrintStatus::Warning(warning) => assert_eq!(warning.severity, Severity::ActionRequired),
            other => panic!("expected a warning, got {other:?}"),
        }
        let stored = service.store().get_by_identifier(&id).unwrap().unwrap();
        assert!(stored.has_attended());
    }

    #[tokio::test]
    async fn no_printer_skips_badge() {
        let jane = Participant::new("Jane", "Doe", "EMP001");
        let id = jane.uuid.to_string();
        let service = desk(vec![jane], None);

        let report = service.check_in(&id).await.unwrap();
        assert_eq!(report.print, PrintStatus::Skipped);
    }

    #[tokio::test]
    async fn repeat_scan_keeps_first_attendance_time() {
        let jane = Participant::new("Jane", "Doe", "EMP001");
        let id = jane.uuid.to_string();
        let service = desk(vec![jane], None);

        let first = service.check_in(&id).await.unwrap();
        let second = service.check_in(&id).await.unwrap();

        assert!(second.already_attended);
        assert_eq!(
            first.participant.attended_at,
            second.participant.attended_at
        );
    }

    #[tokio::test]
    async fn unknown_participant_is_rejected() {
        let service = desk(Vec::new(), None);
        assert!(matches!(
            service.check_in("1b4e28ba-2fa1-11d2-883f-0016d3cca427").await,
            Err(AttendoError::ParticipantNotFound(_))
        ));
    }

    #[tokio::test]
    async fn unauthorized_operator_changes_nothing() {
        let jane = Participant::new("Jane", "Doe", "EMP001");
        let id = jane.uuid.to_string();
        let service = CheckinService::new(
            InMemoryParticipantStore::new([jane]),
            StaticGate(false),
            None,
        );

        assert!(matches!(
            service.check_in(&id).await,
            Err(AttendoError::Unauthorized)
        ));
        let stored = service.store().get_by_identifier(&id).unwrap().unwrap();
        assert!(!stored.has_attended());
    }
}
