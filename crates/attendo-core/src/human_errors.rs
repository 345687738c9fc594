// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable messages for check-in desk staff.
//
// Badge printing never blocks a check-in, so every printer failure has to be
// shown as a short warning the person at the desk can act on.

use crate::error::AttendoError;

/// Severity of an error from the desk operator's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Connection blip or timeout; printing again will probably work.
    Transient,
    /// Someone has to touch the printer (paper, cover, power).
    ActionRequired,
    /// Retrying will not help without a configuration or software change.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    pub retriable: bool,
    pub severity: Severity,
}

impl HumanError {
    fn new(message: &str, suggestion: &str, retriable: bool, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            retriable,
            severity,
        }
    }
}

/// Convert an `AttendoError` into a `HumanError` for the check-in desk.
pub fn humanize_error(err: &AttendoError) -> HumanError {
    match err {
        AttendoError::NotConnected | AttendoError::Transport(_) => HumanError::new(
            "The label printer service isn't running.",
            "Start the printer service on this computer, wait a few seconds, then print again.",
            true,
            Severity::Transient,
        ),

        AttendoError::Timeout { .. } => HumanError::new(
            "The label printer didn't answer in time.",
            "Check the printer is switched on and connected, then print again.",
            true,
            Severity::Transient,
        ),

        AttendoError::Daemon { message, .. } => humanize_daemon_message(message),

        AttendoError::Protocol(_) => HumanError::new(
            "The printer service sent something we didn't understand.",
            "Restart the printer service. If this keeps happening, the service may need updating.",
            true,
            Severity::Transient,
        ),

        AttendoError::NotReady | AttendoError::SdkNotInitialised => HumanError::new(
            "No label printer is selected.",
            "Choose a printer in the printer settings, then print again.",
            false,
            Severity::ActionRequired,
        ),

        AttendoError::DeviceUnavailable(name) => HumanError {
            message: format!("The printer \"{name}\" isn't available."),
            suggestion: "Make sure it's plugged in and switched on, then select it again.".into(),
            retriable: true,
            severity: Severity::ActionRequired,
        },

        AttendoError::JobInProgress => HumanError::new(
            "Another badge is still printing.",
            "Wait for the current badge to come out, then print again.",
            true,
            Severity::Transient,
        ),

        AttendoError::JobTimedOut { .. } => HumanError::new(
            "The badge may not have printed.",
            "Check whether a label came out. If not, print the badge again.",
            true,
            Severity::Transient,
        ),

        AttendoError::JobFailed { message, .. } => humanize_daemon_message(message),

        AttendoError::Unsupported(_) => HumanError::new(
            "This printer service can't print badges.",
            "Install the printer service version that came with the label printer.",
            false,
            Severity::Permanent,
        ),

        AttendoError::ParticipantNotFound(_) => HumanError::new(
            "We couldn't find this person.",
            "Check the QR code belongs to this event, or search for the person by name.",
            false,
            Severity::ActionRequired,
        ),

        AttendoError::Unauthorized => HumanError::new(
            "You're not signed in.",
            "Sign in as event staff, then scan again.",
            false,
            Severity::ActionRequired,
        ),

        AttendoError::Store(_) => HumanError::new(
            "The attendee list couldn't be updated.",
            "Try again. If this keeps happening, check the attendee database.",
            true,
            Severity::Transient,
        ),

        AttendoError::Config(detail) => HumanError {
            message: "The printer settings are invalid.".into(),
            suggestion: format!("Fix the printer configuration file. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        AttendoError::Io(_) | AttendoError::Serialization(_) => HumanError::new(
            "A settings or attendee file couldn't be read.",
            "Check the file exists and is valid, then try again.",
            false,
            Severity::Permanent,
        ),
    }
}

/// Map a daemon status string onto a desk-level message.
fn humanize_daemon_message(detail: &str) -> HumanError {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("cover") || lower.contains("lid") {
        HumanError::new(
            "The printer lid is open.",
            "Close the printer lid firmly, then print again.",
            true,
            Severity::ActionRequired,
        )
    } else if lower.contains("paper") || lower.contains("label") || lower.contains("media") {
        HumanError::new(
            "The printer is out of labels or they're loaded wrongly.",
            "Load a new roll of labels, then print again.",
            true,
            Severity::ActionRequired,
        )
    } else if lower.contains("battery") || lower.contains("power") {
        HumanError::new(
            "The printer's battery is low.",
            "Plug the printer in to charge, then print again.",
            true,
            Severity::ActionRequired,
        )
    } else if lower.contains("busy") {
        HumanError::new(
            "The printer is busy.",
            "Wait a moment, then print again.",
            true,
            Severity::Transient,
        )
    } else {
        HumanError {
            message: "The printer reported a problem.".into(),
            suggestion: format!("Try printing again. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timeout_is_transient() {
        let err = AttendoError::Timeout {
            operation: "startJob".into(),
            after: Duration::from_secs(10),
        };
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.retriable);
    }

    #[test]
    fn not_ready_is_action_required() {
        let human = humanize_error(&AttendoError::NotReady);
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(!human.retriable);
    }

    #[test]
    fn cover_open_is_action_required() {
        let err = AttendoError::Daemon {
            operation: "commitJob".into(),
            code: 5,
            message: "Printer cover is open".into(),
        };
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(human.message.contains("lid"));
    }

    #[test]
    fn unknown_daemon_message_is_surfaced() {
        let err = AttendoError::JobFailed {
            step: "printing".into(),
            code: 42,
            message: "E42 font missing".into(),
        };
        let human = humanize_error(&err);
        assert!(human.suggestion.contains("E42 font missing"));
    }

    #[test]
    fn unsupported_is_permanent() {
        let human = humanize_error(&AttendoError::Unsupported("DrawLableQrCode".into()));
        assert_eq!(human.severity, Severity::Permanent);
    }
}
