// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry schedule for the flaky local daemon.
//
// Used for reconnecting after an unexpected socket drop (fixed backoff) and
// for device selection right after the subsystem comes up (short exponential
// backoff). Only errors that another attempt could fix are retried.

use std::time::Duration;

use attendo_core::config::{Backoff, RetryPolicy};
use attendo_core::error::AttendoError;
use tracing::{debug, warn};

/// Result of evaluating whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after this delay.
    RetryAfter(Duration),
    /// Error cannot be fixed by retrying.
    GiveUp,
    /// Attempt limit reached.
    Exhausted,
}

/// Whether another attempt could plausibly succeed.
pub fn is_retriable(err: &AttendoError) -> bool {
    match err {
        AttendoError::NotConnected
        | AttendoError::Transport(_)
        | AttendoError::Timeout { .. }
        | AttendoError::Daemon { .. }
        | AttendoError::DeviceUnavailable(_) => true,

        AttendoError::Io(io_err) => matches!(
            io_err.kind(),
            std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::Interrupted
        ),

        _ => false,
    }
}

/// Decide what to do after `attempts_made` failed attempts.
pub fn should_retry(err: &AttendoError, attempts_made: u32, policy: &RetryPolicy) -> RetryDecision {
    if !is_retriable(err) {
        debug!(error = %err, "error is not retriable");
        return RetryDecision::GiveUp;
    }
    next_attempt(attempts_made, policy)
}

/// Schedule the next attempt regardless of error class.
pub fn next_attempt(attempts_made: u32, policy: &RetryPolicy) -> RetryDecision {
    if attempts_made >= policy.max_attempts {
        warn!(attempts_made, max = policy.max_attempts, "retry limit exhausted");
        RetryDecision::Exhausted
    } else {
        let delay = delay_for(attempts_made, policy);
        debug!(attempts_made, delay_ms = delay.as_millis(), "scheduling retry");
        RetryDecision::RetryAfter(delay)
    }
}

/// Delay before the attempt following `attempts_made` failures.
///
/// Fixed: `base`. Exponential: `min(base * 2^(attempts_made - 1), max)`.
pub fn delay_for(attempts_made: u32, policy: &RetryPolicy) -> Duration {
    let base = policy.base_delay();
    match policy.backoff {
        Backoff::Fixed => base,
        Backoff::Exponential => {
            let exp = attempts_made.saturating_sub(1).min(16);
            let ms = (base.as_millis() as u64).saturating_mul(1u64 << exp);
            Duration::from_millis(ms).min(policy.max_delay().max(base))
        }
    }
}
