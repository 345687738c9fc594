// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Attendo Print — client for the local label-printer daemon.  Speaks the
// daemon's JSON-over-WebSocket protocol, matches responses to requests, fans
// out push events, and drives printer sessions and badge print jobs on top of
// the domain types in `attendo-core`.

pub mod correlator;
pub mod events;
pub mod job;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use correlator::{ApiNameCorrelator, Correlator};
pub use events::{EventDispatcher, ListenerGuard};
pub use session::{PrinterSession, SessionPhase, SessionState};
pub use transport::{Capabilities, Channel, ConnectionState};
