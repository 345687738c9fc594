// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request/response correlation.
//
// The daemon echoes the request's `apiName` in its response and carries no
// request id, so responses are matched by operation name. Only one request
// per operation name can be in flight; callers serialize same-named requests
// themselves. The `Correlator` trait keeps that policy swappable for an
// id-based scheme without touching the transport or the session.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::protocol::{InboundMessage, ResultAck};

/// A registered request waiting for its response.
#[derive(Debug)]
pub struct PendingHandle {
    /// Distinguishes this registration from later ones under the same key.
    pub token: u64,
    pub response: oneshot::Receiver<ResultAck>,
}

/// Matches inbound responses to outstanding requests.
pub trait Correlator: Send + Sync {
    /// Register a request under `key`. Any request already pending under the
    /// same key is resolved immediately as superseded.
    fn register(&self, key: &str) -> PendingHandle;

    /// Deliver a response. Returns `false` when nothing was waiting for it.
    /// Push messages are never matched.
    fn resolve(&self, message: &InboundMessage) -> bool;

    /// Drop the registration identified by `key` and `token`, e.g. after its
    /// timeout fired. A newer registration under the same key is left alone.
    fn expire(&self, key: &str, token: u64) -> bool;

    fn pending_count(&self) -> usize;
}

struct PendingEntry {
    token: u64,
    submitted_at: Instant,
    sender: oneshot::Sender<ResultAck>,
}

/// Correlates by operation name.
#[derive(Default)]
pub struct ApiNameCorrelator {
    pending: Mutex<HashMap<String, PendingEntry>>,
    next_token: AtomicU64,
}

impl ApiNameCorrelator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Correlator for ApiNameCorrelator {
    fn register(&self, key: &str) -> PendingHandle {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (sender, response) = oneshot::channel();
        let entry = PendingEntry {
            token,
            submitted_at: Instant::now(),
            sender,
        };

        let displaced = match self.pending.lock() {
            Ok(mut pending) => pending.insert(key.to_string(), entry),
            Err(_) => None,
        };
        if let Some(old) = displaced {
            warn!(api = key, "request superseded by a newer one with the same name");
            let _ = old.sender.send(ResultAck::superseded(key));
        }

        PendingHandle { token, response }
    }

    fn resolve(&self, message: &InboundMessage) -> bool {
        if message.is_push() {
            return false;
        }
        let entry = match self.pending.lock() {
            Ok(mut pending) => pending.remove(&message.api_name),
            Err(_) => None,
        };
        match entry {
            Some(entry) => {
                debug!(
                    api = %message.api_name,
                    latency_ms = entry.submitted_at.elapsed().as_millis(),
                    code = message.result_ack.error_code,
                    "response matched"
                );
                // The waiter may have given up already; nothing to do then.
                let _ = entry.sender.send(message.result_ack.clone());
                true
            }
            None => {
                debug!(api = %message.api_name, "unmatched response ignored");
                false
            }
        }
    }

    fn expire(&self, key: &str, token: u64) -> bool {
        let Ok(mut pending) = self.pending.lock() else {
            return false;
        };
        match pending.get(key) {
            Some(entry) if entry.token == token => {
                pending.remove(key);
                true
            }
            _ => false,
        }
    }

    fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ERROR_SUPERSEDED, PUSH_API_NAME};

    fn response(api: &str, code: i64) -> InboundMessage {
        InboundMessage {
            api_name: api.into(),
            result_ack: ResultAck {
                error_code: code,
                ..ResultAck::ok()
            },
        }
    }

    #[tokio::test]
    async fn response_resolves_matching_request() {
        let correlator = ApiNameCorrelator::new();
        let handle = correlator.register("startJob");
        assert_eq!(correlator.pending_count(), 1);

        assert!(correlator.resolve(&response("startJob", 0)));
        assert_eq!(handle.response.await.unwrap().error_code, 0);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn unmatched_response_is_ignored() {
        let correlator = ApiNameCorrelator::new();
        let _handle = correlator.register("startJob");
        assert!(!correlator.resolve(&response("endJob", 0)));
        assert_eq!(correlator.pending_count(), 1);
    }

    #[test]
    fn push_never_resolves_a_request() {
        let correlator = ApiNameCorrelator::new();
        let _handle = correlator.register(PUSH_API_NAME);
        assert!(!correlator.resolve(&response(PUSH_API_NAME, 0)));
        assert_eq!(correlator.pending_count(), 1);
    }

    #[tokio::test]
    async fn late_response_after_expiry_is_a_no_op() {
        let correlator = ApiNameCorrelator::new();
        let handle = correlator.register("commitJob");
        assert!(correlator.expire("commitJob", handle.token));
        assert!(!correlator.resolve(&response("commitJob", 0)));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn second_request_supersedes_first() {
        let correlator = ApiNameCorrelator::new();
        let first = correlator.register("DrawLableText");
        let second = correlator.register("DrawLableText");

        assert_eq!(first.response.await.unwrap().error_code, ERROR_SUPERSEDED);

        // The stale token must not evict the live registration.
        assert!(!correlator.expire("DrawLableText", first.token));
        assert!(correlator.resolve(&response("DrawLableText", 0)));
        assert!(second.response.await.unwrap().is_success());
    }
}
