// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fan-out of unsolicited daemon pushes (job progress, device status).
//
// Pushes never touch the pending-request table. They are handed to every
// registered listener, in registration order, on the transport's reader task.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::protocol::InboundMessage;

type Listener = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

/// Registry of push listeners plus the shared "job in progress" flag.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: Mutex<Vec<(String, Listener)>>,
    job_in_progress: AtomicBool,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` under `key`. Re-using a key replaces the earlier
    /// listener in place, keeping its position in the delivery order.
    pub fn add_listener<F>(&self, key: &str, listener: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        let Ok(mut listeners) = self.listeners.lock() else {
            return;
        };
        let listener: Listener = Arc::new(listener);
        match listeners.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = listener,
            None => listeners.push((key.to_string(), listener)),
        }
        debug!(key, count = listeners.len(), "push listener registered");
    }

    /// Remove the listener under `key`. Unknown keys are ignored.
    pub fn remove_listener(&self, key: &str) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|(k, _)| k != key);
        }
    }

    pub fn clear_all(&self) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.clear();
        }
        self.job_in_progress.store(false, Ordering::SeqCst);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Deliver a push to every listener. A panicking listener is logged and
    /// skipped. Returns the number of listeners that ran to completion.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        let ack = &message.result_ack;
        if !ack.is_success() || ack.completion().is_some() {
            self.job_in_progress.store(false, Ordering::SeqCst);
        }

        // Snapshot so listeners may add or remove listeners while running.
        let snapshot: Vec<(String, Listener)> = match self.listeners.lock() {
            Ok(listeners) => listeners.clone(),
            Err(_) => return 0,
        };

        let mut delivered = 0;
        for (key, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(message))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(key = %key, "push listener panicked"),
            }
        }
        delivered
    }

    /// Mark a job as started on the device.
    pub fn mark_job_started(&self) {
        self.job_in_progress.store(true, Ordering::SeqCst);
    }

    pub fn mark_job_finished(&self) {
        self.job_in_progress.store(false, Ordering::SeqCst);
    }

    /// Whether the device is believed to be mid-job. Cleared by an error push
    /// or a completion push. A job refuses to start while this is set, so
    /// sessions sharing one channel cannot interleave jobs.
    pub fn job_in_progress(&self) -> bool {
        self.job_in_progress.load(Ordering::SeqCst)
    }
}

/// Removes its listener and clears the job flag when dropped.
pub struct ListenerGuard {
    dispatcher: Arc<EventDispatcher>,
    key: String,
}

impl ListenerGuard {
    pub fn register<F>(dispatcher: Arc<EventDispatcher>, key: String, listener: F) -> Self
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        dispatcher.add_listener(&key, listener);
        Self { dispatcher, key }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.dispatcher.remove_listener(&self.key);
        self.dispatcher.mark_job_finished();
    }
}
