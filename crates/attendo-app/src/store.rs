// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Participant roster held in memory, loaded from and saved to a JSON file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use attendo_core::error::{AttendoError, Result};
use attendo_core::types::Participant;

use crate::checkin::ParticipantStore;

/// Roster keyed by participant UUID.
#[derive(Default)]
pub struct InMemoryParticipantStore {
    participants: Mutex<HashMap<Uuid, Participant>>,
}

impl InMemoryParticipantStore {
    pub fn new(participants: impl IntoIterator<Item = Participant>) -> Self {
        Self {
            participants: Mutex::new(participants.into_iter().map(|p| (p.uuid, p)).collect()),
        }
    }

    /// Load a roster file: a JSON array of participants.
    pub fn from_roster(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let participants: Vec<Participant> = serde_json::from_str(&data)?;
        let store = Self::new(participants);
        info!(path = %path.as_ref().display(), count = store.len(), "roster loaded");
        Ok(store)
    }

    /// Write the roster back, sorted by last then first name.
    pub fn save_roster(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut participants: Vec<Participant> = self.lock()?.values().cloned().collect();
        participants.sort_by(|a, b| {
            (&a.last_name, &a.first_name, a.uuid).cmp(&(&b.last_name, &b.first_name, b.uuid))
        });
        let json = serde_json::to_string_pretty(&participants)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Participant>>> {
        self.participants
            .lock()
            .map_err(|_| AttendoError::Store("roster lock poisoned".into()))
    }
}

impl ParticipantStore for InMemoryParticipantStore {
    fn get_by_identifier(&self, identifier: &str) -> Result<Option<Participant>> {
        let Ok(uuid) = Uuid::parse_str(identifier.trim()) else {
            debug!(identifier, "scanned value is not a participant id");
            return Ok(None);
        };
        Ok(self.lock()?.get(&uuid).cloned())
    }

    fn mark_attended(&self, identifier: &str) -> Result<Participant> {
        let not_found = || AttendoError::ParticipantNotFound(identifier.to_string());
        let uuid = Uuid::parse_str(identifier.trim()).map_err(|_| not_found())?;
        let mut participants = self.lock()?;
        let participant = participants.get_mut(&uuid).ok_or_else(not_found)?;
        participant.attended_at = Some(Utc::now());
        Ok(participant.clone())
    }
}
