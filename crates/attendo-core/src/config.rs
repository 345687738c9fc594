// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer client configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AttendoError, Result};
use crate::types::{LabelLayout, PrintSettings};

/// Loopback WebSocket endpoint of the vendor print daemon.
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:37989";

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay before every attempt.
    Fixed,
    /// Delay doubles each attempt, capped at `max_delay_ms`.
    Exponential,
}

/// Attempt limit and delay schedule for a retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Persistent printer client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Daemon WebSocket URL. Fixed for the lifetime of a session.
    pub endpoint: String,
    pub connect_timeout_ms: u64,
    /// Per-request response window.
    pub request_timeout_ms: u64,
    /// Window for the completion push after a job is committed.
    pub job_timeout_ms: u64,
    /// Pause after the device subsystem reports ready; the daemon drops
    /// requests sent immediately afterwards.
    pub stabilization_delay_ms: u64,
    /// Pause between consecutive job steps.
    pub step_settle_ms: u64,
    pub reconnect: RetryPolicy,
    pub select: RetryPolicy,
    /// Font directory handed to the device subsystem on init.
    pub font_dir: String,
    /// Font file used for the drawing board and all text elements.
    pub font_file: String,
    pub settings: PrintSettings,
    /// Operations the daemon build supports. `None` means all of them.
    pub api_surface: Option<Vec<String>>,
    pub layout: LabelLayout,
    /// Preferred printer name; the first listed device is used otherwise.
    pub printer: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            connect_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
            job_timeout_ms: 30_000,
            stabilization_delay_ms: 500,
            step_settle_ms: 50,
            reconnect: RetryPolicy {
                max_attempts: 5,
                base_delay_ms: 3_000,
                max_delay_ms: 3_000,
                backoff: Backoff::Fixed,
            },
            select: RetryPolicy {
                max_attempts: 2,
                base_delay_ms: 1_000,
                max_delay_ms: 4_000,
                backoff: Backoff::Exponential,
            },
            font_dir: String::new(),
            font_file: "ZT001.ttf".into(),
            settings: PrintSettings::default(),
            api_surface: None,
            layout: LabelLayout::default(),
            printer: None,
        }
    }
}

impl ClientConfig {
    /// Read a JSON config file. Missing fields take their default values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`ClientConfig::load`], but falls back to defaults on any error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.as_ref().display(), error = %e, "using default client config");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(AttendoError::Config("endpoint is empty".into()));
        }
        if !self.endpoint.starts_with("ws://") && !self.endpoint.starts_with("wss://") {
            return Err(AttendoError::Config(format!(
                "endpoint must be a ws:// or wss:// URL, got {}",
                self.endpoint
            )));
        }
        for (name, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("job_timeout_ms", self.job_timeout_ms),
        ] {
            if value == 0 {
                return Err(AttendoError::Config(format!("{name} must be non-zero")));
            }
        }
        if self.select.max_attempts == 0 {
            return Err(AttendoError::Config("select.max_attempts must be at least 1".into()));
        }
        if self.settings.copies == 0 {
            return Err(AttendoError::Config("settings.copies must be at least 1".into()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    pub fn stabilization_delay(&self) -> Duration {
        Duration::from_millis(self.stabilization_delay_ms)
    }

    pub fn step_settle(&self) -> Duration {
        Duration::from_millis(self.step_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.job_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(&path, r#"{ "endpoint": "ws://127.0.0.1:40000", "printer": "B21" }"#)
            .unwrap();

        let config = ClientConfig::load(&path).unwrap();
        assert_eq!(config.endpoint, "ws://127.0.0.1:40000");
        assert_eq!(config.printer.as_deref(), Some("B21"));
        assert_eq!(config.request_timeout_ms, 10_000);
    }

    #[test]
    fn rejects_non_websocket_endpoint() {
        let config = ClientConfig {
            endpoint: "http://127.0.0.1:37989".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AttendoError::Config(_))));
    }

    #[test]
    fn rejects_zero_timeouts() {
        let config = ClientConfig {
            request_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        let config = ClientConfig {
            step_settle_ms: 0,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(ClientConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load_or_default(dir.path().join("absent.json"));
        assert_eq!(config, ClientConfig::default());
    }
}
