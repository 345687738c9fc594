// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer session: connection, device subsystem and device selection.
//
// Disconnected -> Connected -> SdkReady -> PrinterSelected. Each step checks
// its precondition locally and rejects without contacting the daemon when it
// is not met. A session is an explicit value; callers that need one printer
// per process share it behind an `Arc`.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use attendo_core::config::ClientConfig;
use attendo_core::error::{AttendoError, Result};
use attendo_core::types::PrinterDevice;

use crate::protocol::{
    ApiName, ERROR_INVALID_REQUEST, ERROR_NOT_CONNECTED, ERROR_TIMEOUT, Request, ResultAck,
    parse_device_list,
};
use crate::retry::{self, RetryDecision};
use crate::transport::{Capabilities, Channel};

/// Where the session is in its setup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionPhase {
    Disconnected,
    Connected,
    SdkReady,
    PrinterSelected,
}

/// Readiness flags of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub connected: bool,
    pub sdk_ready: bool,
    pub selected: Option<PrinterDevice>,
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match (self.connected, self.sdk_ready, self.selected.is_some()) {
            (false, _, _) => SessionPhase::Disconnected,
            (true, false, _) => SessionPhase::Connected,
            (true, true, false) => SessionPhase::SdkReady,
            (true, true, true) => SessionPhase::PrinterSelected,
        }
    }
}

/// One logical printer session over a daemon channel.
pub struct PrinterSession {
    pub(crate) channel: Channel,
    pub(crate) config: ClientConfig,
    state: Mutex<SessionState>,
    /// Held for the whole of a print job.
    pub(crate) job_lock: tokio::sync::Mutex<()>,
}

impl PrinterSession {
    pub fn new(config: ClientConfig) -> Self {
        let channel = Channel::new(&config);
        Self::with_channel(config, channel)
    }

    pub fn with_channel(config: ClientConfig, channel: Channel) -> Self {
        Self {
            channel,
            config,
            state: Mutex::new(SessionState::default()),
            job_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open the daemon connection. Fails and stays disconnected when the
    /// daemon is unreachable within the connect timeout.
    #[instrument(skip(self), fields(endpoint = %self.channel.endpoint()))]
    pub async fn connect(&self) -> Result<Capabilities> {
        match self.channel.open().await {
            Ok(capabilities) => {
                self.update(|s| s.connected = true);
                info!("printer session connected");
                Ok(capabilities)
            }
            Err(e) => {
                self.update(|s| *s = SessionState::default());
                Err(e)
            }
        }
    }

    /// Bring up the daemon's device subsystem, then wait for the socket to
    /// settle before anything else is sent.
    #[instrument(skip(self))]
    pub async fn initialize_device(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(AttendoError::NotConnected);
        }
        let request = Request::init_sdk(&self.config.font_dir)?;
        self.call_checked(ApiName::InitSdk, &request).await?;
        self.update(|s| s.sdk_ready = true);
        info!(font_dir = %self.config.font_dir, "printer subsystem initialised");

        let delay = self.config.stabilization_delay();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis(), "waiting for daemon to stabilise");
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    /// Printers attached to the daemon, sorted by name.
    ///
    /// "No devices" is not an error: any failure, including calling this
    /// before the subsystem is up, yields an empty list.
    #[instrument(skip(self))]
    pub async fn list_devices(&self) -> Vec<PrinterDevice> {
        if self.phase() < SessionPhase::SdkReady {
            debug!("device list requested before subsystem init");
            return Vec::new();
        }
        match self
            .call_checked(ApiName::GetAllPrinters, &Request::get_all_printers())
            .await
        {
            Ok(ack) => {
                let devices = parse_device_list(&ack);
                info!(count = devices.len(), "printers listed");
                devices
            }
            Err(e) => {
                warn!(error = %e, "listing printers failed");
                Vec::new()
            }
        }
    }

    /// Select a printer. Retried on the `select` policy, since the daemon
    /// socket is often unstable right after the subsystem comes up. On
    /// failure the session stays in `SdkReady`.
    #[instrument(skip(self))]
    pub async fn select_device(&self, name: &str, port: i64) -> Result<()> {
        if self.phase() < SessionPhase::SdkReady {
            return Err(AttendoError::SdkNotInitialised);
        }
        let request = Request::select_printer(name, port)?;

        let mut attempts = 0;
        loop {
            match self.call_checked(ApiName::SelectPrinter, &request).await {
                Ok(_) => {
                    self.update(|s| {
                        s.selected = Some(PrinterDevice {
                            name: name.to_string(),
                            port,
                        })
                    });
                    info!(printer = name, port, "printer selected");
                    return Ok(());
                }
                Err(e) => {
                    attempts += 1;
                    match retry::should_retry(&e, attempts, &self.config.select) {
                        RetryDecision::RetryAfter(delay) => {
                            warn!(attempt = attempts, error = %e, "printer selection failed, retrying");
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::GiveUp | RetryDecision::Exhausted => {
                            warn!(printer = name, attempts, error = %e, "printer selection failed");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Connect, initialise and select `preferred` (or the first printer
    /// listed). Steps already completed are not repeated.
    #[instrument(skip(self))]
    pub async fn connect_and_select_first(&self, preferred: Option<&str>) -> Result<PrinterDevice> {
        self.connect().await?;
        if self.phase() < SessionPhase::SdkReady {
            self.initialize_device().await?;
        }

        let devices = self.list_devices().await;
        let device = match preferred {
            Some(name) => devices.into_iter().find(|d| d.name == name),
            None => devices.into_iter().next(),
        }
        .ok_or_else(|| AttendoError::DeviceUnavailable(preferred.unwrap_or("any").to_string()))?;

        if self.selected_printer().as_ref() != Some(&device) {
            self.select_device(&device.name, device.port).await?;
        }
        Ok(device)
    }

    /// Close the connection and reset every readiness flag and listener.
    #[instrument(skip(self))]
    pub fn disconnect(&self) {
        self.channel.close(true);
        self.update(|s| *s = SessionState::default());
        self.channel.events().clear_all();
        info!("printer session disconnected");
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state().phase()
    }

    /// Connected, initialised, a printer selected, and the socket open.
    pub fn is_ready(&self) -> bool {
        self.phase() == SessionPhase::PrinterSelected && self.channel.is_open()
    }

    pub fn selected_printer(&self) -> Option<PrinterDevice> {
        self.state().selected
    }

    fn is_connected(&self) -> bool {
        self.state().connected && self.channel.is_open()
    }

    fn update(&self, f: impl FnOnce(&mut SessionState)) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
    }

    /// Send a request and turn a non-zero ack into an error.
    pub(crate) async fn call_checked(&self, api: ApiName, request: &Request) -> Result<ResultAck> {
        self.channel.capabilities().require(api)?;
        let window = self.config.request_timeout();
        let ack = self.channel.send(request, window).await;
        check_ack(api, window, ack)
    }
}

/// Turn a synthetic or daemon failure code into the matching error.
fn check_ack(api: ApiName, window: Duration, ack: ResultAck) -> Result<ResultAck> {
    match ack.error_code {
        0 => Ok(ack),
        ERROR_NOT_CONNECTED => Err(AttendoError::NotConnected),
        ERROR_TIMEOUT => Err(AttendoError::Timeout {
            operation: api.to_string(),
            after: window,
        }),
        ERROR_INVALID_REQUEST => Err(AttendoError::Protocol(ack.info_text())),
        code => Err(AttendoError::Daemon {
            operation: api.to_string(),
            code,
            message: ack.info_text(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDaemon, Reply, unreachable_endpoint};
    use std::time::{Duration, Instant};

    async fn ready_session(daemon: &FakeDaemon) -> PrinterSession {
        let session = PrinterSession::new(daemon.config());
        session.connect().await.unwrap();
        session.initialize_device().await.unwrap();
        session
    }

    #[tokio::test]
    async fn unreachable_daemon_leaves_session_disconnected() {
        let config = ClientConfig {
            endpoint: unreachable_endpoint().await,
            connect_timeout_ms: 500,
            ..ClientConfig::default()
        };
        let session = PrinterSession::new(config);
        let started = Instant::now();

        assert!(session.connect().await.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(session.phase(), SessionPhase::Disconnected);
    }

    #[tokio::test]
    async fn init_requires_connection() {
        let session = PrinterSession::new(ClientConfig::default());
        assert!(matches!(
            session.initialize_device().await,
            Err(AttendoError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn init_failure_keeps_session_connected() {
        let daemon = FakeDaemon::start().await;
        daemon.reply(ApiName::InitSdk, Reply::Ack(ResultAck::error(12, "font dir missing")));
        let session = PrinterSession::new(daemon.config());
        session.connect().await.unwrap();

        let err = session.initialize_device().await.unwrap_err();
        assert_eq!(err.code(), Some(12));
        assert_eq!(session.phase(), SessionPhase::Connected);
    }

    #[tokio::test]
    async fn lists_devices_from_daemon_payload() {
        let daemon = FakeDaemon::with_printer("ThermalPrinterA", 9100).await;
        let session = ready_session(&daemon).await;

        let devices = session.list_devices().await;
        assert_eq!(
            devices,
            vec![PrinterDevice {
                name: "ThermalPrinterA".into(),
                port: 9100
            }]
        );
    }

    #[tokio::test]
    async fn list_before_init_is_empty_without_daemon_call() {
        let daemon = FakeDaemon::with_printer("ThermalPrinterA", 9100).await;
        let session = PrinterSession::new(daemon.config());
        session.connect().await.unwrap();

        assert!(session.list_devices().await.is_empty());
        assert_eq!(daemon.count(ApiName::GetAllPrinters), 0);
    }

    #[tokio::test]
    async fn list_failure_yields_empty() {
        let daemon = FakeDaemon::start().await;
        daemon.reply(ApiName::GetAllPrinters, Reply::Ack(ResultAck::error(3, "usb error")));
        let session = ready_session(&daemon).await;
        assert!(session.list_devices().await.is_empty());
    }

    #[tokio::test]
    async fn select_marks_session_ready() {
        let daemon = FakeDaemon::with_printer("ThermalPrinterA", 9100).await;
        let session = ready_session(&daemon).await;

        session.select_device("ThermalPrinterA", 9100).await.unwrap();
        assert_eq!(session.phase(), SessionPhase::PrinterSelected);
        assert!(session.is_ready());
        assert_eq!(session.selected_printer().unwrap().name, "ThermalPrinterA");

        let sent = daemon.requests_for(ApiName::SelectPrinter);
        let param = sent[0].parameter.as_ref().unwrap();
        assert_eq!(param["printerName"], "ThermalPrinterA");
        assert_eq!(param["port"], 9100);
    }

    #[tokio::test]
    async fn select_before_init_is_rejected_locally() {
        let daemon = FakeDaemon::start().await;
        let session = PrinterSession::new(daemon.config());
        session.connect().await.unwrap();

        assert!(matches!(
            session.select_device("ThermalPrinterA", 9100).await,
            Err(AttendoError::SdkNotInitialised)
        ));
        assert_eq!(daemon.count(ApiName::SelectPrinter), 0);
    }

    #[tokio::test]
    async fn select_retries_then_stays_sdk_ready() {
        let daemon = FakeDaemon::start().await;
        daemon.reply(ApiName::SelectPrinter, Reply::Ack(ResultAck::error(9, "busy")));
        let session = ready_session(&daemon).await;

        let err = session.select_device("ThermalPrinterA", 9100).await.unwrap_err();
        assert_eq!(err.code(), Some(9));
        assert_eq!(daemon.count(ApiName::SelectPrinter), 2);
        assert_eq!(session.phase(), SessionPhase::SdkReady);
        assert!(!session.is_ready());
    }

    #[tokio::test]
    async fn unsupported_select_is_not_sent() {
        let daemon = FakeDaemon::start().await;
        let config = ClientConfig {
            api_surface: Some(vec!["initSdk".into(), "getAllPrinters".into()]),
            ..daemon.config()
        };
        let session = PrinterSession::new(config);
        session.connect().await.unwrap();
        session.initialize_device().await.unwrap();

        assert!(matches!(
            session.select_device("ThermalPrinterA", 9100).await,
            Err(AttendoError::Unsupported(_))
        ));
        assert_eq!(daemon.count(ApiName::SelectPrinter), 0);
    }

    #[tokio::test]
    async fn connect_and_select_first_picks_named_or_first() {
        let daemon = FakeDaemon::start().await;
        daemon.reply(
            ApiName::GetAllPrinters,
            Reply::Ack(ResultAck {
                info: serde_json::Value::String(r#"{"Beta":2,"Alpha":1}"#.into()),
                ..ResultAck::ok()
            }),
        );
        let session = PrinterSession::new(daemon.config());

        let device = session.connect_and_select_first(None).await.unwrap();
        assert_eq!(device.name, "Alpha");

        let device = session.connect_and_select_first(Some("Beta")).await.unwrap();
        assert_eq!(device.port, 2);
        assert_eq!(daemon.count(ApiName::InitSdk), 1);

        assert!(matches!(
            session.connect_and_select_first(Some("Gamma")).await,
            Err(AttendoError::DeviceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn disconnect_resets_flags_and_listeners() {
        let daemon = FakeDaemon::with_printer("ThermalPrinterA", 9100).await;
        let session = ready_session(&daemon).await;
        session.select_device("ThermalPrinterA", 9100).await.unwrap();
        session.channel().events().add_listener("ui", |_| {});

        session.disconnect();

        assert_eq!(session.state(), SessionState::default());
        assert_eq!(session.channel().events().listener_count(), 0);
        assert!(!session.is_ready());
    }

    #[test]
    fn synthetic_codes_map_to_distinct_errors() {
        let window = Duration::from_millis(300);
        let check = |code| check_ack(ApiName::StartJob, window, ResultAck::error(code, "x"));

        assert!(matches!(check(ERROR_NOT_CONNECTED), Err(AttendoError::NotConnected)));
        assert!(matches!(
            check(ERROR_TIMEOUT),
            Err(AttendoError::Timeout { after, .. }) if after == window
        ));
        assert!(matches!(
            check_ack(
                ApiName::StartJob,
                window,
                ResultAck::invalid_request("startJob", "key must be a string"),
            ),
            Err(AttendoError::Protocol(msg)) if msg.contains("could not be encoded")
        ));
        assert!(matches!(
            check(9),
            Err(AttendoError::Daemon { code: 9, .. })
        ));
        assert!(check(0).is_ok());
    }
}
