// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Badge print job orchestration.
//
// One job is the fixed sequence
//
//   startJob -> InitDrawingBoard -> draw (name, id, department, QR) ->
//   commitJob -> completion push -> endJob
//
// Each step must succeed before the next is sent. The commitJob response only
// confirms submission; the job is done when a push reports at least one copy
// and one page printed. An error push at any point fails the job. Nothing is
// rolled back: a failed job is retried from the start by the caller.

use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use attendo_core::error::{AttendoError, Result};
use attendo_core::types::{BadgeContent, BadgeElement, ElementKind, PrintOutcome};

use crate::events::ListenerGuard;
use crate::protocol::{ApiName, Request, ResultAck};
use crate::session::PrinterSession;
use crate::transport::Capabilities;

/// Pushes seen by one job. Progress pushes are dropped; the first
/// completion is kept until the job reaches its completion wait.
struct JobPushes {
    rx: mpsc::UnboundedReceiver<ResultAck>,
    completed: Option<(u32, u32)>,
}

impl JobPushes {
    /// Fails on an error push.
    fn observe(&mut self, ack: ResultAck) -> Result<()> {
        if !ack.is_success() {
            return Err(push_failure(&ack));
        }
        match ack.completion() {
            Some(done) => {
                self.completed.get_or_insert(done);
            }
            None => debug!(progress = ?ack.progress(), "print progress"),
        }
        Ok(())
    }
}

impl PrinterSession {
    /// Print one badge on the selected printer.
    ///
    /// Fails with [`AttendoError::NotReady`] without contacting the daemon
    /// unless the session is ready, and with [`AttendoError::JobInProgress`]
    /// while another job on this session is running. A missing completion
    /// push resolves as [`AttendoError::JobTimedOut`]; `endJob` is not sent
    /// then, since the printer may still be working. Once the completion push
    /// has arrived the job succeeds even if `endJob` is rejected.
    #[instrument(skip_all, fields(identifier = %badge.identifier))]
    pub async fn print_badge(&self, badge: &BadgeContent) -> Result<PrintOutcome> {
        if !self.is_ready() {
            warn!("print requested before a printer was selected");
            return Err(AttendoError::NotReady);
        }
        let Ok(_job) = self.job_lock.try_lock() else {
            return Err(AttendoError::JobInProgress);
        };

        let capabilities = self.channel.capabilities();
        for api in [
            ApiName::StartJob,
            ApiName::InitDrawingBoard,
            ApiName::CommitJob,
            ApiName::EndJob,
        ] {
            capabilities.require(api)?;
        }
        let elements = self.plan_elements(badge, &capabilities)?;

        // Listen before the first job command; the completion signal only
        // arrives as a push.
        let events = self.channel.events();
        if events.job_in_progress() {
            // Another session on the same channel is mid-job.
            return Err(AttendoError::JobInProgress);
        }
        let (push_tx, rx) = mpsc::unbounded_channel();
        let mut pushes = JobPushes {
            rx,
            completed: None,
        };
        let _listener = ListenerGuard::register(
            events.clone(),
            format!("job-{}", Uuid::new_v4()),
            move |message| {
                let _ = push_tx.send(message.result_ack.clone());
            },
        );
        events.mark_job_started();
        let started = Instant::now();

        let settings = self.config.settings;
        self.job_step(ApiName::StartJob, &Request::start_job(&settings)?, &mut pushes)
            .await?;
        self.job_step(
            ApiName::InitDrawingBoard,
            &Request::init_drawing_board(&self.config.layout, &self.config.font_file)?,
            &mut pushes,
        )
        .await?;
        for element in &elements {
            let request = self.draw_request(element)?;
            self.job_step(request_api(element), &request, &mut pushes)
                .await?;
        }
        self.job_step(ApiName::CommitJob, &Request::commit_job(settings.copies)?, &mut pushes)
            .await?;

        let (copies, pages) = self.await_completion(&mut pushes).await?;
        // The label is out; a failed endJob does not undo that.
        if let Err(e) = self.call_checked(ApiName::EndJob, &Request::end_job()).await {
            warn!(error = %e, "endJob failed after the badge printed");
        }

        let outcome = PrintOutcome {
            copies,
            pages,
            elapsed: started.elapsed(),
        };
        info!(copies, pages, elapsed_ms = outcome.elapsed.as_millis(), "badge printed");
        Ok(outcome)
    }

    /// Elements to draw, in order. The QR element is dropped when the layout
    /// has no QR box or the daemon cannot draw QR codes.
    fn plan_elements(
        &self,
        badge: &BadgeContent,
        capabilities: &Capabilities,
    ) -> Result<Vec<BadgeElement>> {
        let mut planned = Vec::new();
        for element in badge.elements() {
            if element.kind == ElementKind::QrCode {
                if self.config.layout.qr.is_none() || !capabilities.supports(ApiName::DrawQrCode) {
                    debug!("skipping QR code element");
                    continue;
                }
            } else {
                capabilities.require(ApiName::DrawText)?;
            }
            planned.push(element);
        }
        Ok(planned)
    }

    fn draw_request(&self, element: &BadgeElement) -> Result<Request> {
        let layout = &self.config.layout;
        match (element.kind, layout.qr.as_ref(), layout.text_box(element.kind)) {
            (ElementKind::QrCode, Some(qr), _) => Request::draw_qr_code(qr, &element.value),
            (_, _, Some(text_box)) => {
                Request::draw_text(text_box, &element.value, &self.config.font_file)
            }
            _ => Err(AttendoError::Config(format!(
                "label layout has no box for {:?}",
                element.kind
            ))),
        }
    }

    /// Send one job command. An error push received before or while the
    /// command is in flight fails the job with the push's code and message.
    async fn job_step(&self, api: ApiName, request: &Request, pushes: &mut JobPushes) -> Result<()> {
        while let Ok(ack) = pushes.rx.try_recv() {
            pushes.observe(ack)?;
        }

        let call = self.call_checked(api, request);
        tokio::pin!(call);
        let result = loop {
            tokio::select! {
                biased;
                Some(ack) = pushes.rx.recv() => pushes.observe(ack)?,
                result = &mut call => break result,
            }
        };
        result.map_err(|e| match e {
            AttendoError::Daemon { code, message, .. } => AttendoError::JobFailed {
                step: api.to_string(),
                code,
                message,
            },
            other => other,
        })?;
        debug!(api = %api, "job step done");

        let settle = self.config.step_settle();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        Ok(())
    }

    async fn await_completion(&self, pushes: &mut JobPushes) -> Result<(u32, u32)> {
        let window = self.config.job_timeout();
        let wait = async {
            loop {
                if let Some(done) = pushes.completed {
                    return Ok(done);
                }
                match pushes.rx.recv().await {
                    Some(ack) => pushes.observe(ack)?,
                    // Listener dropped: the session was disconnected mid-job.
                    None => return Err(AttendoError::NotConnected),
                }
            }
        };
        match tokio::time::timeout(window, wait).await {
            Ok(result) => result,
            Err(_) => {
                warn!(window_s = window.as_secs(), "no completion push before job timeout");
                Err(AttendoError::JobTimedOut { after: window })
            }
        }
    }
}

fn request_api(element: &BadgeElement) -> ApiName {
    match element.kind {
        ElementKind::QrCode => ApiName::DrawQrCode,
        _ => ApiName::DrawText,
    }
}

fn push_failure(ack: &ResultAck) -> AttendoError {
    warn!(code = ack.error_code, info = %ack.info_text(), "printer reported an error");
    AttendoError::JobFailed {
        step: "printing".into(),
        code: ack.error_code,
        message: ack.info_text(),
    }
}
